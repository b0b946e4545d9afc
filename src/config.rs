//! 引擎配置管理
//! 支持 JSON 反序列化（缺省字段取默认值）与链式构建器两种构造方式

use serde::{Deserialize, Serialize};

use rsnavtree_engine::TargetTree;

use crate::error::{NavError, NavResult};

/// 过滤配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// 最大遍历深度（防止无限递归层级）
    pub max_depth: usize,
    /// 最多返回的命中节点数
    pub max_results: usize,
    pub case_sensitive: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_results: 1000,
            case_sensitive: false,
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 请求未指定分页大小时的默认值
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// 缓存的（规则集, 变量快照）组合上限，超出时淘汰最早创建的组合
    pub max_cached_combinations: usize,
    /// 分页请求是否为返回的节点判定 has_children
    pub determine_children_on_page: bool,
    pub filter: FilterOptions,
    /// 当前树的类型，规则按 target_tree 过滤
    pub target_tree: TargetTree,
    /// 输出每个层级的构建耗时（info 级别）
    pub log_timings: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 1000,
            max_page_size: 10000,
            max_cached_combinations: 16,
            determine_children_on_page: true,
            filter: FilterOptions::default(),
            target_tree: TargetTree::Main,
            log_timings: false,
        }
    }
}

impl EngineConfig {
    /// 从JSON解析（缺失字段取默认值）并校验
    pub fn from_json_str(json: &str) -> NavResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    pub fn validate(&self) -> NavResult<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(NavError::InvalidRequest("page size must be positive".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(NavError::InvalidRequest(format!(
                "default page size {} exceeds max page size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.max_cached_combinations == 0 {
            return Err(NavError::InvalidRequest(
                "max_cached_combinations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size;
        self
    }

    pub fn max_page_size(mut self, size: usize) -> Self {
        self.config.max_page_size = size;
        self
    }

    pub fn max_cached_combinations(mut self, max: usize) -> Self {
        self.config.max_cached_combinations = max;
        self
    }

    pub fn determine_children_on_page(mut self, enabled: bool) -> Self {
        self.config.determine_children_on_page = enabled;
        self
    }

    pub fn filter_max_depth(mut self, depth: usize) -> Self {
        self.config.filter.max_depth = depth;
        self
    }

    pub fn filter_max_results(mut self, max: usize) -> Self {
        self.config.filter.max_results = max;
        self
    }

    pub fn filter_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.config.filter.case_sensitive = case_sensitive;
        self
    }

    pub fn target_tree(mut self, tree: TargetTree) -> Self {
        self.config.target_tree = tree;
        self
    }

    pub fn log_timings(mut self, enabled: bool) -> Self {
        self.config.log_timings = enabled;
        self
    }

    pub fn build(self) -> NavResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
