use async_trait::async_trait;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

use rsnavtree_engine::{InstanceKey, InstanceRecord, RulesetVariables, SpecificationRef};

/// 实例查询错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("规格 `{specification}` 查询失败：{reason}")]
    Failed { specification: String, reason: String },
    #[error("不支持的规格类型：{0}")]
    Unsupported(String),
}

/// 查询请求
/// parent_instance_keys 为父节点的全部实例Key（根层级为空；同标签合并节点为并集）
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub specification: SpecificationRef,
    pub parent_instance_keys: Vec<InstanceKey>,
    pub instance_filter: Option<String>,
    pub variables: Arc<RulesetVariables>,
}

/// 实例查询协作方
/// 负责多态、排除类、多跳/递归关系展开；返回顺序即规格不排序时的输出顺序
#[async_trait]
pub trait InstanceQuery: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<InstanceRecord>, QueryError>;

    /// 计数（默认实现执行查询并按实例Key去重）
    async fn count(&self, request: &QueryRequest) -> Result<usize, QueryError> {
        let records = self.query(request).await?;
        let unique: FxHashSet<&InstanceKey> = records.iter().map(|r| &r.key).collect();
        Ok(unique.len())
    }
}
