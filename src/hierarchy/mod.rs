//! 层级构建器
//! 核心职责：
//! 1. 规则匹配 -> 规格求值 -> 递归守卫 -> 隐藏处理 -> 分组 -> 定制，组装出一个子层级
//! 2. 层级按（规则集，变量快照，父节点）缓存，可分页读取而不必完整物化
//! 3. 子节点判定、节点定位、同标签后处理
mod builder;
mod cache;
mod children;
mod grouping_adapter;
mod hide;
mod level;
mod locate;
mod post_process;
mod record;
mod spec_eval;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::collab::{ExpressionEvaluator, InstanceQuery, SchemaCatalog, SchemaHierarchy};
use crate::config::EngineConfig;
use crate::error::{NavError, NavResult};
use crate::matcher::RuleMatcher;

pub(crate) use builder::Want;
pub(crate) use cache::{Combination, HierarchyCache};
pub use record::{NodeHandle, NodeRecord};

/// 递归异步调用使用的装箱 Future
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 隐藏表达式引用子节点产物时使用的标识
pub(crate) const CHILDREN_ARTIFACTS_MARKER: &str = "ChildrenArtifacts";

/// 协作方与配置
pub(crate) struct Services {
    pub config: EngineConfig,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    pub query: Arc<dyn InstanceQuery>,
    pub schema: Arc<dyn SchemaCatalog>,
}

/// 单次请求的构建上下文
#[derive(Clone, Copy)]
pub(crate) struct LevelBuilder<'a> {
    pub combo: &'a Combination,
    pub services: &'a Services,
    pub cancel: &'a CancellationToken,
}

impl<'a> LevelBuilder<'a> {
    pub fn new(combo: &'a Combination, services: &'a Services, cancel: &'a CancellationToken) -> Self {
        Self {
            combo,
            services,
            cancel,
        }
    }

    #[inline]
    pub fn check_cancel(self) -> NavResult<()> {
        if self.cancel.is_cancelled() {
            return Err(NavError::Cancelled);
        }
        Ok(())
    }

    #[inline]
    pub fn hierarchy(self) -> SchemaHierarchy<'a> {
        SchemaHierarchy(self.services.schema.as_ref())
    }

    pub fn matcher(self) -> RuleMatcher<'a> {
        RuleMatcher {
            bundle: self.combo.bundle.as_ref(),
            evaluator: self.services.evaluator.as_ref(),
            variables: &self.combo.variables,
            target_tree: self.services.config.target_tree,
            cancel: self.cancel,
        }
    }

    /// 祖先链（根在前）
    pub fn ancestors(self, lineage: &[NodeHandle]) -> NavResult<Vec<Arc<NodeRecord>>> {
        self.combo.arena.get_many(lineage)
    }
}
