use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use rsnavtree_engine::{preview_compact, RulesetVariables, Value};

use crate::hierarchy::NodeRecord;

/// 表达式求值错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("表达式解析失败：{0}")]
    Parse(String),
    #[error("表达式执行失败：{0}")]
    Evaluation(String),
}

/// 表达式求值上下文
/// 1. this_node：当前节点（规则条件针对父节点求值时为 None）
/// 2. parent_chain：父节点链，最近的祖先在前（ParentNode.Parent... 逐级访问）
/// 3. children_artifacts：子节点产物（仅隐藏表达式引用 ChildrenArtifacts 时提供）
#[derive(Debug, Clone)]
pub struct ExpressionContext {
    pub this_node: Option<Arc<NodeRecord>>,
    pub parent_chain: Vec<Arc<NodeRecord>>,
    pub variables: Arc<RulesetVariables>,
    pub children_artifacts: Option<Vec<BTreeMap<String, Value>>>,
}

impl ExpressionContext {
    pub fn new(variables: Arc<RulesetVariables>) -> Self {
        Self {
            this_node: None,
            parent_chain: Vec::new(),
            variables,
            children_artifacts: None,
        }
    }

    /// 直接父节点
    #[inline]
    pub fn parent(&self) -> Option<&NodeRecord> {
        self.parent_chain.first().map(Arc::as_ref)
    }

    /// 第 depth 级祖先（0 为直接父节点）
    #[inline]
    pub fn ancestor(&self, depth: usize) -> Option<&NodeRecord> {
        self.parent_chain.get(depth).map(Arc::as_ref)
    }
}

/// 表达式求值协作方
#[async_trait]
pub trait ExpressionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        expression: &str,
        context: &ExpressionContext,
    ) -> Result<Value, ExpressionError>;
}

/// 布尔上下文求值：求值失败一律视为 false（失败即关闭）
pub(crate) async fn evaluate_condition(
    evaluator: &dyn ExpressionEvaluator,
    expression: &str,
    context: &ExpressionContext,
) -> bool {
    match evaluator.evaluate(expression, context).await {
        Ok(value) => value.is_truthy(),
        Err(e) => {
            log::warn!(
                "Expression `{}` failed, treated as false: {}",
                preview_compact(expression, 80),
                e
            );
            false
        }
    }
}
