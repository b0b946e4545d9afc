//! 全局错误类型定义
//! 与请求层语义对应：调用方错误 / 缓存一致性错误 / 协作方错误 / 内核错误
use thiserror::Error;

use rsnavtree_engine::CoreError;
use serde_json::Error as SerdeJsonError;

use crate::collab::{ExpressionError, QueryError};

#[derive(Error, Debug)]
pub enum NavError {
    // 调用方错误（在任何层级构建之前拒绝）
    #[error("规则集不存在：{0}")]
    RulesetNotFound(String),
    #[error("规则集变量无效：{0}")]
    InvalidVariables(String),
    #[error("无效请求：{0}")]
    InvalidRequest(String),

    // 缓存一致性错误（可重试）
    #[error("规则集 `{ruleset_id}` 的层级缓存已失效，请重试")]
    StaleLevel { ruleset_id: String },
    #[error("节点不存在：{0}")]
    NodeNotFound(String),
    #[error("请求已取消")]
    Cancelled,

    // 协作方错误（仅显式调用时上抛，层级构建中一律失败即关闭）
    #[error("表达式求值失败：{0}")]
    Expression(#[from] ExpressionError),
    #[error("实例查询失败：{0}")]
    Query(#[from] QueryError),

    // 内核与序列化错误
    #[error("内核错误：{0}")]
    Core(#[from] CoreError),
    #[error("JSON解析失败：{0}")]
    Json(#[from] SerdeJsonError),
}

impl NavError {
    /// 是否可通过重试恢复
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, NavError::StaleLevel { .. } | NavError::Cancelled)
    }
}

// 全局Result类型
pub type NavResult<T> = Result<T, NavError>;
