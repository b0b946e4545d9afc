//! 递归守卫
//! 按（规格ID，过滤上下文签名）对祖先链做指纹比对，阻止同一规格在相同上下文下无限展开
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::NodeKey;

/// 祖先指纹
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AncestorFingerprint {
    pub specification_id: Arc<str>,
    pub filter_signature: u64,
}

impl AncestorFingerprint {
    pub fn of(key: &NodeKey) -> Self {
        Self {
            specification_id: Arc::from(key.specification_id.as_str()),
            filter_signature: key.filter_signature(),
        }
    }
}

/// 节点的守卫状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GuardState {
    /// 规格声明跳过检查，可无限递归
    Unguarded,
    /// 已记录指纹，允许正常判定子节点
    #[default]
    Guarded,
    /// 祖先中存在相似节点：节点照常显示，但子节点为空
    Terminated,
}

impl GuardState {
    #[inline]
    pub fn is_terminated(&self) -> bool {
        matches!(self, GuardState::Terminated)
    }

    /// 是否把指纹记录给后代
    #[inline]
    pub fn records_fingerprint(&self) -> bool {
        matches!(self, GuardState::Guarded)
    }
}

/// 递归守卫
pub struct RecursionGuard;

impl RecursionGuard {
    /// 判定新节点的守卫状态
    /// ancestors 为根到直接父节点的全部祖先指纹（含隐藏祖先），None 表示该祖先未记录指纹
    pub fn evaluate<'a, I>(suppress_check: bool, fingerprint: &AncestorFingerprint, ancestors: I) -> GuardState
    where
        I: IntoIterator<Item = Option<&'a AncestorFingerprint>>,
    {
        if suppress_check {
            return GuardState::Unguarded;
        }
        let similar = ancestors
            .into_iter()
            .flatten()
            .any(|ancestor| ancestor == fingerprint);
        if similar {
            log::trace!(
                "Similar ancestor found for specification {}, terminating expansion",
                fingerprint.specification_id
            );
            GuardState::Terminated
        } else {
            GuardState::Guarded
        }
    }
}
