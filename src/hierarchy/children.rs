//! 子节点判定
use rsnavtree_engine::{ChildrenHint, NavNode};

use crate::error::NavResult;

use super::builder::Want;
use super::record::NodeHandle;
use super::{BoxFuture, LevelBuilder};

impl<'a> LevelBuilder<'a> {
    /// 节点是否有子节点
    /// 1. 递归守卫终止的节点没有子节点
    /// 2. 分组节点看成员是否为空
    /// 3. 子节点提示 Always/Never 直接决定
    /// 4. 否则物化子层级的第一个节点，结果缓存
    pub(crate) fn has_children(self, handle: NodeHandle) -> BoxFuture<'a, NavResult<bool>> {
        Box::pin(async move {
            let record = self.combo.arena.get(handle)?;
            if record.guard.is_terminated() {
                return Ok(false);
            }
            if record.is_grouping() {
                return Ok(!record.group_children.is_empty());
            }
            match record.node.children_hint {
                ChildrenHint::Always => return Ok(true),
                ChildrenHint::Never => return Ok(false),
                ChildrenHint::Unknown => {}
            }
            if let Some(flag) = self.combo.children_flag(handle) {
                return Ok(flag);
            }

            let level = self.level_of(Some(handle))?;
            let snapshot = self.ensure(level, Want::Beyond(0)).await?;
            let flag = !snapshot.nodes.is_empty();
            self.combo.set_children_flag(handle, flag);
            Ok(flag)
        })
    }

    /// 已判定的子节点标志（不触发构建）
    pub(crate) fn known_children(self, handle: NodeHandle) -> NavResult<Option<bool>> {
        let record = self.combo.arena.get(handle)?;
        if record.guard.is_terminated() {
            return Ok(Some(false));
        }
        if record.is_grouping() {
            return Ok(Some(!record.group_children.is_empty()));
        }
        Ok(match record.node.children_hint {
            ChildrenHint::Always => Some(true),
            ChildrenHint::Never => Some(false),
            ChildrenHint::Unknown => self.combo.children_flag(handle),
        })
    }

    /// 发布节点视图：按配置判定 has_children
    pub(crate) async fn publish(self, handles: &[NodeHandle]) -> NavResult<Vec<NavNode>> {
        let mut nodes = Vec::with_capacity(handles.len());
        for handle in handles {
            let record = self.combo.arena.get(*handle)?;
            let mut node = record.node.clone();
            node.has_children = if self.services.config.determine_children_on_page {
                Some(self.has_children(*handle).await?)
            } else {
                self.known_children(*handle)?
            };
            nodes.push(node);
        }
        Ok(nodes)
    }

    /// 父节点的直接子节点（分组节点取成员，其余取子层级）
    pub(crate) async fn child_handles(self, parent: Option<NodeHandle>, want: Want) -> NavResult<(Vec<NodeHandle>, bool)> {
        if let Some(handle) = parent {
            let record = self.combo.arena.get(handle)?;
            if record.is_grouping() {
                return Ok((record.group_children.clone(), true));
            }
            if record.guard.is_terminated() {
                return Ok((Vec::new(), true));
            }
        }
        let level = self.level_of(parent)?;
        let snapshot = self.ensure(level, want).await?;
        Ok((snapshot.nodes, snapshot.complete))
    }

    /// 父节点的子节点总数
    pub(crate) async fn count_children(self, parent: Option<NodeHandle>) -> NavResult<usize> {
        if let Some(handle) = parent {
            let record = self.combo.arena.get(handle)?;
            if record.is_grouping() {
                return Ok(record.group_children.len());
            }
            if record.guard.is_terminated() {
                return Ok(0);
            }
        }
        let level = self.level_of(parent)?;
        self.count(level).await
    }
}
