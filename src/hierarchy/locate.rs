//! 节点定位
//! 调用方持有的节点Key在缓存失效或被淘汰后，沿可见祖先路径从根重新定位
use rsnavtree_engine::NodeKey;

use crate::error::{NavError, NavResult};

use super::builder::Want;
use super::record::NodeHandle;
use super::LevelBuilder;

impl<'a> LevelBuilder<'a> {
    /// 定位节点
    /// 1. 已物化节点直接按Key索引命中
    /// 2. 否则从根逐级物化路径上的祖先；路径中找不到的祖先（被唯一子节点替代的节点）跳过
    pub(crate) async fn locate(self, key: &NodeKey) -> NavResult<NodeHandle> {
        if let Some(handle) = self.combo.find_by_key(key) {
            return Ok(handle);
        }

        let mut parent: Option<NodeHandle> = None;
        for hash in &key.path {
            self.check_cancel()?;
            match self.search_level(parent, |k| k.hash == *hash).await? {
                Some(found) => parent = Some(found),
                None => log::trace!("Ancestor {:016x} not found on path, skipping", hash),
            }
        }

        self.search_level(parent, |k| k == key)
            .await?
            .ok_or_else(|| NavError::NodeNotFound(key.to_string()))
    }

    /// 在父节点的子层级（含分组子树）中查找节点
    async fn search_level<F>(self, parent: Option<NodeHandle>, matches: F) -> NavResult<Option<NodeHandle>>
    where
        F: Fn(&NodeKey) -> bool + Send,
    {
        let (mut pending, _) = self.child_handles(parent, Want::All).await?;
        pending.reverse();
        while let Some(handle) = pending.pop() {
            let record = self.combo.arena.get(handle)?;
            if matches(&record.node.key) {
                return Ok(Some(handle));
            }
            if record.is_grouping() {
                pending.extend(record.group_children.iter().rev().copied());
            }
        }
        Ok(None)
    }
}
