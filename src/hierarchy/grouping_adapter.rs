//! 分组引擎适配：层级条目 <-> 内核分组结果
use std::sync::Arc;

use rsnavtree_engine::{GroupEntry, GroupNode, Groupable, InstanceKey, NavNode, NodeKey, NodeType, PropertyValue};

use crate::error::NavResult;

use super::level::PlanEntry;
use super::record::{NodeHandle, NodeRecord};
use super::{BoxFuture, LevelBuilder};

/// 规格产出的层级条目
#[derive(Debug, Clone)]
pub(crate) enum Piece {
    Node {
        handle: NodeHandle,
        record: Arc<NodeRecord>,
    },
    /// 隐藏节点拼接进来的子节点，不参与本层级分组
    Splice(Vec<NodeHandle>),
}

impl Groupable for Piece {
    fn is_groupable(&self) -> bool {
        match self {
            Piece::Node { record, .. } => record.node.key.node_type == NodeType::Instance,
            Piece::Splice(_) => false,
        }
    }

    fn instance_keys(&self) -> &[InstanceKey] {
        match self {
            Piece::Node { record, .. } => record.node.instance_keys(),
            Piece::Splice(_) => &[],
        }
    }

    fn class_name(&self) -> &str {
        match self {
            Piece::Node { record, .. } => record.instance().map_or("", |i| i.class_name()),
            Piece::Splice(_) => "",
        }
    }

    fn group_label(&self) -> &str {
        match self {
            Piece::Node { record, .. } => record.node.display_label(),
            Piece::Splice(_) => "",
        }
    }

    fn property(&self, name: &str) -> Option<&PropertyValue> {
        match self {
            Piece::Node { record, .. } => record.property(name),
            Piece::Splice(_) => None,
        }
    }
}

impl<'a> LevelBuilder<'a> {
    /// 分组结果入库，返回顶层句柄（分组成员保持原有Key）
    pub(crate) fn allocate_entries<'s>(
        self,
        entries: Vec<GroupEntry<Piece>>,
        entry: &'s PlanEntry,
        path: &'s [u64],
        parent_chain: &'s [Arc<NodeRecord>],
    ) -> BoxFuture<'s, NavResult<Vec<NodeHandle>>>
    where
        'a: 's,
    {
        Box::pin(async move {
            let mut output = Vec::with_capacity(entries.len());
            for item in entries {
                match item {
                    GroupEntry::Item(Piece::Node { handle, .. }) => output.push(handle),
                    GroupEntry::Item(Piece::Splice(handles)) => output.extend(handles),
                    GroupEntry::Group(group) => {
                        output.push(self.allocate_group(group, entry, path, parent_chain).await?);
                    }
                }
            }
            Ok(output)
        })
    }

    async fn allocate_group(
        self,
        group: GroupNode<Piece>,
        entry: &PlanEntry,
        path: &[u64],
        parent_chain: &[Arc<NodeRecord>],
    ) -> NavResult<NodeHandle> {
        let children = self
            .allocate_entries(group.children, entry, path, parent_chain)
            .await?;
        let key = NodeKey::new(
            group.node_type,
            entry.specification.id.as_str(),
            group.grouped_keys,
            Some(group.discriminator),
            path.to_vec(),
        );
        let mut node = NavNode::new(key, group.label);
        node.image_id = group.image_id;

        let mut record = NodeRecord::new(
            node,
            None,
            Some(entry.specification.clone()),
            entry.lineage.clone(),
        );
        record.group_children = children;
        self.customize(&mut record, parent_chain).await?;
        Ok(self.combo.insert(record))
    }
}
