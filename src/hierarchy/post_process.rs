//! 层级后处理（仅可见层级，完整物化后执行）
//! 1. 同标签合并：跨规格、跨隐藏分支的同标签兄弟节点合并为一个节点
//! 2. 单个标签分组展开：层级只有一个标签分组节点时显示其成员
//! 3. 层级排序：显式的层级排序规则对整个层级重新排序
use rsnavtree_engine::{merge_same_label, sort_with_rules, InstanceKey, NodeKey, NodeType};

use crate::error::NavResult;

use super::level::LevelPlan;
use super::record::{HandleRecord, NodeHandle, NodeRecord};
use super::LevelBuilder;

/// 合并候选
struct MergeItem {
    head: HandleRecord,
    contributors: Vec<NodeHandle>,
    keys: Vec<InstanceKey>,
}

impl<'a> LevelBuilder<'a> {
    pub(crate) fn post_process(self, plan: &LevelPlan, nodes: Vec<NodeHandle>) -> NavResult<Vec<NodeHandle>> {
        let mut nodes = nodes;
        if !plan.same_label_classes.is_empty() {
            nodes = self.merge_level_same_label(plan, nodes)?;
        }
        nodes = self.unwrap_single_label_group(nodes)?;
        if let Some(rule) = &plan.level_sort {
            let items: Vec<HandleRecord> = self
                .combo
                .arena
                .get_many(&nodes)?
                .into_iter()
                .zip(nodes.iter().copied())
                .map(|(record, handle)| HandleRecord { handle, record })
                .collect();
            nodes = sort_with_rules(items, &[rule], &self.hierarchy())
                .into_iter()
                .map(|item| item.handle)
                .collect();
        }
        Ok(nodes)
    }

    /// 同标签合并：合并节点位于首个贡献者的位置，子节点由各贡献者共同提供（延迟判定）
    fn merge_level_same_label(self, plan: &LevelPlan, nodes: Vec<NodeHandle>) -> NavResult<Vec<NodeHandle>> {
        let hierarchy = self.hierarchy();
        let records = self.combo.arena.get_many(&nodes)?;
        let items: Vec<MergeItem> = records
            .into_iter()
            .zip(nodes.iter().copied())
            .map(|(record, handle)| MergeItem {
                keys: record.node.key.instance_keys.clone(),
                contributors: vec![handle],
                head: HandleRecord { handle, record },
            })
            .collect();

        let merged = merge_same_label(
            items,
            |item| {
                let record = &item.head.record;
                if record.is_grouping() {
                    return None;
                }
                let class = record.instance()?.class_name();
                plan.same_label_classes
                    .iter()
                    .any(|c| c.matches(class, &hierarchy))
                    .then(|| record.node.display_label().to_string())
            },
            |into, from| {
                into.contributors.extend(from.contributors);
                for key in from.keys {
                    if !into.keys.contains(&key) {
                        into.keys.push(key);
                    }
                }
            },
        );

        let mut output = Vec::with_capacity(merged.len());
        for item in merged {
            if item.contributors.len() == 1 {
                output.push(item.head.handle);
                continue;
            }
            output.push(self.allocate_merged(item));
        }
        Ok(output)
    }

    fn allocate_merged(self, item: MergeItem) -> NodeHandle {
        let first: &NodeRecord = &item.head.record;
        log::debug!(
            "Merging {} same-label nodes `{}`",
            item.contributors.len(),
            first.node.display_label()
        );
        let mut node = first.node.clone();
        node.key = NodeKey::new(
            NodeType::Instance,
            first.node.key.specification_id.as_str(),
            item.keys,
            None,
            first.node.key.path.clone(),
        );
        node.has_children = None;

        let mut record = NodeRecord::new(
            node,
            first.instance.clone(),
            first.specification.clone(),
            first.lineage.clone(),
        );
        record.hidden = false;
        record.artifacts = first.artifacts.clone();
        record.merged_from = item.contributors;
        self.combo.insert(record)
    }

    fn unwrap_single_label_group(self, nodes: Vec<NodeHandle>) -> NavResult<Vec<NodeHandle>> {
        if nodes.len() != 1 {
            return Ok(nodes);
        }
        let record = self.combo.arena.get(nodes[0])?;
        if record.node.key.node_type == NodeType::LabelGrouping {
            log::trace!("Unwrapping single label group `{}`", record.node.display_label());
            return Ok(record.group_children.clone());
        }
        Ok(nodes)
    }
}
