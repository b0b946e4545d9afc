//! 规格求值：向查询协作方请求候选实例，生成节点草稿
use rustc_hash::FxHashSet;
use std::sync::Arc;

use rsnavtree_engine::{
    merge_same_label, sort_with_rules, InstanceKey, InstanceRecord, LabelDefinition, NavNode,
    NodeKey, NodeType, RecursionGuard, SortingRule, SpecificationKind,
};

use crate::collab::QueryRequest;
use crate::error::NavResult;

use super::level::PlanEntry;
use super::record::NodeRecord;
use super::LevelBuilder;

impl<'a> LevelBuilder<'a> {
    /// 构造规格的查询请求
    fn query_request(self, entry: &PlanEntry, parent_chain: &[Arc<NodeRecord>]) -> QueryRequest {
        let parent_instance_keys = parent_chain
            .first()
            .map(|p| p.node.key.instance_keys.clone())
            .unwrap_or_default();
        QueryRequest {
            specification: entry.specification.clone(),
            parent_instance_keys,
            instance_filter: entry.specification.instance_filter.clone(),
            variables: self.combo.variables.clone(),
        }
    }

    /// 查询候选实例；查询失败时该规格贡献为空，不影响同层级的其他规格
    async fn query_instances(
        self,
        entry: &PlanEntry,
        parent_chain: &[Arc<NodeRecord>],
    ) -> NavResult<Vec<InstanceRecord>> {
        let request = self.query_request(entry, parent_chain);
        self.check_cancel()?;
        let records = match self.services.query.query(&request).await {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "Query for specification `{}` failed, contributing no nodes: {}",
                    entry.specification.id,
                    e
                );
                Vec::new()
            }
        };
        self.check_cancel()?;

        // 不同关系路径到达同一目标实例时只保留一次
        let mut seen: FxHashSet<InstanceKey> = FxHashSet::default();
        Ok(records
            .into_iter()
            .filter(|r| seen.insert(r.key.clone()))
            .collect())
    }

    /// 规格计数（仅用于可计数的计划）
    pub(crate) async fn count_entry(self, entry: &PlanEntry) -> NavResult<usize> {
        if let SpecificationKind::CustomNode { .. } = entry.specification.kind {
            return Ok(1);
        }
        let chain = self.parent_chain(entry)?;
        let request = self.query_request(entry, &chain);
        self.check_cancel()?;
        match self.services.query.count(&request).await {
            Ok(count) => Ok(count),
            Err(e) => {
                log::warn!(
                    "Count for specification `{}` failed, counting as empty: {}",
                    entry.specification.id,
                    e
                );
                Ok(0)
            }
        }
    }

    /// 规格所针对父节点的祖先链（最近的在前）
    pub(crate) fn parent_chain(self, entry: &PlanEntry) -> NavResult<Vec<Arc<NodeRecord>>> {
        let mut chain = self.ancestors(&entry.lineage)?;
        chain.reverse();
        Ok(chain)
    }

    /// 生成规格的节点草稿（已定制、已判定守卫状态、已排序，尚未入库）
    pub(crate) async fn create_drafts(
        self,
        entry: &PlanEntry,
        path: &[u64],
        parent_chain: &[Arc<NodeRecord>],
    ) -> NavResult<Vec<NodeRecord>> {
        let spec = &entry.specification;
        let mut drafts: Vec<NodeRecord> = match &spec.kind {
            SpecificationKind::CustomNode {
                node_type,
                label,
                description,
                image_id,
            } => {
                let key = NodeKey::new(
                    NodeType::Custom(node_type.clone()),
                    spec.id.as_str(),
                    Vec::new(),
                    None,
                    path.to_vec(),
                );
                let mut node = NavNode::new(key, LabelDefinition::from_text(label.clone()));
                node.description = description.clone();
                node.image_id = image_id.clone();
                vec![NodeRecord::new(node, None, Some(spec.clone()), entry.lineage.clone())]
            }
            _ => self
                .query_instances(entry, parent_chain)
                .await?
                .into_iter()
                .map(|instance| {
                    let key = NodeKey::new(
                        NodeType::Instance,
                        spec.id.as_str(),
                        vec![instance.key.clone()],
                        None,
                        path.to_vec(),
                    );
                    let node = NavNode::new(key, instance.label.clone());
                    NodeRecord::new(node, Some(Arc::new(instance)), Some(spec.clone()), entry.lineage.clone())
                })
                .collect(),
        };

        for draft in drafts.iter_mut() {
            draft.node.children_hint = spec.children_hint;
            self.customize(draft, parent_chain).await?;
        }

        if !entry.same_label_classes.is_empty() {
            drafts = self.merge_query_stage(entry, path, drafts);
        }

        // 递归守卫：扫描全部祖先（含隐藏祖先）的指纹
        for draft in drafts.iter_mut() {
            draft.guard = RecursionGuard::evaluate(
                spec.suppress_similar_ancestors_check,
                &draft.fingerprint,
                parent_chain.iter().map(|a| a.recorded_fingerprint()),
            );
        }

        if spec.do_not_sort {
            return Ok(drafts);
        }
        let rules: Vec<&SortingRule> = entry.sorting_rules.iter().collect();
        Ok(sort_with_rules(drafts, &rules, &self.hierarchy()))
    }

    /// 查询阶段同标签合并：同一规格内、指定类的同标签实例合并为一个实例节点
    fn merge_query_stage(self, entry: &PlanEntry, path: &[u64], drafts: Vec<NodeRecord>) -> Vec<NodeRecord> {
        let hierarchy = self.hierarchy();
        let mut merged = merge_same_label(
            drafts,
            |draft| {
                let class = draft.instance.as_ref()?.class_name();
                entry
                    .same_label_classes
                    .iter()
                    .any(|c| c.matches(class, &hierarchy))
                    .then(|| draft.node.display_label().to_string())
            },
            |into, from| {
                for key in from.node.key.instance_keys {
                    if !into.node.key.instance_keys.contains(&key) {
                        into.node.key.instance_keys.push(key);
                    }
                }
            },
        );
        for draft in merged.iter_mut() {
            if draft.node.key.instance_keys.len() > 1 {
                let keys = std::mem::take(&mut draft.node.key.instance_keys);
                draft.node.key = NodeKey::new(
                    NodeType::Instance,
                    entry.specification.id.as_str(),
                    keys,
                    None,
                    path.to_vec(),
                );
                draft.refresh_fingerprint();
            }
        }
        merged
    }
}
