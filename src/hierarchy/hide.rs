//! 隐藏处理
//! 1. hide_expression：表达式为真时丢弃节点（同时声明 hide_nodes_in_hierarchy 时改为拼接）
//! 2. hide_nodes_in_hierarchy：节点本身不显示，其子节点按原位置拼接进当前层级
//! 3. hide_if_no_children：无子节点时丢弃（子节点提示为 Always 时跳过判定）
//! 4. hide_if_only_one_child：只有一个子节点时由该子节点替代
use std::collections::BTreeMap;
use std::sync::Arc;

use rsnavtree_engine::{ChildrenHint, Value};

use crate::collab::{evaluate_condition, ExpressionContext};
use crate::error::NavResult;

use super::builder::Want;
use super::grouping_adapter::Piece;
use super::record::{NodeHandle, NodeRecord};
use super::{LevelBuilder, CHILDREN_ARTIFACTS_MARKER};

impl<'a> LevelBuilder<'a> {
    /// 对已入库的节点应用隐藏标志；None 表示节点被丢弃
    pub(crate) async fn apply_hide(
        self,
        handle: NodeHandle,
        parent_chain: &[Arc<NodeRecord>],
    ) -> NavResult<Option<Piece>> {
        let record = self.combo.arena.get(handle)?;
        let Some(spec) = record.specification.clone() else {
            return Ok(Some(Piece::Node { handle, record }));
        };

        if let Some(expression) = spec.hide_expression.as_deref() {
            let children_artifacts = if expression.contains(CHILDREN_ARTIFACTS_MARKER) {
                Some(self.children_artifacts(handle).await?)
            } else {
                None
            };
            let context = ExpressionContext {
                this_node: Some(record.clone()),
                parent_chain: parent_chain.to_vec(),
                variables: self.combo.variables.clone(),
                children_artifacts,
            };
            self.check_cancel()?;
            if evaluate_condition(self.services.evaluator.as_ref(), expression, &context).await
                && !record.hidden
            {
                log::trace!("Node {} hidden by expression", record.node.key);
                return Ok(None);
            }
        }

        if record.hidden {
            let children = self.full_level(Some(handle)).await?;
            log::trace!(
                "Hidden node {} splices {} children",
                record.node.key,
                children.len()
            );
            return Ok(Some(Piece::Splice(children)));
        }

        if spec.hide_if_no_children
            && record.node.children_hint != ChildrenHint::Always
            && !self.has_children(handle).await?
        {
            return Ok(None);
        }

        if spec.hide_if_only_one_child && !record.guard.is_terminated() {
            let level = self.level_of(Some(handle))?;
            let snapshot = self.ensure(level, Want::Beyond(1)).await?;
            if snapshot.complete && snapshot.nodes.len() == 1 {
                return Ok(Some(Piece::Splice(snapshot.nodes)));
            }
        }

        Ok(Some(Piece::Node { handle, record }))
    }

    /// 子节点产物：完整物化子层级，收集各节点（含分组成员）的产物
    pub(crate) async fn children_artifacts(self, handle: NodeHandle) -> NavResult<Vec<BTreeMap<String, Value>>> {
        let mut pending = self.full_level(Some(handle)).await?;
        pending.reverse();
        let mut artifacts = Vec::new();
        while let Some(child) = pending.pop() {
            let record = self.combo.arena.get(child)?;
            if record.is_grouping() {
                pending.extend(record.group_children.iter().rev().copied());
            } else if !record.artifacts.is_empty() {
                artifacts.push(record.artifacts.clone());
            }
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rsnavtree_engine::{
        ChildrenHint, CustomizationKind, CustomizationRule, NavigationRule, RuleSet, Value,
    };

    use crate::testing::{children, classes_spec, labels, manager, related_spec, InMemoryStore, ScriptedEvaluator};

    fn folders_store() -> InMemoryStore {
        InMemoryStore::new()
            .with_instance("F", 1, "f1")
            .with_instance("F", 2, "f2")
            .with_instance("F", 3, "f3")
            .with_instance("E", 1, "x-ray")
            .with_instance("E", 2, "plain")
            .with_instance("E", 3, "other")
            .relate("contains", ("F", 1), ("E", 1))
            .relate("contains", ("F", 2), ("E", 2))
            .relate("contains", ("F", 2), ("E", 3))
    }

    fn folders_ruleset(folders: rsnavtree_engine::ChildNodeSpecification) -> RuleSet {
        let mut contents = related_spec("contents", "contains");
        contents.group_by_label = false;
        RuleSet::new("rs")
            .with_root_rule(NavigationRule::new().with_specification(folders))
            .with_child_rule(NavigationRule::new().with_specification(contents))
    }

    fn folders(configure: impl FnOnce(&mut rsnavtree_engine::ChildNodeSpecification)) -> rsnavtree_engine::ChildNodeSpecification {
        let mut spec = classes_spec("folders", &["F"]);
        spec.group_by_label = false;
        configure(&mut spec);
        spec
    }

    #[tokio::test]
    async fn test_hide_if_no_children() {
        let spec = folders(|s| s.hide_if_no_children = true);
        let (m, _) = manager(folders_store(), ScriptedEvaluator::new(), vec![folders_ruleset(spec)]);
        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["f1", "f2"]);
        assert!(roots.iter().all(|n| n.has_children == Some(true)));
    }

    #[tokio::test]
    async fn test_children_hint_always_skips_child_check() {
        let spec = folders(|s| {
            s.hide_if_no_children = true;
            s.children_hint = ChildrenHint::Always;
        });
        let (m, _) = manager(folders_store(), ScriptedEvaluator::new(), vec![folders_ruleset(spec)]);
        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["f1", "f2", "f3"]);
        assert_eq!(roots[2].has_children, Some(true));
    }

    #[tokio::test]
    async fn test_hide_if_only_one_child_replaces_node() {
        let spec = folders(|s| s.hide_if_only_one_child = true);
        let (m, _) = manager(folders_store(), ScriptedEvaluator::new(), vec![folders_ruleset(spec)]);
        let roots = children(&m, "rs", None).await;
        // f1 只有一个子节点，由该子节点替代；f3 没有子节点，保持原样
        assert_eq!(labels(&roots), vec!["x-ray", "f2", "f3"]);
        assert_eq!(roots[0].key.specification_id, "contents");
        assert_eq!(labels(&children(&m, "rs", Some(&roots[1])).await), vec!["other", "plain"]);
        assert_eq!(roots[2].has_children, Some(false));
    }

    #[tokio::test]
    async fn test_hidden_nodes_splice_children() {
        let spec = folders(|s| s.hide_nodes_in_hierarchy = true);
        let (m, _) = manager(folders_store(), ScriptedEvaluator::new(), vec![folders_ruleset(spec)]);
        let roots = children(&m, "rs", None).await;
        // 拼接的子节点保持各隐藏父节点的位置顺序
        assert_eq!(labels(&roots), vec!["x-ray", "other", "plain"]);
        assert!(roots.iter().all(|n| n.key.path.is_empty()));
    }

    #[tokio::test]
    async fn test_hide_expression_drops_node() {
        let evaluator = ScriptedEvaluator::new().with("is_f2", |ctx| {
            Ok(Value::Bool(
                ctx.this_node.as_ref().map_or(false, |n| n.node().display_label() == "f2"),
            ))
        });
        let spec = folders(|s| s.hide_expression = Some("is_f2".into()));
        let (m, _) = manager(folders_store(), evaluator, vec![folders_ruleset(spec)]);
        assert_eq!(labels(&children(&m, "rs", None).await), vec!["f1", "f3"]);
    }

    #[tokio::test]
    async fn test_hide_expression_sees_children_artifacts() {
        let evaluator = ScriptedEvaluator::new()
            .with("is_flagged", |ctx| {
                Ok(Value::Bool(
                    ctx.this_node
                        .as_ref()
                        .map_or(false, |n| n.node().display_label().starts_with('x')),
                ))
            })
            .with("!ChildrenArtifacts.any(flagged)", |ctx| {
                let flagged = ctx.children_artifacts.as_ref().map_or(false, |all| {
                    all.iter().any(|a| a.get("flagged") == Some(&Value::Bool(true)))
                });
                Ok(Value::Bool(!flagged))
            });
        let spec = folders(|s| s.hide_expression = Some("!ChildrenArtifacts.any(flagged)".into()));
        let mut items = BTreeMap::new();
        items.insert("flagged".to_string(), "is_flagged".to_string());
        let ruleset = folders_ruleset(spec)
            .with_customization(CustomizationRule::new(CustomizationKind::NodeArtifacts { items }));
        let (m, _) = manager(folders_store(), evaluator, vec![ruleset]);
        assert_eq!(labels(&children(&m, "rs", None).await), vec!["f1"]);
    }

    #[tokio::test]
    async fn test_failing_hide_expression_keeps_node() {
        let spec = folders(|s| s.hide_expression = Some("unknown(".into()));
        let (m, _) = manager(folders_store(), ScriptedEvaluator::new(), vec![folders_ruleset(spec)]);
        assert_eq!(labels(&children(&m, "rs", None).await), vec!["f1", "f2", "f3"]);
    }
}
