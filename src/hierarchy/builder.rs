use std::sync::Arc;
use std::time::Instant;

use rsnavtree_engine::{
    BaseClassGroup, ClassGrouping, CustomizationKind, GroupSpec, GroupingPlan, GroupingRule,
    PropertyGrouping, SameLabelStage, SortScope, SortingRule, SpecificationRef,
};

use crate::error::{NavError, NavResult};
use crate::matcher::RuleScope;

use super::level::{HierarchyLevel, LevelPlan, LevelSnapshot, LevelState, PlanEntry};
use super::record::{NodeHandle, NodeRecord};
use super::{BoxFuture, LevelBuilder};

/// 物化目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Want {
    /// 至少物化到 n+1 个节点（可判断是否还有更多）
    Beyond(usize),
    All,
}

/// 对某个父节点生效的层级定制（排序/分组），条件针对父节点求值
#[derive(Debug, Default)]
struct LevelCustomizations {
    grouping: Vec<GroupingRule>,
    sorting: Vec<SortingRule>,
}

impl<'a> LevelBuilder<'a> {
    // ===================== 层级获取 =====================

    /// 取父节点的子层级（隐藏父节点的层级只用于拼接）
    pub(crate) fn level_of(self, parent: Option<NodeHandle>) -> NavResult<Arc<HierarchyLevel>> {
        let splice = match parent {
            Some(handle) => self.combo.arena.get(handle)?.hidden,
            None => false,
        };
        Ok(self.combo.level(parent, splice))
    }

    /// 物化层级并返回快照
    pub(crate) fn ensure(self, level: Arc<HierarchyLevel>, want: Want) -> BoxFuture<'a, NavResult<LevelSnapshot>> {
        Box::pin(async move {
            let mut state = level.state.lock().await;
            self.materialize(&level, &mut state, want).await?;
            Ok(LevelSnapshot {
                nodes: state.nodes.clone(),
                complete: state.complete,
            })
        })
    }

    /// 完整物化父节点的子层级
    pub(crate) async fn full_level(self, parent: Option<NodeHandle>) -> NavResult<Vec<NodeHandle>> {
        let level = self.level_of(parent)?;
        Ok(self.ensure(level, Want::All).await?.nodes)
    }

    /// 层级总数：优先复用缓存；计划允许时走轻量计数，否则完整物化
    pub(crate) async fn count(self, level: Arc<HierarchyLevel>) -> NavResult<usize> {
        let mut state = level.state.lock().await;
        if let Some(total) = state.total {
            return Ok(total);
        }
        if state.complete {
            state.total = Some(state.nodes.len());
            return Ok(state.nodes.len());
        }

        let plan = self.plan_for(&level, &mut state).await?;
        if !level.splice && plan.is_countable() {
            let mut total = 0;
            for entry in &plan.entries {
                total += self.count_entry(entry).await?;
            }
            self.combo.ensure_fresh()?;
            log::debug!("Counted level of {:?} without materializing: {}", level.parent, total);
            state.total = Some(total);
            return Ok(total);
        }

        self.materialize(&level, &mut state, Want::All).await?;
        let total = state.nodes.len();
        state.total = Some(total);
        Ok(total)
    }

    // ===================== 物化 =====================

    async fn plan_for(self, level: &HierarchyLevel, state: &mut LevelState) -> NavResult<Arc<LevelPlan>> {
        if let Some(plan) = &state.plan {
            return Ok(plan.clone());
        }
        let plan = Arc::new(self.plan_level(level.parent).await?);
        log::debug!(
            "Planned level of {:?}: {} specifications, deferred: {}",
            level.parent,
            plan.entries.len(),
            plan.is_deferred()
        );
        state.plan = Some(plan.clone());
        Ok(plan)
    }

    /// 逐规格物化，直到满足目标或层级完成
    /// 仅有一个标签分组节点时继续物化，以便完成后展开该分组
    async fn materialize(self, level: &HierarchyLevel, state: &mut LevelState, want: Want) -> NavResult<()> {
        self.combo.ensure_fresh()?;
        let plan = self.plan_for(level, state).await?;
        let target = match want {
            Want::Beyond(n) if !(plan.is_deferred() && !level.splice) => n,
            _ => usize::MAX,
        };
        let started = Instant::now();
        let before = state.nodes.len();

        while !state.complete && (state.nodes.len() <= target || self.awaiting_unwrap(level, state)?) {
            self.check_cancel()?;
            if state.next_entry >= plan.entries.len() {
                state.complete = true;
                break;
            }
            let produced = self.build_entry(plan.clone(), state.next_entry).await?;
            let mut committed = Vec::with_capacity(produced.len());
            for handle in produced {
                let hash = self.combo.arena.get(handle)?.node.key.hash;
                if state.seen.insert(hash) {
                    committed.push(handle);
                }
            }
            self.combo.commit_keys(&committed)?;
            state.nodes.extend(committed);
            state.next_entry += 1;
        }

        if state.complete && !state.finalized {
            if !level.splice {
                let nodes = std::mem::take(&mut state.nodes);
                state.nodes = self.post_process(&plan, nodes)?;
                self.combo.commit_keys(&state.nodes)?;
            }
            if let Some(total) = state.total {
                if total != state.nodes.len() {
                    log::warn!(
                        "Cached count {} of level {:?} differs from materialized size {}, correcting",
                        total,
                        level.parent,
                        state.nodes.len()
                    );
                }
            }
            state.total = Some(state.nodes.len());
            state.finalized = true;
        }

        if self.services.config.log_timings && state.nodes.len() != before {
            log::info!(
                "Level of {:?} materialized {} -> {} nodes in {:?}",
                level.parent,
                before,
                state.nodes.len(),
                started.elapsed()
            );
        }
        self.combo.ensure_fresh()
    }

    /// 可见层级当前只有一个标签分组节点
    fn awaiting_unwrap(self, level: &HierarchyLevel, state: &LevelState) -> NavResult<bool> {
        if level.splice || state.nodes.len() != 1 {
            return Ok(false);
        }
        let record = self.combo.arena.get(state.nodes[0])?;
        Ok(record.node.key.node_type == rsnavtree_engine::NodeType::LabelGrouping)
    }

    /// 构建单个规格的产出：草稿 -> 入库 -> 隐藏处理 -> 分组
    /// 返回层级顶层句柄（含分组节点与拼接的子节点）
    fn build_entry(self, plan: Arc<LevelPlan>, index: usize) -> BoxFuture<'a, NavResult<Vec<NodeHandle>>> {
        Box::pin(async move {
            let entry = plan
                .entries
                .get(index)
                .ok_or(rsnavtree_engine::CoreError::InvariantViolation("plan entry out of range"))?;
            let parent_chain = self.parent_chain(entry)?;
            let drafts = self.create_drafts(entry, &plan.path, &parent_chain).await?;
            log::trace!(
                "Specification `{}` produced {} nodes",
                entry.specification.id,
                drafts.len()
            );

            let mut pieces = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let handle = self.combo.insert(draft);
                if let Some(piece) = self.apply_hide(handle, &parent_chain).await? {
                    pieces.push(piece);
                }
            }

            let grouped = rsnavtree_engine::group_items(pieces, &entry.grouping, &self.hierarchy());
            self.allocate_entries(grouped, entry, &plan.path, &parent_chain).await
        })
    }

    // ===================== 计划 =====================

    /// 匹配规则，生成层级计划
    async fn plan_level(self, parent: Option<NodeHandle>) -> NavResult<LevelPlan> {
        let (path, sources): (Vec<u64>, Vec<Option<NodeHandle>>) = match parent {
            None => (Vec::new(), vec![None]),
            Some(handle) => {
                let record = self.combo.arena.get(handle)?;
                if record.is_grouping() {
                    return Err(NavError::InvalidRequest(
                        "grouping nodes have no rule-built children".to_string(),
                    ));
                }
                let path = if record.hidden {
                    record.node.key.path.clone()
                } else {
                    record.node.key.child_path()
                };
                let sources = if record.merged_from.is_empty() {
                    vec![Some(handle)]
                } else {
                    record.merged_from.iter().copied().map(Some).collect()
                };
                (path, sources)
            }
        };

        let mut plan = LevelPlan {
            path,
            ..LevelPlan::default()
        };

        for source in sources {
            let (lineage, chain, source_record) = match source {
                None => (Arc::from(Vec::new()), Vec::new(), None),
                Some(handle) => {
                    let record = self.combo.arena.get(handle)?;
                    if record.guard.is_terminated() {
                        log::trace!("Node {} is terminated by the recursion guard", record.node.key);
                        continue;
                    }
                    let mut lineage: Vec<NodeHandle> = record.lineage.to_vec();
                    lineage.push(handle);
                    let mut chain = self.ancestors(&lineage)?;
                    chain.reverse();
                    (Arc::<[NodeHandle]>::from(lineage), chain, Some(record))
                }
            };

            let scope = if source.is_none() {
                RuleScope::Root
            } else {
                RuleScope::Children
            };
            let nested = source_record
                .as_ref()
                .and_then(|r| r.specification.as_ref())
                .map(|s| s.nested_rules.as_slice())
                .unwrap_or(&[]);
            let specs = self
                .matcher()
                .match_specifications(scope, &chain, nested)
                .await?;
            if specs.is_empty() {
                continue;
            }

            let customizations = self.level_customizations(&chain).await?;
            for rule in &customizations.sorting {
                if rule.scope == SortScope::Level && plan.level_sort.is_none() {
                    plan.level_sort = Some(rule.clone());
                }
            }
            for rule in &customizations.grouping {
                for group in &rule.groups {
                    if let GroupSpec::SameLabelInstance {
                        stage: SameLabelStage::PostProcess,
                    } = group
                    {
                        if !plan.same_label_classes.contains(&rule.class) {
                            plan.same_label_classes.push(rule.class.clone());
                        }
                    }
                }
            }

            for spec in specs {
                plan.entries.push(self.plan_entry(lineage.clone(), spec, &customizations));
            }
        }
        Ok(plan)
    }

    /// 针对父节点匹配排序/分组定制
    async fn level_customizations(self, parent_chain: &[Arc<NodeRecord>]) -> NavResult<LevelCustomizations> {
        let matcher = self.matcher();
        let context = matcher.parent_context(parent_chain);
        let mut output = LevelCustomizations::default();
        for rule in self.combo.bundle.customization_rules() {
            if !rule.kind.is_level_scoped() {
                continue;
            }
            if !matcher.condition_holds(rule.condition.as_deref(), &context).await? {
                continue;
            }
            match &rule.kind {
                CustomizationKind::Sorting(sorting) => output.sorting.push(sorting.clone()),
                CustomizationKind::Grouping(grouping) => output.grouping.push(grouping.clone()),
                _ => {}
            }
        }
        Ok(output)
    }

    fn plan_entry(
        self,
        lineage: Arc<[NodeHandle]>,
        spec: SpecificationRef,
        customizations: &LevelCustomizations,
    ) -> PlanEntry {
        let mut grouping = GroupingPlan {
            class: ClassGrouping {
                by_exact_class: spec.group_by_class,
                always_group: spec.always_group,
                base_classes: Vec::new(),
            },
            properties: Vec::new(),
            by_label: spec.group_by_label,
            sort_groups: !spec.do_not_sort,
        };
        let mut same_label_classes = Vec::new();

        for rule in &customizations.grouping {
            for group in &rule.groups {
                match group {
                    GroupSpec::Class {
                        base_class,
                        create_group_for_single_item,
                    } => grouping.class.base_classes.push(BaseClassGroup {
                        applies_to: rule.class.clone(),
                        base_class: base_class
                            .clone()
                            .unwrap_or_else(|| rule.class.class_name.clone()),
                        create_group_for_single_item: *create_group_for_single_item,
                    }),
                    GroupSpec::Property(property) => grouping.properties.push(PropertyGrouping {
                        applies_to: rule.class.clone(),
                        spec: property.clone(),
                    }),
                    GroupSpec::SameLabelInstance {
                        stage: SameLabelStage::Query,
                    } => same_label_classes.push(rule.class.clone()),
                    GroupSpec::SameLabelInstance {
                        stage: SameLabelStage::PostProcess,
                    } => {}
                }
            }
        }

        let sorting_rules = customizations
            .sorting
            .iter()
            .filter(|r| r.scope == SortScope::Specification)
            .cloned()
            .collect();

        PlanEntry {
            lineage,
            specification: spec,
            grouping,
            same_label_classes,
            sorting_rules,
        }
    }
}
