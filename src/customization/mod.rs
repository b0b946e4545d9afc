//! 节点定制流水线
//! 1. 标签/图标/样式/复选框互斥：按优先级降序，首个命中的规则生效
//! 2. 扩展数据/节点产物可叠加：无条件规则全部叠加，有条件规则只取首个命中者
//! 3. only_if_not_handled 的规则在同类定制已生效时跳过
//! 排序/分组规则作用于层级，在层级计划中处理
mod label;

use rustc_hash::FxHashSet;
use std::sync::Arc;

use rsnavtree_engine::{preview_compact, CheckboxState, CustomizationKind, NodeStyle};

use crate::collab::ExpressionContext;
use crate::error::NavResult;
use crate::hierarchy::{LevelBuilder, NodeRecord};

impl<'a> LevelBuilder<'a> {
    /// 对新建节点应用定制规则
    pub(crate) async fn customize(
        self,
        record: &mut NodeRecord,
        parent_chain: &[Arc<NodeRecord>],
    ) -> NavResult<()> {
        let rules = self.combo.bundle.customization_rules();
        if rules.iter().all(|r| r.kind.is_level_scoped()) {
            return Ok(());
        }

        let context = ExpressionContext {
            this_node: Some(Arc::new(record.clone())),
            parent_chain: parent_chain.to_vec(),
            ..ExpressionContext::new(self.combo.variables.clone())
        };
        let matcher = self.matcher();
        let mut handled: FxHashSet<&'static str> = FxHashSet::default();
        let mut conditioned_applied: FxHashSet<&'static str> = FxHashSet::default();

        for rule in rules {
            if rule.kind.is_level_scoped() {
                continue;
            }
            let kind = rule.kind.kind_name();
            let exclusive = rule.kind.is_exclusive();
            if (exclusive || rule.only_if_not_handled) && handled.contains(kind) {
                continue;
            }
            let conditioned = rule
                .condition
                .as_deref()
                .map_or(false, |c| !c.trim().is_empty());
            if !exclusive && conditioned && conditioned_applied.contains(kind) {
                continue;
            }
            if !matcher
                .condition_holds(rule.condition.as_deref(), &context)
                .await?
            {
                continue;
            }
            if self.apply_customization(&rule.kind, record, &context).await? {
                handled.insert(kind);
                if conditioned && !exclusive {
                    conditioned_applied.insert(kind);
                }
            }
        }
        Ok(())
    }

    /// 应用单条定制，返回是否生效
    async fn apply_customization(
        self,
        kind: &CustomizationKind,
        record: &mut NodeRecord,
        context: &ExpressionContext,
    ) -> NavResult<bool> {
        match kind {
            CustomizationKind::Label { values } => {
                for value in values {
                    if let Some(label) = self.label_value(value, context).await? {
                        if !label.is_empty() {
                            record.node.label = label;
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            CustomizationKind::ImageId { image_id } => {
                record.node.image_id = Some(image_id.clone());
                Ok(true)
            }
            CustomizationKind::Style {
                fore_color,
                back_color,
                font_style,
            } => {
                record.node.style = NodeStyle {
                    fore_color: fore_color.clone(),
                    back_color: back_color.clone(),
                    font_style: font_style.clone(),
                };
                Ok(true)
            }
            CustomizationKind::Checkbox {
                property,
                invert,
                default_value,
                is_enabled,
            } => {
                let checked = property
                    .as_deref()
                    .and_then(|name| record.property(name))
                    .and_then(|value| value.raw.as_bool())
                    .map(|value| value != *invert)
                    .unwrap_or(*default_value);
                record.node.checkbox = Some(CheckboxState {
                    visible: true,
                    enabled: *is_enabled,
                    checked,
                });
                Ok(true)
            }
            CustomizationKind::ExtendedData { items } => {
                for (name, expression) in items {
                    self.check_cancel()?;
                    match self.services.evaluator.evaluate(expression, context).await {
                        Ok(value) => {
                            record.node.extended_data.insert(name.clone(), value);
                        }
                        Err(e) => log::warn!(
                            "Extended data `{}` expression `{}` failed: {}",
                            name,
                            preview_compact(expression, 80),
                            e
                        ),
                    }
                }
                Ok(true)
            }
            CustomizationKind::NodeArtifacts { items } => {
                for (name, expression) in items {
                    self.check_cancel()?;
                    match self.services.evaluator.evaluate(expression, context).await {
                        Ok(value) => {
                            record.artifacts.insert(name.clone(), value);
                        }
                        Err(e) => log::warn!(
                            "Node artifact `{}` expression `{}` failed: {}",
                            name,
                            preview_compact(expression, 80),
                            e
                        ),
                    }
                }
                Ok(true)
            }
            CustomizationKind::Sorting(_) | CustomizationKind::Grouping(_) => Ok(false),
        }
    }
}
