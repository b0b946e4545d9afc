use std::sync::Arc;

use rsnavtree_engine::{
    preview_compact, ChildNodeSpecification, LabelDefinition, LabelValueSpec, SpecificationKind,
};

use crate::collab::{ExpressionContext, QueryRequest};
use crate::error::NavResult;
use crate::hierarchy::{BoxFuture, LevelBuilder};

impl<'a> LevelBuilder<'a> {
    /// 计算标签值；无结果（属性缺失、求值失败）返回 None，由下一个候选值接替
    pub(crate) fn label_value<'s>(
        self,
        spec: &'s LabelValueSpec,
        context: &'s ExpressionContext,
    ) -> BoxFuture<'s, NavResult<Option<LabelDefinition>>>
    where
        'a: 's,
    {
        Box::pin(async move {
            let this = context.this_node.as_deref();
            let instance = this.and_then(|n| n.instance());
            let label = match spec {
                LabelValueSpec::String { value } => Some(LabelDefinition::from_text(value.clone())),
                LabelValueSpec::Property { property } => this
                    .and_then(|n| n.property(property))
                    .filter(|v| !v.is_unspecified())
                    .map(|v| LabelDefinition {
                        display_value: v.display_value(),
                        ..LabelDefinition::from_value(v.raw.clone())
                    }),
                LabelValueSpec::RelatedInstanceProperty { path, property } => {
                    let Some(node) = this else {
                        return Ok(None);
                    };
                    if node.node().instance_keys().is_empty() {
                        return Ok(None);
                    }
                    let specification = ChildNodeSpecification::new(
                        format!("{}:label", node.specification_id().unwrap_or("custom")),
                        SpecificationKind::RelatedInstances {
                            paths: vec![path.clone()],
                        },
                    );
                    let request = QueryRequest {
                        specification: Arc::new(specification),
                        parent_instance_keys: node.node().instance_keys().to_vec(),
                        instance_filter: None,
                        variables: context.variables.clone(),
                    };
                    self.check_cancel()?;
                    match self.services.query.query(&request).await {
                        Ok(records) => records
                            .first()
                            .and_then(|r| r.property(property))
                            .filter(|v| !v.is_unspecified())
                            .map(|v| LabelDefinition::from_text(v.display_value())),
                        Err(e) => {
                            log::warn!("Related label property `{}` query failed: {}", property, e);
                            None
                        }
                    }
                }
                LabelValueSpec::Composite { parts, separator } => {
                    let mut texts: Vec<String> = Vec::with_capacity(parts.len());
                    for part in parts {
                        if let Some(label) = self.label_value(part, context).await? {
                            if !label.is_empty() {
                                texts.push(label.display_value);
                            }
                        }
                    }
                    (!texts.is_empty()).then(|| LabelDefinition::from_text(texts.join(separator)))
                }
                LabelValueSpec::Expression { expression } => {
                    self.check_cancel()?;
                    match self.services.evaluator.evaluate(expression, context).await {
                        Ok(value) if !value.is_unspecified() => Some(LabelDefinition::from_value(value)),
                        Ok(_) => None,
                        Err(e) => {
                            log::warn!(
                                "Label expression `{}` failed, keeping default label: {}",
                                preview_compact(expression, 80),
                                e
                            );
                            None
                        }
                    }
                }
                LabelValueSpec::ClassName => instance.map(|i| LabelDefinition::from_text(i.class_name())),
                LabelValueSpec::ClassLabel => {
                    instance.map(|i| LabelDefinition::from_text(self.services.schema.class_label(i.class_name())))
                }
                LabelValueSpec::InstanceId => instance.map(|i| LabelDefinition::from_text(i.key.id.to_string())),
            };
            Ok(label)
        })
    }
}
