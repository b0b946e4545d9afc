use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::keys::InstanceKey;
use super::node::LabelDefinition;
use super::value::PropertyValue;

/// 查询协作方返回的实例候选
/// label 为协作方计算的默认标签，标签覆盖规则在节点创建后应用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub key: InstanceKey,
    pub label: LabelDefinition,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl InstanceRecord {
    pub fn new(key: InstanceKey, label: impl Into<String>) -> Self {
        Self {
            key,
            label: LabelDefinition::from_text(label),
            properties: BTreeMap::new(),
        }
    }

    /// 链式设置属性
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[inline]
    pub fn class_name(&self) -> &str {
        &self.key.class_name
    }

    #[inline]
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}
