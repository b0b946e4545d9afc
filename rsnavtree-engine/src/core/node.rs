use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::keys::{InstanceKey, NodeKey, NodeType};
use super::value::Value;

/// 显示标签定义：原始值 + 格式化字符串 + 值类型名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LabelDefinition {
    pub raw_value: Value,
    pub display_value: String,
    pub type_name: String,
}

impl LabelDefinition {
    /// 纯字符串标签
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw_value: Value::String(text.clone()),
            display_value: text,
            type_name: "string".to_string(),
        }
    }

    /// 由值构建标签（显示值按统一规则格式化）
    pub fn from_value(value: Value) -> Self {
        let type_name = match &value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Point2d { .. } => "point2d",
            Value::Point3d { .. } => "point3d",
            Value::IntList(_) => "int[]",
        };
        Self {
            display_value: value.to_display_string(),
            raw_value: value,
            type_name: type_name.to_string(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.display_value.is_empty()
    }
}

/// 子节点提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChildrenHint {
    #[default]
    Unknown,
    /// 保证有子节点，跳过子节点判定
    Always,
    /// 保证无子节点
    Never,
}

/// 节点样式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fore_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
}

impl NodeStyle {
    pub fn is_empty(&self) -> bool {
        self.fore_color.is_none() && self.back_color.is_none() && self.font_style.is_none()
    }
}

/// 复选框状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckboxState {
    pub visible: bool,
    pub enabled: bool,
    pub checked: bool,
}

/// 导航节点（对调用方只读）
/// 发布后不可变；重新查询时重新推导而非原地修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavNode {
    pub key: NodeKey,
    pub label: LabelDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "NodeStyle::is_empty")]
    pub style: NodeStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkbox: Option<CheckboxState>,
    #[serde(default)]
    pub children_hint: ChildrenHint,
    /// 子节点判定结果；None 表示尚未判定
    #[serde(default)]
    pub has_children: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended_data: BTreeMap<String, Value>,
    /// 分组节点所含实例数（非分组节点为 None）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_instances_count: Option<usize>,
}

impl NavNode {
    pub fn new(key: NodeKey, label: LabelDefinition) -> Self {
        let grouped_instances_count = key
            .node_type
            .is_grouping()
            .then(|| key.instance_keys.len());
        Self {
            key,
            label,
            description: None,
            image_id: None,
            style: NodeStyle::default(),
            checkbox: None,
            children_hint: ChildrenHint::Unknown,
            has_children: None,
            extended_data: BTreeMap::new(),
            grouped_instances_count,
        }
    }

    #[inline]
    pub fn node_type(&self) -> &NodeType {
        &self.key.node_type
    }

    #[inline]
    pub fn instance_keys(&self) -> &[InstanceKey] {
        &self.key.instance_keys
    }

    #[inline]
    pub fn is_grouping(&self) -> bool {
        self.key.node_type.is_grouping()
    }

    #[inline]
    pub fn display_label(&self) -> &str {
        &self.label.display_value
    }

    /// 子节点是否已判定
    #[inline]
    pub fn determined_children(&self) -> bool {
        self.has_children.is_some()
    }
}
