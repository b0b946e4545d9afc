use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::{compare_values, Value};
use crate::error::{CoreError, CoreResult};

use super::specification::{ClassRef, RelationshipPath};

fn default_true() -> bool {
    true
}

fn default_separator() -> String {
    " ".to_string()
}

// ===================== 标签定制 =====================

/// 标签值规格：按声明顺序求值，首个非空结果生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "valueType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LabelValueSpec {
    /// 字面量
    String { value: String },
    /// 本实例属性（显示值）
    Property { property: String },
    /// 关联实例属性（取首个关联实例）
    RelatedInstanceProperty { path: RelationshipPath, property: String },
    /// 组合值：各部分非空结果以分隔符拼接
    Composite {
        parts: Vec<LabelValueSpec>,
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// 表达式结果
    Expression { expression: String },
    /// 实例类名
    ClassName,
    /// 实例类显示名
    ClassLabel,
    /// 实例ID
    InstanceId,
}

// ===================== 排序定制 =====================

/// 单个排序键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub property: String,
    #[serde(default)]
    pub descending: bool,
}

/// 排序方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sortBy", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SortMode {
    /// 按多个属性键排序（各键独立升降序）
    Properties { keys: Vec<SortKey> },
    /// 按显示标签排序
    Label {
        #[serde(default)]
        descending: bool,
    },
    /// 禁用排序（保持查询顺序）
    Disabled,
}

/// 排序作用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortScope {
    /// 单个规格的输出
    #[default]
    Specification,
    /// 合并后的整个层级
    Level,
}

/// 排序规则
/// class 为 None 时适用于所有实例；派生类规则可覆盖/禁用基类规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ClassRef>,
    pub mode: SortMode,
    #[serde(default)]
    pub scope: SortScope,
}

// ===================== 分组定制 =====================

/// 属性分组的分桶/排序依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GroupingValue {
    /// 原始属性值
    PropertyValue,
    /// 格式化后的显示标签
    #[default]
    DisplayLabel,
}

/// 属性区间 [from, to]（闭区间）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRange {
    pub from: Value,
    pub to: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

impl PropertyRange {
    pub fn new(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
            image_id: None,
        }
    }

    #[inline]
    pub fn contains(&self, value: &Value) -> bool {
        !value.is_unspecified()
            && compare_values(&self.from, value) != Ordering::Greater
            && compare_values(value, &self.to) != Ordering::Greater
    }

    /// 区间显示标签：自定义标签优先，否则 "from - to"
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => format!(
                "{} - {}",
                self.from.to_display_string(),
                self.to.to_display_string()
            ),
        }
    }
}

/// 属性分组定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyGroupSpec {
    pub property_name: String,
    #[serde(default)]
    pub bucket_by: GroupingValue,
    #[serde(default)]
    pub sort_by: GroupingValue,
    #[serde(default = "default_true")]
    pub create_group_for_unspecified_values: bool,
    #[serde(default)]
    pub create_group_for_single_item: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<PropertyRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

impl PropertyGroupSpec {
    pub fn new(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            bucket_by: GroupingValue::DisplayLabel,
            sort_by: GroupingValue::DisplayLabel,
            create_group_for_unspecified_values: true,
            create_group_for_single_item: false,
            ranges: Vec::new(),
            image_id: None,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        for range in &self.ranges {
            if compare_values(&range.from, &range.to) == Ordering::Greater {
                return Err(CoreError::InvalidRange {
                    property: self.property_name.clone(),
                    from: range.from.to_display_string(),
                    to: range.to.to_display_string(),
                });
            }
        }
        Ok(())
    }
}

/// 同标签实例合并的执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SameLabelStage {
    /// 查询阶段：单个规格内部合并
    Query,
    /// 后处理阶段：整个可见层级合并（跨规格、跨隐藏分支）
    #[default]
    PostProcess,
}

/// 单个分组定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "groupType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GroupSpec {
    /// 类分组：实例按 base_class 重分组（None 时取规则本身的类）
    Class {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_class: Option<String>,
        #[serde(default)]
        create_group_for_single_item: bool,
    },
    /// 属性分组
    Property(PropertyGroupSpec),
    /// 同标签实例合并
    SameLabelInstance {
        #[serde(default)]
        stage: SameLabelStage,
    },
}

/// 分组规则：对指定类的实例生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingRule {
    pub class: ClassRef,
    pub groups: Vec<GroupSpec>,
}

// ===================== 定制规则 =====================

/// 定制类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "customizationType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum CustomizationKind {
    Label {
        values: Vec<LabelValueSpec>,
    },
    ImageId {
        image_id: String,
    },
    Style {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fore_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        back_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_style: Option<String>,
    },
    /// 复选框：可由布尔属性驱动（可取反），属性缺失时取默认值
    Checkbox {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        property: Option<String>,
        #[serde(default)]
        invert: bool,
        #[serde(default)]
        default_value: bool,
        #[serde(default = "default_true")]
        is_enabled: bool,
    },
    /// 扩展数据：名称 -> 表达式
    ExtendedData {
        items: BTreeMap<String, String>,
    },
    /// 节点产物：名称 -> 表达式，供祖先隐藏表达式聚合使用
    NodeArtifacts {
        items: BTreeMap<String, String>,
    },
    Sorting(SortingRule),
    Grouping(GroupingRule),
}

impl CustomizationKind {
    /// 同类规则互斥：优先级最高的命中规则生效
    #[inline]
    pub fn is_exclusive(&self) -> bool {
        matches!(
            self,
            CustomizationKind::Label { .. }
                | CustomizationKind::ImageId { .. }
                | CustomizationKind::Style { .. }
                | CustomizationKind::Checkbox { .. }
        )
    }

    /// 作用于层级（而非单个节点）的定制
    #[inline]
    pub fn is_level_scoped(&self) -> bool {
        matches!(
            self,
            CustomizationKind::Sorting(_) | CustomizationKind::Grouping(_)
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CustomizationKind::Label { .. } => "Label",
            CustomizationKind::ImageId { .. } => "ImageId",
            CustomizationKind::Style { .. } => "Style",
            CustomizationKind::Checkbox { .. } => "Checkbox",
            CustomizationKind::ExtendedData { .. } => "ExtendedData",
            CustomizationKind::NodeArtifacts { .. } => "NodeArtifacts",
            CustomizationKind::Sorting(_) => "Sorting",
            CustomizationKind::Grouping(_) => "Grouping",
        }
    }
}

/// 定制规则
/// 节点级定制的条件针对 ThisNode 求值；排序/分组规则的条件针对 ParentNode 求值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub only_if_not_handled: bool,
    #[serde(flatten)]
    pub kind: CustomizationKind,
}

impl CustomizationRule {
    pub fn new(kind: CustomizationKind) -> Self {
        Self {
            id: None,
            condition: None,
            priority: 0,
            only_if_not_handled: false,
            kind,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn only_if_not_handled(mut self) -> Self {
        self.only_if_not_handled = true;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        if let CustomizationKind::Grouping(grouping) = &self.kind {
            for group in &grouping.groups {
                if let GroupSpec::Property(spec) = group {
                    spec.validate()?;
                }
            }
        }
        Ok(())
    }
}
