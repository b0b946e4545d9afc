use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{ChildrenHint, ClassHierarchy};
use crate::error::{CoreError, CoreResult};

use super::ruleset::NavigationRule;

fn default_true() -> bool {
    true
}

/// 类引用：类名 + 是否多态（包含派生类）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassRef {
    pub class_name: String,
    #[serde(default = "default_true")]
    pub polymorphic: bool,
}

impl ClassRef {
    pub fn polymorphic(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            polymorphic: true,
        }
    }

    pub fn exact(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            polymorphic: false,
        }
    }

    /// 判断给定类是否命中该引用（多态时含派生类）
    pub fn matches(&self, class_name: &str, hierarchy: &dyn ClassHierarchy) -> bool {
        if self.polymorphic {
            hierarchy.is_a(class_name, &self.class_name)
        } else {
            class_name == self.class_name
        }
    }
}

/// 关系方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RelationshipDirection {
    #[default]
    Forward,
    Backward,
}

/// 关系步骤重复次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "repeat", content = "count")]
pub enum StepCount {
    /// 单跳
    #[default]
    Once,
    /// 固定跳数
    Exactly(u32),
    /// 递归（无上限，直到无新目标）
    Unbounded,
}

impl StepCount {
    #[inline]
    pub fn is_repeatable(&self) -> bool {
        !matches!(self, StepCount::Once)
    }
}

/// 单个关系步骤
/// relationships 含多个关系类时，各关系类的候选取并集
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipStep {
    pub relationships: Vec<String>,
    #[serde(default)]
    pub direction: RelationshipDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_class: Option<ClassRef>,
    #[serde(default)]
    pub count: StepCount,
}

impl RelationshipStep {
    pub fn forward(relationship: impl Into<String>) -> Self {
        Self {
            relationships: vec![relationship.into()],
            direction: RelationshipDirection::Forward,
            target_class: None,
            count: StepCount::Once,
        }
    }

    pub fn backward(relationship: impl Into<String>) -> Self {
        Self {
            direction: RelationshipDirection::Backward,
            ..Self::forward(relationship)
        }
    }

    pub fn repeated(mut self, count: StepCount) -> Self {
        self.count = count;
        self
    }

    pub fn targeting(mut self, class: ClassRef) -> Self {
        self.target_class = Some(class);
        self
    }
}

/// 多跳关系路径
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipPath {
    pub steps: Vec<RelationshipStep>,
}

impl RelationshipPath {
    pub fn single(step: RelationshipStep) -> Self {
        Self { steps: vec![step] }
    }
}

/// 调用方声明的查询
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuerySpec {
    pub class: ClassRef,
    pub query: String,
}

/// 规格类型（封闭的和类型，新增类型通过扩展变体完成）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "specType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SpecificationKind {
    /// 全部实例
    AllInstances,
    /// 指定类的实例（可排除派生类）
    InstancesOfClasses {
        classes: Vec<ClassRef>,
        #[serde(default)]
        excluded_classes: Vec<ClassRef>,
    },
    /// 关联实例（单跳/多跳，可递归）
    RelatedInstances { paths: Vec<RelationshipPath> },
    /// 自定义节点（不关联任何实例）
    CustomNode {
        node_type: String,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_id: Option<String>,
    },
    /// 查询结果实例（多个查询取并集）
    QueryResult { queries: Vec<QuerySpec> },
}

impl SpecificationKind {
    #[inline]
    pub fn is_instance_based(&self) -> bool {
        !matches!(self, SpecificationKind::CustomNode { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SpecificationKind::AllInstances => "AllInstances",
            SpecificationKind::InstancesOfClasses { .. } => "InstancesOfClasses",
            SpecificationKind::RelatedInstances { .. } => "RelatedInstances",
            SpecificationKind::CustomNode { .. } => "CustomNode",
            SpecificationKind::QueryResult { .. } => "QueryResult",
        }
    }
}

/// 子节点规格：规则声明的节点生成策略
/// 由所属规则持有，不可变，每次层级构建时求值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildNodeSpecification {
    /// 规格标识（规则集内唯一），递归守卫按此区分规格
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub kind: SpecificationKind,
    /// 实例过滤表达式（由查询协作方求值）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_filter: Option<String>,
    #[serde(default)]
    pub group_by_class: bool,
    #[serde(default = "default_true")]
    pub group_by_label: bool,
    /// 单成员的类分组也保留分组节点
    #[serde(default)]
    pub always_group: bool,
    #[serde(default)]
    pub hide_nodes_in_hierarchy: bool,
    #[serde(default)]
    pub hide_if_no_children: bool,
    #[serde(default)]
    pub hide_if_only_one_child: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_expression: Option<String>,
    #[serde(default)]
    pub children_hint: ChildrenHint,
    #[serde(default)]
    pub do_not_sort: bool,
    #[serde(default)]
    pub suppress_similar_ancestors_check: bool,
    /// 作用于本规格所建节点之子层级的嵌套规则
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_rules: Vec<NavigationRule>,
}

impl ChildNodeSpecification {
    /// 以默认标志创建规格
    pub fn new(id: impl Into<String>, kind: SpecificationKind) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            kind,
            instance_filter: None,
            group_by_class: false,
            group_by_label: true,
            always_group: false,
            hide_nodes_in_hierarchy: false,
            hide_if_no_children: false,
            hide_if_only_one_child: false,
            hide_expression: None,
            children_hint: ChildrenHint::Unknown,
            do_not_sort: false,
            suppress_similar_ancestors_check: false,
            nested_rules: Vec::new(),
        }
    }

    /// 是否带任何隐藏标志（决定能否走轻量计数）
    pub fn has_hide_flags(&self) -> bool {
        self.hide_nodes_in_hierarchy
            || self.hide_if_no_children
            || self.hide_if_only_one_child
            || self.hide_expression.is_some()
    }

    /// 结构校验
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: &str| CoreError::InvalidSpecification {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.is_empty() {
            return Err(invalid("empty specification id"));
        }
        let kind_check = match &self.kind {
            SpecificationKind::InstancesOfClasses { classes, .. } if classes.is_empty() => {
                Err(invalid("no classes specified"))
            }
            SpecificationKind::RelatedInstances { paths } if paths.is_empty() => {
                Err(invalid("no relationship paths specified"))
            }
            SpecificationKind::RelatedInstances { paths }
                if paths
                    .iter()
                    .any(|p| p.steps.is_empty() || p.steps.iter().any(|s| s.relationships.is_empty())) =>
            {
                Err(invalid("relationship path has an empty step"))
            }
            SpecificationKind::QueryResult { queries } if queries.is_empty() => {
                Err(invalid("no queries specified"))
            }
            _ => Ok(()),
        };
        kind_check?;
        for rule in &self.nested_rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// 规格共享句柄
pub type SpecificationRef = Arc<ChildNodeSpecification>;
