//! rsnavtree-engine - 规则驱动导航树内核
//! 纯同步的数据模型与层级内算法：节点/Key模型、规则模型、递归守卫、分组、排序

// 核心公共结构体+枚举
pub mod core;
// 内核错误定义
pub mod error;
// 分组引擎（类/属性/区间/标签分组，同标签合并）
pub mod grouping;
// 递归守卫
pub mod guard;
// 规则模型（规则集/规格/定制规则）
pub mod rule;
// 标签比较与规则排序
pub mod sorting;
// 日志预览与文本过滤工具
pub mod utils;

// 顶层导出常用类型
pub use crate::core::{
    compare_values, format_fixed_half_up, CheckboxState, ChildrenHint, ClassHierarchy,
    FlatHierarchy, GroupingDiscriminator, InstanceKey, InstanceRecord, LabelDefinition, NavNode,
    NodeKey, NodeStyle, NodeType, PropertyValue, RulesetVariables, Value, VariableValue,
};
pub use error::{CoreError, CoreResult};
pub use grouping::{
    group_items, merge_same_label, BaseClassGroup, ClassGrouping, GroupEntry, GroupNode,
    Groupable, GroupingPlan, PropertyGrouping,
};
pub use guard::{AncestorFingerprint, GuardState, RecursionGuard};
pub use rule::{
    ChildNodeSpecification, ClassRef, CustomizationKind, CustomizationRule, GroupSpec,
    GroupingRule, GroupingValue, LabelValueSpec, NavigationRule, PropertyGroupSpec, PropertyRange,
    QuerySpec, RelationshipDirection, RelationshipPath, RelationshipStep, Rule, RuleSet,
    SameLabelStage, SortKey, SortMode, SortScope, SortingRule, SpecificationKind,
    SpecificationRef, StepCount, SubCondition, TargetTree,
};
pub use sorting::{compare_labels, sort_by_label, sort_with_rules, Sortable};
pub use utils::{preview_compact, TextFilter};
