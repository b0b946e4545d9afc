mod customization;
mod ruleset;
mod specification;

// 导出规则模型
pub use customization::{
    CustomizationKind, CustomizationRule, GroupSpec, GroupingRule, GroupingValue, LabelValueSpec,
    PropertyGroupSpec, PropertyRange, SameLabelStage, SortKey, SortMode, SortScope, SortingRule,
};
pub use ruleset::{NavigationRule, Rule, RuleSet, SubCondition, TargetTree};
pub use specification::{
    ChildNodeSpecification, ClassRef, QuerySpec, RelationshipDirection, RelationshipPath,
    RelationshipStep, SpecificationKind, SpecificationRef, StepCount,
};
