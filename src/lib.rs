//! rsnavtree - 规则驱动的分层导航树引擎

// 导出全局错误类型
pub use self::error::{NavError, NavResult};

// 导出配置模块
pub use self::config::{EngineConfig, EngineConfigBuilder, FilterOptions};

// 导出外部协作方接口
pub use self::collab::{
    ExpressionContext, ExpressionError, ExpressionEvaluator, FlatSchema, InMemoryRulesetLocator,
    InstanceQuery, QueryError, QueryRequest, RulesetBundle, RulesetLocator, SchemaCatalog,
    SchemaHierarchy,
};

// 导出层级节点记录（表达式上下文中可见）
pub use self::hierarchy::{NodeHandle, NodeRecord};

// 导出过滤结果
pub use self::filter::FilteredNode;

// 导出管理器及请求/分页类型
pub use self::manager::{FilterRequest, HierarchyRequest, NavTreeManager, NodesPage, PageOptions};

// 导出内核数据模型与规则模型
pub use rsnavtree_engine::{
    AncestorFingerprint, BaseClassGroup, CheckboxState, ChildNodeSpecification, ChildrenHint,
    ClassRef, CoreError, CustomizationKind, CustomizationRule, GroupSpec, GroupingDiscriminator,
    GroupingRule, GroupingValue, GuardState, InstanceKey, InstanceRecord, LabelDefinition,
    LabelValueSpec, NavNode, NavigationRule, NodeKey, NodeStyle, NodeType, PropertyGroupSpec,
    PropertyRange, PropertyValue, QuerySpec, RelationshipDirection, RelationshipPath,
    RelationshipStep, Rule, RuleSet, RulesetVariables, SameLabelStage, SortKey, SortMode,
    SortScope, SortingRule, SpecificationKind, SpecificationRef, StepCount, SubCondition,
    TargetTree, TextFilter, Value, VariableValue,
};

// 导出取消令牌（所有异步请求都接收）
pub use tokio_util::sync::CancellationToken;

// 声明所有子模块
pub mod collab;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod manager;
mod customization;
mod hierarchy;
mod matcher;

#[cfg(test)]
mod testing;
