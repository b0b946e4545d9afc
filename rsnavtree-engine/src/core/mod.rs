mod classes;
mod instance;
mod keys;
mod node;
mod value;
mod variables;

// 导出常用项
pub use classes::{ClassHierarchy, FlatHierarchy};
pub use instance::InstanceRecord;
pub use keys::{GroupingDiscriminator, InstanceKey, NodeKey, NodeType};
pub use node::{CheckboxState, ChildrenHint, LabelDefinition, NavNode, NodeStyle};
pub use value::{compare_values, format_fixed_half_up, PropertyValue, Value, DISPLAY_DECIMAL_DIGITS};
pub use variables::{RulesetVariables, VariableValue};
