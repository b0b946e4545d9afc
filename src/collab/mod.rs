//! 外部协作方接口
//! 层级引擎只依赖以下契约：表达式求值、实例查询、规则集定位、类结构查询
mod expression;
mod locator;
mod query;
mod schema;

pub use expression::{ExpressionContext, ExpressionError, ExpressionEvaluator};
pub use locator::{InMemoryRulesetLocator, RulesetBundle, RulesetLocator};
pub use query::{InstanceQuery, QueryError, QueryRequest};
pub use schema::{FlatSchema, SchemaCatalog, SchemaHierarchy};

pub(crate) use expression::evaluate_condition;
