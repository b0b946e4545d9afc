//! rsnavtree-engine 内核错误定义
//! 封装内核层所有核心错误，与请求层错误解耦，基于thiserror实现类型安全处理
use thiserror::Error;

use regex::Error as RegexError;

/// 内核核心错误枚举
/// 仅描述模型构建/层级算法自身的错误，协作方（表达式、查询）的错误不在此处
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================== 规则相关错误 =====================
    /// 规则集结构非法（重复ID、空ID等）
    #[error("Invalid ruleset: {0}")]
    InvalidRuleset(String),

    /// 规则集序列化/反序列化失败
    #[error("Ruleset parse failed: {0}")]
    RulesetParse(#[from] serde_json::Error),

    /// 规格定义非法（缺少类、关系路径为空等）
    #[error("Invalid specification `{id}`: {reason}")]
    InvalidSpecification { id: String, reason: String },

    // ===================== 变量相关错误 =====================
    /// 规则集变量非法（名称为空、包含空白字符）
    #[error("Invalid ruleset variable `{name}`: {reason}")]
    InvalidVariable { name: String, reason: String },

    // ===================== 分组相关错误 =====================
    /// 属性区间定义非法（下界大于上界）
    #[error("Invalid property range [{from}, {to}] for `{property}`")]
    InvalidRange { property: String, from: String, to: String },

    // ===================== 内核基础错误 =====================
    /// 文本过滤表达式编译失败
    #[error("Filter pattern compilation failed: {0}")]
    FilterPattern(#[from] RegexError),

    /// 无效输入参数（内核层输入校验失败）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 内核逻辑不变量被破坏（核心算法约束违反，属于严重错误）
    #[error("Core invariant violation: {0}")]
    InvariantViolation(&'static str),
}

/// 内核层全局Result类型别名
/// 统一使用CoreError作为内核层错误类型
pub type CoreResult<T> = Result<T, CoreError>;
