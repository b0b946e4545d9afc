use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use crate::sorting::compare_labels;

/// 分组/标签显示时的小数位数
pub const DISPLAY_DECIMAL_DIGITS: usize = 2;

/// 通用值类型
/// 表达式求值结果、实例属性值、规则集变量值统一使用该枚举
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Point2d { x: f64, y: f64 },
    Point3d { x: f64, y: f64, z: f64 },
    IntList(Vec<i64>),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 是否为「未指定」值：null 与空字符串统一视为未指定
    #[inline]
    pub fn is_unspecified(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// 布尔上下文取值（条件、隐藏表达式）
    /// 仅 true / 非零整数视为真，其余一律为假（失败即关闭）
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// 格式化为显示字符串
    /// 1. 浮点数：固定两位小数，十进制四舍五入（half-up）
    /// 2. 点坐标：每个分量独立按同一规则格式化
    /// 3. null：空字符串
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => format_fixed_half_up(*d, DISPLAY_DECIMAL_DIGITS),
            Value::String(s) => s.clone(),
            Value::Point2d { x, y } => format!(
                "X: {} Y: {}",
                format_fixed_half_up(*x, DISPLAY_DECIMAL_DIGITS),
                format_fixed_half_up(*y, DISPLAY_DECIMAL_DIGITS)
            ),
            Value::Point3d { x, y, z } => format!(
                "X: {} Y: {} Z: {}",
                format_fixed_half_up(*x, DISPLAY_DECIMAL_DIGITS),
                format_fixed_half_up(*y, DISPLAY_DECIMAL_DIGITS),
                format_fixed_half_up(*z, DISPLAY_DECIMAL_DIGITS)
            ),
            Value::IntList(list) => list
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// 分组桶Key（按原始值分桶时使用）
    /// 浮点数与点坐标按显示精度舍入后比较，类型前缀避免 1 与 "1" 混桶
    /// 整数按精确值生成Key（不经 f64 转换），与数值相等的浮点数同桶（5 与 5.0）
    pub fn grouping_key(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) if s.is_empty() => String::new(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(i) => format!("n:{}.00", i),
            Value::Double(d) => format!("n:{}", format_fixed_half_up(*d, DISPLAY_DECIMAL_DIGITS)),
            Value::String(s) => format!("s:{}", s),
            Value::Point2d { .. } | Value::Point3d { .. } => format!("p:{}", self.to_display_string()),
            Value::IntList(_) => format!("l:{}", self.to_display_string()),
        }
    }

    /// 变体排序权重（null 最小）
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Point2d { .. } => 4,
            Value::Point3d { .. } => 5,
            Value::IntList(_) => 6,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// 值的全序比较（排序使用）
/// 数值跨 Int/Double 比较，字符串按标签规则比较，不同变体按权重比较
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (x @ (Value::Int(_) | Value::Double(_)), y @ (Value::Int(_) | Value::Double(_))) => {
            let (fx, fy) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            fx.total_cmp(&fy)
        }
        (Value::String(x), Value::String(y)) => compare_labels(x, y),
        (Value::Point2d { x: x1, y: y1 }, Value::Point2d { x: x2, y: y2 }) => {
            x1.total_cmp(x2).then_with(|| y1.total_cmp(y2))
        }
        (
            Value::Point3d { x: x1, y: y1, z: z1 },
            Value::Point3d { x: x2, y: y2, z: z2 },
        ) => x1
            .total_cmp(x2)
            .then_with(|| y1.total_cmp(y2))
            .then_with(|| z1.total_cmp(z2)),
        (Value::IntList(x), Value::IntList(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// 实例属性值：原始值 + 可选的显示标签
/// 显示标签由查询协作方提供（如枚举/导航属性），缺省时按原始值格式化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PropertyValue {
    pub raw: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl PropertyValue {
    pub fn new(raw: impl Into<Value>) -> Self {
        Self {
            raw: raw.into(),
            display: None,
        }
    }

    pub fn with_display(raw: impl Into<Value>, display: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            display: Some(display.into()),
        }
    }

    /// 格式化后的显示值
    pub fn display_value(&self) -> String {
        match &self.display {
            Some(d) => d.clone(),
            None => self.raw.to_display_string(),
        }
    }

    /// 未指定：原始值为 null/空串，且没有非空显示标签
    pub fn is_unspecified(&self) -> bool {
        self.raw.is_unspecified() && self.display.as_deref().map_or(true, str::is_empty)
    }
}

impl From<Value> for PropertyValue {
    fn from(raw: Value) -> Self {
        Self { raw, display: None }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Value::Int(v).into()
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Value::Double(v).into()
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Value::Bool(v).into()
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Value::String(v.to_string()).into()
    }
}

/// 固定小数位格式化（十进制 half-up）
/// 核心逻辑：
/// 1. 取 f64 的最短往返十进制表示（Display 从不使用科学计数法）
/// 2. 在该十进制串上按第 digits+1 位做四舍五入，逐位进位
/// 3. 负数按绝对值舍入后补符号，舍入结果为零时不输出负号
pub fn format_fixed_half_up(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let repr = format!("{}", value.abs());
    let (int_part, frac_part) = match repr.split_once('.') {
        Some((i, f)) => (i, f),
        None => (repr.as_str(), ""),
    };

    // 整数位 + 截取的小数位（不足补零）
    let mut num: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(digits))
        .map(|b| b - b'0')
        .collect();

    let round_up = frac_part
        .as_bytes()
        .get(digits)
        .map_or(false, |d| *d >= b'5');

    if round_up {
        let mut idx = num.len();
        loop {
            if idx == 0 {
                num.insert(0, 1);
                break;
            }
            idx -= 1;
            if num[idx] == 9 {
                num[idx] = 0;
            } else {
                num[idx] += 1;
                break;
            }
        }
    }

    let int_len = num.len() - digits;
    let mut out = String::with_capacity(num.len() + 2);
    let is_zero = num.iter().all(|d| *d == 0);
    if value.is_sign_negative() && !is_zero {
        out.push('-');
    }
    for d in &num[..int_len] {
        out.push((b'0' + d) as char);
    }
    if digits > 0 {
        out.push('.');
        for d in &num[int_len..] {
            out.push((b'0' + d) as char);
        }
    }
    out
}
