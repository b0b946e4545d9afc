use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::error::{CoreError, CoreResult};

/// 规则集变量值
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum VariableValue {
    Bool(bool),
    Int(i64),
    IntList(Vec<i64>),
    String(String),
}

/// 规则集变量快照
/// 按名称有序存储（BTreeMap），保证快照哈希与遍历顺序确定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RulesetVariables {
    values: BTreeMap<String, VariableValue>,
}

impl RulesetVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置变量
    pub fn with(mut self, name: impl Into<String>, value: VariableValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: VariableValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.get(name)
    }

    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(VariableValue::Bool(true)))
    }

    pub fn get_int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(VariableValue::Int(i)) => *i,
            _ => 0,
        }
    }

    pub fn get_int_list(&self, name: &str) -> &[i64] {
        match self.values.get(name) {
            Some(VariableValue::IntList(list)) => list.as_slice(),
            _ => &[],
        }
    }

    pub fn get_string(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(VariableValue::String(s)) => s.as_str(),
            _ => "",
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.values.iter()
    }

    /// 快照哈希：作为层级缓存Key的一部分
    pub fn snapshot_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for (name, value) in &self.values {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// 校验变量快照（调用方错误在层级构建前拒绝）
    /// 1. 名称非空
    /// 2. 名称不含空白字符
    pub fn validate(&self) -> CoreResult<()> {
        for name in self.values.keys() {
            if name.is_empty() {
                return Err(CoreError::InvalidVariable {
                    name: name.clone(),
                    reason: "empty variable name".to_string(),
                });
            }
            if name.chars().any(char::is_whitespace) {
                return Err(CoreError::InvalidVariable {
                    name: name.clone(),
                    reason: "variable name contains whitespace".to_string(),
                });
            }
        }
        Ok(())
    }
}
