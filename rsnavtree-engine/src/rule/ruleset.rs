use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

use super::customization::{CustomizationKind, CustomizationRule};
use super::specification::{ChildNodeSpecification, SpecificationRef};

/// 规则作用的目标树
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TargetTree {
    Main,
    Selection,
    #[default]
    Both,
}

impl TargetTree {
    /// 规则声明的目标树是否接受当前请求的目标树
    #[inline]
    pub fn accepts(&self, requested: TargetTree) -> bool {
        matches!(self, TargetTree::Both) || *self == requested || requested == TargetTree::Both
    }
}

/// 子条件：规则内部按条件追加的规格分组，可继续嵌套
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub specifications: Vec<SpecificationRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_conditions: Vec<SubCondition>,
}

/// 导航规则（根规则 / 子规则共用）
/// 条件为空视为恒真；条件引用父节点链（ParentNode.Parent...）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub priority: i32,
    /// 更高优先级规则已产生规格时跳过
    #[serde(default)]
    pub only_if_not_handled: bool,
    /// 命中后不再处理更低优先级的规则
    #[serde(default)]
    pub stop_further_processing: bool,
    #[serde(default)]
    pub target_tree: TargetTree,
    #[serde(default)]
    pub specifications: Vec<SpecificationRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_conditions: Vec<SubCondition>,
}

impl NavigationRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_specification(mut self, spec: ChildNodeSpecification) -> Self {
        self.specifications.push(Arc::new(spec));
        self
    }

    pub fn with_sub_condition(mut self, sub: SubCondition) -> Self {
        self.sub_conditions.push(sub);
        self
    }

    pub fn only_if_not_handled(mut self) -> Self {
        self.only_if_not_handled = true;
        self
    }

    pub fn stop_further_processing(mut self) -> Self {
        self.stop_further_processing = true;
        self
    }

    pub fn targeting(mut self, tree: TargetTree) -> Self {
        self.target_tree = tree;
        self
    }

    /// 遍历规则内全部规格（含子条件、规格嵌套规则）
    pub fn visit_specifications<'a>(&'a self, visit: &mut dyn FnMut(&'a ChildNodeSpecification)) {
        fn walk_sub<'a>(sub: &'a SubCondition, visit: &mut dyn FnMut(&'a ChildNodeSpecification)) {
            for spec in &sub.specifications {
                visit_spec(spec, visit);
            }
            for nested in &sub.sub_conditions {
                walk_sub(nested, visit);
            }
        }
        fn visit_spec<'a>(spec: &'a ChildNodeSpecification, visit: &mut dyn FnMut(&'a ChildNodeSpecification)) {
            visit(spec);
            for rule in &spec.nested_rules {
                rule.visit_specifications(visit);
            }
        }

        for spec in &self.specifications {
            visit_spec(spec, visit);
        }
        for sub in &self.sub_conditions {
            walk_sub(sub, visit);
        }
    }

    /// 结构校验：逐个校验规格
    pub fn validate(&self) -> CoreResult<()> {
        for spec in &self.specifications {
            spec.validate()?;
        }
        let mut stack: Vec<&SubCondition> = self.sub_conditions.iter().collect();
        while let Some(sub) = stack.pop() {
            for spec in &sub.specifications {
                spec.validate()?;
            }
            stack.extend(sub.sub_conditions.iter());
        }
        Ok(())
    }
}

/// 规则（封闭和类型）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ruleType", rename_all = "camelCase")]
pub enum Rule {
    /// 根层级规则
    Root(NavigationRule),
    /// 子层级规则（条件针对父节点求值）
    Child(NavigationRule),
    /// 定制规则（标签/图标/样式/复选框/扩展数据/排序/分组/节点产物）
    Customization(CustomizationRule),
}

/// 规则集：一组带优先级的规则
/// 补充规则集（supplemental）按 priority 合并进同ID主规则集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub id: String,
    #[serde(default)]
    pub supplemental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplemental_purpose: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            supplemental: false,
            supplemental_purpose: None,
            priority: 0,
            version: None,
            rules: Vec::new(),
        }
    }

    /// 创建补充规则集
    pub fn supplemental(id: impl Into<String>, purpose: impl Into<String>, priority: i32) -> Self {
        Self {
            supplemental: true,
            supplemental_purpose: Some(purpose.into()),
            priority,
            ..Self::new(id)
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_root_rule(self, rule: NavigationRule) -> Self {
        self.with_rule(Rule::Root(rule))
    }

    pub fn with_child_rule(self, rule: NavigationRule) -> Self {
        self.with_rule(Rule::Child(rule))
    }

    pub fn with_customization(self, rule: CustomizationRule) -> Self {
        self.with_rule(Rule::Customization(rule))
    }

    pub fn root_rules(&self) -> impl Iterator<Item = &NavigationRule> {
        self.rules.iter().filter_map(|r| match r {
            Rule::Root(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn child_rules(&self) -> impl Iterator<Item = &NavigationRule> {
        self.rules.iter().filter_map(|r| match r {
            Rule::Child(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn customization_rules(&self) -> impl Iterator<Item = &CustomizationRule> {
        self.rules.iter().filter_map(|r| match r {
            Rule::Customization(rule) => Some(rule),
            _ => None,
        })
    }

    /// 从JSON解析并校验
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let ruleset: RuleSet = serde_json::from_str(json)?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// 规则集结构校验
    /// 1. ID 非空
    /// 2. 规格ID在规则集内唯一（递归守卫依赖规格ID区分规格）
    /// 3. 规格与定制规则各自合法
    pub fn validate(&self) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::InvalidRuleset("empty ruleset id".to_string()));
        }

        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut duplicate: Option<String> = None;
        for rule in &self.rules {
            match rule {
                Rule::Root(nav) | Rule::Child(nav) => {
                    nav.validate()?;
                    nav.visit_specifications(&mut |spec| {
                        if !seen.insert(spec.id.as_str()) && duplicate.is_none() {
                            duplicate = Some(spec.id.clone());
                        }
                    });
                }
                Rule::Customization(custom) => custom.validate()?,
            }
        }

        if let Some(id) = duplicate {
            return Err(CoreError::InvalidRuleset(format!(
                "duplicate specification id `{}` in ruleset `{}`",
                id, self.id
            )));
        }
        Ok(())
    }

    /// 是否包含任何排序/分组等层级作用的定制规则
    pub fn has_level_customizations(&self) -> bool {
        self.customization_rules().any(|r| {
            matches!(
                r.kind,
                CustomizationKind::Sorting(_) | CustomizationKind::Grouping(_)
            )
        })
    }
}
