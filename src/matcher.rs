//! 规则匹配
//! 1. 根层级只考虑根规则；子层级考虑子规则 + 父节点所属规格声明的嵌套规则
//! 2. 规则按自身优先级降序处理，优先级相同保持规则集声明顺序
//! 3. 条件针对父节点链求值，求值失败视为不匹配
//! 4. 处理 only_if_not_handled / stop_further_processing / 子条件 / 目标树过滤
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use rsnavtree_engine::{NavigationRule, RulesetVariables, SpecificationRef, SubCondition, TargetTree};

use crate::collab::{evaluate_condition, ExpressionContext, ExpressionEvaluator, RulesetBundle};
use crate::error::{NavError, NavResult};
use crate::hierarchy::NodeRecord;

/// 规则作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleScope {
    Root,
    Children,
}

pub(crate) struct RuleMatcher<'a> {
    pub bundle: &'a RulesetBundle,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub variables: &'a Arc<RulesetVariables>,
    pub target_tree: TargetTree,
    pub cancel: &'a CancellationToken,
}

impl<'a> RuleMatcher<'a> {
    /// 父节点上下文
    pub fn parent_context(&self, parent_chain: &[Arc<NodeRecord>]) -> ExpressionContext {
        ExpressionContext {
            parent_chain: parent_chain.to_vec(),
            ..ExpressionContext::new(self.variables.clone())
        }
    }

    /// 条件为空视为恒真
    pub async fn condition_holds(&self, condition: Option<&str>, context: &ExpressionContext) -> NavResult<bool> {
        match condition {
            None => Ok(true),
            Some(expr) if expr.trim().is_empty() => Ok(true),
            Some(expr) => {
                if self.cancel.is_cancelled() {
                    return Err(NavError::Cancelled);
                }
                Ok(evaluate_condition(self.evaluator, expr, context).await)
            }
        }
    }

    /// 候选规则：作用域规则与嵌套规则合并后按优先级稳定排序
    fn candidates<'n>(&self, scope: RuleScope, nested: &'n [NavigationRule]) -> Vec<&'n NavigationRule>
    where
        'a: 'n,
    {
        let scoped = match scope {
            RuleScope::Root => self.bundle.root_rules(),
            RuleScope::Children => self.bundle.child_rules(),
        };
        let mut rules: Vec<&NavigationRule> = scoped.iter().collect();
        if scope == RuleScope::Children {
            rules.extend(nested.iter());
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        rules
    }

    /// 匹配规格：按规则优先级、规则内规格优先级排列
    pub async fn match_specifications(
        &self,
        scope: RuleScope,
        parent_chain: &[Arc<NodeRecord>],
        nested: &[NavigationRule],
    ) -> NavResult<Vec<SpecificationRef>> {
        let context = self.parent_context(parent_chain);
        let mut output: Vec<SpecificationRef> = Vec::new();
        let mut handled = false;

        for rule in self.candidates(scope, nested) {
            if !rule.target_tree.accepts(self.target_tree) {
                continue;
            }
            if rule.only_if_not_handled && handled {
                continue;
            }
            if !self.condition_holds(rule.condition.as_deref(), &context).await? {
                continue;
            }

            let mut specs: Vec<SpecificationRef> = rule.specifications.clone();
            specs.extend(self.sub_condition_specs(&rule.sub_conditions, &context).await?);
            specs.sort_by(|a, b| b.priority.cmp(&a.priority));

            log::trace!(
                "Rule {} matched with {} specifications",
                rule.id.as_deref().unwrap_or("<anonymous>"),
                specs.len()
            );
            if !specs.is_empty() {
                handled = true;
            }
            output.extend(specs);

            if rule.stop_further_processing {
                break;
            }
        }
        Ok(output)
    }

    /// 子条件深度优先展开（条件成立才继续深入）
    async fn sub_condition_specs(
        &self,
        subs: &[SubCondition],
        context: &ExpressionContext,
    ) -> NavResult<Vec<SpecificationRef>> {
        let mut output = Vec::new();
        let mut stack: Vec<&SubCondition> = subs.iter().rev().collect();
        while let Some(sub) = stack.pop() {
            if !self.condition_holds(sub.condition.as_deref(), context).await? {
                continue;
            }
            output.extend(sub.specifications.iter().cloned());
            stack.extend(sub.sub_conditions.iter().rev());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::InMemoryRulesetLocator;
    use crate::collab::RulesetLocator;
    use crate::testing::{custom_spec, ScriptedEvaluator};
    use rsnavtree_engine::{RuleSet, Value};

    fn ids(specs: &[SpecificationRef]) -> Vec<&str> {
        specs.iter().map(|s| s.id.as_str()).collect()
    }

    async fn run(ruleset: RuleSet, evaluator: &ScriptedEvaluator) -> Vec<String> {
        let locator = InMemoryRulesetLocator::new();
        locator.add(ruleset).unwrap();
        let bundle = locator.locate("rs").unwrap();
        let variables = Arc::new(RulesetVariables::new());
        let cancel = CancellationToken::new();
        let matcher = RuleMatcher {
            bundle: &bundle,
            evaluator,
            variables: &variables,
            target_tree: TargetTree::Main,
            cancel: &cancel,
        };
        let specs = matcher
            .match_specifications(RuleScope::Root, &[], &[])
            .await
            .unwrap();
        ids(&specs).into_iter().map(String::from).collect()
    }

    #[tokio::test]
    async fn test_priority_and_handled_flags() {
        let evaluator = ScriptedEvaluator::new();
        let ruleset = RuleSet::new("rs")
            .with_root_rule(NavigationRule::new().with_specification(custom_spec("low", "low")))
            .with_root_rule(
                NavigationRule::new()
                    .with_priority(10)
                    .with_specification(custom_spec("high", "high")),
            )
            .with_root_rule(
                NavigationRule::new()
                    .with_priority(5)
                    .only_if_not_handled()
                    .with_specification(custom_spec("skipped", "skipped")),
            );
        assert_eq!(run(ruleset, &evaluator).await, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_stop_further_processing() {
        let evaluator = ScriptedEvaluator::new();
        let ruleset = RuleSet::new("rs")
            .with_root_rule(
                NavigationRule::new()
                    .with_priority(2)
                    .stop_further_processing()
                    .with_specification(custom_spec("first", "first")),
            )
            .with_root_rule(NavigationRule::new().with_specification(custom_spec("second", "second")));
        assert_eq!(run(ruleset, &evaluator).await, vec!["first"]);
    }

    #[tokio::test]
    async fn test_failed_condition_does_not_match() {
        // 未注册的表达式求值失败，按不匹配处理
        let evaluator = ScriptedEvaluator::new().with("ok", |_| Ok(Value::Bool(true)));
        let ruleset = RuleSet::new("rs")
            .with_root_rule(
                NavigationRule::new()
                    .with_condition("broken((")
                    .with_specification(custom_spec("broken", "broken")),
            )
            .with_root_rule(
                NavigationRule::new()
                    .with_condition("ok")
                    .with_specification(custom_spec("ok", "ok")),
            );
        assert_eq!(run(ruleset, &evaluator).await, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_sub_conditions_and_target_tree() {
        let evaluator = ScriptedEvaluator::new()
            .with("yes", |_| Ok(Value::Bool(true)))
            .with("no", |_| Ok(Value::Bool(false)));
        let rule = NavigationRule::new()
            .with_specification(custom_spec("outer", "outer"))
            .with_sub_condition(SubCondition {
                condition: Some("yes".into()),
                specifications: vec![Arc::new(custom_spec("inner", "inner"))],
                sub_conditions: vec![SubCondition {
                    condition: Some("no".into()),
                    specifications: vec![Arc::new(custom_spec("deep", "deep"))],
                    sub_conditions: vec![],
                }],
            });
        let ruleset = RuleSet::new("rs").with_root_rule(rule).with_root_rule(
            NavigationRule::new()
                .targeting(TargetTree::Selection)
                .with_specification(custom_spec("selection", "selection")),
        );
        assert_eq!(run(ruleset, &evaluator).await, vec!["outer", "inner"]);
    }
}
