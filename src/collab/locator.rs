use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rsnavtree_engine::{CustomizationRule, NavigationRule, RuleSet};

use crate::error::{NavError, NavResult};

/// 同ID规则集合并视图：主规则集 + 按优先级排列的补充规则集
/// 合并后的规则按自身优先级降序排列，优先级相同时保持规则集声明顺序
#[derive(Debug)]
pub struct RulesetBundle {
    primary: Arc<RuleSet>,
    supplementals: Vec<Arc<RuleSet>>,
    root_rules: OnceCell<Vec<NavigationRule>>,
    child_rules: OnceCell<Vec<NavigationRule>>,
    customization_rules: OnceCell<Vec<CustomizationRule>>,
}

impl RulesetBundle {
    pub fn new(primary: Arc<RuleSet>, mut supplementals: Vec<Arc<RuleSet>>) -> Self {
        supplementals.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            primary,
            supplementals,
            root_rules: OnceCell::new(),
            child_rules: OnceCell::new(),
            customization_rules: OnceCell::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.primary.id
    }

    pub fn primary(&self) -> &RuleSet {
        &self.primary
    }

    pub fn supplementals(&self) -> &[Arc<RuleSet>] {
        &self.supplementals
    }

    /// 主规则集在前，补充规则集按优先级降序
    pub fn rulesets(&self) -> impl Iterator<Item = &RuleSet> {
        std::iter::once(self.primary.as_ref()).chain(self.supplementals.iter().map(Arc::as_ref))
    }

    pub fn root_rules(&self) -> &[NavigationRule] {
        self.root_rules.get_or_init(|| {
            let mut rules: Vec<NavigationRule> =
                self.rulesets().flat_map(|rs| rs.root_rules().cloned()).collect();
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
            rules
        })
    }

    pub fn child_rules(&self) -> &[NavigationRule] {
        self.child_rules.get_or_init(|| {
            let mut rules: Vec<NavigationRule> =
                self.rulesets().flat_map(|rs| rs.child_rules().cloned()).collect();
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
            rules
        })
    }

    pub fn customization_rules(&self) -> &[CustomizationRule] {
        self.customization_rules.get_or_init(|| {
            let mut rules: Vec<CustomizationRule> = self
                .rulesets()
                .flat_map(|rs| rs.customization_rules().cloned())
                .collect();
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
            rules
        })
    }
}

/// 规则集定位协作方
pub trait RulesetLocator: Send + Sync {
    /// 返回同一ID的规则集合并视图；规则集未变化时应返回同一个 Arc
    fn locate(&self, ruleset_id: &str) -> Option<Arc<RulesetBundle>>;
}

/// 内存规则集定位器
#[derive(Debug, Default)]
pub struct InMemoryRulesetLocator {
    rulesets: RwLock<FxHashMap<String, Vec<Arc<RuleSet>>>>,
    bundles: RwLock<FxHashMap<String, Arc<RulesetBundle>>>,
}

impl InMemoryRulesetLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册规则集（校验后加入；同ID的合并视图失效）
    pub fn add(&self, ruleset: RuleSet) -> NavResult<()> {
        ruleset.validate()?;
        let id = ruleset.id.clone();
        log::debug!(
            "Registering ruleset `{}` (supplemental: {}, rules: {})",
            id,
            ruleset.supplemental,
            ruleset.rules.len()
        );
        self.rulesets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_default()
            .push(Arc::new(ruleset));
        self.bundles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(())
    }

    /// 从JSON注册规则集
    pub fn add_json(&self, json: &str) -> NavResult<()> {
        let ruleset = RuleSet::from_json(json)?;
        self.add(ruleset)
    }

    /// 移除同ID的全部规则集
    pub fn remove(&self, ruleset_id: &str) -> bool {
        self.bundles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ruleset_id);
        self.rulesets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ruleset_id)
            .is_some()
    }

    fn build_bundle(&self, ruleset_id: &str) -> NavResult<Arc<RulesetBundle>> {
        let rulesets = self.rulesets.read().unwrap_or_else(PoisonError::into_inner);
        let entries = rulesets
            .get(ruleset_id)
            .ok_or_else(|| NavError::RulesetNotFound(ruleset_id.to_string()))?;
        // 多个主规则集时取最后注册的一个
        let primary = entries
            .iter()
            .rev()
            .find(|rs| !rs.supplemental)
            .cloned()
            .ok_or_else(|| NavError::RulesetNotFound(ruleset_id.to_string()))?;
        let supplementals = entries.iter().filter(|rs| rs.supplemental).cloned().collect();
        Ok(Arc::new(RulesetBundle::new(primary, supplementals)))
    }
}

impl RulesetLocator for InMemoryRulesetLocator {
    fn locate(&self, ruleset_id: &str) -> Option<Arc<RulesetBundle>> {
        if let Some(bundle) = self
            .bundles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ruleset_id)
        {
            return Some(bundle.clone());
        }
        let bundle = self.build_bundle(ruleset_id).ok()?;
        let mut bundles = self.bundles.write().unwrap_or_else(PoisonError::into_inner);
        Some(bundles.entry(ruleset_id.to_string()).or_insert(bundle).clone())
    }
}
