//! 测试支撑：内存实例库、脚本化表达式求值器、规则集构造工具
use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use rsnavtree_engine::{
    ChildNodeSpecification, ClassRef, InstanceKey, InstanceRecord, NavNode, RelationshipDirection,
    RelationshipPath, RelationshipStep, RuleSet, SpecificationKind, StepCount, Value,
};

use crate::collab::{
    ExpressionContext, ExpressionError, ExpressionEvaluator, InMemoryRulesetLocator, InstanceQuery,
    QueryError, QueryRequest, SchemaCatalog,
};
use crate::config::EngineConfig;
use crate::manager::{HierarchyRequest, NavTreeManager, PageOptions};

type InstanceFilterFn = Arc<dyn Fn(&InstanceRecord) -> bool + Send + Sync>;
type ScriptFn = Arc<dyn Fn(&ExpressionContext) -> Result<Value, ExpressionError> + Send + Sync>;

// ===================== 内存实例库 =====================

/// 内存实例库：同时提供实例查询与类结构
#[derive(Default)]
pub(crate) struct InMemoryStore {
    instances: Vec<InstanceRecord>,
    relationships: Vec<(String, InstanceKey, InstanceKey)>,
    bases: FxHashMap<String, Vec<String>>,
    class_labels: FxHashMap<String, String>,
    filters: FxHashMap<String, InstanceFilterFn>,
    failing_specs: FxHashSet<String>,
    pub query_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, class_name: &str, id: u64, label: &str) -> Self {
        self.with_record(InstanceRecord::new(InstanceKey::new(class_name, id), label))
    }

    pub fn with_record(mut self, record: InstanceRecord) -> Self {
        self.instances.push(record);
        self
    }

    pub fn relate(mut self, relationship: &str, source: (&str, u64), target: (&str, u64)) -> Self {
        self.relationships.push((
            relationship.to_string(),
            InstanceKey::new(source.0, source.1),
            InstanceKey::new(target.0, target.1),
        ));
        self
    }

    pub fn with_base(mut self, class_name: &str, base: &str) -> Self {
        self.bases
            .entry(class_name.to_string())
            .or_default()
            .push(base.to_string());
        self
    }

    pub fn with_class_label(mut self, class_name: &str, label: &str) -> Self {
        self.class_labels.insert(class_name.to_string(), label.to_string());
        self
    }

    pub fn with_filter<F>(mut self, name: &str, filter: F) -> Self
    where
        F: Fn(&InstanceRecord) -> bool + Send + Sync + 'static,
    {
        self.filters.insert(name.to_string(), Arc::new(filter));
        self
    }

    /// 该规格的查询一律失败
    pub fn failing(mut self, specification_id: &str) -> Self {
        self.failing_specs.insert(specification_id.to_string());
        self
    }

    fn record(&self, key: &InstanceKey) -> Option<&InstanceRecord> {
        self.instances.iter().find(|r| r.key == *key)
    }

    fn hop(&self, frontier: &[InstanceKey], step: &RelationshipStep) -> Vec<InstanceKey> {
        let mut output = Vec::new();
        for key in frontier {
            for (relationship, source, target) in &self.relationships {
                if !step.relationships.contains(relationship) {
                    continue;
                }
                match step.direction {
                    RelationshipDirection::Forward if source == key => output.push(target.clone()),
                    RelationshipDirection::Backward if target == key => output.push(source.clone()),
                    _ => {}
                }
            }
        }
        output
    }

    /// 单个关系步骤（可重复步骤取各跳结果的并集）
    fn step_targets(&self, frontier: Vec<InstanceKey>, step: &RelationshipStep) -> Vec<InstanceKey> {
        let max_hops = match step.count {
            StepCount::Once => 1,
            StepCount::Exactly(n) => n as usize,
            StepCount::Unbounded => usize::MAX,
        };
        let mut visited: FxHashSet<InstanceKey> = FxHashSet::default();
        let mut output = Vec::new();
        let mut current = frontier;
        let mut hops = 0;
        while hops < max_hops && !current.is_empty() {
            let next = self.hop(&current, step);
            let mut fresh = Vec::new();
            for key in next {
                if step.count.is_repeatable() && !visited.insert(key.clone()) {
                    continue;
                }
                output.push(key.clone());
                fresh.push(key);
            }
            current = fresh;
            hops += 1;
        }
        match &step.target_class {
            Some(class) => output
                .into_iter()
                .filter(|k| class.matches(&k.class_name, &crate::collab::SchemaHierarchy(self)))
                .collect(),
            None => output,
        }
    }

    fn related(&self, parents: &[InstanceKey], paths: &[RelationshipPath]) -> Vec<InstanceKey> {
        let mut output = Vec::new();
        for path in paths {
            let mut frontier = parents.to_vec();
            for step in &path.steps {
                frontier = self.step_targets(frontier, step);
            }
            output.extend(frontier);
        }
        output
    }

    fn class_matches(&self, class: &ClassRef, class_name: &str) -> bool {
        class.matches(class_name, &crate::collab::SchemaHierarchy(self))
    }

    fn resolve(&self, request: &QueryRequest) -> Result<Vec<InstanceRecord>, QueryError> {
        let spec = &request.specification;
        if self.failing_specs.contains(&spec.id) {
            return Err(QueryError::Failed {
                specification: spec.id.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        let mut records: Vec<InstanceRecord> = match &spec.kind {
            SpecificationKind::AllInstances => self.instances.clone(),
            SpecificationKind::InstancesOfClasses {
                classes,
                excluded_classes,
            } => self
                .instances
                .iter()
                .filter(|r| classes.iter().any(|c| self.class_matches(c, r.class_name())))
                .filter(|r| !excluded_classes.iter().any(|c| self.class_matches(c, r.class_name())))
                .cloned()
                .collect(),
            SpecificationKind::RelatedInstances { paths } => self
                .related(&request.parent_instance_keys, paths)
                .iter()
                .filter_map(|k| self.record(k).cloned())
                .collect(),
            SpecificationKind::QueryResult { queries } => queries
                .iter()
                .flat_map(|q| {
                    self.instances.iter().filter(move |r| {
                        self.class_matches(&q.class, r.class_name())
                            && (q.query == "*" || r.label.display_value.starts_with(&q.query))
                    })
                })
                .cloned()
                .collect(),
            SpecificationKind::CustomNode { .. } => Vec::new(),
        };
        if let Some(name) = &request.instance_filter {
            let filter = self.filters.get(name).ok_or_else(|| QueryError::Failed {
                specification: spec.id.clone(),
                reason: format!("unknown instance filter `{}`", name),
            })?;
            records.retain(|r| filter(r));
        }
        Ok(records)
    }
}

#[async_trait]
impl InstanceQuery for InMemoryStore {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<InstanceRecord>, QueryError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.resolve(request)
    }

    async fn count(&self, request: &QueryRequest) -> Result<usize, QueryError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.resolve(request)?;
        let unique: FxHashSet<&InstanceKey> = records.iter().map(|r| &r.key).collect();
        Ok(unique.len())
    }
}

impl SchemaCatalog for InMemoryStore {
    fn base_classes(&self, class_name: &str) -> Vec<String> {
        self.bases.get(class_name).cloned().unwrap_or_default()
    }

    fn class_label(&self, class_name: &str) -> String {
        self.class_labels
            .get(class_name)
            .cloned()
            .unwrap_or_else(|| class_name.to_string())
    }
}

// ===================== 脚本化表达式求值 =====================

/// 表达式文本 -> 闭包；未注册的表达式按解析失败处理
#[derive(Default)]
pub(crate) struct ScriptedEvaluator {
    scripts: FxHashMap<String, ScriptFn>,
    pub calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, expression: &str, script: F) -> Self
    where
        F: Fn(&ExpressionContext) -> Result<Value, ExpressionError> + Send + Sync + 'static,
    {
        self.scripts.insert(expression.to_string(), Arc::new(script));
        self
    }
}

#[async_trait]
impl ExpressionEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, expression: &str, context: &ExpressionContext) -> Result<Value, ExpressionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(expression) {
            Some(script) => script(context),
            None => Err(ExpressionError::Parse(format!("unknown expression `{}`", expression))),
        }
    }
}

// ===================== 规则集构造 =====================

pub(crate) fn custom_spec(id: &str, label: &str) -> ChildNodeSpecification {
    ChildNodeSpecification::new(
        id,
        SpecificationKind::CustomNode {
            node_type: "Custom".into(),
            label: label.into(),
            description: None,
            image_id: None,
        },
    )
}

pub(crate) fn classes_spec(id: &str, classes: &[&str]) -> ChildNodeSpecification {
    ChildNodeSpecification::new(
        id,
        SpecificationKind::InstancesOfClasses {
            classes: classes.iter().map(|c| ClassRef::polymorphic(*c)).collect(),
            excluded_classes: vec![],
        },
    )
}

pub(crate) fn related_spec(id: &str, relationship: &str) -> ChildNodeSpecification {
    ChildNodeSpecification::new(
        id,
        SpecificationKind::RelatedInstances {
            paths: vec![RelationshipPath::single(RelationshipStep::forward(relationship))],
        },
    )
}

/// 以默认配置组装管理器
pub(crate) fn manager(store: InMemoryStore, evaluator: ScriptedEvaluator, rulesets: Vec<RuleSet>) -> (NavTreeManager, Arc<InMemoryStore>) {
    manager_with_config(EngineConfig::default(), store, evaluator, rulesets)
}

pub(crate) fn manager_with_config(
    config: EngineConfig,
    store: InMemoryStore,
    evaluator: ScriptedEvaluator,
    rulesets: Vec<RuleSet>,
) -> (NavTreeManager, Arc<InMemoryStore>) {
    crate::logging::init_test_logger();
    let locator = InMemoryRulesetLocator::new();
    for ruleset in rulesets {
        locator.add(ruleset).unwrap();
    }
    let store = Arc::new(store);
    let manager = NavTreeManager::new(
        config,
        Arc::new(locator),
        Arc::new(evaluator),
        store.clone(),
        store.clone(),
    )
    .unwrap();
    (manager, store)
}

pub(crate) fn labels(nodes: &[NavNode]) -> Vec<String> {
    nodes.iter().map(|n| n.display_label().to_string()).collect()
}

/// 完整读取父节点（None 为根）的子节点
pub(crate) async fn children(manager: &NavTreeManager, ruleset_id: &str, parent: Option<&NavNode>) -> Vec<NavNode> {
    let mut request = HierarchyRequest::new(ruleset_id);
    if let Some(node) = parent {
        request = request.with_parent(node.key.clone());
    }
    manager
        .get_children(&request, PageOptions::default(), &CancellationToken::new())
        .await
        .unwrap()
        .nodes
}
