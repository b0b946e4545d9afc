//! 导航树管理器（对外入口）
//! 1. 请求校验：规则集、变量、分页参数在任何层级构建前校验
//! 2. 分页子节点 / 子节点计数 / 子节点判定 / 文本过滤
//! 3. 缓存失效
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use rsnavtree_engine::{NavNode, NodeKey, RulesetVariables, TextFilter};

use crate::collab::{ExpressionEvaluator, InstanceQuery, RulesetLocator, SchemaCatalog};
use crate::config::EngineConfig;
use crate::error::{NavError, NavResult};
use crate::filter::FilteredNode;
use crate::hierarchy::{Combination, HierarchyCache, LevelBuilder, NodeHandle, Services, Want};

/// 层级请求：规则集 + 变量快照 + 父节点（None 为根）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyRequest {
    pub ruleset_id: String,
    #[serde(default)]
    pub variables: RulesetVariables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeKey>,
}

impl HierarchyRequest {
    pub fn new(ruleset_id: impl Into<String>) -> Self {
        Self {
            ruleset_id: ruleset_id.into(),
            variables: RulesetVariables::new(),
            parent: None,
        }
    }

    pub fn with_variables(mut self, variables: RulesetVariables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_parent(mut self, parent: NodeKey) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// 分页参数（size 为 None 时取配置的默认分页大小）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PageOptions {
    pub start: usize,
    pub size: Option<usize>,
}

impl PageOptions {
    pub fn new(start: usize, size: usize) -> Self {
        Self {
            start,
            size: Some(size),
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodesPage {
    pub nodes: Vec<NavNode>,
    pub has_more: bool,
}

/// 过滤请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub ruleset_id: String,
    #[serde(default)]
    pub variables: RulesetVariables,
    pub text: String,
}

impl FilterRequest {
    pub fn new(ruleset_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ruleset_id: ruleset_id.into(),
            variables: RulesetVariables::new(),
            text: text.into(),
        }
    }

    pub fn with_variables(mut self, variables: RulesetVariables) -> Self {
        self.variables = variables;
        self
    }
}

/// 导航树管理器
pub struct NavTreeManager {
    services: Services,
    locator: Arc<dyn RulesetLocator>,
    cache: HierarchyCache,
}

impl NavTreeManager {
    pub fn new(
        config: EngineConfig,
        locator: Arc<dyn RulesetLocator>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        query: Arc<dyn InstanceQuery>,
        schema: Arc<dyn SchemaCatalog>,
    ) -> NavResult<Self> {
        config.validate()?;
        let cache = HierarchyCache::new(config.max_cached_combinations);
        Ok(Self {
            services: Services {
                config,
                evaluator,
                query,
                schema,
            },
            locator,
            cache,
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    // ===================== 请求校验 =====================

    fn combination(&self, ruleset_id: &str, variables: &RulesetVariables) -> NavResult<Arc<Combination>> {
        if ruleset_id.trim().is_empty() {
            return Err(NavError::InvalidRequest("empty ruleset id".to_string()));
        }
        variables
            .validate()
            .map_err(|e| NavError::InvalidVariables(e.to_string()))?;
        let bundle = self
            .locator
            .locate(ruleset_id)
            .ok_or_else(|| NavError::RulesetNotFound(ruleset_id.to_string()))?;
        Ok(self.cache.combination(bundle, variables))
    }

    fn page_size(&self, page: &PageOptions) -> NavResult<usize> {
        let size = page.size.unwrap_or(self.services.config.default_page_size);
        if size == 0 || size > self.services.config.max_page_size {
            return Err(NavError::InvalidRequest(format!(
                "page size {} out of range 1..={}",
                size, self.services.config.max_page_size
            )));
        }
        Ok(size)
    }

    async fn resolve_parent(builder: LevelBuilder<'_>, parent: Option<&NodeKey>) -> NavResult<Option<NodeHandle>> {
        match parent {
            Some(key) => Ok(Some(builder.locate(key).await?)),
            None => Ok(None),
        }
    }

    // ===================== 层级请求 =====================

    /// 分页获取子节点
    pub async fn get_children(
        &self,
        request: &HierarchyRequest,
        page: PageOptions,
        cancel: &CancellationToken,
    ) -> NavResult<NodesPage> {
        let size = self.page_size(&page)?;
        let combo = self.combination(&request.ruleset_id, &request.variables)?;
        let builder = LevelBuilder::new(&combo, &self.services, cancel);

        let parent = Self::resolve_parent(builder, request.parent.as_ref()).await?;
        let end = page.start.saturating_add(size);
        let (handles, _) = builder.child_handles(parent, Want::Beyond(end)).await?;
        let slice: Vec<NodeHandle> = handles.iter().skip(page.start).take(size).copied().collect();
        let nodes = builder.publish(&slice).await?;
        combo.ensure_fresh()?;

        log::debug!(
            "Returning {} nodes of ruleset `{}` (start {}, size {})",
            nodes.len(),
            request.ruleset_id,
            page.start,
            size
        );
        Ok(NodesPage {
            nodes,
            has_more: handles.len() > end,
        })
    }

    /// 子节点总数（缓存后复用）
    pub async fn get_children_count(&self, request: &HierarchyRequest, cancel: &CancellationToken) -> NavResult<usize> {
        let combo = self.combination(&request.ruleset_id, &request.variables)?;
        let builder = LevelBuilder::new(&combo, &self.services, cancel);
        let parent = Self::resolve_parent(builder, request.parent.as_ref()).await?;
        let count = builder.count_children(parent).await?;
        combo.ensure_fresh()?;
        Ok(count)
    }

    /// 节点是否有子节点（请求必须带父节点）
    pub async fn has_children(&self, request: &HierarchyRequest, cancel: &CancellationToken) -> NavResult<bool> {
        let key = request
            .parent
            .as_ref()
            .ok_or_else(|| NavError::InvalidRequest("has_children requires a node".to_string()))?;
        let combo = self.combination(&request.ruleset_id, &request.variables)?;
        let builder = LevelBuilder::new(&combo, &self.services, cancel);
        let handle = builder.locate(key).await?;
        let flag = builder.has_children(handle).await?;
        combo.ensure_fresh()?;
        Ok(flag)
    }

    /// 按显示标签过滤整个层级
    pub async fn filter(&self, request: &FilterRequest, cancel: &CancellationToken) -> NavResult<Vec<FilteredNode>> {
        let filter = TextFilter::new(&request.text, self.services.config.filter.case_sensitive)?;
        let combo = self.combination(&request.ruleset_id, &request.variables)?;
        let builder = LevelBuilder::new(&combo, &self.services, cancel);
        let result = builder
            .filter_hierarchy(&filter, &self.services.config.filter)
            .await?;
        combo.ensure_fresh()?;
        Ok(result)
    }

    // ===================== 缓存失效 =====================

    /// 使某规则集的全部缓存层级失效，进行中的请求得到可重试的 StaleLevel
    pub fn invalidate_ruleset(&self, ruleset_id: &str) -> usize {
        let count = self.cache.invalidate_ruleset(ruleset_id);
        log::info!("Invalidated {} cached combinations of ruleset `{}`", count, ruleset_id);
        count
    }

    pub fn invalidate_all(&self) -> usize {
        let count = self.cache.invalidate_all();
        log::info!("Invalidated all {} cached combinations", count);
        count
    }

    /// 当前缓存的组合数
    pub fn cached_combinations(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        children, classes_spec, custom_spec, labels, manager, manager_with_config, related_spec, InMemoryStore,
        ScriptedEvaluator,
    };
    use rsnavtree_engine::{
        ClassRef, CustomizationKind, CustomizationRule, GroupSpec, GroupingRule, InstanceKey,
        InstanceRecord, NavigationRule, NodeType, PropertyGroupSpec, RuleSet, SameLabelStage,
        SpecificationKind, Value, VariableValue,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::OnceLock;

    async fn page_of(m: &NavTreeManager, start: usize, size: usize) -> NodesPage {
        m.get_children(&HierarchyRequest::new("rs"), PageOptions::new(start, size), &CancellationToken::new())
            .await
            .unwrap()
    }

    fn flat(mut spec: rsnavtree_engine::ChildNodeSpecification) -> rsnavtree_engine::ChildNodeSpecification {
        spec.group_by_label = false;
        spec
    }

    fn root_ruleset(id: &str, specs: Vec<rsnavtree_engine::ChildNodeSpecification>) -> RuleSet {
        let rule = specs
            .into_iter()
            .fold(NavigationRule::new(), |rule, spec| rule.with_specification(spec));
        RuleSet::new(id).with_root_rule(rule)
    }

    fn is_parent_type(ctx: &crate::collab::ExpressionContext, custom: bool) -> Value {
        let matched = ctx
            .parent()
            .map_or(false, |p| matches!(p.node().key.node_type, NodeType::Custom(_)) == custom);
        Value::Bool(matched)
    }

    // ===================== 分页 =====================

    #[tokio::test]
    async fn test_same_page_twice_is_identical() {
        let store = (1..=20u64)
            .rev()
            .fold(InMemoryStore::new(), |s, i| s.with_instance("E", i, &format!("Item {:02}", i)));
        let ruleset = root_ruleset("rs", vec![flat(classes_spec("items", &["E"]))]);
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);

        let first = page_of(&m, 0, 5).await;
        let again = page_of(&m, 0, 5).await;
        assert_eq!(first, again);
        assert!(first.has_more);
        assert_eq!(labels(&first.nodes), vec!["Item 01", "Item 02", "Item 03", "Item 04", "Item 05"]);

        let mut all = Vec::new();
        for start in (0..20).step_by(5) {
            let page = page_of(&m, start, 5).await;
            assert_eq!(page.has_more, start + 5 < 20);
            all.extend(page.nodes);
        }
        let whole = children(&m, "rs", None).await;
        let keys = |nodes: &[NavNode]| nodes.iter().map(|n| n.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&all), keys(&whole));
    }

    #[tokio::test]
    async fn test_page_size_out_of_range_is_rejected() {
        let ruleset = root_ruleset("rs", vec![custom_spec("c", "c")]);
        let (m, _) = manager(InMemoryStore::new(), ScriptedEvaluator::new(), vec![ruleset]);
        let cancel = CancellationToken::new();
        let request = HierarchyRequest::new("rs");
        let err = m.get_children(&request, PageOptions::new(0, 0), &cancel).await.unwrap_err();
        assert!(matches!(err, NavError::InvalidRequest(_)));
        let err = m.get_children(&request, PageOptions::new(0, 10_001), &cancel).await.unwrap_err();
        assert!(matches!(err, NavError::InvalidRequest(_)));
    }

    // ===================== 排序 =====================

    #[tokio::test]
    async fn test_do_not_sort_keeps_query_order() {
        let store = InMemoryStore::new()
            .with_instance("E", 1, "b")
            .with_instance("E", 2, "a")
            .with_instance("E", 3, "c");
        let mut unsorted = flat(classes_spec("items", &["E"]));
        unsorted.do_not_sort = true;
        let (m, _) = manager(
            store,
            ScriptedEvaluator::new(),
            vec![
                root_ruleset("unsorted", vec![unsorted]),
                root_ruleset("sorted", vec![flat(classes_spec("items", &["E"]))]),
            ],
        );
        assert_eq!(labels(&children(&m, "unsorted", None).await), vec!["b", "a", "c"]);
        assert_eq!(labels(&children(&m, "sorted", None).await), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sorting_is_stable_for_large_levels() {
        // 测试场景：1200 个兄弟节点、大量重复标签时按标签升序且保持查询顺序
        let store = (0..1200u64).fold(InMemoryStore::new(), |s, i| {
            s.with_instance("E", i, &format!("Node {}", (1199 - i) % 7))
        });
        let ruleset = root_ruleset("rs", vec![flat(classes_spec("items", &["E"]))]);
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);

        let nodes = page_of(&m, 0, 2000).await.nodes;
        assert_eq!(nodes.len(), 1200);
        for pair in nodes.windows(2) {
            let ord = rsnavtree_engine::compare_labels(pair[0].display_label(), pair[1].display_label());
            assert_ne!(ord, std::cmp::Ordering::Greater);
            if ord == std::cmp::Ordering::Equal {
                assert!(pair[0].instance_keys()[0].id < pair[1].instance_keys()[0].id);
            }
        }
    }

    // ===================== 递归守卫 =====================

    fn recursive_ruleset(suppress: bool) -> RuleSet {
        let mut next = flat(related_spec("next", "links"));
        next.suppress_similar_ancestors_check = suppress;
        RuleSet::new("rs")
            .with_root_rule(NavigationRule::new().with_specification(custom_spec("root", "Root")))
            .with_child_rule(
                NavigationRule::new()
                    .with_condition("parent_is_custom")
                    .with_specification(flat(classes_spec("es", &["E"]))),
            )
            .with_child_rule(
                NavigationRule::new()
                    .with_condition("parent_is_instance")
                    .with_specification(next),
            )
    }

    fn recursive_fixture(suppress: bool) -> NavTreeManager {
        let store = InMemoryStore::new()
            .with_instance("E", 1, "e1")
            .relate("links", ("E", 1), ("E", 1));
        let evaluator = ScriptedEvaluator::new()
            .with("parent_is_custom", |ctx| Ok(is_parent_type(ctx, true)))
            .with("parent_is_instance", |ctx| Ok(is_parent_type(ctx, false)));
        manager(store, evaluator, vec![recursive_ruleset(suppress)]).0
    }

    #[tokio::test]
    async fn test_self_reference_terminates_at_similar_ancestor() {
        let m = recursive_fixture(false);
        let mut level = children(&m, "rs", None).await;
        let mut depth = 0;
        while let Some(node) = level.first().cloned() {
            assert_eq!(level.len(), 1);
            if node.has_children == Some(false) {
                break;
            }
            level = children(&m, "rs", Some(&node)).await;
            depth += 1;
            assert!(depth < 10, "expansion did not terminate");
        }
        // Root -> e1(es) -> e1(next) -> e1(next, terminated)
        assert_eq!(depth, 3);
        let terminal = &level[0];
        assert_eq!(terminal.key.specification_id, "next");
        assert!(children(&m, "rs", Some(terminal)).await.is_empty());
    }

    #[tokio::test]
    async fn test_suppressed_check_recurses_without_cutoff() {
        let m = recursive_fixture(true);
        let mut level = children(&m, "rs", None).await;
        for _ in 0..12 {
            assert_eq!(level.len(), 1);
            assert_eq!(level[0].has_children, Some(true));
            let node = level[0].clone();
            level = children(&m, "rs", Some(&node)).await;
        }
        assert_eq!(labels(&level), vec!["e1"]);
        assert_eq!(level[0].key.path.len(), 12);
    }

    // ===================== 分组 =====================

    #[tokio::test]
    async fn test_single_member_class_group_collapses_unless_always_group() {
        let store = InMemoryStore::new()
            .with_instance("Wall", 1, "w1")
            .with_instance("Door", 2, "d1")
            .with_instance("Door", 3, "d2");
        let mut grouped = flat(classes_spec("els", &["Wall", "Door"]));
        grouped.group_by_class = true;
        let mut always = grouped.clone();
        always.always_group = true;
        let (m, _) = manager(
            store,
            ScriptedEvaluator::new(),
            vec![root_ruleset("collapse", vec![grouped]), root_ruleset("always", vec![always])],
        );

        let roots = children(&m, "collapse", None).await;
        assert_eq!(labels(&roots), vec!["Door", "w1"]);
        assert_eq!(roots[0].key.node_type, NodeType::ClassGrouping);
        assert_eq!(roots[0].has_children, Some(true));
        assert_eq!(roots[1].key.node_type, NodeType::Instance);
        assert_eq!(labels(&children(&m, "collapse", Some(&roots[0])).await), vec!["d1", "d2"]);

        let count = m
            .get_children_count(
                &HierarchyRequest::new("collapse").with_parent(roots[0].key.clone()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(count, 2);

        let roots = children(&m, "always", None).await;
        assert_eq!(labels(&roots), vec!["Door", "Wall"]);
        assert!(roots.iter().all(|n| n.key.node_type == NodeType::ClassGrouping));
    }

    fn property_grouping(spec: PropertyGroupSpec) -> CustomizationRule {
        CustomizationRule::new(CustomizationKind::Grouping(GroupingRule {
            class: ClassRef::polymorphic("E"),
            groups: vec![GroupSpec::Property(spec)],
        }))
    }

    #[tokio::test]
    async fn test_unspecified_values_fold_into_one_group() {
        let record = |id: u64, label: &str, value: Option<Value>| {
            let record = InstanceRecord::new(InstanceKey::new("E", id), label);
            match value {
                Some(v) => record.with_property("Material", v),
                None => record,
            }
        };
        let store = InMemoryStore::new()
            .with_record(record(1, "a", Some("Steel".into())))
            .with_record(record(2, "b", Some("Steel".into())))
            .with_record(record(3, "c", Some(Value::Null)))
            .with_record(record(4, "d", Some("".into())))
            .with_record(record(5, "e", None));
        let ruleset = root_ruleset("rs", vec![flat(classes_spec("els", &["E"]))])
            .with_customization(property_grouping(PropertyGroupSpec::new("Material")));
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);

        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["Steel", "Not specified"]);
        assert!(roots.iter().all(|n| n.key.node_type == NodeType::PropertyGrouping));
        assert_eq!(roots[1].grouped_instances_count, Some(3));
        assert_eq!(labels(&children(&m, "rs", Some(&roots[1])).await), vec!["c", "d", "e"]);
        assert_eq!(labels(&children(&m, "rs", Some(&roots[0])).await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_property_values_round_half_up_into_separate_buckets() {
        let store = InMemoryStore::new()
            .with_record(InstanceRecord::new(InstanceKey::new("E", 1), "a").with_property("Length", 2.505))
            .with_record(InstanceRecord::new(InstanceKey::new("E", 2), "b").with_property("Length", 2.504));
        let mut grouping = PropertyGroupSpec::new("Length");
        grouping.create_group_for_single_item = true;
        let ruleset = root_ruleset("rs", vec![flat(classes_spec("els", &["E"]))])
            .with_customization(property_grouping(grouping));
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);

        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["2.50", "2.51"]);
        assert_eq!(labels(&children(&m, "rs", Some(&roots[1])).await), vec!["a"]);
    }

    // ===================== 同标签合并 =====================

    #[tokio::test]
    async fn test_same_label_merge_across_hidden_branches() {
        let store = InMemoryStore::new()
            .with_instance("F", 1, "f1")
            .with_instance("F", 2, "f2")
            .with_instance("E", 1, "Shared")
            .with_instance("E", 2, "Shared")
            .with_instance("E", 3, "Unique")
            .with_instance("X", 1, "x1")
            .with_instance("X", 2, "x2")
            .relate("contains", ("F", 1), ("E", 1))
            .relate("contains", ("F", 1), ("E", 3))
            .relate("contains", ("F", 2), ("E", 2))
            .relate("contains", ("E", 1), ("X", 1))
            .relate("contains", ("E", 2), ("X", 2));
        let mut folders = flat(classes_spec("folders", &["F"]));
        folders.hide_nodes_in_hierarchy = true;
        let ruleset = RuleSet::new("rs")
            .with_root_rule(NavigationRule::new().with_specification(folders))
            .with_child_rule(NavigationRule::new().with_specification(flat(related_spec("contents", "contains"))))
            .with_customization(CustomizationRule::new(CustomizationKind::Grouping(GroupingRule {
                class: ClassRef::polymorphic("E"),
                groups: vec![GroupSpec::SameLabelInstance {
                    stage: SameLabelStage::PostProcess,
                }],
            })));
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);

        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["Shared", "Unique"]);
        assert_eq!(
            roots[0].instance_keys(),
            &[InstanceKey::new("E", 1), InstanceKey::new("E", 2)]
        );
        assert_eq!(roots[0].has_children, Some(true));
        assert_eq!(labels(&children(&m, "rs", Some(&roots[0])).await), vec!["x1", "x2"]);
        assert_eq!(roots[1].has_children, Some(false));
    }

    // ===================== 组合层级 =====================

    #[tokio::test]
    async fn test_empty_sibling_specification_does_not_shift_results() {
        let store = InMemoryStore::new()
            .with_instance("C", 1, "child3")
            .with_instance("C", 2, "child2");
        let ruleset = root_ruleset(
            "rs",
            vec![flat(classes_spec("a", &["Missing"])), flat(classes_spec("b", &["C"]))],
        );
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);

        let first = page_of(&m, 0, 1).await;
        assert_eq!(labels(&first.nodes), vec!["child2"]);
        assert!(first.has_more);
        let second = page_of(&m, 1, 1).await;
        assert_eq!(labels(&second.nodes), vec!["child3"]);
        assert!(!second.has_more);
        assert_eq!(labels(&children(&m, "rs", None).await), vec!["child2", "child3"]);
    }

    #[tokio::test]
    async fn test_failed_query_contributes_nothing() {
        let store = InMemoryStore::new()
            .with_instance("C", 1, "ok")
            .failing("broken");
        let ruleset = root_ruleset(
            "rs",
            vec![flat(classes_spec("broken", &["C"])), flat(classes_spec("fine", &["C"]))],
        );
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);
        let count = m
            .get_children_count(&HierarchyRequest::new("rs"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 1);
        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["ok"]);
        assert_eq!(roots[0].key.specification_id, "fine");
    }

    // ===================== 过滤 =====================

    #[tokio::test]
    async fn test_filter_wildcards_match_literally() {
        let store = InMemoryStore::new()
            .with_instance("E", 1, "a%b")
            .with_instance("E", 2, "axxb")
            .with_instance("E", 3, "node_1")
            .with_instance("E", 4, "node1");
        let ruleset = root_ruleset("rs", vec![flat(classes_spec("els", &["E"]))]);
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);
        let cancel = CancellationToken::new();

        let found = m.filter(&FilterRequest::new("rs", "%"), &cancel).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node.display_label(), "a%b");
        assert!(found[0].is_match);

        let found = m.filter(&FilterRequest::new("rs", "_"), &cancel).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node.display_label(), "node_1");
    }

    #[tokio::test]
    async fn test_filter_after_paging_keeps_cached_count() {
        let store = (0..1001u64).fold(InMemoryStore::new(), |s, i| {
            s.with_instance("E", i, &format!("Item {:04}", i))
        });
        let ruleset = root_ruleset("rs", vec![flat(classes_spec("els", &["E"]))]);
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);
        let cancel = CancellationToken::new();

        let first = page_of(&m, 0, 5).await;
        assert_eq!(first.nodes.len(), 5);
        assert!(first.has_more);

        let found = m.filter(&FilterRequest::new("rs", "Item 1000"), &cancel).await.unwrap();
        assert_eq!(found.iter().map(FilteredNode::matched_nodes).sum::<usize>(), 1);
        assert_eq!(found[0].node.display_label(), "Item 1000");

        let count = m.get_children_count(&HierarchyRequest::new("rs"), &cancel).await.unwrap();
        assert_eq!(count, 1001);
    }

    #[tokio::test]
    async fn test_empty_filter_text_is_rejected() {
        let (m, _) = manager(InMemoryStore::new(), ScriptedEvaluator::new(), vec![root_ruleset("rs", vec![custom_spec("c", "c")])]);
        let err = m
            .filter(&FilterRequest::new("rs", ""), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::Core(_)));
    }

    // ===================== 请求校验 =====================

    #[tokio::test]
    async fn test_caller_errors() {
        let (m, _) = manager(InMemoryStore::new(), ScriptedEvaluator::new(), vec![root_ruleset("rs", vec![custom_spec("c", "c")])]);
        let cancel = CancellationToken::new();

        let err = m
            .get_children(&HierarchyRequest::new("missing"), PageOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::RulesetNotFound(id) if id == "missing"));

        let bad_vars = RulesetVariables::new().with("has space", VariableValue::Bool(true));
        let err = m
            .get_children(&HierarchyRequest::new("rs").with_variables(bad_vars), PageOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::InvalidVariables(_)));

        let err = m.has_children(&HierarchyRequest::new("rs"), &cancel).await.unwrap_err();
        assert!(matches!(err, NavError::InvalidRequest(_)));

        let ghost = rsnavtree_engine::NodeKey::new(NodeType::Instance, "c", vec![InstanceKey::new("E", 9)], None, vec![]);
        let err = m
            .get_children(&HierarchyRequest::new("rs").with_parent(ghost), PageOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let (m, _) = manager(InMemoryStore::new(), ScriptedEvaluator::new(), vec![root_ruleset("rs", vec![custom_spec("c", "c")])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = m
            .get_children(&HierarchyRequest::new("rs"), PageOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::Cancelled));
        assert!(err.is_retryable());

        // 取消不会污染缓存，后续请求正常完成
        let page = m
            .get_children(&HierarchyRequest::new("rs"), PageOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(labels(&page.nodes), vec!["c"]);
    }

    // ===================== 变量与缓存 =====================

    #[tokio::test]
    async fn test_variables_select_rules() {
        let evaluator = ScriptedEvaluator::new().with("show_extra", |ctx| {
            Ok(Value::Bool(ctx.variables.get_bool("extra")))
        });
        let ruleset = RuleSet::new("rs")
            .with_root_rule(NavigationRule::new().with_specification(custom_spec("base", "base")))
            .with_root_rule(
                NavigationRule::new()
                    .with_condition("show_extra")
                    .with_specification(custom_spec("extra", "extra")),
            );
        let (m, _) = manager(InMemoryStore::new(), evaluator, vec![ruleset]);
        let cancel = CancellationToken::new();

        let plain = m
            .get_children(&HierarchyRequest::new("rs"), PageOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(labels(&plain.nodes), vec!["base"]);

        let vars = RulesetVariables::new().with("extra", VariableValue::Bool(true));
        let extended = m
            .get_children(&HierarchyRequest::new("rs").with_variables(vars), PageOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(labels(&extended.nodes), vec!["base", "extra"]);
        assert_eq!(m.cached_combinations(), 2);
    }

    #[tokio::test]
    async fn test_locate_after_invalidation() {
        let store = InMemoryStore::new()
            .with_instance("F", 1, "f1")
            .with_instance("E", 1, "e1")
            .relate("contains", ("F", 1), ("E", 1));
        let ruleset = RuleSet::new("rs")
            .with_root_rule(NavigationRule::new().with_specification(flat(classes_spec("folders", &["F"]))))
            .with_child_rule(NavigationRule::new().with_specification(flat(related_spec("contents", "contains"))));
        let (m, store) = manager(store, ScriptedEvaluator::new(), vec![ruleset]);

        let roots = children(&m, "rs", None).await;
        let level = children(&m, "rs", Some(&roots[0])).await;
        assert_eq!(labels(&level), vec!["e1"]);

        assert_eq!(m.invalidate_ruleset("rs"), 1);
        assert_eq!(m.cached_combinations(), 0);
        let before = store.query_calls.load(Ordering::SeqCst);

        // 调用方持有的旧Key在新组合中沿路径重新定位
        let request = HierarchyRequest::new("rs").with_parent(level[0].key.clone());
        let grandchildren = m
            .get_children(&request, PageOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(grandchildren.nodes.is_empty());
        assert!(store.query_calls.load(Ordering::SeqCst) > before);
        assert!(!m.has_children(&request, &CancellationToken::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidation_during_build_reports_stale_level() {
        let slot: Arc<OnceLock<Arc<NavTreeManager>>> = Arc::new(OnceLock::new());
        let fired = Arc::new(AtomicBool::new(false));
        let evaluator = {
            let slot = slot.clone();
            let fired = fired.clone();
            ScriptedEvaluator::new().with("invalidate_once", move |_| {
                if !fired.swap(true, Ordering::SeqCst) {
                    if let Some(m) = slot.get() {
                        m.invalidate_all();
                    }
                }
                Ok(Value::Bool(false))
            })
        };
        let mut spec = custom_spec("c", "c");
        spec.hide_expression = Some("invalidate_once".to_string());
        let (m, _) = manager(InMemoryStore::new(), evaluator, vec![root_ruleset("rs", vec![spec])]);
        let m = Arc::new(m);
        let _ = slot.set(m.clone());

        let cancel = CancellationToken::new();
        let err = m
            .get_children(&HierarchyRequest::new("rs"), PageOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::StaleLevel { .. }));
        assert!(err.is_retryable());

        let retry = m
            .get_children(&HierarchyRequest::new("rs"), PageOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(labels(&retry.nodes), vec!["c"]);
    }

    #[tokio::test]
    async fn test_retry_after_cancelled_build_reuses_committed_node() {
        // 测试场景：节点入库后、提交前请求被取消；重试后按Key定位到提交的节点，复用其子层级
        let store = InMemoryStore::new()
            .with_instance("E", 1, "k1")
            .with_instance("E", 2, "k2");
        let first_request = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));
        let evaluator = {
            let token = first_request.clone();
            let fired = fired.clone();
            ScriptedEvaluator::new().with("under_a", move |ctx| {
                if !fired.swap(true, Ordering::SeqCst) {
                    token.cancel();
                }
                Ok(Value::Bool(
                    ctx.parent().and_then(|p| p.specification_id()) == Some("a"),
                ))
            })
        };
        let mut a = custom_spec("a", "a");
        a.hide_if_no_children = true;
        let ruleset = root_ruleset("rs", vec![a]).with_child_rule(
            NavigationRule::new()
                .with_condition("under_a")
                .with_specification(classes_spec("kids", &["E"])),
        );
        let (m, store) = manager(store, evaluator, vec![ruleset]);

        let err = m
            .get_children(&HierarchyRequest::new("rs"), PageOptions::default(), &first_request)
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::Cancelled));

        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["a"]);
        assert_eq!(roots[0].has_children, Some(true));
        let queries = store.query_calls.load(Ordering::SeqCst);

        assert_eq!(labels(&children(&m, "rs", Some(&roots[0])).await), vec!["k1", "k2"]);
        assert_eq!(store.query_calls.load(Ordering::SeqCst), queries);
    }

    // ===================== 子节点判定配置 =====================

    #[tokio::test]
    async fn test_children_left_undetermined_when_disabled() {
        let config = EngineConfig::builder()
            .determine_children_on_page(false)
            .build()
            .unwrap();
        let mut always = custom_spec("always", "always");
        always.children_hint = rsnavtree_engine::ChildrenHint::Always;
        let (m, _) = manager_with_config(
            config,
            InMemoryStore::new(),
            ScriptedEvaluator::new(),
            vec![root_ruleset("rs", vec![always, custom_spec("plain", "plain")])],
        );
        let roots = children(&m, "rs", None).await;
        assert_eq!(labels(&roots), vec!["always", "plain"]);
        assert_eq!(roots[0].has_children, Some(true));
        assert_eq!(roots[1].has_children, None);
    }

    #[tokio::test]
    async fn test_query_result_specification() {
        let store = InMemoryStore::new()
            .with_instance("E", 1, "alpha")
            .with_instance("E", 2, "beta")
            .with_instance("E", 3, "alpine");
        let spec = flat(rsnavtree_engine::ChildNodeSpecification::new(
            "q",
            SpecificationKind::QueryResult {
                queries: vec![
                    rsnavtree_engine::QuerySpec {
                        class: ClassRef::polymorphic("E"),
                        query: "al".into(),
                    },
                    rsnavtree_engine::QuerySpec {
                        class: ClassRef::polymorphic("E"),
                        query: "alpha".into(),
                    },
                ],
            },
        ));
        let (m, _) = manager(store, ScriptedEvaluator::new(), vec![root_ruleset("rs", vec![spec])]);
        // 多个查询命中同一实例时只保留一次
        assert_eq!(labels(&children(&m, "rs", None).await), vec!["alpha", "alpine"]);
    }
}
