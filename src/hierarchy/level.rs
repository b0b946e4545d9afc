use rustc_hash::FxHashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use rsnavtree_engine::{ClassRef, GroupingPlan, SortingRule, SpecificationKind, SpecificationRef};

use super::record::NodeHandle;

/// 单个规格在层级中的构建计划
#[derive(Debug, Clone)]
pub(crate) struct PlanEntry {
    /// 新节点的祖先链：规格所针对父节点的祖先 + 该父节点
    /// （根层级为空；同标签合并节点的子层级按各原始节点分别生成条目）
    pub lineage: Arc<[NodeHandle]>,
    pub specification: SpecificationRef,
    pub grouping: GroupingPlan,
    /// 查询阶段同标签合并作用的类
    pub same_label_classes: Vec<ClassRef>,
    /// 规格内排序规则（优先级降序）
    pub sorting_rules: Vec<SortingRule>,
}

impl PlanEntry {
    /// 能否只计数不物化：节点数等于查询结果数
    pub fn is_countable(&self) -> bool {
        let spec = &self.specification;
        let simple_kind = matches!(
            spec.kind,
            SpecificationKind::AllInstances
                | SpecificationKind::InstancesOfClasses { .. }
                | SpecificationKind::CustomNode { .. }
        );
        simple_kind
            && self.grouping.is_empty()
            && self.same_label_classes.is_empty()
            && !spec.has_hide_flags()
    }
}

/// 层级构建计划：规则匹配结果，层级首次物化时确定
#[derive(Debug, Clone, Default)]
pub(crate) struct LevelPlan {
    /// 本层级节点Key的可见祖先路径
    pub path: Vec<u64>,
    pub entries: Vec<PlanEntry>,
    /// 后处理阶段同标签合并作用的类
    pub same_label_classes: Vec<ClassRef>,
    /// 层级排序规则
    pub level_sort: Option<SortingRule>,
}

impl LevelPlan {
    /// 需要完整物化后才能发布（后处理会改变节点序列）
    #[inline]
    pub fn is_deferred(&self) -> bool {
        !self.same_label_classes.is_empty() || self.level_sort.is_some()
    }

    #[inline]
    pub fn is_countable(&self) -> bool {
        !self.is_deferred() && self.entries.iter().all(PlanEntry::is_countable)
    }
}

/// 层级物化状态
/// 每个规格的产出整体提交，取消只会丢弃尚未提交的规格
#[derive(Debug, Default)]
pub(crate) struct LevelState {
    pub plan: Option<Arc<LevelPlan>>,
    pub next_entry: usize,
    pub nodes: Vec<NodeHandle>,
    /// 已提交节点的Key哈希（拼接子节点去重）
    pub seen: FxHashSet<u64>,
    /// 缓存的总数（计数请求或完整物化后确定）
    pub total: Option<usize>,
    pub complete: bool,
    pub finalized: bool,
}

/// 一个父节点（或根）在一个（规则集，变量）组合下的子层级
#[derive(Debug)]
pub(crate) struct HierarchyLevel {
    pub parent: Option<NodeHandle>,
    /// 父节点隐藏：层级只用于拼接，不做后处理
    pub splice: bool,
    pub state: Mutex<LevelState>,
}

impl HierarchyLevel {
    pub fn new(parent: Option<NodeHandle>, splice: bool) -> Self {
        Self {
            parent,
            splice,
            state: Mutex::new(LevelState::default()),
        }
    }
}

/// 物化快照
#[derive(Debug, Clone, Default)]
pub(crate) struct LevelSnapshot {
    pub nodes: Vec<NodeHandle>,
    pub complete: bool,
}
