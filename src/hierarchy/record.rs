use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

use rsnavtree_engine::{
    AncestorFingerprint, GuardState, InstanceRecord, NavNode, PropertyValue, Sortable,
    SpecificationRef, Value,
};

use crate::error::{NavError, NavResult};

/// 节点句柄：组合内节点仓库的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

impl NodeHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for NodeHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 节点记录：已发布导航节点 + 构建所需的内部状态
/// 入库后不可变；子节点判定结果另行缓存
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub(crate) node: NavNode,
    pub(crate) instance: Option<Arc<InstanceRecord>>,
    pub(crate) specification: Option<SpecificationRef>,
    /// 全部祖先（根在前，含隐藏祖先，不含分组节点）
    pub(crate) lineage: Arc<[NodeHandle]>,
    pub(crate) guard: GuardState,
    pub(crate) fingerprint: AncestorFingerprint,
    pub(crate) hidden: bool,
    /// 分组节点的成员
    pub(crate) group_children: Vec<NodeHandle>,
    /// 同标签后处理合并的原始节点（子层级由它们共同提供）
    pub(crate) merged_from: Vec<NodeHandle>,
    pub(crate) artifacts: BTreeMap<String, Value>,
}

impl NodeRecord {
    pub(crate) fn new(
        node: NavNode,
        instance: Option<Arc<InstanceRecord>>,
        specification: Option<SpecificationRef>,
        lineage: Arc<[NodeHandle]>,
    ) -> Self {
        let fingerprint = AncestorFingerprint::of(&node.key);
        let hidden = specification
            .as_ref()
            .map_or(false, |spec| spec.hide_nodes_in_hierarchy && !node.is_grouping());
        Self {
            node,
            instance,
            specification,
            lineage,
            guard: GuardState::Guarded,
            fingerprint,
            hidden,
            group_children: Vec::new(),
            merged_from: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn node(&self) -> &NavNode {
        &self.node
    }

    #[inline]
    pub fn instance(&self) -> Option<&InstanceRecord> {
        self.instance.as_deref()
    }

    #[inline]
    pub fn specification_id(&self) -> Option<&str> {
        self.specification.as_ref().map(|s| s.id.as_str())
    }

    /// 实例属性（自定义节点与分组节点为 None）
    #[inline]
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.instance.as_ref().and_then(|i| i.property(name))
    }

    #[inline]
    pub fn artifacts(&self) -> &BTreeMap<String, Value> {
        &self.artifacts
    }

    #[inline]
    pub fn guard(&self) -> GuardState {
        self.guard
    }

    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    #[inline]
    pub fn is_grouping(&self) -> bool {
        self.node.is_grouping()
    }

    /// 重新计算指纹（Key 变化后调用）
    pub(crate) fn refresh_fingerprint(&mut self) {
        self.fingerprint = AncestorFingerprint::of(&self.node.key);
    }

    /// 是否向后代记录指纹
    #[inline]
    pub(crate) fn recorded_fingerprint(&self) -> Option<&AncestorFingerprint> {
        self.guard.records_fingerprint().then_some(&self.fingerprint)
    }
}

impl Sortable for NodeRecord {
    fn sort_label(&self) -> &str {
        self.node.display_label()
    }

    fn sort_class(&self) -> Option<&str> {
        if self.node.is_grouping() {
            return None;
        }
        self.instance.as_ref().map(|i| i.class_name())
    }

    fn sort_property(&self, name: &str) -> Option<&Value> {
        self.property(name).map(|p| &p.raw)
    }
}

/// 排序用包装：记录 + 句柄
#[derive(Debug, Clone)]
pub(crate) struct HandleRecord {
    pub handle: NodeHandle,
    pub record: Arc<NodeRecord>,
}

impl Sortable for HandleRecord {
    fn sort_label(&self) -> &str {
        self.record.sort_label()
    }

    fn sort_class(&self) -> Option<&str> {
        self.record.sort_class()
    }

    fn sort_property(&self, name: &str) -> Option<&Value> {
        self.record.sort_property(name)
    }
}

/// 节点仓库：按句柄寻址，避免父子/合并节点之间的引用环
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    records: RwLock<Vec<Arc<NodeRecord>>>,
}

impl NodeArena {
    pub fn insert(&self, record: NodeRecord) -> NodeHandle {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push(Arc::new(record));
        NodeHandle(records.len() - 1)
    }

    pub fn get(&self, handle: NodeHandle) -> NavResult<Arc<NodeRecord>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle.0)
            .cloned()
            .ok_or_else(|| NavError::NodeNotFound(format!("node handle {}", handle)))
    }

    pub fn get_many(&self, handles: &[NodeHandle]) -> NavResult<Vec<Arc<NodeRecord>>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        handles
            .iter()
            .map(|h| {
                records
                    .get(h.0)
                    .cloned()
                    .ok_or_else(|| NavError::NodeNotFound(format!("node handle {}", h)))
            })
            .collect()
    }
}
