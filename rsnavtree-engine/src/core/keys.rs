use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// 实例Key：类名 + 实例ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub class_name: String,
    pub id: u64,
}

impl InstanceKey {
    pub fn new(class_name: impl Into<String>, id: u64) -> Self {
        Self {
            class_name: class_name.into(),
            id,
        }
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.class_name, self.id)
    }
}

/// 导航节点类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name")]
pub enum NodeType {
    /// 实例节点（一个或多个实例，多个时为同标签合并结果）
    Instance,
    /// 自定义节点（类型名由规格字面量提供）
    Custom(String),
    /// 类分组节点
    ClassGrouping,
    /// 属性值分组节点
    PropertyGrouping,
    /// 属性区间分组节点
    PropertyRangeGrouping,
    /// 显示标签分组节点
    LabelGrouping,
}

impl NodeType {
    #[inline]
    pub fn is_grouping(&self) -> bool {
        matches!(
            self,
            NodeType::ClassGrouping
                | NodeType::PropertyGrouping
                | NodeType::PropertyRangeGrouping
                | NodeType::LabelGrouping
        )
    }

    /// 表达式上下文中暴露的类型名
    pub fn type_name(&self) -> &str {
        match self {
            NodeType::Instance => "InstanceNode",
            NodeType::Custom(name) => name.as_str(),
            NodeType::ClassGrouping => "ClassGroupingNode",
            NodeType::PropertyGrouping => "PropertyGroupingNode",
            NodeType::PropertyRangeGrouping => "PropertyRangeGroupingNode",
            NodeType::LabelGrouping => "DisplayLabelGroupingNode",
        }
    }
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// 分组判别值：区分同一层级下的不同分组节点
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "camelCase")]
pub enum GroupingDiscriminator {
    /// 类分组；is_base 表示由基类重分组规则产生
    Class { class_name: String, is_base: bool },
    /// 属性值分组；bucket 为分桶Key（原始值Key或显示标签）
    PropertyValue {
        class_name: String,
        property: String,
        bucket: String,
    },
    /// 属性区间分组；range 为 None 表示「其他」桶
    PropertyRange {
        class_name: String,
        property: String,
        range: Option<usize>,
    },
    /// 显示标签分组
    Label { label: String },
}

/// 导航节点Key
/// 稳定性保证：相同（规则集、变量、父节点）下重复请求得到相同Key
/// 组成：节点类型 + 规格ID + 实例Key集合 + 分组判别值 + 可见祖先路径
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub node_type: NodeType,
    pub specification_id: String,
    pub instance_keys: Vec<InstanceKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingDiscriminator>,
    /// 可见的非分组祖先Key哈希（根在前，包含直接父节点）
    #[serde(default)]
    pub path: Vec<u64>,
    pub hash: u64,
}

impl NodeKey {
    pub fn new(
        node_type: NodeType,
        specification_id: impl Into<String>,
        instance_keys: Vec<InstanceKey>,
        grouping: Option<GroupingDiscriminator>,
        path: Vec<u64>,
    ) -> Self {
        let specification_id = specification_id.into();
        let hash = Self::compute_hash(&node_type, &specification_id, &instance_keys, &grouping, &path);
        Self {
            node_type,
            specification_id,
            instance_keys,
            grouping,
            path,
            hash,
        }
    }

    fn compute_hash(
        node_type: &NodeType,
        specification_id: &str,
        instance_keys: &[InstanceKey],
        grouping: &Option<GroupingDiscriminator>,
        path: &[u64],
    ) -> u64 {
        let mut hasher = FxHasher::default();
        node_type.hash(&mut hasher);
        specification_id.hash(&mut hasher);
        instance_keys.hash(&mut hasher);
        grouping.hash(&mut hasher);
        path.last().hash(&mut hasher);
        path.len().hash(&mut hasher);
        hasher.finish()
    }

    /// 过滤上下文签名：实例Key集合 + 分组判别值
    /// 与规格ID一起构成递归守卫指纹
    pub fn filter_signature(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.instance_keys.hash(&mut hasher);
        self.grouping.hash(&mut hasher);
        hasher.finish()
    }

    /// 直接可见父节点的Key哈希（根层级为 None）
    #[inline]
    pub fn parent_hash(&self) -> Option<u64> {
        self.path.last().copied()
    }

    /// 子层级的路径：当前路径 + 自身哈希
    pub fn child_path(&self) -> Vec<u64> {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(self.hash);
        path
    }

    pub fn hash_hex(&self) -> String {
        format!("{:016x}", self.hash)
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]#{}", self.node_type, self.specification_id, self.hash_hex())
    }
}
