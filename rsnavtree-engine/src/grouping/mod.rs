//! 分组引擎
//! 在单个父节点的子层级内按固定顺序包装分组节点：
//! 1. 类分组（确切类 + 基类重分组）
//! 2. 属性分组（值分桶 / 区间分桶，可多层嵌套）
//! 3. 显示标签分组
//! 同标签实例合并（查询阶段 / 后处理阶段）见 same_label 子模块
mod class;
mod label;
mod property;
mod same_label;

use rustc_hash::FxHashSet;

use crate::core::{
    ClassHierarchy, GroupingDiscriminator, InstanceKey, LabelDefinition, NodeType, PropertyValue,
};
use crate::rule::{ClassRef, PropertyGroupSpec};

pub use same_label::merge_same_label;

/// 未指定值分组的显示标签
pub const UNSPECIFIED_GROUP_LABEL: &str = "Not specified";
/// 区间分组「其他」桶的显示标签
pub const OTHER_RANGE_LABEL: &str = "Other";

/// 可分组条目
pub trait Groupable: Clone {
    /// 是否参与分组（自定义节点、拼接块等直接透传）
    fn is_groupable(&self) -> bool;

    fn instance_keys(&self) -> &[InstanceKey];

    fn class_name(&self) -> &str;

    /// 显示标签（标签分组依据）
    fn group_label(&self) -> &str;

    fn property(&self, name: &str) -> Option<&PropertyValue>;
}

/// 分组节点（成员仍可能是嵌套分组）
#[derive(Debug, Clone)]
pub struct GroupNode<T> {
    pub node_type: NodeType,
    pub discriminator: GroupingDiscriminator,
    pub label: LabelDefinition,
    pub image_id: Option<String>,
    /// 成员实例Key的并集（首次出现顺序）
    pub grouped_keys: Vec<InstanceKey>,
    pub children: Vec<GroupEntry<T>>,
}

/// 分组结果条目
#[derive(Debug, Clone)]
pub enum GroupEntry<T> {
    Item(T),
    Group(GroupNode<T>),
}

impl<T> GroupEntry<T> {
    #[inline]
    pub fn is_group(&self) -> bool {
        matches!(self, GroupEntry::Group(_))
    }
}

/// 基类重分组定义
#[derive(Debug, Clone, PartialEq)]
pub struct BaseClassGroup {
    /// 规则作用的（派生）类
    pub applies_to: ClassRef,
    pub base_class: String,
    pub create_group_for_single_item: bool,
}

/// 类分组计划
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassGrouping {
    pub by_exact_class: bool,
    pub always_group: bool,
    pub base_classes: Vec<BaseClassGroup>,
}

impl ClassGrouping {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.by_exact_class || !self.base_classes.is_empty()
    }
}

/// 属性分组计划（一层）
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyGrouping {
    pub applies_to: ClassRef,
    pub spec: PropertyGroupSpec,
}

/// 单个规格的分组计划
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupingPlan {
    pub class: ClassGrouping,
    pub properties: Vec<PropertyGrouping>,
    pub by_label: bool,
    /// 分组节点之间是否排序（规格声明不排序时保持首次出现顺序）
    pub sort_groups: bool,
}

impl GroupingPlan {
    /// 计划是否会产生任何分组
    pub fn is_empty(&self) -> bool {
        !self.class.is_active() && self.properties.is_empty() && !self.by_label
    }
}

/// 分组阶段
#[derive(Debug, Clone, Copy)]
pub(crate) enum Stage {
    Class,
    Property(usize),
    Label,
}

/// 分组入口：按计划对条目序列分组
pub fn group_items<T: Groupable>(
    items: Vec<T>,
    plan: &GroupingPlan,
    hierarchy: &dyn ClassHierarchy,
) -> Vec<GroupEntry<T>> {
    if plan.is_empty() {
        return items.into_iter().map(GroupEntry::Item).collect();
    }
    group_stage(items, Stage::Class, plan, hierarchy)
}

/// 从指定阶段开始分组
pub(crate) fn group_stage<T: Groupable>(
    items: Vec<T>,
    stage: Stage,
    plan: &GroupingPlan,
    hierarchy: &dyn ClassHierarchy,
) -> Vec<GroupEntry<T>> {
    match stage {
        Stage::Class if plan.class.is_active() => class::apply(items, plan, hierarchy),
        Stage::Class => group_stage(items, Stage::Property(0), plan, hierarchy),
        Stage::Property(idx) if idx < plan.properties.len() => {
            property::apply(items, idx, plan, hierarchy)
        }
        Stage::Property(_) => group_stage(items, Stage::Label, plan, hierarchy),
        Stage::Label if plan.by_label => label::apply(items),
        Stage::Label => items.into_iter().map(GroupEntry::Item).collect(),
    }
}

/// 成员实例Key并集（首次出现顺序）
pub(crate) fn union_keys<'a, T: Groupable + 'a>(members: impl IntoIterator<Item = &'a T>) -> Vec<InstanceKey> {
    let mut seen: FxHashSet<&InstanceKey> = FxHashSet::default();
    let mut keys = Vec::new();
    for member in members {
        for key in member.instance_keys() {
            if seen.insert(key) {
                keys.push(key.clone());
            }
        }
    }
    keys
}

/// 按实例Key集合去重（保留首次出现）
pub(crate) fn dedup_by_keys<T: Groupable>(items: Vec<T>) -> Vec<T> {
    let mut seen: FxHashSet<Vec<InstanceKey>> = FxHashSet::default();
    items
        .into_iter()
        .filter(|item| !item.is_groupable() || seen.insert(item.instance_keys().to_vec()))
        .collect()
}
