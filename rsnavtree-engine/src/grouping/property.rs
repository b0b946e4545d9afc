use rustc_hash::FxHashMap;
use std::cmp::Ordering;

use crate::core::{
    compare_values, ClassHierarchy, GroupingDiscriminator, LabelDefinition, NodeType, PropertyValue,
};
use crate::rule::GroupingValue;
use crate::sorting::compare_labels;

use super::{
    group_stage, union_keys, GroupEntry, GroupNode, Groupable, GroupingPlan, Stage,
    OTHER_RANGE_LABEL, UNSPECIFIED_GROUP_LABEL,
};

/// 分桶Key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BucketKey {
    /// 值桶（原始值Key或显示标签）
    Value(String),
    /// 未指定值桶（null 与空串合并）
    Unspecified,
    /// 区间桶；None 为「其他」
    Range(Option<usize>),
}

struct Bucket<T> {
    key: BucketKey,
    /// 首个成员的属性值（决定标签与排序值）
    first_value: PropertyValue,
    members: Vec<(usize, T)>,
}

/// 属性分组（计划中的第 idx 层）
/// 1. 区间模式：按声明区间分桶，区间外（含未指定值）进入「其他」桶；区间分组从不折叠
/// 2. 值模式：按原始值或显示标签分桶（两种分桶依据与两种排序依据可任意组合）
/// 3. 未指定值：未声明未指定值分组时隐藏该桶，成员直接透传
/// 4. 单成员值分组折叠，除非声明 create_group_for_single_item
pub(super) fn apply<T: Groupable>(
    items: Vec<T>,
    idx: usize,
    plan: &GroupingPlan,
    hierarchy: &dyn ClassHierarchy,
) -> Vec<GroupEntry<T>> {
    let layer = &plan.properties[idx];
    let spec = &layer.spec;
    let next = Stage::Property(idx + 1);

    let mut buckets: Vec<Bucket<T>> = Vec::new();
    let mut index: FxHashMap<BucketKey, usize> = FxHashMap::default();
    let mut passthrough: Vec<(usize, T)> = Vec::new();

    for (position, item) in items.into_iter().enumerate() {
        if !item.is_groupable() || !layer.applies_to.matches(item.class_name(), hierarchy) {
            passthrough.push((position, item));
            continue;
        }

        let value = item
            .property(&spec.property_name)
            .cloned()
            .unwrap_or_default();

        let key = if !spec.ranges.is_empty() {
            BucketKey::Range(spec.ranges.iter().position(|r| r.contains(&value.raw)))
        } else if value.is_unspecified() {
            BucketKey::Unspecified
        } else {
            match spec.bucket_by {
                GroupingValue::PropertyValue => BucketKey::Value(value.raw.grouping_key()),
                GroupingValue::DisplayLabel => BucketKey::Value(value.display_value()),
            }
        };

        if key == BucketKey::Unspecified && !spec.create_group_for_unspecified_values {
            passthrough.push((position, item));
            continue;
        }

        match index.get(&key) {
            Some(slot) => buckets[*slot].members.push((position, item)),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push(Bucket {
                    key,
                    first_value: value,
                    members: vec![(position, item)],
                });
            }
        }
    }

    let mut ranged: Vec<(usize, GroupNode<T>)> = Vec::new();
    let mut valued: Vec<(PropertyValue, GroupNode<T>)> = Vec::new();
    let mut unspecified: Option<GroupNode<T>> = None;
    let mut collapsed: Vec<(usize, T)> = Vec::new();
    let class_name = layer.applies_to.class_name.clone();

    for bucket in buckets {
        let grouped_keys = union_keys(bucket.members.iter().map(|(_, m)| m));
        match bucket.key {
            BucketKey::Range(range) => {
                let (label, image_id) = match range.and_then(|r| spec.ranges.get(r)) {
                    Some(def) => (
                        def.display_label(),
                        def.image_id.clone().or_else(|| spec.image_id.clone()),
                    ),
                    None => (OTHER_RANGE_LABEL.to_string(), spec.image_id.clone()),
                };
                let order = range.unwrap_or(usize::MAX);
                ranged.push((
                    order,
                    GroupNode {
                        node_type: NodeType::PropertyRangeGrouping,
                        discriminator: GroupingDiscriminator::PropertyRange {
                            class_name: class_name.clone(),
                            property: spec.property_name.clone(),
                            range,
                        },
                        label: LabelDefinition::from_text(label),
                        image_id,
                        grouped_keys,
                        children: group_stage(strip(bucket.members), next, plan, hierarchy),
                    },
                ));
            }
            key => {
                if bucket.members.len() == 1 && !spec.create_group_for_single_item {
                    collapsed.extend(bucket.members);
                    continue;
                }
                let (bucket_id, label) = match &key {
                    BucketKey::Value(k) => (k.clone(), bucket.first_value.display_value()),
                    _ => (String::new(), UNSPECIFIED_GROUP_LABEL.to_string()),
                };
                let node = GroupNode {
                    node_type: NodeType::PropertyGrouping,
                    discriminator: GroupingDiscriminator::PropertyValue {
                        class_name: class_name.clone(),
                        property: spec.property_name.clone(),
                        bucket: bucket_id,
                    },
                    label: LabelDefinition {
                        raw_value: bucket.first_value.raw.clone(),
                        display_value: label,
                        type_name: "string".to_string(),
                    },
                    image_id: spec.image_id.clone(),
                    grouped_keys,
                    children: group_stage(strip(bucket.members), next, plan, hierarchy),
                };
                if key == BucketKey::Unspecified {
                    unspecified = Some(node);
                } else {
                    valued.push((bucket.first_value, node));
                }
            }
        }
    }

    if plan.sort_groups {
        ranged.sort_by_key(|(order, _)| *order);
        valued.sort_by(|(va, a), (vb, b)| match spec.sort_by {
            GroupingValue::PropertyValue => compare_values(&va.raw, &vb.raw)
                .then_with(|| compare_labels(&a.label.display_value, &b.label.display_value)),
            GroupingValue::DisplayLabel => {
                match compare_labels(&a.label.display_value, &b.label.display_value) {
                    Ordering::Equal => compare_values(&va.raw, &vb.raw),
                    ord => ord,
                }
            }
        });
    }

    let mut output: Vec<GroupEntry<T>> = Vec::new();
    output.extend(ranged.into_iter().map(|(_, g)| GroupEntry::Group(g)));
    output.extend(valued.into_iter().map(|(_, g)| GroupEntry::Group(g)));
    output.extend(unspecified.map(GroupEntry::Group));

    // 折叠的单成员与透传条目按原始位置合并，一起进入下一层
    collapsed.extend(passthrough);
    collapsed.sort_by_key(|(position, _)| *position);
    output.extend(group_stage(strip(collapsed), next, plan, hierarchy));
    output
}

#[inline]
fn strip<T>(members: Vec<(usize, T)>) -> Vec<T> {
    members.into_iter().map(|(_, m)| m).collect()
}
