use rustc_hash::FxHashMap;

use crate::core::{ClassHierarchy, GroupingDiscriminator, LabelDefinition, NodeType};
use crate::sorting::compare_labels;

use super::{dedup_by_keys, group_stage, union_keys, GroupEntry, GroupNode, Groupable, GroupingPlan, Stage};

/// 类分组桶
struct ClassBucket<T> {
    class_name: String,
    is_base: bool,
    keep_single: bool,
    members: Vec<(usize, T)>,
}

/// 类分组
/// 1. 确切类分组：每个实例进入其确切类的分组
/// 2. 基类重分组：命中规则的实例额外进入基类分组（同一实例可出现在多个分组下）
/// 3. 单成员分组折叠回实例节点，除非声明 always_group / create_group_for_single_item
/// 输出：分组节点在前（按类标签排序），未分组条目随后进入后续阶段
pub(super) fn apply<T: Groupable>(
    items: Vec<T>,
    plan: &GroupingPlan,
    hierarchy: &dyn ClassHierarchy,
) -> Vec<GroupEntry<T>> {
    let grouping = &plan.class;
    let mut buckets: Vec<ClassBucket<T>> = Vec::new();
    let mut index: FxHashMap<(String, bool), usize> = FxHashMap::default();
    let mut passthrough: Vec<(usize, T)> = Vec::new();

    let mut push = |buckets: &mut Vec<ClassBucket<T>>,
                    class_name: &str,
                    is_base: bool,
                    keep_single: bool,
                    item: (usize, T)| {
        let slot = *index
            .entry((class_name.to_string(), is_base))
            .or_insert_with(|| {
                buckets.push(ClassBucket {
                    class_name: class_name.to_string(),
                    is_base,
                    keep_single,
                    members: Vec::new(),
                });
                buckets.len() - 1
            });
        buckets[slot].keep_single |= keep_single;
        buckets[slot].members.push(item);
    };

    for (position, item) in items.into_iter().enumerate() {
        if !item.is_groupable() {
            passthrough.push((position, item));
            continue;
        }
        let class_name = item.class_name().to_string();
        let mut grouped = false;

        if grouping.by_exact_class {
            push(
                &mut buckets,
                &class_name,
                false,
                grouping.always_group,
                (position, item.clone()),
            );
            grouped = true;
        }

        for base in &grouping.base_classes {
            if base.applies_to.matches(&class_name, hierarchy)
                && hierarchy.is_a(&class_name, &base.base_class)
            {
                push(
                    &mut buckets,
                    &base.base_class,
                    true,
                    grouping.always_group || base.create_group_for_single_item,
                    (position, item.clone()),
                );
                grouped = true;
            }
        }

        if !grouped {
            passthrough.push((position, item));
        }
    }

    let mut groups: Vec<GroupNode<T>> = Vec::with_capacity(buckets.len());
    let mut collapsed: Vec<(usize, T)> = Vec::new();
    for bucket in buckets {
        if bucket.members.len() == 1 && !bucket.keep_single {
            collapsed.extend(bucket.members);
            continue;
        }
        let grouped_keys = union_keys(bucket.members.iter().map(|(_, m)| m));
        let members: Vec<T> = bucket.members.into_iter().map(|(_, m)| m).collect();
        let label = hierarchy.class_label(&bucket.class_name);
        groups.push(GroupNode {
            node_type: NodeType::ClassGrouping,
            discriminator: GroupingDiscriminator::Class {
                class_name: bucket.class_name,
                is_base: bucket.is_base,
            },
            label: LabelDefinition::from_text(label),
            image_id: None,
            grouped_keys,
            children: group_stage(members, Stage::Property(0), plan, hierarchy),
        });
    }

    if plan.sort_groups {
        groups.sort_by(|a, b| compare_labels(&a.label.display_value, &b.label.display_value));
    }

    // 折叠的单成员与未分组条目按原始位置合并（同一实例只保留一次）
    collapsed.extend(passthrough);
    collapsed.sort_by_key(|(position, _)| *position);
    let rest = dedup_by_keys(collapsed.into_iter().map(|(_, m)| m).collect());

    let mut output: Vec<GroupEntry<T>> = groups.into_iter().map(GroupEntry::Group).collect();
    output.extend(group_stage(rest, Stage::Property(0), plan, hierarchy));
    output
}
