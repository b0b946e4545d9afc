use rustc_hash::FxHashMap;

use crate::core::{GroupingDiscriminator, LabelDefinition, NodeType};

use super::{union_keys, GroupEntry, GroupNode, Groupable};

/// 显示标签分组
/// 标签完全相同的可分组条目合并为一个标签分组节点，分组位于首个成员的位置；
/// 仅一个条目使用的标签不分组
pub(super) fn apply<T: Groupable>(items: Vec<T>) -> Vec<GroupEntry<T>> {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for item in items.iter().filter(|i| i.is_groupable()) {
        *counts.entry(item.group_label()).or_insert(0) += 1;
    }
    let grouped_labels: FxHashMap<String, usize> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(label, count)| (label.to_string(), count))
        .collect();

    if grouped_labels.is_empty() {
        return items.into_iter().map(GroupEntry::Item).collect();
    }

    // 输出槽位：条目或分组（分组成员按出现顺序收集）
    let mut output: Vec<GroupEntry<T>> = Vec::with_capacity(items.len());
    let mut slots: FxHashMap<String, usize> = FxHashMap::default();

    for item in items {
        let label = item.group_label().to_string();
        if !item.is_groupable() || !grouped_labels.contains_key(&label) {
            output.push(GroupEntry::Item(item));
            continue;
        }
        match slots.get(&label) {
            Some(slot) => {
                if let GroupEntry::Group(group) = &mut output[*slot] {
                    group.children.push(GroupEntry::Item(item));
                }
            }
            None => {
                slots.insert(label.clone(), output.len());
                output.push(GroupEntry::Group(GroupNode {
                    node_type: NodeType::LabelGrouping,
                    discriminator: GroupingDiscriminator::Label {
                        label: label.clone(),
                    },
                    label: LabelDefinition::from_text(label),
                    image_id: None,
                    grouped_keys: Vec::new(),
                    children: vec![GroupEntry::Item(item)],
                }));
            }
        }
    }

    for entry in output.iter_mut() {
        if let GroupEntry::Group(group) = entry {
            group.grouped_keys = union_keys(group.children.iter().filter_map(|c| match c {
                GroupEntry::Item(item) => Some(item),
                GroupEntry::Group(_) => None,
            }));
        }
    }
    output
}
