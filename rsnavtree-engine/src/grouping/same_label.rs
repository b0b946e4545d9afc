use rustc_hash::FxHashMap;

/// 同标签合并
/// 1. eligible 返回条目的合并Key（None 表示不参与合并）
/// 2. 相同Key的后续条目通过 merge 并入首个条目，合并结果位于首个贡献者的位置
/// 3. 不参与合并的条目保持原位
pub fn merge_same_label<T, E, M>(items: Vec<T>, mut eligible: E, mut merge: M) -> Vec<T>
where
    E: FnMut(&T) -> Option<String>,
    M: FnMut(&mut T, T),
{
    let mut output: Vec<T> = Vec::with_capacity(items.len());
    let mut slots: FxHashMap<String, usize> = FxHashMap::default();

    for item in items {
        match eligible(&item) {
            Some(label) => match slots.get(&label) {
                Some(slot) => merge(&mut output[*slot], item),
                None => {
                    slots.insert(label, output.len());
                    output.push(item);
                }
            },
            None => output.push(item),
        }
    }
    output
}
