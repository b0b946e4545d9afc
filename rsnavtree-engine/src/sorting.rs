//! 标签/属性排序
//! 核心职责：
//! 1. 显示标签的自然序比较（数字段按数值比较，忽略大小写，平局按序数比较）
//! 2. 按排序规则对规格输出进行稳定排序（派生类规则覆盖基类规则）
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use crate::core::{compare_values, ClassHierarchy, Value};
use crate::rule::{SortMode, SortingRule};

/// 可排序条目
pub trait Sortable {
    fn sort_label(&self) -> &str;

    /// 实例类名（非实例节点为 None，不受类相关排序规则影响）
    fn sort_class(&self) -> Option<&str>;

    fn sort_property(&self, name: &str) -> Option<&Value>;
}

// ======================== 标签比较 ========================

/// 读取连续数字段（跳过前导零）
fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        if !(digits.is_empty() && *c == '0') {
            digits.push(*c);
        }
        chars.next();
    }
    digits
}

/// 显示标签比较
/// 1. 数字段按数值比较（"Item 2" < "Item 10"）
/// 2. 其余字符忽略大小写比较
/// 3. 以上相等时按原始字符串序数比较，保证全序
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ld = take_digits(&mut left);
                let rd = take_digits(&mut right);
                let ord = ld.len().cmp(&rd.len()).then_with(|| ld.cmp(&rd));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }

    a.cmp(b)
}

/// 按显示标签稳定排序
pub fn sort_by_label<T: Sortable>(items: &mut [T], descending: bool) {
    items.sort_by(|a, b| {
        let ord = compare_labels(a.sort_label(), b.sort_label());
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

// ======================== 规则排序 ========================

/// 为条目挑选生效的排序规则
/// rules 已按优先级降序排列；多个规则命中时取类最具体者（派生类规则覆盖基类规则），
/// 具体程度相同则取优先级更高者
pub fn effective_rule(
    class_name: Option<&str>,
    rules: &[&SortingRule],
    hierarchy: &dyn ClassHierarchy,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, rule) in rules.iter().enumerate() {
        let applies = match (&rule.class, class_name) {
            (None, _) => true,
            (Some(class), Some(name)) => class.matches(name, hierarchy),
            (Some(_), None) => false,
        };
        if !applies {
            continue;
        }
        best = match best {
            None => Some(idx),
            Some(current) => {
                let more_specific = match (&rules[current].class, &rule.class) {
                    (None, Some(_)) => true,
                    (Some(cur), Some(new)) => {
                        new.class_name != cur.class_name
                            && hierarchy.is_a(&new.class_name, &cur.class_name)
                    }
                    _ => false,
                };
                if more_specific {
                    Some(idx)
                } else {
                    Some(current)
                }
            }
        };
    }
    best
}

/// 同一规则下两个条目的比较
fn compare_under_rule<T: Sortable>(mode: &SortMode, a: &T, b: &T) -> Ordering {
    match mode {
        SortMode::Properties { keys } => {
            for key in keys {
                let av = a.sort_property(&key.property).unwrap_or(&Value::Null);
                let bv = b.sort_property(&key.property).unwrap_or(&Value::Null);
                let ord = compare_values(av, bv);
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        SortMode::Label { descending } => {
            let ord = compare_labels(a.sort_label(), b.sort_label());
            if *descending {
                ord.reverse()
            } else {
                ord
            }
        }
        SortMode::Disabled => Ordering::Equal,
    }
}

/// 按排序规则稳定排序
/// 1. 每个条目先确定生效规则；无规则者按标签升序（默认排序）
/// 2. 不同生效规则的条目按规则序号分块，块内按规则比较
/// 3. 禁用排序的块保持原始顺序
pub fn sort_with_rules<T: Sortable>(
    items: Vec<T>,
    rules: &[&SortingRule],
    hierarchy: &dyn ClassHierarchy,
) -> Vec<T> {
    if rules.is_empty() {
        let mut items = items;
        sort_by_label(&mut items, false);
        return items;
    }

    let mut decorated: Vec<(usize, T)> = items
        .into_iter()
        .map(|item| {
            let rank = effective_rule(item.sort_class(), rules, hierarchy).unwrap_or(usize::MAX);
            (rank, item)
        })
        .collect();

    decorated.sort_by(|(ra, a), (rb, b)| {
        ra.cmp(rb).then_with(|| match rules.get(*ra) {
            Some(rule) => compare_under_rule(&rule.mode, a, b),
            None => compare_labels(a.sort_label(), b.sort_label()),
        })
    });

    decorated.into_iter().map(|(_, item)| item).collect()
}
