/// 类层级查询接口
/// 内核只需要「是否派生自」与「类显示名」两项能力，具体 schema 由上层协作方提供
pub trait ClassHierarchy {
    /// class_name 是否为 base 或其派生类（自身视为命中）
    fn is_a(&self, class_name: &str, base: &str) -> bool;

    /// 类的显示标签（类分组节点使用）
    fn class_label(&self, class_name: &str) -> String {
        class_name.to_string()
    }
}

/// 扁平层级：无继承关系，仅类名相等视为命中（测试与无 schema 场景）
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatHierarchy;

impl ClassHierarchy for FlatHierarchy {
    fn is_a(&self, class_name: &str, base: &str) -> bool {
        class_name == base
    }
}
