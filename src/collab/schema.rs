use rsnavtree_engine::ClassHierarchy;

/// 类结构协作方
pub trait SchemaCatalog: Send + Sync {
    /// 直接基类
    fn base_classes(&self, class_name: &str) -> Vec<String>;

    /// 类显示名
    fn class_label(&self, class_name: &str) -> String {
        class_name.to_string()
    }

    /// 是否为 base 或其派生类（默认沿基类链广度优先查找）
    fn is_a(&self, class_name: &str, base: &str) -> bool {
        if class_name == base {
            return true;
        }
        let mut visited: Vec<String> = vec![class_name.to_string()];
        let mut frontier = self.base_classes(class_name);
        while let Some(next) = frontier.pop() {
            if next == base {
                return true;
            }
            if visited.contains(&next) {
                continue;
            }
            frontier.extend(self.base_classes(&next));
            visited.push(next);
        }
        false
    }
}

/// 无继承关系的类结构
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSchema;

impl SchemaCatalog for FlatSchema {
    fn base_classes(&self, _class_name: &str) -> Vec<String> {
        Vec::new()
    }
}

/// 将类结构协作方适配为内核的类继承查询
#[derive(Clone, Copy)]
pub struct SchemaHierarchy<'a>(pub &'a dyn SchemaCatalog);

impl ClassHierarchy for SchemaHierarchy<'_> {
    fn is_a(&self, class_name: &str, base: &str) -> bool {
        self.0.is_a(class_name, base)
    }

    fn class_label(&self, class_name: &str) -> String {
        self.0.class_label(class_name)
    }
}
