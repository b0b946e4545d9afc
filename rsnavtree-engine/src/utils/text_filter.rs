use regex::{Regex, RegexBuilder};

use crate::error::{CoreError, CoreResult};

/// 文本过滤器：字面量子串匹配
/// 过滤文本先整体转义再编译，`%`、`_`、`*` 等字符只按字面匹配，不作为通配符
#[derive(Debug, Clone)]
pub struct TextFilter {
    text: String,
    pattern: Regex,
}

impl TextFilter {
    pub fn new(text: &str, case_sensitive: bool) -> CoreResult<Self> {
        if text.is_empty() {
            return Err(CoreError::InvalidInput("empty filter text".to_string()));
        }
        let pattern = RegexBuilder::new(&regex::escape(text))
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(Self {
            text: text.to_string(),
            pattern,
        })
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.pattern.is_match(haystack)
    }

    /// 不重叠出现次数
    pub fn occurrences(&self, haystack: &str) -> usize {
        self.pattern.find_iter(haystack).count()
    }
}
