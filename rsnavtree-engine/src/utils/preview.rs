use std::fmt::{self, Write};

/// 日志预览：按空白切词后以单个空格重新拼接，超过 max_chars 个字符时以省略号截断
pub struct CompactPreview<'a> {
    text: &'a str,
    max_chars: usize,
}

impl fmt::Display for CompactPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut remaining = self.max_chars;
        for (idx, word) in self.text.split_whitespace().enumerate() {
            if idx > 0 {
                if remaining == 0 {
                    return f.write_char('…');
                }
                f.write_char(' ')?;
                remaining -= 1;
            }
            for ch in word.chars() {
                if remaining == 0 {
                    return f.write_char('…');
                }
                f.write_char(ch)?;
                remaining -= 1;
            }
        }
        Ok(())
    }
}

/// 表达式/标签的紧凑预览（首尾空白去除，不分配新字符串）
#[inline]
pub fn preview_compact(text: &str, max_chars: usize) -> CompactPreview<'_> {
    CompactPreview { text, max_chars }
}
