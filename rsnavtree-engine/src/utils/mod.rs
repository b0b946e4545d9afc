pub mod preview;
pub mod text_filter;

pub use preview::preview_compact;
pub use text_filter::TextFilter;
