pub mod apply;
pub mod format;

pub use apply::apply;
pub use format::format_changed;
