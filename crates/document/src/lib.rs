pub mod ansi;
pub mod format;
pub mod range;

pub use format::{format, BlockKind, DisplayBlock};
pub use range::{extract, extract_span, Columns, Position, Selection};
