pub mod entry;
pub mod tree;

pub use entry::EntryDescriptor;
pub use tree::{ColumnWidths, TreeNode};
