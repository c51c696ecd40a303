pub mod memory;

pub use memory::{AutomatonIndex, IndexMetadata, IndexedEntry, LazyAutomatonIndex};
