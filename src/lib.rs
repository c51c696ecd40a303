pub mod types;
pub mod error;
pub mod config;
pub mod registry;
pub mod dictionary;
pub mod automaton;
pub mod storage;
pub mod hierarchy;
pub mod simplify;
pub mod filter;
pub mod task;
pub mod finder;
pub mod cli;
pub mod cli_types;

// Re-export commonly used types
pub use types::*;
pub use error::{OpFinderError, Result};
pub use crate::config::FinderConfig;
pub use registry::{InputSpec, OpRecord, RegistrySource, StaticRegistry};
pub use automaton::{Automaton, Emit};
pub use storage::{AutomatonIndex, IndexMetadata, LazyAutomatonIndex};
pub use hierarchy::HierarchyBuilder;
pub use filter::{FilterEngine, FilterOutcome, FilterResult, ScoredEntry};
pub use task::{FilterController, FilterEvent, TaskState};
pub use finder::{OpFinder, OpFinderBuilder, RegistryStats, Update, ViewMode};
pub use cli::CliApp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
