use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Immutable snapshot of one registry entry as it is indexed and displayed.
///
/// Ordered by `(display_name, owner_type)`; that order decides sibling
/// placement in the tree and breaks ties between equally scored entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryDescriptor {
    pub display_name: String,
    pub invocation: String,
    pub owner_type: String,
    /// Raw text the substring dictionary is derived from.
    pub match_key: String,
}

impl EntryDescriptor {
    pub fn new(display_name: impl Into<String>, invocation: impl Into<String>, owner_type: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            invocation: invocation.into(),
            owner_type: owner_type.into(),
            match_key: String::new(),
        }
    }

    pub fn with_match_key(mut self, match_key: impl Into<String>) -> Self {
        self.match_key = match_key.into();
        self
    }
}

impl Ord for EntryDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.display_name
            .cmp(&other.display_name)
            .then_with(|| self.owner_type.cmp(&other.owner_type))
            // Not part of the display order; keeps Ord consistent with Eq.
            .then_with(|| self.invocation.cmp(&other.invocation))
            .then_with(|| self.match_key.cmp(&other.match_key))
    }
}

impl PartialOrd for EntryDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
