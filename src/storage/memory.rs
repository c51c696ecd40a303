use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::automaton::Automaton;
use crate::dictionary::build_fragments;
use crate::types::EntryDescriptor;

/// An entry paired with the automaton built from its match key.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub automaton: Automaton,
    pub entry: Arc<EntryDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexMetadata {
    pub total_entries: usize,
    pub total_keywords: usize,
    pub total_states: usize,
    pub empty_automata: usize,
    pub delimiters: Vec<char>,
    pub build_duration_ms: u64,
}

/// One automaton per entry, kept in registry enumeration order.
///
/// Read-only once built; filtering borrows it from any thread.
#[derive(Debug, Clone, Default)]
pub struct AutomatonIndex {
    entries: Vec<IndexedEntry>,
    metadata: IndexMetadata,
}

impl AutomatonIndex {
    /// Build automata for every entry in parallel.
    pub fn build(entries: &[Arc<EntryDescriptor>], delimiters: &[char]) -> Self {
        let start_time = Instant::now();

        let indexed: Vec<IndexedEntry> = entries
            .par_iter()
            .map(|entry| IndexedEntry {
                automaton: Automaton::from_fragment_set(&build_fragments(&entry.match_key, delimiters)),
                entry: Arc::clone(entry),
            })
            .collect();

        let metadata = IndexMetadata {
            total_entries: indexed.len(),
            total_keywords: indexed.iter().map(|i| i.automaton.keyword_count()).sum(),
            total_states: indexed.iter().map(|i| i.automaton.state_count()).sum(),
            empty_automata: indexed.iter().filter(|i| i.automaton.is_empty()).count(),
            delimiters: delimiters.to_vec(),
            build_duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            entries = metadata.total_entries,
            keywords = metadata.total_keywords,
            states = metadata.total_states,
            duration_ms = metadata.build_duration_ms,
            "built automaton index"
        );

        Self {
            entries: indexed,
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IndexedEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&IndexedEntry> {
        self.entries.get(index)
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }
}

impl<'a> IntoIterator for &'a AutomatonIndex {
    type Item = &'a IndexedEntry;
    type IntoIter = std::slice::Iter<'a, IndexedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Session-lifetime index for one view, built on first use.
///
/// The first caller builds the index; concurrent callers block until it is
/// published and then share it.
#[derive(Debug)]
pub struct LazyAutomatonIndex {
    entries: Arc<[Arc<EntryDescriptor>]>,
    delimiters: Vec<char>,
    cell: OnceCell<AutomatonIndex>,
}

impl LazyAutomatonIndex {
    pub fn new(entries: Vec<Arc<EntryDescriptor>>, delimiters: Vec<char>) -> Self {
        Self {
            entries: entries.into(),
            delimiters,
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_build(&self) -> &AutomatonIndex {
        self.cell
            .get_or_init(|| AutomatonIndex::build(&self.entries, &self.delimiters))
    }

    /// The index, if it has been built already.
    pub fn get(&self) -> Option<&AutomatonIndex> {
        self.cell.get()
    }

    pub fn is_built(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn entries(&self) -> &[Arc<EntryDescriptor>] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn entry(name: &str, key: &str) -> Arc<EntryDescriptor> {
        Arc::new(EntryDescriptor::new(name, format!("{}()", name), "").with_match_key(key))
    }

    #[test]
    fn test_build_preserves_entry_order() {
        let entries = vec![entry("gauss", "filter.gauss"), entry("add", "math.add")];
        let index = AutomatonIndex::build(&entries, &['.']);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0).unwrap().entry.display_name, "gauss");
        assert_eq!(index.get(1).unwrap().entry.display_name, "add");
        assert!(Arc::ptr_eq(&index.get(0).unwrap().entry, &entries[0]));
    }

    #[test]
    fn test_metadata_counts() {
        let entries = vec![entry("ab", "ab"), entry("blank", "")];
        let index = AutomatonIndex::build(&entries, &[]);

        let metadata = index.metadata();
        assert_eq!(metadata.total_entries, 2);
        // "a", "b", "ab"
        assert_eq!(metadata.total_keywords, 3);
        assert_eq!(metadata.empty_automata, 1);
        assert!(metadata.delimiters.is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = AutomatonIndex::build(&[], &['.']);
        assert!(index.is_empty());
        assert_eq!(index.iter().count(), 0);
    }

    #[test]
    fn test_lazy_index_builds_once() {
        let lazy = LazyAutomatonIndex::new(vec![entry("gauss", "filter.gauss")], vec!['.']);
        assert!(!lazy.is_built());
        assert!(lazy.get().is_none());

        let first = lazy.get_or_build() as *const AutomatonIndex;
        let second = lazy.get_or_build() as *const AutomatonIndex;
        assert_eq!(first, second);
        assert!(lazy.is_built());
        assert_eq!(lazy.entries().len(), 1);
    }

    #[test]
    fn test_lazy_index_shared_across_threads() {
        let lazy = Arc::new(LazyAutomatonIndex::new(
            (0..50).map(|i| entry(&format!("op{}", i), &format!("ns.op{}", i))).collect(),
            vec!['.'],
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                thread::spawn(move || lazy.get_or_build().len())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 50);
        }
    }
}
