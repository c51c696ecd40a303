//! Fuzzy filtering over an [`AutomatonIndex`].
//!
//! Each entry's automaton parses the lower-cased query; every emitted
//! fragment of length `n` scores `2n - 1`, so one long match outranks any
//! number of shorter matches covering the same total length. Only entries
//! whose score equals one of the `keep` best distinct scores survive.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::automaton::{Automaton, Emit};
use crate::config::FilterConfig;
use crate::storage::AutomatonIndex;
use crate::types::EntryDescriptor;

/// Sum of `2 × len − 1` over the emitted fragments.
pub fn score_emits(emits: &[Emit]) -> u32 {
    emits.iter().map(|e| (2 * e.len() as u32).saturating_sub(1)).sum()
}

/// Score `query` (already lower-cased) against one automaton.
pub fn score(automaton: &Automaton, query: &str) -> u32 {
    score_emits(&automaton.parse_text(query))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredEntry {
    pub score: u32,
    pub entry: Arc<EntryDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterResult {
    /// Descending score; entry order within equal scores.
    pub entries: Vec<ScoredEntry>,
    pub examined: usize,
    pub duration_ms: u64,
}

impl FilterResult {
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<EntryDescriptor>> {
        self.entries.iter().map(|scored| &scored.entry)
    }

    pub fn best_score(&self) -> Option<u32> {
        self.entries.first().map(|scored| scored.score)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Completed(FilterResult),
    Cancelled,
}

impl FilterOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FilterOutcome::Cancelled)
    }

    pub fn into_result(self) -> Option<FilterResult> {
        match self {
            FilterOutcome::Completed(result) => Some(result),
            FilterOutcome::Cancelled => None,
        }
    }
}

/// Buckets of entries for the best `keep` distinct scores seen so far.
#[derive(Debug)]
struct ScoreBuckets {
    keep: usize,
    buckets: BTreeMap<u32, Vec<Arc<EntryDescriptor>>>,
}

impl ScoreBuckets {
    fn new(keep: usize) -> Self {
        Self {
            keep: keep.max(1),
            buckets: BTreeMap::new(),
        }
    }

    fn offer(&mut self, score: u32, entry: &Arc<EntryDescriptor>) {
        if let Some(bucket) = self.buckets.get_mut(&score) {
            bucket.push(Arc::clone(entry));
            return;
        }

        let beats_worst = self
            .buckets
            .keys()
            .next()
            .map_or(true, |&worst| score > worst);

        if self.buckets.len() < self.keep || beats_worst {
            self.buckets.insert(score, vec![Arc::clone(entry)]);
            if self.buckets.len() > self.keep {
                self.buckets.pop_first();
            }
        }
    }

    fn into_ranked(self) -> Vec<ScoredEntry> {
        let mut ranked = Vec::new();
        for (score, mut bucket) in self.buckets.into_iter().rev() {
            bucket.sort();
            ranked.extend(bucket.into_iter().map(|entry| ScoredEntry { score, entry }));
        }
        ranked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterEngine {
    keep: usize,
    progress_step: u8,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

impl FilterEngine {
    pub fn new(keep: usize, progress_step: u8) -> Self {
        Self {
            keep: keep.max(1),
            progress_step: progress_step.clamp(1, 100),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.keep, config.progress_step)
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    pub fn progress_step(&self) -> u8 {
        self.progress_step
    }

    /// Rank every entry of `index` against `query`.
    ///
    /// `progress` receives a percentage each time a progress step boundary is
    /// crossed, which is also where `cancel` is polled. A cancelled run
    /// reports 0 and returns [`FilterOutcome::Cancelled`]; a completed run
    /// always ends by reporting 100.
    pub fn filter<P>(&self, query: &str, index: &AutomatonIndex, mut progress: P, cancel: &CancellationToken) -> FilterOutcome
    where
        P: FnMut(u8),
    {
        let start_time = Instant::now();
        let query = query.to_lowercase();

        if cancel.is_cancelled() {
            progress(0);
            return FilterOutcome::Cancelled;
        }

        let total = index.len();
        let step = usize::from(self.progress_step);
        let mut next_boundary = step;
        let mut buckets = ScoreBuckets::new(self.keep);

        for (position, indexed) in index.iter().enumerate() {
            let percent = (position + 1) * 100 / total;
            if percent >= next_boundary {
                if cancel.is_cancelled() {
                    debug!(query = %query, examined = position, "filter run cancelled");
                    progress(0);
                    return FilterOutcome::Cancelled;
                }
                let reached = percent - percent % step;
                progress(reached as u8);
                next_boundary = reached + step;
            }

            buckets.offer(score(&indexed.automaton, &query), &indexed.entry);
        }

        progress(100);

        let result = FilterResult {
            entries: buckets.into_ranked(),
            examined: total,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        debug!(
            query = %query,
            matches = result.len(),
            best_score = ?result.best_score(),
            duration_ms = result.duration_ms,
            "filter run completed"
        );
        FilterOutcome::Completed(result)
    }
}
