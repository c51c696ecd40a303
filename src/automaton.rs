//! Keyword trie with failure links (Aho-Corasick) and overlap removal.
//!
//! Matching works on `char`s so positions in [`Emit`] are character offsets,
//! not byte offsets. After all dictionary hits are collected, overlapping
//! hits are resolved longest first, leftmost first among equal lengths, so a
//! single long match always shadows the shorter matches it contains.

use std::collections::{HashSet, VecDeque};

const ROOT: usize = 0;

/// A keyword occurrence in the parsed text. `start..end` is a half-open
/// character range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emit {
    pub start: usize,
    pub end: usize,
    pub keyword: String,
}

impl Emit {
    /// Keyword length in characters.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &Emit) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    // Sorted by char for binary search.
    transitions: Vec<(char, usize)>,
    fail: usize,
    // Nearest state on the failure chain that ends a keyword.
    output_link: Option<usize>,
    // Keyword length in chars when this state ends one.
    keyword_len: Option<usize>,
}

impl State {
    fn next(&self, ch: char) -> Option<usize> {
        self.transitions
            .binary_search_by_key(&ch, |&(c, _)| c)
            .ok()
            .map(|i| self.transitions[i].1)
    }
}

/// Immutable substring-matching automaton built from a fragment set.
#[derive(Debug, Clone)]
pub struct Automaton {
    states: Vec<State>,
    keywords: usize,
}

impl Default for Automaton {
    fn default() -> Self {
        Self {
            states: vec![State::default()],
            keywords: 0,
        }
    }
}

impl Automaton {
    /// Build from `fragments`. Empty fragments are ignored; an empty set gives
    /// an automaton that matches nothing.
    pub fn build<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut automaton = Self::default();
        for fragment in fragments {
            automaton.insert(fragment.as_ref());
        }
        automaton.link_failures();
        automaton
    }

    pub fn from_fragment_set(fragments: &HashSet<String>) -> Self {
        Self::build(fragments.iter())
    }

    fn insert(&mut self, keyword: &str) {
        if keyword.is_empty() {
            return;
        }

        let mut current = ROOT;
        let mut depth = 0;
        for ch in keyword.chars() {
            depth += 1;
            current = match self.states[current].next(ch) {
                Some(next) => next,
                None => {
                    let next = self.states.len();
                    self.states.push(State::default());
                    let transitions = &mut self.states[current].transitions;
                    let slot = transitions.partition_point(|&(c, _)| c < ch);
                    transitions.insert(slot, (ch, next));
                    next
                }
            };
        }

        if self.states[current].keyword_len.is_none() {
            self.states[current].keyword_len = Some(depth);
            self.keywords += 1;
        }
    }

    fn link_failures(&mut self) {
        let mut queue = VecDeque::new();

        let root_children: Vec<usize> = self.states[ROOT].transitions.iter().map(|&(_, s)| s).collect();
        for child in root_children {
            self.states[child].fail = ROOT;
            queue.push_back(child);
        }

        while let Some(state) = queue.pop_front() {
            let transitions = self.states[state].transitions.clone();
            for (ch, child) in transitions {
                let mut fallback = self.states[state].fail;
                let fail = loop {
                    if let Some(target) = self.states[fallback].next(ch) {
                        break target;
                    }
                    if fallback == ROOT {
                        break ROOT;
                    }
                    fallback = self.states[fallback].fail;
                };

                self.states[child].fail = fail;
                self.states[child].output_link = if self.states[fail].keyword_len.is_some() {
                    Some(fail)
                } else {
                    self.states[fail].output_link
                };
                queue.push_back(child);
            }
        }
    }

    fn step(&self, mut state: usize, ch: char) -> usize {
        loop {
            if let Some(next) = self.states[state].next(ch) {
                return next;
            }
            if state == ROOT {
                return ROOT;
            }
            state = self.states[state].fail;
        }
    }

    /// Number of distinct keywords in the dictionary.
    pub fn keyword_count(&self) -> usize {
        self.keywords
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords == 0
    }

    /// Every keyword occurrence in `text`, overlaps included, ordered by end
    /// position.
    pub fn find_all(&self, text: &str) -> Vec<Emit> {
        let chars: Vec<char> = text.chars().collect();
        let mut emits = Vec::new();
        if self.is_empty() {
            return emits;
        }

        let mut state = ROOT;
        for (position, &ch) in chars.iter().enumerate() {
            state = self.step(state, ch);

            let mut candidate = if self.states[state].keyword_len.is_some() {
                Some(state)
            } else {
                self.states[state].output_link
            };
            while let Some(hit) = candidate {
                if let Some(len) = self.states[hit].keyword_len {
                    let end = position + 1;
                    let start = end - len;
                    emits.push(Emit {
                        start,
                        end,
                        keyword: chars[start..end].iter().collect(),
                    });
                }
                candidate = self.states[hit].output_link;
            }
        }

        emits
    }

    /// Non-overlapping keyword occurrences in `text`, ordered by start.
    pub fn parse_text(&self, text: &str) -> Vec<Emit> {
        remove_overlaps(self.find_all(text))
    }
}

fn remove_overlaps(mut emits: Vec<Emit>) -> Vec<Emit> {
    emits.sort_by(|a, b| b.len().cmp(&a.len()).then(a.start.cmp(&b.start)));

    let mut kept: Vec<Emit> = Vec::with_capacity(emits.len());
    for emit in emits {
        if !kept.iter().any(|k| k.overlaps(&emit)) {
            kept.push(emit);
        }
    }

    kept.sort_by_key(|e| e.start);
    kept
}
