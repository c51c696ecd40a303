//! Substring dictionaries for the per-entry automata.
//!
//! Path-like keys (`net.imagej.ops.filter.gauss.DefaultGauss`) match their
//! leading components only as whole cumulative prefixes, while the terminal
//! component matches on any contiguous substring.

use std::collections::HashSet;

/// Build the lower-cased fragment set for `key`.
///
/// Every prefix that ends at a delimiter (delimiter included) is kept
/// verbatim. The remainder after the last delimiter, or the whole key when no
/// delimiter occurs, contributes all of its contiguous substrings.
pub fn build_fragments(key: &str, delimiters: &[char]) -> HashSet<String> {
    let key = key.to_lowercase();
    let mut fragments = HashSet::new();

    let mut tail_start = 0;
    for (offset, ch) in key.char_indices() {
        if delimiters.contains(&ch) {
            let end = offset + ch.len_utf8();
            fragments.insert(key[..end].to_string());
            tail_start = end;
        }
    }

    insert_all_substrings(&key[tail_start..], &mut fragments);
    fragments
}

fn insert_all_substrings(text: &str, fragments: &mut HashSet<String>) {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();

    for (i, &start) in bounds.iter().enumerate() {
        for &end in &bounds[i + 1..] {
            fragments.insert(text[start..end].to_string());
        }
    }
}
