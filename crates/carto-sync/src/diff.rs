//! Snapshot diffing for the persistence bridge.
//!
//! Comparison is by value: a reactive store hands out fresh allocations on
//! every change, so identity says nothing about whether content changed.

use std::collections::{BTreeMap, BTreeSet};

/// Candidates whose content differs from, or is absent in, `previous`.
///
/// Order follows `candidates`. When a key occurs more than once, each
/// occurrence is compared independently.
pub fn diff<'a, K, T, F>(candidates: &'a [T], previous: &BTreeMap<K, T>, key: F) -> Vec<&'a T>
where
    K: Ord,
    T: PartialEq,
    F: Fn(&T) -> K,
{
    candidates
        .iter()
        .filter(|candidate| previous.get(&key(candidate)) != Some(*candidate))
        .collect()
}

/// Keys present in `previous` but no longer among `candidates`, sorted.
pub fn diff_removed<K, T, F>(candidates: &[T], previous: &BTreeMap<K, T>, key: F) -> Vec<K>
where
    K: Ord + Clone,
    F: Fn(&T) -> K,
{
    let live: BTreeSet<K> = candidates.iter().map(key).collect();
    previous
        .keys()
        .filter(|k| !live.contains(*k))
        .cloned()
        .collect()
}
