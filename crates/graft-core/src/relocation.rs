//! Relocation maps: old record ID → new record ID

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Finite mapping from source IDs to target IDs
///
/// Keys are unique by construction. IDs outside the key set are left
/// untouched by every rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelocationMap(BTreeMap<i64, i64>);

impl RelocationMap {
    /// Empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry, returning the previous target for `old`
    #[inline]
    pub fn insert(&mut self, old: i64, new: i64) -> Option<i64> {
        self.0.insert(old, new)
    }

    /// Target for `old`, if it is relocated
    #[inline]
    #[must_use]
    pub fn get(&self, old: i64) -> Option<i64> {
        self.0.get(&old).copied()
    }

    /// Apply the map to one value; unmapped values pass through
    #[inline]
    #[must_use]
    pub fn apply(&self, value: i64) -> i64 {
        self.get(value).unwrap_or(value)
    }

    /// Check whether `old` is relocated
    #[inline]
    #[must_use]
    pub fn contains(&self, old: i64) -> bool {
        self.0.contains_key(&old)
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the map is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in ascending source order
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Source IDs in ascending order
    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.keys().copied()
    }

    /// Check whether every entry maps an ID to itself
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.0.iter().all(|(k, v)| k == v)
    }

    /// Source IDs of `other` that this map sends somewhere else
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> Vec<i64> {
        other
            .iter()
            .filter(|(old, new)| self.get(*old).is_some_and(|mine| mine != *new))
            .map(|(old, _)| old)
            .collect()
    }

    /// Merge another map into this one; entries of `other` win on conflict
    pub fn merge(&mut self, other: &Self) {
        self.0.extend(other.iter());
    }
}

impl FromIterator<(i64, i64)> for RelocationMap {
    fn from_iter<I: IntoIterator<Item = (i64, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<(i64, i64)> for RelocationMap {
    fn extend<I: IntoIterator<Item = (i64, i64)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

/// Record ID stored for a slot index
#[inline]
#[must_use]
pub fn slot_id(slot: usize) -> i64 {
    i64::try_from(slot).unwrap_or(i64::MAX)
}

/// Map the contiguous block `old_start..old_start+count` onto `new_start..`
#[must_use]
pub fn build_relocation_map(old_start: i64, new_start: i64, count: usize) -> RelocationMap {
    (0..slot_id(count))
        .map(|j| (old_start + j, new_start + j))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_maps_contiguous_block() {
        let map = build_relocation_map(2601, 3201, 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(2601), Some(3201));
        assert_eq!(map.get(2603), Some(3203));
        assert_eq!(map.get(2604), None);
        assert_eq!(map.apply(2600), 2600);
    }

    #[test]
    fn build_zero_count_is_empty() {
        assert!(build_relocation_map(10, 20, 0).is_empty());
    }

    #[test]
    fn identity_detection() {
        assert!(build_relocation_map(46, 46, 1).is_identity());
        assert!(!build_relocation_map(46, 47, 1).is_identity());
    }

    #[test]
    fn merge_and_conflicts() {
        let mut a = build_relocation_map(0, 10, 2);
        let b: RelocationMap = [(1, 11), (5, 15)].into_iter().collect();
        let c: RelocationMap = [(1, 99)].into_iter().collect();

        assert!(a.conflicts_with(&b).is_empty());
        assert_eq!(a.conflicts_with(&c), vec![1]);

        a.merge(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(5), Some(15));
    }

    #[test]
    fn json_uses_string_keys() {
        let map = build_relocation_map(904, 1504, 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"904":1504}"#);
        let back: RelocationMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
