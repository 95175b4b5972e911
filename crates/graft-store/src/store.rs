//! Fixed-slot record stores
//!
//! A [`RecordStore`] is one or more parallel realms of slots, all indexed
//! by record ID. Single-realm kinds (techs, effects, graphics) simply hold
//! one realm.

use crate::error::StoreError;
use crate::value::Record;
use serde::{Deserialize, Serialize};

/// A slot: `None` is the "does not exist" sentinel
pub type Slot = Option<Record>;

/// What fills new slots when a store is padded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlankPolicy {
    /// Empty slots (`None`)
    Empty,
    /// A fixed record flagged as non-existent
    Sentinel(Record),
    /// Copies of the realm's slot 0; for formats that require every slot populated
    CloneFirst,
}

/// ID-indexed slot arrays, one per realm
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordStore {
    realms: Vec<Vec<Slot>>,
}

impl RecordStore {
    /// Store with a single realm
    #[inline]
    #[must_use]
    pub fn single(slots: Vec<Slot>) -> Self {
        Self {
            realms: vec![slots],
        }
    }

    /// Store partitioned into parallel realms
    #[inline]
    #[must_use]
    pub fn with_realms(realms: Vec<Vec<Slot>>) -> Self {
        Self { realms }
    }

    /// Number of realms
    #[inline]
    #[must_use]
    pub fn realm_count(&self) -> usize {
        self.realms.len()
    }

    /// Number of slots (length of realm 0)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.realms.first().map_or(0, Vec::len)
    }

    /// Check for a store without slots
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All realms
    #[inline]
    #[must_use]
    pub fn realms(&self) -> &[Vec<Slot>] {
        &self.realms
    }

    /// Slots of one realm
    #[inline]
    #[must_use]
    pub fn realm(&self, realm: usize) -> Option<&[Slot]> {
        self.realms.get(realm).map(Vec::as_slice)
    }

    /// Record in a slot, if the slot exists and is filled
    #[inline]
    #[must_use]
    pub fn get(&self, realm: usize, slot: usize) -> Option<&Record> {
        self.realms.get(realm)?.get(slot)?.as_ref()
    }

    /// Mutable record in a slot, if the slot exists and is filled
    #[inline]
    pub fn get_mut(&mut self, realm: usize, slot: usize) -> Option<&mut Record> {
        self.realms.get_mut(realm)?.get_mut(slot)?.as_mut()
    }

    /// Replace a slot, returning its previous content
    ///
    /// # Errors
    /// Returns error if the realm or slot does not exist; stores are never
    /// grown implicitly.
    pub fn set(&mut self, realm: usize, slot: usize, value: Slot) -> Result<Slot, StoreError> {
        let count = self.realms.len();
        let slots = self
            .realms
            .get_mut(realm)
            .ok_or(StoreError::RealmOutOfBounds { realm, count })?;
        let len = slots.len();
        let target = slots
            .get_mut(slot)
            .ok_or(StoreError::SlotOutOfBounds { realm, slot, len })?;
        Ok(std::mem::replace(target, value))
    }

    /// Iterate filled slots as `(realm, slot, record)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Record)> {
        self.realms.iter().enumerate().flat_map(|(r, slots)| {
            slots
                .iter()
                .enumerate()
                .filter_map(move |(s, slot)| slot.as_ref().map(|rec| (r, s, rec)))
        })
    }

    /// Iterate filled slots mutably as `(realm, slot, record)`
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut Record)> {
        self.realms.iter_mut().enumerate().flat_map(|(r, slots)| {
            slots
                .iter_mut()
                .enumerate()
                .filter_map(move |(s, slot)| slot.as_mut().map(|rec| (r, s, rec)))
        })
    }

    /// Pad every realm to at least `min_len` slots
    ///
    /// Never truncates; a realm already long enough is left alone. Each
    /// realm is padded independently, so a [`BlankPolicy::CloneFirst`]
    /// realm copies its own slot 0.
    ///
    /// Returns the largest number of slots added to any realm.
    ///
    /// # Errors
    /// Returns [`StoreError::NoPlaceholder`] when a `CloneFirst` realm
    /// needs padding but has no filled slot 0.
    pub fn extend(&mut self, min_len: usize, blank: &BlankPolicy) -> Result<usize, StoreError> {
        let mut added = 0;
        for (realm, slots) in self.realms.iter_mut().enumerate() {
            if slots.len() >= min_len {
                continue;
            }
            let fill: Slot = match blank {
                BlankPolicy::Empty => None,
                BlankPolicy::Sentinel(record) => Some(record.clone()),
                BlankPolicy::CloneFirst => Some(
                    slots
                        .first()
                        .and_then(Option::clone)
                        .ok_or(StoreError::NoPlaceholder { realm })?,
                ),
            };
            added = added.max(min_len - slots.len());
            slots.resize(min_len, fill);
        }
        Ok(added)
    }

    /// Verify all realms have the same length
    ///
    /// # Errors
    /// Returns the first realm whose length differs from realm 0.
    pub fn check_parallel(&self) -> Result<(), StoreError> {
        let expected = self.len();
        for (realm, slots) in self.realms.iter().enumerate() {
            if slots.len() != expected {
                return Err(StoreError::RealmLengthMismatch {
                    realm,
                    len: slots.len(),
                    expected,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64) -> Slot {
        Some(Record::new().with("id", id))
    }

    #[test]
    fn extend_pads_every_realm_with_empty() {
        let mut store = RecordStore::with_realms(vec![vec![rec(0), rec(1)], vec![rec(0), None]]);
        let added = store.extend(5, &BlankPolicy::Empty).unwrap();

        assert_eq!(added, 3);
        assert_eq!(store.len(), 5);
        for realm in store.realms() {
            assert_eq!(realm.len(), 5);
            assert!(realm[2..].iter().all(Option::is_none));
        }
    }

    #[test]
    fn extend_never_truncates() {
        let mut store = RecordStore::single(vec![rec(0), rec(1), rec(2)]);
        let added = store.extend(2, &BlankPolicy::Empty).unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn extend_with_sentinel() {
        let sentinel = Record::new().with("exists", 0);
        let mut store = RecordStore::single(vec![Some(Record::new().with("exists", 1))]);
        store.extend(3, &BlankPolicy::Sentinel(sentinel.clone())).unwrap();
        assert_eq!(store.get(0, 2), Some(&sentinel));
    }

    #[test]
    fn extend_clone_first_uses_slot_zero() {
        let mut store = RecordStore::single(vec![rec(0), rec(1)]);
        store.extend(4, &BlankPolicy::CloneFirst).unwrap();
        assert_eq!(store.get(0, 3), rec(0).as_ref());
    }

    #[test]
    fn extend_clone_first_without_placeholder_fails() {
        let mut store = RecordStore::single(vec![None]);
        let err = store.extend(2, &BlankPolicy::CloneFirst).unwrap_err();
        assert!(matches!(err, StoreError::NoPlaceholder { realm: 0 }));

        // no padding needed, no placeholder needed
        assert!(store.extend(1, &BlankPolicy::CloneFirst).is_ok());
    }

    #[test]
    fn set_rejects_out_of_bounds() {
        let mut store = RecordStore::single(vec![rec(0)]);
        assert!(matches!(
            store.set(0, 1, rec(1)),
            Err(StoreError::SlotOutOfBounds { slot: 1, len: 1, .. })
        ));
        assert!(matches!(
            store.set(2, 0, rec(1)),
            Err(StoreError::RealmOutOfBounds { realm: 2, count: 1 })
        ));
        assert_eq!(store.set(0, 0, None).unwrap(), rec(0));
    }

    #[test]
    fn iter_skips_empty_slots() {
        let store = RecordStore::with_realms(vec![vec![rec(0), None], vec![None, rec(1)]]);
        let seen: Vec<_> = store.iter().map(|(r, s, _)| (r, s)).collect();
        assert_eq!(seen, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn check_parallel_detects_ragged_realms() {
        let store = RecordStore::with_realms(vec![vec![rec(0), rec(1)], vec![rec(0)]]);
        assert!(matches!(
            store.check_parallel(),
            Err(StoreError::RealmLengthMismatch { realm: 1, len: 1, expected: 2 })
        ));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        proptest! {
            #[test]
            fn extend_keeps_prefix_and_reaches_min_len(
                filled in prop::collection::vec(prop::bool::ANY, 1..12),
                realm_count in 1usize..4,
                min_len in 0usize..24,
            ) {
                let slots: Vec<Slot> = filled
                    .iter()
                    .enumerate()
                    .map(|(i, &f)| if f { rec(i as i64) } else { None })
                    .collect();
                let mut store = RecordStore::with_realms(vec![slots.clone(); realm_count]);
                let added = store.extend(min_len, &BlankPolicy::Empty).unwrap();

                prop_assert_eq!(store.len(), slots.len().max(min_len));
                prop_assert_eq!(added, min_len.saturating_sub(slots.len()));
                prop_assert!(store.check_parallel().is_ok());
                for realm in store.realms() {
                    prop_assert_eq!(&realm[..slots.len()], &slots[..]);
                    prop_assert!(realm[slots.len()..].iter().all(Option::is_none));
                }
            }
        }
    }
}
