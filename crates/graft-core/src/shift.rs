//! In-place block shift
//!
//! Moves a block of records further up the same store, leaving blank
//! slots behind. Only slots the block vacates are blanked; records past
//! the old block are never touched unless the block lands on them.

use crate::error::{RangeError, RelocateError};
use crate::relocation::{build_relocation_map, slot_id, RelocationMap};
use crate::rewrite::Rewriter;
use graft_store::{BlankPolicy, Dataset, RecordKind, RecordStore, Schema, Slot, StoreError};
use serde::Serialize;
use std::ops::Range;

/// One shift
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftRequest {
    /// Kind shifted; its companion store follows
    pub kind: RecordKind,
    /// First slot of the block
    pub start: usize,
    /// Distance moved
    pub offset: usize,
    /// Block length; `None` means through the end, otherwise clamped
    pub count: Option<usize>,
    /// Rewrite references to the block across the whole store
    pub rewrite_references: bool,
}

impl ShiftRequest {
    /// Shift from `start` to the end of the store by `offset`
    #[inline]
    #[must_use]
    pub fn new(kind: RecordKind, start: usize, offset: usize) -> Self {
        Self {
            kind,
            start,
            offset,
            count: None,
            rewrite_references: true,
        }
    }

    /// With block length
    #[inline]
    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Leave references pointing at the old slots
    #[inline]
    #[must_use]
    pub fn without_rewrite(mut self) -> Self {
        self.rewrite_references = false;
        self
    }
}

/// What a shift did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftOutcome {
    /// Kind shifted
    pub kind: RecordKind,
    /// Records moved
    pub count: usize,
    /// Old ID → new ID
    pub relocation: RelocationMap,
    /// Slots left blank
    pub vacated: Range<usize>,
    /// Reference values rewritten
    pub rewritten: usize,
    /// Companion store shifted alongside, if present
    pub companion: Option<RecordKind>,
}

/// Shift a block of records within one dataset
///
/// # Errors
/// - [`RelocateError::Range`] if the block is empty, starts past the end,
///   or would land past the addressable slot range
/// - [`RelocateError::SchemaMismatch`] if a record lacks a schema field
/// - [`RelocateError::Store`] if the store is missing
pub fn shift(
    dataset: &mut Dataset,
    schema: &Schema,
    request: &ShiftRequest,
) -> Result<ShiftOutcome, RelocateError> {
    let kind = request.kind;
    let entry = schema
        .kind(kind)
        .ok_or(RelocateError::UndescribedKind(kind))?;
    let len = dataset.store(kind)?.len();
    if request.start >= len {
        return Err(RangeError::StartOutOfBounds {
            kind,
            start: request.start,
            len,
        }
        .into());
    }
    let count = request
        .count
        .map_or(len - request.start, |c| c.min(len - request.start));
    if count == 0 {
        return Err(RangeError::EmptyRange { kind }.into());
    }

    let overflow = || RangeError::TargetOverflow {
        kind,
        start: request.start,
        offset: request.offset,
    };
    let new_start = request.start.checked_add(request.offset).ok_or_else(overflow)?;
    let new_end = new_start.checked_add(count).ok_or_else(overflow)?;
    if i64::try_from(new_end).is_err() {
        return Err(overflow().into());
    }
    let vacated = request.start..(request.start + count).min(new_start);
    let relocation = build_relocation_map(slot_id(request.start), slot_id(new_start), count);
    tracing::info!(
        "Shifting {} {}..={} -> {}..={}",
        kind,
        request.start,
        request.start + count - 1,
        new_start,
        new_end - 1
    );

    let store = dataset.store_mut(kind)?;
    move_block(store, &entry.blank, request.start, count, new_start)?;

    for slot in new_start..new_end {
        for realm in 0..store.realm_count() {
            let Some(record) = store.get_mut(realm, slot) else {
                continue;
            };
            if let Some(field) = entry.self_id.as_deref() {
                if let Some(graft_store::Value::Int(id)) = record.get_mut(field) {
                    *id = slot_id(slot);
                }
            }
        }
    }
    let rewritten = if request.rewrite_references && request.offset > 0 {
        Rewriter::new(entry).rewrite_all(store, &relocation)?
    } else {
        0
    };

    let companion = match entry.companion {
        Some(companion) if dataset.has(companion) => {
            let blank = schema
                .kind(companion)
                .map_or(BlankPolicy::Empty, |e| e.blank.clone());
            move_block(
                dataset.store_mut(companion)?,
                &blank,
                request.start,
                count,
                new_start,
            )?;
            Some(companion)
        }
        _ => None,
    };

    Ok(ShiftOutcome {
        kind,
        count,
        relocation,
        vacated,
        rewritten,
        companion,
    })
}

fn move_block(
    store: &mut RecordStore,
    blank: &BlankPolicy,
    start: usize,
    count: usize,
    new_start: usize,
) -> Result<(), StoreError> {
    if new_start == start {
        return Ok(());
    }
    store.extend(new_start + count, blank)?;
    for realm in 0..store.realm_count() {
        let saved: Vec<Slot> = store
            .realm(realm)
            .map(|slots| slots.get(start..start + count).unwrap_or_default().to_vec())
            .unwrap_or_default();
        let fill: Slot = match blank {
            BlankPolicy::Empty => None,
            BlankPolicy::Sentinel(record) => Some(record.clone()),
            BlankPolicy::CloneFirst => store.get(realm, 0).cloned(),
        };
        for slot in start..(start + count).min(new_start) {
            store.set(realm, slot, fill.clone())?;
        }
        for (i, record) in saved.into_iter().enumerate() {
            store.set(realm, new_start + i, record)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_store::{Record, Value};
    use pretty_assertions::assert_eq;

    fn unit(id: i64, base: i64) -> Slot {
        Some(
            Record::new()
                .with("id", id)
                .with("copy_id", id)
                .with("base_id", base)
                .with("dead_unit_id", -1)
                .with("blood_unit_id", -1),
        )
    }

    fn header() -> Slot {
        Some(Record::new().with("exists", 1).with("task_list", Value::Null))
    }

    fn dataset() -> Dataset {
        let units = vec![unit(0, 0), unit(1, 2), unit(2, 1), unit(3, 3)];
        Dataset::new("VER 8.8")
            .with_store(RecordKind::Unit, RecordStore::with_realms(vec![units.clone(), units]))
            .with_store(RecordKind::UnitHeader, RecordStore::single(vec![header(); 4]))
    }

    #[test]
    fn shift_moves_block_and_blanks_vacated_slots() {
        let mut data = dataset();
        let req = ShiftRequest::new(RecordKind::Unit, 1, 4).with_count(2);
        let outcome = shift(&mut data, &Schema::builtin(), &req).unwrap();

        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.vacated, 1..3);
        assert_eq!(outcome.companion, Some(RecordKind::UnitHeader));

        let units = data.store(RecordKind::Unit).unwrap();
        assert_eq!(units.len(), 7);
        for realm in 0..2 {
            assert!(units.get(realm, 1).is_none());
            assert!(units.get(realm, 2).is_none());
            // untouched record beyond the block
            assert_eq!(units.get(realm, 3).unwrap().int("id"), Some(3));
            let moved = units.get(realm, 5).unwrap();
            assert_eq!(moved.int("id"), Some(5));
            assert_eq!(moved.int("base_id"), Some(6));
        }
        // slot 0 referenced nothing in the block
        assert_eq!(units.get(0, 0).unwrap().int("base_id"), Some(0));

        let headers = data.store(RecordKind::UnitHeader).unwrap();
        assert_eq!(headers.len(), 7);
        assert_eq!(headers.get(0, 1).unwrap().int("exists"), Some(0));
        assert_eq!(headers.get(0, 5).unwrap().int("exists"), Some(1));
    }

    #[test]
    fn overlapping_shift_keeps_block_intact() {
        let mut data = dataset();
        let req = ShiftRequest::new(RecordKind::Unit, 1, 1);
        let outcome = shift(&mut data, &Schema::builtin(), &req).unwrap();

        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.vacated, 1..2);
        let units = data.store(RecordKind::Unit).unwrap();
        let ids: Vec<Option<i64>> = (0..5).map(|s| units.get(0, s).and_then(|r| r.int("copy_id"))).collect();
        assert_eq!(ids, vec![Some(0), None, Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn shift_without_rewrite_leaves_references() {
        let mut data = dataset();
        let req = ShiftRequest::new(RecordKind::Unit, 1, 4).with_count(2).without_rewrite();
        let outcome = shift(&mut data, &Schema::builtin(), &req).unwrap();
        assert_eq!(outcome.rewritten, 0);
        let units = data.store(RecordKind::Unit).unwrap();
        assert_eq!(units.get(0, 5).unwrap().int("base_id"), Some(2));
    }

    #[test]
    fn shift_range_errors() {
        let mut data = dataset();
        let schema = Schema::builtin();
        let err = shift(&mut data, &schema, &ShiftRequest::new(RecordKind::Unit, 4, 1)).unwrap_err();
        assert!(matches!(err, RelocateError::Range(RangeError::StartOutOfBounds { .. })));

        let req = ShiftRequest::new(RecordKind::Unit, 0, 1).with_count(0);
        let err = shift(&mut data, &schema, &req).unwrap_err();
        assert!(matches!(err, RelocateError::Range(RangeError::EmptyRange { .. })));
    }

    #[test]
    fn shift_past_slot_range_is_rejected() {
        let mut data = dataset();
        let before = data.clone();
        let schema = Schema::builtin();
        for offset in [usize::MAX, usize::MAX - 1] {
            let req = ShiftRequest::new(RecordKind::Unit, 1, offset);
            let err = shift(&mut data, &schema, &req).unwrap_err();
            assert!(matches!(
                err,
                RelocateError::Range(RangeError::TargetOverflow { start: 1, .. })
            ));
        }
        assert_eq!(data, before);
    }
}
