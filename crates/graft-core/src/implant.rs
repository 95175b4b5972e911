//! Range implanting
//!
//! Copies a contiguous block of source records into the target at a new
//! starting slot. Along the way it:
//! - pads the target store (and its companion) so the block fits
//! - stamps each copy's self-id with its new slot
//! - rewrites in-block references with the batch's relocation map
//! - carries dependent records (tech effects) under the same offset
//! - copies lockstep companion records (unit headers)
//!
//! Every range and dependent pointer is validated before the target is
//! touched. The source dataset is only ever borrowed immutably.

use crate::error::{RangeError, RelocateError};
use crate::relocation::{build_relocation_map, slot_id, RelocationMap};
use crate::rewrite::Rewriter;
use graft_store::{
    walk, BlankPolicy, Dataset, DependentLink, KindSchema, Record, RecordKind, RecordStore,
    Schema, Slot, StoreError, Value, WalkError,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;

/// One implant batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplantRequest {
    /// Kind being implanted
    pub kind: RecordKind,
    /// First source slot
    pub source_start: usize,
    /// Last source slot (inclusive); `None` means through the end
    pub source_end: Option<usize>,
    /// Record count; wins over `source_end` and is clamped to the source
    pub count: Option<usize>,
    /// First target slot
    pub target_start: usize,
}

impl ImplantRequest {
    /// Implant from `source_start` through the end of the source
    #[inline]
    #[must_use]
    pub fn new(kind: RecordKind, source_start: usize, target_start: usize) -> Self {
        Self {
            kind,
            source_start,
            source_end: None,
            count: None,
            target_start,
        }
    }

    /// Implant one record into its own slot
    #[inline]
    #[must_use]
    pub fn in_place(kind: RecordKind, slot: usize) -> Self {
        Self::new(kind, slot, slot).with_count(1)
    }

    /// With inclusive source end
    #[inline]
    #[must_use]
    pub fn with_end(mut self, end: usize) -> Self {
        self.source_end = Some(end);
        self
    }

    /// With record count
    #[inline]
    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Signed distance from source to target slots
    #[inline]
    #[must_use]
    pub fn offset(&self) -> i64 {
        slot_id(self.target_start) - slot_id(self.source_start)
    }

    /// Number of records the batch moves, given the source store length
    ///
    /// # Errors
    /// Returns [`RangeError`] when the range does not fit the source.
    pub fn resolve(&self, source_len: usize) -> Result<usize, RangeError> {
        let kind = self.kind;
        if self.source_start >= source_len {
            return Err(RangeError::StartOutOfBounds {
                kind,
                start: self.source_start,
                len: source_len,
            });
        }
        let available = source_len - self.source_start;

        let count = match (self.count, self.source_end) {
            (Some(count), _) => count.min(available),
            (None, Some(end)) if end < self.source_start => {
                return Err(RangeError::EndBeforeStart {
                    kind,
                    start: self.source_start,
                    end,
                });
            }
            (None, Some(end)) if end >= source_len => {
                return Err(RangeError::EndOutOfBounds {
                    kind,
                    end,
                    len: source_len,
                });
            }
            (None, Some(end)) => end - self.source_start + 1,
            (None, None) => available,
        };

        if count == 0 {
            return Err(RangeError::EmptyRange { kind });
        }
        Ok(count)
    }
}

/// What happened to a dependent store during an implant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentOutcome {
    /// Dependent kind
    pub kind: RecordKind,
    /// Offset shared with the primary batch
    pub offset: i64,
    /// Source index → target index of every copied dependent record
    pub relocation: RelocationMap,
    /// Slots appended to the dependent store
    pub padded: usize,
    /// Pre-existing, non-vacant dependent slots that were replaced
    pub overwritten: Vec<usize>,
}

impl DependentOutcome {
    /// Target slots the dependent records landed in
    #[must_use]
    pub fn target_slots(&self) -> BTreeSet<usize> {
        self.relocation
            .iter()
            .filter_map(|(_, new)| usize::try_from(new).ok())
            .collect()
    }
}

/// What one implant batch did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImplantOutcome {
    /// Kind implanted
    pub kind: RecordKind,
    /// First source slot
    pub source_start: usize,
    /// First target slot
    pub target_start: usize,
    /// Records moved
    pub count: usize,
    /// Source ID → target ID for this batch
    pub relocation: RelocationMap,
    /// Slots appended to the target store
    pub padded: usize,
    /// Pre-existing, non-vacant target slots that were replaced
    pub overwritten: Vec<usize>,
    /// Reference values rewritten inside the block
    pub rewritten: usize,
    /// Companion store moved in lockstep, if it was present
    pub companion: Option<RecordKind>,
    /// Dependent records carried along
    pub dependent: Option<DependentOutcome>,
}

impl ImplantOutcome {
    /// Target slots written by this batch
    #[inline]
    #[must_use]
    pub fn target_slots(&self) -> Range<usize> {
        self.target_start..self.target_start + self.count
    }

    /// Source IDs this batch moved
    #[inline]
    #[must_use]
    pub fn source_slots(&self) -> Range<usize> {
        self.source_start..self.source_start + self.count
    }
}

/// Dependent records a batch must carry, validated up front
struct DependentPlan<'s> {
    link: &'s DependentLink,
    entry: &'s KindSchema,
    offset: i64,
    indices: BTreeSet<usize>,
}

impl DependentPlan<'_> {
    fn target_of(&self, index: usize) -> usize {
        // every index was checked to land at or above zero
        usize::try_from(slot_id(index) + self.offset).unwrap_or(usize::MAX)
    }

    fn repoint(&self, record: &mut Record) -> Result<usize, WalkError> {
        let offset = self.offset;
        walk::visit_mut(record, &self.link.pointer, |_, index| {
            if *index >= 0 {
                *index += offset;
            }
        })
    }
}

/// Copies record ranges between datasets
#[derive(Debug, Clone, Copy)]
pub struct Implanter<'s> {
    schema: &'s Schema,
    warn_on_overwrite: bool,
    copy_extra_realms_from_default: bool,
}

impl<'s> Implanter<'s> {
    /// Implanter with overwrite notices and default-realm fallback enabled
    #[inline]
    #[must_use]
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            warn_on_overwrite: true,
            copy_extra_realms_from_default: true,
        }
    }

    /// Toggle overwrite notices
    #[inline]
    #[must_use]
    pub fn warn_on_overwrite(mut self, on: bool) -> Self {
        self.warn_on_overwrite = on;
        self
    }

    /// Toggle realm-0 fallback for target realms the source lacks
    #[inline]
    #[must_use]
    pub fn copy_extra_realms_from_default(mut self, on: bool) -> Self {
        self.copy_extra_realms_from_default = on;
        self
    }

    fn entry(&self, kind: RecordKind) -> Result<&'s KindSchema, RelocateError> {
        self.schema
            .kind(kind)
            .ok_or(RelocateError::UndescribedKind(kind))
    }

    /// Copy one source range into the target
    ///
    /// # Errors
    /// - [`RelocateError::Range`] if the range or a dependent pointer does
    ///   not fit; raised before the target is modified
    /// - [`RelocateError::SchemaMismatch`] if a record lacks a schema field
    /// - [`RelocateError::Store`] if a required store is missing
    pub fn implant(
        &self,
        source: &Dataset,
        target: &mut Dataset,
        request: &ImplantRequest,
    ) -> Result<ImplantOutcome, RelocateError> {
        let kind = request.kind;
        let entry = self.entry(kind)?;
        let source_store = source.store(kind)?;
        let count = request.resolve(source_store.len())?;
        let dependent = match &entry.dependent {
            Some(link) => Some(self.plan_dependents(entry, link, source, request, count)?),
            None => None,
        };
        target.store(kind)?;

        let sources = request.source_start..request.source_start + count;
        let targets = request.target_start..request.target_start + count;
        let relocation =
            build_relocation_map(slot_id(request.source_start), slot_id(request.target_start), count);
        tracing::info!(
            "Implanting {} {}..={} -> {}..={} ({} records)",
            kind,
            sources.start,
            sources.end - 1,
            targets.start,
            targets.end - 1,
            count
        );

        let (padded, mut overwritten) =
            prepare(target.store_mut(kind)?, entry, targets.clone(), targets.end)?;

        let rewriter = Rewriter::new(entry);
        let mut rewritten = 0;
        {
            let store = target.store_mut(kind)?;
            for (from, to) in sources.clone().zip(targets.clone()) {
                for realm in 0..store.realm_count() {
                    let copy = match self.source_record(source_store, realm, from) {
                        Some(mut record) => {
                            let shaped = stamp_self_id(entry, &mut record, to)
                                .and_then(|()| rewriter.rewrite(&mut record, &relocation))
                                .and_then(|n| {
                                    if let Some(plan) = &dependent {
                                        plan.repoint(&mut record)?;
                                    }
                                    Ok(n)
                                });
                            rewritten += shaped
                                .map_err(|e| RelocateError::mismatch(kind, realm, from, e))?;
                            Some(record)
                        }
                        None => None,
                    };
                    store.set(realm, to, copy)?;
                }
            }
        }

        let dependent = match dependent {
            Some(plan) => Some(self.copy_dependents(source, target, kind, &plan)?),
            None => None,
        };

        let companion = match entry.companion {
            Some(companion) if target.has(companion) => {
                let min_len = target.store(kind)?.len();
                let replaced =
                    self.copy_companion(source, target, companion, &sources, &targets, min_len)?;
                overwritten.extend(replaced);
                Some(companion)
            }
            Some(companion) => {
                tracing::debug!("Target has no {} store; skipping lockstep copy", companion);
                None
            }
            None => None,
        };
        overwritten.sort_unstable();
        overwritten.dedup();

        if padded > 0 {
            tracing::info!("Extended {} store by {} slots", kind, padded);
        }
        self.notify_overwrite(kind, &overwritten);

        Ok(ImplantOutcome {
            kind,
            source_start: request.source_start,
            target_start: request.target_start,
            count,
            relocation,
            padded,
            overwritten,
            rewritten,
            companion,
            dependent,
        })
    }

    /// Set each record's self-id to its slot index
    ///
    /// Returns how many records changed.
    ///
    /// # Errors
    /// Returns [`RelocateError::SchemaMismatch`] if a record has no
    /// integer self-id field.
    pub fn align_self_ids(
        &self,
        kind: RecordKind,
        store: &mut RecordStore,
        slots: &BTreeSet<usize>,
    ) -> Result<usize, RelocateError> {
        let entry = self.entry(kind)?;
        if entry.self_id.is_none() {
            return Ok(0);
        }
        let mut changed = 0;
        for &slot in slots {
            for realm in 0..store.realm_count() {
                let Some(record) = store.get_mut(realm, slot) else {
                    continue;
                };
                let before = entry.self_id.as_deref().and_then(|f| record.int(f));
                stamp_self_id(entry, record, slot)
                    .map_err(|e| RelocateError::mismatch(kind, realm, slot, e))?;
                if before != Some(slot_id(slot)) {
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            tracing::info!("Aligned {} {} self-ids with their slots", changed, kind);
        }
        Ok(changed)
    }

    fn source_record(&self, store: &RecordStore, realm: usize, slot: usize) -> Slot {
        if realm < store.realm_count() {
            store.get(realm, slot).cloned()
        } else if self.copy_extra_realms_from_default {
            store.get(0, slot).cloned()
        } else {
            None
        }
    }

    fn plan_dependents(
        &self,
        entry: &'s KindSchema,
        link: &'s DependentLink,
        source: &Dataset,
        request: &ImplantRequest,
        count: usize,
    ) -> Result<DependentPlan<'s>, RelocateError> {
        let dependent_entry = self.entry(link.kind)?;
        let primary = source.store(entry.kind)?;
        let len = source.store(link.kind)?.len();
        let offset = request.offset();

        let mut indices = BTreeSet::new();
        for slot in request.source_start..request.source_start + count {
            for realm in 0..primary.realm_count() {
                let Some(record) = primary.get(realm, slot) else {
                    continue;
                };
                let mut failure = None;
                walk::visit(record, &link.pointer, |_, index| {
                    // negative pointers mean "no dependent record"
                    let Ok(at) = usize::try_from(index) else {
                        return;
                    };
                    if at >= len {
                        failure.get_or_insert(RangeError::DependentOutOfBounds {
                            kind: entry.kind,
                            slot,
                            dependent: link.kind,
                            index,
                            len,
                        });
                    } else if index + offset < 0 {
                        failure.get_or_insert(RangeError::DependentNegative {
                            kind: entry.kind,
                            slot,
                            dependent: link.kind,
                            index,
                            offset,
                        });
                    } else {
                        indices.insert(at);
                    }
                })
                .map_err(|e| RelocateError::mismatch(entry.kind, realm, slot, e))?;
                if let Some(err) = failure {
                    return Err(err.into());
                }
            }
        }

        Ok(DependentPlan {
            link,
            entry: dependent_entry,
            offset,
            indices,
        })
    }

    fn copy_dependents(
        &self,
        source: &Dataset,
        target: &mut Dataset,
        primary: RecordKind,
        plan: &DependentPlan<'_>,
    ) -> Result<DependentOutcome, RelocateError> {
        let kind = plan.link.kind;
        let source_store = source.store(kind)?;
        let relocation: RelocationMap = plan
            .indices
            .iter()
            .map(|&i| (slot_id(i), slot_id(plan.target_of(i))))
            .collect();
        let min_len = plan
            .indices
            .iter()
            .map(|&i| plan.target_of(i) + 1)
            .max()
            .unwrap_or(0);

        let store = target.store_mut(kind)?;
        let slots = plan.indices.iter().map(|&i| plan.target_of(i));
        let (padded, overwritten) = prepare(store, plan.entry, slots, min_len)?;

        for &from in &plan.indices {
            let to = plan.target_of(from);
            for realm in 0..store.realm_count() {
                let mut copy = self.source_record(source_store, realm, from);
                if let Some(record) = copy.as_mut() {
                    stamp_self_id(plan.entry, record, to)
                        .map_err(|e| RelocateError::mismatch(kind, realm, from, e))?;
                }
                store.set(realm, to, copy)?;
            }
        }

        tracing::info!(
            "Carried {} {} records referenced by {} under offset {}",
            plan.indices.len(),
            kind,
            primary,
            plan.offset
        );
        if padded > 0 {
            tracing::info!("Extended {} store by {} slots", kind, padded);
        }
        self.notify_overwrite(kind, &overwritten);

        Ok(DependentOutcome {
            kind,
            offset: plan.offset,
            relocation,
            padded,
            overwritten,
        })
    }

    fn copy_companion(
        &self,
        source: &Dataset,
        target: &mut Dataset,
        companion: RecordKind,
        sources: &Range<usize>,
        targets: &Range<usize>,
        min_len: usize,
    ) -> Result<Vec<usize>, RelocateError> {
        let entry = self.entry(companion)?;
        let blank: Slot = match &entry.blank {
            BlankPolicy::Sentinel(record) => Some(record.clone()),
            BlankPolicy::Empty | BlankPolicy::CloneFirst => None,
        };
        let source_store = source.store(companion).ok();
        if source_store.is_none() {
            tracing::debug!("Source has no {} store; writing blanks", companion);
        }

        let store = target.store_mut(companion)?;
        let (padded, overwritten) = prepare(store, entry, targets.clone(), min_len.max(targets.end))?;
        for (from, to) in sources.clone().zip(targets.clone()) {
            for realm in 0..store.realm_count() {
                let copy = source_store
                    .and_then(|s| self.source_record(s, realm, from))
                    .or_else(|| blank.clone());
                store.set(realm, to, copy)?;
            }
        }
        if padded > 0 {
            tracing::debug!("Extended {} store by {} slots", companion, padded);
        }
        Ok(overwritten)
    }

    fn notify_overwrite(&self, kind: RecordKind, overwritten: &[usize]) {
        if !self.warn_on_overwrite || overwritten.is_empty() {
            return;
        }
        let shown: Vec<String> = overwritten.iter().take(10).map(ToString::to_string).collect();
        let more = if overwritten.len() > shown.len() {
            format!(" and {} more", overwritten.len() - shown.len())
        } else {
            String::new()
        };
        tracing::info!(
            "Overwriting {} existing {} slots: {}{}",
            overwritten.len(),
            kind,
            shown.join(", "),
            more
        );
    }
}

/// Note non-vacant pre-existing slots, then pad the store to `min_len`
fn prepare(
    store: &mut RecordStore,
    entry: &KindSchema,
    slots: impl IntoIterator<Item = usize>,
    min_len: usize,
) -> Result<(usize, Vec<usize>), StoreError> {
    let old_len = store.len();
    let overwritten = slots
        .into_iter()
        .filter(|&slot| {
            slot < old_len
                && store
                    .realms()
                    .iter()
                    .any(|realm| realm.get(slot).is_some_and(|s| !entry.is_vacant(s)))
        })
        .collect();
    let padded = store.extend(min_len, &entry.blank)?;
    Ok((padded, overwritten))
}

/// Write the slot index into the record's self-id field
fn stamp_self_id(entry: &KindSchema, record: &mut Record, slot: usize) -> Result<(), WalkError> {
    let Some(field) = entry.self_id.as_deref() else {
        return Ok(());
    };
    match record.get_mut(field) {
        Some(Value::Int(id)) => {
            *id = slot_id(slot);
            Ok(())
        }
        Some(other) => Err(WalkError::UnexpectedType {
            path: field.to_string(),
            expected: "int",
            found: other.type_name(),
        }),
        None => Err(WalkError::MissingField {
            path: field.to_string(),
        }),
    }
}
