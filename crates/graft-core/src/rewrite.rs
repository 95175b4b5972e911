//! Reference rewriting
//!
//! A [`Rewriter`] applies a [`RelocationMap`] to every reference field of
//! one kind's schema entry that names records of one target kind. It is
//! used in two scopes:
//! - per record, while an implant copies it (scoped to that batch's map)
//! - over a whole store, once every batch of a kind has landed (the global
//!   pass, with the union of all batches' maps)
//!
//! Values outside the map's key set are never touched.

use crate::error::RelocateError;
use crate::relocation::RelocationMap;
use graft_store::{walk, KindSchema, Record, RecordKind, RecordStore, WalkError};
use std::collections::BTreeSet;

/// Applies a relocation map to the reference fields of one kind
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'s> {
    entry: &'s KindSchema,
    target: RecordKind,
}

impl<'s> Rewriter<'s> {
    /// Rewriter for references a kind makes to its own records
    #[inline]
    #[must_use]
    pub fn new(entry: &'s KindSchema) -> Self {
        Self {
            entry,
            target: entry.kind,
        }
    }

    /// Rewriter for references into another kind
    #[inline]
    #[must_use]
    pub fn targeting(entry: &'s KindSchema, target: RecordKind) -> Self {
        Self { entry, target }
    }

    /// Kind whose records are rewritten
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.entry.kind
    }

    /// Rewrite one record in place
    ///
    /// Returns how many field values changed.
    ///
    /// # Errors
    /// Returns [`WalkError`] if a required field is absent or mis-shaped.
    pub fn rewrite(&self, record: &mut Record, map: &RelocationMap) -> Result<usize, WalkError> {
        if map.is_empty() {
            return Ok(0);
        }
        let mut changed = 0;
        for field in self.entry.references_to(self.target) {
            walk::visit_mut(record, &field.path, |_, value| {
                if let Some(new) = map.get(*value) {
                    if new != *value {
                        *value = new;
                        changed += 1;
                    }
                }
            })?;
        }
        Ok(changed)
    }

    /// Rewrite every record of every realm
    ///
    /// # Errors
    /// Returns [`RelocateError::SchemaMismatch`] naming the first record
    /// that does not match the schema.
    pub fn rewrite_all(
        &self,
        store: &mut RecordStore,
        map: &RelocationMap,
    ) -> Result<usize, RelocateError> {
        self.rewrite_outside(store, map, &BTreeSet::new())
    }

    /// Rewrite every record except those in `done`
    ///
    /// `done` holds slots whose records were already rewritten with this
    /// map. Skipping them keeps the pass from chaining entries when the
    /// map's targets overlap its sources.
    ///
    /// # Errors
    /// Same conditions as [`Rewriter::rewrite_all`].
    pub fn rewrite_outside(
        &self,
        store: &mut RecordStore,
        map: &RelocationMap,
        done: &BTreeSet<usize>,
    ) -> Result<usize, RelocateError> {
        if map.is_empty() {
            return Ok(0);
        }
        let kind = self.kind();
        let mut changed = 0;
        for (realm, slot, record) in store.iter_mut() {
            if done.contains(&slot) {
                continue;
            }
            changed += self
                .rewrite(record, map)
                .map_err(|e| RelocateError::mismatch(kind, realm, slot, e))?;
        }
        tracing::debug!(
            "Global rewrite of {} references to {}: {} values changed",
            kind,
            self.target,
            changed
        );
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocation::build_relocation_map;
    use graft_store::{Schema, Value};
    use pretty_assertions::assert_eq;

    fn unit(id: i64, base: i64, annex: i64) -> Record {
        let building = Record::new()
            .with("stack_unit_id", -1)
            .with("head_unit", -1)
            .with("transform_unit", -1)
            .with("pile_unit", -1)
            .with(
                "annexes",
                vec![Value::from(Record::new().with("unit_id", annex))],
            );
        Record::new()
            .with("id", id)
            .with("copy_id", id)
            .with("base_id", base)
            .with("dead_unit_id", -1)
            .with("blood_unit_id", -1)
            .with("building", building)
    }

    #[test]
    fn rewrite_changes_only_mapped_values() {
        let schema = Schema::builtin();
        let rewriter = Rewriter::new(schema.kind(RecordKind::Unit).unwrap());
        let map = build_relocation_map(2601, 3201, 5);

        let mut record = unit(2601, 2605, 83);
        let changed = rewriter.rewrite(&mut record, &map).unwrap();

        assert_eq!(changed, 2);
        assert_eq!(record.int("copy_id"), Some(3201));
        assert_eq!(record.int("base_id"), Some(3205));
        // self-id is not a reference field
        assert_eq!(record.int("id"), Some(2601));
        assert_eq!(record.int("dead_unit_id"), Some(-1));
    }

    #[test]
    fn rewrite_reaches_list_elements() {
        let schema = Schema::builtin();
        let rewriter = Rewriter::new(schema.kind(RecordKind::Unit).unwrap());
        let map = build_relocation_map(2603, 3203, 1);

        let mut record = unit(10, 10, 2603);
        assert_eq!(rewriter.rewrite(&mut record, &map).unwrap(), 1);

        let mut seen = Vec::new();
        let path = "building?.annexes[].unit_id".parse().unwrap();
        walk::visit(&record, &path, |_, v| seen.push(v)).unwrap();
        assert_eq!(seen, vec![3203]);
    }

    #[test]
    fn rewrite_all_reports_mismatch_location() {
        let schema = Schema::builtin();
        let rewriter = Rewriter::new(schema.kind(RecordKind::Unit).unwrap());
        let map = build_relocation_map(1, 2, 1);

        let broken = Record::new().with("id", 1);
        let mut store = RecordStore::with_realms(vec![
            vec![Some(unit(0, 1, -1)), None],
            vec![Some(unit(0, 1, -1)), Some(broken)],
        ]);
        let err = rewriter.rewrite_all(&mut store, &map).unwrap_err();
        assert!(matches!(
            err,
            RelocateError::SchemaMismatch {
                realm: 1,
                slot: 1,
                ..
            }
        ));
    }

    #[test]
    fn rewrite_outside_skips_done_slots() {
        let schema = Schema::builtin();
        let rewriter = Rewriter::new(schema.kind(RecordKind::Unit).unwrap());
        // block 1..=2 moved to 2..=3; slot 2 already holds a rewritten copy
        let map = build_relocation_map(1, 2, 2);
        let mut store = RecordStore::single(vec![
            Some(unit(0, 1, -1)),
            None,
            Some(unit(2, 3, -1)),
        ]);
        let done = [2].into_iter().collect();

        let changed = rewriter.rewrite_outside(&mut store, &map, &done).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(store.get(0, 0).unwrap().int("base_id"), Some(2));
        assert_eq!(store.get(0, 2).unwrap().int("copy_id"), Some(2));
    }

    #[test]
    fn rewrite_with_empty_map_is_noop() {
        let schema = Schema::builtin();
        let rewriter = Rewriter::new(schema.kind(RecordKind::Unit).unwrap());
        // even an ill-formed record passes when nothing is relocated
        let mut record = Record::new();
        assert_eq!(rewriter.rewrite(&mut record, &RelocationMap::new()).unwrap(), 0);
    }

    #[test]
    fn tech_prerequisites_follow_map() {
        let schema = Schema::builtin();
        let rewriter = Rewriter::new(schema.kind(RecordKind::Tech).unwrap());
        let map = build_relocation_map(904, 1504, 9);

        let mut tech = Record::new()
            .with("effect_id", 10)
            .with("required_techs", vec![Value::from(905), Value::from(-1), Value::from(12)]);
        assert_eq!(rewriter.rewrite(&mut tech, &map).unwrap(), 1);
        assert_eq!(
            tech.get("required_techs").unwrap().as_list().unwrap(),
            &[Value::Int(1505), Value::Int(-1), Value::Int(12)]
        );
        // dependent pointers are not reference fields
        assert_eq!(tech.int("effect_id"), Some(10));
    }
}
