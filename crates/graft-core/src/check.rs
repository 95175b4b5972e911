//! Post-relocation consistency checking
//!
//! After a migration every implanted record should:
//! - carry a self-id equal to its slot index
//! - hold no reference to a pre-relocation source ID
//!
//! Violations are reported, never raised. The checker is read-only.

use graft_store::{walk, KindSchema, RecordStore};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::relocation::slot_id;

/// One stale reference or misaligned self-id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyIssue {
    /// Slot holding the offending record
    pub slot: usize,
    /// Realm holding the offending record
    pub realm: usize,
    /// Concrete field location, e.g. `building.annexes[0].unit_id`
    pub field_path: String,
    /// Value found
    pub bad_value: i64,
    /// What is wrong with it
    pub message: String,
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot {} realm {} {} = {}: {}",
            self.slot, self.realm, self.field_path, self.bad_value, self.message
        )
    }
}

/// Read-only checker for one kind's store
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyChecker<'s> {
    entry: &'s KindSchema,
}

impl<'s> ConsistencyChecker<'s> {
    /// Checker for the kind `entry` describes
    #[inline]
    #[must_use]
    pub fn new(entry: &'s KindSchema) -> Self {
        Self { entry }
    }

    /// Check implanted slots against the set of stale source IDs
    ///
    /// Issues are ordered by slot, then realm, then schema field order.
    /// Records whose fields cannot be read are skipped with a warning.
    #[must_use]
    pub fn check(
        &self,
        store: &RecordStore,
        implanted: &BTreeSet<usize>,
        stale_ids: &BTreeSet<i64>,
    ) -> Vec<ConsistencyIssue> {
        let kind = self.entry.kind;
        let mut issues = Vec::new();

        for &slot in implanted {
            for realm in 0..store.realm_count() {
                let Some(record) = store.get(realm, slot) else {
                    continue;
                };

                if let Some(field) = self.entry.self_id.as_deref() {
                    match record.int(field) {
                        Some(id) if id != slot_id(slot) => issues.push(ConsistencyIssue {
                            slot,
                            realm,
                            field_path: field.to_string(),
                            bad_value: id,
                            message: format!("self-id {id} does not match slot {slot}"),
                        }),
                        Some(_) => {}
                        None => tracing::warn!(
                            "{} slot {} realm {}: no integer '{}' to check",
                            kind,
                            slot,
                            realm,
                            field
                        ),
                    }
                }

                for reference in self.entry.references_to(kind) {
                    let visited = walk::visit(record, &reference.path, |at, value| {
                        if stale_ids.contains(&value) {
                            issues.push(ConsistencyIssue {
                                slot,
                                realm,
                                field_path: at.to_string(),
                                bad_value: value,
                                message: format!("still references pre-relocation {kind} {value}"),
                            });
                        }
                    });
                    if let Err(e) = visited {
                        tracing::warn!(
                            "{} slot {} realm {}: skipping unreadable field: {}",
                            kind,
                            slot,
                            realm,
                            e
                        );
                    }
                }
            }
        }
        issues
    }
}

/// Convenience wrapper around [`ConsistencyChecker::check`]
#[must_use]
pub fn check(
    store: &RecordStore,
    entry: &KindSchema,
    implanted: &BTreeSet<usize>,
    stale_ids: &BTreeSet<i64>,
) -> Vec<ConsistencyIssue> {
    ConsistencyChecker::new(entry).check(store, implanted, stale_ids)
}
