//! Read-only inspection helpers for tracking down stale references
//!
//! - [`collect_references`]: schema-driven scan for watched IDs
//! - [`grep_value`]: schema-free scan of every numeric field for one value
//! - [`trace_references`]: reference graph reachable from one record
//!
//! Traversals use explicit work stacks; the trace keeps a visited set so
//! reference cycles terminate.

use crate::error::RelocateError;
use graft_store::{walk, Dataset, KindSchema, RecordKind, RecordStore, Schema, Value};
use serde::Serialize;
use std::collections::BTreeSet;

/// A reference field holding a watched ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceHit {
    /// Slot of the referencing record
    pub slot: usize,
    /// Realm of the referencing record
    pub realm: usize,
    /// Concrete field location
    pub field_path: String,
    /// Kind the field refers to
    pub target: RecordKind,
    /// ID found
    pub value: i64,
}

/// Every reference field in `store` whose value is in `watch`
///
/// Records that do not match the schema are skipped with a warning.
#[must_use]
pub fn collect_references(
    store: &RecordStore,
    entry: &KindSchema,
    watch: &BTreeSet<i64>,
) -> Vec<ReferenceHit> {
    let mut hits = Vec::new();
    for (realm, slot, record) in store.iter() {
        for reference in &entry.references {
            let visited = walk::visit(record, &reference.path, |at, value| {
                if watch.contains(&value) {
                    hits.push(ReferenceHit {
                        slot,
                        realm,
                        field_path: at.to_string(),
                        target: reference.target,
                        value,
                    });
                }
            });
            if let Err(e) = visited {
                tracing::warn!("{} slot {} realm {}: {}", entry.kind, slot, realm, e);
            }
        }
    }
    hits
}

/// A numeric field equal to the searched value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueHit {
    /// Location, e.g. `unit[2][3201].building.annexes[0].unit_id`
    pub path: String,
    /// Value found; floats match on their integer part
    pub value: Value,
}

/// Find every numeric field in the dataset equal to `needle`
///
/// Results are in store, realm, slot, then field order.
#[must_use]
pub fn grep_value(dataset: &Dataset, needle: i64) -> Vec<ValueHit> {
    let mut hits = Vec::new();
    for (kind, store) in dataset.stores() {
        for (realm, slot, record) in store.iter() {
            let root = format!("{kind}[{realm}][{slot}]");
            let mut stack: Vec<(String, &Value)> = record
                .fields()
                .iter()
                .rev()
                .map(|(name, value)| (format!("{root}.{name}"), value))
                .collect();

            while let Some((path, value)) = stack.pop() {
                match value {
                    Value::Int(v) if *v == needle => hits.push(ValueHit {
                        path,
                        value: value.clone(),
                    }),
                    #[allow(clippy::cast_precision_loss)]
                    Value::Float(f) if f.trunc() == needle as f64 => hits.push(ValueHit {
                        path,
                        value: value.clone(),
                    }),
                    Value::List(items) => stack.extend(
                        items
                            .iter()
                            .enumerate()
                            .rev()
                            .map(|(i, item)| (format!("{path}[{i}]"), item)),
                    ),
                    Value::Struct(fields) => stack.extend(
                        fields
                            .iter()
                            .rev()
                            .map(|(name, item)| (format!("{path}.{name}"), item)),
                    ),
                    _ => {}
                }
            }
        }
    }
    hits
}

/// One reference followed during a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEdge {
    /// Referencing slot
    pub from: usize,
    /// Realm of the referencing record
    pub realm: usize,
    /// Field holding the reference
    pub field_path: String,
    /// Referenced ID
    pub to: i64,
}

/// Records reachable from one root through same-kind references
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceTrace {
    /// Kind traced
    pub kind: RecordKind,
    /// Starting slot
    pub root: usize,
    /// Slots reached, in discovery order (root first)
    pub reached: Vec<usize>,
    /// References into existing records
    pub edges: Vec<TraceEdge>,
    /// References to slots past the end of the store or to empty slots
    pub dangling: Vec<TraceEdge>,
}

/// Follow same-kind references outward from `root`
///
/// Negative references mean "none" and are not followed.
///
/// # Errors
/// - [`RelocateError::UndescribedKind`] if the schema lacks `kind`
/// - [`RelocateError::Store`] if the dataset has no such store
/// - [`RelocateError::SchemaMismatch`] if a reached record lacks a field
pub fn trace_references(
    dataset: &Dataset,
    schema: &Schema,
    kind: RecordKind,
    root: usize,
) -> Result<ReferenceTrace, RelocateError> {
    let entry = schema
        .kind(kind)
        .ok_or(RelocateError::UndescribedKind(kind))?;
    let store = dataset.store(kind)?;

    let mut trace = ReferenceTrace {
        kind,
        root,
        reached: Vec::new(),
        edges: Vec::new(),
        dangling: Vec::new(),
    };
    let mut visited = BTreeSet::from([root]);
    let mut stack = vec![root];

    while let Some(slot) = stack.pop() {
        trace.reached.push(slot);
        for realm in 0..store.realm_count() {
            let Some(record) = store.get(realm, slot) else {
                continue;
            };
            for reference in entry.references_to(kind) {
                let mut found = Vec::new();
                walk::visit(record, &reference.path, |at, to| {
                    if to >= 0 {
                        found.push((at.to_string(), to));
                    }
                })
                .map_err(|e| RelocateError::mismatch(kind, realm, slot, e))?;

                for (field_path, to) in found {
                    let edge = TraceEdge {
                        from: slot,
                        realm,
                        field_path,
                        to,
                    };
                    let target = usize::try_from(to).ok().filter(|&t| {
                        (0..store.realm_count()).any(|r| store.get(r, t).is_some())
                    });
                    match target {
                        Some(next) => {
                            if visited.insert(next) {
                                stack.push(next);
                            }
                            trace.edges.push(edge);
                        }
                        None => trace.dangling.push(edge),
                    }
                }
            }
        }
    }

    tracing::debug!(
        "Traced {} {}: {} reached, {} dangling",
        kind,
        root,
        trace.reached.len(),
        trace.dangling.len()
    );
    Ok(trace)
}
