//! Graft Core - record relocation engine
//!
//! Moves ranges of ID-indexed records from a source dataset into a target
//! dataset at new IDs while keeping every cross-reference consistent:
//! - [`Implanter`] copies a range, padding the target and carrying
//!   dependent and companion records
//! - [`Rewriter`] applies a [`RelocationMap`] to schema-listed reference
//!   fields, per batch and globally
//! - [`ConsistencyChecker`] reports stale references and misaligned self-ids
//! - [`MediaSweep`] re-anchors graphic and sound pointers by field name
//! - [`Orchestrator`] runs the whole pipeline from a [`MigrationConfig`]
//!
//! # Example
//!
//! ```rust
//! use graft_core::{build_relocation_map, ImplantRequest, Implanter};
//! use graft_store::{Dataset, Record, RecordKind, RecordStore, Schema};
//!
//! let unit = |id: i64, base: i64| {
//!     Some(
//!         Record::new()
//!             .with("id", id)
//!             .with("copy_id", id)
//!             .with("base_id", base)
//!             .with("dead_unit_id", -1)
//!             .with("blood_unit_id", -1),
//!     )
//! };
//! let source = Dataset::new("VER 8.8")
//!     .with_store(RecordKind::Unit, RecordStore::single(vec![unit(0, 0), unit(1, 1)]));
//! let mut target = Dataset::new("VER 8.8")
//!     .with_store(RecordKind::Unit, RecordStore::single(vec![unit(0, 0)]));
//!
//! let schema = Schema::builtin();
//! let request = ImplantRequest::new(RecordKind::Unit, 1, 5);
//! let outcome = Implanter::new(&schema).implant(&source, &mut target, &request).unwrap();
//!
//! assert_eq!(outcome.relocation, build_relocation_map(1, 5, 1));
//! let moved = target.store(RecordKind::Unit).unwrap().get(0, 5).unwrap();
//! assert_eq!(moved.int("base_id"), Some(5));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod check;
pub mod config;
pub mod error;
pub mod implant;
pub mod inspect;
pub mod orchestrator;
pub mod relocation;
pub mod rewrite;
pub mod shift;
pub mod sweep;

// Re-exports for convenience
pub use check::{check, ConsistencyChecker, ConsistencyIssue};
pub use config::{KindPlan, MediaPlan, MigrationConfig, SweepPlan};
pub use error::{ConfigError, RangeError, RelocateError};
pub use implant::{DependentOutcome, ImplantOutcome, ImplantRequest, Implanter};
pub use inspect::{
    collect_references, grep_value, trace_references, ReferenceHit, ReferenceTrace, TraceEdge,
    ValueHit,
};
pub use orchestrator::{KindSummary, MediaSummary, MigrationReport, Orchestrator};
pub use relocation::{build_relocation_map, slot_id, RelocationMap};
pub use rewrite::Rewriter;
pub use shift::{shift, ShiftOutcome, ShiftRequest};
pub use sweep::{MediaSweep, SweepCounts, SweepRule};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running migrations
    pub use crate::{
        build_relocation_map, ConsistencyIssue, ImplantRequest, Implanter, MigrationConfig,
        MigrationReport, Orchestrator, RelocateError, RelocationMap, Rewriter,
    };
    pub use graft_store::{Dataset, RecordKind, Schema};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
