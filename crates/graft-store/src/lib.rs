//! Graft Store
//!
//! Decoded record graph for fixed-slot, ID-indexed game-data stores.
//!
//! # Core Concepts
//!
//! - [`Record`] / [`Value`]: a decoded record as an ordered field tree
//! - [`RecordStore`]: parallel realms of slots indexed by record ID
//! - [`Dataset`]: every store of one persisted file, keyed by [`RecordKind`]
//! - [`FieldPath`]: address of a reference field (`building?.annexes[].unit_id`)
//! - [`Schema`]: versioned table of reference fields per kind
//! - [`StoreCodec`]: boundary to the persisted format
//!
//! # Example
//!
//! ```rust
//! use graft_store::{walk, BlankPolicy, Record, RecordStore, Schema, RecordKind};
//!
//! let unit = Record::new().with("id", 2601).with("base_id", 2605);
//! let mut store = RecordStore::single(vec![Some(unit)]);
//! store.extend(4, &BlankPolicy::Empty).unwrap();
//! assert_eq!(store.len(), 4);
//!
//! let schema = Schema::builtin();
//! let base = &schema.kind(RecordKind::Unit).unwrap().references[1].path;
//! let mut seen = Vec::new();
//! walk::visit(store.get(0, 0).unwrap(), base, |_, v| seen.push(v)).unwrap();
//! assert_eq!(seen, vec![2605]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod codec;
mod dataset;
mod error;
mod kind;
mod path;
mod schema;
mod store;
mod value;

pub mod walk;

// Re-exports
pub use codec::{JsonCodec, StoreCodec};
pub use dataset::Dataset;
pub use error::StoreError;
pub use kind::{RecordKind, UnknownKind};
pub use path::{FieldPath, PathError, Segment};
pub use schema::{DependentLink, KindSchema, ReferenceField, Schema, SCHEMA_VERSION};
pub use store::{BlankPolicy, RecordStore, Slot};
pub use value::{Record, Value};
pub use walk::WalkError;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
