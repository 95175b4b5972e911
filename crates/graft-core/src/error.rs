//! Error types for the relocation engine
//!
//! Distinguishes:
//! - Range errors: the requested relocation does not fit the source
//! - Schema mismatches: a record lacks a field the schema table names
//! - Store and configuration failures
//! - Post-relocation consistency failures (only when configured fatal)

use graft_store::{RecordKind, StoreError, WalkError};

/// Main relocation error type
#[derive(Debug, thiserror::Error)]
pub enum RelocateError {
    /// Requested range does not fit the source store
    #[error("range error: {0}")]
    Range(#[from] RangeError),

    /// A record does not have the shape the schema describes
    #[error("schema mismatch in {kind} slot {slot} (realm {realm}): {source}")]
    SchemaMismatch {
        kind: RecordKind,
        realm: usize,
        slot: usize,
        #[source]
        source: WalkError,
    },

    /// Dataset was decoded from a format version the schema does not describe
    #[error("schema describes {expected}, but the {role} dataset is {found}")]
    VersionMismatch {
        role: &'static str,
        expected: String,
        found: String,
    },

    /// Schema has no entry for a kind the plan names
    #[error("schema has no entry for {0}")]
    UndescribedKind(RecordKind),

    /// Store access failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Migration configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Consistency check found stale references and the run is configured to fail
    #[error("{count} consistency issues remain in {kind} after relocation")]
    Inconsistent { kind: RecordKind, count: usize },
}

impl RelocateError {
    /// Build a schema mismatch for one record
    #[inline]
    #[must_use]
    pub fn mismatch(kind: RecordKind, realm: usize, slot: usize, source: WalkError) -> Self {
        Self::SchemaMismatch {
            kind,
            realm,
            slot,
            source,
        }
    }

    /// Check if the record shapes disagree with the schema table
    #[inline]
    #[must_use]
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. } | Self::VersionMismatch { .. } | Self::UndescribedKind(_)
        )
    }

    /// Check if the error must stop the migration
    ///
    /// Leftover consistency issues are only raised when the caller asks to
    /// fail on them; the migrated data itself is complete.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Inconsistent { .. })
    }

    /// Check if the error was raised before the target was touched
    ///
    /// Range and configuration errors are detected up front; anything else
    /// may leave the in-memory target partially mutated.
    #[inline]
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::Range(_) | Self::Config(_) | Self::VersionMismatch { .. } | Self::UndescribedKind(_)
        )
    }
}

/// Requested relocation range is invalid
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// Source start lies at or past the end of the source store
    #[error("{kind}: source start {start} is out of range (source has {len} slots)")]
    StartOutOfBounds {
        kind: RecordKind,
        start: usize,
        len: usize,
    },

    /// Inclusive end before start
    #[error("{kind}: source end {end} is before source start {start}")]
    EndBeforeStart {
        kind: RecordKind,
        start: usize,
        end: usize,
    },

    /// Inclusive end past the last source slot
    #[error("{kind}: source end {end} is out of range (source has {len} slots)")]
    EndOutOfBounds {
        kind: RecordKind,
        end: usize,
        len: usize,
    },

    /// Range selects no records
    #[error("{kind}: range selects no records")]
    EmptyRange { kind: RecordKind },

    /// A dependent pointer names a slot the dependent store does not have
    #[error("{kind} slot {slot}: {dependent} index {index} is out of range ({dependent} store has {len} slots)")]
    DependentOutOfBounds {
        kind: RecordKind,
        slot: usize,
        dependent: RecordKind,
        index: i64,
        len: usize,
    },

    /// Offset would move a dependent record below slot 0
    #[error("{kind} slot {slot}: {dependent} index {index} shifted by {offset} is negative")]
    DependentNegative {
        kind: RecordKind,
        slot: usize,
        dependent: RecordKind,
        index: i64,
        offset: i64,
    },

    /// Target slots would run past the addressable range
    #[error("{kind}: moving source start {start} by {offset} overflows the slot range")]
    TargetOverflow {
        kind: RecordKind,
        start: usize,
        offset: usize,
    },
}

impl RangeError {
    /// Record kind the failing range belongs to
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::StartOutOfBounds { kind, .. }
            | Self::EndBeforeStart { kind, .. }
            | Self::EndOutOfBounds { kind, .. }
            | Self::EmptyRange { kind }
            | Self::DependentOutOfBounds { kind, .. }
            | Self::DependentNegative { kind, .. }
            | Self::TargetOverflow { kind, .. } => *kind,
        }
    }
}

/// Migration configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for the expected shape
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A name pattern does not compile
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Values parse but contradict each other
    #[error("{0}")]
    Invalid(String),
}
