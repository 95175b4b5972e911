//! Migration orchestrator
//!
//! Runs a whole migration from a [`MigrationConfig`]:
//! 1. clone the baseline as the target
//! 2. per kind plan: implant the main range, then every override
//! 3. per kind: one global rewrite with the union relocation map, then
//!    self-id alignment and the consistency check
//! 4. move media ranges
//! 5. optionally sweep media pointers in the relocated primary records
//!
//! The global rewrite for a kind runs only after all of its batches have
//! landed, so references between batches are caught.

use crate::check::{ConsistencyChecker, ConsistencyIssue};
use crate::config::{KindPlan, MediaPlan, MigrationConfig};
use crate::error::{ConfigError, RelocateError};
use crate::implant::{ImplantOutcome, ImplantRequest, Implanter};
use crate::relocation::{slot_id, RelocationMap};
use crate::rewrite::Rewriter;
use crate::sweep::SweepCounts;
use graft_store::{Dataset, KindSchema, RecordKind, Schema};
use serde::Serialize;
use std::collections::BTreeSet;

/// Everything one kind's migration did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Kind migrated
    pub kind: RecordKind,
    /// Implant batches, main range first
    pub batches: Vec<ImplantOutcome>,
    /// Every target slot written by a batch
    pub implanted: BTreeSet<usize>,
    /// Union of the batches' non-identity relocations
    pub relocation: RelocationMap,
    /// Pre-relocation IDs that should no longer be referenced
    pub stale_ids: BTreeSet<i64>,
    /// Values changed by the global rewrite
    pub global_rewrites: usize,
    /// Self-ids corrected after the global rewrite
    pub self_ids_aligned: usize,
    /// Consistency issues left after relocation
    pub issues: Vec<ConsistencyIssue>,
}

impl KindSummary {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            batches: Vec::new(),
            implanted: BTreeSet::new(),
            relocation: RelocationMap::new(),
            stale_ids: BTreeSet::new(),
            global_rewrites: 0,
            self_ids_aligned: 0,
            issues: Vec::new(),
        }
    }

    /// Check whether no issues remain
    #[inline]
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }

    /// Records moved across all batches
    #[must_use]
    pub fn moved(&self) -> usize {
        self.batches.iter().map(|b| b.count).sum()
    }

    /// Existing target slots replaced across all batches
    #[must_use]
    pub fn overwritten(&self) -> usize {
        self.batches.iter().map(|b| b.overwritten.len()).sum()
    }
}

/// One media move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSummary {
    /// Media kind
    pub kind: RecordKind,
    /// First source slot
    pub source_start: usize,
    /// Last source slot moved
    pub last_source_slot: usize,
    /// First target slot
    pub target_start: usize,
    /// Records moved
    pub count: usize,
    /// Existing target slots replaced
    pub overwritten: usize,
}

impl MediaSummary {
    /// Target slot minus source slot
    #[inline]
    #[must_use]
    pub fn offset(&self) -> i64 {
        slot_id(self.target_start) - slot_id(self.source_start)
    }
}

/// Result of a full migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Migrated dataset, ready for encoding
    #[serde(skip)]
    pub dataset: Dataset,
    /// Per-kind summaries, primary first
    pub kinds: Vec<KindSummary>,
    /// Media moves performed
    pub media: Vec<MediaSummary>,
    /// Sweep counts, if the sweep ran
    pub sweep: Option<SweepCounts>,
}

impl MigrationReport {
    /// Summary for one kind
    #[must_use]
    pub fn kind(&self, kind: RecordKind) -> Option<&KindSummary> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    /// Consistency issues across every kind
    pub fn issues(&self) -> impl Iterator<Item = (RecordKind, &ConsistencyIssue)> {
        self.kinds
            .iter()
            .flat_map(|k| k.issues.iter().map(move |issue| (k.kind, issue)))
    }

    /// Check whether every kind is consistent
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.kinds.iter().all(KindSummary::is_consistent)
    }

    /// Take the migrated dataset
    #[inline]
    #[must_use]
    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }
}

/// Drives a configured migration
#[derive(Debug, Clone)]
pub struct Orchestrator<'s> {
    schema: &'s Schema,
    config: MigrationConfig,
}

impl<'s> Orchestrator<'s> {
    /// Validate the configuration against the schema
    ///
    /// # Errors
    /// - [`RelocateError::Config`] if the plan contradicts itself
    /// - [`RelocateError::VersionMismatch`] if the plan targets another format
    /// - [`RelocateError::UndescribedKind`] if a planned kind has no schema entry
    pub fn new(schema: &'s Schema, config: MigrationConfig) -> Result<Self, RelocateError> {
        config.validate()?;
        if config.schema_version != schema.version() {
            return Err(RelocateError::VersionMismatch {
                role: "config",
                expected: schema.version().to_string(),
                found: config.schema_version.clone(),
            });
        }
        let planned = config
            .kind_plans()
            .map(|p| p.kind)
            .chain(config.media.iter().map(|m| m.kind));
        for kind in planned {
            if schema.kind(kind).is_none() {
                return Err(RelocateError::UndescribedKind(kind));
            }
        }
        Ok(Self { schema, config })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    fn implanter(&self) -> Implanter<'s> {
        Implanter::new(self.schema)
            .warn_on_overwrite(self.config.warn_on_overwrite)
            .copy_extra_realms_from_default(self.config.copy_extra_realms_from_default)
    }

    fn entry(&self, kind: RecordKind) -> Result<&'s KindSchema, RelocateError> {
        self.schema
            .kind(kind)
            .ok_or(RelocateError::UndescribedKind(kind))
    }

    fn check_version(&self, role: &'static str, dataset: &Dataset) -> Result<(), RelocateError> {
        if dataset.version() == self.schema.version() {
            Ok(())
        } else {
            Err(RelocateError::VersionMismatch {
                role,
                expected: self.schema.version().to_string(),
                found: dataset.version().to_string(),
            })
        }
    }

    /// Run the configured migration
    ///
    /// Neither input is modified; the migrated dataset is returned in the
    /// report.
    ///
    /// # Errors
    /// Propagates the first [`RelocateError`] from any step.
    pub fn run(&self, source: &Dataset, baseline: &Dataset) -> Result<MigrationReport, RelocateError> {
        self.check_version("source", source)?;
        self.check_version("baseline", baseline)?;

        let mut target = baseline.clone();
        tracing::info!(
            "Migrating {} from slot {} by {} ({} further kinds, {} media moves)",
            self.config.primary.kind,
            self.config.primary.start,
            self.config.primary_offset(),
            self.config.dependents.len(),
            self.config.media.len()
        );

        let mut kinds = Vec::new();
        for plan in self.config.kind_plans() {
            kinds.push(self.migrate_kind(source, &mut target, plan)?);
        }

        let mut media = Vec::new();
        for plan in &self.config.media {
            if let Some(summary) = self.move_media(source, &mut target, plan)? {
                media.push(summary);
            }
        }

        let sweep = match kinds.first() {
            Some(primary) if self.config.secondary_sweep_enabled() => {
                let moved: Vec<(MediaPlan, usize)> = media
                    .iter()
                    .map(|m| {
                        (
                            MediaPlan::new(m.kind, m.source_start).with_target_start(m.target_start),
                            m.last_source_slot,
                        )
                    })
                    .collect();
                let sweep = self.config.media_sweep(&moved)?;
                if sweep.rule_count() == 0 {
                    tracing::info!("No media moved; skipping media sweep");
                    None
                } else {
                    let store = target.store_mut(primary.kind)?;
                    Some(sweep.apply(store, &primary.implanted))
                }
            }
            _ => None,
        };

        let report = MigrationReport {
            dataset: target,
            kinds,
            media,
            sweep,
        };
        tracing::info!(
            "Migration finished: {} kinds, {} consistency issues",
            report.kinds.len(),
            report.issues().count()
        );
        Ok(report)
    }

    /// Implant, rewrite and check one kind
    ///
    /// # Errors
    /// Propagates implant and rewrite errors; returns
    /// [`RelocateError::Inconsistent`] when issues remain and the
    /// configuration says to fail on them.
    pub fn migrate_kind(
        &self,
        source: &Dataset,
        target: &mut Dataset,
        plan: &KindPlan,
    ) -> Result<KindSummary, RelocateError> {
        let kind = plan.kind;
        let entry = self.entry(kind)?;
        let implanter = self.implanter();
        let source_len = source.store(kind)?.len();
        let mut summary = KindSummary::new(kind);

        let mut stale = BTreeSet::new();
        match plan.last_source_slot(source_len) {
            Some(last) => {
                let target_start = plan.target_start().ok_or_else(|| {
                    ConfigError::Invalid(format!("{kind}: offset moves start outside the slot range"))
                })?;
                let request = ImplantRequest::new(kind, plan.start, target_start).with_end(last);
                let outcome = implanter.implant(source, target, &request)?;
                summary.relocation.merge(&outcome.relocation);
                stale.extend(outcome.source_slots().map(slot_id));
                summary.implanted.extend(outcome.target_slots());
                summary.batches.push(outcome);
            }
            None => tracing::info!(
                "Skipping {} main range: source has {} slots, range starts at {}",
                kind,
                source_len,
                plan.start
            ),
        }

        for &slot in &plan.overrides {
            let outcome = implanter.implant(source, target, &ImplantRequest::in_place(kind, slot))?;
            summary.implanted.insert(slot);
            summary.batches.push(outcome);
        }

        // an ID that is also a live target slot is not stale
        summary.stale_ids = stale
            .into_iter()
            .filter(|id| usize::try_from(*id).map_or(true, |s| !summary.implanted.contains(&s)))
            .collect();

        // batches already rewrote their own records with their own map
        let rewritten: BTreeSet<usize> = summary
            .batches
            .iter()
            .filter(|b| !b.relocation.is_identity())
            .flat_map(ImplantOutcome::target_slots)
            .collect();
        let store = target.store_mut(kind)?;
        summary.global_rewrites = Rewriter::new(entry).rewrite_outside(
            store,
            &summary.relocation,
            &rewritten,
        )?;
        summary.self_ids_aligned = implanter.align_self_ids(kind, store, &summary.implanted)?;
        summary.issues =
            ConsistencyChecker::new(entry).check(store, &summary.implanted, &summary.stale_ids);

        tracing::info!(
            "{}: {} records in {} batches, {} global rewrites",
            kind,
            summary.moved(),
            summary.batches.len(),
            summary.global_rewrites
        );
        if !summary.issues.is_empty() {
            tracing::warn!(
                "{}: {} consistency issues after relocation",
                kind,
                summary.issues.len()
            );
            for issue in summary.issues.iter().take(20) {
                tracing::warn!("  {}", issue);
            }
            if self.config.fail_on_consistency_issues {
                return Err(RelocateError::Inconsistent {
                    kind,
                    count: summary.issues.len(),
                });
            }
        }
        Ok(summary)
    }

    /// Move one media range
    ///
    /// Returns `None` when the source has nothing at or past the start.
    ///
    /// # Errors
    /// Propagates implant errors.
    pub fn move_media(
        &self,
        source: &Dataset,
        target: &mut Dataset,
        plan: &MediaPlan,
    ) -> Result<Option<MediaSummary>, RelocateError> {
        let len = source.store(plan.kind)?.len();
        let last = match plan.end {
            Some(end) => end,
            None if plan.start < len => len - 1,
            None => {
                tracing::info!(
                    "Skipping {} move: source has {} slots, range starts at {}",
                    plan.kind,
                    len,
                    plan.start
                );
                return Ok(None);
            }
        };
        let request = ImplantRequest::new(plan.kind, plan.start, plan.resolved_target_start())
            .with_end(last);
        let outcome = self.implanter().implant(source, target, &request)?;

        Ok(Some(MediaSummary {
            kind: plan.kind,
            source_start: plan.start,
            last_source_slot: last,
            target_start: outcome.target_start,
            count: outcome.count,
            overwritten: outcome.overwritten.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KindPlan;
    use crate::error::RangeError;
    use graft_store::{Record, RecordStore, Slot};

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

    #[test]
    fn new_rejects_foreign_schema_version() {
        let schema = Schema::builtin();
        let mut config = MigrationConfig::new(KindPlan::new(RecordKind::Unit, 1, 1));
        config.schema_version = "VER 7.0".to_string();
        let err = Orchestrator::new(&schema, config).unwrap_err();
        assert!(matches!(err, RelocateError::VersionMismatch { role: "config", .. }));
    }

    #[test]
    fn run_rejects_foreign_dataset_version() {
        let schema = Schema::builtin();
        let config = MigrationConfig::new(KindPlan::new(RecordKind::Unit, 1, 1));
        let orchestrator = Orchestrator::new(&schema, config).unwrap();

        let old = Dataset::new("VER 7.0");
        let current = Dataset::new("VER 8.8");
        let err = orchestrator.run(&old, &current).unwrap_err();
        assert!(matches!(err, RelocateError::VersionMismatch { role: "source", .. }));
    }

    #[test]
    fn main_range_past_source_end_is_skipped() {
        let schema = Schema::builtin();
        let config = MigrationConfig::new(KindPlan::new(RecordKind::Unit, 5, 1));
        let orchestrator = Orchestrator::new(&schema, config).unwrap();
        let data = Dataset::new("VER 8.8")
            .with_store(RecordKind::Unit, RecordStore::single(vec![unit(0, 0)]));

        let report = orchestrator.run(&data, &data).unwrap();
        let units = report.kind(RecordKind::Unit).unwrap();
        assert!(units.batches.is_empty());
        assert!(report.is_consistent());
        assert_eq!(report.into_dataset(), data);
    }

    #[test]
    fn explicit_end_past_source_is_rejected() {
        let schema = Schema::builtin();
        let config = MigrationConfig::new(KindPlan::new(RecordKind::Unit, 1, 4).with_end(5));
        let orchestrator = Orchestrator::new(&schema, config).unwrap();
        let source = Dataset::new("VER 8.8").with_store(
            RecordKind::Unit,
            RecordStore::single(vec![unit(0, 0), unit(1, 1), unit(2, 2)]),
        );

        let err = orchestrator.run(&source, &source).unwrap_err();
        assert!(matches!(
            err,
            RelocateError::Range(RangeError::EndOutOfBounds { end: 5, len: 3, .. })
        ));
    }

    #[test]
    fn overlapping_offset_does_not_flag_live_ids() {
        let schema = Schema::builtin();
        let config = MigrationConfig::new(KindPlan::new(RecordKind::Unit, 1, 1));
        let orchestrator = Orchestrator::new(&schema, config).unwrap();
        let source = Dataset::new("VER 8.8").with_store(
            RecordKind::Unit,
            RecordStore::single(vec![unit(0, 0), unit(1, 2), unit(2, 1)]),
        );
        let baseline = Dataset::new("VER 8.8")
            .with_store(RecordKind::Unit, RecordStore::single(vec![unit(0, 0)]));

        let report = orchestrator.run(&source, &baseline).unwrap();
        let units = report.kind(RecordKind::Unit).unwrap();
        assert_eq!(units.stale_ids, [1].into_iter().collect());
        assert!(report.is_consistent());

        let store = report.dataset.store(RecordKind::Unit).unwrap();
        assert_eq!(store.get(0, 2).unwrap().int("base_id"), Some(3));
        assert_eq!(store.get(0, 3).unwrap().int("base_id"), Some(2));
    }
}
