//! Migration configuration
//!
//! Every offset and range the orchestrator uses comes from here; nothing
//! is compiled in. Loaded from TOML:
//!
//! ```toml
//! [primary]
//! kind = "unit"
//! start = 2601
//! offset = 600
//! overrides = [46, 557]
//!
//! [[dependents]]
//! kind = "tech"
//! start = 904
//! end = 912
//! offset = 600
//! overrides = [490]
//! ```

use crate::error::ConfigError;
use crate::relocation::{slot_id, RelocationMap};
use crate::sweep::{MediaSweep, SweepRule};
use graft_store::{RecordKind, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

fn yes() -> bool {
    true
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Relocation plan for one record kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindPlan {
    /// Kind relocated
    pub kind: RecordKind,
    /// First source slot of the main range
    pub start: usize,
    /// Last source slot (inclusive); omitted means through the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    /// Target slot minus source slot for the main range
    pub offset: i64,
    /// Single slots copied in place after the main range
    #[serde(default)]
    pub overrides: Vec<usize>,
}

impl KindPlan {
    /// Plan for a main range from `start` through the end of the source
    #[inline]
    #[must_use]
    pub fn new(kind: RecordKind, start: usize, offset: i64) -> Self {
        Self {
            kind,
            start,
            end: None,
            offset,
            overrides: Vec::new(),
        }
    }

    /// With inclusive end
    #[inline]
    #[must_use]
    pub fn with_end(mut self, end: usize) -> Self {
        self.end = Some(end);
        self
    }

    /// With in-place override slots
    #[inline]
    #[must_use]
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = usize>) -> Self {
        self.overrides = overrides.into_iter().collect();
        self
    }

    /// First target slot of the main range
    ///
    /// `None` if the offset would move the range outside the slot range.
    #[must_use]
    pub fn target_start(&self) -> Option<usize> {
        slot_id(self.start)
            .checked_add(self.offset)
            .and_then(|id| usize::try_from(id).ok())
    }

    /// Last source slot of the main range for a source of `source_len` slots
    ///
    /// An explicit `end` is returned as configured, so an end past the
    /// source is rejected by the implant. An open-ended range runs through
    /// the last source slot, or yields `None` when it starts past the end.
    #[must_use]
    pub fn last_source_slot(&self, source_len: usize) -> Option<usize> {
        match self.end {
            Some(end) => Some(end),
            None => source_len.checked_sub(1).filter(|&last| last >= self.start),
        }
    }

    /// Relocation this plan would apply to a source of `source_len` slots
    ///
    /// Main range IDs map under the offset; overrides map to themselves.
    #[must_use]
    pub fn relocation_map(&self, source_len: usize) -> RelocationMap {
        let last = source_len.saturating_sub(1);
        let mut map: RelocationMap = self
            .last_source_slot(source_len)
            .into_iter()
            .flat_map(|end| self.start..=end.min(last))
            .filter(|&slot| slot < source_len)
            .filter_map(|slot| {
                let old = slot_id(slot);
                old.checked_add(self.offset).map(|new| (old, new))
            })
            .collect();
        map.extend(
            self.overrides
                .iter()
                .filter(|&&slot| slot < source_len)
                .map(|&slot| (slot_id(slot), slot_id(slot))),
        );
        map
    }
}

/// Media range moved before the sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaPlan {
    /// `graphic` or `sound`
    pub kind: RecordKind,
    /// First source slot
    pub start: usize,
    /// Last source slot (inclusive); omitted means through the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    /// First target slot; omitted means in place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_start: Option<usize>,
}

impl MediaPlan {
    /// In-place media plan from `start` through the end of the source
    #[inline]
    #[must_use]
    pub fn new(kind: RecordKind, start: usize) -> Self {
        Self {
            kind,
            start,
            end: None,
            target_start: None,
        }
    }

    /// With target start
    #[inline]
    #[must_use]
    pub fn with_target_start(mut self, target_start: usize) -> Self {
        self.target_start = Some(target_start);
        self
    }

    /// With inclusive end
    #[inline]
    #[must_use]
    pub fn with_end(mut self, end: usize) -> Self {
        self.end = Some(end);
        self
    }

    /// Effective first target slot
    #[inline]
    #[must_use]
    pub fn resolved_target_start(&self) -> usize {
        self.target_start.unwrap_or(self.start)
    }

    /// Target slot minus source slot
    #[inline]
    #[must_use]
    pub fn offset(&self) -> i64 {
        slot_id(self.resolved_target_start()) - slot_id(self.start)
    }
}

/// Secondary media sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepPlan {
    /// Run the sweep after media moves
    pub enabled: bool,
    /// Field names holding graphic IDs
    pub graphic_include: String,
    /// Field names holding sound IDs
    pub sound_include: String,
    /// Field names never swept
    pub exclude: String,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            enabled: false,
            graphic_include: "(?i)graphic".to_string(),
            sound_include: "(?i)sound".to_string(),
            exclude: "(?i)(graphic|sound|file)_name".to_string(),
        }
    }
}

impl SweepPlan {
    /// Include pattern for a media kind
    #[must_use]
    pub fn include_for(&self, kind: RecordKind) -> Option<&str> {
        match kind {
            RecordKind::Graphic => Some(&self.graphic_include),
            RecordKind::Sound => Some(&self.sound_include),
            _ => None,
        }
    }
}

/// Full migration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// Format version the plan was written against
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Emit a notice when an implant replaces existing records
    #[serde(default = "yes")]
    pub warn_on_overwrite: bool,
    /// Fill target realms the source lacks from source realm 0
    #[serde(default = "yes")]
    pub copy_extra_realms_from_default: bool,
    /// Abort instead of reporting when stale references remain
    #[serde(default)]
    pub fail_on_consistency_issues: bool,
    /// Primary kind plan
    pub primary: KindPlan,
    /// Further kinds, each with its own offset
    #[serde(default)]
    pub dependents: Vec<KindPlan>,
    /// Media moves
    #[serde(default)]
    pub media: Vec<MediaPlan>,
    /// Name-driven sweep of relocated primary records
    #[serde(default)]
    pub secondary_sweep: SweepPlan,
}

impl MigrationConfig {
    /// Configuration with only a primary plan
    #[must_use]
    pub fn new(primary: KindPlan) -> Self {
        Self {
            schema_version: default_schema_version(),
            warn_on_overwrite: true,
            copy_extra_realms_from_default: true,
            fail_on_consistency_issues: false,
            primary,
            dependents: Vec::new(),
            media: Vec::new(),
            secondary_sweep: SweepPlan::default(),
        }
    }

    /// Add a dependent kind plan
    #[inline]
    #[must_use]
    pub fn with_dependent(mut self, plan: KindPlan) -> Self {
        self.dependents.push(plan);
        self
    }

    /// Add a media move
    #[inline]
    #[must_use]
    pub fn with_media(mut self, plan: MediaPlan) -> Self {
        self.media.push(plan);
        self
    }

    /// Enable or disable the secondary sweep
    #[inline]
    #[must_use]
    pub fn with_secondary_sweep(mut self, enabled: bool) -> Self {
        self.secondary_sweep.enabled = enabled;
        self
    }

    /// Abort when consistency issues remain
    #[inline]
    #[must_use]
    pub fn with_fail_on_consistency_issues(mut self, fail: bool) -> Self {
        self.fail_on_consistency_issues = fail;
        self
    }

    /// Parse TOML and validate
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the text does not parse or validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded migration config from {}", path.display());
        Ok(config)
    }

    /// Offset of the primary kind's main range
    #[inline]
    #[must_use]
    pub fn primary_offset(&self) -> i64 {
        self.primary.offset
    }

    /// Offset of the first dependent kind, if any
    #[inline]
    #[must_use]
    pub fn dependent_offset(&self) -> Option<i64> {
        self.dependents.first().map(|plan| plan.offset)
    }

    /// Whether the media sweep runs
    #[inline]
    #[must_use]
    pub fn secondary_sweep_enabled(&self) -> bool {
        self.secondary_sweep.enabled
    }

    /// Target start of the media move for `kind`, if one is planned
    #[must_use]
    pub fn secondary_sweep_target_start(&self, kind: RecordKind) -> Option<usize> {
        self.media
            .iter()
            .find(|plan| plan.kind == kind)
            .map(MediaPlan::resolved_target_start)
    }

    /// Every kind plan, primary first
    pub fn kind_plans(&self) -> impl Iterator<Item = &KindPlan> {
        std::iter::once(&self.primary).chain(&self.dependents)
    }

    /// Plan for one kind
    #[must_use]
    pub fn plan_for(&self, kind: RecordKind) -> Option<&KindPlan> {
        self.kind_plans().find(|plan| plan.kind == kind)
    }

    /// Relocation map the plan for `kind` implies, for external consumers
    ///
    /// Main range IDs map under the offset; overrides map to themselves.
    /// `None` if the configuration has no plan for `kind`.
    #[must_use]
    pub fn external_relocation_map(
        &self,
        kind: RecordKind,
        source_len: usize,
    ) -> Option<RelocationMap> {
        self.plan_for(kind).map(|plan| plan.relocation_map(source_len))
    }

    /// Build the media sweep for media moves with a non-zero offset
    ///
    /// Each rule covers the source interval `start..=last` of one move.
    ///
    /// # Errors
    /// Returns [`ConfigError::Pattern`] if a name pattern does not compile.
    pub fn media_sweep(
        &self,
        moved: &[(MediaPlan, usize)],
    ) -> Result<MediaSweep, ConfigError> {
        let mut sweep = MediaSweep::new(&self.secondary_sweep.exclude)?;
        for (plan, last) in moved {
            if plan.offset() == 0 {
                continue;
            }
            let Some(include) = self.secondary_sweep.include_for(plan.kind) else {
                continue;
            };
            sweep = sweep.with_rule(SweepRule::new(
                plan.kind,
                include,
                slot_id(plan.start),
                slot_id(*last),
                plan.offset(),
            )?);
        }
        Ok(sweep)
    }

    /// Check the plan for internal contradictions
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] or [`ConfigError::Pattern`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let mut kinds = BTreeSet::new();
        for plan in self.kind_plans() {
            if plan.kind.is_media() {
                return invalid(format!(
                    "{} is a media kind; list it under [[media]]",
                    plan.kind
                ));
            }
            if !kinds.insert(plan.kind) {
                return invalid(format!("{} is planned more than once", plan.kind));
            }
            if plan.target_start().is_none() {
                return invalid(format!(
                    "{}: offset {} moves start {} outside the slot range",
                    plan.kind, plan.offset, plan.start
                ));
            }
            if let Some(end) = plan.end.filter(|&end| end < plan.start) {
                return invalid(format!(
                    "{}: end {} is before start {}",
                    plan.kind, end, plan.start
                ));
            }
            let mut seen = BTreeSet::new();
            if let Some(dup) = plan.overrides.iter().find(|&&slot| !seen.insert(slot)) {
                return invalid(format!("{}: override {} listed twice", plan.kind, dup));
            }
        }

        let mut media = BTreeSet::new();
        for plan in &self.media {
            if !plan.kind.is_media() {
                return invalid(format!("{} is not a media kind", plan.kind));
            }
            if !media.insert(plan.kind) {
                return invalid(format!("{} media is moved more than once", plan.kind));
            }
            if let Some(end) = plan.end.filter(|&end| end < plan.start) {
                return invalid(format!(
                    "{}: end {} is before start {}",
                    plan.kind, end, plan.start
                ));
            }
        }

        if self.secondary_sweep.enabled {
            let patterns = [
                &self.secondary_sweep.graphic_include,
                &self.secondary_sweep.sound_include,
                &self.secondary_sweep.exclude,
            ];
            for pattern in patterns {
                regex::Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
        schema_version = "VER 8.8"
        fail_on_consistency_issues = true

        [primary]
        kind = "unit"
        start = 2601
        offset = 600
        overrides = [46, 557]

        [[dependents]]
        kind = "tech"
        start = 904
        end = 912
        offset = 600
        overrides = [490]

        [[media]]
        kind = "graphic"
        start = 17601
        target_start = 30000

        [secondary_sweep]
        enabled = true
    "#;

    #[test]
    fn parses_full_plan() {
        let config = MigrationConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.primary_offset(), 600);
        assert_eq!(config.dependent_offset(), Some(600));
        assert!(config.secondary_sweep_enabled());
        assert_eq!(
            config.secondary_sweep_target_start(RecordKind::Graphic),
            Some(30000)
        );
        assert_eq!(config.secondary_sweep_target_start(RecordKind::Sound), None);
        assert!(config.warn_on_overwrite);
        assert!(config.copy_extra_realms_from_default);
        assert!(config.fail_on_consistency_issues);
        assert_eq!(config.primary.overrides, vec![46, 557]);
        assert_eq!(config.secondary_sweep.exclude, "(?i)(graphic|sound|file)_name");
    }

    #[test]
    fn minimal_plan_uses_defaults() {
        let config = MigrationConfig::from_toml_str(
            "[primary]\nkind = \"unit\"\nstart = 10\noffset = 5\n",
        )
        .unwrap();
        assert_eq!(config, MigrationConfig::new(KindPlan::new(RecordKind::Unit, 10, 5)));
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.dependent_offset(), None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MigrationConfig::from_toml_str(
            "[primary]\nkind = \"unit\"\nstart = 1\noffset = 1\nofset = 2\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_contradictions() {
        let unit = KindPlan::new(RecordKind::Unit, 10, 5);
        let cases = [
            MigrationConfig::new(KindPlan::new(RecordKind::Graphic, 0, 1)),
            MigrationConfig::new(unit.clone()).with_dependent(unit.clone()),
            MigrationConfig::new(KindPlan::new(RecordKind::Unit, 10, -11)),
            MigrationConfig::new(unit.clone().with_end(9)),
            MigrationConfig::new(unit.clone().with_overrides([46, 46])),
            MigrationConfig::new(unit.clone()).with_media(MediaPlan::new(RecordKind::Tech, 0)),
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn validate_rejects_bad_sweep_pattern() {
        let mut config = MigrationConfig::new(KindPlan::new(RecordKind::Unit, 1, 1))
            .with_secondary_sweep(true);
        config.secondary_sweep.exclude = "(".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Pattern { .. })));
    }

    #[test]
    fn external_map_includes_override_identities() {
        let config = MigrationConfig::from_toml_str(SAMPLE).unwrap();
        let map = config.external_relocation_map(RecordKind::Unit, 2604).unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map.get(2601), Some(3201));
        assert_eq!(map.get(2603), Some(3203));
        assert_eq!(map.get(46), Some(46));
        assert_eq!(map.get(557), Some(557));

        let techs = config.external_relocation_map(RecordKind::Tech, 1000).unwrap();
        assert_eq!(techs.len(), 10);
        assert_eq!(techs.get(912), Some(1512));
        assert!(config.external_relocation_map(RecordKind::Effect, 10).is_none());
    }

    #[test]
    fn media_sweep_skips_in_place_moves() {
        let config = MigrationConfig::new(KindPlan::new(RecordKind::Unit, 1, 1));
        let moved = [
            (MediaPlan::new(RecordKind::Graphic, 100), 199),
            (MediaPlan::new(RecordKind::Sound, 50).with_target_start(60), 59),
        ];
        let sweep = config.media_sweep(&moved).unwrap();
        assert_eq!(sweep.rule_count(), 1);
    }

    #[test]
    fn kind_plan_last_slot() {
        let plan = KindPlan::new(RecordKind::Unit, 5, 1);
        assert_eq!(plan.last_source_slot(10), Some(9));
        assert_eq!(plan.clone().with_end(7).last_source_slot(10), Some(7));
        assert_eq!(plan.last_source_slot(5), None);
        assert_eq!(plan.last_source_slot(0), None);
        // an explicit end is never clamped to the source
        assert_eq!(plan.clone().with_end(12).last_source_slot(10), Some(12));
    }

    #[test]
    fn overflowing_offset_is_invalid() {
        let plan = KindPlan::new(RecordKind::Unit, 2601, i64::MAX);
        assert_eq!(plan.target_start(), None);
        assert!(plan.relocation_map(2700).is_empty());

        let err = MigrationConfig::new(plan).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
