//! Secondary media sweep
//!
//! After graphics and sounds move, the relocated primary records still
//! point at their old slots. The schema table does not list those
//! pointers; instead they are found by field name. A field is swept when
//! its name matches a rule's include pattern and not the shared exclude
//! pattern (which keeps textual labels such as `graphic_name` out).
//!
//! An integer inside a rule's moved interval gets that rule's offset.
//! Sub-structures and lists are walked; a name match on a list of
//! integers sweeps every element.

use crate::error::ConfigError;
use graft_store::{RecordKind, RecordStore, Value};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One moved media range
#[derive(Debug, Clone)]
pub struct SweepRule {
    kind: RecordKind,
    include: Regex,
    low: i64,
    high: i64,
    offset: i64,
}

impl SweepRule {
    /// Rule for media `kind` moved from `low..=high` by `offset`
    ///
    /// # Errors
    /// Returns [`ConfigError::Pattern`] if `include` does not compile.
    pub fn new(
        kind: RecordKind,
        include: &str,
        low: i64,
        high: i64,
        offset: i64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            kind,
            include: compile(include)?,
            low,
            high,
            offset,
        })
    }

    /// Media kind the rule relocates
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    fn relocate(&self, value: i64) -> Option<i64> {
        (self.low..=self.high)
            .contains(&value)
            .then_some(value + self.offset)
    }
}

/// Per-kind count of swept values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SweepCounts(BTreeMap<RecordKind, usize>);

impl SweepCounts {
    /// Values rewritten for one media kind
    #[inline]
    #[must_use]
    pub fn get(&self, kind: RecordKind) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Total values rewritten
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    fn bump(&mut self, kind: RecordKind) {
        *self.0.entry(kind).or_default() += 1;
    }
}

/// Name-driven media pointer sweep
#[derive(Debug, Clone)]
pub struct MediaSweep {
    rules: Vec<SweepRule>,
    exclude: Regex,
}

impl MediaSweep {
    /// Sweep with no rules
    ///
    /// # Errors
    /// Returns [`ConfigError::Pattern`] if `exclude` does not compile.
    pub fn new(exclude: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: Vec::new(),
            exclude: compile(exclude)?,
        })
    }

    /// Add a rule; earlier rules take precedence for names matching several
    #[inline]
    #[must_use]
    pub fn with_rule(mut self, rule: SweepRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Rules whose include pattern matches a field name, in precedence order
    fn rules_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SweepRule> + 'a {
        let excluded = self.exclude.is_match(name);
        self.rules
            .iter()
            .filter(move |rule| !excluded && rule.include.is_match(name))
    }

    /// Sweep the given slots of every realm
    pub fn apply(&self, store: &mut RecordStore, slots: &BTreeSet<usize>) -> SweepCounts {
        let mut counts = SweepCounts::default();
        if self.rules.is_empty() {
            return counts;
        }
        for (_, slot, record) in store.iter_mut() {
            if !slots.contains(&slot) {
                continue;
            }
            for (name, value) in record.fields_mut() {
                self.sweep_field(name, value, &mut counts);
            }
        }
        for (kind, n) in &counts.0 {
            tracing::info!("Media sweep rewrote {} {} pointers", n, kind);
        }
        counts
    }

    fn sweep_field(&self, name: &str, value: &mut Value, counts: &mut SweepCounts) {
        match value {
            Value::Struct(fields) => {
                for (inner, v) in fields {
                    self.sweep_field(inner, v, counts);
                }
            }
            Value::List(items) => {
                for item in items {
                    self.sweep_field(name, item, counts);
                }
            }
            Value::Int(v) => {
                let hit = self
                    .rules_for(name)
                    .find_map(|rule| rule.relocate(*v).map(|new| (rule.kind, new)));
                if let Some((kind, new)) = hit {
                    *v = new;
                    counts.bump(kind);
                }
            }
            Value::Null | Value::Float(_) | Value::Text(_) => {}
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
