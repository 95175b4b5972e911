//! Versioned reference-field schema
//!
//! The schema table lists, per record kind, every field path that holds a
//! reference to another record. It is a contract with the decoded format:
//! when the format version changes its field set, the table changes with
//! it. Nothing is discovered by introspection.

use crate::kind::RecordKind;
use crate::path::{FieldPath, Segment};
use crate::store::{BlankPolicy, Slot};
use crate::value::Record;
use std::collections::BTreeMap;

/// Format version the built-in table describes
pub const SCHEMA_VERSION: &str = "VER 8.8";

/// A field naming another record by ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceField {
    /// Where the ID lives inside the record
    pub path: FieldPath,
    /// Kind of record the ID names
    pub target: RecordKind,
}

/// Pointer from a primary record into a dependent store
///
/// Dependent records move under the same numeric offset as the primary
/// record that points at them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentLink {
    /// Pointer field inside the primary record
    pub pointer: FieldPath,
    /// Dependent store kind
    pub kind: RecordKind,
}

/// Schema entry for one record kind
#[derive(Debug, Clone, PartialEq)]
pub struct KindSchema {
    /// Kind described
    pub kind: RecordKind,
    /// Field that must equal the slot index, if any
    pub self_id: Option<String>,
    /// Fill used when the store is padded
    pub blank: BlankPolicy,
    /// Integer flag that marks a filled slot as non-existent when 0
    pub existence_flag: Option<String>,
    /// Reference fields, in visiting order
    pub references: Vec<ReferenceField>,
    /// Dependent store reached through a pointer field
    pub dependent: Option<DependentLink>,
    /// Single-realm store moved slot-for-slot with this one
    pub companion: Option<RecordKind>,
}

impl KindSchema {
    /// Entry with no fields declared
    #[inline]
    #[must_use]
    pub fn new(kind: RecordKind, blank: BlankPolicy) -> Self {
        Self {
            kind,
            self_id: None,
            blank,
            existence_flag: None,
            references: Vec::new(),
            dependent: None,
            companion: None,
        }
    }

    /// With self-identifying field
    #[inline]
    #[must_use]
    pub fn with_self_id(mut self, field: impl Into<String>) -> Self {
        self.self_id = Some(field.into());
        self
    }

    /// With existence flag
    #[inline]
    #[must_use]
    pub fn with_existence_flag(mut self, field: impl Into<String>) -> Self {
        self.existence_flag = Some(field.into());
        self
    }

    /// Add a reference field
    #[inline]
    #[must_use]
    pub fn with_reference(mut self, path: FieldPath, target: RecordKind) -> Self {
        self.references.push(ReferenceField { path, target });
        self
    }

    /// With dependent store
    #[inline]
    #[must_use]
    pub fn with_dependent(mut self, pointer: FieldPath, kind: RecordKind) -> Self {
        self.dependent = Some(DependentLink { pointer, kind });
        self
    }

    /// With lockstep companion store
    #[inline]
    #[must_use]
    pub fn with_companion(mut self, kind: RecordKind) -> Self {
        self.companion = Some(kind);
        self
    }

    /// Reference fields naming records of `target` kind
    pub fn references_to(&self, target: RecordKind) -> impl Iterator<Item = &ReferenceField> {
        self.references.iter().filter(move |r| r.target == target)
    }

    /// Check whether a slot holds nothing that an implant would destroy
    #[must_use]
    pub fn is_vacant(&self, slot: &Slot) -> bool {
        match (slot, &self.existence_flag) {
            (None, _) => true,
            (Some(record), Some(flag)) => record.int(flag) == Some(0),
            (Some(_), None) => false,
        }
    }
}

/// Reference schema for every record kind of one format version
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    version: String,
    kinds: BTreeMap<RecordKind, KindSchema>,
}

impl Schema {
    /// Empty schema for a format version
    #[inline]
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            kinds: BTreeMap::new(),
        }
    }

    /// Add or replace a kind entry
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, entry: KindSchema) -> Self {
        self.kinds.insert(entry.kind, entry);
        self
    }

    /// Format version described
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Entry for one kind
    #[inline]
    #[must_use]
    pub fn kind(&self, kind: RecordKind) -> Option<&KindSchema> {
        self.kinds.get(&kind)
    }

    /// All entries
    pub fn kinds(&self) -> impl Iterator<Item = &KindSchema> {
        self.kinds.values()
    }

    /// Built-in table for [`SCHEMA_VERSION`]
    #[must_use]
    pub fn builtin() -> Self {
        let unit_ref = |path: FieldPath| (path, RecordKind::Unit);
        let top = FieldPath::single;
        let nested = |outer: &str, leaf: &str| {
            FieldPath::new(vec![Segment::optional(outer), Segment::field(leaf)])
        };
        let in_list = |outer: &str, list: &str, leaf: &str| {
            FieldPath::new(vec![
                Segment::optional(outer),
                Segment::list(list),
                Segment::field(leaf),
            ])
        };

        let unit_refs = [
            unit_ref(top("copy_id")),
            unit_ref(top("base_id")),
            unit_ref(top("dead_unit_id")),
            unit_ref(top("blood_unit_id")),
            unit_ref(nested("building", "stack_unit_id")),
            unit_ref(nested("building", "head_unit")),
            unit_ref(nested("building", "transform_unit")),
            unit_ref(nested("building", "pile_unit")),
            unit_ref(in_list("building", "annexes", "unit_id")),
            unit_ref(nested("projectile", "projectile_unit_id")),
            unit_ref(nested("dead_fish", "tracking_unit")),
            unit_ref(in_list("creatable", "train_locations", "unit_id")),
        ];
        let unit = unit_refs.into_iter().fold(
            KindSchema::new(RecordKind::Unit, BlankPolicy::Empty)
                .with_self_id("id")
                .with_companion(RecordKind::UnitHeader),
            |entry, (path, target)| entry.with_reference(path, target),
        );

        let header_sentinel = Record::new()
            .with("exists", 0)
            .with("task_list", crate::value::Value::Null);
        let unit_header = KindSchema::new(
            RecordKind::UnitHeader,
            BlankPolicy::Sentinel(header_sentinel),
        )
        .with_existence_flag("exists");

        let tech = KindSchema::new(RecordKind::Tech, BlankPolicy::CloneFirst)
            .with_reference(
                FieldPath::new(vec![Segment::list("required_techs")]),
                RecordKind::Tech,
            )
            .with_dependent(top("effect_id"), RecordKind::Effect);

        let effect = KindSchema::new(RecordKind::Effect, BlankPolicy::CloneFirst);
        let graphic = KindSchema::new(RecordKind::Graphic, BlankPolicy::Empty).with_self_id("id");
        let sound = KindSchema::new(RecordKind::Sound, BlankPolicy::Empty).with_self_id("id");

        Self::new(SCHEMA_VERSION)
            .with_kind(unit)
            .with_kind(unit_header)
            .with_kind(tech)
            .with_kind(effect)
            .with_kind(graphic)
            .with_kind(sound)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_describes_every_kind() {
        let schema = Schema::builtin();
        assert_eq!(schema.version(), SCHEMA_VERSION);
        for kind in RecordKind::ALL {
            assert!(schema.kind(kind).is_some(), "missing {kind}");
        }
    }

    #[test]
    fn builtin_unit_references() {
        let schema = Schema::builtin();
        let unit = schema.kind(RecordKind::Unit).unwrap();
        assert_eq!(unit.self_id.as_deref(), Some("id"));
        assert_eq!(unit.companion, Some(RecordKind::UnitHeader));
        assert_eq!(unit.references.len(), 12);
        assert_eq!(unit.references_to(RecordKind::Unit).count(), 12);

        let paths: Vec<String> = unit.references.iter().map(|r| r.path.to_string()).collect();
        assert!(paths.contains(&"building?.annexes[].unit_id".to_string()));
        assert!(paths.contains(&"creatable?.train_locations[].unit_id".to_string()));
        assert!(paths.contains(&"dead_fish?.tracking_unit".to_string()));
    }

    #[test]
    fn builtin_tech_links_effects() {
        let schema = Schema::builtin();
        let tech = schema.kind(RecordKind::Tech).unwrap();
        let link = tech.dependent.as_ref().unwrap();
        assert_eq!(link.kind, RecordKind::Effect);
        assert_eq!(link.pointer.to_string(), "effect_id");
        assert_eq!(tech.blank, BlankPolicy::CloneFirst);
        assert_eq!(tech.references_to(RecordKind::Tech).count(), 1);
        assert_eq!(tech.references_to(RecordKind::Unit).count(), 0);
    }

    #[test]
    fn vacancy_uses_existence_flag() {
        let schema = Schema::builtin();
        let header = schema.kind(RecordKind::UnitHeader).unwrap();
        assert!(header.is_vacant(&None));
        assert!(header.is_vacant(&Some(Record::new().with("exists", 0))));
        assert!(!header.is_vacant(&Some(Record::new().with("exists", 1))));

        let unit = schema.kind(RecordKind::Unit).unwrap();
        assert!(!unit.is_vacant(&Some(Record::new().with("exists", 0))));
    }
}
