//! Testing utilities for the Graft workspace
//!
//! Shared fixtures and proptest strategies for record stores.

#![allow(missing_docs)]

use graft_store::{Dataset, Record, RecordKind, RecordStore, Slot, Value, SCHEMA_VERSION};
use proptest::prelude::*;

/// Builder for unit records carrying every reference field the schema lists
#[derive(Debug, Clone)]
pub struct UnitFixture {
    record: Record,
}

impl UnitFixture {
    /// Unit whose scalar references all point at itself or nothing
    pub fn new(id: i64) -> Self {
        let record = Record::new()
            .with("id", id)
            .with("name", format!("unit_{id}"))
            .with("copy_id", id)
            .with("base_id", id)
            .with("dead_unit_id", -1)
            .with("blood_unit_id", -1)
            .with("hit_points", 100)
            .with("building", Value::Null)
            .with("projectile", Value::Null)
            .with("dead_fish", Value::Null)
            .with("creatable", Value::Null);
        Self { record }
    }

    pub fn base(mut self, base: i64) -> Self {
        self.record.insert("base_id", base);
        self
    }

    pub fn dead(mut self, dead: i64) -> Self {
        self.record.insert("dead_unit_id", dead);
        self
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.record.insert(name, value);
        self
    }

    /// Building sub-structure with the given annex unit IDs
    pub fn building(mut self, head: i64, annexes: &[i64]) -> Self {
        let annexes: Vec<Value> = annexes
            .iter()
            .map(|&id| Value::from(Record::new().with("unit_id", id).with("misplacement", 0.5)))
            .collect();
        let building = Record::new()
            .with("stack_unit_id", -1)
            .with("head_unit", head)
            .with("transform_unit", -1)
            .with("pile_unit", -1)
            .with("annexes", annexes);
        self.record.insert("building", building);
        self
    }

    pub fn projectile(mut self, unit: i64) -> Self {
        self.record
            .insert("projectile", Record::new().with("projectile_unit_id", unit));
        self
    }

    pub fn tracking(mut self, unit: i64) -> Self {
        self.record
            .insert("dead_fish", Record::new().with("tracking_unit", unit));
        self
    }

    /// Creatable sub-structure with the given train-location unit IDs
    pub fn trains_at(mut self, units: &[i64]) -> Self {
        let locations: Vec<Value> = units
            .iter()
            .map(|&id| Value::from(Record::new().with("unit_id", id).with("button_id", 1)))
            .collect();
        self.record.insert(
            "creatable",
            Record::new().with("train_locations", locations).with("train_time", 30),
        );
        self
    }

    pub fn build(self) -> Record {
        self.record
    }

    pub fn slot(self) -> Slot {
        Some(self.record)
    }
}

/// Plain unit slot with a base reference
pub fn unit(id: i64, base: i64) -> Slot {
    UnitFixture::new(id).base(base).slot()
}

/// Unit header; `exists = 0` is the blank sentinel
pub fn header(exists: i64) -> Slot {
    Some(Record::new().with("exists", exists).with("task_list", Value::Null))
}

/// Tech pointing at one effect
pub fn tech(effect_id: i64, required: &[i64]) -> Slot {
    let required: Vec<Value> = required.iter().map(|&t| Value::from(t)).collect();
    Some(
        Record::new()
            .with("name", "tech")
            .with("effect_id", effect_id)
            .with("required_techs", required),
    )
}

/// Effect tagged for identification
pub fn effect(tag: i64) -> Slot {
    Some(Record::new().with("tag", tag).with("commands", Vec::<Value>::new()))
}

/// Graphic or sound record
pub fn media(id: i64) -> Slot {
    Some(Record::new().with("id", id).with("file_name", format!("media_{id}")))
}

/// Store with `realms` identical copies of `slots`
pub fn realms(slots: Vec<Slot>, realms: usize) -> RecordStore {
    RecordStore::with_realms(vec![slots; realms])
}

/// Self-referencing units `0..len`
pub fn plain_units(len: usize) -> Vec<Slot> {
    (0..len as i64).map(|id| unit(id, id)).collect()
}

/// Dataset at the built-in schema version
pub fn dataset() -> Dataset {
    Dataset::new(SCHEMA_VERSION)
}

/// Source modeled on a modded file: official units `0..2601`, mod units
/// `2601..=2610` with unit 2601 based on 2605, three realms, and headers.
pub fn modded_source() -> Dataset {
    let mut units = plain_units(2601);
    units.extend((2601..=2610).map(|id| unit(id, if id == 2601 { 2605 } else { id })));
    let headers = vec![header(1); units.len()];
    dataset()
        .with_store(RecordKind::Unit, realms(units, 3))
        .with_store(RecordKind::UnitHeader, RecordStore::single(headers))
}

/// Baseline modeled on a newer official file: units `0..2700`, three realms
pub fn official_baseline() -> Dataset {
    let units = plain_units(2700);
    let headers = vec![header(1); units.len()];
    dataset()
        .with_store(RecordKind::Unit, realms(units, 3))
        .with_store(RecordKind::UnitHeader, RecordStore::single(headers))
}

/// Strategy for a reference value: "none" or an ID below `len`
pub fn arb_reference(len: i64) -> impl Strategy<Value = i64> {
    prop_oneof![Just(-1i64), 0..len]
}

/// Strategy for a unit store of `len` slots with random references and holes
pub fn arb_unit_store(len: usize, realm_count: usize) -> impl Strategy<Value = RecordStore> {
    let limit = len as i64;
    let slot = (arb_reference(limit), arb_reference(limit), prop::bool::weighted(0.85));
    prop::collection::vec(slot, len).prop_map(move |slots| {
        let units: Vec<Slot> = slots
            .into_iter()
            .enumerate()
            .map(|(i, (base, dead, filled))| {
                filled.then(|| UnitFixture::new(i as i64).base(base).dead(dead).build())
            })
            .collect();
        realms(units, realm_count)
    })
}
