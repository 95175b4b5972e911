//! Decoded field values
//!
//! Provides [`Value`] and [`Record`], the shape every decoded record takes
//! once the codec collaborator has read it. The engine never touches raw
//! bytes, only this tree.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single decoded field value
///
/// Integers and floats are kept apart so that reference fields (always
/// integers) can be told from numeric properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent optional sub-structure or list element
    Null,
    /// Integer scalar (IDs, counts, flags)
    Int(i64),
    /// Floating-point scalar
    Float(f64),
    /// Text label
    Text(String),
    /// Bounded list of values or sub-structures
    List(Vec<Value>),
    /// Nested sub-structure
    Struct(IndexMap<String, Value>),
}

impl Value {
    /// Integer payload, if this is an integer
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Check for [`Value::Null`]
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Sub-structure fields, if this is a struct
    #[inline]
    #[must_use]
    pub fn as_struct(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Struct(map) => Some(map),
            _ => None,
        }
    }

    /// List items, if this is a list
    #[inline]
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short type name used in diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Struct(_) => "struct",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Struct(record.fields)
    }
}

/// One decoded record: an ordered map of named fields
///
/// Field order is preserved so that re-encoding reproduces the decoded
/// layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    /// Create empty record
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion
    #[inline]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a field, returning the previous value
    #[inline]
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Field value by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Mutable field value by name
    #[inline]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Integer field by name
    #[inline]
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Check whether the field is present
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// All fields in declaration order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    /// Mutable access to all fields
    #[inline]
    pub fn fields_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.fields
    }

    /// Number of top-level fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check for a record without fields
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<IndexMap<String, Value>> for Record {
    fn from(fields: IndexMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_preserves_order() {
        let record = Record::new()
            .with("id", 3)
            .with("name", "Archer")
            .with("hit_points", 30);

        let names: Vec<_> = record.fields().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "name", "hit_points"]);
        assert_eq!(record.int("id"), Some(3));
        assert_eq!(record.int("name"), None);
    }

    #[test]
    fn value_json_shapes() {
        let json = r#"{"id": 4, "speed": 1.5, "name": "Knight", "building": null,
                       "annexes": [{"unit_id": -1}, null]}"#;
        let record: Record = serde_json::from_str(json).unwrap();

        assert_eq!(record.get("id"), Some(&Value::Int(4)));
        assert_eq!(record.get("speed"), Some(&Value::Float(1.5)));
        assert_eq!(record.get("name"), Some(&Value::Text("Knight".into())));
        assert!(record.get("building").unwrap().is_null());

        let annexes = record.get("annexes").unwrap().as_list().unwrap();
        assert_eq!(annexes.len(), 2);
        assert_eq!(annexes[0].as_struct().unwrap()["unit_id"], Value::Int(-1));
        assert!(annexes[1].is_null());
    }

    #[test]
    fn value_round_trips_through_json() {
        let record = Record::new()
            .with("id", 7)
            .with("train_locations", vec![Value::from(Record::new().with("unit_id", 82))]);

        let text = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::List(vec![]).type_name(), "list");
    }
}
