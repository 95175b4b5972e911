//! Field paths for addressing reference fields inside records
//!
//! Provides [`FieldPath`], the grammar the schema table is written in.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    /// Field name
    pub name: String,
    /// Absent or null sub-structure means "not applicable"
    pub optional: bool,
    /// Field holds a bounded list; every element is visited
    pub each: bool,
}

impl Segment {
    /// Required, non-list segment
    #[inline]
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            each: false,
        }
    }

    /// Optional sub-structure segment
    #[inline]
    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::field(name)
        }
    }

    /// List segment
    #[inline]
    #[must_use]
    pub fn list(name: impl Into<String>) -> Self {
        Self {
            each: true,
            ..Self::field(name)
        }
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.optional {
            write!(f, "?")?;
        }
        if self.each {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// Path to a reference field within a record
///
/// Segments are joined by `.`. A trailing `?` marks an optional
/// sub-structure, a trailing `[]` iterates a list.
///
/// # Examples
/// - `base_id` → top-level integer
/// - `building?.annexes[].unit_id` → field inside each annex of an optional building
/// - `required_techs[]` → every integer of a list
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// Create path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Create path from a single required field
    #[inline]
    #[must_use]
    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![Segment::field(name)])
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if path has no segments
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Name of the last segment (the leaf field)
    #[inline]
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(|s| s.name.as_str())
    }

    /// Check whether any segment passes through a list
    #[inline]
    #[must_use]
    pub fn crosses_list(&self) -> bool {
        self.0.iter().any(|s| s.each)
    }

    /// Plain dotted form without markers, e.g. `building.annexes.unit_id`
    #[must_use]
    pub fn plain(&self) -> String {
        self.0
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let segments: Vec<Segment> = s
            .split('.')
            .map(parse_segment)
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }
}

fn parse_segment(raw: &str) -> Result<Segment, PathError> {
    let (rest, each) = match raw.strip_suffix("[]") {
        Some(rest) => (rest, true),
        None => (raw, false),
    };
    let (name, optional) = match rest.strip_suffix('?') {
        Some(name) => (name, true),
        None => (rest, false),
    };

    if name.is_empty() {
        return Err(PathError::EmptySegment);
    }
    if name.contains(|c: char| !c.is_alphanumeric() && c != '_') {
        return Err(PathError::InvalidSegment(raw.to_string()));
    }

    Ok(Segment {
        name: name.to_string(),
        optional,
        each,
    })
}

/// Errors related to field paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Path has no segments
    #[error("field path is empty")]
    Empty,

    /// Empty segment in path
    #[error("field path contains empty segment")]
    EmptySegment,

    /// Invalid segment characters
    #[error("invalid segment: {0} (must be alphanumeric or underscore, optionally suffixed by ? or [])")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_single() {
        let path = FieldPath::single("base_id");
        assert_eq!(path.len(), 1);
        assert_eq!(path.leaf(), Some("base_id"));
        assert!(!path.crosses_list());
    }

    #[test]
    fn path_parses_markers() {
        let path: FieldPath = "building?.annexes[].unit_id".parse().unwrap();
        let segs = path.segments();
        assert_eq!(segs.len(), 3);
        assert!(segs[0].optional && !segs[0].each);
        assert!(!segs[1].optional && segs[1].each);
        assert_eq!(segs[2], Segment::field("unit_id"));
        assert!(path.crosses_list());
    }

    #[test]
    fn path_optional_list() {
        let path: FieldPath = "extras?[]".parse().unwrap();
        assert!(path.segments()[0].optional);
        assert!(path.segments()[0].each);
    }

    #[test]
    fn path_display_round_trips() {
        for text in ["copy_id", "creatable?.train_locations[].unit_id", "required_techs[]"] {
            let path: FieldPath = text.parse().unwrap();
            assert_eq!(path.to_string(), text);
        }
    }

    #[test]
    fn path_plain_drops_markers() {
        let path: FieldPath = "building?.annexes[].unit_id".parse().unwrap();
        assert_eq!(path.plain(), "building.annexes.unit_id");
    }

    #[test]
    fn path_from_str_empty() {
        let result: Result<FieldPath, _> = "".parse();
        assert_eq!(result, Err(PathError::Empty));
    }

    #[test]
    fn path_from_str_empty_segment() {
        let result: Result<FieldPath, _> = "a..b".parse();
        assert_eq!(result, Err(PathError::EmptySegment));

        let result: Result<FieldPath, _> = "a.?".parse();
        assert_eq!(result, Err(PathError::EmptySegment));
    }

    #[test]
    fn path_from_str_invalid_chars() {
        let result: Result<FieldPath, _> = "a.b-c".parse();
        assert!(matches!(result, Err(PathError::InvalidSegment(_))));

        // markers only allowed as suffixes, in this order
        let result: Result<FieldPath, _> = "a[]?".parse();
        assert!(matches!(result, Err(PathError::InvalidSegment(_))));
    }
}
