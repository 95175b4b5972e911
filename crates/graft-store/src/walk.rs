//! Generic walker resolving a [`FieldPath`] against a [`Record`]
//!
//! One walker serves every record kind; the schema table decides which
//! paths are visited. Each visited integer is reported together with its
//! concrete location, e.g. `building.annexes[2].unit_id`.

use crate::path::{FieldPath, Segment};
use crate::value::{Record, Value};
use indexmap::IndexMap;

/// Visit every integer addressed by `path`
///
/// Returns the number of integers visited.
///
/// # Errors
/// Returns [`WalkError`] when a required segment is absent or a value has
/// the wrong shape. Integers visited before the failure have already been
/// reported to `f`.
pub fn visit(
    record: &Record,
    path: &FieldPath,
    mut f: impl FnMut(&str, i64),
) -> Result<usize, WalkError> {
    walk(record.fields(), path.segments(), "", &mut f)
}

/// Visit every integer addressed by `path`, allowing in-place edits
///
/// # Errors
/// Same conditions as [`visit`].
pub fn visit_mut(
    record: &mut Record,
    path: &FieldPath,
    mut f: impl FnMut(&str, &mut i64),
) -> Result<usize, WalkError> {
    walk_mut(record.fields_mut(), path.segments(), "", &mut f)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn walk(
    fields: &IndexMap<String, Value>,
    segs: &[Segment],
    prefix: &str,
    f: &mut dyn FnMut(&str, i64),
) -> Result<usize, WalkError> {
    let Some((seg, rest)) = segs.split_first() else {
        return Ok(0);
    };
    let here = join(prefix, &seg.name);

    let Some(value) = fields.get(&seg.name) else {
        return if seg.optional {
            Ok(0)
        } else {
            Err(WalkError::MissingField { path: here })
        };
    };
    if seg.optional && value.is_null() {
        return Ok(0);
    }

    if !seg.each {
        return step(value, rest, &here, f);
    }

    let Value::List(items) = value else {
        return Err(WalkError::unexpected(here, "list", value));
    };
    let mut visited = 0;
    for (i, item) in items.iter().enumerate() {
        if item.is_null() {
            continue;
        }
        visited += step(item, rest, &format!("{here}[{i}]"), f)?;
    }
    Ok(visited)
}

fn step(
    value: &Value,
    rest: &[Segment],
    at: &str,
    f: &mut dyn FnMut(&str, i64),
) -> Result<usize, WalkError> {
    if rest.is_empty() {
        return match value {
            Value::Int(v) => {
                f(at, *v);
                Ok(1)
            }
            other => Err(WalkError::unexpected(at.to_string(), "int", other)),
        };
    }
    match value {
        Value::Struct(fields) => walk(fields, rest, at, f),
        other => Err(WalkError::unexpected(at.to_string(), "struct", other)),
    }
}

fn walk_mut(
    fields: &mut IndexMap<String, Value>,
    segs: &[Segment],
    prefix: &str,
    f: &mut dyn FnMut(&str, &mut i64),
) -> Result<usize, WalkError> {
    let Some((seg, rest)) = segs.split_first() else {
        return Ok(0);
    };
    let here = join(prefix, &seg.name);

    let Some(value) = fields.get_mut(&seg.name) else {
        return if seg.optional {
            Ok(0)
        } else {
            Err(WalkError::MissingField { path: here })
        };
    };
    if seg.optional && value.is_null() {
        return Ok(0);
    }

    if !seg.each {
        return step_mut(value, rest, &here, f);
    }

    let items = match value {
        Value::List(items) => items,
        other => return Err(WalkError::unexpected(here, "list", other)),
    };
    let mut visited = 0;
    for (i, item) in items.iter_mut().enumerate() {
        if item.is_null() {
            continue;
        }
        visited += step_mut(item, rest, &format!("{here}[{i}]"), f)?;
    }
    Ok(visited)
}

fn step_mut(
    value: &mut Value,
    rest: &[Segment],
    at: &str,
    f: &mut dyn FnMut(&str, &mut i64),
) -> Result<usize, WalkError> {
    if rest.is_empty() {
        return match value {
            Value::Int(v) => {
                f(at, v);
                Ok(1)
            }
            other => Err(WalkError::unexpected(at.to_string(), "int", other)),
        };
    }
    match value {
        Value::Struct(fields) => walk_mut(fields, rest, at, f),
        other => Err(WalkError::unexpected(at.to_string(), "struct", other)),
    }
}

/// Failure to resolve a path against a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    /// A required segment is absent from the record
    #[error("field '{path}' is absent")]
    MissingField { path: String },

    /// A value does not have the shape the path expects
    #[error("field '{path}' is {found}, expected {expected}")]
    UnexpectedType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl WalkError {
    fn unexpected(path: String, expected: &'static str, found: &Value) -> Self {
        Self::UnexpectedType {
            path,
            expected,
            found: found.type_name(),
        }
    }

    /// Concrete location the walk failed at
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::MissingField { path } | Self::UnexpectedType { path, .. } => path,
        }
    }
}
