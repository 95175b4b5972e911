//! Record kinds held by a dataset

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of record kinds a dataset can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Unit definitions, one realm per civilization
    Unit,
    /// Global unit headers, moved in lockstep with units
    UnitHeader,
    /// Technologies
    Tech,
    /// Technology effects, addressed by `tech.effect_id`
    Effect,
    /// Visual sub-resources
    Graphic,
    /// Audio sub-resources
    Sound,
}

impl RecordKind {
    /// Every kind, in dataset order
    pub const ALL: [RecordKind; 6] = [
        Self::Unit,
        Self::UnitHeader,
        Self::Tech,
        Self::Effect,
        Self::Graphic,
        Self::Sound,
    ];

    /// Stable snake-case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::UnitHeader => "unit_header",
            Self::Tech => "tech",
            Self::Effect => "effect",
            Self::Graphic => "graphic",
            Self::Sound => "sound",
        }
    }

    /// Visual or audio sub-resource
    #[inline]
    #[must_use]
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Graphic | Self::Sound)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Unrecognized record kind name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown record kind: {0}")]
pub struct UnknownKind(pub String);
