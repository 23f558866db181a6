//! Numeric constraints used for link cardinality and array lengths

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error building a [`NumericConstraint`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error("minimum {min} is greater than maximum {max}")]
    Inverted { min: u64, max: u64 },

    #[error("constraint `{0}` cannot be satisfied by any count")]
    Unsatisfiable(String),
}

/// Inclusive `{min?, max?}` bounds; a missing bound is unbounded on that side
///
/// Declaration files may also use the sugared forms `greaterThan`,
/// `lessThan`, `equalTo`, `greaterThanOrEqualTo` and `lessThanOrEqualTo`,
/// which are normalized to inclusive bounds on load.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "ConstraintRepr")]
pub struct NumericConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

impl NumericConstraint {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(min: Option<u64>, max: Option<u64>) -> Result<Self, ConstraintError> {
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(ConstraintError::Inverted { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn greater_than(value: u64) -> Result<Self, ConstraintError> {
        let min = value
            .checked_add(1)
            .ok_or_else(|| ConstraintError::Unsatisfiable(format!("> {value}")))?;
        Ok(Self::at_least(min))
    }

    pub fn less_than(value: u64) -> Result<Self, ConstraintError> {
        let max = value
            .checked_sub(1)
            .ok_or_else(|| ConstraintError::Unsatisfiable(format!("< {value}")))?;
        Ok(Self::at_most(max))
    }

    pub fn equal_to(value: u64) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn at_least(value: u64) -> Self {
        Self {
            min: Some(value),
            max: None,
        }
    }

    pub fn at_most(value: u64) -> Self {
        Self {
            min: None,
            max: Some(value),
        }
    }

    pub fn contains(&self, count: u64) -> bool {
        self.min.is_none_or(|min| count >= min) && self.max.is_none_or(|max| count <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl fmt::Display for NumericConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (None, None) => f.write_str("any"),
            (Some(min), Some(max)) if min == max => write!(f, "={min}"),
            (Some(min), Some(max)) => write!(f, "{min}..={max}"),
            (Some(min), None) => write!(f, "{min}.."),
            (None, Some(max)) => write!(f, "..={max}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConstraintRepr {
    Sugar(Sugar),
    Bounds(Bounds),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum Sugar {
    GreaterThan(u64),
    LessThan(u64),
    EqualTo(u64),
    GreaterThanOrEqualTo(u64),
    LessThanOrEqualTo(u64),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Bounds {
    #[serde(default)]
    min: Option<u64>,
    #[serde(default)]
    max: Option<u64>,
}

impl TryFrom<ConstraintRepr> for NumericConstraint {
    type Error = ConstraintError;

    fn try_from(repr: ConstraintRepr) -> Result<Self, Self::Error> {
        match repr {
            ConstraintRepr::Sugar(Sugar::GreaterThan(v)) => Self::greater_than(v),
            ConstraintRepr::Sugar(Sugar::LessThan(v)) => Self::less_than(v),
            ConstraintRepr::Sugar(Sugar::EqualTo(v)) => Ok(Self::equal_to(v)),
            ConstraintRepr::Sugar(Sugar::GreaterThanOrEqualTo(v)) => Ok(Self::at_least(v)),
            ConstraintRepr::Sugar(Sugar::LessThanOrEqualTo(v)) => Ok(Self::at_most(v)),
            ConstraintRepr::Bounds(Bounds { min, max }) => Self::between(min, max),
        }
    }
}
