use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::FilterError;

/// Comparison operator of a single [`Filter`](super::Filter)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperation {
    /// Equality (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// Membership in a list
    In,
    /// Non-membership in a list
    Nin,
    /// Case-sensitive substring match
    Like,
    /// Case-insensitive substring match
    Ilike,
    /// Case-insensitive regular expression
    Regex,
    /// Full-text search, indexed string fields only
    Text,
    /// `true` matches missing values, `false` present ones
    Null,
    /// `true` matches present values, `false` missing ones
    Exists,
}

impl FilterOperation {
    pub const ALL: &'static [Self] = &[
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::Nin,
        Self::Like,
        Self::Ilike,
        Self::Regex,
        Self::Text,
        Self::Null,
        Self::Exists,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::Regex => "regex",
            Self::Text => "text",
            Self::Null => "null",
            Self::Exists => "exists",
        }
    }

    /// `in` and `nin` take a list
    #[must_use]
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }

    /// `null` and `exists` take a boolean flag regardless of the field type
    #[must_use]
    pub fn takes_flag(self) -> bool {
        matches!(self, Self::Null | Self::Exists)
    }

    /// Pattern operators keep their value as text
    #[must_use]
    pub fn takes_pattern(self) -> bool {
        matches!(self, Self::Like | Self::Ilike | Self::Regex | Self::Text)
    }
}

impl fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperation {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == lowered)
            .ok_or_else(|| FilterError::UnknownOperator(s.to_string()))
    }
}
