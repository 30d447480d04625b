use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::fields::FieldSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// `1` for ascending, `-1` for descending
    #[must_use]
    pub fn signum(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

/// One ORDER BY entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortBy<S> {
    pub field: S,
    pub order: SortOrder,
}

impl<S: FieldSet> SortBy<S> {
    #[must_use]
    pub fn asc(field: S) -> Self {
        Self {
            field,
            order: SortOrder::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: S) -> Self {
        Self {
            field,
            order: SortOrder::Desc,
        }
    }

    /// Parse a sort token: `-field` is descending, `field` and `+field` ascending.
    ///
    /// # Errors
    ///
    /// Returns a message naming the field when it is not sortable.
    pub fn parse(token: &str) -> Result<Self, String> {
        let token = token.trim();
        let (order, name) = if let Some(name) = token.strip_prefix('-') {
            (SortOrder::Desc, name)
        } else if let Some(name) = token.strip_prefix('+') {
            (SortOrder::Asc, name)
        } else {
            (SortOrder::Asc, token)
        };

        S::parse(name)
            .map(|field| Self { field, order })
            .ok_or_else(|| {
                format!(
                    "Cannot sort by '{name}'. Sortable fields: {}",
                    S::allowed_names()
                )
            })
    }

    /// Inverse of [`SortBy::parse`]
    #[must_use]
    pub fn token(&self) -> String {
        match self.order {
            SortOrder::Asc => self.field.name().to_string(),
            SortOrder::Desc => format!("-{}", self.field.name()),
        }
    }
}

impl<S: FieldSet> fmt::Display for SortBy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}
