//! Per-entity field whitelists.
//!
//! Every field name that arrives from a client (sort tokens, projections, filter keys) is resolved
//! against a closed enumeration before it is used. Names that are not part of the enumeration are
//! rejected; nothing is ever interpolated into a query as a raw string.
//!
//! The [`field_set!`](crate::field_set) and [`searchable_fields!`](crate::searchable_fields)
//! macros generate the enumerations:
//!
//! ```rust,ignore
//! crudengine::field_set! {
//!     pub enum PlaceSortable {
//!         Title => "title",
//!         CreatedAt => "createdAt",
//!     }
//! }
//!
//! crudengine::searchable_fields! {
//!     pub enum PlaceSearchable {
//!         Id => "id": Identifier,
//!         Title => "title": String + indexed,
//!         Visits => "visits": Integer,
//!     }
//! }
//! ```

use std::fmt::{self, Debug};
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::filtering::FilterOperation;

/// A closed set of field names.
pub trait FieldSet: Copy + Eq + Hash + Ord + Debug + Send + Sync + 'static {
    /// Every member, in declaration order
    const ALL: &'static [Self];

    /// Wire name of the field
    fn name(self) -> &'static str;

    /// Resolve a wire name. Anything outside [`FieldSet::ALL`] is `None`.
    #[must_use]
    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.name() == name)
    }

    /// Comma-separated list of every wire name, for error messages
    #[must_use]
    fn allowed_names() -> String {
        Self::ALL
            .iter()
            .map(|field| field.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A field that may appear as a filter key.
pub trait SearchableField: FieldSet {
    fn field_type(self) -> FieldType;

    /// Whether the backing column carries a full-text index
    fn indexed(self) -> bool {
        false
    }
}

/// Semantic type of a searchable field, which decides the legal filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    DateTime,
    /// Opaque UUID identifier or foreign key
    Identifier,
}

impl FieldType {
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Operator legality table.
    #[must_use]
    pub fn allows(self, op: FilterOperation, indexed: bool) -> bool {
        use FilterOperation as Op;

        match op {
            Op::Eq | Op::Ne | Op::Null | Op::Exists => true,
            Op::In | Op::Nin => !matches!(self, Self::Boolean),
            Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
                matches!(self, Self::Integer | Self::Float | Self::DateTime)
            }
            Op::Like | Op::Ilike | Op::Regex => matches!(self, Self::String),
            Op::Text => matches!(self, Self::String) && indexed,
        }
    }

    /// Every operator legal for this type, in declaration order
    #[must_use]
    pub fn legal_operators(self, indexed: bool) -> Vec<FilterOperation> {
        FilterOperation::ALL
            .iter()
            .copied()
            .filter(|op| self.allows(*op, indexed))
            .collect()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Identifier => "identifier",
        })
    }
}

/// The three whitelists of one entity.
pub trait EntityFields: Send + Sync + 'static {
    type Selectable: FieldSet;
    type Sortable: FieldSet;
    type Searchable: SearchableField;
}

/// Declare a [`FieldSet`] enumeration.
///
/// The generated enum derives `Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord` and
/// implements `Display` as the wire name.
#[macro_export]
macro_rules! field_set {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $field:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::FieldSet for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $field),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::FieldSet::name(*self))
            }
        }
    };
}

/// Declare a [`SearchableField`] enumeration.
///
/// Each entry is `Variant => "wireName": FieldType`, optionally followed by `+ indexed` for
/// string fields backed by a full-text index.
#[macro_export]
macro_rules! searchable_fields {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $field:literal : $kind:ident $(+ $flag:ident)?),+ $(,)?
        }
    ) => {
        $crate::field_set! {
            $(#[$meta])*
            $vis enum $name {
                $($variant => $field),+
            }
        }

        impl $crate::SearchableField for $name {
            fn field_type(self) -> $crate::FieldType {
                match self {
                    $(Self::$variant => $crate::FieldType::$kind),+
                }
            }

            fn indexed(self) -> bool {
                match self {
                    $(Self::$variant => $crate::__indexed_flag!($($flag)?)),+
                }
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __indexed_flag {
    () => {
        false
    };
    (indexed) => {
        true
    };
}
