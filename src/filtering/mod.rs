//! # Filter expressions
//!
//! A filter is an `{op, val}` predicate on one field. Clients send them either as compact
//! expressions or as structured objects:
//!
//! ```text
//! GET /places?title=Stamford Bridge            eq, the default operator
//! GET /places?visits=gte:10&visits=lt:100      two filters on one field, ANDed
//! GET /places?id=in:3f1c...,9a2b...            comma-separated list
//! GET /places?closedAt=null:true
//!
//! { "title": { "op": "ilike", "val": "bridge" } }
//! ```
//!
//! Parsing a filter checks three things against the field's declared [`FieldType`]:
//!
//! | field type | legal operators |
//! |---|---|
//! | integer, float, datetime | eq, ne, gt, gte, lt, lte, in, nin, null, exists |
//! | string | eq, ne, in, nin, null, exists, like, ilike, regex, and text when indexed |
//! | boolean | eq, ne, null, exists |
//! | identifier | eq, ne, in, nin, null, exists |
//!
//! - the operator is legal for the type,
//! - the operand has the right shape (list, boolean flag or scalar),
//! - each operand coerces to the field's type.
//!
//! Once every filter of a field is parsed, [`check_combinations`] rejects operator mixes that
//! are contradictory or ambiguous (`eq` with anything else, `gt` with `gte`, ...).
//!
//! [`FieldType`]: crate::FieldType

mod filter;
mod operation;
mod parser;
mod rules;
mod value;

pub use filter::Filter;
pub use operation::FilterOperation;
pub use parser::{FilterError, RawFilter, check_bool, parse_filter};
pub use rules::check_combinations;
pub use value::FilterValue;
