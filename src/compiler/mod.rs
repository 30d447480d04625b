//! # Query compilers
//!
//! A compiler turns a validated [`FindQuery`] into something a backend can execute. Both
//! implementations consume the same query and fail the same way; neither exposes its
//! backend's types through [`Compiler`] itself.
//!
//! - [`RelationalCompiler`] emits a pair of `sea_query` SELECT statements (page and count) with
//!   deduplicated, level-ordered LEFT JOINs.
//! - [`DocumentCompiler`] emits a [`DocumentQuery`]: skip/limit, ordered sort map, a filter
//!   document with `$`-prefixed operators, and a projection.

mod document;
mod relational;

pub use document::{DocumentCompiler, DocumentMapping, DocumentQuery, Projection};
pub use relational::{
    ColumnPath, JoinSpec, RelationalCompiler, RelationalMapping, RelationalQuery, SqlField,
};

use crate::errors::CrudError;
use crate::fields::EntityFields;
use crate::query::FindQuery;

/// Translate a [`FindQuery`] into a backend-native query.
pub trait Compiler<F: EntityFields> {
    type Output;

    /// # Errors
    ///
    /// [`CrudError::ValidationFailed`] when the query breaks a filter rule.
    fn compile(&self, query: &FindQuery<F>) -> Result<Self::Output, CrudError>;
}

/// Escape `%`, `_` and `\` so user input matches literally inside a LIKE pattern.
pub(crate) fn escape_like_wildcards(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
