//! # crudengine
//!
//! Whitelisted, typed queries over Sea-ORM entities, and a generic CRUD engine built on them.
//!
//! A request flows through the crate like this:
//!
//! 1. [`FindQuery`] is parsed from a query string or JSON body ([`extract`] does it for Axum).
//!    Every field name is checked against the entity's [`FieldSet`] whitelists and every filter
//!    against its field's [`FieldType`].
//! 2. [`Crud`] optionally narrows it through the `auth_filter` hook (ownership by default).
//! 3. A [`Compiler`] turns it into a backend query: [`RelationalCompiler`] for SQL,
//!    [`DocumentCompiler`] for document stores.
//! 4. The engine counts, fetches, post-processes in bounded chunks and returns a
//!    [`PaginatedResult`].
//!
//! ```rust,ignore
//! crudengine::searchable_fields! {
//!     pub enum PlaceSearch {
//!         Id => "id": Identifier,
//!         Title => "title": String + indexed,
//!         Visits => "visits": Integer,
//!     }
//! }
//!
//! let query = FindQuery::<Place>::from_query_string("title=ilike:bridge&sort=-visits&size=10")?;
//! let page = places.search(query).await?;
//! ```

pub mod compiler;
pub mod config;
pub mod core;
pub mod errors;
pub mod extract;
pub mod fields;
pub mod filtering;
pub mod pagination;
pub mod query;
pub mod validation;

pub use compiler::{
    ColumnPath, Compiler, DocumentCompiler, DocumentMapping, DocumentQuery, JoinSpec, Projection,
    RelationalCompiler, RelationalMapping, RelationalQuery, SqlField,
};
pub use config::CrudSettings;
pub use crate::core::{
    AuthTarget, Crud, CrudEvent, CrudHooks, CrudResource, EntityConfig, MergeIntoActiveModel,
    Principal, process_in_chunks,
};
pub use errors::CrudError;
pub use extract::{BodyFilters, QueryFilters};
pub use fields::{EntityFields, FieldSet, FieldType, SearchableField};
pub use filtering::{Filter, FilterError, FilterOperation, FilterValue, RawFilter, parse_filter};
pub use pagination::{PaginatedResult, Pagination};
pub use query::{FindQuery, SortBy, SortOrder};
pub use validation::{Validatable, ValidationError, ValidationErrors};

pub use serde_with;
