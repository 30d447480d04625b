//! The backend-agnostic read request and its wire formats.

mod find_query;
mod params;
mod sort;

pub use find_query::FindQuery;
pub use sort::{SortBy, SortOrder};
