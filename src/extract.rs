//! Axum extractors producing a validated [`FindQuery`].
//!
//! ```rust,ignore
//! async fn list(
//!     State(places): State<Crud<Place>>,
//!     QueryFilters(query): QueryFilters<Place>,
//! ) -> Result<PaginatedResult<PlaceRead>, CrudError> {
//!     places.search(query).await
//! }
//! ```

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde_json::Value;

use crate::errors::CrudError;
use crate::fields::EntityFields;
use crate::query::FindQuery;

/// `FindQuery` from the URL query string. A missing query string is the default query.
pub struct QueryFilters<F: EntityFields>(pub FindQuery<F>);

/// `FindQuery` from a JSON request body.
pub struct BodyFilters<F: EntityFields>(pub FindQuery<F>);

impl<S, F> FromRequestParts<S> for QueryFilters<F>
where
    S: Send + Sync,
    F: EntityFields,
{
    type Rejection = CrudError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        FindQuery::from_query_string(parts.uri.query().unwrap_or_default()).map(Self)
    }
}

impl<S, F> FromRequest<S> for BodyFilters<F>
where
    S: Send + Sync,
    F: EntityFields,
{
    type Rejection = CrudError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| CrudError::bad_request(rejection.body_text()))?;
        FindQuery::from_json(&body).map(Self)
    }
}
