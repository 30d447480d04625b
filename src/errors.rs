//! # Error Handling
//!
//! Every engine operation returns [`CrudError`]. The taxonomy follows the lifecycle of one
//! request through the engine:
//!
//! - Validation problems (bad filter operator, value shape, operator combination, unknown field)
//!   are raised before anything touches the database and are never retried.
//! - Authorization failures are raised before any persistence side effect.
//! - Persistence failures roll back the active transaction before they are returned.
//! - Post-processing and other collaborator calls surface as upstream errors or timeouts.
//!
//! Internal details (database errors, collaborator messages) are logged with `tracing` when the
//! error is rendered, and never sent to the client.
//!
//! ```rust,ignore
//! async fn handler(State(places): State<Crud<Place>>, Path(id): Path<Uuid>) -> Result<Json<PlaceRead>, CrudError> {
//!     Ok(Json(places.get(id).await?))
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use std::fmt;
use utoipa::ToSchema;

use crate::filtering::FilterError;
use crate::validation::ValidationErrors;

/// Engine error with sanitized user-facing messages
#[derive(Debug)]
pub enum CrudError {
    /// 422 - Filters, query fields or payload failed validation
    ValidationFailed {
        /// Every problem found, in discovery order
        errors: Vec<String>,
    },

    /// 400 - Malformed input that is not a validation rule (e.g. unparsable identifier)
    BadRequest { message: String },

    /// 404 - Target identifier absent
    NotFound {
        resource: String,
        id: Option<String>,
    },

    /// 401 - Principal lacks rights for the operation or record
    Unauthorized { message: String },

    /// 403 - Principal is known but the operation is forbidden outright
    Forbidden { message: String },

    /// 409 - Uniqueness violation on create or update
    Conflict { message: String },

    /// 500 - Persistence failure (details logged, not exposed)
    Database { message: String, internal: DbErr },

    /// 500 - Any other unexpected failure
    Internal {
        message: String,
        internal: Option<String>,
    },

    /// 504 - A query or collaborator call exceeded its deadline
    UpstreamTimeout { operation: String },

    /// 502 - A collaborator call (post-processing, storage, ...) failed
    Upstream {
        message: String,
        internal: Option<String>,
    },
}

impl CrudError {
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::ValidationFailed { errors }
    }

    /// Single-message shorthand for [`CrudError::ValidationFailed`]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            errors: vec![message.into()],
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Wrap a database error. The `DbErr` is logged on render, the user sees a generic message.
    pub fn database(err: DbErr) -> Self {
        Self::Database {
            message: "A database error occurred".to_string(),
            internal: err,
        }
    }

    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    pub fn upstream_timeout(operation: impl Into<String>) -> Self {
        Self::UpstreamTimeout {
            operation: operation.into(),
        }
    }

    pub fn upstream(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            internal,
        }
    }

    /// HTTP status code for this error kind
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Sanitized message safe to return to a client
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationFailed { errors } => {
                if errors.len() == 1 {
                    errors[0].clone()
                } else {
                    format!("Validation failed: {}", errors.join(", "))
                }
            }
            Self::NotFound { resource, id } => match id {
                Some(id) => format!("{resource} with ID '{id}' not found"),
                None => format!("{resource} not found"),
            },
            Self::UpstreamTimeout { operation } => format!("{operation} timed out"),
            Self::BadRequest { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::Conflict { message }
            | Self::Database { message, .. }
            | Self::Internal { message, .. }
            | Self::Upstream { message, .. } => message.clone(),
        }
    }

    /// Whether the caller could have avoided this error by changing the request
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    fn log_internal(&self) {
        match self {
            Self::Database { internal, .. } => {
                tracing::error!(error = ?internal, "Database error occurred");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error occurred");
            }
            Self::Upstream {
                message,
                internal: Some(details),
            } => {
                tracing::error!(message = %message, details = %details, "Upstream call failed");
            }
            Self::UpstreamTimeout { operation } => {
                tracing::warn!(operation = %operation, "Upstream call timed out");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "Request rejected"
                );
            }
        }
    }
}

/// Error body returned to clients
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Always `true`
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl From<&CrudError> for ErrorBody {
    fn from(err: &CrudError) -> Self {
        match err {
            CrudError::ValidationFailed { errors } => Self {
                error: true,
                message: "Validation failed".to_string(),
                details: Some(errors.clone()),
            },
            _ => Self {
                error: true,
                message: err.user_message(),
                details: None,
            },
        }
    }
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        self.log_internal();
        let status = self.status_code();
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

impl fmt::Display for CrudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for CrudError {}

/// `RecordNotFound` becomes 404, everything else 500.
impl From<DbErr> for CrudError {
    fn from(err: DbErr) -> Self {
        match &err {
            DbErr::RecordNotFound(msg) => {
                let resource = msg.split_whitespace().next().unwrap_or("Resource");
                Self::NotFound {
                    resource: resource.to_string(),
                    id: None,
                }
            }
            _ => Self::database(err),
        }
    }
}

impl From<FilterError> for CrudError {
    fn from(err: FilterError) -> Self {
        Self::invalid(err.to_string())
    }
}

impl From<ValidationErrors> for CrudError {
    fn from(errors: ValidationErrors) -> Self {
        Self::ValidationFailed {
            errors: errors.errors().iter().map(ToString::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn test_not_found_with_id() {
        let err = CrudError::not_found("Place", Some("123".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.user_message(), "Place with ID '123' not found");
    }

    #[test]
    fn test_not_found_without_id() {
        let err = CrudError::not_found("Place", None);
        assert_eq!(err.user_message(), "Place not found");
    }

    #[test]
    fn test_validation_failed_joins_messages() {
        let err = CrudError::validation_failed(vec![
            "gt and gte operators should not be used together".to_string(),
            "lt and lte operators should not be used together".to_string(),
        ]);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.user_message().starts_with("Validation failed: "));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_database_error_is_sanitized() {
        let err = CrudError::database(DbErr::Custom("secret table layout".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "A database error occurred");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_upstream_statuses() {
        assert_eq!(
            CrudError::upstream_timeout("post-processing").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            CrudError::upstream("Storage unavailable", None).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            CrudError::upstream_timeout("query").user_message(),
            "query timed out"
        );
    }

    #[test]
    fn test_dberr_record_not_found_conversion() {
        let err: CrudError = DbErr::RecordNotFound("Place not found".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_all_other_dberr_become_500() {
        for db_err in [
            DbErr::Custom("custom".to_string()),
            DbErr::Type("type".to_string()),
            DbErr::Json("json".to_string()),
        ] {
            let err: CrudError = db_err.into();
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_error_body_shape() {
        let err = CrudError::validation_failed(vec!["a".to_string(), "b".to_string()]);
        let body = serde_json::to_value(ErrorBody::from(&err)).unwrap();
        assert_eq!(body["error"], true);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["details"], serde_json::json!(["a", "b"]));

        let err = CrudError::conflict("Record already exists");
        let body = serde_json::to_value(ErrorBody::from(&err)).unwrap();
        assert_eq!(body["message"], "Record already exists");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_from_validation_errors() {
        let mut errors = ValidationErrors::new();
        errors.add(ValidationError::new("title", "This field is required"));
        let err: CrudError = errors.into();
        assert_eq!(err.user_message(), "title: This field is required");
    }

    #[test]
    fn test_all_status_codes() {
        let cases = vec![
            (CrudError::invalid("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (CrudError::bad_request("x"), StatusCode::BAD_REQUEST),
            (CrudError::not_found("x", None), StatusCode::NOT_FOUND),
            (CrudError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (CrudError::forbidden("x"), StatusCode::FORBIDDEN),
            (CrudError::conflict("x"), StatusCode::CONFLICT),
            (CrudError::internal("x", None), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected);
        }
    }
}
