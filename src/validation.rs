//! Payload validation for create and update representations.
//!
//! The engine calls [`Validatable::validate`] on every `Create` and `Update` value after the wire
//! form has been mapped, and before a transaction is opened. A failing payload never reaches the
//! database.
//!
//! ```rust,ignore
//! impl Validatable for PlaceCreate {
//!     fn validate(&self) -> Result<(), ValidationErrors> {
//!         let mut errors = ValidationErrors::new();
//!         errors.check(validators::required("title", &self.title));
//!         errors.check(validators::coordinate("lat", self.lat, 90.0));
//!         errors.result()
//!     }
//! }
//! ```

use serde::Serialize;
use std::fmt;

/// One failed rule on one payload field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Every rule a payload failed, in the order they were checked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Record the outcome of a single validator, keeping going either way.
    pub fn check(&mut self, outcome: Result<(), ValidationError>) {
        if let Err(error) = outcome {
            self.errors.push(error);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// `Ok(())` when nothing was recorded
    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed with {} error(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Implemented by `Create` and `Update` representations. The default accepts everything.
pub trait Validatable {
    /// # Errors
    ///
    /// Returns every rule the value breaks.
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Reusable single-field rules
pub mod validators {
    use super::ValidationError;
    use std::fmt::Display;

    /// Rejects empty and whitespace-only strings.
    pub fn required(field: &str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new(field, "This field is required"));
        }
        Ok(())
    }

    /// Character-count bounds, both inclusive.
    pub fn length(
        field: &str,
        value: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<(), ValidationError> {
        let len = value.chars().count();
        if let Some(min) = min.filter(|min| len < *min) {
            return Err(ValidationError::new(
                field,
                format!("Must be at least {min} characters"),
            ));
        }
        if let Some(max) = max.filter(|max| len > *max) {
            return Err(ValidationError::new(
                field,
                format!("Must be at most {max} characters"),
            ));
        }
        Ok(())
    }

    pub fn range<T: PartialOrd + Display>(
        field: &str,
        value: T,
        min: Option<T>,
        max: Option<T>,
    ) -> Result<(), ValidationError> {
        if let Some(min) = min.filter(|min| value < *min) {
            return Err(ValidationError::new(field, format!("Must be at least {min}")));
        }
        if let Some(max) = max.filter(|max| value > *max) {
            return Err(ValidationError::new(field, format!("Must be at most {max}")));
        }
        Ok(())
    }

    /// Latitude (`limit = 90`) or longitude (`limit = 180`) in degrees.
    pub fn coordinate(field: &str, value: f64, limit: f64) -> Result<(), ValidationError> {
        if !value.is_finite() || value.abs() > limit {
            return Err(ValidationError::new(
                field,
                format!("Must be between -{limit} and {limit}"),
            ));
        }
        Ok(())
    }
}
