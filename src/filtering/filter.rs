use serde::Serialize;

use super::{FilterError, FilterOperation, FilterValue};
use crate::fields::FieldType;

/// One `{op, val}` predicate on one field.
///
/// The value shape always matches the operator: a list for `in`/`nin`, a boolean for
/// `null`/`exists`, a scalar otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    op: FilterOperation,
    val: FilterValue,
}

impl Filter {
    /// # Errors
    ///
    /// [`FilterError::InvalidShape`] when `val` does not have the shape `op` requires.
    pub fn new(op: FilterOperation, val: impl Into<FilterValue>) -> Result<Self, FilterError> {
        let val = val.into();
        check_shape(op, &val)?;
        Ok(Self { op, val })
    }

    #[must_use]
    pub fn op(&self) -> FilterOperation {
        self.op
    }

    #[must_use]
    pub fn val(&self) -> &FilterValue {
        &self.val
    }

    #[must_use]
    pub fn into_parts(self) -> (FilterOperation, FilterValue) {
        (self.op, self.val)
    }

    pub fn eq(val: impl Into<FilterValue>) -> Result<Self, FilterError> {
        Self::new(FilterOperation::Eq, val)
    }

    pub fn is_in<T: Into<FilterValue>>(values: Vec<T>) -> Result<Self, FilterError> {
        Self::new(FilterOperation::In, values)
    }

    pub fn null(flag: bool) -> Result<Self, FilterError> {
        Self::new(FilterOperation::Null, flag)
    }

    /// Check operator legality and operand types against a field declaration.
    ///
    /// Filters produced by [`parse_filter`](super::parse_filter) always pass; this exists for
    /// filters built in code.
    ///
    /// # Errors
    ///
    /// [`FilterError::InvalidOperator`] or [`FilterError::InvalidValue`].
    pub fn check_for(&self, field_type: FieldType, indexed: bool) -> Result<(), FilterError> {
        if !field_type.allows(self.op, indexed) {
            return Err(FilterError::InvalidOperator {
                op: self.op,
                field_type,
                allowed: field_type.legal_operators(indexed),
            });
        }
        if self.op.takes_flag() {
            return Ok(());
        }
        let expected = if self.op.takes_pattern() {
            FieldType::String
        } else {
            field_type
        };
        for item in self.val.items() {
            if !matches_type(item, expected) {
                return Err(FilterError::InvalidValue {
                    value: serde_json::to_string(item).unwrap_or_default(),
                    expected,
                });
            }
        }
        Ok(())
    }
}

fn check_shape(op: FilterOperation, val: &FilterValue) -> Result<(), FilterError> {
    let valid = if op.takes_list() {
        matches!(val, FilterValue::List(items) if !items.iter().any(FilterValue::is_list))
    } else if op.takes_flag() {
        matches!(val, FilterValue::Boolean(_))
    } else {
        !val.is_list()
    };

    if valid {
        Ok(())
    } else {
        Err(FilterError::InvalidShape {
            op,
            expected: expected_shape(op),
        })
    }
}

pub(crate) fn expected_shape(op: FilterOperation) -> &'static str {
    if op.takes_list() {
        "a list of values"
    } else if op.takes_flag() {
        "a boolean"
    } else {
        "a single value"
    }
}

fn matches_type(value: &FilterValue, expected: FieldType) -> bool {
    matches!(
        (value, expected),
        (FilterValue::Integer(_), FieldType::Integer | FieldType::Float)
            | (FilterValue::Float(_), FieldType::Float)
            | (FilterValue::Text(_), FieldType::String)
            | (FilterValue::Boolean(_), FieldType::Boolean)
            | (FilterValue::DateTime(_), FieldType::DateTime)
            | (FilterValue::Uuid(_), FieldType::Identifier)
    )
}
