use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::filter::expected_shape;
use super::{Filter, FilterOperation, FilterValue};
use crate::fields::FieldType;

/// Why a single filter expression was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("'{0}' is not a filter operator")]
    UnknownOperator(String),

    #[error("{op} is not a valid operation for {field_type} fields - Valid: {}", join_ops(.allowed))]
    InvalidOperator {
        op: FilterOperation,
        field_type: FieldType,
        allowed: Vec<FilterOperation>,
    },

    #[error("{op} expects {expected}")]
    InvalidShape {
        op: FilterOperation,
        expected: &'static str,
    },

    #[error("'{value}' is not a valid {expected} value")]
    InvalidValue { value: String, expected: FieldType },

    #[error("field filter {0} is not valid. It must define the op and val fields")]
    MalformedFilter(String),

    #[error("{0}")]
    Combination(String),
}

fn join_ops(ops: &[FilterOperation]) -> String {
    ops.iter()
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// A filter as received on the wire, before it is checked against its field.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFilter {
    /// `"op:value"`, or a bare value meaning `eq`
    Expression(String),
    /// `{"op": ..., "val": ...}`
    Structured { op: String, val: Value },
}

impl RawFilter {
    /// Interpret a JSON value. Strings are expressions, objects must carry `op` and `val`,
    /// other scalars are `eq` operands.
    ///
    /// # Errors
    ///
    /// [`FilterError::MalformedFilter`] for objects without `op`/`val`, arrays and `null`.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        match value {
            Value::String(expr) => Ok(Self::Expression(expr.clone())),
            Value::Object(map) => match (map.get("op"), map.get("val")) {
                (Some(Value::String(op)), Some(val)) => Ok(Self::Structured {
                    op: op.clone(),
                    val: val.clone(),
                }),
                _ => Err(FilterError::MalformedFilter(value.to_string())),
            },
            Value::Number(_) | Value::Bool(_) => Ok(Self::Structured {
                op: FilterOperation::Eq.as_str().to_string(),
                val: value.clone(),
            }),
            Value::Null | Value::Array(_) => Err(FilterError::MalformedFilter(value.to_string())),
        }
    }

    /// Split into operator token and operand. A colon-free expression is an `eq`.
    fn split(&self) -> (&str, Operand<'_>) {
        match self {
            Self::Expression(expr) => match expr.split_once(':') {
                Some((op, raw)) => (op, Operand::Text(raw)),
                None => (FilterOperation::Eq.as_str(), Operand::Text(expr)),
            },
            Self::Structured { op, val } => (op, Operand::Json(val)),
        }
    }
}

impl From<&str> for RawFilter {
    fn from(expr: &str) -> Self {
        Self::Expression(expr.to_string())
    }
}

impl From<String> for RawFilter {
    fn from(expr: String) -> Self {
        Self::Expression(expr)
    }
}

enum Operand<'a> {
    Text(&'a str),
    Json(&'a Value),
}

/// Turn a raw filter into a [`Filter`] for a field of type `field_type`.
///
/// # Errors
///
/// - [`FilterError::UnknownOperator`] when the operator token is not recognised
/// - [`FilterError::InvalidOperator`] when the operator is not legal for the field type
/// - [`FilterError::InvalidShape`] when a list, scalar or boolean operand has the wrong shape
/// - [`FilterError::InvalidValue`] when an operand does not coerce to the field type
pub fn parse_filter(
    raw: &RawFilter,
    field_type: FieldType,
    indexed: bool,
) -> Result<Filter, FilterError> {
    let (token, operand) = raw.split();
    let op: FilterOperation = token.parse()?;

    if !field_type.allows(op, indexed) {
        return Err(FilterError::InvalidOperator {
            op,
            field_type,
            allowed: field_type.legal_operators(indexed),
        });
    }

    let val = if op.takes_flag() {
        FilterValue::Boolean(flag_operand(op, &operand)?)
    } else if op.takes_list() {
        FilterValue::List(
            list_items(op, &operand)?
                .into_iter()
                .map(|item| coerce(&item, field_type))
                .collect::<Result<_, _>>()?,
        )
    } else if op.takes_pattern() {
        FilterValue::Text(scalar_text(op, &operand)?.into_owned())
    } else {
        coerce(&scalar_text(op, &operand)?, field_type)?
    };

    Filter::new(op, val)
}

/// Lenient boolean parsing shared by filters and query parameters.
#[must_use]
pub fn check_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn shape_error(op: FilterOperation) -> FilterError {
    FilterError::InvalidShape {
        op,
        expected: expected_shape(op),
    }
}

fn flag_operand(op: FilterOperation, operand: &Operand<'_>) -> Result<bool, FilterError> {
    match operand {
        Operand::Text(raw) => check_bool(raw),
        Operand::Json(Value::Bool(flag)) => Some(*flag),
        Operand::Json(Value::String(raw)) => check_bool(raw),
        Operand::Json(_) => None,
    }
    .ok_or_else(|| shape_error(op))
}

fn list_items<'a>(
    op: FilterOperation,
    operand: &'a Operand<'a>,
) -> Result<Vec<Cow<'a, str>>, FilterError> {
    match operand {
        Operand::Text(raw) => split_list(op, raw),
        Operand::Json(Value::String(raw)) => split_list(op, raw),
        Operand::Json(Value::Array(items)) => items
            .iter()
            .map(|item| json_scalar(item).ok_or_else(|| shape_error(op)))
            .collect(),
        Operand::Json(_) => Err(shape_error(op)),
    }
}

/// Comma-separated, or a JSON array literal. Blank input is the empty list.
fn split_list<'a>(op: FilterOperation, raw: &'a str) -> Result<Vec<Cow<'a, str>>, FilterError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        let items: Vec<Value> = serde_json::from_str(trimmed).map_err(|_| shape_error(op))?;
        return items
            .iter()
            .map(|item| {
                json_scalar(item)
                    .map(|text| Cow::Owned(text.into_owned()))
                    .ok_or_else(|| shape_error(op))
            })
            .collect();
    }
    Ok(raw.split(',').map(Cow::Borrowed).collect())
}

fn scalar_text<'a>(
    op: FilterOperation,
    operand: &'a Operand<'a>,
) -> Result<Cow<'a, str>, FilterError> {
    match operand {
        Operand::Text(raw) => Ok(Cow::Borrowed(raw)),
        Operand::Json(value) => json_scalar(value).ok_or_else(|| shape_error(op)),
    }
}

fn json_scalar(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(text) => Some(Cow::Borrowed(text.as_str())),
        Value::Number(number) => Some(Cow::Owned(number.to_string())),
        Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn coerce(raw: &str, field_type: FieldType) -> Result<FilterValue, FilterError> {
    let invalid = || FilterError::InvalidValue {
        value: raw.to_string(),
        expected: field_type,
    };
    let trimmed = raw.trim();

    match field_type {
        FieldType::String => Ok(FilterValue::Text(raw.to_string())),
        FieldType::Integer => trimmed
            .parse()
            .map(FilterValue::Integer)
            .map_err(|_| invalid()),
        FieldType::Float => trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(FilterValue::Float)
            .ok_or_else(invalid),
        FieldType::Boolean => check_bool(trimmed)
            .map(FilterValue::Boolean)
            .ok_or_else(invalid),
        FieldType::DateTime => parse_datetime(trimmed)
            .map(FilterValue::DateTime)
            .ok_or_else(invalid),
        FieldType::Identifier => Uuid::parse_str(trimmed)
            .map(FilterValue::Uuid)
            .map_err(|_| invalid()),
    }
}

/// RFC 3339, or a bare date at midnight UTC
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
