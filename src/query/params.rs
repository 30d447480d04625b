//! Wire parsing of [`FindQuery`] from JSON bodies and query strings.
//!
//! ```text
//! page=2&size=20&sort=-createdAt,title&fields=id,title&title=ilike:bridge&visits=gte:10
//! ```
//!
//! ```json
//! {"page": 2, "size": 20, "sort": ["-createdAt", "title"], "fields": ["id", "title"],
//!  "title": {"op": "ilike", "val": "bridge"}, "visits": ["gte:10", "lt:100"]}
//! ```

use indexmap::IndexMap;
use serde_json::Value;
use url::form_urlencoded;

use crate::errors::CrudError;
use crate::fields::{EntityFields, FieldSet, SearchableField};
use crate::filtering::{RawFilter, parse_filter};

use super::find_query::validate_filters;
use super::{FindQuery, SortBy};

impl<F: EntityFields> FindQuery<F> {
    /// Parse a JSON object. Every problem is collected before failing.
    ///
    /// # Errors
    ///
    /// [`CrudError::ValidationFailed`] for unknown fields, bad filters, combination rule
    /// violations or unparsable `page`/`size`.
    pub fn from_json(value: &Value) -> Result<Self, CrudError> {
        let Value::Object(map) = value else {
            return Err(CrudError::invalid("Query must be a JSON object"));
        };

        let mut parser = ParamParser::<F>::default();
        for (key, value) in map {
            parser.entry(key, value);
        }
        parser.finish()
    }

    /// Parse a URL query string (without the leading `?`). A key may repeat to give one field
    /// several filters.
    ///
    /// # Errors
    ///
    /// Same as [`FindQuery::from_json`].
    pub fn from_query_string(query: &str) -> Result<Self, CrudError> {
        let mut grouped: IndexMap<String, Vec<Value>> = IndexMap::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            grouped
                .entry(key.into_owned())
                .or_default()
                .push(Value::String(value.into_owned()));
        }

        let mut parser = ParamParser::<F>::default();
        for (key, mut values) in grouped {
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            parser.entry(&key, &value);
        }
        parser.finish()
    }
}

struct ParamParser<F: EntityFields> {
    query: FindQuery<F>,
    errors: Vec<String>,
}

impl<F: EntityFields> Default for ParamParser<F> {
    fn default() -> Self {
        Self {
            query: FindQuery::new(),
            errors: Vec::new(),
        }
    }
}

impl<F: EntityFields> ParamParser<F> {
    fn entry(&mut self, key: &str, value: &Value) {
        match key {
            "page" => self.query.page = self.positive(key, value),
            "size" => self.query.size = self.positive(key, value),
            "sort" => {
                for token in self.tokens(key, value) {
                    match SortBy::parse(&token) {
                        Ok(sort) => self.query.sort.push(sort),
                        Err(err) => self.errors.push(err),
                    }
                }
            }
            "fields" | "select" => {
                for token in self.tokens(key, value) {
                    match F::Selectable::parse(&token) {
                        Some(field) if !self.query.select.contains(&field) => {
                            self.query.select.push(field);
                        }
                        Some(_) => {}
                        None => self.errors.push(format!(
                            "Cannot select '{token}'. Selectable fields: {}",
                            F::Selectable::allowed_names()
                        )),
                    }
                }
            }
            _ => self.filters(key, value),
        }
    }

    fn filters(&mut self, key: &str, value: &Value) {
        let Some(field) = F::Searchable::parse(key) else {
            self.errors.push(format!(
                "Cannot filter by '{key}'. Searchable fields: {}",
                F::Searchable::allowed_names()
            ));
            return;
        };

        let raws = match value {
            Value::Array(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        for raw in raws {
            let parsed = RawFilter::from_json(raw)
                .and_then(|raw| parse_filter(&raw, field.field_type(), field.indexed()));
            match parsed {
                Ok(filter) => self.query.add_filter(field, filter),
                Err(err) => self.errors.push(format!("{key}: {err}")),
            }
        }
    }

    /// Zero, negative and null mean "use the default".
    fn positive(&mut self, key: &str, value: &Value) -> Option<u64> {
        let parsed = match value {
            Value::Null => return None,
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_u64().map(|n| i64::try_from(n).unwrap_or(i64::MAX))),
            Value::String(raw) if raw.trim().is_empty() => return None,
            Value::String(raw) => raw.trim().parse::<i64>().ok(),
            _ => None,
        };

        match parsed {
            Some(n) if n > 0 => u64::try_from(n).ok(),
            Some(_) => None,
            None => {
                self.errors.push(format!("{key} must be an integer"));
                None
            }
        }
    }

    /// Comma-separated strings, or arrays of them
    fn tokens(&mut self, key: &str, value: &Value) -> Vec<String> {
        let mut tokens = Vec::new();
        let items = match value {
            Value::Array(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        for item in items {
            match item {
                Value::String(raw) => tokens.extend(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|token| !token.is_empty())
                        .map(str::to_string),
                ),
                Value::Null => {}
                _ => self
                    .errors
                    .push(format!("{key} must be a string or a list of strings")),
            }
        }
        tokens
    }

    fn finish(mut self) -> Result<FindQuery<F>, CrudError> {
        self.errors.extend(validate_filters(&self.query.filters));
        if self.errors.is_empty() {
            Ok(self.query)
        } else {
            Err(CrudError::validation_failed(self.errors))
        }
    }
}
