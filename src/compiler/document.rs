use std::marker::PhantomData;

use chrono::SecondsFormat;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::Compiler;
use crate::errors::CrudError;
use crate::fields::{EntityFields, FieldSet};
use crate::filtering::{Filter, FilterOperation, FilterValue};
use crate::pagination::Pagination;
use crate::query::{FindQuery, SortOrder};

/// Field-to-path mapping for a document store.
///
/// Paths default to the wire name, except `id` which maps to [`DocumentMapping::ID_PATH`].
/// Override a method to alias a field, e.g. a flattened `lat` to `location.coordinates.1`.
pub trait DocumentMapping: EntityFields {
    const ID_PATH: &'static str = "_id";

    fn document_path(field: Self::Searchable) -> String {
        default_path::<Self>(field.name())
    }

    fn projection_path(field: Self::Selectable) -> String {
        default_path::<Self>(field.name())
    }

    fn sort_path(field: Self::Sortable) -> String {
        default_path::<Self>(field.name())
    }

    /// Projection used when nothing is selected
    fn default_projection() -> IndexMap<String, i32> {
        IndexMap::from([("__v".to_string(), 0)])
    }
}

fn default_path<M: DocumentMapping + ?Sized>(name: &str) -> String {
    if name == "id" {
        M::ID_PATH.to_string()
    } else {
        name.to_string()
    }
}

/// Document stores cannot mix inclusion and exclusion, so a projection is one or the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Projection {
    Exclude(IndexMap<String, i32>),
    Include(IndexMap<String, i32>),
}

impl Projection {
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, i32> {
        match self {
            Self::Exclude(fields) | Self::Include(fields) => fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentQuery {
    pub skip: u64,
    pub limit: u64,
    pub sort: IndexMap<String, i32>,
    pub filter: Value,
    pub projection: Projection,
}

pub struct DocumentCompiler<M: DocumentMapping> {
    default_size: u64,
    max_size: u64,
    default_sort: IndexMap<String, i32>,
    exclude_id: bool,
    _mapping: PhantomData<M>,
}

impl<M: DocumentMapping> Default for DocumentCompiler<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: DocumentMapping> DocumentCompiler<M> {
    /// Newest first by `createdAt` unless told otherwise
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_size: crate::config::DEFAULT_MAX_PAGE_SIZE,
            max_size: crate::config::DEFAULT_MAX_PAGE_SIZE,
            default_sort: IndexMap::from([("createdAt".to_string(), SortOrder::Desc.signum())]),
            exclude_id: false,
            _mapping: PhantomData,
        }
    }

    #[must_use]
    pub fn with_page_sizes(mut self, default_size: u64, max_size: u64) -> Self {
        self.max_size = max_size.max(1);
        self.default_size = default_size.clamp(1, self.max_size);
        self
    }

    #[must_use]
    pub fn with_default_sort(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.default_sort = IndexMap::from([(path.into(), order.signum())]);
        self
    }

    /// Leave the identifier out of inclusive projections unless it was selected
    #[must_use]
    pub fn exclude_id(mut self) -> Self {
        self.exclude_id = true;
        self
    }

    fn projection(&self, query: &FindQuery<M>) -> Projection {
        if query.select.is_empty() {
            return Projection::Exclude(M::default_projection());
        }

        let mut fields: IndexMap<String, i32> = query
            .select
            .iter()
            .map(|field| (M::projection_path(*field), 1))
            .collect();
        if !fields.contains_key(M::ID_PATH) {
            fields.insert(M::ID_PATH.to_string(), i32::from(!self.exclude_id));
        }
        Projection::Include(fields)
    }

    fn sort(&self, query: &FindQuery<M>) -> IndexMap<String, i32> {
        if query.sort.is_empty() {
            return self.default_sort.clone();
        }
        let mut sort = IndexMap::new();
        for entry in &query.sort {
            sort.entry(M::sort_path(entry.field))
                .or_insert(entry.order.signum());
        }
        sort
    }

    fn filter(query: &FindQuery<M>) -> Value {
        let mut document = Map::new();
        let mut extra: Vec<Value> = Vec::new();

        for (field, filters) in &query.filters {
            let path = M::document_path(*field);
            let mut operators = Map::new();
            for filter in filters {
                if filter.op() == FilterOperation::Text {
                    document.insert("$text".to_string(), json!({ "$search": operand(filter.val()) }));
                    continue;
                }
                let translated = translate(filter);
                if translated.iter().any(|(token, _)| operators.contains_key(token)) {
                    let clause: Map<String, Value> = translated.into_iter().collect();
                    extra.push(json!({ path.clone(): clause }));
                } else {
                    operators.extend(translated);
                }
            }
            if !operators.is_empty() {
                document.insert(path, Value::Object(operators));
            }
        }

        if !extra.is_empty() {
            document.insert("$and".to_string(), Value::Array(extra));
        }
        Value::Object(document)
    }
}

impl<M: DocumentMapping> Compiler<M> for DocumentCompiler<M> {
    type Output = DocumentQuery;

    fn compile(&self, query: &FindQuery<M>) -> Result<DocumentQuery, CrudError> {
        query.validate()?;
        let pagination: Pagination = query.pagination(self.default_size, self.max_size);

        Ok(DocumentQuery {
            skip: pagination.skip(),
            limit: pagination.size,
            sort: self.sort(query),
            filter: Self::filter(query),
            projection: self.projection(query),
        })
    }
}

/// Store-native `$op` tokens for one filter
fn translate(filter: &Filter) -> Vec<(String, Value)> {
    let val = filter.val();
    let token = |op: &str| format!("${op}");

    match filter.op() {
        FilterOperation::Like => vec![(token("regex"), Value::String(regex::escape(text(val))))],
        FilterOperation::Ilike => vec![
            (token("regex"), Value::String(regex::escape(text(val)))),
            (token("options"), Value::String("i".to_string())),
        ],
        FilterOperation::Regex => vec![
            (token("regex"), Value::String(text(val).to_string())),
            (token("options"), Value::String("i".to_string())),
        ],
        FilterOperation::Null => {
            let op = if val.as_bool() == Some(true) { "eq" } else { "ne" };
            vec![(token(op), Value::Null)]
        }
        FilterOperation::Exists => vec![(token("exists"), Value::Bool(val.as_bool() == Some(true)))],
        op => vec![(token(op.as_str()), operand(val))],
    }
}

fn text(value: &FilterValue) -> &str {
    value.as_text().unwrap_or_default()
}

fn operand(value: &FilterValue) -> Value {
    match value {
        FilterValue::Integer(v) => json!(v),
        FilterValue::Float(v) => json!(v),
        FilterValue::Text(v) => json!(v),
        FilterValue::Boolean(v) => json!(v),
        FilterValue::DateTime(v) => json!({ "$date": v.to_rfc3339_opts(SecondsFormat::Millis, true) }),
        FilterValue::Uuid(v) => json!(v.to_string()),
        FilterValue::List(items) => Value::Array(items.iter().map(operand).collect()),
    }
}
