use std::marker::PhantomData;

use indexmap::IndexMap;
use sea_orm::{
    DatabaseBackend, Value,
    sea_query::{
        Alias, Asterisk, BinOper, Cond, Expr, ExprTrait, Func, JoinType, LikeExpr, Order, Query,
        SelectStatement, SimpleExpr,
    },
};

use super::{Compiler, escape_like_wildcards};
use crate::errors::CrudError;
use crate::fields::{EntityFields, FieldSet};
use crate::filtering::{Filter, FilterOperation, FilterValue};
use crate::pagination::Pagination;
use crate::query::{FindQuery, SortBy, SortOrder};

/// `table.column`, where `table` is the base table or a join alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPath {
    pub table: &'static str,
    pub column: &'static str,
}

impl ColumnPath {
    #[must_use]
    pub const fn new(table: &'static str, column: &'static str) -> Self {
        Self { table, column }
    }

    fn expr(self) -> SimpleExpr {
        Expr::col((Alias::new(self.table), Alias::new(self.column))).into()
    }
}

/// A LEFT JOIN needed to reach a column.
///
/// Joins are identified by `relation`, which is also the alias the joined table is known by.
/// `level` is the depth of the relation: 1 for a direct relation of the base table, 2 for a
/// relation of that relation, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec {
    pub relation: &'static str,
    pub level: u8,
    pub table: &'static str,
    /// Parent column, then the joined column
    pub on: (ColumnPath, ColumnPath),
}

/// Where a whitelisted field lives in SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlField {
    pub column: ColumnPath,
    pub joins: Vec<JoinSpec>,
}

impl SqlField {
    /// A column of the base table, or of a table reached through `joined`
    #[must_use]
    pub fn column(table: &'static str, column: &'static str) -> Self {
        Self {
            column: ColumnPath::new(table, column),
            joins: Vec::new(),
        }
    }

    #[must_use]
    pub fn joined(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }
}

/// Field-to-column mapping of one entity.
///
/// Every whitelisted field resolves to exactly one column; the mapping is total over the field
/// enumerations, so unknown names never reach SQL.
pub trait RelationalMapping: EntityFields {
    const TABLE: &'static str;

    fn select_field(field: Self::Selectable) -> SqlField;
    fn sort_field(field: Self::Sortable) -> SqlField;
    fn where_field(field: Self::Searchable) -> SqlField;
}

/// Compiled page and count statements. Both share the same WHERE clause.
#[derive(Debug, Clone)]
pub struct RelationalQuery {
    pub select: SelectStatement,
    /// Yields a single `total` column
    pub count: SelectStatement,
    pub pagination: Pagination,
}

pub struct RelationalCompiler<M: RelationalMapping> {
    backend: DatabaseBackend,
    default_size: u64,
    max_size: u64,
    default_sort: Vec<SortBy<M::Sortable>>,
    _mapping: PhantomData<M>,
}

impl<M: RelationalMapping> RelationalCompiler<M> {
    #[must_use]
    pub fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            default_size: crate::config::DEFAULT_MAX_PAGE_SIZE,
            max_size: crate::config::DEFAULT_MAX_PAGE_SIZE,
            default_sort: Vec::new(),
            _mapping: PhantomData,
        }
    }

    #[must_use]
    pub fn with_page_sizes(mut self, default_size: u64, max_size: u64) -> Self {
        self.max_size = max_size.max(1);
        self.default_size = default_size.clamp(1, self.max_size);
        self
    }

    /// Ordering used when a query has no sort of its own
    #[must_use]
    pub fn with_default_sort(mut self, sort: Vec<SortBy<M::Sortable>>) -> Self {
        self.default_sort = sort;
        self
    }

    #[must_use]
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    fn condition(
        &self,
        name: &str,
        column: ColumnPath,
        filter: &Filter,
    ) -> Result<Option<SimpleExpr>, CrudError> {
        let col = column.expr();
        let val = filter.val();

        let expr = match filter.op() {
            FilterOperation::Eq => col.eq(scalar(val)?),
            FilterOperation::Ne => col.ne(scalar(val)?),
            FilterOperation::Gt => col.gt(scalar(val)?),
            FilterOperation::Gte => col.gte(scalar(val)?),
            FilterOperation::Lt => col.lt(scalar(val)?),
            FilterOperation::Lte => col.lte(scalar(val)?),
            FilterOperation::In => {
                let values = list(val)?;
                if values.is_empty() {
                    // An empty membership test matches nothing.
                    Expr::val(1).eq(2)
                } else {
                    col.is_in(values)
                }
            }
            FilterOperation::Nin => {
                let values = list(val)?;
                if values.is_empty() {
                    return Ok(None);
                }
                col.is_not_in(values)
            }
            FilterOperation::Null | FilterOperation::Exists => {
                let wants_null = (filter.op() == FilterOperation::Null) == flag(val)?;
                if wants_null {
                    col.is_null()
                } else {
                    col.is_not_null()
                }
            }
            FilterOperation::Like => match self.backend {
                // SQLite's LIKE folds ASCII case.
                DatabaseBackend::Sqlite => SimpleExpr::from(
                    Func::cust(Alias::new("INSTR")).args([col, Expr::val(text(val)?).into()]),
                )
                .gt(0),
                _ => col.like(LikeExpr::new(contains_pattern(text(val)?)).escape('\\')),
            },
            FilterOperation::Ilike => case_insensitive_contains(col, text(val)?),
            FilterOperation::Regex => {
                let operator = match self.backend {
                    DatabaseBackend::Postgres => "~*",
                    DatabaseBackend::Sqlite => {
                        return Err(CrudError::invalid(format!(
                            "{name}: regex is not supported on this backend"
                        )));
                    }
                    _ => "REGEXP",
                };
                SimpleExpr::Binary(
                    Box::new(col),
                    BinOper::Custom(operator),
                    Box::new(Value::from(text(val)?.to_string()).into()),
                )
            }
            FilterOperation::Text => match self.backend {
                DatabaseBackend::Postgres => Expr::cust_with_exprs(
                    "to_tsvector('simple', $1) @@ plainto_tsquery('simple', $2)",
                    [col, Value::from(text(val)?.to_string()).into()],
                ),
                _ => case_insensitive_contains(col, text(val)?),
            },
        };
        Ok(Some(expr))
    }
}

impl<M: RelationalMapping> Compiler<M> for RelationalCompiler<M> {
    type Output = RelationalQuery;

    fn compile(&self, query: &FindQuery<M>) -> Result<RelationalQuery, CrudError> {
        query.validate()?;
        let pagination = query.pagination(self.default_size, self.max_size);

        let selected: Vec<(&'static str, SqlField)> = query
            .select
            .iter()
            .map(|field| (FieldSet::name(*field), M::select_field(*field)))
            .collect();

        let sorts = if query.sort.is_empty() {
            &self.default_sort
        } else {
            &query.sort
        };
        let ordered: Vec<(SortOrder, SqlField)> = sorts
            .iter()
            .map(|sort| (sort.order, M::sort_field(sort.field)))
            .collect();

        let mut conditions = Cond::all();
        let mut filtered: Vec<SqlField> = Vec::new();
        for (field, filters) in &query.filters {
            if filters.is_empty() {
                continue;
            }
            let sql = M::where_field(*field);
            for filter in filters {
                if let Some(expr) = self.condition(FieldSet::name(*field), sql.column, filter)? {
                    conditions = conditions.add(expr);
                }
            }
            filtered.push(sql);
        }

        let mut count = Query::select();
        count.from(Alias::new(M::TABLE));
        apply_joins(&mut count, filtered.iter());
        count.expr_as(Func::count(Expr::col(Asterisk)), Alias::new("total"));
        if !conditions.is_empty() {
            count.cond_where(conditions.clone());
        }

        let mut select = Query::select();
        select.from(Alias::new(M::TABLE));
        apply_joins(
            &mut select,
            selected
                .iter()
                .map(|(_, sql)| sql)
                .chain(ordered.iter().map(|(_, sql)| sql))
                .chain(filtered.iter()),
        );

        if selected.is_empty() {
            select.column((Alias::new(M::TABLE), Asterisk));
        } else {
            for (name, sql) in &selected {
                select.expr_as(sql.column.expr(), Alias::new(*name));
            }
        }

        if !conditions.is_empty() {
            select.cond_where(conditions);
        }
        for (order, sql) in &ordered {
            let order = match order {
                SortOrder::Asc => Order::Asc,
                SortOrder::Desc => Order::Desc,
            };
            select.order_by((Alias::new(sql.column.table), Alias::new(sql.column.column)), order);
        }
        select.limit(pagination.size).offset(pagination.skip());

        Ok(RelationalQuery {
            select,
            count,
            pagination,
        })
    }
}

/// Deduplicate by relation (first declaration wins) and emit parents before children.
fn ordered_joins<'a>(fields: impl Iterator<Item = &'a SqlField>) -> Vec<JoinSpec> {
    let mut unique: IndexMap<&'static str, JoinSpec> = IndexMap::new();
    for join in fields.flat_map(|field| field.joins.iter()) {
        unique.entry(join.relation).or_insert(*join);
    }
    let mut joins: Vec<JoinSpec> = unique.into_values().collect();
    joins.sort_by_key(|join| join.level);
    joins
}

fn apply_joins<'a>(statement: &mut SelectStatement, fields: impl Iterator<Item = &'a SqlField>) {
    for join in ordered_joins(fields) {
        let (parent, child) = join.on;
        statement.join_as(
            JoinType::LeftJoin,
            Alias::new(join.table),
            Alias::new(join.relation),
            Expr::col((Alias::new(parent.table), Alias::new(parent.column)))
                .equals((Alias::new(child.table), Alias::new(child.column))),
        );
    }
}

fn contains_pattern(text: &str) -> String {
    format!("%{}%", escape_like_wildcards(text))
}

/// `UPPER(col) LIKE UPPER(pattern)`, so both sides fold through the same database function
fn case_insensitive_contains(col: SimpleExpr, needle: &str) -> SimpleExpr {
    let pattern = SimpleExpr::Binary(
        Box::new(Func::upper(Expr::val(contains_pattern(needle))).into()),
        BinOper::Escape,
        Box::new(SimpleExpr::Constant('\\'.into())),
    );
    SimpleExpr::from(Func::upper(col)).binary(BinOper::Like, pattern)
}

fn scalar(value: &FilterValue) -> Result<Value, CrudError> {
    Ok(match value {
        FilterValue::Integer(v) => Value::from(*v),
        FilterValue::Float(v) => Value::from(*v),
        FilterValue::Text(v) => Value::from(v.clone()),
        FilterValue::Boolean(v) => Value::from(*v),
        FilterValue::DateTime(v) => Value::from(*v),
        FilterValue::Uuid(v) => Value::from(*v),
        FilterValue::List(_) => {
            return Err(CrudError::internal(
                "Filter operand has the wrong shape",
                Some("list operand given to a scalar operator".to_string()),
            ));
        }
    })
}

fn list(value: &FilterValue) -> Result<Vec<Value>, CrudError> {
    match value {
        FilterValue::List(items) => items.iter().map(scalar).collect(),
        other => Ok(vec![scalar(other)?]),
    }
}

fn flag(value: &FilterValue) -> Result<bool, CrudError> {
    value
        .as_bool()
        .ok_or_else(|| CrudError::internal("Filter operand has the wrong shape", None))
}

fn text(value: &FilterValue) -> Result<&str, CrudError> {
    value
        .as_text()
        .ok_or_else(|| CrudError::internal("Filter operand has the wrong shape", None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortBy;

    // comments -> post (1) -> author (2)
    const POST: JoinSpec = JoinSpec {
        relation: "post",
        level: 1,
        table: "posts",
        on: (
            ColumnPath::new("comments", "post_id"),
            ColumnPath::new("post", "id"),
        ),
    };
    const AUTHOR: JoinSpec = JoinSpec {
        relation: "author",
        level: 2,
        table: "users",
        on: (
            ColumnPath::new("post", "author_id"),
            ColumnPath::new("author", "id"),
        ),
    };

    crate::field_set! {
        enum Selectable {
            Id => "id",
            Body => "body",
            PostTitle => "postTitle",
            AuthorName => "authorName",
        }
    }

    crate::searchable_fields! {
        enum Searchable {
            Id => "id": Identifier,
            Body => "body": String + indexed,
            Score => "score": Integer,
            AuthorName => "authorName": String,
        }
    }

    struct Comments;

    impl EntityFields for Comments {
        type Selectable = Selectable;
        type Sortable = Selectable;
        type Searchable = Searchable;
    }

    impl RelationalMapping for Comments {
        const TABLE: &'static str = "comments";

        fn select_field(field: Selectable) -> SqlField {
            match field {
                Selectable::Id => SqlField::column("comments", "id"),
                Selectable::Body => SqlField::column("comments", "body"),
                Selectable::PostTitle => SqlField::column("post", "title").joined(POST),
                Selectable::AuthorName => SqlField::column("author", "name")
                    .joined(AUTHOR)
                    .joined(POST),
            }
        }

        fn sort_field(field: Selectable) -> SqlField {
            Self::select_field(field)
        }

        fn where_field(field: Searchable) -> SqlField {
            match field {
                Searchable::Id => SqlField::column("comments", "id"),
                Searchable::Body => SqlField::column("comments", "body"),
                Searchable::Score => SqlField::column("comments", "score"),
                Searchable::AuthorName => SqlField::column("author", "name")
                    .joined(POST)
                    .joined(AUTHOR),
            }
        }
    }

    fn sql(backend: DatabaseBackend, query: &FindQuery<Comments>) -> (String, String) {
        let compiled = RelationalCompiler::<Comments>::new(backend)
            .compile(query)
            .unwrap();
        (
            backend.build(&compiled.select).to_string(),
            backend.build(&compiled.count).to_string(),
        )
    }

    fn parse(raw: &str) -> FindQuery<Comments> {
        FindQuery::from_query_string(raw).unwrap()
    }

    #[test]
    fn test_empty_select_takes_whole_base_row() {
        let (select, count) = sql(DatabaseBackend::Sqlite, &parse("page=3&size=10"));
        assert_eq!(
            select,
            r#"SELECT "comments".* FROM "comments" LIMIT 10 OFFSET 20"#
        );
        assert_eq!(count, r#"SELECT COUNT(*) AS "total" FROM "comments""#);
    }

    #[test]
    fn test_joins_deduplicated_and_parent_first() {
        let (select, _) = sql(
            DatabaseBackend::Sqlite,
            &parse("fields=authorName,postTitle&sort=-authorName"),
        );
        let post = select.find(r#"LEFT JOIN "posts" AS "post""#).unwrap();
        let author = select.find(r#"LEFT JOIN "users" AS "author""#).unwrap();
        assert!(post < author, "{select}");
        assert_eq!(select.matches("LEFT JOIN").count(), 2, "{select}");
        assert!(select.contains(r#""author"."name" AS "authorName""#));
        assert!(select.contains(r#"ORDER BY "author"."name" DESC"#));
    }

    #[test]
    fn test_count_only_joins_what_where_needs() {
        let (_, count) = sql(DatabaseBackend::Sqlite, &parse("fields=postTitle&score=gte:3"));
        assert!(!count.contains("JOIN"), "{count}");

        let (_, count) = sql(DatabaseBackend::Sqlite, &parse("authorName=Ada"));
        assert_eq!(count.matches("LEFT JOIN").count(), 2, "{count}");
        assert!(count.contains(r#"WHERE "author"."name" = 'Ada'"#), "{count}");
    }

    #[test]
    fn test_where_operators() {
        let query = FindQuery::from_json(&serde_json::json!({
            "score": ["gt:1", "lte:9"],
            "body": {"op": "ilike", "val": "50%_off"}
        }))
        .unwrap();
        let compiled = RelationalCompiler::<Comments>::new(DatabaseBackend::Sqlite)
            .compile(&query)
            .unwrap();
        let statement = DatabaseBackend::Sqlite.build(&compiled.select);
        let values = statement.values.map(|values| values.0).unwrap_or_default();

        assert!(statement.sql.contains(r#""comments"."score" > ?"#), "{}", statement.sql);
        assert!(statement.sql.contains(r#""comments"."score" <= ?"#), "{}", statement.sql);
        assert!(
            statement
                .sql
                .contains(r#"UPPER("comments"."body") LIKE UPPER(?) ESCAPE '\'"#),
            "{}",
            statement.sql
        );
        assert!(values.contains(&Value::from(1_i64)), "{values:?}");
        assert!(values.contains(&Value::from(9_i64)), "{values:?}");
        // Wildcards in the needle are escaped, its case is left to the database.
        assert!(values.contains(&Value::from(r"%50\%\_off%")), "{values:?}");
    }

    #[test]
    fn test_sqlite_like_is_case_sensitive_instr() {
        let compiled = RelationalCompiler::<Comments>::new(DatabaseBackend::Sqlite)
            .compile(&parse("body=like:Blue"))
            .unwrap();
        let statement = DatabaseBackend::Sqlite.build(&compiled.select);
        assert!(
            statement.sql.contains(r#"INSTR("comments"."body", ?) > ?"#),
            "{}",
            statement.sql
        );

        let (select, _) = sql(DatabaseBackend::Postgres, &parse("body=like:Blue"));
        assert!(select.contains(r#""comments"."body" LIKE '%Blue%'"#), "{select}");
    }

    #[test]
    fn test_sqlite_rejects_regex() {
        let err = RelationalCompiler::<Comments>::new(DatabaseBackend::Sqlite)
            .compile(&parse("body=regex:^re"))
            .unwrap_err();
        match err {
            CrudError::ValidationFailed { errors } => {
                assert_eq!(errors, ["body: regex is not supported on this backend"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_in_matches_nothing_and_empty_nin_everything() {
        let (select, _) = sql(DatabaseBackend::Sqlite, &parse("score=in:"));
        assert!(select.contains("WHERE 1 = 2"), "{select}");

        let (select, _) = sql(DatabaseBackend::Sqlite, &parse("score=nin:"));
        assert!(!select.contains("WHERE"), "{select}");
    }

    #[test]
    fn test_null_and_exists() {
        let (select, _) = sql(DatabaseBackend::Sqlite, &parse("body=null:true"));
        assert!(select.contains(r#""comments"."body" IS NULL"#), "{select}");
        let (select, _) = sql(DatabaseBackend::Sqlite, &parse("body=exists:true"));
        assert!(select.contains(r#""comments"."body" IS NOT NULL"#), "{select}");
        let (select, _) = sql(DatabaseBackend::Sqlite, &parse("body=exists:false"));
        assert!(select.contains(r#""comments"."body" IS NULL"#), "{select}");
    }

    #[test]
    fn test_backend_specific_operators() {
        let (select, _) = sql(DatabaseBackend::Postgres, &parse("body=regex:^re"));
        assert!(select.contains(r#""comments"."body" ~* '^re'"#), "{select}");
        let (select, _) = sql(DatabaseBackend::MySql, &parse("body=regex:^re"));
        assert!(select.contains("`comments`.`body` REGEXP '^re'"), "{select}");

        let (select, _) = sql(DatabaseBackend::Postgres, &parse("body=text:blue+moon"));
        assert!(
            select.contains(
                r#"to_tsvector('simple', "comments"."body") @@ plainto_tsquery('simple', 'blue moon')"#
            ),
            "{select}"
        );
    }

    #[test]
    fn test_default_sort_applies_only_without_query_sort() {
        let compiler = RelationalCompiler::<Comments>::new(DatabaseBackend::Sqlite)
            .with_default_sort(vec![SortBy::desc(Selectable::Id)]);

        let compiled = compiler.compile(&parse("")).unwrap();
        let select = DatabaseBackend::Sqlite.build(&compiled.select).to_string();
        assert!(select.contains(r#"ORDER BY "comments"."id" DESC"#), "{select}");

        let compiled = compiler.compile(&parse("sort=body")).unwrap();
        let select = DatabaseBackend::Sqlite.build(&compiled.select).to_string();
        assert!(select.contains(r#"ORDER BY "comments"."body" ASC"#), "{select}");
        assert!(!select.contains(r#""comments"."id" DESC"#), "{select}");
    }

    #[test]
    fn test_page_size_clamped() {
        let compiler = RelationalCompiler::<Comments>::new(DatabaseBackend::Sqlite)
            .with_page_sizes(5, 20);
        assert_eq!(compiler.compile(&parse("size=500")).unwrap().pagination.size, 20);
        assert_eq!(compiler.compile(&parse("")).unwrap().pagination.size, 5);
    }

    #[test]
    fn test_programmatic_query_is_validated() {
        let query = FindQuery::<Comments>::new()
            .filter(Searchable::Score, Filter::new(FilterOperation::Like, "x").unwrap());
        assert!(matches!(
            RelationalCompiler::new(DatabaseBackend::Sqlite).compile(&query),
            Err(CrudError::ValidationFailed { .. })
        ));
    }
}
