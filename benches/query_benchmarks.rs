/*!
# Query Benchmarks

Parsing and compilation cost of a `FindQuery`, without a database.

```bash
cargo bench --bench query_benchmarks
cargo bench --bench query_benchmarks -- "Compile"
```

HTML reports are generated in `target/criterion/report/index.html`.
*/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use crudengine::{
    ColumnPath, Compiler, DocumentCompiler, DocumentMapping, EntityFields, FindQuery, JoinSpec,
    RelationalCompiler, RelationalMapping, SqlField,
};
use sea_orm::DatabaseBackend;
use serde_json::json;
use std::hint::black_box;

crudengine::field_set! {
    pub enum PostSelect {
        Id => "id",
        Title => "title",
        Views => "views",
        AuthorName => "authorName",
    }
}

crudengine::field_set! {
    pub enum PostSort {
        Title => "title",
        Views => "views",
        CreatedAt => "createdAt",
        AuthorName => "authorName",
    }
}

crudengine::searchable_fields! {
    pub enum PostSearch {
        Id => "id": Identifier,
        Title => "title": String + indexed,
        Views => "views": Integer,
        Published => "published": Boolean,
        CreatedAt => "createdAt": DateTime,
        AuthorName => "authorName": String,
    }
}

struct Post;

impl EntityFields for Post {
    type Selectable = PostSelect;
    type Sortable = PostSort;
    type Searchable = PostSearch;
}

const AUTHOR: JoinSpec = JoinSpec {
    relation: "author",
    level: 1,
    table: "users",
    on: (
        ColumnPath::new("posts", "author_id"),
        ColumnPath::new("author", "id"),
    ),
};

impl RelationalMapping for Post {
    const TABLE: &'static str = "posts";

    fn select_field(field: PostSelect) -> SqlField {
        match field {
            PostSelect::Id => SqlField::column("posts", "id"),
            PostSelect::Title => SqlField::column("posts", "title"),
            PostSelect::Views => SqlField::column("posts", "views"),
            PostSelect::AuthorName => SqlField::column("author", "name").joined(AUTHOR),
        }
    }

    fn sort_field(field: PostSort) -> SqlField {
        match field {
            PostSort::Title => SqlField::column("posts", "title"),
            PostSort::Views => SqlField::column("posts", "views"),
            PostSort::CreatedAt => SqlField::column("posts", "created_at"),
            PostSort::AuthorName => SqlField::column("author", "name").joined(AUTHOR),
        }
    }

    fn where_field(field: PostSearch) -> SqlField {
        match field {
            PostSearch::Id => SqlField::column("posts", "id"),
            PostSearch::Title => SqlField::column("posts", "title"),
            PostSearch::Views => SqlField::column("posts", "views"),
            PostSearch::Published => SqlField::column("posts", "published"),
            PostSearch::CreatedAt => SqlField::column("posts", "created_at"),
            PostSearch::AuthorName => SqlField::column("author", "name").joined(AUTHOR),
        }
    }
}

impl DocumentMapping for Post {}

const QUERIES: [(&str, &str); 3] = [
    ("simple", "page=2&size=20"),
    ("filtered", "title=ilike:rust&views=gte:100&views=lt:5000&published=true&sort=-createdAt"),
    (
        "joined",
        "authorName=in:Ada,Grace,Linus&title=text:async&createdAt=gte:2024-01-01&fields=id,title,authorName&sort=authorName,-views",
    ),
];

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parse");

    for (name, raw) in QUERIES {
        group.bench_with_input(BenchmarkId::new("query_string", name), raw, |b, raw| {
            b.iter(|| FindQuery::<Post>::from_query_string(black_box(raw)));
        });
    }

    let body = json!({
        "page": 1,
        "size": 50,
        "sort": ["-views", "title"],
        "views": [{"op": "gt", "val": 10}, "lte:1000"],
        "id": {"op": "nin", "val": ["6f1c2a4e-8a53-4d8e-9a57-3f0a6e0f2b11"]}
    });
    group.bench_function("json_body", |b| {
        b.iter(|| FindQuery::<Post>::from_json(black_box(&body)));
    });

    group.finish();
}

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compile");
    let relational = RelationalCompiler::<Post>::new(DatabaseBackend::Sqlite);
    let document = DocumentCompiler::<Post>::new();

    for (name, raw) in QUERIES {
        let query = FindQuery::<Post>::from_query_string(raw).expect("benchmark query parses");

        group.bench_with_input(BenchmarkId::new("relational", name), &query, |b, query| {
            b.iter(|| {
                let compiled = relational.compile(black_box(query)).expect("compiles");
                DatabaseBackend::Sqlite.build(&compiled.select)
            });
        });
        group.bench_with_input(BenchmarkId::new("document", name), &query, |b, query| {
            b.iter(|| document.compile(black_box(query)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parsing, bench_compilation);
criterion_main!(benches);
