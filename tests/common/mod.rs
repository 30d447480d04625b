#![allow(dead_code)]

use chrono::Utc;
use crudengine::validation::validators;
use crudengine::{
    ColumnPath, Crud, CrudResource, CrudSettings, EntityConfig, EntityFields, JoinSpec,
    MergeIntoActiveModel, Principal, RelationalMapping, SortBy, SqlField, Validatable,
    ValidationErrors,
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, DbErr};
use sea_orm_migration::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod user {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod place {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "places")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub title: String,
        pub visits: i32,
        pub lat: f64,
        pub owner_id: Option<Uuid>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// places -> owner (users)
const OWNER: JoinSpec = JoinSpec {
    relation: "owner",
    level: 1,
    table: "users",
    on: (
        ColumnPath::new("places", "owner_id"),
        ColumnPath::new("owner", "id"),
    ),
};

crudengine::field_set! {
    pub enum PlaceSelect {
        Id => "id",
        Title => "title",
        Visits => "visits",
        Lat => "lat",
        OwnerId => "ownerId",
        OwnerName => "ownerName",
        CreatedAt => "createdAt",
    }
}

crudengine::field_set! {
    pub enum PlaceSort {
        Title => "title",
        Visits => "visits",
        CreatedAt => "createdAt",
        OwnerName => "ownerName",
    }
}

crudengine::searchable_fields! {
    pub enum PlaceSearch {
        Id => "id": Identifier,
        Title => "title": String + indexed,
        Visits => "visits": Integer,
        Lat => "lat": Float,
        OwnerId => "ownerId": Identifier,
        OwnerName => "ownerName": String,
        CreatedAt => "createdAt": DateTime,
    }
}

pub struct Place;

impl EntityFields for Place {
    type Selectable = PlaceSelect;
    type Sortable = PlaceSort;
    type Searchable = PlaceSearch;
}

fn places_column(column: &'static str) -> SqlField {
    SqlField::column("places", column)
}

impl RelationalMapping for Place {
    const TABLE: &'static str = "places";

    fn select_field(field: PlaceSelect) -> SqlField {
        match field {
            PlaceSelect::Id => places_column("id"),
            PlaceSelect::Title => places_column("title"),
            PlaceSelect::Visits => places_column("visits"),
            PlaceSelect::Lat => places_column("lat"),
            PlaceSelect::OwnerId => places_column("owner_id"),
            PlaceSelect::OwnerName => SqlField::column("owner", "name").joined(OWNER),
            PlaceSelect::CreatedAt => places_column("created_at"),
        }
    }

    fn sort_field(field: PlaceSort) -> SqlField {
        match field {
            PlaceSort::Title => places_column("title"),
            PlaceSort::Visits => places_column("visits"),
            PlaceSort::CreatedAt => places_column("created_at"),
            PlaceSort::OwnerName => SqlField::column("owner", "name").joined(OWNER),
        }
    }

    fn where_field(field: PlaceSearch) -> SqlField {
        match field {
            PlaceSearch::Id => places_column("id"),
            PlaceSearch::Title => places_column("title"),
            PlaceSearch::Visits => places_column("visits"),
            PlaceSearch::Lat => places_column("lat"),
            PlaceSearch::OwnerId => places_column("owner_id"),
            PlaceSearch::OwnerName => SqlField::column("owner", "name").joined(OWNER),
            PlaceSearch::CreatedAt => places_column("created_at"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRead {
    pub id: Uuid,
    pub title: String,
    pub visits: i32,
    pub lat: f64,
    pub owner_id: Option<Uuid>,
}

impl From<place::Model> for PlaceRead {
    fn from(model: place::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            visits: model.visits,
            lat: model.lat,
            owner_id: model.owner_id,
        }
    }
}

/// Wire form: `visits` may be omitted and the title is trimmed
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacePost {
    pub title: String,
    pub visits: Option<i32>,
    pub lat: f64,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct PlaceCreate {
    pub title: String,
    pub visits: i32,
    pub lat: f64,
    pub owner_id: Option<Uuid>,
}

impl From<PlacePost> for PlaceCreate {
    fn from(post: PlacePost) -> Self {
        Self {
            title: post.title.trim().to_string(),
            visits: post.visits.unwrap_or_default(),
            lat: post.lat,
            owner_id: post.owner_id,
        }
    }
}

impl From<PlaceCreate> for place::ActiveModel {
    fn from(create: PlaceCreate) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            title: Set(create.title),
            visits: Set(create.visits),
            lat: Set(create.lat),
            owner_id: Set(create.owner_id),
            created_at: Set(Utc::now()),
        }
    }
}

impl Validatable for PlaceCreate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(validators::required("title", &self.title));
        errors.check(validators::coordinate("lat", self.lat, 90.0));
        errors.check(validators::range("visits", self.visits, Some(0), None));
        errors.result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceUpdate {
    pub title: Option<String>,
    pub visits: Option<i32>,
    pub lat: Option<f64>,
    #[serde(default, with = "::crudengine::serde_with::rust::double_option")]
    pub owner_id: Option<Option<Uuid>>,
}

impl MergeIntoActiveModel<place::ActiveModel> for PlaceUpdate {
    fn merge_into_activemodel(self, mut existing: place::ActiveModel) -> Result<place::ActiveModel, DbErr> {
        if let Some(title) = self.title {
            existing.title = Set(title);
        }
        if let Some(visits) = self.visits {
            existing.visits = Set(visits);
        }
        if let Some(lat) = self.lat {
            existing.lat = Set(lat);
        }
        if let Some(owner_id) = self.owner_id {
            existing.owner_id = Set(owner_id);
        }
        Ok(existing)
    }
}

impl Validatable for PlaceUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(title) = &self.title {
            errors.check(validators::required("title", title));
        }
        if let Some(lat) = self.lat {
            errors.check(validators::coordinate("lat", lat, 90.0));
        }
        errors.result()
    }
}

impl CrudResource for Place {
    type Entity = place::Entity;
    type Model = place::Model;
    type ActiveModel = place::ActiveModel;
    type Read = PlaceRead;
    type Create = PlaceCreate;
    type Post = PlacePost;
    type Update = PlaceUpdate;
    type Put = PlaceUpdate;

    const ID_COLUMN: place::Column = place::Column::Id;
    const ID_FIELD: PlaceSearch = PlaceSearch::Id;
    const RESOURCE_NAME_SINGULAR: &'static str = "Place";
    const RESOURCE_NAME_PLURAL: &'static str = "Places";

    fn owner_field() -> Option<PlaceSearch> {
        Some(PlaceSearch::OwnerId)
    }

    fn owner_of(model: &place::Model) -> Option<Uuid> {
        model.owner_id
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub admin: bool,
}

impl TestUser {
    pub fn regular(id: Uuid) -> Self {
        Self { id, admin: false }
    }

    pub fn admin() -> Self {
        Self {
            id: Uuid::new_v4(),
            admin: true,
        }
    }
}

impl Principal for TestUser {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_admin(&self) -> bool {
        self.admin
    }
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateTables)]
    }
}

pub struct CreateTables;

impl MigrationName for CreateTables {
    fn name(&self) -> &'static str {
        "m20250101_000001_create_users_and_places"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateTables {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = sea_orm::Schema::new(manager.get_database_backend());
        manager
            .create_table(schema.create_table_from_entity(user::Entity))
            .await?;
        manager
            .create_table(schema.create_table_from_entity(place::Entity))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(place::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(user::Entity).to_owned())
            .await?;
        Ok(())
    }
}

pub async fn setup_test_db() -> DatabaseConnection {
    // Already set by an earlier test in the same binary
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect to in-memory sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

/// Engine with alphabetical default order and the default hooks
pub fn places(db: &DatabaseConnection) -> Crud<Place> {
    Crud::new(db.clone(), CrudSettings::default()).with_config(EntityConfig {
        default_sort: vec![SortBy::asc(PlaceSort::Title)],
        ..EntityConfig::default()
    })
}

pub async fn seed_user(db: &DatabaseConnection, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    user::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await
    .expect("insert user");
    id
}

pub fn post(title: &str, visits: i32, owner_id: Option<Uuid>) -> PlacePost {
    PlacePost {
        title: title.to_string(),
        visits: Some(visits),
        lat: 51.48,
        owner_id,
    }
}

pub async fn seed_places(places: &Crud<Place>, titles: &[&str], owner_id: Option<Uuid>) -> Vec<PlaceRead> {
    let mut created = Vec::new();
    for (visits, title) in (0..).zip(titles) {
        created.push(
            places
                .create(post(title, visits, owner_id))
                .await
                .expect("create place"),
        );
    }
    created
}
