use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, FromQueryResult, IntoActiveModel, QueryFilter, SqlErr, TransactionTrait,
    sea_query::SelectStatement,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::hooks::{AuthTarget, CrudEvent, CrudHooks, HookFuture, Principal};
use super::pipeline::{process_in_chunks, with_deadline};
use super::traits::{CrudResource, MergeIntoActiveModel};
use crate::compiler::{Compiler, RelationalCompiler};
use crate::config::CrudSettings;
use crate::errors::CrudError;
use crate::filtering::Filter;
use crate::pagination::PaginatedResult;
use crate::query::{FindQuery, SortBy};
use crate::validation::Validatable;

/// Per-entity defaults
pub struct EntityConfig<R: CrudResource> {
    /// Fields projected by partial reads when the caller names none. Empty means every column.
    pub default_select: Vec<R::Selectable>,
    /// Ordering of searches that do not sort
    pub default_sort: Vec<SortBy<R::Sortable>>,
    /// Page size when `size` is absent, capped by [`CrudSettings::max_page_size`]
    pub page_size: Option<u64>,
}

impl<R: CrudResource> Default for EntityConfig<R> {
    fn default() -> Self {
        Self {
            default_select: Vec::new(),
            default_sort: Vec::new(),
            page_size: None,
        }
    }
}

impl<R: CrudResource> Clone for EntityConfig<R> {
    fn clone(&self) -> Self {
        Self {
            default_select: self.default_select.clone(),
            default_sort: self.default_sort.clone(),
            page_size: self.page_size,
        }
    }
}

/// Data access for one entity.
///
/// Cheap to clone; share one per entity through the router state.
///
/// ```rust,ignore
/// let places = Crud::<Place>::new(db.clone(), settings.clone())
///     .with_config(EntityConfig {
///         default_sort: vec![SortBy::desc(PlaceSort::CreatedAt)],
///         ..EntityConfig::default()
///     })
///     .with_hooks(CrudHooks::default().with_post_process(sign_photo_url));
///
/// let page = places.user_search(&user, query).await?;
/// ```
pub struct Crud<R: CrudResource> {
    db: DatabaseConnection,
    settings: CrudSettings,
    config: EntityConfig<R>,
    hooks: CrudHooks<R>,
}

impl<R: CrudResource> Clone for Crud<R> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            settings: self.settings.clone(),
            config: self.config.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<R: CrudResource> Crud<R> {
    #[must_use]
    pub fn new(db: DatabaseConnection, settings: CrudSettings) -> Self {
        Self {
            db,
            settings,
            config: EntityConfig::default(),
            hooks: CrudHooks::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EntityConfig<R>) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: CrudHooks<R>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    #[must_use]
    pub fn settings(&self) -> &CrudSettings {
        &self.settings
    }

    /// Parse a path segment into a record identifier.
    ///
    /// # Errors
    ///
    /// [`CrudError::BadRequest`] when `raw` is not a UUID.
    pub fn parse_id(raw: &str) -> Result<Uuid, CrudError> {
        Uuid::parse_str(raw.trim())
            .map_err(|_| CrudError::bad_request(format!("Invalid ID: \"{raw}\" is not a valid UUID")))
    }

    // Create

    /// Convert the form, validate, insert, and return the post-processed record.
    ///
    /// # Errors
    ///
    /// [`CrudError::ValidationFailed`] from the payload, [`CrudError::Conflict`] on a unique
    /// violation, [`CrudError::Database`] otherwise. Nothing is persisted on failure.
    pub async fn create(&self, post: R::Post) -> Result<R::Read, CrudError> {
        let create = (self.hooks.post_to_create)(post).await?;
        create.validate()?;
        let active: R::ActiveModel = create.into();

        let txn = self.begin().await?;
        let outcome = active.insert(&txn).await.map_err(Self::persistence_error);
        let model = finish(txn, outcome).await?;

        tracing::debug!(resource = R::RESOURCE_NAME_SINGULAR, "Record created");
        self.post_process(R::Read::from(model)).await
    }

    /// # Errors
    ///
    /// [`CrudError::Unauthorized`] from the auth check, then as [`Crud::create`].
    pub async fn user_create(
        &self,
        principal: &dyn Principal,
        post: R::Post,
    ) -> Result<R::Read, CrudError> {
        self.authorize(principal, AuthTarget::Post(&post), CrudEvent::Create)?;
        self.create(post).await
    }

    // Read

    /// # Errors
    ///
    /// [`CrudError::NotFound`] when no record has this id.
    pub async fn get(&self, id: Uuid) -> Result<R::Read, CrudError> {
        let model = self.load(&self.db, id).await?;
        self.post_process(R::Read::from(model)).await
    }

    /// Fetch only `fields` (the configured default select when empty) as a JSON object keyed by
    /// field name, run through `post_process_dict`.
    ///
    /// # Errors
    ///
    /// [`CrudError::NotFound`] when no record has this id.
    pub async fn get_partial(
        &self,
        id: Uuid,
        fields: &[R::Selectable],
    ) -> Result<JsonValue, CrudError> {
        let mut query = FindQuery::<R>::new()
            .filter(R::ID_FIELD, Filter::eq(id)?)
            .size(1);
        query.select = if fields.is_empty() {
            self.config.default_select.clone()
        } else {
            fields.to_vec()
        };

        let compiled = self.compiler().compile(&query)?;
        let row = self
            .rows::<JsonValue>(&compiled.select)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Self::not_found(id))?;

        with_deadline(
            self.settings.post_process_timeout,
            "post-processing",
            (self.hooks.post_process_dict)(row),
        )
        .await
    }

    /// # Errors
    ///
    /// [`CrudError::NotFound`], or [`CrudError::Unauthorized`] from the auth check.
    pub async fn user_get(&self, principal: &dyn Principal, id: Uuid) -> Result<R::Read, CrudError> {
        let model = self.load(&self.db, id).await?;
        self.authorize(principal, AuthTarget::Record(&model), CrudEvent::Read)?;
        self.post_process(R::Read::from(model)).await
    }

    /// # Errors
    ///
    /// As [`Crud::user_get`].
    pub async fn user_get_partial(
        &self,
        principal: &dyn Principal,
        id: Uuid,
        fields: &[R::Selectable],
    ) -> Result<JsonValue, CrudError> {
        let model = self.load(&self.db, id).await?;
        self.authorize(principal, AuthTarget::Record(&model), CrudEvent::Read)?;
        // Joined selectable fields are not on the model, so the projection is its own query.
        self.get_partial(id, fields).await
    }

    // Update

    /// Apply the fields present in `put`; absent fields stay, explicit nulls clear.
    ///
    /// # Errors
    ///
    /// [`CrudError::NotFound`], [`CrudError::ValidationFailed`], [`CrudError::Conflict`] or
    /// [`CrudError::Database`]. Nothing is persisted on failure.
    pub async fn update(&self, id: Uuid, put: R::Put) -> Result<R::Read, CrudError> {
        let update = (self.hooks.put_to_update)(put).await?;
        update.validate()?;

        let txn = self.begin().await?;
        let outcome = self.apply_update(&txn, id, update).await;
        let model = finish(txn, outcome).await?;

        tracing::debug!(resource = R::RESOURCE_NAME_SINGULAR, %id, "Record updated");
        self.post_process(R::Read::from(model)).await
    }

    /// The principal must pass the check on both the stored record and the form.
    ///
    /// # Errors
    ///
    /// [`CrudError::Unauthorized`] from the auth check, then as [`Crud::update`].
    pub async fn user_update(
        &self,
        principal: &dyn Principal,
        id: Uuid,
        put: R::Put,
    ) -> Result<R::Read, CrudError> {
        let model = self.load(&self.db, id).await?;
        self.authorize(principal, AuthTarget::Record(&model), CrudEvent::Update)?;
        self.authorize(principal, AuthTarget::Put(&put), CrudEvent::Update)?;
        self.update(id, put).await
    }

    async fn apply_update(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        update: R::Update,
    ) -> Result<R::Model, CrudError> {
        let existing: R::ActiveModel = self.load(txn, id).await?.into_active_model();
        let merged = update.merge_into_activemodel(existing)?;
        merged.update(txn).await.map_err(Self::persistence_error)
    }

    // Delete

    /// Delete the record, running the cleanup hooks around the transactional delete.
    ///
    /// Cleanup failures are logged and do not change the outcome.
    ///
    /// # Errors
    ///
    /// [`CrudError::NotFound`] or [`CrudError::Database`].
    pub async fn delete(&self, id: Uuid) -> Result<Uuid, CrudError> {
        let model = self.load(&self.db, id).await?;
        self.cleanup("before_delete", id, (self.hooks.before_delete)(model.clone()))
            .await;

        let txn = self.begin().await?;
        let outcome = match R::Entity::delete_many()
            .filter(R::ID_COLUMN.eq(id))
            .exec(&txn)
            .await
        {
            Ok(result) if result.rows_affected == 0 => Err(Self::not_found(id)),
            Ok(_) => Ok(()),
            Err(err) => Err(CrudError::database(err)),
        };
        finish(txn, outcome).await?;
        tracing::debug!(resource = R::RESOURCE_NAME_SINGULAR, %id, "Record deleted");

        self.cleanup("after_delete", id, (self.hooks.after_delete)(model))
            .await;
        Ok(id)
    }

    /// # Errors
    ///
    /// [`CrudError::Unauthorized`] from the auth check, then as [`Crud::delete`].
    pub async fn user_delete(&self, principal: &dyn Principal, id: Uuid) -> Result<Uuid, CrudError> {
        let model = self.load(&self.db, id).await?;
        self.authorize(principal, AuthTarget::Record(&model), CrudEvent::Delete)?;
        self.delete(id).await
    }

    // Search

    /// One page of whole records.
    ///
    /// `select` is ignored here since every `Read` needs the full row; see
    /// [`Crud::search_partial`] for projections.
    ///
    /// # Errors
    ///
    /// [`CrudError::ValidationFailed`] for an invalid query, [`CrudError::UpstreamTimeout`] when
    /// the query or post-processing exceeds its deadline, [`CrudError::Database`] otherwise.
    pub async fn search(&self, mut query: FindQuery<R>) -> Result<PaginatedResult<R::Read>, CrudError> {
        query.select.clear();
        let compiled = self.compiler().compile(&query)?;

        let total = self.total(&compiled.count).await?;
        let models: Vec<R::Model> = if compiled.pagination.skip() >= total {
            Vec::new()
        } else {
            self.rows(&compiled.select).await?
        };

        let data = process_in_chunks(
            models.into_iter().map(R::Read::from).collect(),
            self.settings.post_processing_batch_size,
            self.settings.post_process_timeout,
            |read| (self.hooks.post_process)(read),
        )
        .await?;

        tracing::debug!(
            resource = R::RESOURCE_NAME_PLURAL,
            page = compiled.pagination.page,
            size = compiled.pagination.size,
            total,
            "Search complete"
        );
        Ok(PaginatedResult::new(compiled.pagination, total, data))
    }

    /// Alias of [`Crud::search`].
    ///
    /// # Errors
    ///
    /// As [`Crud::search`].
    pub async fn fetch(&self, query: FindQuery<R>) -> Result<PaginatedResult<R::Read>, CrudError> {
        self.search(query).await
    }

    /// One page of projected rows, keyed by field name.
    ///
    /// # Errors
    ///
    /// As [`Crud::search`].
    pub async fn search_partial(
        &self,
        mut query: FindQuery<R>,
    ) -> Result<PaginatedResult<JsonValue>, CrudError> {
        if query.select.is_empty() {
            query.select.clone_from(&self.config.default_select);
        }
        let compiled = self.compiler().compile(&query)?;

        let total = self.total(&compiled.count).await?;
        let rows: Vec<JsonValue> = if compiled.pagination.skip() >= total {
            Vec::new()
        } else {
            self.rows(&compiled.select).await?
        };

        let data = process_in_chunks(
            rows,
            self.settings.post_processing_batch_size,
            self.settings.post_process_timeout,
            |row| (self.hooks.post_process_dict)(row),
        )
        .await?;
        Ok(PaginatedResult::new(compiled.pagination, total, data))
    }

    /// Search restricted by the `auth_filter` hook (ownership by default).
    ///
    /// # Errors
    ///
    /// As [`Crud::search`], plus whatever the hook returns.
    pub async fn user_search(
        &self,
        principal: &dyn Principal,
        query: FindQuery<R>,
    ) -> Result<PaginatedResult<R::Read>, CrudError> {
        let query = (self.hooks.auth_filter)(principal, query)?;
        self.search(query).await
    }

    /// # Errors
    ///
    /// As [`Crud::user_search`].
    pub async fn user_search_partial(
        &self,
        principal: &dyn Principal,
        query: FindQuery<R>,
    ) -> Result<PaginatedResult<JsonValue>, CrudError> {
        let query = (self.hooks.auth_filter)(principal, query)?;
        self.search_partial(query).await
    }

    /// Number of records matching the filters of `query`. Paging, sort and select are ignored.
    ///
    /// # Errors
    ///
    /// [`CrudError::ValidationFailed`] or [`CrudError::Database`].
    pub async fn count(&self, query: &FindQuery<R>) -> Result<u64, CrudError> {
        let compiled = self.compiler().compile(query)?;
        self.total(&compiled.count).await
    }

    /// # Errors
    ///
    /// As [`Crud::count`].
    pub async fn exists(&self, query: &FindQuery<R>) -> Result<bool, CrudError> {
        Ok(self.count(query).await? > 0)
    }

    // Internals

    fn compiler(&self) -> RelationalCompiler<R> {
        let max_size = self.settings.max_page_size;
        RelationalCompiler::new(self.db.get_database_backend())
            .with_page_sizes(self.config.page_size.unwrap_or(max_size), max_size)
            .with_default_sort(self.config.default_sort.clone())
    }

    async fn load<C: ConnectionTrait>(&self, conn: &C, id: Uuid) -> Result<R::Model, CrudError> {
        with_deadline(self.settings.query_timeout, "query", async {
            R::Entity::find()
                .filter(R::ID_COLUMN.eq(id))
                .one(conn)
                .await
                .map_err(CrudError::database)
        })
        .await?
        .ok_or_else(|| Self::not_found(id))
    }

    async fn rows<T: FromQueryResult>(&self, select: &SelectStatement) -> Result<Vec<T>, CrudError> {
        let statement = self.db.get_database_backend().build(select);
        tracing::debug!(resource = R::RESOURCE_NAME_PLURAL, sql = %statement, "Selecting rows");

        with_deadline(self.settings.query_timeout, "query", async {
            T::find_by_statement(statement)
                .all(&self.db)
                .await
                .map_err(CrudError::database)
        })
        .await
    }

    async fn total(&self, count: &SelectStatement) -> Result<u64, CrudError> {
        let statement = self.db.get_database_backend().build(count);
        tracing::debug!(resource = R::RESOURCE_NAME_PLURAL, sql = %statement, "Counting rows");

        let row = with_deadline(self.settings.query_timeout, "query", async {
            self.db.query_one(statement).await.map_err(CrudError::database)
        })
        .await?;
        let total: i64 = match row {
            Some(row) => row.try_get("", "total").map_err(CrudError::database)?,
            None => 0,
        };
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn post_process(&self, read: R::Read) -> Result<R::Read, CrudError> {
        with_deadline(
            self.settings.post_process_timeout,
            "post-processing",
            (self.hooks.post_process)(read),
        )
        .await
    }

    fn authorize(
        &self,
        principal: &dyn Principal,
        target: AuthTarget<'_, R>,
        event: CrudEvent,
    ) -> Result<(), CrudError> {
        (self.hooks.auth_check)(principal, target, event).inspect_err(|err| {
            tracing::debug!(
                resource = R::RESOURCE_NAME_SINGULAR,
                principal = %principal.id(),
                %event,
                error = %err,
                "Authorization denied"
            );
        })
    }

    async fn cleanup(&self, hook: &str, id: Uuid, future: HookFuture<()>) {
        if let Err(err) = with_deadline(self.settings.post_process_timeout, hook, future).await {
            tracing::warn!(
                resource = R::RESOURCE_NAME_SINGULAR,
                %id,
                hook,
                error = ?err,
                "Cleanup hook failed, continuing"
            );
        }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, CrudError> {
        self.db.begin().await.map_err(CrudError::database)
    }

    fn not_found(id: Uuid) -> CrudError {
        CrudError::not_found(R::RESOURCE_NAME_SINGULAR, Some(id.to_string()))
    }

    fn persistence_error(err: DbErr) -> CrudError {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                CrudError::conflict(format!("Conflict: {detail}"))
            }
            _ => CrudError::from(err),
        }
    }
}

/// Commit on success. On failure roll back first, then return the original error.
async fn finish<T>(txn: DatabaseTransaction, outcome: Result<T, CrudError>) -> Result<T, CrudError> {
    match outcome {
        Ok(value) => {
            txn.commit().await.map_err(CrudError::database)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = txn.rollback().await {
                tracing::error!(error = ?rollback, "Rollback failed");
            }
            Err(err)
        }
    }
}
