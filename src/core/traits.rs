use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, DbErr, EntityTrait, FromQueryResult, IntoActiveModel,
    ModelTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::compiler::RelationalMapping;
use crate::validation::Validatable;

/// Apply a partial update to an existing active model.
///
/// Fields absent from the update stay untouched; fields present with a `null` value are cleared.
/// Wire forms usually model this with `Option<Option<T>>` and
/// `#[serde(default, with = "::serde_with::rust::double_option")]`.
pub trait MergeIntoActiveModel<ActiveModelType> {
    /// # Errors
    ///
    /// Returns a `DbErr` if a present value cannot be converted into its column type.
    fn merge_into_activemodel(self, existing: ActiveModelType) -> Result<ActiveModelType, DbErr>;
}

/// Everything the engine needs to know about one entity.
///
/// The field whitelists and their column mapping come from [`RelationalMapping`]; this trait
/// binds them to the Sea-ORM entity and to the wire representations:
///
/// - `Post` is what a client sends to create a record, `Create` is what gets persisted.
///   The `post_to_create` hook turns one into the other (default: `Into`).
/// - `Put` and `Update` play the same roles for partial updates.
/// - `Read` is what every read operation returns.
pub trait CrudResource: RelationalMapping + Sized {
    type Entity: EntityTrait<Model = Self::Model> + Sync;
    type Model: ModelTrait<Entity = Self::Entity>
        + FromQueryResult
        + IntoActiveModel<Self::ActiveModel>
        + Clone
        + Send
        + Sync;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send + Sync;

    type Read: From<Self::Model> + Serialize + Send + Sync + 'static;
    type Create: Into<Self::ActiveModel> + Validatable + Send + 'static;
    type Post: Into<Self::Create> + Send + Sync + 'static;
    type Update: MergeIntoActiveModel<Self::ActiveModel> + Validatable + Send + 'static;
    type Put: Into<Self::Update> + Send + Sync + 'static;

    /// Primary key column, a UUID
    const ID_COLUMN: <Self::Entity as EntityTrait>::Column;
    /// The searchable field mapped to the primary key
    const ID_FIELD: Self::Searchable;
    const RESOURCE_NAME_SINGULAR: &'static str;
    const RESOURCE_NAME_PLURAL: &'static str;

    /// Searchable field holding the owning principal's id, if records are owned.
    fn owner_field() -> Option<Self::Searchable> {
        None
    }

    fn owner_of(_model: &Self::Model) -> Option<Uuid> {
        None
    }
}
