//! Per-entity customization points.
//!
//! Every hook is a function value with a pass-through default, so an entity only supplies the
//! ones it needs:
//!
//! ```rust,ignore
//! let hooks = CrudHooks::<Place>::default()
//!     .with_post_process(|mut place: PlaceRead| async move {
//!         place.photo = sign_url(&place.photo).await?;
//!         Ok(place)
//!     })
//!     .with_before_delete(|place: place::Model| async move { storage.remove(&place.photo).await });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::traits::CrudResource;
use crate::errors::CrudError;
use crate::fields::{EntityFields, FieldSet};
use crate::filtering::{Filter, FilterOperation, FilterValue};
use crate::query::FindQuery;

pub type HookFuture<T> = BoxFuture<'static, Result<T, CrudError>>;

type AsyncHook<A, B> = Arc<dyn Fn(A) -> HookFuture<B> + Send + Sync>;
type AuthCheck<R> = Arc<
    dyn for<'a> Fn(&'a dyn Principal, AuthTarget<'a, R>, CrudEvent) -> Result<(), CrudError>
        + Send
        + Sync,
>;
type AuthFilter<R> =
    Arc<dyn Fn(&dyn Principal, FindQuery<R>) -> Result<FindQuery<R>, CrudError> + Send + Sync>;

/// The requesting user, as far as authorization is concerned
pub trait Principal: Send + Sync {
    fn id(&self) -> Uuid;

    /// Admins bypass ownership checks and filters
    fn is_admin(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudEvent {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for CrudEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// What an authorization check is looking at
pub enum AuthTarget<'a, R: CrudResource> {
    /// A stored record
    Record(&'a R::Model),
    /// A creation form
    Post(&'a R::Post),
    /// An update form
    Put(&'a R::Put),
}

pub struct CrudHooks<R: CrudResource> {
    pub(crate) post_to_create: AsyncHook<R::Post, R::Create>,
    pub(crate) put_to_update: AsyncHook<R::Put, R::Update>,
    pub(crate) auth_check: AuthCheck<R>,
    pub(crate) auth_filter: AuthFilter<R>,
    pub(crate) post_process: AsyncHook<R::Read, R::Read>,
    pub(crate) post_process_dict: AsyncHook<JsonValue, JsonValue>,
    pub(crate) before_delete: AsyncHook<R::Model, ()>,
    pub(crate) after_delete: AsyncHook<R::Model, ()>,
}

impl<R: CrudResource> Default for CrudHooks<R> {
    fn default() -> Self {
        Self {
            post_to_create: Arc::new(|post: R::Post| future::ok::<R::Create, CrudError>(post.into()).boxed()),
            put_to_update: Arc::new(|put: R::Put| future::ok::<R::Update, CrudError>(put.into()).boxed()),
            auth_check: Arc::new(owner_only::<R>),
            auth_filter: Arc::new(owner_filter::<R>),
            post_process: Arc::new(|read: R::Read| future::ok::<_, CrudError>(read).boxed()),
            post_process_dict: Arc::new(|dict: JsonValue| future::ok::<_, CrudError>(dict).boxed()),
            before_delete: Arc::new(|_: R::Model| future::ok::<(), CrudError>(()).boxed()),
            after_delete: Arc::new(|_: R::Model| future::ok::<(), CrudError>(()).boxed()),
        }
    }
}

impl<R: CrudResource> Clone for CrudHooks<R> {
    fn clone(&self) -> Self {
        Self {
            post_to_create: Arc::clone(&self.post_to_create),
            put_to_update: Arc::clone(&self.put_to_update),
            auth_check: Arc::clone(&self.auth_check),
            auth_filter: Arc::clone(&self.auth_filter),
            post_process: Arc::clone(&self.post_process),
            post_process_dict: Arc::clone(&self.post_process_dict),
            before_delete: Arc::clone(&self.before_delete),
            after_delete: Arc::clone(&self.after_delete),
        }
    }
}

impl<R: CrudResource> CrudHooks<R> {
    /// Turn a creation form into the persisted payload (file uploads, derived columns, ...)
    #[must_use]
    pub fn with_post_to_create<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(R::Post) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Create, CrudError>> + Send + 'static,
    {
        self.post_to_create = Arc::new(move |post| f(post).boxed());
        self
    }

    #[must_use]
    pub fn with_put_to_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(R::Put) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Update, CrudError>> + Send + 'static,
    {
        self.put_to_update = Arc::new(move |put| f(put).boxed());
        self
    }

    /// Replace the record-level check. Must fail with [`CrudError::Unauthorized`] (or
    /// [`CrudError::Forbidden`]) when the principal lacks rights.
    #[must_use]
    pub fn with_auth_check<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Principal, AuthTarget<'a, R>, CrudEvent) -> Result<(), CrudError>
            + Send
            + Sync
            + 'static,
    {
        self.auth_check = Arc::new(f);
        self
    }

    /// Replace the query rewrite applied to user searches. The rewrite must only narrow results.
    #[must_use]
    pub fn with_auth_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Principal, FindQuery<R>) -> Result<FindQuery<R>, CrudError>
            + Send
            + Sync
            + 'static,
    {
        self.auth_filter = Arc::new(f);
        self
    }

    #[must_use]
    pub fn with_post_process<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(R::Read) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Read, CrudError>> + Send + 'static,
    {
        self.post_process = Arc::new(move |read| f(read).boxed());
        self
    }

    /// Post-processing for projected rows, which have no `Read` shape
    #[must_use]
    pub fn with_post_process_dict<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, CrudError>> + Send + 'static,
    {
        self.post_process_dict = Arc::new(move |dict| f(dict).boxed());
        self
    }

    /// Cleanup before the record is deleted. Failures are logged, never returned.
    #[must_use]
    pub fn with_before_delete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(R::Model) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CrudError>> + Send + 'static,
    {
        self.before_delete = Arc::new(move |model| f(model).boxed());
        self
    }

    /// Cleanup after the record is deleted. Failures are logged, never returned.
    #[must_use]
    pub fn with_after_delete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(R::Model) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CrudError>> + Send + 'static,
    {
        self.after_delete = Arc::new(move |model| f(model).boxed());
        self
    }
}

/// Default record check: admins pass, otherwise the principal must own the record.
/// Forms are not inspected and records without an owner are open.
pub fn owner_only<R: CrudResource>(
    principal: &dyn Principal,
    target: AuthTarget<'_, R>,
    event: CrudEvent,
) -> Result<(), CrudError> {
    if principal.is_admin() {
        return Ok(());
    }
    let AuthTarget::Record(model) = target else {
        return Ok(());
    };
    match R::owner_of(model) {
        Some(owner) if owner != principal.id() => Err(CrudError::unauthorized(format!(
            "Not allowed to {event} this {}",
            R::RESOURCE_NAME_SINGULAR
        ))),
        _ => Ok(()),
    }
}

/// Default search rewrite: non-admins only see records they own.
///
/// # Errors
///
/// See [`restrict_to_owner`].
pub fn owner_filter<R: CrudResource>(
    principal: &dyn Principal,
    query: FindQuery<R>,
) -> Result<FindQuery<R>, CrudError> {
    match R::owner_field() {
        Some(field) if !principal.is_admin() => restrict_to_owner(query, field, principal.id()),
        _ => Ok(query),
    }
}

/// Intersect the filters on `field` with `field = owner`.
///
/// The caller's own filters on the owner field are evaluated against `owner` and replaced by a
/// single `eq` when they admit it, or by an empty `in` (nothing matches) when they don't. The
/// result never matches a row the original query would not.
///
/// # Errors
///
/// Only if the restriction filter cannot be built.
pub fn restrict_to_owner<F: EntityFields>(
    mut query: FindQuery<F>,
    field: F::Searchable,
    owner: Uuid,
) -> Result<FindQuery<F>, CrudError> {
    let admitted = query
        .filters
        .remove(&field)
        .unwrap_or_default()
        .iter()
        .all(|filter| admits(filter, owner));

    let restriction = if admitted {
        Filter::eq(owner)?
    } else {
        Filter::is_in(Vec::<Uuid>::new())?
    };
    tracing::debug!(field = field.name(), %owner, admitted, "Restricting search to owner");
    query.add_filter(field, restriction);
    Ok(query)
}

fn admits(filter: &Filter, owner: Uuid) -> bool {
    let is_owner = |value: &FilterValue| matches!(value, FilterValue::Uuid(id) if *id == owner);
    let val = filter.val();
    match filter.op() {
        FilterOperation::Eq => is_owner(val),
        FilterOperation::Ne => !is_owner(val),
        FilterOperation::In => val.items().iter().any(is_owner),
        FilterOperation::Nin => !val.items().iter().any(is_owner),
        FilterOperation::Null => val.as_bool() == Some(false),
        FilterOperation::Exists => val.as_bool() == Some(true),
        _ => false,
    }
}
