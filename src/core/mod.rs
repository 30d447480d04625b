// Resource binding, per-entity hooks and the engine that runs them

pub mod engine;
pub mod hooks;
pub mod pipeline;
pub mod traits;

pub use engine::{Crud, EntityConfig};
pub use hooks::{
    AuthTarget, CrudEvent, CrudHooks, HookFuture, Principal, owner_filter, owner_only,
    restrict_to_owner,
};
pub use pipeline::process_in_chunks;
pub use traits::{CrudResource, MergeIntoActiveModel};
