//! Read-through caching of Directus records in local storage.
//!
//! - `Context` describes what a repository manages and whether it must refresh
//! - `LocalStore` persists records per entity type, unique by `cms_id`
//! - `Repository` serves reads locally and falls back to Directus on a miss

mod context;
mod repository;
mod storage;
mod traits;

pub use context::{Context, ContextFactory, ContextOptions, DEFAULT_ORDER_BY};
pub use repository::Repository;
pub use storage::{LocalStore, SqliteStore};
pub use traits::{
  cms_key, copy_remote_id, CmsEntity, Document, LocalRecord, PreparedRecord, Reconcile, CMS_ID_FIELD,
  REMOTE_ID_FIELD,
};
