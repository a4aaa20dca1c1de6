//! Read-through cache mirroring Directus collections into local storage.
//!
//! ```ignore
//! let config = DirectusConfig::from_env()?;
//! let client = DirectusClient::connect(&config)?;
//! let store = Arc::new(SqliteStore::open(Path::new("cache.db"))?);
//! store.register(Article::entity_type())?;
//!
//! let context = ContextFactory::from_config(&config)
//!   .create_for::<Article, _>(ContextOptions::default(), || request.force_new());
//! let articles = Repository::<Article>::new(context, client, store)?;
//! let article = articles.get_by_cms_id("42").await?;
//! ```

pub mod cache;
pub mod config;
pub mod directus;
pub mod error;
pub mod model;

pub use cache::{
  CmsEntity, Context, ContextFactory, ContextOptions, Document, LocalRecord, LocalStore, Reconcile,
  Repository, SqliteStore,
};
pub use config::{Config, DirectusConfig, StorageConfig};
pub use directus::{AssetSink, DirectusClient, LocalDisk, Query, QueryBuilder, RemoteRecord};
pub use error::{Error, Result};
pub use model::Status;
