//! Read-through repository over local storage and a Directus collection.

use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::context::Context;
use super::storage::{LocalStore, SqliteStore};
use super::traits::{cms_key, LocalRecord, PreparedRecord, Reconcile, CMS_ID_FIELD};
use crate::directus::{DirectusClient, HttpTransport, Query, QueryBuilder, RemoteRecord, Transport};
use crate::error::{Error, Result};

/// Read-through cache for one entity type.
///
/// Reads are served from local storage when possible. On a miss, an empty
/// listing or a forced refresh, the whole remote collection is fetched and
/// reconciled (upserted by `cms_id`) before answering.
///
/// Nothing guards the gap between the local lookup and the remote fallback:
/// two callers missing the same record both fetch, and the last upsert wins.
pub struct Repository<T, S = SqliteStore, H = HttpTransport>
where
  T: Reconcile,
  S: LocalStore,
  H: Transport,
{
  context: Context,
  client: DirectusClient<H>,
  store: Arc<S>,
  _entity: PhantomData<fn() -> T>,
}

impl<T, S, H> Repository<T, S, H>
where
  T: Reconcile,
  S: LocalStore,
  H: Transport,
{
  /// Bind a context to a client and a store.
  ///
  /// Fails with `InvalidArgument` when the entity type is not a registered
  /// local schema, or when the collection is the assets endpoint.
  pub fn new(context: Context, client: DirectusClient<H>, store: Arc<S>) -> Result<Self> {
    if !store.is_registered(context.entity_type())? {
      return Err(Error::InvalidArgument(format!(
        "{} is not a registered local schema",
        context.entity_type()
      )));
    }

    let collection = context.collection_name();
    if let Query::Assets(_) = client.query(&collection) {
      return Err(Error::InvalidArgument(format!(
        "{} cannot be backed by the '{}' collection",
        context.entity_type(),
        collection
      )));
    }

    Ok(Self {
      context,
      client,
      store,
      _entity: PhantomData,
    })
  }

  pub fn context(&self) -> &Context {
    &self.context
  }

  /// Get a record by local primary key.
  pub async fn get(&self, id: i64) -> Result<LocalRecord<T>> {
    if !self.context.is_force_refresh() {
      if let Some(record) = self.store.find(self.context.entity_type(), id)? {
        debug!(entity_type = self.context.entity_type(), id, "Local hit");
        return record.decode();
      }
    }

    self
      .fetch_from_remote(None)
      .await?
      .into_iter()
      .find(|r| r.id == id)
      .ok_or_else(|| Error::not_found(self.context.entity_type(), format!("ID {}", id)))
  }

  /// Get a record by its identifier in the CMS.
  pub async fn get_by_cms_id(&self, cms_id: &str) -> Result<LocalRecord<T>> {
    if !self.context.is_force_refresh() {
      if let Some(record) = self.store.find_by_cms_id(self.context.entity_type(), cms_id)? {
        debug!(entity_type = self.context.entity_type(), cms_id, "Local hit");
        return record.decode();
      }
    }

    self
      .fetch_from_remote(None)
      .await?
      .into_iter()
      .find(|r| r.cms_id == cms_id)
      .ok_or_else(|| Error::not_found(self.context.entity_type(), format!("CMS ID {}", cms_id)))
  }

  /// All records of the entity type.
  ///
  /// A non-empty local table is returned as is, even if the CMS has more.
  /// Only an empty table or a forced refresh goes to Directus.
  pub async fn get_list(&self) -> Result<Vec<LocalRecord<T>>> {
    if self.context.is_force_refresh() {
      return self.fetch_from_remote(None).await;
    }

    let local = self
      .store
      .list(self.context.entity_type(), self.context.order_by())?;

    if local.is_empty() {
      return self.fetch_from_remote(None).await;
    }

    local.into_iter().map(LocalRecord::decode).collect()
  }

  /// Upsert a prepared record by its `cms_id`, replacing all stored fields.
  pub fn update_or_create(&self, prepared: PreparedRecord) -> Result<LocalRecord<T>> {
    let cms_id = prepared
      .get(CMS_ID_FIELD)
      .and_then(cms_key)
      .ok_or_else(|| {
        Error::InvalidArgument(format!(
          "{} record has no usable {}",
          self.context.entity_type(),
          CMS_ID_FIELD
        ))
      })?;

    self
      .store
      .upsert_by_cms_id(self.context.entity_type(), &cms_id, &prepared)?
      .decode()
  }

  /// Reshape a remote record for the local schema.
  pub fn prepare_data(&self, record: RemoteRecord) -> Result<PreparedRecord> {
    T::prepare_data(record)
  }

  /// Reconcile from Directus: one item when `cms_id` is given, the whole
  /// collection otherwise.
  ///
  /// Stops at the first record that fails; earlier records stay written.
  pub async fn fetch_from_remote(&self, cms_id: Option<&str>) -> Result<Vec<LocalRecord<T>>> {
    let collection = self.context.collection_name();
    let mut query = self.client.items(collection.as_str());
    if !self.context.fields().is_empty() {
      query = query.fields(self.context.fields().iter().cloned());
    }

    let remote = match cms_id {
      Some(id) => vec![query.find(id).await?],
      None => query.get().await?,
    };

    let records = remote
      .into_iter()
      .map(|record| self.update_or_create(self.prepare_data(record)?))
      .collect::<Result<Vec<_>>>()?;

    debug!(
      entity_type = self.context.entity_type(),
      collection = collection.as_str(),
      count = records.len(),
      "Reconciled records from Directus"
    );

    Ok(records)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::context::{ContextFactory, ContextOptions};
  use crate::cache::traits::{copy_remote_id, CmsEntity, Document};
  use crate::config::DirectusConfig;
  use crate::directus::testing::{client_with, FakeTransport};
  use serde::Deserialize;
  use serde_json::{json, Value};

  #[derive(Debug, Clone, PartialEq, Deserialize)]
  struct Article {
    cms_id: i64,
    title: String,
    #[serde(default)]
    sort: Option<i64>,
  }

  impl Reconcile for Article {}

  impl CmsEntity for Article {
    fn entity_type() -> &'static str {
      "Article"
    }
  }

  /// Renames `headline` to `title` before persisting.
  #[derive(Debug, Deserialize)]
  struct Headline {
    title: String,
  }

  impl Reconcile for Headline {
    fn prepare_data(record: RemoteRecord) -> Result<PreparedRecord> {
      let mut prepared = copy_remote_id(record)?;
      if let Some(headline) = prepared.remove("headline") {
        prepared.insert("title".to_string(), headline);
      }
      Ok(prepared)
    }
  }

  struct Fixture {
    transport: Arc<FakeTransport>,
    store: Arc<SqliteStore>,
  }

  impl Fixture {
    fn new() -> Self {
      let store = SqliteStore::open_in_memory().unwrap();
      store.register("Article").unwrap();
      Self {
        transport: Arc::new(FakeTransport::new()),
        store: Arc::new(store),
      }
    }

    fn remote_articles(&self, data: Value) {
      self
        .transport
        .respond_json("/items/articles", 200, json!({ "data": data }));
    }

    fn repository<T: Reconcile>(&self, context: Context) -> Repository<T, SqliteStore, FakeTransport> {
      Repository::new(context, client_with(&self.transport), Arc::clone(&self.store)).unwrap()
    }

    fn articles(&self, force_refresh: bool) -> Repository<Article, SqliteStore, FakeTransport> {
      let config = DirectusConfig::new("https://cms.test", "test-token").with_force_sync(true);
      let context = ContextFactory::from_config(&config)
        .create_for::<Article, _>(ContextOptions::default(), || force_refresh);
      self.repository(context)
    }

    fn seed(&self, cms_id: i64, title: &str) -> LocalRecord<Document> {
      let data = json!({"cms_id": cms_id, "title": title});
      let Value::Object(data) = data else { unreachable!() };
      self
        .store
        .upsert_by_cms_id("Article", &cms_id.to_string(), &data)
        .unwrap()
    }
  }

  #[tokio::test]
  async fn test_get_local_hit_makes_no_remote_call() {
    let fx = Fixture::new();
    let seeded = fx.seed(5, "local");

    let record = fx.articles(false).get(seeded.id).await.unwrap();

    assert_eq!(record.data.title, "local");
    assert_eq!(fx.transport.request_count(), 0);
  }

  #[tokio::test]
  async fn test_get_miss_fetches_collection_once() {
    let fx = Fixture::new();
    let seeded = fx.seed(10, "first");
    fx.remote_articles(json!([
      {"id": 10, "title": "first"},
      {"id": 11, "title": "second"},
    ]));
    let repo = fx.articles(false);

    // 10 keeps its row, 11 lands right after it
    let record = repo.get(seeded.id + 1).await.unwrap();
    assert_eq!(record.cms_id, "11");
    assert_eq!(record.data.title, "second");
    assert_eq!(fx.transport.request_count(), 1);

    let again = repo.get(seeded.id + 1).await.unwrap();
    assert_eq!(again, record);
    assert_eq!(fx.transport.request_count(), 1);
  }

  #[tokio::test]
  async fn test_get_missing_everywhere_is_not_found() {
    let fx = Fixture::new();
    fx.remote_articles(json!([{"id": 1, "title": "only"}]));
    let repo = fx.articles(false);

    let err = repo.get(999).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(fx.transport.request_count(), 1);

    // The fetched collection was still reconciled
    assert_eq!(fx.store.list("Article", None).unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_get_miss_reconciles_and_picks_by_local_id() {
    let fx = Fixture::new();
    fx.remote_articles(json!([
      {"id": 1, "title": "a"},
      {"id": 2, "title": "b"},
    ]));
    let repo = fx.articles(false);

    // Fresh table: local ids are assigned in remote order
    let record = repo.get(1).await.unwrap();
    assert_eq!(record.data.title, "a");
    assert_eq!(record.data.cms_id, 1);
    assert_eq!(fx.transport.request_count(), 1);
  }

  #[tokio::test]
  async fn test_force_refresh_bypasses_local_hit() {
    let fx = Fixture::new();
    let seeded = fx.seed(5, "stale");
    fx.remote_articles(json!([{"id": 5, "title": "fresh"}]));

    let record = fx.articles(true).get(seeded.id).await.unwrap();

    assert_eq!(record.id, seeded.id);
    assert_eq!(record.data.title, "fresh");
    assert_eq!(fx.transport.request_count(), 1);
  }

  #[tokio::test]
  async fn test_get_by_cms_id_two_tiers() {
    let fx = Fixture::new();
    fx.seed(5, "local");
    fx.remote_articles(json!([{"id": 6, "title": "remote"}]));
    let repo = fx.articles(false);

    let local = repo.get_by_cms_id("5").await.unwrap();
    assert_eq!(local.data.title, "local");
    assert_eq!(fx.transport.request_count(), 0);

    let remote = repo.get_by_cms_id("6").await.unwrap();
    assert_eq!(remote.data.title, "remote");
    assert_eq!(fx.transport.request_count(), 1);

    let err = repo.get_by_cms_id("7").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
  }

  #[tokio::test]
  async fn test_get_by_cms_id_force_refresh_bypasses_local_hit() {
    let fx = Fixture::new();
    let seeded = fx.seed(5, "stale");
    fx.remote_articles(json!([{"id": 5, "title": "fresh"}]));

    let record = fx.articles(true).get_by_cms_id("5").await.unwrap();

    assert_eq!(record.id, seeded.id);
    assert_eq!(record.data.title, "fresh");
    assert_eq!(fx.transport.request_count(), 1);
  }

  #[tokio::test]
  async fn test_force_refresh_not_found_despite_local_row() {
    let fx = Fixture::new();
    let seeded = fx.seed(5, "deleted in the CMS");
    fx.remote_articles(json!([{"id": 6, "title": "other"}]));
    let repo = fx.articles(true);

    let err = repo.get(seeded.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let err = repo.get_by_cms_id("5").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    assert_eq!(fx.transport.request_count(), 2);
  }

  #[tokio::test]
  async fn test_transport_failure_propagates_without_writes() {
    let fx = Fixture::new();
    fx.remote_articles(json!([{"id": 1, "title": "unreachable"}]));
    fx.transport.go_offline("connection refused");
    let repo = fx.articles(false);

    let err = repo.get(1).await.unwrap_err();
    assert!(matches!(err, Error::Transport(ref e) if e.to_string() == "connection refused"));

    let err = repo.get_list().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    let err = repo.get_by_cms_id("1").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    // One attempt per call, nothing retried or stored
    assert_eq!(fx.transport.request_count(), 3);
    assert!(fx.store.list("Article", None).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_get_list_empty_table_fetches_once() {
    let fx = Fixture::new();
    fx.remote_articles(json!([
      {"id": 3, "title": "c", "sort": 1},
      {"id": 1, "title": "a", "sort": 3},
      {"id": 2, "title": "b", "sort": 2},
    ]));
    let repo = fx.articles(false);

    let list = repo.get_list().await.unwrap();
    let titles: Vec<_> = list.iter().map(|r| r.data.title.as_str()).collect();
    assert_eq!(titles, ["c", "a", "b"]);
    assert_eq!(fx.transport.request_count(), 1);

    // Second call is served locally, ordered by `sort`
    let list = repo.get_list().await.unwrap();
    let sorts: Vec<_> = list.iter().map(|r| r.data.sort).collect();
    assert_eq!(sorts, [Some(1), Some(2), Some(3)]);
    assert_eq!(fx.transport.request_count(), 1);
  }

  #[tokio::test]
  async fn test_get_list_non_empty_table_ignores_remote() {
    let fx = Fixture::new();
    fx.seed(1, "kept");
    fx.remote_articles(json!([
      {"id": 1, "title": "changed"},
      {"id": 2, "title": "new"},
    ]));

    let list = fx.articles(false).get_list().await.unwrap();

    assert_eq!(list.len(), 1);
    assert_eq!(list[0].data.title, "kept");
    assert_eq!(fx.transport.request_count(), 0);
  }

  #[tokio::test]
  async fn test_get_list_force_refresh() {
    let fx = Fixture::new();
    fx.seed(1, "kept");
    fx.remote_articles(json!([
      {"id": 1, "title": "changed"},
      {"id": 2, "title": "new"},
    ]));

    let list = fx.articles(true).get_list().await.unwrap();

    assert_eq!(list.len(), 2);
    assert_eq!(list[0].data.title, "changed");
    assert_eq!(fx.store.list("Article", None).unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_reconciliation_is_idempotent() {
    let fx = Fixture::new();
    let repo = fx.articles(false);

    fx.remote_articles(json!([{"id": 1, "title": "v1"}]));
    let first = repo.fetch_from_remote(None).await.unwrap();
    fx.remote_articles(json!([{"id": 1, "title": "v2"}]));
    let second = repo.fetch_from_remote(None).await.unwrap();

    assert_eq!(first[0].id, second[0].id);
    let stored = fx.store.list("Article", None).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].data["title"], "v2");
  }

  #[tokio::test]
  async fn test_fetch_single_item_with_fields() {
    let fx = Fixture::new();
    fx.transport.respond_json(
      "/items/articles/42",
      200,
      json!({"data": {"id": 42, "title": "single"}}),
    );
    let context = Context::new("Article").with_fields(["id", "title"]);
    let repo: Repository<Article, _, _> = fx.repository(context);

    let records = repo.fetch_from_remote(Some("42")).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cms_id, "42");
    let request = &fx.transport.requests()[0];
    assert_eq!(request.url.path(), "/items/articles/42");
    assert_eq!(request.url.query(), Some("fields=id%2Ctitle"));
  }

  #[tokio::test]
  async fn test_prepare_data_override() {
    let fx = Fixture::new();
    fx.transport.respond_json(
      "/items/news",
      200,
      json!({"data": [{"id": "n-1", "headline": "Big news"}]}),
    );
    let context = Context::new("Article").with_collection_name("news");
    let repo: Repository<Headline, _, _> = fx.repository(context);

    let list = repo.get_list().await.unwrap();

    assert_eq!(list[0].cms_id, "n-1");
    assert_eq!(list[0].data.title, "Big news");
  }

  #[tokio::test]
  async fn test_list_fails_as_a_whole() {
    let fx = Fixture::new();
    fx.remote_articles(json!([
      {"id": 1, "title": "ok"},
      {"title": "missing id"},
    ]));

    let err = fx.articles(false).get_list().await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[tokio::test]
  async fn test_remote_error_propagates() {
    let fx = Fixture::new();
    fx.transport.respond_json(
      "/items/articles",
      401,
      json!({"errors": [{"message": "Invalid user credentials."}]}),
    );

    let err = fx.articles(false).get(1).await.unwrap_err();
    assert!(matches!(err, Error::RemoteApi(ref m) if m == "Invalid user credentials."));
  }

  #[test]
  fn test_update_or_create_requires_cms_id() {
    let fx = Fixture::new();
    let repo = fx.articles(false);

    let Value::Object(prepared) = json!({"title": "no id"}) else { unreachable!() };
    assert!(matches!(
      repo.update_or_create(prepared),
      Err(Error::InvalidArgument(_))
    ));
  }

  #[test]
  fn test_unregistered_entity_type_rejected() {
    let fx = Fixture::new();
    let result: Result<Repository<Article, _, _>> = Repository::new(
      Context::new("Page"),
      client_with(&fx.transport),
      Arc::clone(&fx.store),
    );
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
  }

  #[test]
  fn test_assets_collection_rejected() {
    let fx = Fixture::new();
    let result: Result<Repository<Article, _, _>> = Repository::new(
      Context::new("Article").with_collection_name("assets"),
      client_with(&fx.transport),
      Arc::clone(&fx.store),
    );
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
  }
}
