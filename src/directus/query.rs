//! Query builders for the `items` and `assets` endpoints.
//!
//! ```ignore
//! let articles = client
//!   .items("articles")
//!   .filter("status", "_eq", Status::Published)
//!   .fields(["id", "title"])
//!   .get()
//!   .await?;
//! ```

use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::directus::api_types::RemoteRecord;
use crate::directus::client::DirectusClient;
use crate::directus::sink::AssetSink;
use crate::directus::transport::Transport;
use crate::error::{Error, Result};

/// Collection name routed to the `/assets` endpoint instead of `/items`.
pub const ASSETS_COLLECTION: &str = "assets";

/// A single `filter[field][operator]=value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
  pub field: String,
  pub operator: String,
  pub value: Value,
}

/// Accumulated filters, field selection and ad-hoc parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
  filters: Vec<QueryFilter>,
  fields: Vec<String>,
  extra: Map<String, Value>,
}

impl QueryParams {
  pub fn filters(&self) -> &[QueryFilter] {
    &self.filters
  }

  pub fn fields(&self) -> &[String] {
    &self.fields
  }

  /// Serialize into the parameter map sent to Directus.
  ///
  /// Filters nest as `filter -> field -> operator`, so a later filter on the
  /// same field and operator replaces the earlier one. Ad-hoc parameters are
  /// merged last and win on key collisions.
  pub fn build(&self) -> Map<String, Value> {
    let mut parameters = Map::new();

    if !self.filters.is_empty() {
      let mut filter = Map::new();
      for f in &self.filters {
        let operators = filter
          .entry(f.field.clone())
          .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(operators) = operators {
          operators.insert(f.operator.clone(), f.value.clone());
        }
      }
      parameters.insert("filter".to_string(), Value::Object(filter));
    }

    if !self.fields.is_empty() {
      parameters.insert("fields".to_string(), Value::String(self.fields.join(",")));
    }

    for (key, value) in &self.extra {
      parameters.insert(key.clone(), value.clone());
    }

    parameters
  }
}

/// Contract shared by the item and asset builders.
#[allow(async_fn_in_trait)]
pub trait QueryBuilder: Sized {
  fn params(&self) -> &QueryParams;

  fn params_mut(&mut self) -> &mut QueryParams;

  /// Add a filter predicate, e.g. `filter("status", "_eq", "published")`.
  fn filter(
    mut self,
    field: impl Into<String>,
    operator: impl Into<String>,
    value: impl Into<Value>,
  ) -> Self {
    self.params_mut().filters.push(QueryFilter {
      field: field.into(),
      operator: operator.into(),
      value: value.into(),
    });
    self
  }

  /// Restrict the returned fields. Replaces any previous selection.
  fn fields<I, S>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.params_mut().fields = fields.into_iter().map(Into::into).collect();
    self
  }

  fn add_query_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.params_mut().extra.insert(key.into(), value.into());
    self
  }

  fn build_query_parameters(&self) -> Map<String, Value> {
    self.params().build()
  }

  /// Fetch a single record by id.
  async fn find(&self, id: &str) -> Result<RemoteRecord>;
}

/// Builder for a named collection under `/items`.
pub struct Items<'a, H: Transport> {
  client: &'a DirectusClient<H>,
  collection: String,
  params: QueryParams,
}

impl<'a, H: Transport> Items<'a, H> {
  pub fn collection(&self) -> &str {
    &self.collection
  }

  /// Fetch every record matching the builder.
  pub async fn get(&self) -> Result<Vec<RemoteRecord>> {
    self
      .client
      .fetch_collection(&self.collection, &self.build_query_parameters())
      .await
  }
}

impl<'a, H: Transport> QueryBuilder for Items<'a, H> {
  fn params(&self) -> &QueryParams {
    &self.params
  }

  fn params_mut(&mut self) -> &mut QueryParams {
    &mut self.params
  }

  async fn find(&self, id: &str) -> Result<RemoteRecord> {
    self
      .client
      .fetch_item(&self.collection, id, &self.build_query_parameters())
      .await
  }
}

/// Builder for files under `/assets`.
pub struct Assets<'a, H: Transport> {
  client: &'a DirectusClient<H>,
  params: QueryParams,
}

impl<'a, H: Transport> Assets<'a, H> {
  /// Download a file into `sink`, returning the resolved path.
  pub async fn download<S>(&self, id: &str, sink: &S, path: Option<&str>) -> Result<PathBuf>
  where
    S: AssetSink + ?Sized,
  {
    validate_asset_id(id)?;
    self
      .client
      .download_asset(id, &self.build_query_parameters(), sink, path)
      .await
  }
}

impl<'a, H: Transport> QueryBuilder for Assets<'a, H> {
  fn params(&self) -> &QueryParams {
    &self.params
  }

  fn params_mut(&mut self) -> &mut QueryParams {
    &mut self.params
  }

  async fn find(&self, id: &str) -> Result<RemoteRecord> {
    validate_asset_id(id)?;
    self
      .client
      .fetch_asset(id, &self.build_query_parameters())
      .await
  }
}

/// Asset ids are UUID strings; a numeric-looking id is always a mistake.
fn validate_asset_id(id: &str) -> Result<()> {
  if id.trim().is_empty() {
    return Err(Error::InvalidArgument("Asset ID must not be empty".to_string()));
  }
  if looks_numeric(id) {
    return Err(Error::InvalidArgument(format!(
      "Asset ID must be a string identifier, got numeric '{}'",
      id
    )));
  }
  Ok(())
}

fn looks_numeric(id: &str) -> bool {
  let trimmed = id.trim();
  trimmed.bytes().any(|b| b.is_ascii_digit()) && trimmed.parse::<f64>().is_ok()
}

/// Builder picked by collection name.
pub enum Query<'a, H: Transport> {
  Assets(Assets<'a, H>),
  Items(Items<'a, H>),
}

impl<'a, H: Transport> QueryBuilder for Query<'a, H> {
  fn params(&self) -> &QueryParams {
    match self {
      Query::Assets(q) => q.params(),
      Query::Items(q) => q.params(),
    }
  }

  fn params_mut(&mut self) -> &mut QueryParams {
    match self {
      Query::Assets(q) => q.params_mut(),
      Query::Items(q) => q.params_mut(),
    }
  }

  async fn find(&self, id: &str) -> Result<RemoteRecord> {
    match self {
      Query::Assets(q) => q.find(id).await,
      Query::Items(q) => q.find(id).await,
    }
  }
}

impl<H: Transport> DirectusClient<H> {
  /// Builder for `collection`: `assets` maps to the file endpoints, any other
  /// name to `/items/{collection}`.
  pub fn query(&self, collection: &str) -> Query<'_, H> {
    match collection {
      ASSETS_COLLECTION => Query::Assets(self.assets()),
      name => Query::Items(self.items(name)),
    }
  }

  pub fn items(&self, collection: impl Into<String>) -> Items<'_, H> {
    Items {
      client: self,
      collection: collection.into(),
      params: QueryParams::default(),
    }
  }

  pub fn assets(&self) -> Assets<'_, H> {
    Assets {
      client: self,
      params: QueryParams::default(),
    }
  }
}
