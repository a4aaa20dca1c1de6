use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

use crate::config::DirectusConfig;
use crate::directus::api_types::{decode_envelope, decode_record, decode_records, RemoteRecord};
use crate::directus::sink::{asset_file_name, AssetSink, ASSETS_DIR};
use crate::directus::transport::{HttpRequest, HttpTransport, Transport, TransportResponse};
use crate::error::{Error, Result};

/// Query parameter that makes `/assets/{id}` return the file instead of metadata.
const DOWNLOAD_PARAM: &str = "download";

/// Directus REST client.
///
/// Holds the base URI and static token; all requests are plain GETs.
pub struct DirectusClient<H: Transport = HttpTransport> {
  transport: Arc<H>,
  base_url: Url,
  bearer_token: String,
}

impl DirectusClient<HttpTransport> {
  /// Create a client talking to Directus over HTTP.
  pub fn connect(config: &DirectusConfig) -> Result<Self> {
    let transport = HttpTransport::new(config)?;
    Self::new(config, Arc::new(transport))
  }
}

impl<H: Transport> DirectusClient<H> {
  pub fn new(config: &DirectusConfig, transport: Arc<H>) -> Result<Self> {
    let trimmed = config.base_uri.trim().trim_end_matches('/');
    let base_url = Url::parse(trimmed)
      .map_err(|e| Error::Config(format!("Invalid Directus base URI '{}': {}", trimmed, e)))?;

    if base_url.cannot_be_a_base() {
      return Err(Error::Config(format!(
        "Directus base URI '{}' cannot hold a path",
        trimmed
      )));
    }

    Ok(Self {
      transport,
      base_url,
      bearer_token: config.bearer_token.clone(),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Get every record of a collection.
  pub async fn fetch_collection(
    &self,
    collection: &str,
    query: &Map<String, Value>,
  ) -> Result<Vec<RemoteRecord>> {
    let response = self.get(&["items", collection], query).await?;
    ensure_success(&response)?;
    let records = decode_records(&response.body)?;
    debug!(collection, count = records.len(), "Fetched collection");
    Ok(records)
  }

  /// Get a single record of a collection by id.
  pub async fn fetch_item(
    &self,
    collection: &str,
    id: &str,
    query: &Map<String, Value>,
  ) -> Result<RemoteRecord> {
    let response = self.get(&["items", collection, id], query).await?;
    ensure_success(&response)?;
    let record = decode_record(&response.body)?;
    debug!(collection, id, "Fetched item");
    Ok(record)
  }

  /// Get the metadata of a file.
  pub async fn fetch_asset(&self, id: &str, query: &Map<String, Value>) -> Result<RemoteRecord> {
    let response = self.get(&["assets", id], query).await?;
    ensure_success(&response)?;
    decode_record(&response.body)
  }

  /// Download a file into `sink` and return where it landed.
  ///
  /// Without a destination the file goes to `assets/<name>`, the name coming
  /// from the `Content-Disposition` header (or the asset id when absent).
  pub async fn download_asset<S>(
    &self,
    id: &str,
    query: &Map<String, Value>,
    sink: &S,
    destination: Option<&str>,
  ) -> Result<PathBuf>
  where
    S: AssetSink + ?Sized,
  {
    let mut query = query.clone();
    if !query.contains_key(DOWNLOAD_PARAM) {
      query.insert(DOWNLOAD_PARAM.to_string(), Value::from("1"));
    }

    let response = self.get(&["assets", id], &query).await?;
    ensure_success(&response)?;

    let path = match destination {
      Some(path) => path.to_string(),
      None => format!(
        "{}/{}",
        ASSETS_DIR,
        asset_file_name(response.content_disposition.as_deref(), id)
      ),
    };

    sink.put(&path, &response.body)?;
    debug!(id, path = %path, bytes = response.body.len(), "Downloaded asset");

    Ok(sink.resolve_path(&path))
  }

  async fn get(&self, segments: &[&str], query: &Map<String, Value>) -> Result<TransportResponse> {
    let url = self.url(segments, query)?;
    trace!(url = %url, "GET");

    let request = HttpRequest {
      url,
      bearer_token: self.bearer_token.clone(),
    };
    self.transport.get(&request).await
  }

  /// Endpoint URL under the base URI.
  ///
  /// Each segment is pushed whole, so a `/` inside an id is escaped instead
  /// of adding a level. Empty and dot segments are rejected.
  fn url(&self, segments: &[&str], query: &Map<String, Value>) -> Result<Url> {
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
      return Err(Error::InvalidArgument(format!(
        "'{}' is not a valid Directus path segment",
        bad
      )));
    }

    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| Error::Config(format!("Directus base URI '{}' cannot hold a path", self.base_url)))?
      .pop_if_empty()
      .extend(segments);

    let pairs = encode_query(query);
    if !pairs.is_empty() {
      url.query_pairs_mut().extend_pairs(pairs);
    }

    Ok(url)
  }
}

impl<H: Transport> Clone for DirectusClient<H> {
  fn clone(&self) -> Self {
    Self {
      transport: Arc::clone(&self.transport),
      base_url: self.base_url.clone(),
      bearer_token: self.bearer_token.clone(),
    }
  }
}

/// Reject non-success responses, preferring the first message Directus sent.
fn ensure_success(response: &TransportResponse) -> Result<()> {
  if response.is_success() {
    return Ok(());
  }

  match decode_envelope(&response.body) {
    Ok(envelope) if envelope.errors.is_some() => envelope.into_result().map(|_| ()),
    _ => Err(Error::RemoteApi(format!("HTTP {}", response.status))),
  }
}

/// Flatten nested parameters into bracket-notation pairs.
///
/// `{"filter": {"title": {"_eq": "x"}}}` becomes `filter[title][_eq]=x`;
/// arrays use their index, nulls are skipped.
pub fn encode_query(params: &Map<String, Value>) -> Vec<(String, String)> {
  let mut pairs = Vec::new();
  for (key, value) in params {
    push_pairs(key.clone(), value, &mut pairs);
  }
  pairs
}

fn push_pairs(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
  match value {
    Value::Null => {}
    Value::Bool(b) => pairs.push((key, b.to_string())),
    Value::Number(n) => pairs.push((key, n.to_string())),
    Value::String(s) => pairs.push((key, s.clone())),
    Value::Array(items) => {
      for (index, item) in items.iter().enumerate() {
        push_pairs(format!("{}[{}]", key, index), item, pairs);
      }
    }
    Value::Object(map) => {
      for (sub, item) in map {
        push_pairs(format!("{}[{}]", key, sub), item, pairs);
      }
    }
  }
}
