//! Core traits and types for reconciled records.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::directus::RemoteRecord;
use crate::error::{Error, Result};

/// Local field holding the identifier of the record in the CMS.
pub const CMS_ID_FIELD: &str = "cms_id";

/// Identifier field of a Directus record.
pub const REMOTE_ID_FIELD: &str = "id";

/// Untyped record, for hosts binding entity types at runtime.
pub type Document = Map<String, Value>;

/// A remote record reshaped for the local schema; must carry `cms_id`.
pub type PreparedRecord = Map<String, Value>;

/// Types that can be rebuilt from records reconciled out of Directus.
pub trait Reconcile: DeserializeOwned {
  /// Reshape a remote record before it is persisted.
  ///
  /// The default copies the remote `id` into `cms_id`. Override to rename
  /// or convert fields into the local schema.
  fn prepare_data(record: RemoteRecord) -> Result<PreparedRecord> {
    copy_remote_id(record)
  }
}

/// A typed local entity with a fixed schema name.
pub trait CmsEntity: Reconcile {
  /// Local schema name (e.g. "Article"); the remote collection defaults to
  /// its lowercase plural.
  fn entity_type() -> &'static str;
}

impl Reconcile for Document {}

/// Default preparation: `cms_id = id`.
pub fn copy_remote_id(mut record: RemoteRecord) -> Result<PreparedRecord> {
  let id = record
    .get(REMOTE_ID_FIELD)
    .filter(|v| !v.is_null())
    .cloned()
    .ok_or_else(|| Error::InvalidArgument("Remote record has no id".to_string()))?;

  record.insert(CMS_ID_FIELD.to_string(), id);
  Ok(record)
}

/// Normalize a `cms_id` value into the key stored locally.
pub fn cms_key(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// A record persisted in local storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalRecord<T> {
  /// Local primary key
  pub id: i64,
  /// Identifier of the record in the CMS, unique per entity type
  pub cms_id: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Fields from the last reconciliation
  pub data: T,
}

impl LocalRecord<Document> {
  /// Decode the stored fields into a typed model.
  pub fn decode<T: DeserializeOwned>(self) -> Result<LocalRecord<T>> {
    let data = serde_json::from_value(Value::Object(self.data))?;
    Ok(LocalRecord {
      id: self.id,
      cms_id: self.cms_id,
      created_at: self.created_at,
      updated_at: self.updated_at,
      data,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn record(value: Value) -> RemoteRecord {
    match value {
      Value::Object(map) => map,
      _ => panic!("expected object"),
    }
  }

  #[test]
  fn test_copy_remote_id() {
    let prepared = copy_remote_id(record(json!({"id": 7, "title": "x"}))).unwrap();
    assert_eq!(prepared["cms_id"], 7);
    assert_eq!(prepared["id"], 7);
    assert_eq!(prepared["title"], "x");
  }

  #[test]
  fn test_copy_remote_id_requires_id() {
    assert!(matches!(
      copy_remote_id(record(json!({"title": "x"}))),
      Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
      copy_remote_id(record(json!({"id": null}))),
      Err(Error::InvalidArgument(_))
    ));
  }

  #[test]
  fn test_cms_key() {
    assert_eq!(cms_key(&json!(12)), Some("12".to_string()));
    assert_eq!(cms_key(&json!("a-b")), Some("a-b".to_string()));
    assert_eq!(cms_key(&json!("")), None);
    assert_eq!(cms_key(&json!(null)), None);
    assert_eq!(cms_key(&json!({"id": 1})), None);
  }
}
