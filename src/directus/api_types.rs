//! Serde types matching the Directus REST envelope.
//!
//! Every response is either `{"data": ...}` or `{"errors": [{"message": ...}]}`.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A record as returned by Directus, before any local reshaping.
pub type RemoteRecord = Map<String, Value>;

#[derive(Debug, Deserialize)]
pub struct ApiError {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub extensions: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub data: Option<Value>,
  #[serde(default)]
  pub errors: Option<Vec<ApiError>>,
}

impl ApiEnvelope {
  /// Turn an `errors` array into a single error.
  ///
  /// Only the first message is kept; the rest of the array is dropped.
  pub fn into_result(self) -> Result<Value> {
    if let Some(errors) = self.errors {
      let message = errors
        .into_iter()
        .next()
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Directus returned an empty error list".to_string());
      return Err(Error::RemoteApi(message));
    }

    self
      .data
      .ok_or_else(|| Error::RemoteApi("Response has no data".to_string()))
  }
}

/// Decode a response body holding a single record.
pub fn decode_record(body: &[u8]) -> Result<RemoteRecord> {
  match decode_envelope(body)?.into_result()? {
    Value::Object(record) => Ok(record),
    other => Err(Error::RemoteApi(format!(
      "Expected an object in data, got {}",
      kind(&other)
    ))),
  }
}

/// Decode a response body holding a list of records.
pub fn decode_records(body: &[u8]) -> Result<Vec<RemoteRecord>> {
  match decode_envelope(body)?.into_result()? {
    Value::Array(items) => items
      .into_iter()
      .map(|item| match item {
        Value::Object(record) => Ok(record),
        other => Err(Error::RemoteApi(format!(
          "Expected objects in data, got {}",
          kind(&other)
        ))),
      })
      .collect(),
    other => Err(Error::RemoteApi(format!(
      "Expected an array in data, got {}",
      kind(&other)
    ))),
  }
}

pub fn decode_envelope(body: &[u8]) -> Result<ApiEnvelope> {
  Ok(serde_json::from_slice(body)?)
}

fn kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
