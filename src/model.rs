use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Publication status used by Directus collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
  Draft,
  Published,
  Archived,
  Deleted,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Status::Draft => "draft",
      Status::Published => "published",
      Status::Archived => "archived",
      Status::Deleted => "deleted",
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<Status> for Value {
  fn from(status: Status) -> Self {
    Value::String(status.as_str().to_string())
  }
}
