//! In-memory transport for unit tests.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::DirectusConfig;
use crate::directus::client::DirectusClient;
use crate::directus::transport::{HttpRequest, Transport, TransportResponse};
use crate::error::{Error, Result};

/// Transport answering from canned responses keyed by URL path.
///
/// Unknown paths get a Directus-style 404. Every request is recorded, and
/// once offline every request fails at the transport level.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<HashMap<String, TransportResponse>>,
  requests: Mutex<Vec<HttpRequest>>,
  outage: Mutex<Option<String>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, path: &str, status: u16, content_disposition: Option<&str>, body: Vec<u8>) {
    self.routes.lock().unwrap().insert(
      path.to_string(),
      TransportResponse {
        status,
        content_disposition: content_disposition.map(String::from),
        body,
      },
    );
  }

  pub fn respond_json(&self, path: &str, status: u16, body: Value) {
    self.respond(path, status, None, serde_json::to_vec(&body).unwrap());
  }

  /// Fail every following request with a connection error.
  pub fn go_offline(&self, message: &str) {
    *self.outage.lock().unwrap() = Some(message.to_string());
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

impl Transport for FakeTransport {
  async fn get(&self, request: &HttpRequest) -> Result<TransportResponse> {
    self.requests.lock().unwrap().push(request.clone());

    if let Some(message) = self.outage.lock().unwrap().clone() {
      return Err(Error::Transport(message.into()));
    }

    let response = self.routes.lock().unwrap().get(request.url.path()).cloned();
    Ok(response.unwrap_or_else(|| TransportResponse {
      status: 404,
      content_disposition: None,
      body: br#"{"errors":[{"message":"Route not found"}]}"#.to_vec(),
    }))
  }
}

pub fn client_with(transport: &Arc<FakeTransport>) -> DirectusClient<FakeTransport> {
  let config = DirectusConfig::new("https://cms.test", "test-token");
  DirectusClient::new(&config, Arc::clone(transport)).unwrap()
}
