//! HTTP transport seam between the Directus client and the network.

use futures::StreamExt;
use reqwest::header::CONTENT_DISPOSITION;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::config::DirectusConfig;
use crate::error::Result;

/// An authenticated GET request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub url: Url,
  pub bearer_token: String,
}

/// The parts of a response the client looks at.
#[derive(Debug, Clone)]
pub struct TransportResponse {
  pub status: u16,
  pub content_disposition: Option<String>,
  pub body: Vec<u8>,
}

impl TransportResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Sends requests to Directus.
///
/// Retries and timeouts are the implementation's business; the client never
/// retries on its own.
pub trait Transport: Send + Sync {
  fn get(&self, request: &HttpRequest) -> impl Future<Output = Result<TransportResponse>> + Send;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(config: &DirectusConfig) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.request_timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }

    Ok(Self {
      client: builder.build()?,
    })
  }
}

impl Transport for HttpTransport {
  async fn get(&self, request: &HttpRequest) -> Result<TransportResponse> {
    let response = self
      .client
      .get(request.url.clone())
      .bearer_auth(&request.bearer_token)
      .send()
      .await?;

    let status = response.status().as_u16();
    let content_disposition = response
      .headers()
      .get(CONTENT_DISPOSITION)
      .and_then(|v| v.to_str().ok())
      .map(String::from);

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
      body.extend_from_slice(&chunk?);
    }

    Ok(TransportResponse {
      status,
      content_disposition,
      body,
    })
  }
}
