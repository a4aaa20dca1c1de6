//! Directus REST API access: transport, client and query builders.

pub mod api_types;
pub mod client;
pub mod query;
pub mod sink;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use api_types::RemoteRecord;
pub use client::DirectusClient;
pub use query::{Assets, Items, Query, QueryBuilder, QueryFilter, QueryParams, ASSETS_COLLECTION};
pub use sink::{AssetSink, LocalDisk};
pub use transport::{HttpRequest, HttpTransport, Transport, TransportResponse};
