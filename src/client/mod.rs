//! Metadata client: talks to the package metadata service.
//!
//! - [`transport`]: HTTP seam ([`Transport`], reqwest-backed [`HttpTransport`])
//! - [`cache`]: TTL response cache keyed by request hash
//! - [`retry`]: bounded linear-backoff retry policy
//! - [`ratelimit`]: token bucket applied before each network attempt
//! - [`wire`]: service JSON shapes and body validation
//! - [`SequentialClient`] / [`BatchClient`]: the two [`MetadataClient`] implementations

pub mod batch;
pub mod cache;
pub mod ratelimit;
pub mod retry;
pub mod sequential;
pub mod transport;
pub mod wire;

use std::sync::Arc;

pub use batch::BatchClient;
pub use cache::{CacheEntry, CacheStats, CacheStore};
pub use retry::RetryPolicy;
pub use sequential::SequentialClient;
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};

use crate::config::{ClientConfig, ClientMode};
use crate::traits::MetadataClient;

/// Builds the client selected by `config.mode` over the given transport.
pub fn build_client(
    config: &ClientConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
) -> Arc<dyn MetadataClient> {
    let sequential = SequentialClient::with_transport(config, transport, cache);
    match config.mode {
        ClientMode::Sequential => Arc::new(sequential),
        ClientMode::Batch => Arc::new(BatchClient::new(sequential)),
    }
}

/// Builds the configured client over a real HTTP transport.
pub fn build_http_client(
    config: &ClientConfig,
    cache: Arc<CacheStore>,
) -> Result<Arc<dyn MetadataClient>, TransportError> {
    let transport = Arc::new(HttpTransport::new(config)?);
    Ok(build_client(config, transport, cache))
}
