use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::{request_key, CacheStore};
use super::ratelimit::RateLimiter;
use super::retry::{retrying, RetryPolicy};
use super::transport::{RawResponse, Transport, TransportError};
use super::wire;
use crate::config::ClientConfig;
use crate::model::{Ecosystem, PackageSummary, VersionInfo};
use crate::traits::{FetchError, FetchOutcome, FetchResult, MetadataClient};

/// Percent-encodes one path token. The token is trimmed first so stray
/// whitespace or newlines from manifests never reach the request path.
pub fn encode_segment(token: &str) -> String {
    urlencoding::encode(token.trim()).into_owned()
}

/// One request per lookup, each consulting the cache first.
pub struct SequentialClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
    retry: RetryPolicy,
    limiter: Option<RateLimiter>,
}

impl SequentialClient {
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
            cache,
            retry: RetryPolicy::from(config.retry),
            limiter: RateLimiter::per_second(config.requests_per_second),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn package_url(&self, ecosystem: &Ecosystem, name: &str) -> String {
        format!(
            "{}/systems/{}/packages/{}",
            self.base_url,
            encode_segment(&ecosystem.system_name()),
            encode_segment(name)
        )
    }

    pub fn version_url(&self, ecosystem: &Ecosystem, name: &str, version: &str) -> String {
        format!(
            "{}/versions/{}",
            self.package_url(ecosystem, name),
            encode_segment(version)
        )
    }

    /// Cached GET returning the decoded body, `NotFound` on 404.
    pub(crate) async fn get<T, D>(&self, url: &str, decode: D) -> FetchResult<T>
    where
        D: Fn(&str) -> Result<T, FetchError>,
    {
        let key = request_key(url, None);
        if let Some(entry) = self.cache.get(&key) {
            if entry.status == 404 {
                return Ok(FetchOutcome::NotFound);
            }
            match decode(&entry.payload) {
                Ok(value) => return Ok(FetchOutcome::Found(value)),
                Err(e) => warn!(url, error = %e, "cached payload no longer decodes, refetching"),
            }
        }

        let response = self.send(url, None).await?;
        self.accept(&key, response, decode)
    }

    /// Interprets a fresh 2xx/404 response, caching it only when valid.
    pub(crate) fn accept<T, D>(&self, key: &str, response: RawResponse, decode: D) -> FetchResult<T>
    where
        D: Fn(&str) -> Result<T, FetchError>,
    {
        if response.status == 404 {
            self.cache.put(key, 404, "");
            return Ok(FetchOutcome::NotFound);
        }
        let value = decode(&response.body)?;
        self.cache.put(key, response.status, &response.body);
        Ok(FetchOutcome::Found(value))
    }

    /// Sends a request with rate limiting and retries. Returns only 2xx or
    /// 404 responses; everything else becomes a [`FetchError`].
    pub(crate) async fn send(&self, url: &str, body: Option<&str>) -> Result<RawResponse, FetchError> {
        retrying(&self.retry, |attempt| async move {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            debug!(url, attempt, "sending request");
            let result = match body {
                Some(body) => self.transport.post_json(url, body).await,
                None => self.transport.get(url).await,
            };
            classify(url, result)
        })
        .await
    }
}

fn classify(
    url: &str,
    result: Result<RawResponse, TransportError>,
) -> Result<RawResponse, FetchError> {
    match result {
        Err(e) => Err(FetchError::Transient {
            url: url.to_string(),
            reason: e.to_string(),
            attempts: 1,
        }),
        Ok(resp) if resp.status == 429 => Err(FetchError::RateLimited {
            url: url.to_string(),
            attempts: 1,
        }),
        Ok(resp) if resp.is_success() || resp.status == 404 => Ok(resp),
        Ok(resp) => Err(FetchError::Http {
            url: url.to_string(),
            status: resp.status,
        }),
    }
}

#[async_trait]
impl MetadataClient for SequentialClient {
    fn mode(&self) -> &'static str {
        "sequential"
    }

    async fn fetch_package(
        &self,
        ecosystem: &Ecosystem,
        name: &str,
    ) -> FetchResult<PackageSummary> {
        let url = self.package_url(ecosystem, name);
        self.get(&url, |body| wire::decode_package(&url, ecosystem, body))
            .await
    }

    async fn fetch_version(
        &self,
        ecosystem: &Ecosystem,
        name: &str,
        version: &str,
    ) -> FetchResult<VersionInfo> {
        let url = self.version_url(ecosystem, name, version);
        self.get(&url, |body| wire::decode_version(&url, body)).await
    }
}
