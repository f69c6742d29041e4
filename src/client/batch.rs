use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use tracing::{info, warn};

use super::cache::request_key;
use super::sequential::SequentialClient;
use super::transport::RawResponse;
use super::wire::{
    self, BatchRequest, PackageBatchResponse, PackageKey, PackageRequest, VersionBatchResponse,
    VersionKey, VersionRequest,
};
use crate::model::{Ecosystem, PackageRef, PackageSummary, VersionInfo};
use crate::traits::{FetchError, FetchResult, MetadataClient};

/// Maximum number of lookups per grouped request.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Issues grouped requests up front, then answers lookups locally.
///
/// Lookups the batch did not answer (batch failure, missing items) fall back
/// to the wrapped [`SequentialClient`].
pub struct BatchClient {
    inner: SequentialClient,
    prefetched: RwLock<HashMap<String, RawResponse>>,
}

impl BatchClient {
    pub fn new(inner: SequentialClient) -> Self {
        Self {
            inner,
            prefetched: RwLock::new(HashMap::new()),
        }
    }

    pub fn prefetched_count(&self) -> usize {
        self.prefetched.read().map(|p| p.len()).unwrap_or(0)
    }

    fn seed(&self, url: String, response: RawResponse) {
        if let Ok(mut prefetched) = self.prefetched.write() {
            prefetched.insert(url, response);
        }
    }

    fn take_seeded(&self, url: &str) -> Option<RawResponse> {
        self.prefetched.write().ok().and_then(|mut p| p.remove(url))
    }

    async fn post_batch<T>(&self, endpoint: &str, body: &str) -> Result<T, FetchError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.inner.base_url(), endpoint);
        let response = self.inner.send(&url, Some(body)).await?;
        if !response.is_success() {
            return Err(FetchError::Http {
                url,
                status: response.status,
            });
        }
        serde_json::from_str(&response.body).map_err(|e| FetchError::Malformed {
            url,
            reason: e.to_string(),
        })
    }

    async fn prefetch_packages(&self, packages: &[PackageRef]) -> Result<usize, FetchError> {
        let mut wanted: HashMap<PackageKey, (Ecosystem, String)> = HashMap::new();
        for pkg in packages {
            let key = PackageKey {
                system: pkg.ecosystem.system_name(),
                name: pkg.name.trim().to_string(),
            };
            wanted.insert(key, (pkg.ecosystem.clone(), pkg.name.clone()));
        }

        let keys: BTreeSet<_> = wanted
            .keys()
            .map(|k| (k.system.clone(), k.name.clone()))
            .collect();
        let requests: Vec<PackageRequest> = keys
            .into_iter()
            .map(|(system, name)| PackageRequest {
                package_key: PackageKey { system, name },
            })
            .collect();

        let mut seeded = 0;
        for chunk in requests.chunks(MAX_BATCH_SIZE) {
            let body = serde_json::to_string(&BatchRequest {
                requests: chunk.to_vec(),
            })
            .map_err(|e| FetchError::Malformed {
                url: "packagebatch".into(),
                reason: e.to_string(),
            })?;
            let response: PackageBatchResponse = self.post_batch("packagebatch", &body).await?;

            for item in response.responses {
                let Some((ecosystem, name)) = wanted.get(&item.request.package_key) else {
                    continue;
                };
                let url = self.inner.package_url(ecosystem, name);
                self.seed(url, item_response(item.package));
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    async fn prefetch_versions(&self, packages: &[PackageRef]) -> Result<usize, FetchError> {
        let mut wanted: HashMap<VersionKey, PackageRef> = HashMap::new();
        for pkg in packages {
            let key = VersionKey {
                system: pkg.ecosystem.system_name(),
                name: pkg.name.trim().to_string(),
                version: pkg.version.trim().to_string(),
            };
            wanted.insert(key, pkg.clone());
        }

        let keys: BTreeSet<_> = wanted
            .keys()
            .map(|k| (k.system.clone(), k.name.clone(), k.version.clone()))
            .collect();
        let requests: Vec<VersionRequest> = keys
            .into_iter()
            .map(|(system, name, version)| VersionRequest {
                version_key: VersionKey {
                    system,
                    name,
                    version,
                },
            })
            .collect();

        let mut seeded = 0;
        for chunk in requests.chunks(MAX_BATCH_SIZE) {
            let body = serde_json::to_string(&BatchRequest {
                requests: chunk.to_vec(),
            })
            .map_err(|e| FetchError::Malformed {
                url: "versionbatch".into(),
                reason: e.to_string(),
            })?;
            let response: VersionBatchResponse = self.post_batch("versionbatch", &body).await?;

            for item in response.responses {
                let Some(pkg) = wanted.get(&item.request.version_key) else {
                    continue;
                };
                let url = self.inner.version_url(&pkg.ecosystem, &pkg.name, &pkg.version);
                self.seed(url, item_response(item.version));
                seeded += 1;
            }
        }
        Ok(seeded)
    }
}

/// A batch item with no payload means the service has no record of it.
fn item_response(payload: Option<serde_json::Value>) -> RawResponse {
    match payload {
        Some(value) if !value.is_null() => RawResponse::new(200, value.to_string()),
        _ => RawResponse::new(404, ""),
    }
}

#[async_trait]
impl MetadataClient for BatchClient {
    fn mode(&self) -> &'static str {
        "batch"
    }

    async fn prepare(&self, packages: &[PackageRef]) {
        if packages.is_empty() {
            return;
        }
        match self.prefetch_packages(packages).await {
            Ok(count) => info!(count, "prefetched package summaries"),
            Err(e) => warn!(error = %e, "package batch failed, falling back to sequential lookups"),
        }
        match self.prefetch_versions(packages).await {
            Ok(count) => info!(count, "prefetched version records"),
            Err(e) => warn!(error = %e, "version batch failed, falling back to sequential lookups"),
        }
    }

    async fn fetch_package(
        &self,
        ecosystem: &Ecosystem,
        name: &str,
    ) -> FetchResult<PackageSummary> {
        let url = self.inner.package_url(ecosystem, name);
        let decode = |body: &str| wire::decode_package(&url, ecosystem, body);
        match self.take_seeded(&url) {
            Some(response) => {
                let result = self.inner.accept(&request_key(&url, None), response, decode);
                match result {
                    Err(e) => {
                        warn!(url = %url, error = %e, "batch item malformed, refetching");
                        self.inner.fetch_package(ecosystem, name).await
                    }
                    ok => ok,
                }
            }
            None => self.inner.fetch_package(ecosystem, name).await,
        }
    }

    async fn fetch_version(
        &self,
        ecosystem: &Ecosystem,
        name: &str,
        version: &str,
    ) -> FetchResult<VersionInfo> {
        let url = self.inner.version_url(ecosystem, name, version);
        let decode = |body: &str| wire::decode_version(&url, body);
        match self.take_seeded(&url) {
            Some(response) => {
                let result = self.inner.accept(&request_key(&url, None), response, decode);
                match result {
                    Err(e) => {
                        warn!(url = %url, error = %e, "batch item malformed, refetching");
                        self.inner.fetch_version(ecosystem, name, version).await
                    }
                    ok => ok,
                }
            }
            None => self.inner.fetch_version(ecosystem, name, version).await,
        }
    }
}
