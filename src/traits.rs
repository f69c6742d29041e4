use crate::model::{Ecosystem, PackageRef, PackageSummary, VersionInfo};
use async_trait::async_trait;
use thiserror::Error;

/// A successful lookup against the metadata service.
///
/// `NotFound` is a legitimate, cacheable answer and not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Found(T),
    NotFound,
}

impl<T> FetchOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            FetchOutcome::Found(value) => Some(value),
            FetchOutcome::NotFound => None,
        }
    }

    pub fn as_found(&self) -> Option<&T> {
        match self {
            FetchOutcome::Found(value) => Some(value),
            FetchOutcome::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Found(value) => FetchOutcome::Found(f(value)),
            FetchOutcome::NotFound => FetchOutcome::NotFound,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Request to {url} failed after {attempts} attempt(s): {reason}")]
    Transient {
        url: String,
        reason: String,
        attempts: u32,
    },
    #[error("Rate limited by {url} after {attempts} attempt(s)")]
    RateLimited { url: String, attempts: u32 },
    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("Unexpected HTTP status {status} from {url}")]
    Http { url: String, status: u16 },
}

impl FetchError {
    /// Transport failures and HTTP 429 are retried; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transient { .. } | FetchError::RateLimited { .. }
        )
    }

    pub(crate) fn with_attempts(self, total: u32) -> Self {
        match self {
            FetchError::Transient { url, reason, .. } => FetchError::Transient {
                url,
                reason,
                attempts: total,
            },
            FetchError::RateLimited { url, .. } => FetchError::RateLimited {
                url,
                attempts: total,
            },
            other => other,
        }
    }
}

pub type FetchResult<T> = Result<FetchOutcome<T>, FetchError>;

/// Source of package and version metadata.
///
/// Implementations differ in how they talk to the service (one request per
/// lookup, or grouped requests), never in what they return.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Short identifier for logs and report metadata (e.g. `"sequential"`).
    fn mode(&self) -> &'static str;

    /// Called once with the full package list before any lookup.
    ///
    /// Default implementation does nothing.
    async fn prepare(&self, _packages: &[PackageRef]) {}

    async fn fetch_package(&self, ecosystem: &Ecosystem, name: &str)
        -> FetchResult<PackageSummary>;

    async fn fetch_version(
        &self,
        ecosystem: &Ecosystem,
        name: &str,
        version: &str,
    ) -> FetchResult<VersionInfo>;
}
