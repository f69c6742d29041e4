//! Metadata service wire format.
//!
//! Field names follow the service's camelCase JSON. Everything optional on
//! the wire is optional here; the `decode_*` functions are where a body is
//! judged well-formed or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Advisory, Ecosystem, PackageSummary, Provenance, VersionEntry, VersionInfo};
use crate::traits::FetchError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PackageKey {
    pub system: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VersionKey {
    pub system: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageBody {
    package_key: PackageKey,
    #[serde(default)]
    versions: Vec<VersionItem>,
    #[serde(default)]
    scorecard: Option<ScorecardBody>,
    #[serde(default)]
    dependent_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionItem {
    version_key: VersionKey,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    is_default: bool,
    #[serde(default)]
    is_deprecated: bool,
    #[serde(default)]
    deprecated_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionBody {
    version_key: VersionKey,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    licenses: Vec<String>,
    #[serde(default)]
    advisory_keys: Vec<AdvisoryKey>,
    #[serde(default)]
    slsa_provenances: Vec<SlsaProvenance>,
    #[serde(default, alias = "relatedProjects")]
    projects: Vec<ProjectBody>,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AdvisoryKey {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlsaProvenance {
    #[serde(default)]
    source_repository: String,
    #[serde(default)]
    commit: Option<String>,
    #[serde(default)]
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectBody {
    #[serde(default)]
    scorecard: Option<ScorecardBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScorecardBody {
    overall_score: f64,
}

fn malformed(url: &str, reason: impl Into<String>) -> FetchError {
    FetchError::Malformed {
        url: url.to_string(),
        reason: reason.into(),
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.filter(|s| !s.trim().is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn checked_scorecard(url: &str, score: Option<&ScorecardBody>) -> Result<Option<f64>, FetchError> {
    match score.map(|s| s.overall_score) {
        Some(s) if !s.is_finite() || !(0.0..=10.0).contains(&s) => {
            Err(malformed(url, format!("scorecard {s} outside 0-10")))
        }
        other => Ok(other),
    }
}

/// Decodes a package-level response body.
pub fn decode_package(
    url: &str,
    ecosystem: &Ecosystem,
    body: &str,
) -> Result<PackageSummary, FetchError> {
    let parsed: PackageBody = serde_json::from_str(body).map_err(|e| malformed(url, e.to_string()))?;
    if parsed.package_key.name.trim().is_empty() {
        return Err(malformed(url, "empty package name"));
    }
    let scorecard = checked_scorecard(url, parsed.scorecard.as_ref())?;

    let latest = parsed
        .versions
        .iter()
        .find(|v| v.is_default)
        .or_else(|| parsed.versions.last());

    let latest_version = latest.map(|v| v.version_key.version.clone());
    let deprecated = latest.map(|v| v.is_deprecated).unwrap_or(false);
    let deprecation_message = latest
        .and_then(|v| v.deprecated_reason.clone())
        .filter(|m| !m.trim().is_empty());

    let versions = parsed
        .versions
        .iter()
        .map(|v| VersionEntry {
            version: v.version_key.version.clone(),
            published_at: parse_time(v.published_at.as_deref()),
            is_default: v.is_default,
            is_deprecated: v.is_deprecated,
        })
        .collect();

    Ok(PackageSummary {
        ecosystem: ecosystem.clone(),
        name: parsed.package_key.name,
        latest_version,
        deprecated,
        deprecation_message,
        scorecard,
        dependent_count: parsed.dependent_count.unwrap_or(0),
        versions,
    })
}

/// Decodes a version-level response body.
pub fn decode_version(url: &str, body: &str) -> Result<VersionInfo, FetchError> {
    let parsed: VersionBody = serde_json::from_str(body).map_err(|e| malformed(url, e.to_string()))?;
    if parsed.version_key.version.trim().is_empty() {
        return Err(malformed(url, "empty version"));
    }

    let mut project_scorecard = None;
    for project in &parsed.projects {
        if let Some(score) = checked_scorecard(url, project.scorecard.as_ref())? {
            project_scorecard = Some(score);
            break;
        }
    }

    Ok(VersionInfo {
        version: parsed.version_key.version,
        published_at: parse_time(parsed.published_at.as_deref()),
        licenses: parsed.licenses,
        advisories: parsed
            .advisory_keys
            .into_iter()
            .map(|a| Advisory { id: a.id })
            .collect(),
        dependencies: parsed.dependencies,
        project_scorecard,
        provenance: parsed
            .slsa_provenances
            .into_iter()
            .map(|p| Provenance {
                source_repository: p.source_repository,
                commit: p.commit,
                verified: p.verified,
            })
            .collect(),
    })
}

// ============================================================================
// Batch requests
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BatchRequest<K> {
    pub requests: Vec<K>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequest {
    pub package_key: PackageKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct VersionRequest {
    pub version_key: VersionKey,
}

#[derive(Debug, Deserialize)]
pub struct PackageBatchResponse {
    #[serde(default)]
    pub responses: Vec<PackageBatchItem>,
}

#[derive(Debug, Deserialize)]
pub struct PackageBatchItem {
    pub request: PackageRequest,
    #[serde(default)]
    pub package: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct VersionBatchResponse {
    #[serde(default)]
    pub responses: Vec<VersionBatchItem>,
}

#[derive(Debug, Deserialize)]
pub struct VersionBatchItem {
    pub request: VersionRequest,
    #[serde(default)]
    pub version: Option<serde_json::Value>,
}
