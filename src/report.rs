//! Final report object.
//!
//! Rendered to JSON as-is; presentation formats consume the same structure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::client::CacheStats;
use crate::consistency::VersionInconsistency;
use crate::deprecation::{DeprecationResult, DeprecationUrgency};
use crate::model::PackageRef;
use crate::scoring::{Grade, HealthResult};

// ============================================================================
// Per-package entries
// ============================================================================

/// One analyzed package ref. Failed packages keep their identity and carry
/// `error` instead of health fields. Repository runs tag each entry with the
/// repository whose manifest listed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageReport {
    #[serde(flatten)]
    pub package: PackageRef,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    #[serde(flatten)]
    pub health: Option<HealthResult>,

    pub deprecation: Option<DeprecationResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<DeprecationUrgency>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageReport {
    pub fn failed(
        package: PackageRef,
        repository: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            package,
            repository,
            health: None,
            deprecation: None,
            urgency: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation.as_ref().is_some_and(|d| d.deprecated)
    }

    pub fn health_score(&self) -> Option<u8> {
        self.health.as_ref().map(|h| h.health_score)
    }
}

// ============================================================================
// Summary & metadata
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_packages: usize,
    pub unique_packages: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub deprecated: usize,
    pub low_health: usize,
    pub outdated: usize,
    pub inconsistencies: usize,
    pub average_health_score: Option<f64>,
    pub grades: BTreeMap<Grade, usize>,
}

impl ReportSummary {
    /// Counts over `packages`, one per entry; `unique_packages` counts
    /// distinct refs. `low_health_threshold` is exclusive (a score of
    /// exactly the threshold is not low).
    pub fn compute(
        packages: &[PackageReport],
        inconsistencies: &[VersionInconsistency],
        low_health_threshold: u8,
    ) -> Self {
        let mut summary = ReportSummary {
            total_packages: packages.len(),
            unique_packages: packages.iter().map(|p| &p.package).collect::<HashSet<_>>().len(),
            inconsistencies: inconsistencies.len(),
            ..ReportSummary::default()
        };

        let mut score_total = 0u64;
        for package in packages {
            if package.is_deprecated() {
                summary.deprecated += 1;
            }
            let Some(health) = &package.health else {
                summary.failed += 1;
                continue;
            };
            summary.analyzed += 1;
            score_total += u64::from(health.health_score);
            if health.health_score < low_health_threshold {
                summary.low_health += 1;
            }
            if health.is_outdated {
                summary.outdated += 1;
            }
            *summary.grades.entry(health.health_grade).or_default() += 1;
        }

        if summary.analyzed > 0 {
            let average = score_total as f64 / summary.analyzed as f64;
            summary.average_health_score = Some((average * 10.0).round() / 10.0);
        }
        summary
    }
}

/// Timing and cache statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub total_duration_ms: u64,
    pub prepare_duration_ms: u64,
    pub analysis_duration_ms: u64,
    pub consistency_duration_ms: u64,
    pub timeouts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub engine_version: String,
    pub client_mode: String,
    pub stats: RunStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub packages: Vec<PackageReport>,
    pub version_inconsistencies: Vec<VersionInconsistency>,
    pub metadata: ReportMetadata,
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages.iter().filter(|p| p.is_failed())
    }
}
