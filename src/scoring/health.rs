//! Composite package health.
//!
//! Five components are scored independently on 0-100 and combined with the
//! configured weights:
//!
//! | Component   | Signal                                   | Unknown signal |
//! |-------------|------------------------------------------|----------------|
//! | scorecard   | service scorecard (0-10) x 10            | 50             |
//! | maintenance | days since last release; 0 if deprecated | 50             |
//! | security    | advisories against the exact version     | 50             |
//! | freshness   | major/minor/patch distance to latest     | 50             |
//! | popularity  | dependent count, log buckets             | -              |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::steps::{
    FRESHNESS_BY_MAJORS_BEHIND, FRESHNESS_BY_MINORS_BEHIND, FRESHNESS_PATCH_BEHIND,
    MAINTENANCE_BY_AGE_DAYS, POPULARITY_BY_DEPENDENTS, SECURITY_BY_ADVISORIES,
};
use super::version::SemVersion;
use crate::config::{GradeThresholds, ScoringConfig, ScoringWeights};
use crate::model::{PackageRef, PackageSummary, VersionInfo};
use crate::traits::{FetchOutcome, FetchResult};

pub const NEUTRAL_SCORE: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl Grade {
    pub fn from_score(score: u8, thresholds: &GradeThresholds) -> Self {
        if score >= thresholds.excellent {
            Grade::Excellent
        } else if score >= thresholds.good {
            Grade::Good
        } else if score >= thresholds.fair {
            Grade::Fair
        } else if score >= thresholds.poor {
            Grade::Poor
        } else {
            Grade::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub scorecard: u8,
    pub maintenance: u8,
    pub security: u8,
    pub freshness: u8,
    pub popularity: u8,
}

impl ComponentScores {
    pub fn as_array(&self) -> [u8; 5] {
        [
            self.scorecard,
            self.maintenance,
            self.security,
            self.freshness,
            self.popularity,
        ]
    }

    /// Weighted sum rounded to the nearest integer, clamped to 0-100.
    pub fn composite(&self, weights: &ScoringWeights) -> u8 {
        let total: f64 = self
            .as_array()
            .iter()
            .zip(weights.as_array())
            .map(|(score, weight)| f64::from(*score) * weight)
            .sum();
        total.round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResult {
    pub health_score: u8,
    pub health_grade: Grade,
    pub components: ComponentScores,
    pub latest_version: Option<String>,
    pub is_outdated: bool,
    /// Effective scorecard (0-10) used for the scorecard component.
    pub scorecard: Option<f64>,
    pub dependent_count: u64,
    pub days_since_release: Option<i64>,
    pub advisories: Vec<String>,
    pub licenses: Vec<String>,
    pub has_provenance: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Outcome of scoring one package; failures keep the package identity.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAssessment {
    Scored(HealthResult),
    Failed { package: PackageRef, reason: String },
}

pub struct HealthScorer {
    weights: ScoringWeights,
    grades: GradeThresholds,
    as_of: DateTime<Utc>,
}

impl HealthScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            weights: config.weights,
            grades: config.grades,
            as_of: Utc::now(),
        }
    }

    /// Fixes the reference time used to age releases.
    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn grade(&self, score: u8) -> Grade {
        Grade::from_score(score, &self.grades)
    }

    /// Scores `target_version` of the package described by `summary`.
    ///
    /// Without a version record the security component is neutral.
    pub fn score(
        &self,
        summary: &PackageSummary,
        version: Option<&VersionInfo>,
        target_version: &str,
    ) -> HealthResult {
        let scorecard = summary
            .scorecard
            .or_else(|| version.and_then(|v| v.project_scorecard));
        let days_since_release = summary
            .last_published()
            .map(|published| (self.as_of - published).num_days().max(0));

        let components = ComponentScores {
            scorecard: scorecard_component(scorecard),
            maintenance: maintenance_component(summary.deprecated, days_since_release),
            security: security_component(version),
            freshness: freshness_component(target_version, summary.latest_version.as_deref()),
            popularity: POPULARITY_BY_DEPENDENTS.lookup(summary.dependent_count),
        };
        let health_score = components.composite(&self.weights);

        let is_outdated = summary
            .latest_version
            .as_deref()
            .map(|latest| SemVersion::parse(latest) > SemVersion::parse(target_version))
            .unwrap_or(false);

        HealthResult {
            health_score,
            health_grade: self.grade(health_score),
            components,
            latest_version: summary.latest_version.clone(),
            is_outdated,
            scorecard,
            dependent_count: summary.dependent_count,
            days_since_release,
            advisories: version.map(VersionInfo::advisory_ids).unwrap_or_default(),
            licenses: version.map(|v| v.licenses.clone()).unwrap_or_default(),
            has_provenance: version.map(VersionInfo::has_provenance).unwrap_or(false),
            warnings: Vec::new(),
        }
    }

    /// Scores a package from raw fetch results.
    ///
    /// A failed or empty summary lookup never yields a fabricated score.
    pub fn assess(
        &self,
        package: &PackageRef,
        summary: &FetchResult<PackageSummary>,
        version: &FetchResult<VersionInfo>,
    ) -> HealthAssessment {
        let summary = match summary {
            Ok(FetchOutcome::Found(summary)) => summary,
            Ok(FetchOutcome::NotFound) => {
                return HealthAssessment::Failed {
                    package: package.clone(),
                    reason: "package not found in metadata service".to_string(),
                }
            }
            Err(e) => {
                return HealthAssessment::Failed {
                    package: package.clone(),
                    reason: e.to_string(),
                }
            }
        };

        let (version_info, warning) = match version {
            Ok(FetchOutcome::Found(info)) => (Some(info), None),
            Ok(FetchOutcome::NotFound) => (
                None,
                Some(format!(
                    "version {} not found; security scored neutral",
                    package.version
                )),
            ),
            Err(e) => (
                None,
                Some(format!("version lookup failed ({e}); security scored neutral")),
            ),
        };

        let mut result = self.score(summary, version_info, &package.version);
        result.warnings.extend(warning);
        HealthAssessment::Scored(result)
    }
}

pub fn scorecard_component(score: Option<f64>) -> u8 {
    match score {
        Some(s) if s.is_finite() => (s * 10.0).round().clamp(0.0, 100.0) as u8,
        _ => NEUTRAL_SCORE,
    }
}

pub fn maintenance_component(deprecated: bool, days_since_release: Option<i64>) -> u8 {
    if deprecated {
        return 0;
    }
    match days_since_release {
        Some(days) => MAINTENANCE_BY_AGE_DAYS.lookup(days.max(0) as u64),
        None => NEUTRAL_SCORE,
    }
}

pub fn security_component(version: Option<&VersionInfo>) -> u8 {
    match version {
        Some(info) => SECURITY_BY_ADVISORIES.lookup(info.advisories.len() as u64),
        None => NEUTRAL_SCORE,
    }
}

pub fn freshness_component(current: &str, latest: Option<&str>) -> u8 {
    let Some(latest) = latest else {
        return NEUTRAL_SCORE;
    };
    if current.trim() == latest.trim() {
        return 100;
    }

    let current = SemVersion::parse(current);
    let latest = SemVersion::parse(latest);
    if current >= latest {
        return 100;
    }
    if latest.major > current.major {
        return FRESHNESS_BY_MAJORS_BEHIND.lookup(latest.major - current.major);
    }
    if latest.minor > current.minor {
        return FRESHNESS_BY_MINORS_BEHIND.lookup(latest.minor - current.minor);
    }
    FRESHNESS_PATCH_BEHIND
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Advisory, Ecosystem, VersionEntry};
    use crate::traits::FetchError;

    fn summary(latest: &str) -> PackageSummary {
        PackageSummary {
            ecosystem: Ecosystem::Npm,
            name: "demo".into(),
            latest_version: Some(latest.into()),
            deprecated: false,
            deprecation_message: None,
            scorecard: None,
            dependent_count: 0,
            versions: vec![VersionEntry {
                version: latest.into(),
                published_at: None,
                is_default: true,
                is_deprecated: false,
            }],
        }
    }

    fn version_with_advisories(n: usize) -> VersionInfo {
        VersionInfo {
            version: "1.0.0".into(),
            advisories: (0..n)
                .map(|i| Advisory {
                    id: format!("GHSA-{i}"),
                })
                .collect(),
            ..VersionInfo::default()
        }
    }

    fn scorer() -> HealthScorer {
        HealthScorer::new(&ScoringConfig::default())
            .as_of("2025-01-01T00:00:00Z".parse().unwrap())
    }

    #[test]
    fn test_deprecated_zeroes_maintenance() {
        let mut s = summary("1.0.0");
        s.deprecated = true;
        s.versions[0].published_at = Some("2024-12-31T00:00:00Z".parse().unwrap());
        let result = scorer().score(&s, Some(&version_with_advisories(0)), "1.0.0");
        assert_eq!(result.components.maintenance, 0);
    }

    #[test]
    fn test_maintenance_from_release_age() {
        let mut s = summary("1.0.0");
        s.versions[0].published_at = Some("2024-10-01T00:00:00Z".parse().unwrap());
        let result = scorer().score(&s, None, "1.0.0");
        assert_eq!(result.days_since_release, Some(92));
        assert_eq!(result.components.maintenance, 85);

        s.versions[0].published_at = Some("2022-01-01T00:00:00Z".parse().unwrap());
        assert_eq!(scorer().score(&s, None, "1.0.0").components.maintenance, 30);
    }

    #[test]
    fn test_neutral_components_without_signals() {
        let result = scorer().score(&summary("1.0.0"), None, "1.0.0");
        assert_eq!(result.components.scorecard, 50);
        assert_eq!(result.components.maintenance, 50);
        assert_eq!(result.components.security, 50);
        assert_eq!(result.components.freshness, 100);
        assert_eq!(result.components.popularity, 30);
    }

    #[test]
    fn test_scorecard_scaling_and_fallback() {
        assert_eq!(scorecard_component(Some(7.5)), 75);
        assert_eq!(scorecard_component(Some(10.0)), 100);
        assert_eq!(scorecard_component(None), 50);

        let version = VersionInfo {
            project_scorecard: Some(6.2),
            ..version_with_advisories(0)
        };
        let result = scorer().score(&summary("1.0.0"), Some(&version), "1.0.0");
        assert_eq!(result.scorecard, Some(6.2));
        assert_eq!(result.components.scorecard, 62);
    }

    #[test]
    fn test_freshness_rules() {
        assert_eq!(freshness_component("2.0.0", Some("2.0.0")), 100);
        assert_eq!(freshness_component("1.9.0", Some("1.10.0")), 75);
        assert_eq!(freshness_component("1.8.0", Some("1.10.0")), 65);
        assert_eq!(freshness_component("1.2.0", Some("1.10.0")), 50);
        assert_eq!(freshness_component("1.10.0", Some("1.10.4")), 90);
        assert_eq!(freshness_component("1.9.0", Some("2.0.0")), 25);
        assert_eq!(freshness_component("1.0.0", Some("3.1.0")), 10);
        assert_eq!(freshness_component("3.0.0", Some("2.9.0")), 100);
        assert_eq!(freshness_component("1.0.0", None), 50);
    }

    #[test]
    fn test_composite_for_unscored_package_one_minor_behind() {
        let mut s = summary("1.10.0");
        s.dependent_count = 120;
        let result = scorer().score(&s, Some(&version_with_advisories(0)), "1.9.0");

        assert_eq!(result.components.freshness, 75);
        assert_eq!(result.components.security, 100);
        assert_eq!(result.components.maintenance, 50);
        assert_eq!(result.components.scorecard, 50);
        assert_eq!(result.components.popularity, 60);
        // 0.30*50 + 0.25*50 + 0.25*100 + 0.10*75 + 0.10*60 = 66
        assert_eq!(result.health_score, 66);
        assert_eq!(result.health_grade, Grade::Fair);
        assert!(result.is_outdated);
    }

    #[test]
    fn test_grade_thresholds() {
        let grades = GradeThresholds::default();
        assert_eq!(Grade::from_score(100, &grades), Grade::Excellent);
        assert_eq!(Grade::from_score(90, &grades), Grade::Excellent);
        assert_eq!(Grade::from_score(89, &grades), Grade::Good);
        assert_eq!(Grade::from_score(75, &grades), Grade::Good);
        assert_eq!(Grade::from_score(60, &grades), Grade::Fair);
        assert_eq!(Grade::from_score(40, &grades), Grade::Poor);
        assert_eq!(Grade::from_score(39, &grades), Grade::Critical);
    }

    #[test]
    fn test_failed_summary_is_not_scored() {
        let pkg = PackageRef::new("npm", "demo", "1.0.0");
        let err: FetchResult<PackageSummary> = Err(FetchError::Http {
            url: "u".into(),
            status: 500,
        });
        let version: FetchResult<VersionInfo> = Ok(FetchOutcome::NotFound);

        match scorer().assess(&pkg, &err, &version) {
            HealthAssessment::Failed { package, reason } => {
                assert_eq!(package, pkg);
                assert!(reason.contains("500"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let missing: FetchResult<PackageSummary> = Ok(FetchOutcome::NotFound);
        assert!(matches!(
            scorer().assess(&pkg, &missing, &version),
            HealthAssessment::Failed { .. }
        ));
    }

    #[test]
    fn test_missing_version_record_adds_warning() {
        let pkg = PackageRef::new("npm", "demo", "1.0.0");
        let summary: FetchResult<PackageSummary> = Ok(FetchOutcome::Found(summary("1.0.0")));
        let version: FetchResult<VersionInfo> = Ok(FetchOutcome::NotFound);

        let HealthAssessment::Scored(result) = scorer().assess(&pkg, &summary, &version) else {
            panic!("expected a score");
        };
        assert_eq!(result.components.security, 50);
        assert_eq!(result.warnings.len(), 1);
    }
}
