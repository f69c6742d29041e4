//! Cross-repository version consistency.
//!
//! Groups the usages of one package by version, picks a standardization
//! target and plans the migrations needed to reach it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Ecosystem, UsageRecord};
use crate::scoring::{compare_versions, SemVersion};

const EFFORT_HOURS_PER_REPO: u32 = 2;
const BREAKING_EFFORT_HOURS_PER_REPO: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// Classifies moving a repository from `from` to `to`.
    pub fn classify(from: &str, to: &str) -> Self {
        let from = SemVersion::parse(from);
        let to = SemVersion::parse(to);
        if from.major != to.major {
            Complexity::Complex
        } else if from.minor == to.minor {
            Complexity::Trivial
        } else if from.minor.abs_diff(to.minor) <= 1 {
            Complexity::Simple
        } else {
            Complexity::Moderate
        }
    }

    pub fn is_breaking(self) -> bool {
        self == Complexity::Complex
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionGroup {
    pub version: String,
    pub repositories: Vec<String>,
}

impl VersionGroup {
    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTask {
    pub from_version: String,
    pub to_version: String,
    pub repositories: Vec<String>,
    pub complexity: Complexity,
    pub breaking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInconsistency {
    pub ecosystem: Ecosystem,
    pub package: String,
    pub unique_versions: usize,
    pub total_repositories: usize,
    pub version_groups: Vec<VersionGroup>,
    pub most_common_version: String,
    pub latest_version: String,
    pub outlier_versions: Vec<String>,
    pub recommended_version: String,
    pub severity: Severity,
    pub migration_tasks: Vec<MigrationTask>,
    pub affected_repositories: usize,
    pub has_breaking_changes: bool,
    pub estimated_effort_hours: u32,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyOutcome {
    Consistent,
    /// Several versions in use, but across too few repositories to act on.
    InsufficientSample {
        unique_versions: usize,
        total_repositories: usize,
        minimum: usize,
    },
    Inconsistent(VersionInconsistency),
}

impl ConsistencyOutcome {
    pub fn inconsistency(self) -> Option<VersionInconsistency> {
        match self {
            ConsistencyOutcome::Inconsistent(found) => Some(found),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsistencyAnalyzer {
    min_repositories: usize,
}

impl Default for ConsistencyAnalyzer {
    fn default() -> Self {
        Self::new(2)
    }
}

impl ConsistencyAnalyzer {
    pub fn new(min_repositories: usize) -> Self {
        Self { min_repositories }
    }

    pub fn min_repositories(&self) -> usize {
        self.min_repositories
    }

    pub fn analyze(
        &self,
        ecosystem: &Ecosystem,
        package: &str,
        records: &[UsageRecord],
    ) -> ConsistencyOutcome {
        let mut by_version: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for record in records {
            by_version
                .entry(record.version.trim())
                .or_default()
                .insert(record.repository.as_str());
        }
        if by_version.len() < 2 {
            return ConsistencyOutcome::Consistent;
        }

        let total_repositories = records
            .iter()
            .map(|r| r.repository.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        if total_repositories < self.min_repositories {
            return ConsistencyOutcome::InsufficientSample {
                unique_versions: by_version.len(),
                total_repositories,
                minimum: self.min_repositories,
            };
        }

        let mut groups: Vec<VersionGroup> = by_version
            .into_iter()
            .map(|(version, repos)| VersionGroup {
                version: version.to_string(),
                repositories: repos.into_iter().map(String::from).collect(),
            })
            .collect();
        groups.sort_by(|a, b| by_popularity_then_version(a, b).reverse());

        // Sorted most-used first, ties to the later version.
        let most_common = groups[0].version.clone();
        let latest = groups
            .iter()
            .map(|g| g.version.as_str())
            .max_by(|a, b| compare_versions(a, b))
            .unwrap_or(most_common.as_str())
            .to_string();

        let latest_major = SemVersion::parse(&latest).major;
        let outliers: Vec<String> = groups
            .iter()
            .filter(|g| g.repository_count() == 1)
            .map(|g| g.version.clone())
            .collect();

        let severity = if outliers
            .iter()
            .any(|v| SemVersion::parse(v).major < latest_major)
        {
            Severity::High
        } else if !outliers.is_empty() {
            Severity::Medium
        } else {
            Severity::Low
        };

        let target = if SemVersion::parse(&most_common).major == latest_major {
            latest.clone()
        } else {
            most_common.clone()
        };

        let tasks: Vec<MigrationTask> = groups
            .iter()
            .filter(|g| g.version != target)
            .map(|g| {
                let complexity = Complexity::classify(&g.version, &target);
                MigrationTask {
                    from_version: g.version.clone(),
                    to_version: target.clone(),
                    repositories: g.repositories.clone(),
                    complexity,
                    breaking: complexity.is_breaking(),
                }
            })
            .collect();

        let affected_repositories = tasks
            .iter()
            .flat_map(|t| t.repositories.iter())
            .collect::<BTreeSet<_>>()
            .len();
        let has_breaking_changes = tasks.iter().any(|t| t.breaking);
        let per_repo = if has_breaking_changes {
            BREAKING_EFFORT_HOURS_PER_REPO
        } else {
            EFFORT_HOURS_PER_REPO
        };
        let estimated_effort_hours = affected_repositories as u32 * per_repo;

        let recommendation = format!(
            "Standardize {package} on {target}: {} migration task(s) across {affected_repositories} repositories{}, about {estimated_effort_hours}h",
            tasks.len(),
            if has_breaking_changes { " including breaking changes" } else { "" },
        );

        ConsistencyOutcome::Inconsistent(VersionInconsistency {
            ecosystem: ecosystem.clone(),
            package: package.to_string(),
            unique_versions: groups.len(),
            total_repositories,
            version_groups: groups,
            most_common_version: most_common,
            latest_version: latest,
            outlier_versions: outliers,
            recommended_version: target,
            severity,
            migration_tasks: tasks,
            affected_repositories,
            has_breaking_changes,
            estimated_effort_hours,
            recommendation,
        })
    }
}

fn by_popularity_then_version(a: &VersionGroup, b: &VersionGroup) -> Ordering {
    a.repository_count()
        .cmp(&b.repository_count())
        .then_with(|| compare_versions(&a.version, &b.version))
}
