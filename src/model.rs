use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A package manager namespace.
///
/// Serialized as the lowercase name used in manifests (`"npm"`, `"pypi"`, ...).
/// Unknown ecosystems are kept verbatim so they can still be queried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Ecosystem {
    Npm,
    Pypi,
    Cargo,
    Maven,
    Go,
    Nuget,
    Rubygems,
    Packagist,
    Other(String),
}

impl Ecosystem {
    /// Manifest-facing identifier.
    pub fn as_str(&self) -> &str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Cargo => "cargo",
            Ecosystem::Maven => "maven",
            Ecosystem::Go => "go",
            Ecosystem::Nuget => "nuget",
            Ecosystem::Rubygems => "rubygems",
            Ecosystem::Packagist => "packagist",
            Ecosystem::Other(name) => name,
        }
    }

    /// System name used by the metadata service in request paths.
    pub fn system_name(&self) -> String {
        match self {
            Ecosystem::Npm => "NPM".to_string(),
            Ecosystem::Pypi => "PYPI".to_string(),
            Ecosystem::Cargo => "CARGO".to_string(),
            Ecosystem::Maven => "MAVEN".to_string(),
            Ecosystem::Go => "GO".to_string(),
            Ecosystem::Nuget => "NUGET".to_string(),
            Ecosystem::Rubygems => "RUBYGEMS".to_string(),
            Ecosystem::Packagist => "PACKAGIST".to_string(),
            Ecosystem::Other(name) => name.trim().to_uppercase(),
        }
    }
}

impl From<&str> for Ecosystem {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "npm" => Ecosystem::Npm,
            "pypi" | "pip" => Ecosystem::Pypi,
            "cargo" | "crates.io" => Ecosystem::Cargo,
            "maven" => Ecosystem::Maven,
            "go" | "golang" => Ecosystem::Go,
            "nuget" => Ecosystem::Nuget,
            "rubygems" | "gem" => Ecosystem::Rubygems,
            "packagist" | "composer" => Ecosystem::Packagist,
            other => Ecosystem::Other(other.to_string()),
        }
    }
}

impl From<String> for Ecosystem {
    fn from(value: String) -> Self {
        Ecosystem::from(value.as_str())
    }
}

impl From<Ecosystem> for String {
    fn from(value: Ecosystem) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for Ecosystem {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Ecosystem::from(s))
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dependency occurrence extracted from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageRef {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: String,
}

impl PackageRef {
    pub fn new(
        ecosystem: impl Into<Ecosystem>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            ecosystem: ecosystem.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.ecosystem, self.name, self.version)
    }
}

/// A repository that uses a package at a given version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageRecord {
    pub repository: String,
    pub version: String,
}

impl UsageRecord {
    pub fn new(repository: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: version.into(),
        }
    }
}

/// The package list extracted from one repository's manifests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryManifest {
    pub repository: String,
    pub packages: Vec<PackageRef>,
}

/// Version-independent snapshot of a package from the metadata service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub latest_version: Option<String>,
    pub deprecated: bool,
    pub deprecation_message: Option<String>,
    /// OpenSSF-style score on a 0-10 scale.
    pub scorecard: Option<f64>,
    pub dependent_count: u64,
    pub versions: Vec<VersionEntry>,
}

impl PackageSummary {
    /// Most recent publish date across all known versions.
    pub fn last_published(&self) -> Option<DateTime<Utc>> {
        self.versions.iter().filter_map(|v| v.published_at).max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_default: bool,
    pub is_deprecated: bool,
}

/// Snapshot of one package@version from the metadata service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub published_at: Option<DateTime<Utc>>,
    pub licenses: Vec<String>,
    pub advisories: Vec<Advisory>,
    pub dependencies: Vec<String>,
    /// Scorecard attached to the source project, if the service links one.
    pub project_scorecard: Option<f64>,
    pub provenance: Vec<Provenance>,
}

impl VersionInfo {
    pub fn advisory_ids(&self) -> Vec<String> {
        self.advisories.iter().map(|a| a.id.clone()).collect()
    }

    pub fn has_provenance(&self) -> bool {
        !self.provenance.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: String,
}

/// SLSA provenance attestation for a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_repository: String,
    pub commit: Option<String>,
    pub verified: bool,
}
