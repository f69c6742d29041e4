//! Deprecation status and migration alternatives.
//!
//! Evidence is merged in precedence order:
//! 1. the metadata service's deprecation flag (confidence `high`), with
//!    alternatives pulled from its free-text message;
//! 2. a static table of packages known to be deprecated (confidence
//!    `medium`), with alternatives from a static lookup;
//! 3. otherwise the package is not deprecated.
//!
//! Alternative extraction is a heuristic: each text rule contributes at most
//! its first match, so "use axios or node-fetch instead" yields only `axios`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::model::{Ecosystem, PackageSummary};
use crate::scoring::StepTable;
use crate::traits::{FetchOutcome, MetadataClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeprecationSource {
    MetadataService,
    KnownDeprecatedList,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationResult {
    pub deprecated: bool,
    pub message: Option<String>,
    pub alternatives: Vec<String>,
    pub confidence: Confidence,
    pub source: DeprecationSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationUrgency {
    pub score: u8,
    pub level: UrgencyLevel,
}

/// Packages deprecated upstream or abandoned in favour of a successor.
const KNOWN_DEPRECATED: &[(&str, &[&str])] = &[
    (
        "npm",
        &[
            "request",
            "request-promise",
            "node-sass",
            "tslint",
            "left-pad",
            "querystring",
            "moment",
            "babel-eslint",
            "gulp-util",
            "coffee-script",
        ],
    ),
    (
        "pypi",
        &["pycrypto", "nose", "distribute", "sklearn", "pep8", "oauth2client"],
    ),
    (
        "cargo",
        &["failure", "tempdir", "rustc-serialize", "error-chain", "structopt"],
    ),
    (
        "maven",
        &["log4j:log4j", "commons-httpclient:commons-httpclient"],
    ),
    (
        "go",
        &[
            "github.com/golang/protobuf",
            "github.com/pkg/errors",
            "github.com/dgrijalva/jwt-go",
            "github.com/satori/go.uuid",
        ],
    ),
];

const KNOWN_ALTERNATIVES: &[(&str, &str, &[&str])] = &[
    ("npm", "request", &["axios", "node-fetch", "got"]),
    ("npm", "request-promise", &["axios", "got"]),
    ("npm", "node-sass", &["sass"]),
    ("npm", "tslint", &["eslint"]),
    ("npm", "left-pad", &["String.prototype.padStart"]),
    ("npm", "querystring", &["URLSearchParams"]),
    ("npm", "moment", &["dayjs", "date-fns", "luxon"]),
    ("npm", "babel-eslint", &["@babel/eslint-parser"]),
    ("npm", "coffee-script", &["coffeescript"]),
    ("pypi", "pycrypto", &["pycryptodome", "cryptography"]),
    ("pypi", "nose", &["pytest"]),
    ("pypi", "distribute", &["setuptools"]),
    ("pypi", "sklearn", &["scikit-learn"]),
    ("pypi", "pep8", &["pycodestyle"]),
    ("pypi", "oauth2client", &["google-auth"]),
    ("cargo", "failure", &["anyhow", "thiserror"]),
    ("cargo", "tempdir", &["tempfile"]),
    ("cargo", "rustc-serialize", &["serde"]),
    ("cargo", "error-chain", &["thiserror", "anyhow"]),
    ("cargo", "structopt", &["clap"]),
    ("maven", "log4j:log4j", &["org.apache.logging.log4j:log4j-core"]),
    (
        "maven",
        "commons-httpclient:commons-httpclient",
        &["org.apache.httpcomponents.client5:httpclient5"],
    ),
    ("go", "github.com/golang/protobuf", &["google.golang.org/protobuf"]),
    ("go", "github.com/pkg/errors", &["errors", "fmt.Errorf"]),
    ("go", "github.com/dgrijalva/jwt-go", &["github.com/golang-jwt/jwt"]),
    ("go", "github.com/satori/go.uuid", &["github.com/google/uuid"]),
];

/// Legacy packages whose presence alone raises migration urgency.
const CRITICAL_LEGACY: &[(&str, &str)] = &[
    ("npm", "request"),
    ("npm", "node-sass"),
    ("npm", "moment"),
    ("pypi", "pycrypto"),
    ("maven", "log4j:log4j"),
    ("go", "github.com/dgrijalva/jwt-go"),
    ("cargo", "rustc-serialize"),
];

const URGENCY_BY_USAGE: StepTable = StepTable::new(&[(10, 3), (5, 2), (2, 1)], 0);
const VULNERABLE_BONUS: u8 = 5;
const CRITICAL_LEGACY_BONUS: u8 = 2;

/// Pronouns and articles that follow "use" without naming a package.
const STOPWORDS: &[&str] = &["the", "a", "an", "this", "that", "it"];

/// `(rule, capture group)` pairs applied to deprecation messages, in order.
///
/// "use X instead" tolerates at most three words between the candidate and
/// "instead", so an earlier unrelated "use" cannot swallow the real one.
fn alternative_rules() -> &'static [(Regex, usize)] {
    static RULES: OnceLock<Vec<(Regex, usize)>> = OnceLock::new();
    RULES.get_or_init(|| {
        const TOKEN: &str = r#"[`'"]?([@A-Za-z0-9][\w@./:-]*)[`'"]?"#;
        vec![
            (
                Regex::new(&format!(
                    r"(?i)\buse\s+{TOKEN}(?:\s+[\w-]+){{0,3}}\s+instead\b"
                ))
                .expect("valid regex"),
                1,
            ),
            (
                Regex::new(&format!(r"(?i)\bmigrate\s+to\s+{TOKEN}")).expect("valid regex"),
                1,
            ),
            (
                Regex::new(&format!(r"(?i)\breplaced\s+by\s+{TOKEN}")).expect("valid regex"),
                1,
            ),
        ]
    })
}

/// Candidate replacement packages mentioned in a deprecation message.
pub fn extract_alternatives(message: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (rule, group) in alternative_rules() {
        // First usable match per rule.
        let candidate = rule
            .captures_iter(message)
            .filter_map(|caps| caps.get(*group))
            .map(|token| {
                token
                    .as_str()
                    .trim_end_matches(['.', ',', ':', ';', ')', '!', '?', '/'])
                    .to_string()
            })
            .find(|candidate| is_package_token(candidate));
        if let Some(candidate) = candidate {
            if !found.contains(&candidate) {
                found.push(candidate);
            }
        }
    }
    found
}

fn is_package_token(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.contains("://")
        && !STOPWORDS.contains(&candidate.to_lowercase().as_str())
}

/// Lookup key: lowercase, and PEP 503 normalization for PyPI names.
fn normalize_name(ecosystem: &Ecosystem, name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match ecosystem {
        Ecosystem::Pypi => lowered.replace(['_', '.'], "-"),
        _ => lowered,
    }
}

pub struct DeprecationResolver {
    known: HashMap<Ecosystem, Vec<String>>,
    alternatives: HashMap<(Ecosystem, String), Vec<String>>,
}

impl Default for DeprecationResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeprecationResolver {
    /// Resolver seeded with the built-in tables.
    pub fn new() -> Self {
        let mut resolver = Self {
            known: HashMap::new(),
            alternatives: HashMap::new(),
        };
        for (ecosystem, names) in KNOWN_DEPRECATED {
            for name in *names {
                resolver.add_known(Ecosystem::from(*ecosystem), name, &[]);
            }
        }
        for (ecosystem, name, alternatives) in KNOWN_ALTERNATIVES {
            let ecosystem = Ecosystem::from(*ecosystem);
            let name = normalize_name(&ecosystem, name);
            resolver.alternatives.insert(
                (ecosystem, name),
                alternatives.iter().map(|a| a.to_string()).collect(),
            );
        }
        resolver
    }

    /// Adds a package to the known-deprecated table.
    pub fn add_known(&mut self, ecosystem: Ecosystem, name: &str, alternatives: &[&str]) {
        let normalized = normalize_name(&ecosystem, name);
        if !alternatives.is_empty() {
            self.alternatives.insert(
                (ecosystem.clone(), normalized.clone()),
                alternatives.iter().map(|a| a.to_string()).collect(),
            );
        }
        let names = self.known.entry(ecosystem).or_default();
        if !names.contains(&normalized) {
            names.push(normalized);
        }
    }

    pub fn is_known_deprecated(&self, ecosystem: &Ecosystem, name: &str) -> bool {
        let normalized = normalize_name(ecosystem, name);
        self.known
            .get(ecosystem)
            .is_some_and(|names| names.contains(&normalized))
    }

    pub fn known_alternatives(&self, ecosystem: &Ecosystem, name: &str) -> Vec<String> {
        self.alternatives
            .get(&(ecosystem.clone(), normalize_name(ecosystem, name)))
            .cloned()
            .unwrap_or_default()
    }

    /// Merges the service's view (if it answered) with the static tables.
    pub fn resolve(
        &self,
        ecosystem: &Ecosystem,
        name: &str,
        remote: Option<&PackageSummary>,
    ) -> DeprecationResult {
        if let Some(summary) = remote.filter(|s| s.deprecated) {
            let mut alternatives = summary
                .deprecation_message
                .as_deref()
                .map(extract_alternatives)
                .unwrap_or_default();
            if alternatives.is_empty() {
                alternatives = self.known_alternatives(ecosystem, name);
            }
            return DeprecationResult {
                deprecated: true,
                message: summary.deprecation_message.clone(),
                alternatives,
                confidence: Confidence::High,
                source: DeprecationSource::MetadataService,
            };
        }

        if self.is_known_deprecated(ecosystem, name) {
            return DeprecationResult {
                deprecated: true,
                message: Some(format!("{name} is listed as deprecated for {ecosystem}")),
                alternatives: self.known_alternatives(ecosystem, name),
                confidence: Confidence::Medium,
                source: DeprecationSource::KnownDeprecatedList,
            };
        }

        DeprecationResult {
            deprecated: false,
            message: None,
            alternatives: Vec::new(),
            confidence: if remote.is_some() {
                Confidence::High
            } else {
                Confidence::Low
            },
            source: DeprecationSource::None,
        }
    }

    /// Fetches the package summary and resolves against it; fetch failures
    /// fall through to the static tables.
    pub async fn resolve_remote(
        &self,
        client: &dyn MetadataClient,
        ecosystem: &Ecosystem,
        name: &str,
    ) -> DeprecationResult {
        match client.fetch_package(ecosystem, name).await {
            Ok(FetchOutcome::Found(summary)) => self.resolve(ecosystem, name, Some(&summary)),
            _ => self.resolve(ecosystem, name, None),
        }
    }
}

fn is_critical_legacy(ecosystem: &Ecosystem, name: &str) -> bool {
    let normalized = normalize_name(ecosystem, name);
    CRITICAL_LEGACY
        .iter()
        .any(|(eco, legacy)| Ecosystem::from(*eco) == *ecosystem && *legacy == normalized)
}

/// How urgently a deprecated package should be migrated.
///
/// `usage_count` is the number of repositories using the package.
pub fn deprecation_urgency(
    ecosystem: &Ecosystem,
    name: &str,
    usage_count: usize,
    has_vulnerabilities: bool,
) -> DeprecationUrgency {
    let mut score = URGENCY_BY_USAGE.lookup(usage_count as u64);
    if has_vulnerabilities {
        score += VULNERABLE_BONUS;
    }
    if is_critical_legacy(ecosystem, name) {
        score += CRITICAL_LEGACY_BONUS;
    }

    let level = if score >= 7 {
        UrgencyLevel::Critical
    } else if score >= 5 {
        UrgencyLevel::High
    } else if score >= 3 {
        UrgencyLevel::Medium
    } else {
        UrgencyLevel::Low
    };
    DeprecationUrgency { score, level }
}
