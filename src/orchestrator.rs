//! Aggregation run over a package list or a set of repository manifests.
//!
//! Per package: fetch summary and version record, score, resolve
//! deprecation. Per `(ecosystem, name)` across repositories: consistency.
//! Every input package ref yields exactly one report entry, in input order;
//! identical refs are analyzed once and share the result. Failures are
//! entries with `error` set.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::client::CacheStore;
use crate::config::{EngineConfig, OrchestratorConfig};
use crate::consistency::{ConsistencyAnalyzer, ConsistencyOutcome, VersionInconsistency};
use crate::deprecation::{deprecation_urgency, DeprecationResolver};
use crate::model::{Ecosystem, PackageRef, RepositoryManifest, UsageRecord};
use crate::report::{PackageReport, Report, ReportMetadata, ReportSummary, RunStats};
use crate::scoring::{HealthAssessment, HealthScorer};
use crate::traits::{FetchOutcome, MetadataClient};

// ============================================================================
// Jobs
// ============================================================================

/// One unique package to analyze, with the repositories that use it.
#[derive(Debug, Clone)]
struct Job {
    package: PackageRef,
    repositories: Vec<String>,
}

/// One input ref: the job that analyzes it and the repository it came from.
struct Occurrence {
    job: usize,
    repository: Option<String>,
}

/// Unique jobs plus the input occurrences that map onto them.
#[derive(Default)]
struct Plan {
    jobs: Vec<Job>,
    index: HashMap<PackageRef, usize>,
    occurrences: Vec<Occurrence>,
}

impl Plan {
    fn add(&mut self, package: &PackageRef, repository: Option<&str>) {
        let jobs = &mut self.jobs;
        let slot = *self.index.entry(package.clone()).or_insert_with(|| {
            jobs.push(Job {
                package: package.clone(),
                repositories: Vec::new(),
            });
            jobs.len() - 1
        });
        if let Some(repository) = repository {
            let repositories = &mut self.jobs[slot].repositories;
            if !repositories.iter().any(|r| r == repository) {
                repositories.push(repository.to_string());
            }
        }
        self.occurrences.push(Occurrence {
            job: slot,
            repository: repository.map(String::from),
        });
    }
}

struct JobOutcome {
    index: usize,
    report: PackageReport,
    timed_out: bool,
}

/// Shared, read-only state handed to each spawned analysis.
struct Analysis {
    client: Arc<dyn MetadataClient>,
    scorer: HealthScorer,
    resolver: DeprecationResolver,
}

impl Analysis {
    async fn run(&self, job: Job) -> PackageReport {
        let Job {
            package,
            repositories,
        } = job;
        let summary = self
            .client
            .fetch_package(&package.ecosystem, &package.name)
            .await;

        // No point asking for the version when the package itself is unknown.
        let version = match &summary {
            Ok(FetchOutcome::Found(_)) => {
                self.client
                    .fetch_version(&package.ecosystem, &package.name, &package.version)
                    .await
            }
            _ => Ok(FetchOutcome::NotFound),
        };

        let remote = summary.as_ref().ok().and_then(FetchOutcome::as_found);
        let deprecation = self
            .resolver
            .resolve(&package.ecosystem, &package.name, remote);

        let (health, error) = match self.scorer.assess(&package, &summary, &version) {
            HealthAssessment::Scored(result) => (Some(result), None),
            HealthAssessment::Failed { package, reason } => {
                warn!(package = %package, reason = %reason, "Package analysis failed");
                (None, Some(reason))
            }
        };

        let urgency = deprecation.deprecated.then(|| {
            let vulnerable = health.as_ref().is_some_and(|h| !h.advisories.is_empty());
            deprecation_urgency(&package.ecosystem, &package.name, repositories.len(), vulnerable)
        });

        PackageReport {
            package,
            repository: None,
            health,
            deprecation: Some(deprecation),
            urgency,
            error,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives a full analysis run.
///
/// # Example
///
/// ```rust,no_run
/// use package_health::{build_http_client, CacheStore, EngineConfig, Orchestrator, PackageRef};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EngineConfig::default();
/// let cache = Arc::new(CacheStore::from_config(&config.cache));
/// let client = build_http_client(&config.client, cache.clone())?;
/// let orchestrator = Orchestrator::new(client, &config).with_cache(cache);
///
/// let report = orchestrator
///     .analyze_packages(&[PackageRef::new("npm", "express", "4.18.2")])
///     .await;
/// println!("{}", report.to_json()?);
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    analysis: Arc<Analysis>,
    analyzer: ConsistencyAnalyzer,
    config: OrchestratorConfig,
    semaphore: Arc<Semaphore>,
    cache: Option<Arc<CacheStore>>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn MetadataClient>, config: &EngineConfig) -> Self {
        Self::with_parts(
            client,
            HealthScorer::new(&config.scoring),
            DeprecationResolver::new(),
            ConsistencyAnalyzer::new(config.consistency.min_repositories),
            config.orchestrator,
        )
    }

    pub fn with_parts(
        client: Arc<dyn MetadataClient>,
        scorer: HealthScorer,
        resolver: DeprecationResolver,
        analyzer: ConsistencyAnalyzer,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            analysis: Arc::new(Analysis {
                client,
                scorer,
                resolver,
            }),
            analyzer,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            config,
            cache: None,
        }
    }

    /// Reports this cache's counters in run statistics.
    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Analyzes each package; the report holds one entry per input, in
    /// input order. No consistency analysis is done.
    #[instrument(skip(self, packages), fields(count = packages.len()))]
    pub async fn analyze_packages(&self, packages: &[PackageRef]) -> Report {
        let mut plan = Plan::default();
        for package in packages {
            plan.add(package, None);
        }
        self.run(plan, BTreeMap::new()).await
    }

    /// Analyzes every package ref listed in `manifests` (one entry per
    /// manifest line) and checks version consistency for each package name
    /// used at several versions.
    #[instrument(skip(self, manifests), fields(repositories = manifests.len()))]
    pub async fn analyze_repositories(&self, manifests: &[RepositoryManifest]) -> Report {
        let mut plan = Plan::default();
        let mut usages: BTreeMap<(Ecosystem, String), Vec<UsageRecord>> = BTreeMap::new();

        for manifest in manifests {
            for package in &manifest.packages {
                plan.add(package, Some(&manifest.repository));
                usages
                    .entry((package.ecosystem.clone(), package.name.clone()))
                    .or_default()
                    .push(UsageRecord::new(
                        manifest.repository.clone(),
                        package.version.clone(),
                    ));
            }
        }

        self.run(plan, usages).await
    }

    async fn run(
        &self,
        plan: Plan,
        usages: BTreeMap<(Ecosystem, String), Vec<UsageRecord>>,
    ) -> Report {
        let start = Instant::now();
        let mut stats = RunStats::default();
        let client_mode = self.analysis.client.mode();
        let Plan {
            jobs, occurrences, ..
        } = plan;
        info!(
            packages = occurrences.len(),
            unique = jobs.len(),
            mode = client_mode,
            "Starting analysis run"
        );

        let prepare_start = Instant::now();
        let refs: Vec<PackageRef> = jobs.iter().map(|j| j.package.clone()).collect();
        self.analysis.client.prepare(&refs).await;
        stats.prepare_duration_ms = prepare_start.elapsed().as_millis() as u64;

        let analysis_start = Instant::now();
        let (analyzed, timeouts) = self.analyze_all(jobs).await;
        stats.analysis_duration_ms = analysis_start.elapsed().as_millis() as u64;
        stats.timeouts = timeouts;

        let packages: Vec<PackageReport> = occurrences
            .into_iter()
            .map(|occurrence| PackageReport {
                repository: occurrence.repository,
                ..analyzed[occurrence.job].clone()
            })
            .collect();

        let consistency_start = Instant::now();
        let inconsistencies = self.check_consistency(&usages);
        stats.consistency_duration_ms = consistency_start.elapsed().as_millis() as u64;

        stats.cache = self.cache.as_ref().map(|c| c.stats());
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        let summary =
            ReportSummary::compute(&packages, &inconsistencies, self.config.low_health_threshold);
        info!(
            total = summary.total_packages,
            analyzed = summary.analyzed,
            failed = summary.failed,
            deprecated = summary.deprecated,
            inconsistencies = summary.inconsistencies,
            duration_ms = stats.total_duration_ms,
            "Analysis run finished"
        );

        Report {
            summary,
            packages,
            version_inconsistencies: inconsistencies,
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                client_mode: client_mode.to_string(),
                stats,
            },
        }
    }

    /// Runs every job under the concurrency limit and returns the reports in
    /// job order, plus the number of timeouts.
    async fn analyze_all(&self, jobs: Vec<Job>) -> (Vec<PackageReport>, usize) {
        let package_timeout = self.config.package_timeout_secs.map(Duration::from_secs);
        let mut slots: Vec<Option<PackageReport>> = vec![None; jobs.len()];
        let fallbacks: Vec<PackageRef> = jobs.iter().map(|j| j.package.clone()).collect();

        let mut set = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&self.semaphore);
            let analysis = Arc::clone(&self.analysis);
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let report = PackageReport::failed(job.package, None, "analysis was cancelled");
                    return JobOutcome {
                        index,
                        report,
                        timed_out: false,
                    };
                };

                debug!(package = %job.package, "Analyzing package");
                match package_timeout {
                    Some(limit) => {
                        let package = job.package.clone();
                        match timeout(limit, analysis.run(job)).await {
                            Ok(report) => JobOutcome {
                                index,
                                report,
                                timed_out: false,
                            },
                            Err(_) => {
                                warn!(package = %package, timeout_secs = limit.as_secs(), "Package analysis timed out");
                                JobOutcome {
                                    index,
                                    report: PackageReport::failed(
                                        package,
                                        None,
                                        format!("analysis timed out after {}s", limit.as_secs()),
                                    ),
                                    timed_out: true,
                                }
                            }
                        }
                    }
                    None => JobOutcome {
                        index,
                        report: analysis.run(job).await,
                        timed_out: false,
                    },
                }
            });
        }

        let mut timeouts = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.timed_out {
                        timeouts += 1;
                    }
                    slots[outcome.index] = Some(outcome.report);
                }
                Err(e) => warn!(error = %e, "Analysis task aborted"),
            }
        }

        let reports = slots
            .into_iter()
            .zip(fallbacks)
            .map(|(slot, package)| {
                slot.unwrap_or_else(|| PackageReport::failed(package, None, "analysis task aborted"))
            })
            .collect();
        (reports, timeouts)
    }

    fn check_consistency(
        &self,
        usages: &BTreeMap<(Ecosystem, String), Vec<UsageRecord>>,
    ) -> Vec<VersionInconsistency> {
        let mut found = Vec::new();
        for ((ecosystem, name), records) in usages {
            match self.analyzer.analyze(ecosystem, name, records) {
                ConsistencyOutcome::Consistent => {}
                ConsistencyOutcome::InsufficientSample {
                    unique_versions,
                    total_repositories,
                    minimum,
                } => debug!(
                    package = %name,
                    unique_versions,
                    total_repositories,
                    minimum,
                    "Skipping consistency check, too few repositories"
                ),
                ConsistencyOutcome::Inconsistent(inconsistency) => {
                    info!(
                        package = %name,
                        versions = inconsistency.unique_versions,
                        severity = ?inconsistency.severity,
                        "Version inconsistency detected"
                    );
                    found.push(inconsistency);
                }
            }
        }
        found
    }
}
