pub mod client;
pub mod config;
pub mod consistency;
pub mod deprecation;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod scoring;
pub mod traits;

// Re-export common types for convenience
pub use client::{build_client, build_http_client, BatchClient, CacheStore, SequentialClient};
pub use config::{ClientMode, ConfigError, EngineConfig};
pub use consistency::{ConsistencyAnalyzer, ConsistencyOutcome, VersionInconsistency};
pub use deprecation::{deprecation_urgency, Confidence, DeprecationResolver, DeprecationResult};
pub use model::*;
pub use orchestrator::Orchestrator;
pub use report::{PackageReport, Report, ReportSummary};
pub use scoring::{Grade, HealthAssessment, HealthResult, HealthScorer};
pub use traits::*;
