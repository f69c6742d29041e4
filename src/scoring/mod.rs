//! Health scoring: threshold tables, version comparison and the composite scorer.

pub mod health;
pub mod steps;
pub mod version;

pub use health::{ComponentScores, Grade, HealthAssessment, HealthResult, HealthScorer};
pub use steps::StepTable;
pub use version::{compare_versions, SemVersion};
