//! Property-based tests for scoring and consistency analysis.

use package_health::config::ScoringWeights;
use package_health::consistency::{ConsistencyAnalyzer, ConsistencyOutcome};
use package_health::deprecation::extract_alternatives;
use package_health::model::{Ecosystem, UsageRecord};
use package_health::scoring::health::{freshness_component, maintenance_component};
use package_health::scoring::{compare_versions, ComponentScores};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn components() -> impl Strategy<Value = ComponentScores> {
    (0u8..=100, 0u8..=100, 0u8..=100, 0u8..=100, 0u8..=100).prop_map(
        |(scorecard, maintenance, security, freshness, popularity)| ComponentScores {
            scorecard,
            maintenance,
            security,
            freshness,
            popularity,
        },
    )
}

fn weights() -> impl Strategy<Value = ScoringWeights> {
    prop::array::uniform5(0.0f64..1.0).prop_filter_map("non-zero total", |raw| {
        let total: f64 = raw.iter().sum();
        (total > 0.0).then(|| ScoringWeights {
            scorecard: raw[0] / total,
            maintenance: raw[1] / total,
            security: raw[2] / total,
            freshness: raw[3] / total,
            popularity: raw[4] / total,
        })
    })
}

fn usage_records() -> impl Strategy<Value = Vec<UsageRecord>> {
    prop::collection::vec((0usize..6, 0u64..3, 0u64..4), 0..12).prop_map(|rows| {
        rows.into_iter()
            .map(|(repo, major, minor)| {
                UsageRecord::new(format!("repo-{repo}"), format!("{major}.{minor}.0"))
            })
            .collect()
    })
}

fn bump(scores: ComponentScores, slot: usize, by: u8) -> ComponentScores {
    let mut out = scores;
    let field = match slot {
        0 => &mut out.scorecard,
        1 => &mut out.maintenance,
        2 => &mut out.security,
        3 => &mut out.freshness,
        _ => &mut out.popularity,
    };
    *field = field.saturating_add(by).min(100);
    out
}

proptest! {
    // ========================
    // Composite Score Properties
    // ========================

    #[test]
    fn composite_is_bounded(scores in components(), weights in weights()) {
        let composite = scores.composite(&weights);
        prop_assert!(composite <= 100);
    }

    #[test]
    fn composite_with_default_weights_is_bounded(scores in components()) {
        let composite = scores.composite(&ScoringWeights::default());
        let min = *scores.as_array().iter().min().unwrap();
        let max = *scores.as_array().iter().max().unwrap();
        prop_assert!(composite >= min && composite <= max,
            "composite {} outside [{}, {}]", composite, min, max);
    }

    #[test]
    fn composite_is_monotonic(
        scores in components(),
        weights in weights(),
        slot in 0usize..5,
        by in 0u8..=100,
    ) {
        let before = scores.composite(&weights);
        let after = bump(scores, slot, by).composite(&weights);
        prop_assert!(after >= before, "{} dropped to {}", before, after);
    }

    // ========================
    // Component Properties
    // ========================

    #[test]
    fn deprecated_maintenance_is_zero(days in prop::option::of(0i64..10_000)) {
        prop_assert_eq!(maintenance_component(true, days), 0);
    }

    #[test]
    fn freshness_of_latest_is_full(major in 0u64..50, minor in 0u64..50, patch in 0u64..50) {
        let version = format!("{major}.{minor}.{patch}");
        prop_assert_eq!(freshness_component(&version, Some(&version)), 100);
    }

    #[test]
    fn freshness_is_bounded(current in "[0-9v.]{0,8}", latest in "[0-9v.]{0,8}") {
        prop_assert!(freshness_component(&current, Some(&latest)) <= 100);
    }

    #[test]
    fn version_order_is_antisymmetric(a in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}", b in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}") {
        prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
    }

    // ========================
    // Consistency Properties
    // ========================

    #[test]
    fn analysis_is_idempotent(records in usage_records(), min in 1usize..4) {
        let analyzer = ConsistencyAnalyzer::new(min);
        let first = analyzer.analyze(&Ecosystem::Npm, "pkg", &records);
        let second = analyzer.analyze(&Ecosystem::Npm, "pkg", &records);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn inconsistency_requires_versions_and_repositories(records in usage_records(), min in 1usize..4) {
        let versions: BTreeSet<&str> = records.iter().map(|r| r.version.as_str()).collect();
        let repos: BTreeSet<&str> = records.iter().map(|r| r.repository.as_str()).collect();

        match ConsistencyAnalyzer::new(min).analyze(&Ecosystem::Npm, "pkg", &records) {
            ConsistencyOutcome::Inconsistent(found) => {
                prop_assert!(versions.len() >= 2);
                prop_assert!(repos.len() >= min);
                prop_assert_eq!(found.unique_versions, versions.len());
                prop_assert!(versions.contains(found.recommended_version.as_str()));
                prop_assert!(found.migration_tasks.iter().all(|t| t.from_version != found.recommended_version));
            }
            ConsistencyOutcome::InsufficientSample { .. } => {
                prop_assert!(versions.len() >= 2);
                prop_assert!(repos.len() < min);
            }
            ConsistencyOutcome::Consistent => prop_assert!(versions.len() < 2),
        }
    }

    // ========================
    // Alternative Extraction
    // ========================

    #[test]
    fn extraction_never_crashes(message in "\\PC*") {
        let found = extract_alternatives(&message);
        let unique: BTreeSet<&String> = found.iter().collect();
        prop_assert_eq!(unique.len(), found.len());
    }
}
