//! Ordered threshold tables.
//!
//! Every bucketed score in the engine is a `(lower_bound, score)` table
//! sorted by descending lower bound, read by [`StepTable::lookup`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTable {
    steps: &'static [(u64, u8)],
    fallback: u8,
}

impl StepTable {
    /// `steps` must be sorted by strictly descending lower bound.
    pub const fn new(steps: &'static [(u64, u8)], fallback: u8) -> Self {
        Self { steps, fallback }
    }

    /// Score of the first step whose lower bound is `<= value`.
    pub fn lookup(&self, value: u64) -> u8 {
        self.steps
            .iter()
            .find(|(lower, _)| value >= *lower)
            .map(|(_, score)| *score)
            .unwrap_or(self.fallback)
    }
}

/// Days since the last release.
pub const MAINTENANCE_BY_AGE_DAYS: StepTable =
    StepTable::new(&[(730, 30), (365, 50), (180, 70), (0, 85)], 85);

/// Known advisories against the exact version.
pub const SECURITY_BY_ADVISORIES: StepTable =
    StepTable::new(&[(4, 0), (3, 25), (2, 50), (1, 75), (0, 100)], 100);

/// Dependent/usage count, log-scale.
pub const POPULARITY_BY_DEPENDENTS: StepTable = StepTable::new(
    &[
        (10_000, 100),
        (5_000, 90),
        (1_000, 80),
        (500, 70),
        (100, 60),
        (50, 50),
        (10, 40),
        (0, 30),
    ],
    30,
);

/// Major versions behind latest.
pub const FRESHNESS_BY_MAJORS_BEHIND: StepTable = StepTable::new(&[(2, 10), (1, 25)], 100);

/// Minor versions behind latest, same major.
pub const FRESHNESS_BY_MINORS_BEHIND: StepTable =
    StepTable::new(&[(3, 50), (2, 65), (1, 75)], 100);

/// Score for a current version that only trails latest by patch releases.
pub const FRESHNESS_PATCH_BEHIND: u8 = 90;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_descending(table: &StepTable) {
        assert!(table.steps.windows(2).all(|w| w[0].0 > w[1].0));
    }

    #[test]
    fn test_tables_are_sorted() {
        for table in [
            MAINTENANCE_BY_AGE_DAYS,
            SECURITY_BY_ADVISORIES,
            POPULARITY_BY_DEPENDENTS,
            FRESHNESS_BY_MAJORS_BEHIND,
            FRESHNESS_BY_MINORS_BEHIND,
        ] {
            assert_descending(&table);
        }
    }

    #[test]
    fn test_maintenance_boundaries() {
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(0), 85);
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(179), 85);
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(180), 70);
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(364), 70);
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(365), 50);
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(729), 50);
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(730), 30);
        assert_eq!(MAINTENANCE_BY_AGE_DAYS.lookup(5000), 30);
    }

    #[test]
    fn test_security_steps() {
        let scores: Vec<u8> = (0..6).map(|n| SECURITY_BY_ADVISORIES.lookup(n)).collect();
        assert_eq!(scores, vec![100, 75, 50, 25, 0, 0]);
    }

    #[test]
    fn test_popularity_steps() {
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(0), 30);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(9), 30);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(10), 40);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(99), 50);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(100), 60);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(999), 70);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(4_999), 80);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(9_999), 90);
        assert_eq!(POPULARITY_BY_DEPENDENTS.lookup(1_000_000), 100);
    }

    #[test]
    fn test_freshness_steps() {
        assert_eq!(FRESHNESS_BY_MAJORS_BEHIND.lookup(1), 25);
        assert_eq!(FRESHNESS_BY_MAJORS_BEHIND.lookup(7), 10);
        assert_eq!(FRESHNESS_BY_MINORS_BEHIND.lookup(1), 75);
        assert_eq!(FRESHNESS_BY_MINORS_BEHIND.lookup(2), 65);
        assert_eq!(FRESHNESS_BY_MINORS_BEHIND.lookup(12), 50);
    }
}
