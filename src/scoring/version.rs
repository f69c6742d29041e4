use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Lenient `major.minor.patch` triple.
///
/// Parsing never fails: a leading `v`/`=` is dropped, each component keeps
/// only its leading digits (`"3-beta"` -> 3), and missing or non-numeric
/// components count as 0. Pre-release and build suffixes are ignored, so
/// `1.2.0-rc.1` and `1.2.0` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches(['v', 'V', '=']);
        let core = trimmed.split(['+', ' ']).next().unwrap_or("");
        let mut parts = core.split('.').map(leading_number);
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }

    pub fn same_line(&self, other: &SemVersion) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

fn leading_number(component: &str) -> u64 {
    let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

impl fmt::Display for SemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Semantic ordering of two raw version strings; ties fall back to the raw
/// text so the order is total and deterministic.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    SemVersion::parse(a)
        .cmp(&SemVersion::parse(b))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_prefixed() {
        assert_eq!(SemVersion::parse("1.2.3"), SemVersion::new(1, 2, 3));
        assert_eq!(SemVersion::parse("v2.0.1"), SemVersion::new(2, 0, 1));
        assert_eq!(SemVersion::parse(" =4.17.21 \n"), SemVersion::new(4, 17, 21));
    }

    #[test]
    fn test_parse_missing_and_suffixed_components() {
        assert_eq!(SemVersion::parse("3"), SemVersion::new(3, 0, 0));
        assert_eq!(SemVersion::parse("3.1"), SemVersion::new(3, 1, 0));
        assert_eq!(SemVersion::parse("1.2.0-rc.1"), SemVersion::new(1, 2, 0));
        assert_eq!(SemVersion::parse("2.31.0.post1"), SemVersion::new(2, 31, 0));
        assert_eq!(SemVersion::parse("1.0.0+build.5"), SemVersion::new(1, 0, 0));
        assert_eq!(SemVersion::parse("latest"), SemVersion::new(0, 0, 0));
        assert_eq!(SemVersion::parse(""), SemVersion::new(0, 0, 0));
    }

    #[test]
    fn test_component_wise_ordering() {
        assert!(SemVersion::parse("1.10.0") > SemVersion::parse("1.9.9"));
        assert!(SemVersion::parse("2.0.0") > SemVersion::parse("1.99.99"));
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
    }
}
