//! Firmware version ordering.
//!
//! Versions come from the remote manifest and are untrusted. Ordering rules:
//! - an optional leading `v` is ignored
//! - segments are split on `.` and compared left to right
//! - a segment's value is its leading run of digits (`3-rc1` is 3)
//! - a segment with no leading digit sorts below every numeric segment, 0 included
//! - missing trailing segments count as 0, so `2.1` == `2.1.0`

use std::cmp::Ordering;

/// Firmware version of this build
pub const FIRMWARE_VERSION: &str = env!("SUI_FIRMWARE_VERSION");

/// Build date (UTC, YYYY-MM-DD)
pub const BUILD_DATE: &str = env!("SUI_BUILD_DATE");

/// `--version` text
pub const VERSION_LINE: &str = concat!(
    env!("SUI_FIRMWARE_VERSION"),
    " (built ",
    env!("SUI_BUILD_DATE"),
    ")"
);

/// Comparable value of a single segment. Non-numeric sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    NonNumeric,
    Numeric(u64),
}

fn parse_segment(raw: &str) -> Segment {
    let digits: &str = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &raw[..end],
        None => raw,
    };
    if digits.is_empty() {
        return Segment::NonNumeric;
    }
    // Saturate absurdly long runs instead of failing
    Segment::Numeric(digits.parse().unwrap_or(u64::MAX))
}

fn segments(version: &str) -> Vec<Segment> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    trimmed.split('.').map(parse_segment).collect()
}

/// Compare two versions. `Greater` means `a` is newer than `b`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = segments(a);
    let b = segments(b);
    let len = a.len().max(b.len());

    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(Segment::Numeric(0));
        let right = b.get(i).copied().unwrap_or(Segment::Numeric(0));
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// True if `remote` is a newer release than `installed`
pub fn is_newer_version(remote: &str, installed: &str) -> bool {
    compare_versions(remote, installed) == Ordering::Greater
}
