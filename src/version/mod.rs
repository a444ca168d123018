//! Version comparison and the local version reader.
//!
//! Release tags and `minimumVersionRequired` values published by the registry
//! are not always full `MAJOR.MINOR.PATCH` triples (`v1.2`, `2`), so ordering
//! uses [`compare_versions`], a lenient numeric-tuple comparison. The locally
//! installed version is read strictly with [`read_manifest_version`].

pub mod manifest;

pub use manifest::{read_manifest_version, read_minimum_version};

use std::cmp::Ordering;

/// Strip a leading `v`/`V` from a release tag.
///
/// ```
/// use gh_updater::version::normalize_tag;
///
/// assert_eq!(normalize_tag("v1.2.0"), "1.2.0");
/// assert_eq!(normalize_tag("1.2.0"), "1.2.0");
/// ```
#[must_use]
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v').or_else(|| tag.strip_prefix('V')).unwrap_or(tag)
}

fn components(version: &str) -> Vec<u64> {
    normalize_tag(version)
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Compare two dotted versions component by component.
///
/// Missing components count as `0` and a leading `v` is ignored, so `1.2`,
/// `1.2.0` and `v1.2.0` are all equal. Non-numeric components count as `0`.
///
/// ```
/// use gh_updater::version::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
/// assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
/// ```
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// `true` when `current` satisfies `minimum` (`current >= minimum`).
#[must_use]
pub fn satisfies_minimum(current: &str, minimum: &str) -> bool {
    compare_versions(current, minimum) != Ordering::Less
}
