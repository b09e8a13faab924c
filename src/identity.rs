//! Meter identity matching.
//!
//! Firmware revisions format the same serial number differently (`1 EMH 00 4921570`,
//! `1EMH004921570`, mixed case). Both sides are canonicalized before comparison and
//! the expected id only needs to appear somewhere in the observed one.

/// Keeps ASCII letters, digits and punctuation, then uppercases.
#[must_use]
pub fn canonicalize(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Returns true if the canonical `expected` id is contained in the canonical `observed` id.
#[must_use]
pub fn matches(expected: &str, observed: &str) -> bool {
    canonicalize(observed).contains(&canonicalize(expected))
}
