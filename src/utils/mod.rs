//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;

/// Normalize a position name into the key used for rule matching
///
/// Trims, lowercases and strips spaces, hyphens and underscores, so
/// `"Mic 1"`, `"mic-1"` and `"MIC_1"` all become `"mic1"`.
pub fn normalize_position_name(name: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();

    let re = SEPARATORS.get_or_init(|| Regex::new(r"[\s\-_]+").expect("Invalid regex pattern"));

    re.replace_all(&name.trim().to_lowercase(), "").into_owned()
}

/// Extract the slot number from a normalized `mic<N>` key
///
/// Returns `None` unless `1 <= N <= max_slot`.
pub fn pattern_slot(normalized: &str, max_slot: u32) -> Option<u32> {
    static MIC_PATTERN: OnceLock<Regex> = OnceLock::new();

    let re = MIC_PATTERN.get_or_init(|| Regex::new(r"^mic(\d{1,3})$").expect("Invalid regex pattern"));

    let number: u32 = re.captures(normalized)?.get(1)?.as_str().parse().ok()?;
    (1..=max_slot).contains(&number).then_some(number)
}

/// Trim a display name, mapping blank input to `None`
pub fn clean_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
