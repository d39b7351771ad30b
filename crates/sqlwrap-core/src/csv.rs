//! CSV array codecs.
//!
//! Pure helpers for packing sequences into a comma-separated string and
//! unpacking them back. Used to store array-valued data in text columns.
//! No engine dependency.

use std::fmt::Display;

/// Join a sequence of displayable items into a comma-separated string.
///
/// An empty slice yields an empty string.
pub fn to_csv<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-separated string into integers.
///
/// An empty string yields an empty vec. Components that do not parse
/// decode as 0.
pub fn ints_from_csv(csv: &str) -> Vec<i64> {
    if csv.is_empty() {
        return Vec::new();
    }
    csv.split(',')
        .map(|c| c.trim().parse().unwrap_or(0))
        .collect()
}

/// Parse a comma-separated string into floats.
///
/// An empty string yields an empty vec. Components that do not parse
/// decode as 0.0.
pub fn floats_from_csv(csv: &str) -> Vec<f64> {
    if csv.is_empty() {
        return Vec::new();
    }
    csv.split(',')
        .map(|c| c.trim().parse().unwrap_or(0.0))
        .collect()
}
