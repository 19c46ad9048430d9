//! ASIN extraction from marketplace links

use once_cell::sync::Lazy;
use regex::Regex;

static ASIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:/dp/|/gp/product/)([A-Z0-9]{10})").expect("ASIN pattern is valid")
});

/// Extract the 10-character product identifier from an href or HTML fragment.
///
/// The identifier is returned uppercased.
pub fn extract_asin(input: &str) -> Option<String> {
    ASIN_PATTERN
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}
