//! Phone number validation and canonicalization
//!
//! Free-text input from chat users is reduced to either `+<digits>` or
//! `<digits>` with 10 to 15 digits. Anything containing letters is rejected
//! before any credit is consumed or any network call is made.

use regex::Regex;
use std::sync::OnceLock;

/// Minimum digits accepted in a number
pub const MIN_DIGITS: usize = 10;

/// Maximum digits accepted in a number
pub const MAX_DIGITS: usize = 15;

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s\-().]").expect("separator pattern is valid"))
}

fn canonical() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?\d{10,15}$").expect("canonical pattern is valid"))
}

/// Normalize free-text input into a canonical phone number
///
/// Strips spaces, hyphens, parentheses and dots, rejects input containing
/// ASCII letters, keeps a leading `+`, and accepts `+?` followed by 10-15
/// digits. When that fails, all digits are extracted and accepted if their
/// count is within 10-15.
///
/// # Arguments
///
/// * `text` - Raw user input
///
/// # Returns
///
/// The canonical number, or `None` when the input is not a number
///
/// # Examples
///
/// ```
/// use lookup_bot::number::normalize_number;
///
/// assert_eq!(normalize_number(" 98-76 543-210 ").as_deref(), Some("9876543210"));
/// assert_eq!(normalize_number("+91 98765 43210").as_deref(), Some("+919876543210"));
/// assert_eq!(normalize_number("abc123"), None);
/// ```
pub fn normalize_number(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let cleaned = separators().replace_all(text, "");
    if cleaned.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let candidate = if cleaned.starts_with('+') {
        &cleaned[..]
    } else {
        cleaned.trim_start_matches(|c: char| !c.is_ascii_digit())
    };

    if canonical().is_match(candidate) {
        return Some(candidate.to_string());
    }

    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
    if (MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Some(digits);
    }

    None
}

/// Mask a number for log output, keeping only the first three characters
pub fn mask_number(number: &str) -> String {
    let prefix: String = number.chars().take(3).collect();
    format!("{}***", prefix)
}
