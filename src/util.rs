//! Small helpers shared by the pages and the CLI

use chrono::{Datelike, NaiveDate};

/// Academic year label for `date`, e.g. `2024-2025`.
///
/// The year turns over in August.
pub fn academic_year(date: NaiveDate) -> String {
    let year = date.year();
    if date.month() >= 8 {
        format!("{}-{}", year, year + 1)
    } else {
        format!("{}-{}", year - 1, year)
    }
}

/// Accepts `YYYY-YYYY` where the second year follows the first.
pub fn is_valid_academic_year(value: &str) -> bool {
    let (start, end) = match value.split_once('-') {
        Some(parts) => parts,
        None => return false,
    };
    let is_year = |s: &str| s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit());
    if !is_year(start) || !is_year(end) {
        return false;
    }
    match (start.parse::<i32>(), end.parse::<i32>()) {
        (Ok(start), Ok(end)) => end == start + 1,
        _ => false,
    }
}

/// Up to two uppercase initials from a full name.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}

/// Loose shape check: `local@domain.tld` without whitespace.
pub fn validate_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// At least ten digits, spaces, dashes or parentheses, with an optional
/// leading `+`.
pub fn validate_phone(phone: &str) -> bool {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    body.chars().count() >= 10
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '-' | '(' | ')'))
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
