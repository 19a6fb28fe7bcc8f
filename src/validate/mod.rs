//! Field validation for memory submissions and account registration
//!
//! Every validator takes a candidate value and either accepts it or rejects
//! it with a human-readable reason. Validators are pure functions of their
//! input (plus the current date for [`validate_memory_date`]); they never
//! perform I/O. Callers aggregate rejections per field with [`FormErrors`]
//! so a single submission reports every failing field at once.
//!
//! When several rules fail for one value, the reported reason is the first
//! failing check in the order the rules are written here. That ordering is
//! this implementation's choice, not a contract callers should lean on.

pub mod image;

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// A rejected field value with the reason shown to the end user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub reason: String,
}

impl FieldError {
    pub fn new(reason: impl Into<String>) -> Self {
        FieldError {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Outcome of a single field check
pub type FieldResult = std::result::Result<(), FieldError>;

/// Characters never allowed in a title
const TITLE_FORBIDDEN_CHARS: [char; 5] = ['<', '>', '"', '\'', '&'];

/// Lowercased substrings never allowed in a description
const DESCRIPTION_BLOCKLIST: [&str; 4] = ["<script", "</script", "javascript:", "onclick="];

/// Usernames nobody may register
const RESERVED_USERNAMES: [&str; 6] = ["admin", "root", "user", "test", "null", "undefined"];

/// Validate a memory title.
///
/// Rejects titles shorter than 3 non-whitespace characters, titles carrying
/// HTML-significant characters, and titles that are nothing but digits.
pub fn validate_title(value: &str) -> FieldResult {
    let stripped = value.trim();

    if stripped.chars().count() < 3 {
        return Err(FieldError::new("Title must be at least 3 characters."));
    }

    for c in TITLE_FORBIDDEN_CHARS {
        if value.contains(c) {
            return Err(FieldError::new(format!(
                "Title contains a forbidden character: {}",
                c
            )));
        }
    }

    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        return Err(FieldError::new("Title cannot be only numbers."));
    }

    Ok(())
}

/// Validate a memory description.
///
/// Length bounds plus a small blocklist of script-injection markers. This is
/// not a sanitizer: callers still HTML-escape before rendering.
pub fn validate_description(value: &str) -> FieldResult {
    if value.trim().chars().count() < 10 {
        return Err(FieldError::new(
            "Description must be at least 10 characters.",
        ));
    }

    if value.chars().count() > 2000 {
        return Err(FieldError::new(
            "Description cannot be longer than 2000 characters.",
        ));
    }

    let lowered = value.to_lowercase();
    for marker in DESCRIPTION_BLOCKLIST {
        if lowered.contains(marker) {
            return Err(FieldError::new(
                "Description contains content that is not allowed.",
            ));
        }
    }

    Ok(())
}

/// Validate a memory date against the current calendar date.
///
/// No future dates, and nothing before January 1st of the year 100 years
/// before today. "Today" is read at call time so relative-date tests work.
pub fn validate_memory_date(value: NaiveDate) -> FieldResult {
    validate_memory_date_at(value, Local::now().date_naive())
}

fn validate_memory_date_at(value: NaiveDate, today: NaiveDate) -> FieldResult {
    if value > today {
        return Err(FieldError::new(format!(
            "Memory date cannot be in the future. Latest allowed: {}",
            today
        )));
    }

    // NaiveDate covers years far beyond today - 100, so this cannot fail
    let min_date = NaiveDate::from_ymd_opt(today.year() - 100, 1, 1)
        .unwrap_or(NaiveDate::MIN);
    if value < min_date {
        return Err(FieldError::new(format!(
            "Memory date is too far in the past. Earliest allowed: {}",
            min_date
        )));
    }

    Ok(())
}

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").unwrap())
}

/// Validate a username for registration.
pub fn validate_username(value: &str) -> FieldResult {
    if !username_regex().is_match(value) {
        return Err(FieldError::new(
            "Username may only contain letters, numbers, and underscores.",
        ));
    }

    if value.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(FieldError::new("Username cannot start with a number."));
    }

    if value.chars().count() < 3 {
        return Err(FieldError::new("Username must be at least 3 characters."));
    }

    if RESERVED_USERNAMES.contains(&value.to_lowercase().as_str()) {
        return Err(FieldError::new(format!(
            "Username \"{}\" is reserved.",
            value
        )));
    }

    Ok(())
}

/// Per-field rejection reasons for one form submission
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct FormErrors(BTreeMap<&'static str, String>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one field check. The first rejection recorded
    /// for a field wins; later ones for the same field are dropped.
    pub fn check(&mut self, field: &'static str, result: FieldResult) {
        if let Err(e) = result {
            self.0.entry(field).or_insert(e.reason);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_title_too_short() {
        assert!(validate_title("").is_err());
        assert!(validate_title("ab").is_err());
        assert!(validate_title("  a  ").is_err());
        assert!(validate_title("ab ").is_err());
    }

    #[test]
    fn test_title_forbidden_characters() {
        for bad in ["a<b c", "say \"hi\"", "Tom & Jerry", "it's fine", "x > y z"] {
            let err = validate_title(bad).unwrap_err();
            assert!(err.reason.contains("forbidden character"), "{}", bad);
        }
    }

    #[test]
    fn test_title_digits_only() {
        assert!(validate_title("12345").is_err());
        assert!(validate_title("  2023  ").is_err());
        // Digits mixed with letters are fine
        assert!(validate_title("Summer 2023").is_ok());
    }

    #[test]
    fn test_title_accepts() {
        assert!(validate_title("Trip to Lima").is_ok());
        assert!(validate_title("Our first apartment").is_ok());
    }

    #[test]
    fn test_description_length() {
        assert!(validate_description("too short").is_err());
        assert!(validate_description("exactly ten").is_ok());
        assert!(validate_description(&"x".repeat(2000)).is_ok());
        assert!(validate_description(&"x".repeat(2001)).is_err());
    }

    #[test]
    fn test_description_blocklist() {
        for bad in [
            "hello <SCRIPT>alert(1)</script> world",
            "click javascript:void(0) here please",
            "a onclick=steal() injected paragraph",
        ] {
            let err = validate_description(bad).unwrap_err();
            assert!(err.reason.contains("not allowed"), "{}", bad);
        }
        assert!(validate_description("A perfectly ordinary day at the lake.").is_ok());
    }

    #[test]
    fn test_date_future_rejected() {
        let today = Local::now().date_naive();
        assert!(validate_memory_date(today).is_ok());
        assert!(validate_memory_date(today + Duration::days(1)).is_err());
    }

    #[test]
    fn test_date_bounds() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        // 99 years back is fine, 101 is not
        let recent_enough = NaiveDate::from_ymd_opt(1925, 6, 15).unwrap();
        assert!(validate_memory_date_at(recent_enough, today).is_ok());
        let too_old = NaiveDate::from_ymd_opt(1923, 6, 15).unwrap();
        assert!(validate_memory_date_at(too_old, today).is_err());

        // Boundary: January 1st of (year - 100) is the earliest accepted day
        let min = NaiveDate::from_ymd_opt(1924, 1, 1).unwrap();
        assert!(validate_memory_date_at(min, today).is_ok());
        assert!(validate_memory_date_at(min.pred_opt().unwrap(), today).is_err());
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("maria_99").is_ok());
        assert!(validate_username("Lu_na").is_ok());

        assert!(validate_username("bad-name!").is_err());
        assert!(validate_username("123abc").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("admin").is_err());
        assert!(validate_username("ADMIN").is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn test_username_reason_precedence() {
        // Violates the character class and the length rule; the character
        // class check runs first
        let err = validate_username("a!").unwrap_err();
        assert!(err.reason.contains("letters, numbers"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        for _ in 0..3 {
            assert!(validate_title("Trip to Lima").is_ok());
            assert!(validate_username("maria_99").is_ok());
            assert_eq!(
                validate_title("12345").unwrap_err(),
                FieldError::new("Title cannot be only numbers.")
            );
        }
    }

    #[test]
    fn test_form_errors_aggregate() {
        let mut errors = FormErrors::new();
        errors.check("title", validate_title("ab"));
        errors.check("description", validate_description("short"));
        errors.check("date", Ok(()));

        assert!(!errors.is_empty());
        assert!(errors.get("title").unwrap().contains("at least 3"));
        assert!(errors.get("description").unwrap().contains("at least 10"));
        assert!(errors.get("date").is_none());
    }
}
