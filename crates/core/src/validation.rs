//! Input validation utilities.
//!
//! This module contains functions for validating user inputs to ensure they meet
//! safety and correctness requirements before being used in operations.

use crate::constants::{DATE_FORMAT, MAX_FORM_NAME_LEN};
use crate::{FormEntryError, FormEntryResult};
use chrono::NaiveDate;

/// Validates that a form name is safe to use as a file stem under the form directory.
///
/// Form names arrive from URLs and the command line and are joined onto the configured form
/// directory, so the accepted set is kept small:
/// - Rejects empty or whitespace-only strings
/// - Bounds the length
/// - Restricts characters to ASCII alphanumerics, `-` and `_`, which rules out path separators
///   and `..`
///
/// # Errors
///
/// Returns [`FormEntryError::InvalidFormName`] if the name is invalid.
pub fn validate_form_name(name: &str) -> FormEntryResult<()> {
    if name.trim().is_empty() {
        return Err(FormEntryError::InvalidFormName(
            "form name cannot be empty".into(),
        ));
    }

    if name.len() > MAX_FORM_NAME_LEN {
        return Err(FormEntryError::InvalidFormName(format!(
            "form name exceeds maximum length of {} characters",
            MAX_FORM_NAME_LEN
        )));
    }

    let ok = name
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_'));

    if !ok {
        return Err(FormEntryError::InvalidFormName(format!(
            "'{name}' contains invalid characters (only alphanumeric, '-', '_' allowed)"
        )));
    }

    Ok(())
}

/// Parses a posted `YYYY-MM-DD` date. Surrounding whitespace is ignored.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_form_name_accepts_simple_names() {
        assert!(validate_form_name("enroll-in-program").is_ok());
        assert!(validate_form_name("Complete_Program2").is_ok());
    }

    #[test]
    fn test_validate_form_name_rejects_paths_and_blanks() {
        for name in ["", "   ", "../secrets", "a/b", "form.html", "naïve"] {
            let err = validate_form_name(name).expect_err("name should be rejected");
            assert!(matches!(err, FormEntryError::InvalidFormName(_)), "{name}");
        }
    }

    #[test]
    fn test_validate_form_name_rejects_long_names() {
        let name = "a".repeat(MAX_FORM_NAME_LEN + 1);
        assert!(validate_form_name(&name).is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(" 2012-02-15 "),
            NaiveDate::from_ymd_opt(2012, 2, 15)
        );
        assert_eq!(parse_date("15/02/2012"), None);
        assert_eq!(parse_date("2012-02-30"), None);
    }
}
