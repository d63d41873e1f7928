//! Field rules for student records: required text, date of birth and the
//! age derived from it.

use chrono::{Datelike, Local, NaiveDate};

use super::error::{RecordError, RecordResult};

pub const MIN_AGE: i64 = 3;
pub const MAX_AGE: i64 = 100;

/// Today's date in the server's local time zone
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Whole years between `dob` and `today`
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i64 {
    let mut years = i64::from(today.year() - dob.year());
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years
}

fn check_age_range(age: i64) -> RecordResult<u8> {
    if !(MIN_AGE..=MAX_AGE).contains(&age) {
        return Err(RecordError::validation(format!(
            "Age must be between {} and {}",
            MIN_AGE, MAX_AGE
        )));
    }
    // Range check above keeps this within u8
    Ok(age as u8)
}

pub fn parse_dob(raw: &str) -> RecordResult<NaiveDate> {
    shared::parse_calendar_date(raw).map_err(RecordError::Validation)
}

fn parse_age(raw: &str) -> RecordResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| RecordError::validation(format!("invalid age '{}'", raw.trim())))
}

/// Work out the age to store.
///
/// A date of birth always wins over an explicit age; without either the
/// age stays unset.
pub fn resolve_age(
    dob: Option<NaiveDate>,
    age: Option<&str>,
    today: NaiveDate,
) -> RecordResult<Option<u8>> {
    match (dob, age) {
        (Some(dob), _) => check_age_range(age_on(dob, today)).map(Some),
        (None, Some(raw)) => check_age_range(parse_age(raw)?).map(Some),
        (None, None) => Ok(None),
    }
}

/// Trimmed text, or `None` when absent or blank
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trimmed, non-blank text or a validation error naming the field
pub fn required_text(value: Option<String>, message: &str) -> RecordResult<String> {
    optional_text(value).ok_or_else(|| RecordError::validation(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let dob = date(2010, 6, 15);
        assert_eq!(age_on(dob, date(2024, 6, 14)), 13);
        assert_eq!(age_on(dob, date(2024, 6, 15)), 14);
        assert_eq!(age_on(dob, date(2024, 12, 1)), 14);
    }

    #[test]
    fn test_leap_day_birthday() {
        let dob = date(2012, 2, 29);
        assert_eq!(age_on(dob, date(2023, 2, 28)), 10);
        assert_eq!(age_on(dob, date(2023, 3, 1)), 11);
    }

    #[test]
    fn test_exactly_eighteen_years_ago() {
        let today = date(2025, 3, 10);
        let age = resolve_age(Some(date(2007, 3, 10)), None, today).unwrap();
        assert_eq!(age, Some(18));
    }

    #[test]
    fn test_age_bounds() {
        let today = date(2025, 3, 10);
        assert!(resolve_age(Some(date(2023, 3, 10)), None, today).is_err());
        assert!(resolve_age(Some(date(1924, 3, 9)), None, today).is_err());
        assert_eq!(resolve_age(Some(date(2022, 3, 10)), None, today).unwrap(), Some(3));
        assert_eq!(resolve_age(Some(date(1925, 3, 10)), None, today).unwrap(), Some(100));
    }

    #[test]
    fn test_dob_wins_over_explicit_age() {
        let today = date(2025, 3, 10);
        let age = resolve_age(Some(date(2015, 1, 1)), Some("40"), today).unwrap();
        assert_eq!(age, Some(10));
    }

    #[test]
    fn test_explicit_age_without_dob() {
        let today = date(2025, 3, 10);
        assert_eq!(resolve_age(None, Some(" 12 "), today).unwrap(), Some(12));
        assert!(resolve_age(None, Some("2"), today).is_err());
        assert!(resolve_age(None, Some("twelve"), today).is_err());
        assert_eq!(resolve_age(None, None, today).unwrap(), None);
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(optional_text(Some("  ".to_string())), None);
        assert_eq!(optional_text(Some(" a ".to_string())), Some("a".to_string()));
        assert!(required_text(None, "Name is required").is_err());
    }
}
