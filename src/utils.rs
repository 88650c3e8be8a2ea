use crate::error::{FundDashboardError, Result};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

const FILE_WEEK_PREFIX: &str = "Fund_Balance_";

const DATE_FORMATS_WITH_YEAR: [&str; 6] = [
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
];

const DATE_FORMATS_WITHOUT_YEAR: [&str; 4] = ["%B %d", "%b %d", "%d %B", "%d %b"];

static RANGE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+to\s+").expect("valid range separator regex"));

static ORDINAL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid ordinal suffix regex")
});

/// Extracts the week label from `Fund_Balance_<label>.<ext>`.
///
/// Returns `None` when the file name does not follow that pattern.
pub fn week_id_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let label = stem.strip_prefix(FILE_WEEK_PREFIX)?.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// Sheet names such as `"March 31 to April 4"` are used verbatim as week ids.
pub fn week_id_from_sheet_name(sheet_name: &str) -> Option<String> {
    let name = sheet_name.trim();
    if looks_like_week_range(name) {
        Some(name.to_string())
    } else {
        None
    }
}

pub fn looks_like_week_range(label: &str) -> bool {
    let normalized = label.replace('_', " ");
    let mut parts = RANGE_SEPARATOR.splitn(&normalized, 2);
    matches!((parts.next(), parts.next()), (Some(start), Some(end)) if !start.trim().is_empty() && !end.trim().is_empty())
}

/// The `<start>` part of `"<start> to <end>"` or `"<start>_to_<end>"`.
///
/// An identifier without a range separator is returned whole.
pub fn week_start_token(week_id: &str) -> String {
    let normalized = week_id.replace('_', " ");
    let start = RANGE_SEPARATOR
        .split(&normalized)
        .next()
        .unwrap_or_default();
    let start = ORDINAL_SUFFIX.replace_all(start, "$1");
    start
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == '-' || c == ':')
        .trim()
        .to_string()
}

/// Years tried after `default_year` for a yearless token that does not exist
/// in it, nearest first. Only `February 29` can succeed here.
const YEAR_FALLBACK_OFFSETS: [i32; 6] = [-1, 1, -2, 2, -3, 3];

/// Parses the start date of a week identifier.
///
/// Tokens without a year (`"March 31"`) are resolved in `default_year`.
/// `"February 29"` in a non-leap `default_year` resolves in the nearest leap
/// year, the earlier one on a tie.
pub fn parse_week_start(week_id: &str, default_year: i32) -> Result<NaiveDate> {
    let token = week_start_token(week_id);
    if token.is_empty() {
        return Err(FundDashboardError::InvalidWeekId(week_id.to_string()));
    }

    for format in DATE_FORMATS_WITH_YEAR {
        if let Ok(date) = NaiveDate::parse_from_str(&token, format) {
            return Ok(date);
        }
    }

    std::iter::once(0)
        .chain(YEAR_FALLBACK_OFFSETS)
        .find_map(|offset| parse_in_year(&token, default_year + offset))
        .ok_or_else(|| FundDashboardError::InvalidWeekId(week_id.to_string()))
}

fn parse_in_year(token: &str, year: i32) -> Option<NaiveDate> {
    let with_year = format!("{} {}", token, year);
    DATE_FORMATS_WITHOUT_YEAR.iter().find_map(|format| {
        NaiveDate::parse_from_str(&with_year, &format!("{} %Y", format)).ok()
    })
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn first_day_of_quarter(date: NaiveDate) -> NaiveDate {
    let quarter_month = ((date.month() - 1) / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap_or(date)
}

/// Parses a numeric cell rendered as text, tolerating thousands separators
/// and accounting-style parentheses for negatives.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }

    if let Some(inner) = cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }

    cleaned.parse::<f64>().ok()
}

/// Maps a currency column to its ISO code (`"Total in LKR"` -> `"LKR"`).
pub fn iso_currency_code(column: &str) -> &str {
    column
        .trim()
        .strip_prefix("Total in ")
        .map(str::trim)
        .unwrap_or_else(|| column.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_id_from_file_name() {
        assert_eq!(
            week_id_from_file_name(Path::new("data/Fund_Balance_March_31_to_April_4.xlsx")),
            Some("March_31_to_April_4".to_string())
        );
        assert_eq!(
            week_id_from_file_name(Path::new("Dummy_Bank_Cash_Balance_Data.xlsx")),
            None
        );
        assert_eq!(week_id_from_file_name(Path::new("Fund_Balance_.xlsx")), None);
    }

    #[test]
    fn test_week_id_from_sheet_name() {
        assert_eq!(
            week_id_from_sheet_name(" March 31 to April 4 "),
            Some("March 31 to April 4".to_string())
        );
        assert_eq!(week_id_from_sheet_name("Sheet1"), None);
        assert_eq!(week_id_from_sheet_name("to April 4"), None);
    }

    #[test]
    fn test_week_start_token() {
        assert_eq!(week_start_token("March_31_to_April_4"), "March 31");
        assert_eq!(week_start_token("March 31 to April 4"), "March 31");
        assert_eq!(week_start_token("April 7th to April 11th"), "April 7");
        assert_eq!(week_start_token("W1"), "W1");
    }

    #[test]
    fn test_parse_week_start() {
        assert_eq!(
            parse_week_start("March_31_to_April_4", 2025).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );
        assert_eq!(
            parse_week_start("Apr 7 to Apr 11", 2025).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 7).unwrap()
        );
        assert_eq!(
            parse_week_start("December 29 2024 to January 2 2025", 2025).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 29).unwrap()
        );
        assert_eq!(
            parse_week_start("2025-05-05_to_2025-05-09", 2020).unwrap(),
            NaiveDate::from_ymd_opt(2025, 5, 5).unwrap()
        );
        assert!(parse_week_start("W1", 2025).is_err());
        assert!(parse_week_start("April 31 to May 4", 2025).is_err());
        assert!(parse_week_start("", 2025).is_err());
    }

    #[test]
    fn test_leap_day_without_year_uses_nearest_leap_year() {
        assert_eq!(
            parse_week_start("February 29 to March 4", 2024).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            parse_week_start("February_29_to_March_4", 2025).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            parse_week_start("Feb 29 to Mar 4", 2026).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            parse_week_start("February 29 to March 4", 2027).unwrap(),
            NaiveDate::from_ymd_opt(2028, 2, 29).unwrap()
        );
        assert!(parse_week_start("February 29 2025 to March 4 2025", 2025).is_err());
    }

    #[test]
    fn test_period_starts() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 19).unwrap();
        assert_eq!(
            first_day_of_month(date),
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()
        );
        assert_eq!(
            first_day_of_quarter(date),
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
        );
        assert_eq!(
            first_day_of_quarter(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,250.50"), Some(1250.5));
        assert_eq!(parse_amount("(300)"), Some(-300.0));
        assert_eq!(parse_amount(" - "), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_iso_currency_code() {
        assert_eq!(iso_currency_code("Total in LKR"), "LKR");
        assert_eq!(iso_currency_code("USD"), "USD");
    }
}
