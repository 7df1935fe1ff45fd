//! Academic-year strings, term codes and the July–June fiscal window.

use std::fmt;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EffortError, Result};

/// Opaque term identifier. Only ever compared, filtered and sorted.
pub type TermCode = i32;

static ACADEMIC_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{4})-([0-9]{4})$").expect("academic year pattern is valid"));

/// Returns the first year of a `YYYY-YYYY` string.
///
/// Anything that is not exactly two four-digit groups joined by a hyphen is
/// rejected; there is no partial parsing and no default.
pub fn parse_start_year(input: &str) -> Result<i32> {
    capture_years(input).map(|(start, _)| start)
}

fn capture_years(input: &str) -> Result<(i32, i32)> {
    let invalid = || EffortError::InvalidAcademicYear(input.to_string());
    let captures = ACADEMIC_YEAR.captures(input).ok_or_else(invalid)?;
    let start = captures[1].parse::<i32>().map_err(|_| invalid())?;
    let end = captures[2].parse::<i32>().map_err(|_| invalid())?;
    Ok((start, end))
}

/// Canonical label for the academic year starting July 1 of `start_year`.
pub fn academic_year_label(start_year: i32) -> String {
    format!("{:04}-{:04}", start_year, start_year + 1)
}

/// A validated academic year, July 1 of `start_year` through June 30 of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcademicYear {
    start_year: i32,
}

impl AcademicYear {
    pub fn parse(input: &str) -> Result<Self> {
        let (start_year, end_year) = capture_years(input)?;
        if end_year != start_year + 1 {
            return Err(EffortError::NonConsecutiveYears(input.to_string()));
        }
        Ok(Self { start_year })
    }

    pub const fn starting(start_year: i32) -> Self {
        Self { start_year }
    }

    pub const fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn label(&self) -> String {
        academic_year_label(self.start_year)
    }

    pub const fn next(&self) -> Self {
        Self {
            start_year: self.start_year + 1,
        }
    }

    pub fn fiscal_window(&self) -> Result<FiscalWindow> {
        FiscalWindow::for_start_year(self.start_year)
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Inclusive date span used as the clamp boundary for proration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(EffortError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// July 1 of `start_year` through June 30 of `start_year + 1`.
    pub fn for_start_year(start_year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(start_year, 7, 1)
            .ok_or_else(|| EffortError::InvalidAcademicYear(academic_year_label(start_year)))?;
        let end = NaiveDate::from_ymd_opt(start_year + 1, 6, 30)
            .ok_or_else(|| EffortError::InvalidAcademicYear(academic_year_label(start_year)))?;
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Maps a term code onto the academic year it belongs to.
pub trait TermYearPolicy {
    fn academic_start_year(&self, term: TermCode) -> Option<i32>;
}

/// Reads term codes as `YYYYTT`: terms numbered 07 and up open the academic
/// year, earlier ones belong to the year that began the previous July.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarTermPolicy;

impl TermYearPolicy for CalendarTermPolicy {
    fn academic_start_year(&self, term: TermCode) -> Option<i32> {
        if !(100_000..=999_999).contains(&term) {
            return None;
        }
        let year = term / 100;
        let part = term % 100;
        if part >= 7 {
            Some(year)
        } else {
            Some(year - 1)
        }
    }
}

/// All terms of the academic year starting July 1 of `start_year`, most recent first.
pub fn term_codes_for_year<P: TermYearPolicy + ?Sized>(
    all_terms: &[TermCode],
    start_year: i32,
    policy: &P,
) -> Vec<TermCode> {
    let mut terms: Vec<TermCode> = all_terms
        .iter()
        .copied()
        .filter(|term| policy.academic_start_year(*term) == Some(start_year))
        .collect();
    terms.sort_unstable_by(|a, b| b.cmp(a));
    terms.dedup();
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_year() {
        assert_eq!(parse_start_year("2024-2025").unwrap(), 2024);
        assert_eq!(parse_start_year("1999-2000").unwrap(), 1999);
    }

    #[test]
    fn rejects_malformed_years() {
        for input in ["2024", "2024-25", "２０２４-2025", "24-2025", " 2024-2025", "2024-2025 ", "2024/2025", "abcd-efgh", ""] {
            assert!(
                matches!(parse_start_year(input), Err(EffortError::InvalidAcademicYear(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn academic_year_requires_consecutive_years() {
        assert!(matches!(
            AcademicYear::parse("2024-2026"),
            Err(EffortError::NonConsecutiveYears(_))
        ));
        let year = AcademicYear::parse("2024-2025").unwrap();
        assert_eq!(year.start_year(), 2024);
        assert_eq!(year.next().label(), "2025-2026");
    }

    #[test]
    fn fiscal_window_spans_july_to_june() {
        let window = FiscalWindow::for_start_year(2024).unwrap();
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert!(window.contains(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }

    #[test]
    fn term_codes_follow_academic_year_descending() {
        let all = vec![202401, 202403, 202404, 202409, 202410, 202501, 202503, 202409, 202509];
        let terms = term_codes_for_year(&all, 2024, &CalendarTermPolicy);
        assert_eq!(terms, vec![202503, 202501, 202410, 202409]);
    }

    #[test]
    fn unknown_term_shapes_are_ignored() {
        let terms = term_codes_for_year(&[42, 2024090], 2024, &CalendarTermPolicy);
        assert!(terms.is_empty());
    }
}
