//! Time-weighted clinical percent per instructor over a fiscal year.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, warn};

use crate::academic_year::FiscalWindow;
use crate::aggregate::round_one_decimal;
use crate::models::{InstructorId, PercentageInterval};

const CALENDAR_MONTHS: Decimal = dec!(12);

/// Working figures behind one instructor's clinical percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proration {
    pub weighted_sum: Decimal,
    pub months_touched: usize,
    pub percent: Decimal,
}

#[derive(Default)]
struct ProrationAcc {
    weighted_sum: Decimal,
    months: BTreeSet<(i32, u32)>,
}

/// Positive percentage whose raw range overlaps the window.
pub fn is_eligible(interval: &PercentageInterval, window: &FiscalWindow) -> bool {
    interval.percentage > Decimal::ZERO
        && interval.start <= window.end
        && interval.end.map_or(true, |end| end >= window.start)
}

/// Intervals of one assignment-type class, e.g. only clinical assignments.
pub fn select_type_class(intervals: &[PercentageInterval], type_class: &str) -> Vec<PercentageInterval> {
    intervals
        .iter()
        .filter(|interval| interval.type_class.eq_ignore_ascii_case(type_class))
        .cloned()
        .collect()
}

/// Clamps an interval to the window; `None` when nothing remains.
pub fn clamp_to_window(
    interval: &PercentageInterval,
    window: &FiscalWindow,
) -> Option<(NaiveDate, NaiveDate)> {
    let start = interval.start.max(window.start);
    let end = interval.end.unwrap_or(window.end).min(window.end);
    (start <= end).then_some((start, end))
}

/// Inclusive count of calendar months between two dates.
pub fn months_active(start: NaiveDate, end: NaiveDate) -> i32 {
    (end.year() - start.year()) * 12 + (end.month() as i32 - start.month() as i32) + 1
}

fn months_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let first = start.year() * 12 + start.month0() as i32;
    let last = end.year() * 12 + end.month0() as i32;
    (first..=last).map(|index| (index.div_euclid(12), index.rem_euclid(12) as u32 + 1))
}

/// Per-instructor proration details for the window.
///
/// Each clamped interval contributes `months * percent` to the instructor's
/// weighted sum; the divisor is the number of distinct months any of that
/// instructor's intervals touch.
pub fn prorate(
    intervals: &[PercentageInterval],
    window: &FiscalWindow,
) -> BTreeMap<InstructorId, Proration> {
    let mut accs: BTreeMap<InstructorId, ProrationAcc> = BTreeMap::new();

    for interval in intervals {
        if !is_eligible(interval, window) {
            continue;
        }
        let Some((start, end)) = clamp_to_window(interval, window) else {
            warn!(
                instructor = %interval.instructor_id,
                start = %interval.start,
                "dropping interval that is empty after clamping"
            );
            continue;
        };
        let acc = accs.entry(interval.instructor_id.clone()).or_default();
        acc.weighted_sum += Decimal::from(months_active(start, end)) * interval.percentage;
        acc.months.extend(months_between(start, end));
    }

    let prorations: BTreeMap<InstructorId, Proration> = accs
        .into_iter()
        .map(|(instructor_id, acc)| {
            let months_touched = acc.months.len();
            let divisor = if months_touched == 0 {
                warn!(
                    instructor = %instructor_id,
                    "no months touched, dividing clinical percent by 12"
                );
                CALENDAR_MONTHS
            } else {
                Decimal::from(months_touched as u64)
            };
            let proration = Proration {
                weighted_sum: acc.weighted_sum,
                months_touched,
                percent: acc.weighted_sum / divisor,
            };
            (instructor_id, proration)
        })
        .collect();

    debug!(
        intervals = intervals.len(),
        instructors = prorations.len(),
        window_start = %window.start,
        "prorated clinical percents"
    );
    prorations
}

/// One time-weighted clinical percent per instructor.
pub fn compute_clinical_percents(
    intervals: &[PercentageInterval],
    window: &FiscalWindow,
) -> BTreeMap<InstructorId, Decimal> {
    prorate(intervals, window)
        .into_iter()
        .map(|(instructor_id, proration)| (instructor_id, proration.percent))
        .collect()
}

/// CLI effort per clinical percent point; absent unless the percent is positive.
pub fn cli_ratio(cli_effort: Decimal, clinical_percent: Option<Decimal>) -> Option<Decimal> {
    match clinical_percent {
        Some(percent) if percent > Decimal::ZERO => {
            Some(round_one_decimal(cli_effort / percent))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn interval(id: &str, pct: Decimal, start: NaiveDate, end: Option<NaiveDate>) -> PercentageInterval {
        PercentageInterval::new(id, pct, start, end, "Clinical").unwrap()
    }

    fn fy2024() -> FiscalWindow {
        FiscalWindow::for_start_year(2024).unwrap()
    }

    #[test]
    fn month_count_is_inclusive() {
        assert_eq!(months_active(date(2024, 1, 15), date(2024, 3, 10)), 3);
        assert_eq!(months_active(date(2024, 1, 1), date(2024, 3, 31)), 3);
        assert_eq!(months_active(date(2024, 7, 1), date(2025, 6, 30)), 12);
        assert_eq!(months_active(date(2024, 5, 31), date(2024, 5, 31)), 1);
    }

    #[test]
    fn split_year_weights_by_months() {
        let intervals = vec![
            interval("a", dec!(50.0), date(2024, 7, 1), Some(date(2024, 9, 30))),
            interval("a", dec!(80.0), date(2024, 10, 1), Some(date(2025, 6, 30))),
        ];
        let prorations = prorate(&intervals, &fy2024());
        let a = &prorations[&InstructorId::new("a")];
        assert_eq!(a.weighted_sum, dec!(870.0));
        assert_eq!(a.months_touched, 12);
        assert_eq!(a.percent, dec!(72.5));
    }

    #[test]
    fn untouched_months_do_not_dilute() {
        let intervals = vec![interval("a", dec!(40.0), date(2024, 9, 1), Some(date(2024, 11, 30)))];
        let percents = compute_clinical_percents(&intervals, &fy2024());
        assert_eq!(percents[&InstructorId::new("a")], dec!(40.0));
    }

    #[test]
    fn overlapping_intervals_share_months() {
        let intervals = vec![
            interval("a", dec!(20.0), date(2024, 7, 1), Some(date(2024, 12, 31))),
            interval("a", dec!(30.0), date(2024, 10, 1), Some(date(2024, 12, 31))),
        ];
        let prorations = prorate(&intervals, &fy2024());
        let a = &prorations[&InstructorId::new("a")];
        assert_eq!(a.months_touched, 6);
        assert_eq!(a.weighted_sum, dec!(20) * dec!(6) + dec!(30) * dec!(3));
        assert_eq!(a.percent, dec!(35.0));
    }

    #[test]
    fn denominators_are_per_instructor() {
        let intervals = vec![
            interval("a", dec!(60.0), date(2024, 7, 1), Some(date(2024, 9, 30))),
            interval("b", dec!(30.0), date(2025, 1, 1), Some(date(2025, 6, 30))),
        ];
        let prorations = prorate(&intervals, &fy2024());
        assert_eq!(prorations[&InstructorId::new("a")].months_touched, 3);
        assert_eq!(prorations[&InstructorId::new("a")].percent, dec!(60.0));
        assert_eq!(prorations[&InstructorId::new("b")].months_touched, 6);
        assert_eq!(prorations[&InstructorId::new("b")].percent, dec!(30.0));
    }

    #[test]
    fn open_ended_and_early_intervals_are_clamped() {
        let intervals = vec![interval("a", dec!(25.0), date(2023, 1, 1), None)];
        let prorations = prorate(&intervals, &fy2024());
        let a = &prorations[&InstructorId::new("a")];
        assert_eq!(a.months_touched, 12);
        assert_eq!(a.percent, dec!(25.0));
    }

    #[test]
    fn ineligible_intervals_are_ignored() {
        let intervals = vec![
            interval("a", dec!(0.0), date(2024, 7, 1), None),
            interval("b", dec!(50.0), date(2023, 7, 1), Some(date(2024, 6, 30))),
            interval("c", dec!(50.0), date(2025, 7, 1), None),
        ];
        assert!(compute_clinical_percents(&intervals, &fy2024()).is_empty());
    }

    #[test]
    fn calendar_fallback_is_unreachable_after_prefilter() {
        let intervals = vec![
            interval("a", dec!(10.0), date(2024, 6, 30), Some(date(2024, 7, 1))),
            interval("b", dec!(10.0), date(2025, 6, 30), None),
            interval("c", dec!(0.0), date(2024, 7, 1), None),
            interval("d", dec!(90.0), date(2020, 1, 1), Some(date(2030, 1, 1))),
        ];
        for proration in prorate(&intervals, &fy2024()).values() {
            assert!(proration.months_touched >= 1);
        }
    }

    #[test]
    fn instructor_keys_ignore_case() {
        let intervals = vec![
            interval("ab", dec!(50.0), date(2024, 7, 1), Some(date(2024, 12, 31))),
            interval("AB", dec!(50.0), date(2025, 1, 1), Some(date(2025, 6, 30))),
        ];
        let percents = compute_clinical_percents(&intervals, &fy2024());
        assert_eq!(percents.len(), 1);
        assert_eq!(percents[&InstructorId::new("Ab")], dec!(50.0));
    }

    #[test]
    fn type_class_selection_is_case_insensitive() {
        let mut other = interval("a", dec!(50.0), date(2024, 7, 1), None);
        other.type_class = "Admin".to_string();
        let intervals = vec![interval("a", dec!(50.0), date(2024, 7, 1), None), other];
        assert_eq!(select_type_class(&intervals, "clinical").len(), 1);
    }

    #[test]
    fn cli_ratio_requires_positive_percent() {
        assert_eq!(cli_ratio(dec!(12), Some(dec!(40))), Some(dec!(0.3)));
        assert_eq!(cli_ratio(dec!(12), Some(Decimal::ZERO)), None);
        assert_eq!(cli_ratio(dec!(12), None), None);
    }

    #[test]
    fn cli_ratio_rounds_exact_midpoints_up() {
        assert_eq!(cli_ratio(dec!(3.3), Some(dec!(6))), Some(dec!(0.6)));
        assert_eq!(cli_ratio(dec!(0.15), Some(dec!(1))), Some(dec!(0.2)));
    }
}
