use chrono::NaiveDate;
use groupscholar_faculty_effort::academic_year::{parse_start_year, FiscalWindow};
use groupscholar_faculty_effort::clinical::prorate;
use groupscholar_faculty_effort::models::PercentageInterval;
use groupscholar_faculty_effort::ordering::{order_effort_types, FIXED_ORDER};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn effort_code_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        proptest::sample::select(FIXED_ORDER.to_vec()).prop_map(|code| code.to_string()),
        "[A-Z]{3}",
    ]
}

proptest! {
    #[test]
    fn valid_academic_years_parse_to_first_year(first in 1000i32..9999) {
        let input = format!("{first}-{}", first + 1);
        prop_assert_eq!(parse_start_year(&input).unwrap(), first);
    }

    #[test]
    fn strings_off_the_pattern_are_rejected(input in "\\PC{0,12}") {
        let matches = input.len() == 9
            && input.as_bytes()[4] == b'-'
            && input
                .bytes()
                .enumerate()
                .all(|(idx, byte)| idx == 4 || byte.is_ascii_digit());
        prop_assume!(!matches);
        prop_assert!(parse_start_year(&input).is_err());
    }

    #[test]
    fn ordering_keeps_fixed_members_ahead_of_the_rest(codes in proptest::collection::vec(effort_code_strategy(), 0..12)) {
        let ordered = order_effort_types(codes.iter().map(String::as_str));

        let mut distinct = codes.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(ordered.len(), distinct.len());

        let split = ordered
            .iter()
            .position(|code| !FIXED_ORDER.contains(&code.as_str()))
            .unwrap_or(ordered.len());
        let (fixed, rest) = ordered.split_at(split);
        prop_assert!(rest.iter().all(|code| !FIXED_ORDER.contains(&code.as_str())));
        prop_assert!(rest.windows(2).all(|pair| pair[0] < pair[1]));

        let positions: Vec<usize> = fixed
            .iter()
            .filter_map(|code| FIXED_ORDER.iter().position(|known| *known == code.as_str()))
            .collect();
        prop_assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn prorated_percent_stays_within_interval_bounds(
        spans in proptest::collection::vec((1u32..=12, 0u32..12, 1u32..=100), 1..6)
    ) {
        let window = FiscalWindow::for_start_year(2024).unwrap();
        let intervals: Vec<PercentageInterval> = spans
            .iter()
            .map(|(month, length, pct)| {
                let year = if *month >= 7 { 2024 } else { 2025 };
                let start = NaiveDate::from_ymd_opt(year, *month, 1).unwrap();
                let end = start
                    .checked_add_months(chrono::Months::new(*length))
                    .unwrap();
                PercentageInterval::new("a", Decimal::from(*pct), start, Some(end), "Clinical").unwrap()
            })
            .collect();

        let prorations = prorate(&intervals, &window);
        let proration = prorations.values().next().unwrap();
        prop_assert!(proration.months_touched >= 1);
        prop_assert!(proration.months_touched <= 12);

        let max = intervals.iter().map(|i| i.percentage).max().unwrap();
        let min = intervals.iter().map(|i| i.percentage).min().unwrap();
        prop_assert!(proration.percent >= min);
        prop_assert!(proration.percent <= max * Decimal::from(intervals.len() as u64));
    }
}
