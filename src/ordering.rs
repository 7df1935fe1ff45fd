//! Column ordering for effort-type codes.

use std::collections::BTreeSet;

/// Hand-curated presentation order for common effort types.
pub const FIXED_ORDER: &[&str] = &[
    "CLI", "VAR", "LEC", "LAB", "DIS", "PBL", "CBL", "TBL", "PRS", "JLC", "EXM", "SEM", "INT",
    "AUT", "PRJ", "WVL",
];

/// A blank separator column follows each of these types when rendered.
pub const SPACER_AFTER: &[&str] = &["VAR", "DIS"];

/// Fixed-list members present in `types` first, then the rest alphabetically.
pub fn order_effort_types<'a, I>(types: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: BTreeSet<&str> = types.into_iter().collect();
    let mut ordered: Vec<String> = FIXED_ORDER
        .iter()
        .filter(|code| present.contains(**code))
        .map(|code| code.to_string())
        .collect();
    ordered.extend(
        present
            .iter()
            .filter(|code| !FIXED_ORDER.contains(*code))
            .map(|code| code.to_string()),
    );
    ordered
}

pub fn is_spacer_after(code: &str) -> bool {
    SPACER_AFTER.contains(&code)
}

/// Ordered columns with `None` marking a spacer position. No trailing spacer.
pub fn columns_with_spacers(ordered: &[String]) -> Vec<Option<&str>> {
    let mut columns = Vec::with_capacity(ordered.len() + SPACER_AFTER.len());
    for (idx, code) in ordered.iter().enumerate() {
        columns.push(Some(code.as_str()));
        if is_spacer_after(code) && idx + 1 < ordered.len() {
            columns.push(None);
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_members_come_first_then_alphabetical() {
        let ordered = order_effort_types(["ZZZ", "LEC", "CLI"]);
        assert_eq!(ordered, vec!["CLI", "LEC", "ZZZ"]);
    }

    #[test]
    fn unknown_codes_sort_alphabetically() {
        let ordered = order_effort_types(["QQQ", "AAA", "LAB", "MMM"]);
        assert_eq!(ordered, vec!["LAB", "AAA", "MMM", "QQQ"]);
    }

    #[test]
    fn duplicates_collapse() {
        let ordered = order_effort_types(["LEC", "LEC", "CLI"]);
        assert_eq!(ordered, vec!["CLI", "LEC"]);
    }

    #[test]
    fn spacers_follow_group_boundaries() {
        let ordered = order_effort_types(["CLI", "VAR", "LEC", "DIS"]);
        assert_eq!(
            columns_with_spacers(&ordered),
            vec![Some("CLI"), Some("VAR"), None, Some("LEC"), Some("DIS")]
        );
    }
}
