use std::collections::BTreeMap;
use std::fmt::Write;

use rust_decimal::Decimal;

use crate::aggregate::round_one_decimal;
use crate::models::{AggregateReport, GroupAggregate, MeritSummary};
use crate::ordering::columns_with_spacers;

fn format_value(value: Option<&Decimal>) -> String {
    match value {
        Some(value) if value.fract().is_zero() => value.trunc().to_string(),
        Some(value) => format!("{:.1}", round_one_decimal(*value)),
        None => String::new(),
    }
}

fn header_row(output: &mut String, leading: &[&str], columns: &[Option<&str>]) {
    let mut cells: Vec<&str> = leading.to_vec();
    cells.extend(columns.iter().map(|column| column.unwrap_or(" ")));
    let _ = writeln!(output, "| {} |", cells.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(cells.len()));
}

fn value_cells(columns: &[Option<&str>], values: &BTreeMap<String, Decimal>) -> String {
    columns
        .iter()
        .map(|column| match column {
            Some(code) => format_value(values.get(*code)),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn render_group(output: &mut String, group: &GroupAggregate, columns: &[Option<&str>]) {
    let _ = writeln!(output, "## {}", group.name);
    let _ = writeln!(
        output,
        "Faculty: {} ({} with clinical assignment)",
        group.faculty_count, group.faculty_with_clinical_count
    );
    let _ = writeln!(output);

    header_row(output, &["Instructor", "Job Group"], columns);
    for instructor in &group.instructors {
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            instructor.instructor_name,
            instructor.job_group,
            value_cells(columns, &instructor.efforts)
        );
    }
    let _ = writeln!(output, "| **Total** | | {} |", value_cells(columns, &group.totals));
    let _ = writeln!(
        output,
        "| **Average** | | {} |",
        value_cells(columns, &group.averages)
    );
    let _ = writeln!(output);
}

pub fn render_report(title: &str, scope: &str, report: &AggregateReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# {title}");
    let _ = writeln!(output, "Generated for {scope}");
    let _ = writeln!(output);

    if report.is_empty() {
        let _ = writeln!(output, "No effort recorded for this selection.");
        return output;
    }

    let columns = columns_with_spacers(&report.columns);
    for department in &report.departments {
        render_group(&mut output, department, &columns);
    }
    render_group(&mut output, &report.school, &columns);
    output
}

pub fn render_merit(summary: &MeritSummary) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Merit & Promotion Summary");
    let _ = writeln!(output, "Academic year {}", summary.academic_year);
    let _ = writeln!(output);

    if summary.groups.is_empty() {
        let _ = writeln!(output, "No effort recorded for this academic year.");
        return output;
    }

    let columns = columns_with_spacers(&summary.columns);
    for group in &summary.groups {
        let _ = writeln!(output, "## {}", group.job_group);
        header_row(
            &mut output,
            &["Instructor", "Department", "Clinical %", "CLI Ratio"],
            &columns,
        );
        for entry in &group.entries {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                entry.instructor_name,
                entry.department,
                format_value(entry.clinical_percent.as_ref()),
                format_value(entry.cli_ratio.as_ref()),
                value_cells(&columns, &entry.efforts)
            );
        }
        let _ = writeln!(output);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::build_report;
    use crate::models::{EffortRow, InstructorId};
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn row(id: &str, effort_type: &str, value: Decimal) -> EffortRow {
        EffortRow {
            instructor_id: InstructorId::new(id),
            instructor_name: format!("Dr. {id}"),
            department: "VME".to_string(),
            job_group: "Professor".to_string(),
            course_id: "VME 101".to_string(),
            effort_type: effort_type.to_string(),
            effort_value: value,
            term_code: 202409,
        }
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(&[], &HashSet::new());
        let output = render_report("Department Effort", "2024-2025", &report);
        assert!(output.contains("No effort recorded"));
    }

    #[test]
    fn renders_columns_in_policy_order_with_spacer() {
        let rows = vec![
            row("a", "LEC", dec!(10.0)),
            row("a", "VAR", dec!(2.5)),
            row("b", "CLI", dec!(4.0)),
        ];
        let clinical = HashSet::from([InstructorId::new("b")]);
        let output = render_report("Department Effort", "2024-2025", &build_report(&rows, &clinical));
        assert!(output.contains("| Instructor | Job Group | CLI | VAR |   | LEC |"));
        assert!(output.contains("| Dr. a | Professor |  | 2.5 |  | 10 |"));
        assert!(output.contains("| **Average** | | 4 | 1.3 |  | 5 |"));
        assert!(output.contains("## School"));
    }

    #[test]
    fn values_print_whole_or_with_one_decimal() {
        assert_eq!(format_value(Some(&dec!(10.00))), "10");
        assert_eq!(format_value(Some(&dec!(72.5))), "72.5");
        assert_eq!(format_value(Some(&dec!(33.35))), "33.4");
        assert_eq!(format_value(None), "");
    }
}
