use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::clinical::cli_ratio;
use crate::models::{
    EffortRow, InstructorId, MeritEntry, MeritGroup, MeritSummary, CLINICAL_EFFORT_TYPE,
};
use crate::ordering::order_effort_types;

#[derive(Default)]
struct MeritAcc {
    name: String,
    departments: BTreeSet<String>,
    efforts: BTreeMap<String, Decimal>,
}

/// Per-instructor effort for an academic year, grouped by job group.
///
/// Instructors teaching in several departments appear once, with their
/// departments joined by `/`.
pub fn build_merit_summary(
    academic_year: &str,
    rows: &[EffortRow],
    clinical_percents: &BTreeMap<InstructorId, Decimal>,
) -> MeritSummary {
    let mut groups: BTreeMap<String, BTreeMap<InstructorId, MeritAcc>> = BTreeMap::new();
    let mut effort_types: BTreeSet<&str> = BTreeSet::new();

    for row in rows {
        if row.effort_type.trim().is_empty() {
            continue;
        }
        effort_types.insert(row.effort_type.as_str());
        let acc = groups
            .entry(row.job_group.clone())
            .or_default()
            .entry(row.instructor_id.clone())
            .or_default();
        if acc.name.is_empty() {
            acc.name = row.instructor_name.clone();
        }
        acc.departments.insert(row.department.clone());
        *acc.efforts.entry(row.effort_type.clone()).or_default() += row.effort_value;
    }

    let groups = groups
        .into_iter()
        .map(|(job_group, instructors)| {
            let mut entries: Vec<MeritEntry> = instructors
                .into_iter()
                .map(|(instructor_id, acc)| {
                    let clinical_percent = clinical_percents.get(&instructor_id).copied();
                    let cli_effort = acc
                        .efforts
                        .get(CLINICAL_EFFORT_TYPE)
                        .copied()
                        .unwrap_or_default();
                    MeritEntry {
                        cli_ratio: cli_ratio(cli_effort, clinical_percent),
                        clinical_percent,
                        instructor_name: acc.name,
                        department: acc.departments.into_iter().collect::<Vec<_>>().join("/"),
                        job_group: job_group.clone(),
                        efforts: acc.efforts,
                        instructor_id,
                    }
                })
                .collect();
            entries.sort_by(|a, b| a.instructor_name.cmp(&b.instructor_name));
            MeritGroup { job_group, entries }
        })
        .collect();

    MeritSummary {
        academic_year: academic_year.to_string(),
        columns: order_effort_types(effort_types),
        groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(id: &str, dept: &str, job: &str, effort_type: &str, value: Decimal) -> EffortRow {
        EffortRow {
            instructor_id: InstructorId::new(id),
            instructor_name: format!("Dr. {id}"),
            department: dept.to_string(),
            job_group: job.to_string(),
            course_id: "VMD 400".to_string(),
            effort_type: effort_type.to_string(),
            effort_value: value,
            term_code: 202409,
        }
    }

    #[test]
    fn groups_by_job_group_with_cli_ratio() {
        let rows = vec![
            row("a", "VME", "Professor", "CLI", dec!(12)),
            row("a", "PMI", "Professor", "LEC", dec!(10)),
            row("b", "VME", "Lecturer", "LEC", dec!(30)),
        ];
        let percents = BTreeMap::from([(InstructorId::new("a"), dec!(40))]);
        let summary = build_merit_summary("2024-2025", &rows, &percents);

        assert_eq!(summary.columns, vec!["CLI", "LEC"]);
        let names: Vec<&str> = summary.groups.iter().map(|g| g.job_group.as_str()).collect();
        assert_eq!(names, vec!["Lecturer", "Professor"]);

        let professor = &summary.groups[1].entries[0];
        assert_eq!(professor.department, "PMI/VME");
        assert_eq!(professor.clinical_percent, Some(dec!(40)));
        assert_eq!(professor.cli_ratio, Some(dec!(0.3)));

        let lecturer = &summary.groups[0].entries[0];
        assert_eq!(lecturer.clinical_percent, None);
        assert_eq!(lecturer.cli_ratio, None);
    }
}
