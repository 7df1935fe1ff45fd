//! Groups effort rows into department and school aggregates.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::models::{
    AggregateReport, EffortRow, GroupAggregate, InstructorEffort, InstructorId,
    CLINICAL_EFFORT_TYPE,
};
use crate::ordering::order_effort_types;

/// Label used for the school-wide group.
pub const SCHOOL_GROUP: &str = "School";

#[derive(Default)]
struct InstructorAcc {
    name: String,
    job_group: String,
    courses: BTreeSet<String>,
    efforts: BTreeMap<String, Decimal>,
}

impl InstructorAcc {
    fn add(&mut self, row: &EffortRow) {
        if self.name.is_empty() {
            self.name = row.instructor_name.clone();
            self.job_group = row.job_group.clone();
        }
        self.courses.insert(row.course_id.clone());
        *self.efforts.entry(row.effort_type.clone()).or_default() += row.effort_value;
    }
}

/// Round half away from zero to one decimal place.
pub fn round_one_decimal(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Concatenates the rows of several terms so they aggregate as one pool.
pub fn pool_terms<I>(batches: I) -> Vec<EffortRow>
where
    I: IntoIterator<Item = Vec<EffortRow>>,
{
    batches.into_iter().flatten().collect()
}

/// Builds the department and school aggregates for a row set.
///
/// `clinical` holds the instructors known to carry a clinical assignment for
/// the year; it only drives the `CLI` average divisor and the clinical
/// faculty counts.
pub fn build_report(rows: &[EffortRow], clinical: &HashSet<InstructorId>) -> AggregateReport {
    let mut effort_types: BTreeSet<String> = BTreeSet::new();
    let mut by_department: BTreeMap<String, BTreeMap<InstructorId, InstructorAcc>> =
        BTreeMap::new();
    let mut school: BTreeMap<InstructorId, InstructorAcc> = BTreeMap::new();
    let mut skipped = 0usize;

    for row in rows {
        if row.effort_type.trim().is_empty() {
            skipped += 1;
            continue;
        }
        effort_types.insert(row.effort_type.clone());
        by_department
            .entry(row.department.clone())
            .or_default()
            .entry(row.instructor_id.clone())
            .or_default()
            .add(row);
        school
            .entry(row.instructor_id.clone())
            .or_default()
            .add(row);
    }

    if skipped > 0 {
        warn!(skipped, "skipped effort rows without an effort type");
    }

    let departments: Vec<GroupAggregate> = by_department
        .into_iter()
        .map(|(department, instructors)| summarize_group(department, instructors, clinical))
        .collect();
    let school = summarize_group(SCHOOL_GROUP.to_string(), school, clinical);
    let columns = order_effort_types(effort_types.iter().map(String::as_str));

    debug!(
        rows = rows.len(),
        departments = departments.len(),
        faculty = school.faculty_count,
        "built effort report"
    );

    AggregateReport {
        effort_types: effort_types.into_iter().collect(),
        columns,
        departments,
        school,
    }
}

fn summarize_group(
    name: String,
    instructors: BTreeMap<InstructorId, InstructorAcc>,
    clinical: &HashSet<InstructorId>,
) -> GroupAggregate {
    let mut members: Vec<InstructorEffort> = instructors
        .into_iter()
        .map(|(instructor_id, acc)| InstructorEffort {
            has_clinical_assignment: clinical.contains(&instructor_id),
            instructor_id,
            instructor_name: acc.name,
            job_group: acc.job_group,
            course_count: acc.courses.len(),
            efforts: acc.efforts,
        })
        .collect();
    members.sort_by(|a, b| {
        a.instructor_name
            .cmp(&b.instructor_name)
            .then_with(|| a.instructor_id.cmp(&b.instructor_id))
    });

    let faculty_count = members.len();
    let faculty_with_clinical_count = members
        .iter()
        .filter(|member| member.has_clinical_assignment)
        .count();
    let totals = group_totals(&members);
    let averages = group_averages(&totals, faculty_count, faculty_with_clinical_count);

    GroupAggregate {
        name,
        instructors: members,
        totals,
        averages,
        faculty_count,
        faculty_with_clinical_count,
    }
}

/// Sum of every member's effort per type. Zero totals are left out.
pub fn group_totals(members: &[InstructorEffort]) -> BTreeMap<String, Decimal> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for member in members {
        for (effort_type, value) in &member.efforts {
            *totals.entry(effort_type.clone()).or_default() += *value;
        }
    }
    totals.retain(|_, total| !total.is_zero());
    totals
}

/// Per-type averages. `CLI` divides by clinical faculty, everything else by
/// all faculty; a zero divisor or zero total yields no entry.
pub fn group_averages(
    totals: &BTreeMap<String, Decimal>,
    faculty_count: usize,
    faculty_with_clinical_count: usize,
) -> BTreeMap<String, Decimal> {
    let mut averages = BTreeMap::new();
    for (effort_type, total) in totals {
        if total.is_zero() {
            continue;
        }
        let divisor = if effort_type == CLINICAL_EFFORT_TYPE {
            faculty_with_clinical_count
        } else {
            faculty_count
        };
        if divisor == 0 {
            continue;
        }
        let average = *total / Decimal::from(divisor as u64);
        averages.insert(effort_type.clone(), round_one_decimal(average));
    }
    averages
}
