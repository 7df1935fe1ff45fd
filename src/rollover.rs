//! Year-over-year copy-forward of percentage assignments.
//!
//! Every assignment ending June 30 of the boundary year is copied into the
//! next academic year unless an equivalent record already exists there or a
//! person edited that instructor's assignment type after the last harvest.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::academic_year::{academic_year_label, AcademicYear};
use crate::error::{EffortError, Result};
use crate::models::{InstructorId, PercentAssignment};

pub const ROLLOVER_ACTION: &str = "rollover";
pub const ROLLOVER_ACTOR: &str = "system:rollover";

/// Reads and writes percentage assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Assignments whose end falls in `[from, to)`.
    async fn assignments_ending_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<PercentAssignment>>;

    /// Assignments starting on `start` and ending on `end`, compared by day.
    async fn assignments_spanning(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PercentAssignment>>;

    /// Inserts `records` together with their `audit` entries. Either both land
    /// or neither does.
    async fn create_assignments(
        &self,
        records: &[PercentAssignment],
        audit: &[AuditEntry],
    ) -> Result<usize>;
}

/// Change-log access used to protect manual edits.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Most recent harvest of any term in `year`.
    async fn last_harvest(&self, year: AcademicYear) -> Result<Option<NaiveDateTime>>;

    /// (instructor, assignment type) pairs a person changed after `since`.
    async fn modified_after(&self, since: NaiveDateTime) -> Result<HashSet<(InstructorId, String)>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub instructor_id: InstructorId,
    pub assignment_type: String,
    pub action: String,
    pub actor: String,
    pub detail: String,
}

/// Date-independent identity of a logical assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IdentityKey {
    pub instructor_id: InstructorId,
    pub assignment_type: String,
    pub unit: Option<String>,
    pub modifier: Option<String>,
    pub compensated: bool,
    /// Normalized so `50` and `50.00` compare equal.
    pub percentage: Decimal,
    pub comment: Option<String>,
}

fn normalized(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl IdentityKey {
    pub fn of(assignment: &PercentAssignment) -> Self {
        Self {
            instructor_id: assignment.instructor_id.clone(),
            assignment_type: assignment.assignment_type.clone(),
            unit: normalized(&assignment.unit),
            modifier: normalized(&assignment.modifier),
            compensated: assignment.compensated,
            percentage: assignment.percentage.normalize(),
            comment: normalized(&assignment.comment),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloverCandidate {
    pub assignment: PercentAssignment,
    pub key: IdentityKey,
}

impl RolloverCandidate {
    pub fn new(assignment: PercentAssignment) -> Self {
        let key = IdentityKey::of(&assignment);
        Self { assignment, key }
    }
}

/// Start and end stamps bounding the rollover around June 30 of a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RolloverDates {
    pub boundary_year: i32,
    /// June 30 of the boundary year, the day source assignments end on.
    pub source_end_day: NaiveDate,
    pub target_start: NaiveDate,
    pub target_end: NaiveDate,
}

impl RolloverDates {
    pub fn for_boundary(boundary_year: i32) -> Result<Self> {
        let invalid = || EffortError::InvalidAcademicYear(academic_year_label(boundary_year));
        Ok(Self {
            boundary_year,
            source_end_day: NaiveDate::from_ymd_opt(boundary_year, 6, 30).ok_or_else(invalid)?,
            target_start: NaiveDate::from_ymd_opt(boundary_year, 7, 1).ok_or_else(invalid)?,
            target_end: NaiveDate::from_ymd_opt(boundary_year + 1, 6, 30).ok_or_else(invalid)?,
        })
    }

    /// Half-open `[June 30, July 1)` so stored time-of-day does not matter.
    pub fn source_end_range(&self) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.source_end_day.and_time(NaiveTime::MIN),
            self.target_start.and_time(NaiveTime::MIN),
        )
    }

    pub fn source_year(&self) -> AcademicYear {
        AcademicYear::starting(self.boundary_year - 1)
    }

    pub fn target_year(&self) -> AcademicYear {
        AcademicYear::starting(self.boundary_year)
    }
}

/// The three disjoint partitions of a rollover, computed before any write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloverPlan {
    pub dates: RolloverDates,
    pub eligible: Vec<RolloverCandidate>,
    pub already_rolled: Vec<RolloverCandidate>,
    pub excluded_by_audit: Vec<RolloverCandidate>,
}

impl RolloverPlan {
    pub fn candidate_count(&self) -> usize {
        self.eligible.len() + self.already_rolled.len() + self.excluded_by_audit.len()
    }

    /// Fresh target-year records for every eligible candidate.
    pub fn new_records(&self) -> Vec<PercentAssignment> {
        let label = self.dates.target_year().label();
        self.eligible
            .iter()
            .map(|candidate| {
                let source = &candidate.assignment;
                PercentAssignment {
                    id: Uuid::new_v4(),
                    instructor_id: source.instructor_id.clone(),
                    assignment_type: source.assignment_type.clone(),
                    type_class: source.type_class.clone(),
                    unit: source.unit.clone(),
                    modifier: source.modifier.clone(),
                    compensated: source.compensated,
                    percentage: source.percentage,
                    comment: source.comment.clone(),
                    start_at: self.dates.target_start.and_time(NaiveTime::MIN),
                    end_at: Some(self.dates.target_end.and_time(NaiveTime::MIN)),
                    academic_year: label.clone(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloverOutcome {
    pub plan: RolloverPlan,
    pub created: usize,
}

/// Partitions source assignments against the target year and the audit exclusions.
pub fn classify(
    dates: RolloverDates,
    source: Vec<PercentAssignment>,
    target: &[PercentAssignment],
    exclusions: &HashSet<(InstructorId, String)>,
) -> RolloverPlan {
    let mut existing: HashSet<IdentityKey> = target.iter().map(IdentityKey::of).collect();
    let mut plan = RolloverPlan {
        dates,
        eligible: Vec::new(),
        already_rolled: Vec::new(),
        excluded_by_audit: Vec::new(),
    };

    for assignment in source {
        let candidate = RolloverCandidate::new(assignment);
        if existing.contains(&candidate.key) {
            plan.already_rolled.push(candidate);
            continue;
        }
        let pair = (
            candidate.key.instructor_id.clone(),
            candidate.key.assignment_type.clone(),
        );
        if exclusions.contains(&pair) {
            plan.excluded_by_audit.push(candidate);
        } else {
            // A second source record with the same key would roll into a duplicate.
            existing.insert(candidate.key.clone());
            plan.eligible.push(candidate);
        }
    }

    plan
}

/// Computes the rollover partitions without side effects.
pub async fn preview_rollover<S, A>(
    store: &S,
    audit: &A,
    boundary_year: i32,
) -> Result<RolloverPlan>
where
    S: AssignmentStore + ?Sized,
    A: AuditTrail + ?Sized,
{
    let dates = RolloverDates::for_boundary(boundary_year)?;
    let (from, to) = dates.source_end_range();
    let source = store.assignments_ending_between(from, to).await?;
    let target = store
        .assignments_spanning(dates.target_start, dates.target_end)
        .await?;

    let exclusions = match audit.last_harvest(dates.source_year()).await? {
        Some(harvested_at) => audit.modified_after(harvested_at).await?,
        None => HashSet::new(),
    };

    let plan = classify(dates, source, &target, &exclusions);
    debug!(
        boundary_year,
        eligible = plan.eligible.len(),
        already_rolled = plan.already_rolled.len(),
        excluded = plan.excluded_by_audit.len(),
        "previewed rollover"
    );
    Ok(plan)
}

/// Creates the eligible records, with one audit entry per record written in
/// the same transaction.
pub async fn execute_rollover<S, A>(
    store: &S,
    audit: &A,
    boundary_year: i32,
) -> Result<RolloverOutcome>
where
    S: AssignmentStore + ?Sized,
    A: AuditTrail + ?Sized,
{
    let plan = preview_rollover(store, audit, boundary_year).await?;
    let records = plan.new_records();
    if records.is_empty() {
        info!(boundary_year, "rollover found nothing to create");
        return Ok(RolloverOutcome { plan, created: 0 });
    }

    let target_label = plan.dates.target_year().label();
    let entries: Vec<AuditEntry> = records
        .iter()
        .map(|record| AuditEntry {
            instructor_id: record.instructor_id.clone(),
            assignment_type: record.assignment_type.clone(),
            action: ROLLOVER_ACTION.to_string(),
            actor: ROLLOVER_ACTOR.to_string(),
            detail: format!("{:.2}% copied into {}", record.percentage, target_label),
        })
        .collect();
    let created = store.create_assignments(&records, &entries).await?;

    info!(
        boundary_year,
        created,
        already_rolled = plan.already_rolled.len(),
        excluded = plan.excluded_by_audit.len(),
        "rollover complete"
    );
    Ok(RolloverOutcome { plan, created })
}
