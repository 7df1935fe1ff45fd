use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::academic_year::TermCode;
use crate::error::{EffortError, Result};

/// Effort-type code for clinical effort; averaged over clinical faculty only.
pub const CLINICAL_EFFORT_TYPE: &str = "CLI";

/// Cross-system instructor key. Comparison ignores ASCII case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct InstructorId(String);

impl InstructorId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InstructorId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for InstructorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<InstructorId> for String {
    fn from(value: InstructorId) -> Self {
        value.0
    }
}

impl fmt::Display for InstructorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One instructor's effort on one course in one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffortRow {
    pub instructor_id: InstructorId,
    pub instructor_name: String,
    pub department: String,
    pub job_group: String,
    pub course_id: String,
    pub effort_type: String,
    /// Hours or weeks, already resolved by the caller.
    pub effort_value: Decimal,
    pub term_code: TermCode,
}

/// A partial-year percentage commitment used for proration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageInterval {
    pub instructor_id: InstructorId,
    pub percentage: Decimal,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub type_class: String,
}

impl PercentageInterval {
    pub fn new(
        instructor_id: impl Into<InstructorId>,
        percentage: Decimal,
        start: NaiveDate,
        end: Option<NaiveDate>,
        type_class: impl Into<String>,
    ) -> Result<Self> {
        validate_percentage(percentage)?;
        if let Some(end) = end {
            if end < start {
                return Err(EffortError::InvalidDateRange { start, end });
            }
        }
        Ok(Self {
            instructor_id: instructor_id.into(),
            percentage,
            start,
            end,
            type_class: type_class.into(),
        })
    }
}

pub fn validate_percentage(percentage: Decimal) -> Result<()> {
    if percentage < Decimal::ZERO || percentage > dec!(100) {
        return Err(EffortError::PercentOutOfRange(percentage));
    }
    Ok(())
}

/// A stored percentage assignment, as read from and written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentAssignment {
    pub id: Uuid,
    pub instructor_id: InstructorId,
    pub assignment_type: String,
    pub type_class: String,
    pub unit: Option<String>,
    pub modifier: Option<String>,
    pub compensated: bool,
    pub percentage: Decimal,
    pub comment: Option<String>,
    pub start_at: NaiveDateTime,
    pub end_at: Option<NaiveDateTime>,
    pub academic_year: String,
}

/// Summed effort for one instructor within one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructorEffort {
    pub instructor_id: InstructorId,
    pub instructor_name: String,
    pub job_group: String,
    pub has_clinical_assignment: bool,
    pub course_count: usize,
    pub efforts: BTreeMap<String, Decimal>,
}

/// Totals, averages and faculty counts for a department or the whole school.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GroupAggregate {
    pub name: String,
    pub instructors: Vec<InstructorEffort>,
    pub totals: BTreeMap<String, Decimal>,
    pub averages: BTreeMap<String, Decimal>,
    pub faculty_count: usize,
    pub faculty_with_clinical_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateReport {
    /// Distinct effort types in the input, ascending.
    pub effort_types: Vec<String>,
    /// Presentation order of the same types.
    pub columns: Vec<String>,
    pub departments: Vec<GroupAggregate>,
    pub school: GroupAggregate,
}

impl AggregateReport {
    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
    }
}

/// One line of the merit/promotion summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeritEntry {
    pub instructor_id: InstructorId,
    pub instructor_name: String,
    pub department: String,
    pub job_group: String,
    pub efforts: BTreeMap<String, Decimal>,
    pub clinical_percent: Option<Decimal>,
    pub cli_ratio: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeritGroup {
    pub job_group: String,
    pub entries: Vec<MeritEntry>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeritSummary {
    pub academic_year: String,
    pub columns: Vec<String>,
    pub groups: Vec<MeritGroup>,
}
