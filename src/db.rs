use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::academic_year::{
    academic_year_label, term_codes_for_year, AcademicYear, CalendarTermPolicy, FiscalWindow,
    TermCode,
};
use crate::aggregate::pool_terms;
use crate::error::Result;
use crate::models::{validate_percentage, EffortRow, InstructorId, PercentAssignment, PercentageInterval};
use crate::rollover::{AssignmentStore, AuditEntry, AuditTrail, ROLLOVER_ACTOR};

const ASSIGNMENT_COLUMNS: &str = "id, instructor_id, assignment_type, type_class, unit, modifier, \
     compensated, percentage, comment, start_at, end_at, academic_year";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn academic_year_of(date: NaiveDate) -> String {
    if date.month() >= 7 {
        academic_year_label(date.year())
    } else {
        academic_year_label(date.year() - 1)
    }
}

async fn upsert_instructor(
    pool: &PgPool,
    instructor_id: &InstructorId,
    full_name: &str,
    department: &str,
    job_group: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO faculty_effort.instructors (instructor_id, full_name, department, job_group)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (instructor_id) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            department = EXCLUDED.department,
            job_group = EXCLUDED.job_group
        "#,
    )
    .bind(instructor_id.as_str())
    .bind(full_name)
    .bind(department)
    .bind(job_group)
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_term(pool: &PgPool, term_code: TermCode) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO faculty_effort.terms (term_code) VALUES ($1) ON CONFLICT (term_code) DO NOTHING",
    )
    .bind(term_code)
    .execute(pool)
    .await?;
    Ok(())
}

struct NewEffort<'a> {
    instructor_id: &'a InstructorId,
    department: &'a str,
    course_id: &'a str,
    effort_type: &'a str,
    effort_value: Decimal,
    term_code: TermCode,
    source_key: &'a str,
}

async fn insert_effort(pool: &PgPool, effort: NewEffort<'_>) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO faculty_effort.effort_records
        (id, instructor_id, department, course_id, effort_type, effort_value, term_code, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(effort.instructor_id.as_str())
    .bind(effort.department)
    .bind(effort.course_id)
    .bind(effort.effort_type)
    .bind(effort.effort_value)
    .bind(effort.term_code)
    .bind(effort.source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_assignment(
    pool: &PgPool,
    assignment: &PercentAssignment,
    source_key: Option<&str>,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO faculty_effort.percent_assignments
        (id, instructor_id, assignment_type, type_class, unit, modifier, compensated,
         percentage, comment, start_at, end_at, academic_year, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(assignment.id)
    .bind(assignment.instructor_id.as_str())
    .bind(&assignment.assignment_type)
    .bind(&assignment.type_class)
    .bind(&assignment.unit)
    .bind(&assignment.modifier)
    .bind(assignment.compensated)
    .bind(assignment.percentage)
    .bind(&assignment.comment)
    .bind(assignment.start_at)
    .bind(assignment.end_at)
    .bind(&assignment.academic_year)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let instructors = vec![
        ("AVLEE01", "Avery Lee", "VME", "Professor"),
        ("JMORENO", "Jules Moreno", "VME", "Associate Professor"),
        ("KPATEL2", "Kiara Patel", "PMI", "Lecturer"),
    ];
    for (id, name, department, job_group) in instructors {
        upsert_instructor(pool, &InstructorId::new(id), name, department, job_group).await?;
    }

    for term_code in [202409, 202501, 202503] {
        ensure_term(pool, term_code).await?;
    }
    sqlx::query(
        "UPDATE faculty_effort.terms SET harvested_at = $1 WHERE term_code = $2 AND harvested_at IS NULL",
    )
    .bind(
        NaiveDate::from_ymd_opt(2025, 6, 15)
            .context("invalid date")?
            .and_time(NaiveTime::MIN),
    )
    .bind(202503)
    .execute(pool)
    .await?;

    let efforts = vec![
        ("seed-e-001", "AVLEE01", "VME", "VME 401", "CLI", dec!(12), 202409),
        ("seed-e-002", "AVLEE01", "VME", "VME 210", "LEC", dec!(18), 202501),
        ("seed-e-003", "JMORENO", "VME", "VME 210", "LEC", dec!(12.5), 202501),
        ("seed-e-004", "JMORENO", "VME", "VME 215", "LAB", dec!(24), 202503),
        ("seed-e-005", "KPATEL2", "PMI", "PMI 128", "DIS", dec!(10), 202409),
    ];
    for (source_key, id, department, course_id, effort_type, effort_value, term_code) in efforts {
        insert_effort(
            pool,
            NewEffort {
                instructor_id: &InstructorId::new(id),
                department,
                course_id,
                effort_type,
                effort_value,
                term_code,
                source_key,
            },
        )
        .await?;
    }

    let percents = vec![
        ("seed-p-001", "AVLEE01", dec!(50), (2024, 7, 1), (2024, 9, 30)),
        ("seed-p-002", "AVLEE01", dec!(80), (2024, 10, 1), (2025, 6, 30)),
        ("seed-p-003", "JMORENO", dec!(25), (2024, 7, 1), (2025, 6, 30)),
    ];
    for (source_key, id, percentage, (sy, sm, sd), (ey, em, ed)) in percents {
        let start = NaiveDate::from_ymd_opt(sy, sm, sd).context("invalid date")?;
        let end = NaiveDate::from_ymd_opt(ey, em, ed).context("invalid date")?;
        let assignment = PercentAssignment {
            id: Uuid::new_v4(),
            instructor_id: InstructorId::new(id),
            assignment_type: "Clinical Service".to_string(),
            type_class: "Clinical".to_string(),
            unit: Some("VMTH".to_string()),
            modifier: None,
            compensated: false,
            percentage,
            comment: None,
            start_at: start.and_time(NaiveTime::MIN),
            end_at: Some(end.and_time(NaiveTime::MIN)),
            academic_year: academic_year_of(start),
        };
        insert_assignment(pool, &assignment, Some(source_key)).await?;
    }

    Ok(())
}

pub async fn import_effort_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        instructor_id: String,
        full_name: String,
        department: String,
        job_group: String,
        course_id: String,
        effort_type: String,
        effort_value: Decimal,
        term_code: TermCode,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let instructor_id = InstructorId::new(&row.instructor_id);
        upsert_instructor(pool, &instructor_id, &row.full_name, &row.department, &row.job_group)
            .await?;
        ensure_term(pool, row.term_code).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let added = insert_effort(
            pool,
            NewEffort {
                instructor_id: &instructor_id,
                department: &row.department,
                course_id: &row.course_id,
                effort_type: &row.effort_type,
                effort_value: row.effort_value,
                term_code: row.term_code,
                source_key: &source_key,
            },
        )
        .await?;

        if added {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_percent_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        instructor_id: String,
        full_name: String,
        department: String,
        job_group: String,
        assignment_type: String,
        type_class: String,
        unit: Option<String>,
        modifier: Option<String>,
        compensated: bool,
        percentage: Decimal,
        comment: Option<String>,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        validate_percentage(row.percentage)
            .with_context(|| format!("row {} for {}", line + 1, row.instructor_id))?;
        let instructor_id = InstructorId::new(&row.instructor_id);
        upsert_instructor(pool, &instructor_id, &row.full_name, &row.department, &row.job_group)
            .await?;

        let assignment = PercentAssignment {
            id: Uuid::new_v4(),
            instructor_id,
            assignment_type: row.assignment_type,
            type_class: row.type_class,
            unit: row.unit,
            modifier: row.modifier,
            compensated: row.compensated,
            percentage: row.percentage,
            comment: row.comment,
            start_at: row.start_date.and_time(NaiveTime::MIN),
            end_at: row.end_date.map(|end| end.and_time(NaiveTime::MIN)),
            academic_year: academic_year_of(row.start_date),
        };
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_assignment(pool, &assignment, Some(&source_key)).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_term_codes(pool: &PgPool) -> anyhow::Result<Vec<TermCode>> {
    let rows = sqlx::query("SELECT term_code FROM faculty_effort.terms ORDER BY term_code DESC")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("term_code")).collect())
}

/// Effort rows for the given terms, optionally limited to departments.
///
/// A department filter that resolved to nothing returns no rows without
/// touching the database.
pub async fn fetch_effort_rows(
    pool: &PgPool,
    terms: &[TermCode],
    departments: Option<&[String]>,
) -> anyhow::Result<Vec<EffortRow>> {
    if terms.is_empty() || departments.is_some_and(|depts| depts.is_empty()) {
        return Ok(Vec::new());
    }

    let mut query = String::from(
        "SELECT e.instructor_id, i.full_name, e.department, i.job_group, \
         e.course_id, e.effort_type, e.effort_value, e.term_code \
         FROM faculty_effort.effort_records e \
         JOIN faculty_effort.instructors i ON i.instructor_id = e.instructor_id \
         WHERE e.term_code = ANY($1)",
    );
    if departments.is_some() {
        query.push_str(" AND e.department = ANY($2)");
    }

    let mut rows = sqlx::query(&query).bind(terms.to_vec());
    if let Some(values) = departments {
        rows = rows.bind(values.to_vec());
    }

    let records = rows.fetch_all(pool).await?;
    let mut efforts = Vec::with_capacity(records.len());

    for row in records {
        let instructor_id: String = row.get("instructor_id");
        efforts.push(EffortRow {
            instructor_id: InstructorId::new(&instructor_id),
            instructor_name: row.get("full_name"),
            department: row.get("department"),
            job_group: row.get("job_group"),
            course_id: row.get("course_id"),
            effort_type: row.get("effort_type"),
            effort_value: row.get("effort_value"),
            term_code: row.get("term_code"),
        });
    }

    debug!(terms = terms.len(), rows = efforts.len(), "fetched effort rows");
    Ok(efforts)
}

/// Effort rows for several terms, fetched one term at a time and pooled into
/// a single row set.
pub async fn fetch_pooled_rows(
    pool: &PgPool,
    terms: &[TermCode],
    departments: Option<&[String]>,
) -> anyhow::Result<Vec<EffortRow>> {
    let mut batches = Vec::with_capacity(terms.len());
    for term in terms {
        batches.push(fetch_effort_rows(pool, std::slice::from_ref(term), departments).await?);
    }
    Ok(pool_terms(batches))
}

/// Instructors holding a positive assignment of `type_class` in the academic year.
pub async fn fetch_clinical_instructors(
    pool: &PgPool,
    academic_year: &str,
    type_class: &str,
) -> anyhow::Result<HashSet<InstructorId>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT instructor_id
        FROM faculty_effort.percent_assignments
        WHERE academic_year = $1 AND lower(type_class) = lower($2) AND percentage > 0
        "#,
    )
    .bind(academic_year)
    .bind(type_class)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| InstructorId::new(row.get::<&str, _>("instructor_id")))
        .collect())
}

/// Positive intervals of `type_class` overlapping the window.
pub async fn fetch_percent_intervals(
    pool: &PgPool,
    type_class: &str,
    window: &FiscalWindow,
) -> anyhow::Result<Vec<PercentageInterval>> {
    let rows = sqlx::query(
        r#"
        SELECT instructor_id, percentage, start_at, end_at, type_class
        FROM faculty_effort.percent_assignments
        WHERE lower(type_class) = lower($1)
          AND percentage > 0
          AND start_at::date <= $3
          AND (end_at IS NULL OR end_at::date >= $2)
        "#,
    )
    .bind(type_class)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    let mut intervals = Vec::with_capacity(rows.len());
    for row in rows {
        let instructor_id: String = row.get("instructor_id");
        let start_at: NaiveDateTime = row.get("start_at");
        let end_at: Option<NaiveDateTime> = row.get("end_at");
        let interval = PercentageInterval::new(
            instructor_id.as_str(),
            row.get("percentage"),
            start_at.date(),
            end_at.map(|end| end.date()),
            row.get::<String, _>("type_class"),
        )
        .with_context(|| format!("invalid percentage assignment for {instructor_id}"))?;
        intervals.push(interval);
    }
    Ok(intervals)
}

fn assignment_from_row(row: &PgRow) -> PercentAssignment {
    PercentAssignment {
        id: row.get("id"),
        instructor_id: InstructorId::new(row.get::<&str, _>("instructor_id")),
        assignment_type: row.get("assignment_type"),
        type_class: row.get("type_class"),
        unit: row.get("unit"),
        modifier: row.get("modifier"),
        compensated: row.get("compensated"),
        percentage: row.get("percentage"),
        comment: row.get("comment"),
        start_at: row.get("start_at"),
        end_at: row.get("end_at"),
        academic_year: row.get("academic_year"),
    }
}

/// Postgres-backed assignment store and audit trail.
#[derive(Clone)]
pub struct PgEffortStore {
    pool: PgPool,
}

impl PgEffortStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentStore for PgEffortStore {
    async fn assignments_ending_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<PercentAssignment>> {
        let query = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM faculty_effort.percent_assignments \
             WHERE end_at >= $1 AND end_at < $2"
        );
        let rows = sqlx::query(&query)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(assignment_from_row).collect())
    }

    async fn assignments_spanning(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PercentAssignment>> {
        let query = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM faculty_effort.percent_assignments \
             WHERE start_at::date = $1 AND end_at::date = $2"
        );
        let rows = sqlx::query(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(assignment_from_row).collect())
    }

    async fn create_assignments(
        &self,
        records: &[PercentAssignment],
        audit: &[AuditEntry],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0usize;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO faculty_effort.percent_assignments
                (id, instructor_id, assignment_type, type_class, unit, modifier, compensated,
                 percentage, comment, start_at, end_at, academic_year)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(record.id)
            .bind(record.instructor_id.as_str())
            .bind(&record.assignment_type)
            .bind(&record.type_class)
            .bind(&record.unit)
            .bind(&record.modifier)
            .bind(record.compensated)
            .bind(record.percentage)
            .bind(&record.comment)
            .bind(record.start_at)
            .bind(record.end_at)
            .bind(&record.academic_year)
            .execute(&mut *tx)
            .await?;
            created += result.rows_affected() as usize;
        }
        for entry in audit {
            sqlx::query(
                r#"
                INSERT INTO faculty_effort.audit_log
                (id, instructor_id, assignment_type, action, actor, detail)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(entry.instructor_id.as_str())
            .bind(&entry.assignment_type)
            .bind(&entry.action)
            .bind(&entry.actor)
            .bind(&entry.detail)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(created)
    }
}

#[async_trait]
impl AuditTrail for PgEffortStore {
    async fn last_harvest(&self, year: AcademicYear) -> Result<Option<NaiveDateTime>> {
        let rows = sqlx::query("SELECT term_code FROM faculty_effort.terms")
            .fetch_all(&self.pool)
            .await?;
        let all: Vec<TermCode> = rows.iter().map(|row| row.get("term_code")).collect();
        let terms = term_codes_for_year(&all, year.start_year(), &CalendarTermPolicy);
        if terms.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT max(harvested_at) AS harvested_at FROM faculty_effort.terms WHERE term_code = ANY($1)",
        )
        .bind(terms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("harvested_at"))
    }

    async fn modified_after(&self, since: NaiveDateTime) -> Result<HashSet<(InstructorId, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT instructor_id, assignment_type
            FROM faculty_effort.audit_log
            WHERE changed_at > $1 AND actor <> $2
            "#,
        )
        .bind(since)
        .bind(ROLLOVER_ACTOR)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    InstructorId::new(row.get::<&str, _>("instructor_id")),
                    row.get::<String, _>("assignment_type"),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://effort@127.0.0.1:1/unused")
            .unwrap()
    }

    #[test]
    fn academic_year_follows_july_boundary() {
        assert_eq!(academic_year_of(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()), "2024-2025");
        assert_eq!(academic_year_of(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()), "2024-2025");
    }

    #[tokio::test]
    async fn empty_department_filter_skips_the_query() {
        let pool = unreachable_pool();
        let departments: Vec<String> = Vec::new();
        let rows = fetch_effort_rows(&pool, &[202409], Some(departments.as_slice()))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn empty_term_list_skips_the_query() {
        let pool = unreachable_pool();
        assert!(fetch_effort_rows(&pool, &[], None).await.unwrap().is_empty());
        assert!(fetch_pooled_rows(&pool, &[], None).await.unwrap().is_empty());
    }
}
