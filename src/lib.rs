//! Faculty effort aggregation, clinical-percent proration and year-over-year
//! rollover of percentage assignments.

pub mod academic_year;
pub mod aggregate;
pub mod clinical;
pub mod config;
pub mod db;
pub mod error;
pub mod merit;
pub mod models;
pub mod ordering;
pub mod report;
pub mod rollover;

pub use academic_year::{parse_start_year, term_codes_for_year, AcademicYear, FiscalWindow, TermCode};
pub use aggregate::build_report;
pub use clinical::{cli_ratio, compute_clinical_percents};
pub use error::{EffortError, Result};
pub use models::{AggregateReport, EffortRow, InstructorId, PercentageInterval};
pub use ordering::order_effort_types;
pub use rollover::{execute_rollover, preview_rollover, RolloverOutcome, RolloverPlan};
