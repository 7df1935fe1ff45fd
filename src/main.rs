use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groupscholar_faculty_effort::academic_year::{
    term_codes_for_year, AcademicYear, CalendarTermPolicy, TermYearPolicy,
};
use groupscholar_faculty_effort::aggregate::{build_report, round_one_decimal};
use groupscholar_faculty_effort::clinical::{compute_clinical_percents, select_type_class};
use groupscholar_faculty_effort::config::{AppConfig, DEFAULT_LOG_FILTER};
use groupscholar_faculty_effort::db::{self, PgEffortStore};
use groupscholar_faculty_effort::merit::build_merit_summary;
use groupscholar_faculty_effort::report;
use groupscholar_faculty_effort::rollover::{execute_rollover, preview_rollover, RolloverCandidate};

#[derive(Parser)]
#[command(name = "faculty-effort")]
#[command(about = "Faculty teaching and clinical effort reporting for Group Scholar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import effort rows from a CSV file
    ImportEffort {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import percentage assignments from a CSV file
    ImportPercent {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Build a department and school effort report
    #[command(group(
        ArgGroup::new("period")
            .args(["term", "year"])
            .required(true)
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        term: Option<i32>,
        /// Academic year as YYYY-YYYY
        #[arg(long)]
        year: Option<String>,
        #[arg(long = "dept")]
        departments: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print time-weighted clinical percents for an academic year
    Clinical {
        #[arg(long)]
        year: String,
    },
    /// Build the merit and promotion summary for an academic year
    Merit {
        #[arg(long)]
        year: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Copy June 30 percentage assignments into the next academic year
    Rollover {
        /// Calendar year whose June 30 closes the source academic year
        #[arg(long)]
        year: i32,
        #[arg(long, default_value_t = false)]
        execute: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_candidates(label: &str, candidates: &[RolloverCandidate]) {
    println!("{label}: {}", candidates.len());
    for candidate in candidates {
        let assignment = &candidate.assignment;
        println!(
            "- {} {} {:.2}% ({})",
            assignment.instructor_id,
            assignment.assignment_type,
            assignment.percentage,
            assignment.unit.as_deref().unwrap_or("no unit")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportEffort { csv } => {
            let inserted = db::import_effort_csv(&pool, &csv).await?;
            println!("Inserted {inserted} effort rows from {}.", csv.display());
        }
        Commands::ImportPercent { csv } => {
            let inserted = db::import_percent_csv(&pool, &csv).await?;
            println!("Inserted {inserted} percentage assignments from {}.", csv.display());
        }
        Commands::Report {
            term,
            year,
            departments,
            format,
            out,
        } => {
            let (academic_year, terms, scope) = match (term, year) {
                (Some(term), _) => {
                    let start_year = CalendarTermPolicy
                        .academic_start_year(term)
                        .with_context(|| format!("term {term} does not map to an academic year"))?;
                    (AcademicYear::starting(start_year), vec![term], format!("term {term}"))
                }
                (None, Some(year)) => {
                    let academic_year = AcademicYear::parse(&year)?;
                    let all = db::fetch_term_codes(&pool).await?;
                    let terms =
                        term_codes_for_year(&all, academic_year.start_year(), &CalendarTermPolicy);
                    (academic_year, terms, format!("academic year {academic_year}"))
                }
                (None, None) => anyhow::bail!("either --term or --year is required"),
            };

            let filter = (!departments.is_empty()).then_some(departments.as_slice());
            let rows = db::fetch_pooled_rows(&pool, &terms, filter).await?;
            let clinical =
                db::fetch_clinical_instructors(&pool, &academic_year.label(), &config.clinical_class)
                    .await?;
            let aggregate = build_report(&rows, &clinical);

            let (body, extension) = match format {
                OutputFormat::Markdown => (
                    report::render_report("Faculty Effort Report", &scope, &aggregate),
                    "md",
                ),
                OutputFormat::Json => (serde_json::to_string_pretty(&aggregate)?, "json"),
            };
            let out = out.unwrap_or_else(|| config.report_dir.join(format!("effort-report.{extension}")));
            std::fs::write(&out, body)?;
            info!(rows = rows.len(), departments = aggregate.departments.len(), "report written");
            println!("Report written to {}.", out.display());
        }
        Commands::Clinical { year } => {
            let academic_year = AcademicYear::parse(&year)?;
            let window = academic_year.fiscal_window()?;
            let intervals =
                db::fetch_percent_intervals(&pool, &config.clinical_class, &window).await?;
            let intervals = select_type_class(&intervals, &config.clinical_class);
            let percents = compute_clinical_percents(&intervals, &window);

            if percents.is_empty() {
                println!("No clinical assignments found for {academic_year}.");
                return Ok(());
            }

            println!("Clinical percent for {academic_year}:");
            for (instructor_id, percent) in &percents {
                println!("- {instructor_id}: {}%", round_one_decimal(*percent));
            }
        }
        Commands::Merit { year, out } => {
            let academic_year = AcademicYear::parse(&year)?;
            let window = academic_year.fiscal_window()?;
            let all = db::fetch_term_codes(&pool).await?;
            let terms = term_codes_for_year(&all, academic_year.start_year(), &CalendarTermPolicy);
            let rows = db::fetch_pooled_rows(&pool, &terms, None).await?;
            let intervals =
                db::fetch_percent_intervals(&pool, &config.clinical_class, &window).await?;
            let percents = compute_clinical_percents(&intervals, &window);
            let summary = build_merit_summary(&academic_year.label(), &rows, &percents);

            let out = out.unwrap_or_else(|| config.report_dir.join("merit-summary.md"));
            std::fs::write(&out, report::render_merit(&summary))?;
            println!("Merit summary written to {}.", out.display());
        }
        Commands::Rollover { year, execute } => {
            let store = PgEffortStore::new(pool.clone());
            if execute {
                let outcome = execute_rollover(&store, &store, year).await?;
                print_candidates("Already rolled", &outcome.plan.already_rolled);
                print_candidates("Excluded by post-harvest edits", &outcome.plan.excluded_by_audit);
                println!("Created {} assignments for {}.", outcome.created, outcome.plan.dates.target_year());
            } else {
                let plan = preview_rollover(&store, &store, year).await?;
                print_candidates("Eligible", &plan.eligible);
                print_candidates("Already rolled", &plan.already_rolled);
                print_candidates("Excluded by post-harvest edits", &plan.excluded_by_audit);
                println!("Preview only; pass --execute to create records.");
            }
        }
    }

    Ok(())
}
