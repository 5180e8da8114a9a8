//! Entry point for the Labor Engine binary.
//!
//! Running this binary loads a JSON dataset of time entries and
//! planning entries, runs every compliance check for each active
//! employee and prints the combined report as JSON on stdout.
//!
//! Configuration comes from the environment:
//! - `LABOR_DATASET`: path to the dataset (required).
//! - `LABOR_RULES_DIR`: directory of rule-set JSON files (default `rules`).
//! - `LABOR_JURISDICTION`: rule set to apply (default `FR`).
//! - `LABOR_FROM` / `LABOR_TO`: ISO dates bounding the scan (default:
//!   the current ISO week).

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use labor_engine::conflicts::ConflictScope;
use labor_engine::constraints::RuleBook;
use labor_engine::engine::ComplianceEngine;
use labor_engine::interval::week_bounds;
use labor_engine::models::{Anomaly, Conflict, OvertimeCalculation, PlanningComparison};
use labor_engine::repository::{InMemoryRepository, TimeRepository};
use labor_engine::resolution::{suggest_resolutions, ResolutionPlan};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Serialize)]
struct EmployeeReport {
    employee_id: i64,
    conflicts: Vec<Conflict>,
    anomalies: Vec<Anomaly>,
    overtime: Vec<OvertimeCalculation>,
    planning: PlanningComparison,
    resolutions: Vec<ResolutionPlan>,
}

#[derive(Debug, Serialize)]
struct Report {
    jurisdiction: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    employees: Vec<EmployeeReport>,
}

fn env_date(key: &str) -> Result<Option<NaiveDate>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(
            value
                .parse()
                .with_context(|| format!("{key} must be an ISO date (YYYY-MM-DD)"))?,
        )),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("labor_engine=info".parse()?),
        )
        .init();

    let dataset_path = PathBuf::from(std::env::var("LABOR_DATASET").context("LABOR_DATASET not set")?);
    let rules_dir = PathBuf::from(std::env::var("LABOR_RULES_DIR").unwrap_or_else(|_| "rules".to_string()));
    let jurisdiction = std::env::var("LABOR_JURISDICTION").unwrap_or_else(|_| "FR".to_string());

    let (week_start, week_end) = week_bounds(Local::now().date_naive());
    let start = env_date("LABOR_FROM")?.unwrap_or(week_start);
    let end = env_date("LABOR_TO")?.unwrap_or(week_end);

    let rules = RuleBook::load(&rules_dir)?;
    info!(rule_sets = rules.len(), %jurisdiction, "rules loaded");
    let constraints = rules.constraints_for(&jurisdiction);

    let data = std::fs::read_to_string(&dataset_path)
        .with_context(|| format!("reading dataset {}", dataset_path.display()))?;
    let repository: InMemoryRepository = serde_json::from_str(&data).context("parsing dataset")?;
    let engine = ComplianceEngine::new(repository, constraints);

    let mut employees = Vec::new();
    for employee_id in engine.repository().get_active_employee_ids().await? {
        let conflicts = engine
            .detect_schedule_conflicts(ConflictScope::new().employee(employee_id).between(start, end))
            .await?;
        let anomalies = engine.detect_anomalies(employee_id, start, end).await?;
        let overtime = engine.calculate_overtime(employee_id, start, end).await?;
        let planning = engine.compare_with_planning(employee_id, start, end).await?;
        let resolutions = suggest_resolutions(&conflicts);
        employees.push(EmployeeReport {
            employee_id,
            conflicts,
            anomalies,
            overtime,
            planning,
            resolutions,
        });
    }
    info!(employees = employees.len(), %start, %end, "report complete");

    let report = Report {
        jurisdiction,
        start_date: start,
        end_date: end,
        employees,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
