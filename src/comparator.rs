//! Planned-vs-actual comparison.

use crate::constraints::LegalConstraints;
use crate::engine::{ensure_range, ComplianceEngine};
use crate::error::{EngineError, EngineResult};
use crate::interval;
use crate::models::{ComparisonStatus, DayComparison, PlanningComparison, PlanningEntry, TimeEntry};
use crate::repository::TimeRepository;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl<R: TimeRepository> ComplianceEngine<R> {
    pub async fn compare_with_planning(
        &self,
        employee_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<PlanningComparison> {
        ensure_range(start, end)?;
        let planning = self
            .fetch_planning_entries(employee_id, start, end)
            .await
            .map_err(EngineError::repository("planning comparison"))?;
        let entries = self
            .fetch_time_entries(employee_id, start, end)
            .await
            .map_err(EngineError::repository("planning comparison"))?;
        let report = compare(self.constraints(), employee_id, start, end, &planning, &entries);
        debug!(
            employee_id,
            variance = report.variance,
            days = report.days.len(),
            "compared with planning"
        );
        Ok(report)
    }
}

/// Classifies one day.  Within the match tolerance (exclusive) the day
/// matches; a planned day with nothing recorded is `Missing`.
pub fn classify_day(constraints: &LegalConstraints, planned: f64, actual: Option<f64>) -> ComparisonStatus {
    let Some(actual) = actual else {
        return if planned > 0.0 {
            ComparisonStatus::Missing
        } else {
            ComparisonStatus::Match
        };
    };
    let variance = actual - planned;
    if variance.abs() < constraints.match_tolerance_hours {
        ComparisonStatus::Match
    } else if variance > 0.0 {
        ComparisonStatus::Over
    } else {
        ComparisonStatus::Under
    }
}

/// Builds the comparison report from already-fetched collections.
pub fn compare(
    constraints: &LegalConstraints,
    employee_id: i64,
    start: NaiveDate,
    end: NaiveDate,
    planning: &[PlanningEntry],
    entries: &[TimeEntry],
) -> PlanningComparison {
    let mut planned: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for slot in planning {
        *planned.entry(slot.date).or_default() += slot.planned_minutes();
    }
    let mut actual: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.is_work()) {
        *actual.entry(entry.date).or_default() += entry.worked_minutes();
    }

    let dates: BTreeSet<NaiveDate> = planned.keys().chain(actual.keys()).copied().collect();
    let days: Vec<DayComparison> = dates
        .iter()
        .map(|date| {
            let planned_minutes = planned.get(date).copied().unwrap_or(0);
            let recorded = actual.get(date).copied();
            let actual_minutes = recorded.unwrap_or(0);
            let planned_hours = interval::minutes_to_hours(planned_minutes);
            DayComparison {
                date: *date,
                planned_hours,
                actual_hours: interval::minutes_to_hours(actual_minutes),
                variance: interval::minutes_difference(actual_minutes, planned_minutes),
                status: classify_day(constraints, planned_hours, recorded.map(interval::minutes_to_hours)),
            }
        })
        .collect();

    let planned_minutes: u32 = planned.values().sum();
    let actual_minutes: u32 = actual.values().sum();
    let planned_total = interval::minutes_to_hours(planned_minutes);
    let actual_total = interval::minutes_to_hours(actual_minutes);
    let variance = interval::minutes_difference(actual_minutes, planned_minutes);
    let variance_percent = if planned_total > 0.0 {
        variance / planned_total * 100.0
    } else {
        0.0
    };

    let suggestions = suggestions(constraints, &days, variance_percent);
    PlanningComparison {
        employee_id,
        start_date: start,
        end_date: end,
        days,
        planned_total,
        actual_total,
        variance,
        variance_percent,
        suggestions,
    }
}

fn suggestions(constraints: &LegalConstraints, days: &[DayComparison], variance_percent: f64) -> Vec<String> {
    let mut lines = Vec::new();
    if variance_percent.abs() > constraints.variance_alert_percent {
        if variance_percent > 0.0 {
            lines.push(format!(
                "Recorded time is {:.1}% above the planning; review workload or update the schedule",
                variance_percent
            ));
        } else {
            lines.push(format!(
                "Recorded time is {:.1}% below the planning; check for unrecorded hours or absences",
                variance_percent.abs()
            ));
        }
    }
    let count = |status: ComparisonStatus| days.iter().filter(|d| d.status == status).count();
    let over = count(ComparisonStatus::Over);
    let under = count(ComparisonStatus::Under);
    let missing = count(ComparisonStatus::Missing);
    if over > 0 {
        lines.push(format!("{} day(s) with more hours than planned", over));
    }
    if under > 0 {
        lines.push(format!("{} day(s) with fewer hours than planned", under));
    }
    if missing > 0 {
        lines.push(format!("{} planned day(s) with no recorded time", missing));
    }
    lines
}
