//! Anomaly scanning over recorded entries.
//!
//! Unlike conflict detection, which runs before an entry is accepted,
//! the anomaly scan looks back over what has already been recorded and
//! reports days with excessive hours, shifts without the mandatory
//! break, overlapping entries, undeclared overtime and days that drift
//! far from the planning.

use crate::constraints::LegalConstraints;
use crate::engine::{ensure_range, ComplianceEngine};
use crate::error::{EngineError, EngineResult};
use crate::interval;
use crate::models::{Anomaly, AnomalyType, PlanningEntry, Severity, TimeEntry};
use crate::repository::TimeRepository;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

impl<R: TimeRepository> ComplianceEngine<R> {
    pub async fn detect_anomalies(
        &self,
        employee_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<Anomaly>> {
        ensure_range(start, end)?;
        let entries = self
            .fetch_time_entries(employee_id, start, end)
            .await
            .map_err(EngineError::repository("anomaly scan"))?;
        let planning = self
            .fetch_planning_entries(employee_id, start, end)
            .await
            .map_err(EngineError::repository("anomaly scan"))?;
        let anomalies = scan_anomalies(self.constraints(), employee_id, &entries, &planning);
        info!(employee_id, %start, %end, anomalies = anomalies.len(), "anomaly scan complete");
        Ok(anomalies)
    }
}

/// Every anomaly in `entries`, grouped by day in date order.  An overnight
/// shift that overlaps the next day's work is reported on the later day.
/// Planning mismatches are only reported when `planning` is non-empty.
pub fn scan_anomalies(
    constraints: &LegalConstraints,
    employee_id: i64,
    entries: &[TimeEntry],
    planning: &[PlanningEntry],
) -> Vec<Anomaly> {
    let days = interval::group_by_date(entries);
    let mut by_day: BTreeMap<NaiveDate, Vec<Anomaly>> = days
        .par_iter()
        .map(|(date, day)| (*date, scan_day(constraints, employee_id, *date, day)))
        .collect();

    for (earlier, later) in interval::overnight_overlaps(entries) {
        by_day
            .entry(later.date)
            .or_default()
            .push(overlap_anomaly(employee_id, later.date, earlier, later));
    }
    for anomaly in planning_mismatches(constraints, employee_id, entries, planning) {
        by_day.entry(anomaly.date).or_default().push(anomaly);
    }
    by_day.into_values().flatten().collect()
}

fn scan_day(
    constraints: &LegalConstraints,
    employee_id: i64,
    date: NaiveDate,
    entries: &[TimeEntry],
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let work: Vec<&TimeEntry> = entries.iter().filter(|e| e.is_work()).collect();

    let total = interval::total_worked_hours(work.iter().copied());
    if total > constraints.max_daily_hours {
        anomalies.push(Anomaly {
            anomaly_type: AnomalyType::ExcessiveHours,
            severity: Severity::Error,
            employee_id,
            date,
            description: format!(
                "{:.2}h worked on {} (limit {:.2}h)",
                total, date, constraints.max_daily_hours
            ),
            suggestion: "Check the entries of this day and move the excess to another day".to_string(),
            data: json!({ "total_hours": total, "limit": constraints.max_daily_hours }),
        });
    }

    for entry in &work {
        let worked = entry.worked_hours();
        if !constraints.has_required_break(worked, entry.break_duration_minutes) {
            anomalies.push(Anomaly {
                anomaly_type: AnomalyType::MissingBreak,
                severity: Severity::Warning,
                employee_id,
                date,
                description: format!(
                    "entry {} has {:.2}h of work with only {} minutes of break",
                    entry.id, worked, entry.break_duration_minutes
                ),
                suggestion: format!(
                    "Record a break of at least {} minutes",
                    constraints.min_break_minutes
                ),
                data: json!({
                    "entry_id": entry.id,
                    "work_hours": worked,
                    "break_minutes": entry.break_duration_minutes,
                }),
            });
        }
    }

    for (i, a) in work.iter().enumerate() {
        for b in &work[i + 1..] {
            let (Some(a_end), Some(b_end)) = (a.ends_at(), b.ends_at()) else {
                continue;
            };
            let a_span = (a.starts_at(), a_end);
            let b_span = (b.starts_at(), b_end);
            if interval::overlaps(a_span, b_span) {
                anomalies.push(overlap_anomaly(employee_id, date, a, b));
            }
        }
    }

    for entry in &work {
        let justified = entry
            .overtime_reason
            .as_deref()
            .is_some_and(|reason| !reason.trim().is_empty());
        if entry.overtime_hours > 0.0 && (!entry.is_overtime || !justified) {
            anomalies.push(Anomaly {
                anomaly_type: AnomalyType::UnauthorizedOvertime,
                severity: Severity::Warning,
                employee_id,
                date,
                description: format!(
                    "entry {} records {:.2}h of overtime without authorisation",
                    entry.id, entry.overtime_hours
                ),
                suggestion: "Declare the overtime and give a reason, or correct the entry".to_string(),
                data: json!({
                    "entry_id": entry.id,
                    "overtime_hours": entry.overtime_hours,
                    "is_overtime": entry.is_overtime,
                    "has_reason": justified,
                }),
            });
        }
    }
    anomalies
}

fn overlap_anomaly(employee_id: i64, date: NaiveDate, a: &TimeEntry, b: &TimeEntry) -> Anomaly {
    let minutes = match (a.ends_at(), b.ends_at()) {
        (Some(a_end), Some(b_end)) => interval::overlap_minutes((a.starts_at(), a_end), (b.starts_at(), b_end)),
        _ => 0,
    };
    Anomaly {
        anomaly_type: AnomalyType::Overlap,
        severity: Severity::Error,
        employee_id,
        date,
        description: format!("entries {} and {} overlap", a.id, b.id),
        suggestion: "Correct the times so the entries no longer overlap".to_string(),
        data: json!({
            "entry_ids": [a.id, b.id],
            "overlap_minutes": minutes,
        }),
    }
}

fn planning_mismatches(
    constraints: &LegalConstraints,
    employee_id: i64,
    entries: &[TimeEntry],
    planning: &[PlanningEntry],
) -> Vec<Anomaly> {
    if planning.is_empty() {
        return Vec::new();
    }
    let mut planned: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for slot in planning {
        *planned.entry(slot.date).or_default() += slot.planned_minutes();
    }
    let mut actual: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.is_work()) {
        *actual.entry(entry.date).or_default() += entry.worked_minutes();
    }
    let dates: BTreeSet<NaiveDate> = planned.keys().chain(actual.keys()).copied().collect();

    dates
        .into_iter()
        .filter_map(|date| {
            let planned_minutes = planned.get(&date).copied().unwrap_or(0);
            let actual_minutes = actual.get(&date).copied().unwrap_or(0);
            let planned_hours = interval::minutes_to_hours(planned_minutes);
            let actual_hours = interval::minutes_to_hours(actual_minutes);
            let difference = interval::minutes_difference(actual_minutes, planned_minutes);
            if difference.abs() <= constraints.planning_mismatch_hours {
                return None;
            }
            Some(Anomaly {
                anomaly_type: AnomalyType::PlanningMismatch,
                severity: Severity::Warning,
                employee_id,
                date,
                description: format!(
                    "{:.2}h recorded against {:.2}h planned on {}",
                    actual_hours, planned_hours, date
                ),
                suggestion: if difference > 0.0 {
                    "Confirm the extra hours with the manager or update the planning".to_string()
                } else {
                    "Record the missing time or adjust the planning".to_string()
                },
                data: json!({
                    "planned_hours": planned_hours,
                    "actual_hours": actual_hours,
                    "difference": difference,
                }),
            })
        })
        .collect()
}
