//! Overtime computation.
//!
//! Daily overtime is paid on hours above the daily threshold; weekly
//! overtime on hours above the contractual weekly target.  The two are
//! reported as separate rows and never merged.

use crate::constraints::LegalConstraints;
use crate::engine::{ensure_range, ComplianceEngine};
use crate::error::{EngineError, EngineResult};
use crate::interval;
use crate::models::{OvertimeCalculation, OvertimeType, TimeEntry};
use crate::repository::TimeRepository;
use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::debug;

/// Overtime implied by a day's hours: the excess over the legal daily
/// ceiling.  `weekly_hours` is accepted for call-site symmetry but does
/// not contribute; weekly excess is reported only by
/// [`ComplianceEngine::calculate_overtime`].
pub fn calculate_overtime_hours(constraints: &LegalConstraints, daily_hours: f64, _weekly_hours: f64) -> f64 {
    (daily_hours - constraints.max_daily_hours).max(0.0)
}

impl<R: TimeRepository> ComplianceEngine<R> {
    /// Daily and weekly overtime rows for `employee_id` over
    /// `[start, end]`.
    pub async fn calculate_overtime(
        &self,
        employee_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<OvertimeCalculation>> {
        ensure_range(start, end)?;
        let entries = self
            .fetch_time_entries(employee_id, start, end)
            .await
            .map_err(EngineError::repository("overtime calculation"))?;
        let rows = overtime_for_entries(self.constraints(), employee_id, &entries);
        debug!(employee_id, rows = rows.len(), "calculated overtime");
        Ok(rows)
    }
}

/// Daily rows (in date order) followed by weekly rows (in week order).
/// Only periods with overtime produce a row.
pub fn overtime_for_entries(
    constraints: &LegalConstraints,
    employee_id: i64,
    entries: &[TimeEntry],
) -> Vec<OvertimeCalculation> {
    let mut rows = daily_overtime(constraints, employee_id, entries);
    rows.extend(weekly_overtime(constraints, employee_id, entries));
    rows
}

/// Hours above `daily_overtime_threshold` per calendar day at
/// `daily_overtime_rate`.  The row is approved when an entry of that day
/// carries the overtime authorisation flag.
pub fn daily_overtime(
    constraints: &LegalConstraints,
    employee_id: i64,
    entries: &[TimeEntry],
) -> Vec<OvertimeCalculation> {
    let days = interval::group_by_date(entries);
    days.par_iter()
        .filter_map(|(date, day)| {
            let total = interval::total_worked_hours(day.iter());
            let overtime = (total - constraints.daily_overtime_threshold).max(0.0);
            if overtime <= 0.0 {
                return None;
            }
            Some(OvertimeCalculation {
                employee_id,
                period: date.to_string(),
                regular_hours: total - overtime,
                overtime_hours: overtime,
                overtime_type: OvertimeType::Daily,
                rate: constraints.daily_overtime_rate,
                approved: day.iter().any(|e| e.is_work() && e.is_overtime),
            })
        })
        .collect()
}

/// Hours above `target_weekly_hours` per ISO week at
/// `weekly_overtime_rate`.  Weekly rows always need separate sign-off.
pub fn weekly_overtime(
    constraints: &LegalConstraints,
    employee_id: i64,
    entries: &[TimeEntry],
) -> Vec<OvertimeCalculation> {
    interval::group_by_week(entries)
        .into_iter()
        .filter_map(|(week, week_entries)| {
            let total = interval::total_worked_hours(week_entries.iter());
            let overtime = (total - constraints.target_weekly_hours).max(0.0);
            if overtime <= 0.0 {
                return None;
            }
            Some(OvertimeCalculation {
                employee_id,
                period: week.to_string(),
                regular_hours: total - overtime,
                overtime_hours: overtime,
                overtime_type: OvertimeType::Weekly,
                rate: constraints.weekly_overtime_rate,
                approved: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryStatus, EntryType};

    fn work(id: i64, date: &str, start: &str, end: &str, break_minutes: u32) -> TimeEntry {
        TimeEntry {
            id,
            employee_id: 3,
            date: date.parse().unwrap(),
            start_time: start.parse().unwrap(),
            end_time: Some(end.parse().unwrap()),
            break_duration_minutes: break_minutes,
            entry_type: EntryType::Work,
            status: EntryStatus::Validated,
            is_overtime: false,
            overtime_hours: 0.0,
            overtime_reason: None,
        }
    }

    #[test]
    fn test_calculate_overtime_hours_is_daily_only() {
        let c = LegalConstraints::default();
        assert_eq!(calculate_overtime_hours(&c, 7.0, 35.0), 0.0);
        assert_eq!(calculate_overtime_hours(&c, 12.0, 35.0), 2.0);
        assert_eq!(calculate_overtime_hours(&c, 12.0, 50.0), 2.0);
        assert_eq!(calculate_overtime_hours(&c, 8.0, 48.0), 0.0);
    }

    #[test]
    fn test_daily_overtime_rows() {
        let c = LegalConstraints::default();
        let mut late = work(2, "2024-08-06", "08:00", "19:00", 60);
        late.is_overtime = true;
        let entries = vec![work(1, "2024-08-05", "09:00", "17:00", 0), late];

        let rows = daily_overtime(&c, 3, &entries);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].period, "2024-08-06");
        assert_eq!(rows[0].regular_hours, 8.0);
        assert_eq!(rows[0].overtime_hours, 2.0);
        assert_eq!(rows[0].rate, 1.25);
        assert!(rows[0].approved);
    }

    #[test]
    fn test_weekly_overtime_is_never_approved() {
        let c = LegalConstraints::default();
        let mut entries: Vec<TimeEntry> = (5..=9)
            .map(|day| work(day, &format!("2024-08-{:02}", day), "09:00", "17:00", 0))
            .collect();
        entries.iter_mut().for_each(|e| e.is_overtime = true);

        let rows = overtime_for_entries(&c, 3, &entries);
        assert_eq!(rows.len(), 1);
        let weekly = &rows[0];
        assert_eq!(weekly.overtime_type, OvertimeType::Weekly);
        assert_eq!(weekly.period, "2024-W32");
        assert_eq!(weekly.regular_hours, 35.0);
        assert_eq!(weekly.overtime_hours, 5.0);
        assert_eq!(weekly.rate, 1.10);
        assert!(!weekly.approved);
    }

    #[test]
    fn test_overtime_is_idempotent() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "06:00", "18:00", 30),
            work(2, "2024-08-06", "22:00", "09:00", 0),
        ];
        assert_eq!(
            overtime_for_entries(&c, 3, &entries),
            overtime_for_entries(&c, 3, &entries)
        );
    }
}
