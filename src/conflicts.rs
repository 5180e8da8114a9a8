//! Schedule conflict detection.
//!
//! Scans recorded entries day by day for overlapping work, entries that
//! leave no break between them and days over the legal ceiling, then
//! week by week for the weekly ceiling and, over long ranges, the
//! average-hours ceiling.

use crate::constraints::LegalConstraints;
use crate::engine::{ensure_range, ComplianceEngine};
use crate::error::{EngineError, EngineResult};
use crate::interval::{self, WeekKey};
use crate::models::{Conflict, ConflictType, Severity, TimeEntry};
use crate::repository::TimeRepository;
use chrono::{Local, NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use serde_json::json;
use tracing::{debug, info};

/// Which employees and dates a conflict scan covers.
///
/// Missing dates default to the ISO week of the reference day (today
/// unless [`ConflictScope::as_of`] is set); a missing employee means all
/// active employees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictScope {
    pub employee_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub reference_date: Option<NaiveDate>,
}

impl ConflictScope {
    pub fn new() -> Self {
        ConflictScope::default()
    }

    pub fn employee(mut self, employee_id: i64) -> Self {
        self.employee_id = Some(employee_id);
        self
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn as_of(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = Some(reference_date);
        self
    }

    /// The concrete inclusive date range to scan.
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let anchor = self.reference_date.unwrap_or(today);
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, interval::week_bounds(start).1),
            (None, Some(end)) => (interval::week_bounds(end).0, end),
            (None, None) => interval::week_bounds(anchor),
        }
    }
}

impl<R: TimeRepository> ComplianceEngine<R> {
    /// Scans the scope for conflicts.  Repository failures abort the scan
    /// and are returned unchanged.
    pub async fn detect_schedule_conflicts(&self, scope: ConflictScope) -> EngineResult<Vec<Conflict>> {
        let (start, end) = scope.resolve(Local::now().date_naive());
        ensure_range(start, end)?;

        let employees = match scope.employee_id {
            Some(id) => vec![id],
            None => self
                .repository()
                .get_active_employee_ids()
                .await
                .map_err(EngineError::repository("active employee lookup"))?,
        };

        // Whole weeks are fetched so weekly totals are not truncated at the
        // range edges.
        let fetch_from = interval::week_bounds(start).0;
        let fetch_to = interval::week_bounds(end).1;

        let mut conflicts = Vec::new();
        for employee_id in employees {
            let entries = self
                .fetch_time_entries(employee_id, fetch_from, fetch_to)
                .await
                .map_err(EngineError::repository("schedule conflict scan"))?;
            let found = scan_entries(self.constraints(), employee_id, &entries, start, end);
            debug!(employee_id, conflicts = found.len(), "scanned schedule");
            conflicts.extend(found);
        }
        info!(%start, %end, conflicts = conflicts.len(), "schedule conflict scan complete");
        Ok(conflicts)
    }
}

/// Runs every schedule rule over one employee's `entries`.  Daily rules
/// (including overlaps carried over midnight from the day before) apply
/// to days inside `[start, end]`; weekly rules apply to every ISO week
/// that range touches.
pub fn scan_entries(
    constraints: &LegalConstraints,
    employee_id: i64,
    entries: &[TimeEntry],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<Conflict> {
    let days = interval::group_by_date(entries);
    let mut conflicts: Vec<Conflict> = days
        .par_iter()
        .filter(|(date, _)| **date >= start && **date <= end)
        .flat_map_iter(|(date, day)| scan_day(constraints, employee_id, *date, day))
        .collect();
    conflicts.extend(overnight_conflicts(employee_id, entries, start, end));

    let weeks = interval::group_by_week(entries);
    let first = WeekKey::of(start);
    let last = WeekKey::of(end);
    conflicts.extend(
        weeks
            .iter()
            .filter(|(week, _)| **week >= first && **week <= last)
            .filter_map(|(week, week_entries)| weekly_conflict(constraints, employee_id, *week, week_entries)),
    );
    conflicts.extend(average_hours_conflict(constraints, employee_id, entries, start, end));
    conflicts
}

/// Same-day rules: pairwise overlap, zero (or too small) gaps between
/// neighbouring entries, and the aggregate daily ceiling.
pub fn scan_day(
    constraints: &LegalConstraints,
    employee_id: i64,
    date: NaiveDate,
    entries: &[TimeEntry],
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    let mut spans: Vec<(&TimeEntry, (NaiveDateTime, NaiveDateTime))> = entries
        .iter()
        .filter(|e| e.is_work())
        .filter_map(|e| e.ends_at().map(|end| (e, (e.starts_at(), end))))
        .collect();
    spans.sort_by_key(|(e, span)| (span.0, e.id));

    for (i, (a, a_span)) in spans.iter().enumerate() {
        for (b, b_span) in &spans[i + 1..] {
            if interval::overlaps(*a_span, *b_span) {
                conflicts.push(overlap_conflict(employee_id, date, a, *a_span, b, *b_span));
            }
        }
    }

    for pair in spans.windows(2) {
        let (first, first_span) = pair[0];
        let (second, second_span) = pair[1];
        if interval::overlaps(first_span, second_span) {
            continue;
        }
        let gap = (second_span.0 - first_span.1).num_minutes();
        if gap == 0 || gap < i64::from(constraints.min_gap_between_entries_minutes) {
            conflicts.push(Conflict {
                conflict_type: ConflictType::InsufficientBreak,
                severity: Severity::Warning,
                employee_id,
                date,
                description: format!(
                    "entry {} starts {} minutes after entry {} ends, leaving no break",
                    second.id, gap, first.id
                ),
                suggestions: vec![
                    format!("Insert a break between entries {} and {}", first.id, second.id),
                    "Merge the entries and record the break duration".to_string(),
                ],
                data: json!({
                    "entry_ids": [first.id, second.id],
                    "gap_minutes": gap,
                    "minimum_gap_minutes": constraints.min_gap_between_entries_minutes,
                }),
            });
        }
    }

    let total = interval::total_span_hours(entries.iter());
    if !constraints.is_within_daily_limit(total) {
        conflicts.push(Conflict {
            conflict_type: ConflictType::MaxDailyHours,
            severity: Severity::Error,
            employee_id,
            date,
            description: format!(
                "{:.2}h recorded on {} exceeds the daily limit of {:.2}h",
                total, date, constraints.max_daily_hours
            ),
            suggestions: vec![
                format!(
                    "Remove {:.2}h from this day",
                    total - constraints.max_daily_hours
                ),
                "Move part of the work to another day".to_string(),
            ],
            data: json!({
                "total_hours": total,
                "limit": constraints.max_daily_hours,
                "entry_ids": entries.iter().filter(|e| e.is_work()).map(|e| e.id).collect::<Vec<_>>(),
            }),
        });
    }
    conflicts
}

fn overlap_conflict(
    employee_id: i64,
    date: NaiveDate,
    a: &TimeEntry,
    a_span: (NaiveDateTime, NaiveDateTime),
    b: &TimeEntry,
    b_span: (NaiveDateTime, NaiveDateTime),
) -> Conflict {
    let minutes = interval::overlap_minutes(a_span, b_span);
    Conflict {
        conflict_type: ConflictType::Overlap,
        severity: Severity::Error,
        employee_id,
        date,
        description: format!("entries {} and {} overlap by {} minutes", a.id, b.id, minutes),
        suggestions: vec![
            format!("Adjust the times of entry {} or {}", a.id, b.id),
            "Merge the two entries into one".to_string(),
            "Delete the duplicate entry".to_string(),
        ],
        data: json!({
            "entry_ids": [a.id, b.id],
            "overlap_minutes": minutes,
        }),
    }
}

/// Overlaps between a shift that runs past midnight and the next day's
/// entries, reported on the later entry's date.
fn overnight_conflicts(
    employee_id: i64,
    entries: &[TimeEntry],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<Conflict> {
    interval::overnight_overlaps(entries)
        .into_iter()
        .filter(|(_, later)| later.date >= start && later.date <= end)
        .filter_map(|(earlier, later)| {
            let earlier_span = (earlier.starts_at(), earlier.ends_at()?);
            let later_span = (later.starts_at(), later.ends_at()?);
            Some(overlap_conflict(employee_id, later.date, earlier, earlier_span, later, later_span))
        })
        .collect()
}

fn weekly_conflict(
    constraints: &LegalConstraints,
    employee_id: i64,
    week: WeekKey,
    entries: &[TimeEntry],
) -> Option<Conflict> {
    let total = interval::total_span_hours(entries.iter());
    if constraints.is_within_weekly_limit(total) {
        return None;
    }
    Some(Conflict {
        conflict_type: ConflictType::MaxWeeklyHours,
        severity: Severity::Error,
        employee_id,
        date: week.monday(),
        description: format!(
            "{:.2}h recorded in week {} exceeds the weekly limit of {:.2}h",
            total, week, constraints.max_weekly_hours
        ),
        suggestions: vec![
            format!(
                "Remove {:.2}h from this week",
                total - constraints.max_weekly_hours
            ),
            "Spread the work over the following week".to_string(),
        ],
        data: json!({
            "total_hours": total,
            "limit": constraints.max_weekly_hours,
            "week": week.to_string(),
        }),
    })
}

/// Mean weekly hours over the weeks `[start, end]` touches, checked only
/// when the range is at least as long as the averaging window.
fn average_hours_conflict(
    constraints: &LegalConstraints,
    employee_id: i64,
    entries: &[TimeEntry],
    start: NaiveDate,
    end: NaiveDate,
) -> Option<Conflict> {
    let weeks = interval::weeks_spanned(start, end);
    if weeks == 0 || weeks < constraints.average_window_weeks as usize {
        return None;
    }
    let (from, _) = interval::week_bounds(start);
    let (_, to) = interval::week_bounds(end);
    let total = interval::total_span_hours(entries.iter().filter(|e| e.date >= from && e.date <= to));
    let average = total / weeks as f64;
    if average <= constraints.max_average_weekly_hours {
        return None;
    }
    Some(Conflict {
        conflict_type: ConflictType::AverageHours,
        severity: Severity::Warning,
        employee_id,
        date: from,
        description: format!(
            "average of {:.2}h per week over {} weeks exceeds {:.2}h",
            average, weeks, constraints.max_average_weekly_hours
        ),
        suggestions: vec![
            "Plan lighter weeks to bring the average down".to_string(),
            "Review recurring overtime with the employee".to_string(),
        ],
        data: json!({
            "average_hours": average,
            "weeks": weeks,
            "limit": constraints.max_average_weekly_hours,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryStatus, EntryType};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn work(id: i64, date: &str, start: &str, end: &str) -> TimeEntry {
        TimeEntry {
            id,
            employee_id: 1,
            date: d(date),
            start_time: start.parse().unwrap(),
            end_time: Some(end.parse().unwrap()),
            break_duration_minutes: 0,
            entry_type: EntryType::Work,
            status: EntryStatus::Submitted,
            is_overtime: false,
            overtime_hours: 0.0,
            overtime_reason: None,
        }
    }

    fn types(conflicts: &[Conflict]) -> Vec<ConflictType> {
        conflicts.iter().map(|c| c.conflict_type).collect()
    }

    #[test]
    fn test_overlapping_entries() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "09:00", "17:00"),
            work(2, "2024-08-05", "16:00", "20:00"),
        ];
        let conflicts = scan_day(&c, 1, d("2024-08-05"), &entries);
        let overlaps: Vec<_> = conflicts
            .iter()
            .filter(|c| c.conflict_type == ConflictType::Overlap)
            .collect();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].data["entry_ids"], json!([1, 2]));
        assert_eq!(overlaps[0].data["overlap_minutes"], 60);
    }

    #[test]
    fn test_touching_entries_flag_insufficient_break() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "09:00", "13:00"),
            work(2, "2024-08-05", "13:00", "18:00"),
        ];
        let conflicts = scan_day(&c, 1, d("2024-08-05"), &entries);
        assert_eq!(types(&conflicts), vec![ConflictType::InsufficientBreak]);
        assert_eq!(conflicts[0].severity, Severity::Warning);
    }

    #[test]
    fn test_separated_entries_are_clean() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "09:00", "12:00"),
            work(2, "2024-08-05", "14:00", "18:00"),
        ];
        assert!(scan_day(&c, 1, d("2024-08-05"), &entries).is_empty());
    }

    #[test]
    fn test_configurable_minimum_gap() {
        let c = LegalConstraints {
            min_gap_between_entries_minutes: 30,
            ..LegalConstraints::default()
        };
        let entries = vec![
            work(1, "2024-08-05", "09:00", "12:00"),
            work(2, "2024-08-05", "12:15", "16:00"),
        ];
        assert_eq!(
            types(&scan_day(&c, 1, d("2024-08-05"), &entries)),
            vec![ConflictType::InsufficientBreak]
        );
    }

    #[test]
    fn test_minimum_gap_only_between_neighbours() {
        let c = LegalConstraints {
            min_gap_between_entries_minutes: 30,
            ..LegalConstraints::default()
        };
        let entries = vec![
            work(3, "2024-08-05", "12:25", "18:00"),
            work(1, "2024-08-05", "09:00", "12:00"),
            work(2, "2024-08-05", "12:10", "12:20"),
        ];
        let conflicts = scan_day(&c, 1, d("2024-08-05"), &entries);
        assert_eq!(
            conflicts.iter().map(|c| c.data["entry_ids"].clone()).collect::<Vec<_>>(),
            vec![json!([1, 2]), json!([2, 3])]
        );
        assert_eq!(conflicts[1].data["gap_minutes"], 5);
    }

    #[test]
    fn test_overlap_across_midnight_on_same_date() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "22:00", "06:00"),
            work(2, "2024-08-05", "23:00", "01:00"),
        ];
        let conflicts = scan_day(&c, 1, d("2024-08-05"), &entries);
        assert_eq!(types(&conflicts), vec![ConflictType::Overlap]);
        assert_eq!(conflicts[0].data["overlap_minutes"], 120);
    }

    #[test]
    fn test_overnight_shift_overlaps_next_morning() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "22:00", "06:00"),
            work(2, "2024-08-06", "05:30", "09:00"),
        ];
        let conflicts = scan_entries(&c, 1, &entries, d("2024-08-05"), d("2024-08-11"));
        assert_eq!(types(&conflicts), vec![ConflictType::Overlap]);
        assert_eq!(conflicts[0].date, d("2024-08-06"));
        assert_eq!(conflicts[0].data["entry_ids"], json!([1, 2]));
        assert_eq!(conflicts[0].data["overlap_minutes"], 30);

        let touching = vec![
            work(1, "2024-08-05", "22:00", "06:00"),
            work(2, "2024-08-06", "06:00", "09:00"),
        ];
        assert!(scan_entries(&c, 1, &touching, d("2024-08-05"), d("2024-08-11")).is_empty());
    }

    #[test]
    fn test_daily_excess_without_overlap() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "07:00", "13:00"),
            work(2, "2024-08-05", "14:00", "20:00"),
        ];
        let conflicts = scan_day(&c, 1, d("2024-08-05"), &entries);
        assert_eq!(types(&conflicts), vec![ConflictType::MaxDailyHours]);
        assert_eq!(conflicts[0].data["total_hours"], 12.0);
    }

    #[test]
    fn test_daily_limit_is_exact_in_minutes() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "06:00", "10:25"),
            work(2, "2024-08-05", "11:00", "15:11"),
            work(3, "2024-08-05", "16:00", "17:24"),
        ];
        assert!(scan_day(&c, 1, d("2024-08-05"), &entries).is_empty());
    }

    #[test]
    fn test_scan_entries_weekly_and_range() {
        let c = LegalConstraints::default();
        let entries: Vec<TimeEntry> = (5..=9)
            .map(|day| work(day, &format!("2024-08-{:02}", day), "08:00", "18:00"))
            .collect();
        // Range covers only Friday, but the weekly total uses the whole week.
        let conflicts = scan_entries(&c, 1, &entries, d("2024-08-09"), d("2024-08-09"));
        assert_eq!(types(&conflicts), vec![ConflictType::MaxWeeklyHours]);
        assert_eq!(conflicts[0].date, d("2024-08-05"));
        assert_eq!(conflicts[0].data["total_hours"], 50.0);
    }

    #[test]
    fn test_average_hours_over_window() {
        let c = LegalConstraints {
            average_window_weeks: 2,
            ..LegalConstraints::default()
        };
        // Two weeks of 4 x 11.5h = 46h each: under the weekly cap, over the
        // 44h average.
        let mut entries = Vec::new();
        for (i, day) in [5, 6, 7, 8, 12, 13, 14, 15].iter().enumerate() {
            entries.push(work(i as i64 * 2, &format!("2024-08-{:02}", day), "06:00", "11:30"));
            entries.push(work(i as i64 * 2 + 1, &format!("2024-08-{:02}", day), "12:00", "18:00"));
        }
        let conflicts = scan_entries(&c, 1, &entries, d("2024-08-05"), d("2024-08-18"));
        assert!(types(&conflicts).contains(&ConflictType::AverageHours));
        assert!(!types(&conflicts).contains(&ConflictType::MaxWeeklyHours));

        let one_week = scan_entries(&c, 1, &entries, d("2024-08-05"), d("2024-08-11"));
        assert!(!types(&one_week).contains(&ConflictType::AverageHours));
    }

    #[test]
    fn test_scope_resolution() {
        let today = d("2024-08-07");
        assert_eq!(ConflictScope::new().resolve(today), (d("2024-08-05"), d("2024-08-11")));
        assert_eq!(
            ConflictScope::new().as_of(d("2024-08-14")).resolve(today),
            (d("2024-08-12"), d("2024-08-18"))
        );
        let scope = ConflictScope {
            start_date: Some(d("2024-08-06")),
            ..ConflictScope::default()
        };
        assert_eq!(scope.resolve(today), (d("2024-08-06"), d("2024-08-11")));
    }
}
