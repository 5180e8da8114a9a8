//! Legal constraint validation.
//!
//! A candidate shift is checked against three independent rules: the
//! daily ceiling, the weekly ceiling and the minimum rest since the
//! previous day's work.  Each rule reads its own slice of history from
//! the repository, so a failed read only marks that rule as unchecked;
//! the other two still run and report.
//!
//! [`validate_entry`] is the storage-free consistency check used on raw
//! form input.  It reports malformed times and single-entry rule
//! breaches as structured issues instead of failing.

use crate::constraints::LegalConstraints;
use crate::engine::ComplianceEngine;
use crate::error::{EngineError, EngineResult, RepositoryError};
use crate::interval::{self, WeekKey};
use crate::models::{Conflict, ConflictType, Severity, TimeEntry, TimeOfDay};
use crate::repository::TimeRepository;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// The independent legal sub-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalCheck {
    DailyHours,
    WeeklyHours,
    RestPeriod,
}

impl LegalCheck {
    fn operation(self) -> &'static str {
        match self {
            LegalCheck::DailyHours => "daily hours check",
            LegalCheck::WeeklyHours => "weekly hours check",
            LegalCheck::RestPeriod => "rest period check",
        }
    }
}

/// A sub-check that could not be evaluated because its repository read
/// failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckFailure {
    pub check: LegalCheck,
    #[serde(serialize_with = "serialize_error")]
    pub error: RepositoryError,
}

fn serialize_error<S: serde::Serializer>(error: &RepositoryError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

/// Result of [`ComplianceEngine::check_legal_constraints`].
///
/// `valid` is true only when every sub-check ran and none produced a
/// conflict.  It reflects the repository state at the time of the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegalCheckOutcome {
    pub valid: bool,
    pub conflicts: Vec<Conflict>,
    pub failures: Vec<CheckFailure>,
}

impl LegalCheckOutcome {
    fn from_checks(checks: Vec<(LegalCheck, Result<Option<Conflict>, RepositoryError>)>) -> Self {
        let mut conflicts = Vec::new();
        let mut failures = Vec::new();
        for (check, result) in checks {
            match result {
                Ok(Some(conflict)) => conflicts.push(conflict),
                Ok(None) => {}
                Err(error) => {
                    warn!(?check, %error, "legal sub-check could not be evaluated");
                    failures.push(CheckFailure { check, error });
                }
            }
        }
        LegalCheckOutcome {
            valid: conflicts.is_empty() && failures.is_empty(),
            conflicts,
            failures,
        }
    }

    /// Converts the outcome into the conflicts found, or the first
    /// repository failure if any sub-check could not run.
    pub fn into_result(self) -> EngineResult<Vec<Conflict>> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(EngineError::Repository {
                operation: failure.check.operation(),
                source: failure.error,
            }),
            None => Ok(self.conflicts),
        }
    }
}

impl<R: TimeRepository> ComplianceEngine<R> {
    /// Validates a candidate shift `start..end` on `date` for
    /// `employee_id`.  `exclude_entry_id` names the entry being edited so
    /// it is not counted twice.
    pub async fn check_legal_constraints(
        &self,
        employee_id: i64,
        date: NaiveDate,
        start: TimeOfDay,
        end: TimeOfDay,
        exclude_entry_id: Option<i64>,
    ) -> LegalCheckOutcome {
        let constraints = self.constraints();
        let candidate_minutes = start.minutes_until(end);

        let daily = self
            .fetch_time_entries(employee_id, date, date)
            .await
            .map(|entries| {
                daily_hours_conflict(constraints, employee_id, date, &entries, candidate_minutes, exclude_entry_id)
            });

        let (week_start, week_end) = interval::week_bounds(date);
        let weekly = self
            .fetch_time_entries(employee_id, week_start, week_end)
            .await
            .map(|entries| {
                weekly_hours_conflict(constraints, employee_id, date, &entries, candidate_minutes, exclude_entry_id)
            });

        let previous_day = date - Duration::days(1);
        let rest = self
            .fetch_time_entries(employee_id, previous_day, previous_day)
            .await
            .map(|entries| {
                rest_period_conflict(constraints, employee_id, date, start, &entries, exclude_entry_id)
            });

        let outcome = LegalCheckOutcome::from_checks(vec![
            (LegalCheck::DailyHours, daily),
            (LegalCheck::WeeklyHours, weekly),
            (LegalCheck::RestPeriod, rest),
        ]);
        debug!(
            employee_id,
            %date,
            valid = outcome.valid,
            conflicts = outcome.conflicts.len(),
            "checked legal constraints"
        );
        outcome
    }
}

fn counted<'a>(
    entries: &'a [TimeEntry],
    exclude_entry_id: Option<i64>,
) -> impl Iterator<Item = &'a TimeEntry> {
    entries
        .iter()
        .filter(move |e| e.is_work() && Some(e.id) != exclude_entry_id)
}

/// Daily ceiling: existing work spans on `date` plus the candidate span
/// of `candidate_minutes`.
pub fn daily_hours_conflict(
    constraints: &LegalConstraints,
    employee_id: i64,
    date: NaiveDate,
    entries: &[TimeEntry],
    candidate_minutes: u32,
    exclude_entry_id: Option<i64>,
) -> Option<Conflict> {
    let existing_minutes = interval::total_span_minutes(counted(entries, exclude_entry_id).filter(|e| e.date == date));
    let existing = interval::minutes_to_hours(existing_minutes);
    let candidate_hours = interval::minutes_to_hours(candidate_minutes);
    let total = interval::minutes_to_hours(existing_minutes + candidate_minutes);
    if constraints.is_within_daily_limit(total) {
        return None;
    }
    let allowed = (constraints.max_daily_hours - existing).max(0.0);
    Some(Conflict {
        conflict_type: ConflictType::MaxDailyHours,
        severity: Severity::Error,
        employee_id,
        date,
        description: format!(
            "{:.2}h on {} exceeds the daily limit of {:.2}h",
            total, date, constraints.max_daily_hours
        ),
        suggestions: vec![
            format!("Reduce this entry to at most {:.2}h", allowed),
            "Split the work across several days".to_string(),
            format!("Remove or shorten other entries on {}", date),
        ],
        data: json!({
            "total_hours": total,
            "existing_hours": existing,
            "candidate_hours": candidate_hours,
            "limit": constraints.max_daily_hours,
        }),
    })
}

/// Weekly ceiling over the ISO week containing `date`.  The conflict is
/// dated on the week's Monday.
pub fn weekly_hours_conflict(
    constraints: &LegalConstraints,
    employee_id: i64,
    date: NaiveDate,
    entries: &[TimeEntry],
    candidate_minutes: u32,
    exclude_entry_id: Option<i64>,
) -> Option<Conflict> {
    let week = WeekKey::of(date);
    let existing = interval::total_span_minutes(counted(entries, exclude_entry_id).filter(|e| week.contains(e.date)));
    let total = interval::minutes_to_hours(existing + candidate_minutes);
    if constraints.is_within_weekly_limit(total) {
        return None;
    }
    let week_start = week.monday();
    Some(Conflict {
        conflict_type: ConflictType::MaxWeeklyHours,
        severity: Severity::Error,
        employee_id,
        date: week_start,
        description: format!(
            "{:.2}h in week {} exceeds the weekly limit of {:.2}h",
            total, week, constraints.max_weekly_hours
        ),
        suggestions: vec![
            format!(
                "Reduce hours this week by {:.2}h",
                total - constraints.max_weekly_hours
            ),
            "Move part of the work to another week".to_string(),
            format!("Review the planning for the week starting {}", week_start),
        ],
        data: json!({
            "total_hours": total,
            "limit": constraints.max_weekly_hours,
            "week_start": week_start,
            "week_end": week.sunday(),
        }),
    })
}

/// Minimum rest between the latest end among the previous day's work
/// entries and the candidate start.  Entries that ran past midnight
/// count with their real end instant.
pub fn rest_period_conflict(
    constraints: &LegalConstraints,
    employee_id: i64,
    date: NaiveDate,
    start: TimeOfDay,
    previous_day_entries: &[TimeEntry],
    exclude_entry_id: Option<i64>,
) -> Option<Conflict> {
    let previous_day = date - Duration::days(1);
    let last_end = counted(previous_day_entries, exclude_entry_id)
        .filter(|e| e.date == previous_day)
        .filter_map(TimeEntry::ends_at)
        .max()?;
    let next_start = start.on(date);
    let rest = interval::rest_hours(last_end, next_start);
    if constraints.has_minimum_rest(rest) {
        return None;
    }
    let earliest = last_end + Duration::minutes((constraints.min_rest_hours * 60.0).round() as i64);
    Some(Conflict {
        conflict_type: ConflictType::MinRestPeriod,
        severity: Severity::Error,
        employee_id,
        date,
        description: format!(
            "only {:.2}h of rest since {} (minimum {:.2}h)",
            rest, last_end, constraints.min_rest_hours
        ),
        suggestions: vec![
            format!("Start no earlier than {}", earliest.format("%Y-%m-%d %H:%M")),
            "Shorten the previous day's last shift".to_string(),
        ],
        data: json!({
            "rest_hours": rest,
            "minimum": constraints.min_rest_hours,
            "previous_end": last_end,
            "next_start": next_start,
        }),
    })
}

/// Codes reported by [`validate_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InvalidTimeFormat,
    EndBeforeStart,
    DailyHoursExceeded,
    InsufficientBreak,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    /// Worked hours of the entry when both times parsed.
    pub worked_hours: Option<f64>,
}

impl ValidationReport {
    pub fn has(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// Consistency check on raw entry input.
///
/// `end <= start` is rejected with `END_BEFORE_START` unless `overnight`
/// is set, in which case the end is read as the next day.
pub fn validate_entry(
    constraints: &LegalConstraints,
    start: &str,
    end: &str,
    break_minutes: u32,
    overnight: bool,
) -> ValidationReport {
    let mut errors = Vec::new();
    let parsed_start = parse_field("start", start, &mut errors);
    let parsed_end = parse_field("end", end, &mut errors);

    let (Some(start), Some(end)) = (parsed_start, parsed_end) else {
        return ValidationReport {
            valid: false,
            errors,
            worked_hours: None,
        };
    };

    if end <= start && !overnight {
        errors.push(ValidationIssue {
            code: ValidationCode::EndBeforeStart,
            message: format!("end {} is not after start {}", end, start),
        });
    }

    let span = interval::hours_between(start, end);
    let worked = interval::worked_hours(start, end, break_minutes);
    if !constraints.is_within_daily_limit(worked) {
        errors.push(ValidationIssue {
            code: ValidationCode::DailyHoursExceeded,
            message: format!(
                "{:.2}h worked exceeds the daily limit of {:.2}h",
                worked, constraints.max_daily_hours
            ),
        });
    }
    if !constraints.has_required_break(span, break_minutes) {
        errors.push(ValidationIssue {
            code: ValidationCode::InsufficientBreak,
            message: format!(
                "a shift over {:.0}h needs at least {} minutes of break, got {}",
                constraints.break_required_after_hours, constraints.min_break_minutes, break_minutes
            ),
        });
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        worked_hours: Some(worked),
    }
}

fn parse_field(name: &str, raw: &str, errors: &mut Vec<ValidationIssue>) -> Option<TimeOfDay> {
    match raw.parse::<TimeOfDay>() {
        Ok(time) => Some(time),
        Err(err) => {
            errors.push(ValidationIssue {
                code: ValidationCode::InvalidTimeFormat,
                message: format!("{} time: {}", name, err),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryStatus, EntryType};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn work(id: i64, date: &str, start: &str, end: &str) -> TimeEntry {
        TimeEntry {
            id,
            employee_id: 1,
            date: d(date),
            start_time: t(start),
            end_time: Some(t(end)),
            break_duration_minutes: 0,
            entry_type: EntryType::Work,
            status: EntryStatus::Submitted,
            is_overtime: false,
            overtime_hours: 0.0,
            overtime_reason: None,
        }
    }

    #[test]
    fn test_daily_conflict_adds_candidate() {
        let c = LegalConstraints::default();
        let entries = vec![work(1, "2024-08-05", "08:00", "14:00")];
        assert!(daily_hours_conflict(&c, 1, d("2024-08-05"), &entries, 240, None).is_none());

        let conflict = daily_hours_conflict(&c, 1, d("2024-08-05"), &entries, 300, None).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::MaxDailyHours);
        assert_eq!(conflict.data["total_hours"], 11.0);
        assert_eq!(conflict.suggestions.len(), 3);
    }

    #[test]
    fn test_daily_conflict_excludes_edited_entry_and_breaks() {
        let c = LegalConstraints::default();
        let mut pause = work(2, "2024-08-05", "12:00", "13:00");
        pause.entry_type = EntryType::Break;
        let entries = vec![work(1, "2024-08-05", "08:00", "16:00"), pause];
        assert!(daily_hours_conflict(&c, 1, d("2024-08-05"), &entries, 540, Some(1)).is_none());
        assert!(daily_hours_conflict(&c, 1, d("2024-08-05"), &entries, 540, None).is_some());
    }

    #[test]
    fn test_daily_limit_is_inclusive_for_odd_minutes() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-05", "06:00", "10:25"),
            work(2, "2024-08-05", "11:00", "15:11"),
        ];
        // 4h25 + 4h11 + 1h24 is exactly 10h.
        assert!(daily_hours_conflict(&c, 1, d("2024-08-05"), &entries, 84, None).is_none());
        let conflict = daily_hours_conflict(&c, 1, d("2024-08-05"), &entries, 85, None).unwrap();
        assert_eq!(conflict.data["existing_hours"], 8.6);
    }

    #[test]
    fn test_weekly_conflict_is_keyed_to_monday() {
        let c = LegalConstraints::default();
        let entries: Vec<TimeEntry> = ["2024-08-05", "2024-08-06", "2024-08-07", "2024-08-08"]
            .iter()
            .enumerate()
            .map(|(i, date)| work(i as i64, date, "08:00", "18:00"))
            .collect();
        assert!(weekly_hours_conflict(&c, 1, d("2024-08-09"), &entries, 480, None).is_none());

        let conflict = weekly_hours_conflict(&c, 1, d("2024-08-09"), &entries, 540, None).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::MaxWeeklyHours);
        assert_eq!(conflict.date, d("2024-08-05"));
        assert_eq!(conflict.data["total_hours"], 49.0);
    }

    #[test]
    fn test_rest_period_uses_latest_previous_end() {
        let c = LegalConstraints::default();
        let entries = vec![
            work(1, "2024-08-03", "08:00", "12:00"),
            work(2, "2024-08-03", "14:00", "22:00"),
        ];
        let conflict = rest_period_conflict(&c, 1, d("2024-08-04"), t("07:00"), &entries, None).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::MinRestPeriod);
        assert_eq!(conflict.data["rest_hours"], 9.0);
        assert_eq!(conflict.suggestions[0], "Start no earlier than 2024-08-04 09:00");

        assert!(rest_period_conflict(&c, 1, d("2024-08-04"), t("09:00"), &entries, None).is_none());
    }

    #[test]
    fn test_rest_period_after_overnight_shift() {
        let c = LegalConstraints::default();
        let entries = vec![work(1, "2024-08-03", "22:00", "06:00")];
        let conflict = rest_period_conflict(&c, 1, d("2024-08-04"), t("14:00"), &entries, None).unwrap();
        assert_eq!(conflict.data["rest_hours"], 8.0);
    }

    #[test]
    fn test_rest_period_without_history_passes() {
        let c = LegalConstraints::default();
        assert!(rest_period_conflict(&c, 1, d("2024-08-04"), t("00:30"), &[], None).is_none());
    }

    #[test]
    fn test_validate_entry_long_shift() {
        let report = validate_entry(&LegalConstraints::default(), "08:00", "20:00", 0, false);
        assert!(!report.valid);
        assert!(report.has(ValidationCode::DailyHoursExceeded));
        assert!(report.has(ValidationCode::InsufficientBreak));
        assert_eq!(report.worked_hours, Some(12.0));
    }

    #[test]
    fn test_validate_entry_break_boundary() {
        let c = LegalConstraints::default();
        let report = validate_entry(&c, "09:00", "15:50", 20, false);
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.worked_hours, Some(6.5));

        let report = validate_entry(&c, "09:00", "15:50", 19, false);
        assert!(report.has(ValidationCode::InsufficientBreak));
    }

    #[test]
    fn test_validate_entry_break_rule_uses_span() {
        let c = LegalConstraints::default();
        // 6h15 span, 6h worked: the break still has to be 20 minutes.
        let report = validate_entry(&c, "09:00", "15:15", 15, false);
        assert!(report.has(ValidationCode::InsufficientBreak));
        assert_eq!(report.worked_hours, Some(6.0));

        let report = validate_entry(&c, "09:00", "15:00", 0, false);
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_validate_entry_rejects_bad_input() {
        let c = LegalConstraints::default();
        let report = validate_entry(&c, "25:00", "nine", 0, false);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.code == ValidationCode::InvalidTimeFormat));
        assert_eq!(report.worked_hours, None);

        let report = validate_entry(&c, "17:00", "09:00", 0, false);
        assert!(report.has(ValidationCode::EndBeforeStart));

        let report = validate_entry(&c, "22:00", "06:00", 30, true);
        assert!(report.valid);
        assert_eq!(report.worked_hours, Some(7.5));
    }

    #[test]
    fn test_outcome_into_result() {
        let ok = LegalCheckOutcome::from_checks(vec![(LegalCheck::DailyHours, Ok(None))]);
        assert!(ok.valid);
        assert_eq!(ok.into_result(), Ok(vec![]));

        let failed = LegalCheckOutcome::from_checks(vec![
            (LegalCheck::DailyHours, Ok(None)),
            (LegalCheck::RestPeriod, Err(RepositoryError::Unavailable("down".into()))),
        ]);
        assert!(!failed.valid);
        assert!(failed.conflicts.is_empty());
        assert_eq!(
            failed.into_result(),
            Err(EngineError::Repository {
                operation: "rest period check",
                source: RepositoryError::Unavailable("down".into()),
            })
        );
    }
}
