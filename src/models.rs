//! Data models for the Labor Engine.
//!
//! The `models` module defines the serialisable records the engine
//! reads (time entries and planning entries) and the immutable result
//! snapshots it produces (conflicts, anomalies, overtime calculations
//! and planning comparisons).  Every type derives `Serialize` and
//! `Deserialize` so callers can ship results over whatever wire format
//! they use.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A wall-clock time of day with minute precision (`00:00` to `23:59`).
///
/// A `TimeOfDay` is not tied to a date.  Durations between two values
/// are computed with [`TimeOfDay::minutes_until`], which treats an end
/// earlier than the start as belonging to the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    minutes: u16,
}

/// Reasons a string could not be read as a [`TimeOfDay`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("expected HH:MM, got {0:?}")]
    Format(String),
    #[error("hour {0} is out of range")]
    Hour(u32),
    #[error("minute {0} is out of range")]
    Minute(u32),
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { minutes: 0 };

    /// Builds a time of day, returning `None` for hours above 23 or
    /// minutes above 59.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(TimeOfDay {
            minutes: (hour * 60 + minute) as u16,
        })
    }

    pub fn hour(self) -> u32 {
        u32::from(self.minutes) / 60
    }

    pub fn minute(self) -> u32 {
        u32::from(self.minutes) % 60
    }

    pub fn minutes_since_midnight(self) -> u32 {
        u32::from(self.minutes)
    }

    /// Elapsed minutes from `self` to `end`.  When `end` is earlier than
    /// `self` the end is taken on the next day, so `22:00 -> 06:00` is
    /// 480 minutes.  Equal values yield zero.
    pub fn minutes_until(self, end: TimeOfDay) -> u32 {
        let start = self.minutes_since_midnight();
        let mut end = end.minutes_since_midnight();
        if end < start {
            end += MINUTES_PER_DAY;
        }
        end - start
    }

    /// Anchors this time of day on `date`.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.minutes))
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS`.  Seconds are validated
    /// and then dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_err = || TimeParseError::Format(s.to_string());
        let mut parts = s.trim().split(':');
        let hour = parts.next().ok_or_else(format_err)?;
        let minute = parts.next().ok_or_else(format_err)?;
        let second = parts.next();
        if parts.next().is_some() {
            return Err(format_err());
        }
        let numeric = |p: &str, width: std::ops::RangeInclusive<usize>| -> Result<u32, TimeParseError> {
            if !width.contains(&p.len()) || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format_err());
            }
            p.parse::<u32>().map_err(|_| format_err())
        };
        let hour = numeric(hour, 1..=2)?;
        let minute = numeric(minute, 2..=2)?;
        if let Some(second) = second {
            if numeric(second, 2..=2)? > 59 {
                return Err(format_err());
            }
        }
        if hour > 23 {
            return Err(TimeParseError::Hour(hour));
        }
        if minute > 59 {
            return Err(TimeParseError::Minute(minute));
        }
        TimeOfDay::new(hour, minute).ok_or_else(format_err)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Whether an entry records work or a standalone break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    #[default]
    Work,
    Break,
}

/// Workflow state of a time entry.  The engine evaluates entries in
/// every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Draft,
    Submitted,
    Validated,
}

/// A clock-in/clock-out record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i64,
    pub employee_id: i64,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    /// `None` while the employee is still clocked in.  Open entries
    /// contribute no hours.
    #[serde(default)]
    pub end_time: Option<TimeOfDay>,
    #[serde(default)]
    pub break_duration_minutes: u32,
    #[serde(rename = "type", default)]
    pub entry_type: EntryType,
    #[serde(default)]
    pub status: EntryStatus,
    /// Set when overtime on this entry has been declared and authorised.
    #[serde(default)]
    pub is_overtime: bool,
    /// Overtime hours recorded against this entry.
    #[serde(default)]
    pub overtime_hours: f64,
    #[serde(default)]
    pub overtime_reason: Option<String>,
}

impl TimeEntry {
    pub fn is_work(&self) -> bool {
        self.entry_type == EntryType::Work
    }

    /// Span between start and end in whole minutes, midnight-wrap aware.
    pub fn span_minutes(&self) -> Option<u32> {
        self.end_time.map(|end| self.start_time.minutes_until(end))
    }

    /// Span minus break in whole minutes, clamped at zero.
    pub fn worked_minutes(&self) -> u32 {
        self.span_minutes()
            .map_or(0, |span| span.saturating_sub(self.break_duration_minutes))
    }

    pub fn span_hours(&self) -> Option<f64> {
        self.span_minutes().map(crate::interval::minutes_to_hours)
    }

    pub fn worked_hours(&self) -> f64 {
        crate::interval::minutes_to_hours(self.worked_minutes())
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.start_time.on(self.date)
    }

    /// The instant the entry ends, on the following day for entries that
    /// cross midnight.
    pub fn ends_at(&self) -> Option<NaiveDateTime> {
        self.end_time.map(|end| {
            self.starts_at() + Duration::minutes(i64::from(self.start_time.minutes_until(end)))
        })
    }
}

/// An administrator-authored schedule slot: the "planned" side of a
/// comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningEntry {
    pub id: i64,
    pub employee_id: i64,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    #[serde(default)]
    pub end_time: Option<TimeOfDay>,
    #[serde(default)]
    pub break_duration_minutes: u32,
    #[serde(rename = "type", default)]
    pub entry_type: EntryType,
}

impl PlanningEntry {
    /// Planned work in whole minutes, break deducted.  Break slots and
    /// open slots plan nothing.
    pub fn planned_minutes(&self) -> u32 {
        match (self.entry_type, self.end_time) {
            (EntryType::Work, Some(end)) => self
                .start_time
                .minutes_until(end)
                .saturating_sub(self.break_duration_minutes),
            _ => 0,
        }
    }

    pub fn planned_hours(&self) -> f64 {
        crate::interval::minutes_to_hours(self.planned_minutes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Overlap,
    InsufficientBreak,
    MaxDailyHours,
    MaxWeeklyHours,
    MinRestPeriod,
    AverageHours,
}

/// A problem found while validating a candidate entry or scanning a
/// schedule before acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub employee_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub suggestions: Vec<String>,
    /// Figures behind the conflict (totals, limits, entry ids).
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    ExcessiveHours,
    MissingBreak,
    Overlap,
    UnauthorizedOvertime,
    PlanningMismatch,
}

/// A problem found after the fact in already-recorded entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub employee_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub suggestion: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OvertimeType {
    Daily,
    Weekly,
}

/// Overtime owed for a single day or ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertimeCalculation {
    pub employee_id: i64,
    /// `YYYY-MM-DD` for daily rows, `YYYY-Www` for weekly rows.
    pub period: String,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub overtime_type: OvertimeType,
    pub rate: f64,
    pub approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    Match,
    Under,
    Over,
    /// Planned hours exist but nothing was recorded for the day.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayComparison {
    pub date: NaiveDate,
    pub planned_hours: f64,
    pub actual_hours: f64,
    /// Actual minus planned.
    pub variance: f64,
    pub status: ComparisonStatus,
}

/// Planned-vs-actual report for one employee over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningComparison {
    pub employee_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: Vec<DayComparison>,
    pub planned_total: f64,
    pub actual_total: f64,
    pub variance: f64,
    pub variance_percent: f64,
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_displays_time_of_day() {
        assert_eq!(t("09:05").to_string(), "09:05");
        assert_eq!(t("7:30").to_string(), "07:30");
        assert_eq!(t("23:59:59").to_string(), "23:59");
        assert_eq!(t("00:00"), TimeOfDay::MIDNIGHT);
    }

    #[test]
    fn rejects_malformed_time_of_day() {
        assert_eq!("24:00".parse::<TimeOfDay>(), Err(TimeParseError::Hour(24)));
        assert_eq!("12:60".parse::<TimeOfDay>(), Err(TimeParseError::Minute(60)));
        for bad in ["", "12", "12:5", "ab:cd", "12:00:00:00", "-1:00", "123:00"] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn minutes_until_wraps_midnight() {
        assert_eq!(t("22:00").minutes_until(t("06:00")), 480);
        assert_eq!(t("09:00").minutes_until(t("17:00")), 480);
        assert_eq!(t("12:00").minutes_until(t("12:00")), 0);
    }

    #[test]
    fn time_entry_deserializes_with_defaults() {
        let entry: TimeEntry = serde_json::from_value(serde_json::json!({
            "id": 1,
            "employee_id": 7,
            "date": "2024-08-05",
            "start_time": "22:00",
            "end_time": "06:00",
            "type": "work"
        }))
        .unwrap();
        assert_eq!(entry.status, EntryStatus::Draft);
        assert_eq!(entry.worked_hours(), 8.0);
        assert_eq!(
            entry.ends_at().unwrap().to_string(),
            "2024-08-06 06:00:00"
        );
    }

    #[test]
    fn open_entries_contribute_no_hours() {
        let entry: TimeEntry = serde_json::from_value(serde_json::json!({
            "id": 1,
            "employee_id": 7,
            "date": "2024-08-05",
            "start_time": "08:00"
        }))
        .unwrap();
        assert_eq!(entry.span_hours(), None);
        assert_eq!(entry.worked_minutes(), 0);
        assert_eq!(entry.worked_hours(), 0.0);
        assert_eq!(entry.ends_at(), None);
    }
}
