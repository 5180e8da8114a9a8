//! Interval arithmetic and calendar grouping.
//!
//! Everything in this module is pure and total: durations are computed
//! from [`TimeOfDay`] values with explicit midnight wrap, and records
//! are bucketed into ordered maps keyed by calendar day or ISO week so
//! the downstream checks always see one bucket per day/week.

use crate::models::{PlanningEntry, TimeEntry, TimeOfDay};
use chrono::{Datelike, Duration, IsoWeek, NaiveDate, NaiveDateTime, Weekday};
use std::collections::BTreeMap;
use std::fmt;

/// Hours between `start` and `end`.  An `end` earlier than `start` is
/// read as the next day, so `22:00 -> 06:00` yields `8.0`; equal values
/// yield `0.0`.
pub fn hours_between(start: TimeOfDay, end: TimeOfDay) -> f64 {
    minutes_to_hours(start.minutes_until(end))
}

/// Span minus break, clamped at zero.  A break longer than the span
/// yields zero, never a negative figure.
pub fn worked_hours(start: TimeOfDay, end: TimeOfDay, break_minutes: u32) -> f64 {
    let span = start.minutes_until(end);
    minutes_to_hours(span.saturating_sub(break_minutes))
}

/// Real elapsed hours between the end of one shift and the start of the
/// next.  Negative when the next shift starts before the previous one
/// ended.
pub fn rest_hours(previous_end: NaiveDateTime, next_start: NaiveDateTime) -> f64 {
    (next_start - previous_end).num_minutes() as f64 / 60.0
}

/// Strict interval intersection: `[a_start, a_end)` and `[b_start, b_end)`
/// overlap iff `a_start < b_end && b_start < a_end`.  Intervals that only
/// touch at an endpoint do not overlap.
pub fn overlaps(
    a: (NaiveDateTime, NaiveDateTime),
    b: (NaiveDateTime, NaiveDateTime),
) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Minutes of overlap between two intervals, zero when disjoint.
pub fn overlap_minutes(
    a: (NaiveDateTime, NaiveDateTime),
    b: (NaiveDateTime, NaiveDateTime),
) -> i64 {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (end - start).num_minutes().max(0)
}

/// An ISO-8601 week (Monday to Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn of(date: NaiveDate) -> Self {
        WeekKey::from(date.iso_week())
    }

    pub fn monday(self) -> NaiveDate {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn sunday(self) -> NaiveDate {
        self.monday() + Duration::days(6)
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        WeekKey::of(date) == self
    }
}

impl From<IsoWeek> for WeekKey {
    fn from(week: IsoWeek) -> Self {
        WeekKey {
            year: week.year(),
            week: week.week(),
        }
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// Monday and Sunday of the ISO week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// Number of distinct ISO weeks touched by `[start, end]`.
pub fn weeks_spanned(start: NaiveDate, end: NaiveDate) -> usize {
    if end < start {
        return 0;
    }
    let (first_monday, _) = week_bounds(start);
    let (last_monday, _) = week_bounds(end);
    ((last_monday - first_monday).num_days() / 7 + 1) as usize
}

/// Records that belong to a calendar day.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

impl Dated for TimeEntry {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for PlanningEntry {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl<T: Dated> Dated for &T {
    fn date(&self) -> NaiveDate {
        (**self).date()
    }
}

/// Buckets records by calendar day, preserving input order inside each
/// bucket.
pub fn group_by_date<T: Dated + Clone>(records: &[T]) -> BTreeMap<NaiveDate, Vec<T>> {
    let mut groups: BTreeMap<NaiveDate, Vec<T>> = BTreeMap::new();
    for record in records {
        groups.entry(record.date()).or_default().push(record.clone());
    }
    groups
}

/// Buckets records by ISO week.
pub fn group_by_week<T: Dated + Clone>(records: &[T]) -> BTreeMap<WeekKey, Vec<T>> {
    let mut groups: BTreeMap<WeekKey, Vec<T>> = BTreeMap::new();
    for record in records {
        groups
            .entry(WeekKey::of(record.date()))
            .or_default()
            .push(record.clone());
    }
    groups
}

/// Converts a whole-minute duration to hours.  Totals are summed in
/// minutes and converted once, so limits are compared exactly.
pub fn minutes_to_hours(minutes: u32) -> f64 {
    f64::from(minutes) / 60.0
}

/// Signed `actual - planned` in hours.
pub fn minutes_difference(actual: u32, planned: u32) -> f64 {
    (i64::from(actual) - i64::from(planned)) as f64 / 60.0
}

/// Pairs of work entries on consecutive days where the earlier entry
/// runs past midnight into the later one.  Same-day pairs are not
/// included.
pub fn overnight_overlaps(entries: &[TimeEntry]) -> Vec<(&TimeEntry, &TimeEntry)> {
    let work: Vec<&TimeEntry> = entries.iter().filter(|e| e.is_work()).collect();
    let days = group_by_date(&work);
    let mut pairs = Vec::new();
    for (date, day) in &days {
        let Some(next_day) = date.succ_opt().and_then(|next| days.get(&next)) else {
            continue;
        };
        for earlier in day {
            let Some(earlier_end) = earlier.ends_at() else {
                continue;
            };
            if earlier_end.date() == *date {
                continue;
            }
            for later in next_day {
                let Some(later_end) = later.ends_at() else {
                    continue;
                };
                if overlaps((earlier.starts_at(), earlier_end), (later.starts_at(), later_end)) {
                    pairs.push((*earlier, *later));
                }
            }
        }
    }
    pairs
}

/// Sum of spans in minutes (no break deduction) over the work entries in
/// `entries`.
pub fn total_span_minutes<'a>(entries: impl IntoIterator<Item = &'a TimeEntry>) -> u32 {
    entries
        .into_iter()
        .filter(|e| e.is_work())
        .filter_map(TimeEntry::span_minutes)
        .sum()
}

/// Sum of worked minutes (break deducted) over the work entries in
/// `entries`.
pub fn total_worked_minutes<'a>(entries: impl IntoIterator<Item = &'a TimeEntry>) -> u32 {
    entries
        .into_iter()
        .filter(|e| e.is_work())
        .map(TimeEntry::worked_minutes)
        .sum()
}

pub fn total_span_hours<'a>(entries: impl IntoIterator<Item = &'a TimeEntry>) -> f64 {
    minutes_to_hours(total_span_minutes(entries))
}

pub fn total_worked_hours<'a>(entries: impl IntoIterator<Item = &'a TimeEntry>) -> f64 {
    minutes_to_hours(total_worked_minutes(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap()
    }

    #[test]
    fn test_hours_between() {
        assert_eq!(hours_between(t("09:00"), t("17:00")), 8.0);
        assert_eq!(hours_between(t("22:00"), t("06:00")), 8.0);
        assert_eq!(hours_between(t("12:00"), t("12:00")), 0.0);
        assert_eq!(hours_between(t("08:15"), t("08:45")), 0.5);
    }

    #[test]
    fn test_worked_hours_deducts_break() {
        assert_eq!(worked_hours(t("09:00"), t("17:00"), 0), 8.0);
        assert_eq!(worked_hours(t("09:00"), t("17:00"), 60), 7.0);
        assert_eq!(worked_hours(t("09:00"), t("10:00"), 90), 0.0);
    }

    #[test]
    fn test_rest_hours_crosses_days() {
        assert_eq!(rest_hours(dt("2024-08-03T18:00"), dt("2024-08-04T07:00")), 13.0);
        assert_eq!(rest_hours(dt("2024-08-03T22:00"), dt("2024-08-04T07:00")), 9.0);
        assert_eq!(rest_hours(dt("2024-08-04T10:00"), dt("2024-08-04T12:00")), 2.0);
    }

    #[test]
    fn test_overlap_is_strict() {
        let a = (dt("2024-08-05T09:00"), dt("2024-08-05T17:00"));
        let b = (dt("2024-08-05T16:00"), dt("2024-08-05T20:00"));
        let c = (dt("2024-08-05T17:00"), dt("2024-08-05T18:00"));
        assert!(overlaps(a, b));
        assert!(overlaps(b, a));
        assert!(!overlaps(a, c));
        assert_eq!(overlap_minutes(a, b), 60);
        assert_eq!(overlap_minutes(a, c), 0);
    }

    fn work(start: &str, end: &str, break_minutes: u32) -> TimeEntry {
        TimeEntry {
            id: 1,
            employee_id: 1,
            date: d("2024-08-05"),
            start_time: t(start),
            end_time: Some(t(end)),
            break_duration_minutes: break_minutes,
            entry_type: crate::models::EntryType::Work,
            status: crate::models::EntryStatus::Submitted,
            is_overtime: false,
            overtime_hours: 0.0,
            overtime_reason: None,
        }
    }

    #[test]
    fn test_totals_are_exact_at_the_limit() {
        // 4h25 + 4h11 + 1h24: summing per-entry hours as floats drifts past 10.
        let entries = vec![
            work("06:00", "10:25", 0),
            work("11:00", "15:11", 0),
            work("16:00", "17:24", 0),
        ];
        assert_eq!(total_span_minutes(&entries), 600);
        assert_eq!(total_span_hours(&entries), 10.0);
        assert_eq!(total_worked_hours(&entries), 10.0);

        let with_breaks = vec![work("06:00", "10:55", 15), work("11:00", "16:40", 20)];
        assert_eq!(total_worked_minutes(&with_breaks), 600);
        assert_eq!(total_worked_hours(&with_breaks), 10.0);
    }

    #[test]
    fn test_overnight_overlaps_reach_into_next_day() {
        let mut night = work("22:00", "06:00", 0);
        night.id = 1;
        let mut morning = work("05:00", "09:00", 0);
        morning.id = 2;
        morning.date = d("2024-08-06");
        let mut late = work("07:00", "12:00", 0);
        late.id = 3;
        late.date = d("2024-08-06");

        let entries = vec![night, morning, late];
        let pairs: Vec<(i64, i64)> = overnight_overlaps(&entries)
            .into_iter()
            .map(|(a, b)| (a.id, b.id))
            .collect();
        assert_eq!(pairs, vec![(1, 2)]);
    }

    #[test]
    fn test_week_bounds_are_monday_to_sunday() {
        // 2024-08-07 is a Wednesday.
        assert_eq!(week_bounds(d("2024-08-07")), (d("2024-08-05"), d("2024-08-11")));
        assert_eq!(week_bounds(d("2024-08-05")), (d("2024-08-05"), d("2024-08-11")));
        assert_eq!(week_bounds(d("2024-08-11")), (d("2024-08-05"), d("2024-08-11")));
    }

    #[test]
    fn test_week_key_across_year_boundary() {
        // 2024-12-30 belongs to ISO week 1 of 2025.
        let key = WeekKey::of(d("2024-12-30"));
        assert_eq!(key, WeekKey { year: 2025, week: 1 });
        assert_eq!(key.monday(), d("2024-12-30"));
        assert_eq!(key.sunday(), d("2025-01-05"));
        assert_eq!(key.to_string(), "2025-W01");
        assert!(key.contains(d("2025-01-05")));
        assert!(!key.contains(d("2025-01-06")));
    }

    #[test]
    fn test_weeks_spanned() {
        assert_eq!(weeks_spanned(d("2024-08-05"), d("2024-08-11")), 1);
        assert_eq!(weeks_spanned(d("2024-08-11"), d("2024-08-12")), 2);
        assert_eq!(weeks_spanned(d("2024-08-05"), d("2024-10-27")), 12);
        assert_eq!(weeks_spanned(d("2024-08-12"), d("2024-08-05")), 0);
    }
}
