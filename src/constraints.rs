//! Legal constraint configuration.
//!
//! The `constraints` module defines [`LegalConstraints`], the immutable
//! set of thresholds every check is evaluated against, and helpers for
//! loading per-jurisdiction rule sets from versioned JSON files.  The
//! engine never reads a global: a `LegalConstraints` value is handed to
//! [`crate::engine::ComplianceEngine::new`] and shared read-only across
//! concurrent invocations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Thresholds applied by the compliance checks.
///
/// Missing fields in a JSON rule set fall back to the values of
/// [`LegalConstraints::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalConstraints {
    /// Legal ceiling on hours in one calendar day.
    pub max_daily_hours: f64,
    /// Legal ceiling on hours in one ISO week.
    pub max_weekly_hours: f64,
    /// Minimum rest between the end of one day's work and the next start.
    pub min_rest_hours: f64,
    /// Contractual weekly hours; weekly overtime starts above this.
    pub target_weekly_hours: f64,
    /// Daily overtime starts above this many hours.
    pub daily_overtime_threshold: f64,
    pub daily_overtime_rate: f64,
    pub weekly_overtime_rate: f64,
    /// A shift longer than this many hours needs a break.
    pub break_required_after_hours: f64,
    /// Minimum break for a shift over `break_required_after_hours`.
    /// A break of exactly this length is compliant.
    pub min_break_minutes: u32,
    /// Two same-day entries closer than this are flagged as leaving no
    /// break.  Touching entries (zero gap) are always flagged.
    pub min_gap_between_entries_minutes: u32,
    /// A day whose |actual - planned| is strictly below this counts as a
    /// match; a variance of exactly this much is over or under.
    pub match_tolerance_hours: f64,
    /// Period variance (percent of planned) above which the comparison
    /// report adds a suggestion.
    pub variance_alert_percent: f64,
    /// Daily |actual - planned| above which the anomaly scan reports a
    /// planning mismatch.
    pub planning_mismatch_hours: f64,
    /// Ceiling on mean weekly hours over `average_window_weeks`.
    pub max_average_weekly_hours: f64,
    pub average_window_weeks: u32,
}

impl Default for LegalConstraints {
    fn default() -> Self {
        LegalConstraints {
            max_daily_hours: 10.0,
            max_weekly_hours: 48.0,
            min_rest_hours: 11.0,
            target_weekly_hours: 35.0,
            daily_overtime_threshold: 8.0,
            daily_overtime_rate: 1.25,
            weekly_overtime_rate: 1.10,
            break_required_after_hours: 6.0,
            min_break_minutes: 20,
            min_gap_between_entries_minutes: 0,
            match_tolerance_hours: 0.5,
            variance_alert_percent: 10.0,
            planning_mismatch_hours: 2.0,
            max_average_weekly_hours: 44.0,
            average_window_weeks: 12,
        }
    }
}

impl LegalConstraints {
    pub fn is_within_daily_limit(&self, hours: f64) -> bool {
        hours <= self.max_daily_hours
    }

    pub fn is_within_weekly_limit(&self, hours: f64) -> bool {
        hours <= self.max_weekly_hours
    }

    pub fn has_minimum_rest(&self, rest_hours: f64) -> bool {
        rest_hours >= self.min_rest_hours
    }

    /// Whether a shift of `hours` with `break_minutes` of break satisfies
    /// the mandatory-break rule.  Entry validation passes the span; the
    /// anomaly scan passes worked hours.
    pub fn has_required_break(&self, hours: f64, break_minutes: u32) -> bool {
        hours <= self.break_required_after_hours || break_minutes >= self.min_break_minutes
    }
}

/// Constraints for a jurisdiction at a specific version.  Rule sets are
/// stored as JSON files, e.g. `rules/fr_2024.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// A jurisdiction code such as `"FR"` or `"BE-WAL"`.
    pub jurisdiction: String,
    /// Version string, e.g. `"2024"`.
    pub version: String,
    #[serde(default)]
    pub constraints: LegalConstraints,
}

/// Load all rule sets from a directory.
///
/// Every `.json` file is parsed as a [`RuleSet`]; files that fail to
/// parse are logged and skipped.  A missing directory yields an empty
/// list.
pub fn load_rule_sets_from_dir(path: &Path) -> Result<Vec<RuleSet>> {
    let mut rule_sets = Vec::new();
    if !path.is_dir() {
        return Ok(rule_sets);
    }
    let read_dir = std::fs::read_dir(path)
        .with_context(|| format!("reading rule directory {}", path.display()))?;
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file = entry.path();
        if file.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let data = std::fs::read_to_string(&file)?;
        match serde_json::from_str::<RuleSet>(&data) {
            Ok(rule_set) => {
                debug!(jurisdiction = %rule_set.jurisdiction, version = %rule_set.version, "loaded rule set");
                rule_sets.push(rule_set);
            }
            Err(err) => warn!("failed to parse rule set {:?}: {}", file, err),
        }
    }
    Ok(rule_sets)
}

/// Rule sets indexed by jurisdiction.  When a jurisdiction has several
/// versions the lexically greatest version wins.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    rule_sets: HashMap<String, RuleSet>,
}

impl RuleBook {
    pub fn new(rule_sets: Vec<RuleSet>) -> Self {
        let mut book = RuleBook::default();
        for rule_set in rule_sets {
            book.insert(rule_set);
        }
        book
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(RuleBook::new(load_rule_sets_from_dir(path)?))
    }

    pub fn insert(&mut self, rule_set: RuleSet) {
        match self.rule_sets.get(&rule_set.jurisdiction) {
            Some(existing) if existing.version >= rule_set.version => {}
            _ => {
                self.rule_sets
                    .insert(rule_set.jurisdiction.clone(), rule_set);
            }
        }
    }

    pub fn get(&self, jurisdiction: &str) -> Option<&RuleSet> {
        self.rule_sets.get(jurisdiction)
    }

    /// Constraints for `jurisdiction`, or the built-in defaults when no
    /// rule set is registered for it.
    pub fn constraints_for(&self, jurisdiction: &str) -> LegalConstraints {
        match self.get(jurisdiction) {
            Some(rule_set) => rule_set.constraints.clone(),
            None => {
                warn!(jurisdiction, "no rule set registered, using default constraints");
                LegalConstraints::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rule_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }
}
