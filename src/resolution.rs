//! Remediation plans for detected conflicts.
//!
//! A static lookup from conflict type to the actions an administrator
//! can take.  No I/O; safe to call from anywhere.

use crate::models::{Conflict, ConflictType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub conflict_type: ConflictType,
    pub priority: Priority,
    pub actions: Vec<String>,
    /// Whether the fix can be applied by tooling rather than by hand.
    pub automated: bool,
}

/// One plan per distinct conflict type in `conflicts`, in order of first
/// appearance.
pub fn suggest_resolutions(conflicts: &[Conflict]) -> Vec<ResolutionPlan> {
    let mut seen: Vec<ConflictType> = Vec::new();
    for conflict in conflicts {
        if !seen.contains(&conflict.conflict_type) {
            seen.push(conflict.conflict_type);
        }
    }
    seen.into_iter().map(resolution_for).collect()
}

pub fn resolution_for(conflict_type: ConflictType) -> ResolutionPlan {
    let (priority, automated, actions) = match conflict_type {
        ConflictType::Overlap => (
            Priority::High,
            true,
            vec![
                "Adjust the start or end time of one entry",
                "Merge the overlapping entries",
                "Delete the duplicate entry",
            ],
        ),
        ConflictType::InsufficientBreak => (
            Priority::Medium,
            true,
            vec![
                "Insert a break between the contiguous entries",
                "Merge the entries and record the break duration",
            ],
        ),
        ConflictType::MaxDailyHours => (
            Priority::High,
            true,
            vec![
                "Shorten the entries of the day",
                "Move part of the work to another day",
                "Split the shift across several days",
            ],
        ),
        ConflictType::MaxWeeklyHours => (
            Priority::Medium,
            false,
            vec![
                "Redistribute hours to another week",
                "Review the weekly planning with the manager",
                "Request an exceptional derogation",
            ],
        ),
        ConflictType::MinRestPeriod => (
            Priority::High,
            true,
            vec![
                "Delay the start of the next shift",
                "End the previous shift earlier",
            ],
        ),
        ConflictType::AverageHours => (
            Priority::Low,
            false,
            vec![
                "Plan lighter weeks over the coming period",
                "Review recurring overtime with the employee",
            ],
        ),
    };
    ResolutionPlan {
        conflict_type,
        priority,
        actions: actions.iter().map(|a| a.to_string()).collect(),
        automated,
    }
}
