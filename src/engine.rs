//! Compliance engine.
//!
//! The `engine` module wires a [`TimeRepository`] to a
//! [`LegalConstraints`] value.  The component modules
//! ([`crate::validator`], [`crate::conflicts`], [`crate::overtime`],
//! [`crate::anomalies`], [`crate::comparator`]) add their operations to
//! [`ComplianceEngine`] through their own `impl` blocks and keep their
//! arithmetic in pure functions that can be tested without storage.

use crate::constraints::LegalConstraints;
use crate::error::{EngineError, EngineResult, RepositoryError};
use crate::models::{PlanningEntry, TimeEntry};
use crate::repository::{PlanningQuery, TimeEntryQuery, TimeRepository};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Rows requested per repository round-trip.
pub const PAGE_SIZE: usize = 500;

/// Entry point for every repository-backed check.
///
/// The engine holds no mutable state; clones share the same repository
/// and constraints.
pub struct ComplianceEngine<R> {
    repository: Arc<R>,
    constraints: Arc<LegalConstraints>,
}

impl<R> Clone for ComplianceEngine<R> {
    fn clone(&self) -> Self {
        ComplianceEngine {
            repository: Arc::clone(&self.repository),
            constraints: Arc::clone(&self.constraints),
        }
    }
}

impl<R: TimeRepository> ComplianceEngine<R> {
    pub fn new(repository: R, constraints: LegalConstraints) -> Self {
        ComplianceEngine {
            repository: Arc::new(repository),
            constraints: Arc::new(constraints),
        }
    }

    pub fn constraints(&self) -> &LegalConstraints {
        &self.constraints
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// All time entries of `employee_id` dated within `[from, to]`,
    /// following pagination until the repository reports no more rows.
    pub async fn fetch_time_entries(
        &self,
        employee_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeEntry>, RepositoryError> {
        let mut entries = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .repository
                .get_time_entries(TimeEntryQuery {
                    employee_id,
                    date_from: from,
                    date_to: to,
                    limit: PAGE_SIZE,
                    offset,
                })
                .await?;
            let fetched = page.data.len();
            entries.extend(page.data);
            offset += fetched;
            if fetched == 0 || offset >= page.pagination.total {
                break;
            }
        }
        debug!(employee_id, %from, %to, count = entries.len(), "fetched time entries");
        Ok(entries)
    }

    /// All planning entries of `employee_id` dated within `[from, to]`.
    /// Planning reads carry no total, so paging stops on the first empty
    /// batch; a backend that returns fewer rows than `limit` is not cut
    /// short.
    pub async fn fetch_planning_entries(
        &self,
        employee_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PlanningEntry>, RepositoryError> {
        let mut entries = Vec::new();
        let mut offset = 0;
        loop {
            let batch = self
                .repository
                .get_planning_entries(PlanningQuery {
                    employee_id,
                    start_date: from,
                    end_date: to,
                    limit: PAGE_SIZE,
                    offset,
                })
                .await?;
            if batch.is_empty() {
                break;
            }
            offset += batch.len();
            entries.extend(batch);
        }
        debug!(employee_id, %from, %to, count = entries.len(), "fetched planning entries");
        Ok(entries)
    }
}

/// Rejects ranges whose end precedes their start.
pub(crate) fn ensure_range(start: NaiveDate, end: NaiveDate) -> EngineResult<()> {
    if end < start {
        return Err(EngineError::InvalidRange { start, end });
    }
    Ok(())
}
