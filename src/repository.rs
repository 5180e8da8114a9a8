//! Data-access collaborator.
//!
//! The engine reads time entries, planning entries and the list of
//! active employees through the [`TimeRepository`] trait.  Storage
//! layers implement it; [`InMemoryRepository`] backs the batch binary
//! and the tests.

use crate::error::RepositoryError;
use crate::models::{PlanningEntry, TimeEntry};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Filter for [`TimeRepository::get_time_entries`].  Both dates are
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntryQuery {
    pub employee_id: i64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub limit: usize,
    pub offset: usize,
}

/// Filter for [`TimeRepository::get_planning_entries`].  Both dates are
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningQuery {
    pub employee_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Read access to recorded time, schedules and employees.
///
/// Implementations must be thread-safe (`Send + Sync`) so one engine can
/// serve concurrent callers.
#[async_trait]
pub trait TimeRepository: Send + Sync {
    async fn get_time_entries(&self, query: TimeEntryQuery) -> Result<Page<TimeEntry>, RepositoryError>;

    async fn get_planning_entries(&self, query: PlanningQuery) -> Result<Vec<PlanningEntry>, RepositoryError>;

    async fn get_active_employee_ids(&self) -> Result<Vec<i64>, RepositoryError>;
}

#[async_trait]
impl<T: TimeRepository + ?Sized> TimeRepository for Arc<T> {
    async fn get_time_entries(&self, query: TimeEntryQuery) -> Result<Page<TimeEntry>, RepositoryError> {
        (**self).get_time_entries(query).await
    }

    async fn get_planning_entries(&self, query: PlanningQuery) -> Result<Vec<PlanningEntry>, RepositoryError> {
        (**self).get_planning_entries(query).await
    }

    async fn get_active_employee_ids(&self) -> Result<Vec<i64>, RepositoryError> {
        (**self).get_active_employee_ids().await
    }
}

/// A repository held entirely in memory.
///
/// Entries are returned ordered by date, start time and id.  Every
/// employee with at least one time or planning entry is active unless
/// an explicit set was given with [`InMemoryRepository::with_active_employees`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryRepository {
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub planning_entries: Vec<PlanningEntry>,
    #[serde(default)]
    pub active_employees: Option<BTreeSet<i64>>,
}

impl InMemoryRepository {
    pub fn new(time_entries: Vec<TimeEntry>, planning_entries: Vec<PlanningEntry>) -> Self {
        InMemoryRepository {
            time_entries,
            planning_entries,
            active_employees: None,
        }
    }

    pub fn with_active_employees(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.active_employees = Some(ids.into_iter().collect());
        self
    }
}

fn paginate<T>(rows: Vec<T>, limit: usize, offset: usize) -> Page<T> {
    let total = rows.len();
    let data: Vec<T> = rows.into_iter().skip(offset).take(limit).collect();
    Page {
        data,
        pagination: Pagination { total, limit, offset },
    }
}

#[async_trait]
impl TimeRepository for InMemoryRepository {
    async fn get_time_entries(&self, query: TimeEntryQuery) -> Result<Page<TimeEntry>, RepositoryError> {
        if query.limit == 0 {
            return Err(RepositoryError::InvalidQuery("limit must be positive".into()));
        }
        let mut rows: Vec<TimeEntry> = self
            .time_entries
            .iter()
            .filter(|e| e.employee_id == query.employee_id)
            .filter(|e| e.date >= query.date_from && e.date <= query.date_to)
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.date, e.start_time, e.id));
        Ok(paginate(rows, query.limit, query.offset))
    }

    async fn get_planning_entries(&self, query: PlanningQuery) -> Result<Vec<PlanningEntry>, RepositoryError> {
        if query.limit == 0 {
            return Err(RepositoryError::InvalidQuery("limit must be positive".into()));
        }
        let mut rows: Vec<PlanningEntry> = self
            .planning_entries
            .iter()
            .filter(|e| e.employee_id == query.employee_id)
            .filter(|e| e.date >= query.start_date && e.date <= query.end_date)
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.date, e.start_time, e.id));
        Ok(paginate(rows, query.limit, query.offset).data)
    }

    async fn get_active_employee_ids(&self) -> Result<Vec<i64>, RepositoryError> {
        let ids: BTreeSet<i64> = match &self.active_employees {
            Some(ids) => ids.clone(),
            None => self
                .time_entries
                .iter()
                .map(|e| e.employee_id)
                .chain(self.planning_entries.iter().map(|e| e.employee_id))
                .collect(),
        };
        Ok(ids.into_iter().collect())
    }
}
