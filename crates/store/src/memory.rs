// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory reference backend for the persistence contract.

use crate::{JobStore, QueueSelector, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use trellis_core::{CorrelationId, Job, JobId, JobStatus};

/// HashMap-backed [`JobStore`].
///
/// Holds full job records; the secondary lookups scan. Good enough for the
/// reference semantics and for tests — a production backend indexes
/// `status`, `correlation_id`, and `(activity_type, suspended)`.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs held. Test hook.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn load(&self, id: &JobId) -> Result<Job, StoreError> {
        self.jobs
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn load_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Job, StoreError> {
        self.jobs
            .lock()
            .values()
            .find(|j| j.correlation_id == *correlation_id && j.is_root())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(correlation_id.to_string()))
    }

    async fn load_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (a.created_utc, &a.id).cmp(&(b.created_utc, &b.id)));
        Ok(jobs)
    }

    async fn store(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn store_batch(&self, jobs: &[Job]) -> Result<(), StoreError> {
        // Single lock acquisition makes the batch atomic for readers.
        let mut guard = self.jobs.lock();
        for job in jobs {
            guard.insert(job.id.clone(), job.clone());
        }
        Ok(())
    }

    async fn load_suspended(
        &self,
        selector: &QueueSelector,
        max: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .values()
            .filter(|j| j.suspended && selector.matches(&j.activity_type))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (a.created_utc, &a.id).cmp(&(b.created_utc, &b.id)));
        jobs.truncate(max);
        Ok(jobs)
    }

    async fn count_suspended(&self, selector: &QueueSelector) -> Result<usize, StoreError> {
        Ok(self
            .jobs
            .lock()
            .values()
            .filter(|j| j.suspended && selector.matches(&j.activity_type))
            .count())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
