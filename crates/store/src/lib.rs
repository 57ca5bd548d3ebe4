// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-store: the persistence contract the engine consumes, plus the
//! in-memory reference backend.
//!
//! The store owns durable truth. Queues and the coordinator hold in-memory
//! copies of jobs, but nothing is authoritative until it has been written
//! through a [`JobStore`].

pub mod memory;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use memory::MemoryStore;
#[cfg(any(test, feature = "test-support"))]
pub use test_support::ScriptedStore;

use async_trait::async_trait;
use thiserror::Error;
use trellis_core::{ActivityType, CorrelationId, Job, JobId, JobStatus};

/// Errors surfaced by a [`JobStore`] backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The entity is absent. Not retryable.
    #[error("not found: {0}")]
    NotFound(String),
    /// Transient durability failure. Retryable.
    #[error("store failed: {0}")]
    Failed(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Which slice of the suspended pool a queue owns.
///
/// A dedicated queue drains exactly its activity type; the default queue
/// drains everything the dedicated queues do not claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSelector {
    Typed(ActivityType),
    Default { exclude: Vec<ActivityType> },
}

impl QueueSelector {
    pub fn matches(&self, activity_type: &ActivityType) -> bool {
        match self {
            Self::Typed(t) => t == activity_type,
            Self::Default { exclude } => !exclude.contains(activity_type),
        }
    }
}

/// Durable map of jobs by id with the secondary lookups the engine needs.
///
/// All operations are issued from async context; a blocking backend is
/// expected to shift work to a blocking pool itself. Two `store` calls for
/// the same id issued in order from one coordinator lane must persist in
/// that order.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load(&self, id: &JobId) -> Result<Job, StoreError>;

    /// The root job of a correlation tree.
    async fn load_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Job, StoreError>;

    /// Every job currently in `status`. Boot-time scan only.
    async fn load_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

    /// Upsert one job.
    async fn store(&self, job: &Job) -> Result<(), StoreError>;

    /// Upsert a batch, all-or-nothing with respect to concurrent readers.
    async fn store_batch(&self, jobs: &[Job]) -> Result<(), StoreError>;

    /// Up to `max` suspended jobs for `selector`, oldest first
    /// (`created_utc`, then id). The caller clears the `suspended` flag.
    async fn load_suspended(
        &self,
        selector: &QueueSelector,
        max: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Exact count of suspended jobs for `selector`.
    async fn count_suspended(&self, selector: &QueueSelector) -> Result<usize, StoreError>;
}
