// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted store double for queue and transition tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::memory::MemoryStore;
use crate::{JobStore, QueueSelector, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_core::{CorrelationId, Job, JobId, JobStatus};

/// [`MemoryStore`] wrapper with scriptable failures and call counters.
///
/// Failures are consumed in order: `fail_next_stores(2)` makes the next two
/// `store`/`store_batch` calls return a retryable [`StoreError::Failed`].
#[derive(Default)]
pub struct ScriptedStore {
    inner: MemoryStore,
    skip_stores: AtomicUsize,
    fail_stores: AtomicUsize,
    fail_batches: AtomicUsize,
    fail_suspended_loads: AtomicUsize,
    store_calls: AtomicUsize,
    store_batch_calls: AtomicUsize,
    load_suspended_calls: AtomicUsize,
    count_suspended_calls: AtomicUsize,
    observed_stores: Mutex<Vec<Job>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert directly, bypassing counters and scripted failures.
    pub async fn seed(&self, job: &Job) {
        // MemoryStore::store is infallible.
        let _ = self.inner.store(job).await;
    }

    pub fn fail_next_stores(&self, n: usize) {
        self.fail_stores.store(n, Ordering::SeqCst);
    }

    /// Let `skip` more `store` calls through, then fail the following `n`.
    /// Applies to `store` only, not `store_batch`.
    pub fn fail_store_window(&self, skip: usize, n: usize) {
        self.skip_stores.store(skip, Ordering::SeqCst);
        self.fail_stores.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_batches(&self, n: usize) {
        self.fail_batches.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_suspended_loads(&self, n: usize) {
        self.fail_suspended_loads.store(n, Ordering::SeqCst);
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn store_batch_calls(&self) -> usize {
        self.store_batch_calls.load(Ordering::SeqCst)
    }

    pub fn load_suspended_calls(&self) -> usize {
        self.load_suspended_calls.load(Ordering::SeqCst)
    }

    pub fn count_suspended_calls(&self) -> usize {
        self.count_suspended_calls.load(Ordering::SeqCst)
    }

    /// Every job handed to `store`, in call order, as it looked at the call.
    pub fn observed_stores(&self) -> Vec<Job> {
        self.observed_stores.lock().clone()
    }

    fn take_failure(&self, budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobStore for ScriptedStore {
    async fn load(&self, id: &JobId) -> Result<Job, StoreError> {
        self.inner.load(id).await
    }

    async fn load_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Job, StoreError> {
        self.inner.load_by_correlation(correlation_id).await
    }

    async fn load_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        self.inner.load_by_status(status).await
    }

    async fn store(&self, job: &Job) -> Result<(), StoreError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.observed_stores.lock().push(job.clone());
        if self.take_failure(&self.skip_stores) {
            return self.inner.store(job).await;
        }
        if self.take_failure(&self.fail_stores) {
            return Err(StoreError::Failed("scripted store failure".into()));
        }
        self.inner.store(job).await
    }

    async fn store_batch(&self, jobs: &[Job]) -> Result<(), StoreError> {
        self.store_batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure(&self.fail_batches) {
            return Err(StoreError::Failed("scripted store failure".into()));
        }
        self.inner.store_batch(jobs).await
    }

    async fn load_suspended(
        &self,
        selector: &QueueSelector,
        max: usize,
    ) -> Result<Vec<Job>, StoreError> {
        self.load_suspended_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure(&self.fail_suspended_loads) {
            return Err(StoreError::Failed("scripted load failure".into()));
        }
        self.inner.load_suspended(selector, max).await
    }

    async fn count_suspended(&self, selector: &QueueSelector) -> Result<usize, StoreError> {
        self.count_suspended_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.count_suspended(selector).await
    }
}
