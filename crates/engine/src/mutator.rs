// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single writer of job state.

use crate::recover::{RecoverableAction, RecoverableFailure};
use std::sync::Arc;
use thiserror::Error;
use trellis_core::{Continuation, EventStream, Job, JobId, JobStatus, OrchestratorEvent};
use trellis_store::{JobStore, StoreError};

/// Errors from a job mutation.
#[derive(Debug, Error)]
pub enum MutateError {
    /// The requested edge is not part of the lifecycle graph. Programmer
    /// error; propagates to the caller instead of being retried.
    #[error("illegal status transition {from} -> {to} on {id}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecoverableFailure for MutateError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidTransition { .. } => false,
            Self::Store(e) => e.is_retryable(),
        }
    }
}

/// Applies and persists job mutations.
///
/// The only component allowed to change a job after creation. Every
/// mutation validates the lifecycle edge, writes through the store (with
/// the recovery policy's retries), publishes a snapshot, and returns the
/// updated job — callers must adopt the returned value.
#[derive(Clone)]
pub struct JobMutator {
    store: Arc<dyn JobStore>,
    events: EventStream,
    recovery: RecoverableAction,
}

impl JobMutator {
    pub fn new(store: Arc<dyn JobStore>, events: EventStream, recovery: RecoverableAction) -> Self {
        Self {
            store,
            events,
            recovery,
        }
    }

    /// Move `job` along the `job.status -> next` edge.
    pub async fn set_status(&self, mut job: Job, next: JobStatus) -> Result<Job, MutateError> {
        self.check_edge(&job, next)?;
        job.status = next;
        self.commit(job).await
    }

    /// Ready -> Running, counting the hand-off to the runtime.
    pub async fn begin_dispatch(&self, mut job: Job) -> Result<Job, MutateError> {
        self.check_edge(&job, JobStatus::Running)?;
        job.status = JobStatus::Running;
        job.dispatch_count += 1;
        self.commit(job).await
    }

    /// Running -> WaitingForChildren with the wait tree attached, in one
    /// durable write.
    pub async fn wait_for_children(
        &self,
        mut job: Job,
        continuation: Continuation,
    ) -> Result<Job, MutateError> {
        self.check_edge(&job, JobStatus::WaitingForChildren)?;
        job.status = JobStatus::WaitingForChildren;
        job.continuation = Some(continuation);
        self.commit(job).await
    }

    /// Running -> Failed, recording the cause and consuming a retry.
    pub async fn record_failure(
        &self,
        mut job: Job,
        error: &str,
        retry_delay_ms: u64,
    ) -> Result<Job, MutateError> {
        self.check_edge(&job, JobStatus::Failed)?;
        job.status = JobStatus::Failed;
        job.retry_count += 1;
        job.retry_delay_ms = retry_delay_ms;
        job.error = Some(error.to_string());
        self.commit(job).await
    }

    /// Persist a continuation-only change; the status stays put.
    pub async fn update_continuation(&self, job: Job) -> Result<Job, MutateError> {
        self.commit(job).await
    }

    fn check_edge(&self, job: &Job, next: JobStatus) -> Result<(), MutateError> {
        if job.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(MutateError::InvalidTransition {
                id: job.id.clone(),
                from: job.status,
                to: next,
            })
        }
    }

    async fn commit(&self, job: Job) -> Result<Job, MutateError> {
        let store = Arc::clone(&self.store);
        let to_write = job.clone();
        self.recovery
            .attempt(move || {
                let store = Arc::clone(&store);
                let job = to_write.clone();
                async move { store.store(&job).await }
            })
            .await?;
        self.events.publish(OrchestratorEvent::Job(job.snapshot()));
        Ok(job)
    }
}

#[cfg(test)]
#[path = "mutator_tests.rs"]
mod tests;
