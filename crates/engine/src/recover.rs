// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry-wrapped durable mutations.
//!
//! A recoverable action pairs an idempotent persisted mutation with an
//! in-memory follow-up that must only run once the mutation is durable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use trellis_core::{EventStream, JobId, JobStatus, OrchestratorEvent};
use trellis_store::{JobStore, StoreError};

/// Failure of a durable mutation, classified for retry.
pub trait RecoverableFailure: std::fmt::Display {
    fn is_retryable(&self) -> bool;
}

impl RecoverableFailure for StoreError {
    fn is_retryable(&self) -> bool {
        StoreError::is_retryable(self)
    }
}

/// Bounded exponential backoff for durable mutations.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Runs durable mutations under the retry policy.
#[derive(Clone)]
pub struct RecoverableAction {
    store: Arc<dyn JobStore>,
    events: EventStream,
    policy: RecoveryPolicy,
}

impl RecoverableAction {
    pub fn new(store: Arc<dyn JobStore>, events: EventStream, policy: RecoveryPolicy) -> Self {
        Self {
            store,
            events,
            policy,
        }
    }

    /// Retry `body` under the policy and propagate the final error.
    ///
    /// `body` must be idempotent: it is re-run verbatim after a failure.
    pub async fn attempt<T, E, B, Fut>(&self, mut body: B) -> Result<T, E>
    where
        E: RecoverableFailure,
        B: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delay = self.policy.base_delay;
        let mut attempt = 1;
        loop {
            match body().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.policy.max_attempts && e.is_retryable() => {
                    tracing::warn!(attempt, error = %e, "durable mutation failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.policy.max_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Retry `body`; on success run `then` exactly once. On exhaustion,
    /// record a poison marker against `origin` and swallow the error —
    /// propagating would tear down the caller's coordinator lane.
    pub async fn run<T, E, B, Fut, Then, TFut>(&self, origin: &JobId, body: B, then: Then)
    where
        E: RecoverableFailure,
        B: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Then: FnOnce(T) -> TFut,
        TFut: Future<Output = ()>,
    {
        match self.attempt(body).await {
            Ok(value) => then(value).await,
            Err(e) => self.poison_marker(origin, &e.to_string()).await,
        }
    }

    /// Best-effort: force the job to `Poisoned` so an exhausted mutation is
    /// visible in durable state rather than lost with a log line.
    pub async fn poison_marker(&self, id: &JobId, cause: &str) {
        tracing::error!(job = %id, error = %cause, "durable mutation exhausted retries; poisoning job");
        match self.store.load(id).await {
            Ok(mut job) => {
                job.status = JobStatus::Poisoned;
                job.error = Some(cause.to_string());
                match self.store.store(&job).await {
                    Ok(()) => self.events.publish(OrchestratorEvent::Job(job.snapshot())),
                    Err(e) => {
                        tracing::error!(job = %id, error = %e, "poison marker could not be recorded");
                    }
                }
            }
            Err(e) => tracing::error!(job = %id, error = %e, "poison marker could not be recorded"),
        }
    }
}

#[cfg(test)]
#[path = "recover_tests.rs"]
mod tests;
