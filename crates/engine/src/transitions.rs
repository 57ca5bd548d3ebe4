// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle transitions: completion, failure, poisoning, and the hand-off
//! to a continuation wait.

use crate::convert::ActivityConverter;
use crate::coordinator::JobCoordinator;
use crate::dispatch::{ContinuationDispatcher, ParentProgress};
use crate::liveness::ContinuationLiveness;
use crate::mutator::JobMutator;
use crate::recover::RecoverableAction;
use crate::router::JobRouter;
use crate::runtime::UserActivityError;
use crate::EngineError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use trellis_core::{Activity, ActivityConfig, ActivityType, Job, JobStatus};
use trellis_store::JobStore;

/// Retry policy lookup by activity type, falling back to the default
/// queue's policy.
pub struct PolicySet {
    by_type: HashMap<ActivityType, ActivityConfig>,
    default: ActivityConfig,
}

impl PolicySet {
    pub fn new(configs: Vec<ActivityConfig>, default: ActivityConfig) -> Self {
        let by_type = configs
            .into_iter()
            .filter_map(|c| c.activity_type.clone().map(|t| (t, c)))
            .collect();
        Self { by_type, default }
    }

    pub fn for_type(&self, activity_type: &ActivityType) -> &ActivityConfig {
        self.by_type.get(activity_type).unwrap_or(&self.default)
    }
}

/// The state-machine edges.
///
/// Every edge persists through the mutator; callbacks that touch a second
/// job (the parent) go through that job's coordinator lane. No error leaves
/// a transition to kill a worker: callers fold the returned error into job
/// state.
pub struct Transitions {
    store: Arc<dyn JobStore>,
    mutator: JobMutator,
    dispatcher: ContinuationDispatcher,
    liveness: ContinuationLiveness,
    coordinator: JobCoordinator,
    recovery: RecoverableAction,
    router: Arc<JobRouter>,
    policies: PolicySet,
}

impl Transitions {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        mutator: JobMutator,
        dispatcher: ContinuationDispatcher,
        liveness: ContinuationLiveness,
        coordinator: JobCoordinator,
        recovery: RecoverableAction,
        router: Arc<JobRouter>,
        policies: PolicySet,
    ) -> Self {
        Self {
            store,
            mutator,
            dispatcher,
            liveness,
            coordinator,
            recovery,
            router,
            policies,
        }
    }

    /// A running job returned a value: Running -> ReadyToComplete ->
    /// Completed, then the parent (if any) hears about it.
    pub async fn complete(self: &Arc<Self>, job: Job) -> Result<Job, EngineError> {
        let job = self
            .mutator
            .set_status(job, JobStatus::ReadyToComplete)
            .await?;
        self.seal(job).await
    }

    /// ReadyToComplete -> Completed plus parent notification. Also drives
    /// jobs found in `ReadyToComplete` at boot.
    pub async fn seal(self: &Arc<Self>, job: Job) -> Result<Job, EngineError> {
        let job = self.mutator.set_status(job, JobStatus::Completed).await?;
        self.notify_parent(&job, true);
        Ok(job)
    }

    /// A running job's user code failed: consume a retry and requeue, or
    /// give up and poison.
    pub async fn fail(
        self: &Arc<Self>,
        job: Job,
        error: &UserActivityError,
    ) -> Result<Job, EngineError> {
        let policy = self.policies.for_type(&job.activity_type);
        let mut budget_left = job.retry_count < policy.max_retries;
        let mut job = job;
        if !budget_left && job.poison_retry_count < policy.max_poison_retries {
            // Spend a poison retry: a fresh round of ordinary retries.
            job.poison_retry_count += 1;
            job.retry_count = 0;
            budget_left = true;
        }
        if budget_left {
            let delay = policy.retry_delay;
            let job = self
                .mutator
                .record_failure(job, &error.message, delay.as_millis() as u64)
                .await?;
            // The delay rides the job's coordinator lane, so a crashed
            // process simply retries early after the boot scan.
            tokio::time::sleep(delay).await;
            let job = self.mutator.set_status(job, JobStatus::Ready).await?;
            self.router.route(job.clone()).await?;
            Ok(job)
        } else {
            let mut job = job;
            job.error = Some(error.message.clone());
            let job = self
                .mutator
                .set_status(job, JobStatus::ReadyToPoison)
                .await?;
            self.poison(job).await
        }
    }

    /// ReadyToPoison -> Poisoned plus parent notification. Also drives jobs
    /// found in `ReadyToPoison` at boot.
    pub async fn poison(self: &Arc<Self>, job: Job) -> Result<Job, EngineError> {
        let job = self.mutator.set_status(job, JobStatus::Poisoned).await?;
        self.notify_parent(&job, false);
        Ok(job)
    }

    /// A running job returned an activity graph: persist the children,
    /// attach the wait tree, and dispatch the first wave.
    pub async fn wait_for_children(
        self: &Arc<Self>,
        job: Job,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<Job, EngineError> {
        let converted = match ActivityConverter::convert(&job, activity, now) {
            Ok(converted) => converted,
            // A bad graph is the user activity's failure, not the engine's.
            Err(e) => {
                return self
                    .fail(job, &UserActivityError::new(e.to_string()))
                    .await;
            }
        };

        // Children must be durable before any of them becomes visible.
        {
            let store = Arc::clone(&self.store);
            let jobs = converted.jobs.clone();
            self.recovery
                .attempt(move || {
                    let store = Arc::clone(&store);
                    let jobs = jobs.clone();
                    async move { store.store_batch(&jobs).await }
                })
                .await?;
        }

        let mut parent = self
            .mutator
            .wait_for_children(job, converted.continuation.clone())
            .await?;

        if let Err(e) = self
            .dispatcher
            .dispatch_with(&mut parent, &converted.jobs)
            .await
        {
            // Prior steps are durable; a liveness pass finishes the job of
            // a dispatch that died halfway instead of undoing them.
            tracing::warn!(job = %parent.id, error = %e, "child dispatch failed; scheduling liveness check");
            self.schedule_liveness(parent.id.clone());
        }
        Ok(parent)
    }

    /// Boot pass for jobs found `Failed`: resume the retry loop right away
    /// (the delay is not persisted), or poison when the budget is gone.
    pub async fn resume_failed(self: &Arc<Self>, job: Job) -> Result<(), EngineError> {
        let policy = self.policies.for_type(&job.activity_type);
        let budget_left = job.retry_count < policy.max_retries
            || job.poison_retry_count < policy.max_poison_retries;
        if budget_left {
            let job = self.mutator.set_status(job, JobStatus::Ready).await?;
            self.router.route(job).await?;
        } else {
            let job = self
                .mutator
                .set_status(job, JobStatus::ReadyToPoison)
                .await?;
            self.poison(job).await?;
        }
        Ok(())
    }

    /// Queue a liveness verification on the parent's coordinator lane.
    pub fn schedule_liveness(self: &Arc<Self>, parent_id: trellis_core::JobId) {
        let this = Arc::clone(self);
        let id = parent_id.clone();
        self.coordinator.run(&parent_id, async move {
            match this.liveness.verify(&id).await {
                Ok(progress) => Arc::clone(&this).apply_boxed(progress).await,
                Err(e) => tracing::error!(job = %id, error = %e, "liveness verification failed"),
            }
        });
    }

    /// Tell the parent's continuation that `child` reached a terminal
    /// state. Runs on the parent's coordinator lane.
    fn notify_parent(self: &Arc<Self>, child: &Job, completed: bool) {
        let Some(parent_id) = child.parent_id.clone() else {
            return;
        };
        let this = Arc::clone(self);
        let child_id = child.id.clone();
        let lane_id = parent_id.clone();
        self.coordinator.run(&lane_id, async move {
            match this
                .dispatcher
                .on_child_terminal(&parent_id, &child_id, completed)
                .await
            {
                Ok(progress) => Arc::clone(&this).apply_boxed(progress).await,
                Err(e) => {
                    tracing::error!(parent = %parent_id, child = %child_id, error = %e, "continuation update failed");
                    // Self-heal: reconcile from durable state later.
                    this.schedule_liveness(parent_id.clone());
                }
            }
        });
    }

    /// Finish whatever a continuation update decided. Boxed to break the
    /// async recursion through parent notification.
    fn apply_boxed(
        self: Arc<Self>,
        progress: ParentProgress,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        Box::pin(async move {
            let result = match progress {
                ParentProgress::Satisfied(parent) => self.seal(parent).await.map(drop),
                ParentProgress::FailedWait(parent) => self.poison(parent).await.map(drop),
                ParentProgress::Advanced(_) | ParentProgress::Unchanged => Ok(()),
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "parent transition failed");
            }
        })
    }
}

#[cfg(test)]
#[path = "transitions_tests.rs"]
mod tests;
