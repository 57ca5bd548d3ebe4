// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator façade: wiring, submission, worker loops, boot recovery.

use crate::coordinator::JobCoordinator;
use crate::dispatch::ContinuationDispatcher;
use crate::liveness::ContinuationLiveness;
use crate::mutator::JobMutator;
use crate::queue::{JobQueue, QueueError};
use crate::recover::{RecoverableAction, RecoveryPolicy};
use crate::router::JobRouter;
use crate::runtime::{ActivityRuntime, ExecutionOutcome};
use crate::transitions::{PolicySet, Transitions};
use crate::EngineError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use trellis_core::{
    ActivityConfig, Activity, Clock, EventStream, Job, JobId, JobStatus, SystemClock,
};
use trellis_store::JobStore;

/// Builds an [`Orchestrator`] from its collaborators.
pub struct OrchestratorBuilder {
    store: Arc<dyn JobStore>,
    runtime: Arc<dyn ActivityRuntime>,
    configs: Vec<ActivityConfig>,
    default_config: ActivityConfig,
    workers_per_queue: usize,
    recovery_policy: RecoveryPolicy,
    event_capacity: usize,
    clock: Arc<dyn Clock>,
}

impl OrchestratorBuilder {
    pub fn new(store: Arc<dyn JobStore>, runtime: Arc<dyn ActivityRuntime>) -> Self {
        Self {
            store,
            runtime,
            configs: Vec::new(),
            default_config: ActivityConfig::default_queue(),
            workers_per_queue: 1,
            recovery_policy: RecoveryPolicy::default(),
            event_capacity: 256,
            clock: Arc::new(SystemClock),
        }
    }

    /// Register a dedicated queue. Configs without an activity type are
    /// ignored; use [`default_queue`](Self::default_queue) for that policy.
    pub fn activity(mut self, config: ActivityConfig) -> Self {
        if config.activity_type.is_some() {
            self.configs.push(config);
        }
        self
    }

    /// Retry policy for everything without a dedicated queue.
    pub fn default_queue(mut self, config: ActivityConfig) -> Self {
        if config.is_default_queue() {
            self.default_config = config;
        }
        self
    }

    pub fn workers_per_queue(mut self, n: usize) -> Self {
        self.workers_per_queue = n.max(1);
        self
    }

    pub fn recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery_policy = policy;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Orchestrator {
        let events = EventStream::new(self.event_capacity);
        let recovery = RecoverableAction::new(
            Arc::clone(&self.store),
            events.clone(),
            self.recovery_policy,
        );
        let mutator = JobMutator::new(Arc::clone(&self.store), events.clone(), recovery.clone());
        let coordinator = JobCoordinator::new();

        let mut queues = HashMap::new();
        let mut exclude = Vec::new();
        for config in &self.configs {
            if let Some(activity_type) = config.activity_type.clone() {
                exclude.push(activity_type.clone());
                queues.insert(
                    activity_type,
                    Arc::new(JobQueue::new(
                        config.clone(),
                        Arc::clone(&self.store),
                        events.clone(),
                    )),
                );
            }
        }
        let default_queue = Arc::new(
            JobQueue::new(
                self.default_config.clone(),
                Arc::clone(&self.store),
                events.clone(),
            )
            .with_excluded(exclude),
        );
        let router = Arc::new(JobRouter::new(queues, default_queue));

        let dispatcher = ContinuationDispatcher::new(
            Arc::clone(&self.store),
            mutator.clone(),
            recovery.clone(),
            Arc::clone(&router),
        );
        let liveness = ContinuationLiveness::new(Arc::clone(&self.store), dispatcher.clone());
        let policies = PolicySet::new(self.configs, self.default_config);
        let transitions = Arc::new(Transitions::new(
            Arc::clone(&self.store),
            mutator.clone(),
            dispatcher,
            liveness,
            coordinator.clone(),
            recovery.clone(),
            Arc::clone(&router),
            policies,
        ));

        Orchestrator {
            worker: Arc::new(Worker {
                runtime: self.runtime,
                mutator,
                transitions,
                coordinator,
                recovery,
                clock: Arc::clone(&self.clock),
            }),
            store: self.store,
            router,
            events,
            clock: self.clock,
            workers_per_queue: self.workers_per_queue,
            handles: Mutex::new(Vec::new()),
        }
    }
}

/// Shared context of the scheduler workers.
struct Worker {
    runtime: Arc<dyn ActivityRuntime>,
    mutator: JobMutator,
    transitions: Arc<Transitions>,
    coordinator: JobCoordinator,
    recovery: RecoverableAction,
    clock: Arc<dyn Clock>,
}

impl Worker {
    /// Run one job to its next settled state, serialized on its lane.
    async fn drive(self: &Arc<Self>, job: Job) {
        let (done_tx, done_rx) = oneshot::channel();
        let this = Arc::clone(self);
        let lane = job.id.clone();
        self.coordinator.run(&lane, async move {
            this.process(job).await;
            let _ = done_tx.send(());
        });
        let _ = done_rx.await;
    }

    async fn process(&self, job: Job) {
        let id = job.id.clone();
        let job = match self.mutator.begin_dispatch(job).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job = %id, error = %e, "dispatch bookkeeping failed");
                return;
            }
        };

        let outcome = self.runtime.execute(&job).await;
        let result = match outcome {
            ExecutionOutcome::Value(_) => self.transitions.complete(job).await.map(drop),
            ExecutionOutcome::Activity(activity) => self
                .transitions
                .wait_for_children(job, &activity, self.clock.now_utc())
                .await
                .map(drop),
            ExecutionOutcome::Error(e) => self.transitions.fail(job, &e).await.map(drop),
        };

        // Nothing escapes a worker: an exhausted transition leaves a
        // durable poison marker instead of a crashed thread.
        if let Err(e) = result {
            tracing::error!(job = %id, error = %e, "transition failed; recording poison marker");
            self.recovery.poison_marker(&id, &e.to_string()).await;
        }
    }
}

/// Durable in-process job orchestrator.
///
/// `submit` persists a root job and routes it; worker loops read from the
/// per-type queues, execute through the [`ActivityRuntime`], and drive the
/// lifecycle transitions. `start` reloads durable state after a restart.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    router: Arc<JobRouter>,
    worker: Arc<Worker>,
    events: EventStream,
    clock: Arc<dyn Clock>,
    workers_per_queue: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn builder(
        store: Arc<dyn JobStore>,
        runtime: Arc<dyn ActivityRuntime>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(store, runtime)
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    /// Persist a root job for `activity` and hand it to its queue.
    ///
    /// Only a single call can be submitted; compositions come from the
    /// activities user code returns.
    pub async fn submit(&self, activity: Activity) -> Result<JobId, EngineError> {
        let Activity::Call {
            activity_type,
            method,
            arguments,
        } = activity
        else {
            return Err(EngineError::Converter(crate::convert::ConvertError(
                "root submission must be a single call".into(),
            )));
        };
        let job = Job::root(activity_type, method, arguments, self.clock.now_utc());
        self.store.store(&job).await?;
        let job = self
            .worker
            .mutator
            .set_status(job, JobStatus::Ready)
            .await?;
        let id = job.id.clone();
        self.router.route(job).await?;
        Ok(id)
    }

    /// Boot: reload durable state, initialize every queue exactly once,
    /// spawn the worker loops, and reconcile interrupted work.
    pub async fn start(&self) -> Result<(), EngineError> {
        // Ready jobs re-enter their buffers; Running jobs died mid-flight
        // and are redelivered (at-least-once).
        let mut candidates = Vec::new();
        for job in self.store.load_by_status(JobStatus::Ready).await? {
            if !job.suspended {
                candidates.push(job);
            }
        }
        for mut job in self.store.load_by_status(JobStatus::Running).await? {
            job.status = JobStatus::Ready;
            // Boot-only demotion; not a graph edge, so it skips the mutator.
            self.store.store(&job).await?;
            candidates.push(job);
        }

        // Dedicated queues claim their share first; the default queue takes
        // the remainder.
        let mut rest = candidates;
        for queue in self.router.all_queues() {
            rest = queue.initialize(rest).await?;
        }
        if !rest.is_empty() {
            tracing::warn!(count = rest.len(), "boot candidates claimed by no queue");
        }

        for queue in self.router.all_queues() {
            for _ in 0..self.workers_per_queue {
                let queue = Arc::clone(&queue);
                let worker = Arc::clone(&self.worker);
                let handle = tokio::spawn(async move {
                    loop {
                        match queue.read().await {
                            Ok(job) => worker.drive(job).await,
                            Err(QueueError::Shutdown) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "queue read failed; stopping worker");
                                break;
                            }
                        }
                    }
                });
                self.handles.lock().push(handle);
            }
        }

        // Waiting parents may have missed child results while we were down.
        for parent in self
            .store
            .load_by_status(JobStatus::WaitingForChildren)
            .await?
        {
            self.worker.transitions.schedule_liveness(parent.id);
        }

        // Failed jobs resume their retry loop; the delay is not replayed.
        for job in self.store.load_by_status(JobStatus::Failed).await? {
            let transitions = Arc::clone(&self.worker.transitions);
            let lane = job.id.clone();
            self.worker.coordinator.run(&lane, async move {
                if let Err(e) = transitions.resume_failed(job).await {
                    tracing::error!(error = %e, "boot retry resume failed");
                }
            });
        }

        // Jobs caught between a verdict and its terminal state.
        for job in self.store.load_by_status(JobStatus::ReadyToComplete).await? {
            let transitions = Arc::clone(&self.worker.transitions);
            let lane = job.id.clone();
            self.worker.coordinator.run(&lane, async move {
                if let Err(e) = transitions.seal(job).await {
                    tracing::error!(error = %e, "boot completion failed");
                }
            });
        }
        for job in self.store.load_by_status(JobStatus::ReadyToPoison).await? {
            let transitions = Arc::clone(&self.worker.transitions);
            let lane = job.id.clone();
            self.worker.coordinator.run(&lane, async move {
                if let Err(e) = transitions.poison(job).await {
                    tracing::error!(error = %e, "boot poisoning failed");
                }
            });
        }

        Ok(())
    }

    /// Release parked readers and wait for the worker loops to drain.
    pub async fn shutdown(&self) {
        for queue in self.router.all_queues() {
            queue.shutdown();
        }
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
