// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::UserActivityError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap as StdHashMap;
use std::time::Duration;
use trellis_core::JobBuilder;
use trellis_store::MemoryStore;

/// Runtime double: maps `method` to a scripted outcome; unknown methods
/// return a null value.
#[derive(Default)]
struct ScriptedRuntime {
    outcomes: Mutex<StdHashMap<String, Vec<ExecutionOutcome>>>,
}

impl ScriptedRuntime {
    fn on(&self, method: &str, outcome: ExecutionOutcome) {
        self.outcomes
            .lock()
            .entry(method.to_string())
            .or_default()
            .push(outcome);
    }
}

#[async_trait]
impl ActivityRuntime for ScriptedRuntime {
    async fn execute(&self, job: &Job) -> ExecutionOutcome {
        let mut outcomes = self.outcomes.lock();
        match outcomes.get_mut(&job.method) {
            Some(scripted) if !scripted.is_empty() => scripted.remove(0),
            _ => ExecutionOutcome::Value(json!(null)),
        }
    }
}

async fn wait_for_status(store: &Arc<MemoryStore>, id: &JobId, status: JobStatus) -> Job {
    for _ in 0..500 {
        if let Ok(job) = store.load(id).await {
            if job.status == status {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("job {id} never reached {status}");
}

fn orchestrator(
    store: &Arc<MemoryStore>,
    runtime: Arc<ScriptedRuntime>,
) -> Orchestrator {
    let dyn_store: Arc<dyn JobStore> = store.clone();
    Orchestrator::builder(dyn_store, runtime)
        .activity(
            ActivityConfig::for_type("s")
                .max_queue_length(4)
                .retry_delay(Duration::from_millis(2)),
        )
        .build()
}

#[tokio::test]
async fn submit_persists_routes_and_completes_a_root_job() {
    let store = Arc::new(MemoryStore::new());
    let runtime = Arc::new(ScriptedRuntime::default());
    let orch = orchestrator(&store, Arc::clone(&runtime));
    orch.start().await.unwrap();

    let id = orch.submit(Activity::call("s", "run")).await.unwrap();

    let job = wait_for_status(&store, &id, JobStatus::Completed).await;
    assert_eq!(job.dispatch_count, 1);
    orch.shutdown().await;
}

#[tokio::test]
async fn composite_submissions_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(&store, Arc::new(ScriptedRuntime::default()));
    orch.start().await.unwrap();

    let result = orch
        .submit(Activity::parallel(vec![Activity::call("s", "run")]))
        .await;

    assert!(result.is_err());
    orch.shutdown().await;
}

#[tokio::test]
async fn a_failing_activity_retries_then_poisons() {
    let store = Arc::new(MemoryStore::new());
    let runtime = Arc::new(ScriptedRuntime::default());
    // max_retries defaults to 3: four dispatches total, all failing.
    for _ in 0..4 {
        runtime.on("explode", ExecutionOutcome::Error(UserActivityError::new("kaboom")));
    }
    let orch = orchestrator(&store, Arc::clone(&runtime));
    orch.start().await.unwrap();

    let id = orch.submit(Activity::call("s", "explode")).await.unwrap();

    let job = wait_for_status(&store, &id, JobStatus::Poisoned).await;
    assert_eq!(job.retry_count, 3);
    assert_eq!(job.dispatch_count, 4);
    assert_eq!(job.error.as_deref(), Some("kaboom"));
    orch.shutdown().await;
}

#[tokio::test]
async fn a_parent_blocks_on_children_and_resumes() {
    let store = Arc::new(MemoryStore::new());
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.on(
        "fan_out",
        ExecutionOutcome::Activity(Activity::parallel(vec![
            Activity::call("s", "left"),
            Activity::call("s", "right"),
        ])),
    );
    let orch = orchestrator(&store, Arc::clone(&runtime));
    orch.start().await.unwrap();

    let id = orch.submit(Activity::call("s", "fan_out")).await.unwrap();

    let parent = wait_for_status(&store, &id, JobStatus::Completed).await;
    assert!(parent.continuation.unwrap().is_satisfied());

    // Both children ran to completion under the parent's correlation.
    let done = store.load_by_status(JobStatus::Completed).await.unwrap();
    assert_eq!(done.len(), 3);
    assert!(done.iter().all(|j| j.correlation_id == parent.correlation_id));
    orch.shutdown().await;
}

#[tokio::test]
async fn start_requeues_jobs_found_ready_or_running() {
    let store = Arc::new(MemoryStore::new());
    // A crash left one job Ready and one Running.
    let ready = JobBuilder::new("s").build();
    let running = JobBuilder::new("s").status(JobStatus::Running).build();
    store.store(&ready).await.unwrap();
    store.store(&running).await.unwrap();

    let orch = orchestrator(&store, Arc::new(ScriptedRuntime::default()));
    orch.start().await.unwrap();

    wait_for_status(&store, &ready.id, JobStatus::Completed).await;
    let redone = wait_for_status(&store, &running.id, JobStatus::Completed).await;
    assert!(redone.dispatch_count >= 1);
    orch.shutdown().await;
}

#[tokio::test]
async fn start_resumes_failed_jobs_with_retry_budget() {
    let store = Arc::new(MemoryStore::new());
    let with_budget = JobBuilder::new("s").status(JobStatus::Failed).retry_count(1).build();
    let spent = JobBuilder::new("s").status(JobStatus::Failed).retry_count(99).build();
    store.store(&with_budget).await.unwrap();
    store.store(&spent).await.unwrap();

    let orch = orchestrator(&store, Arc::new(ScriptedRuntime::default()));
    orch.start().await.unwrap();

    wait_for_status(&store, &with_budget.id, JobStatus::Completed).await;
    wait_for_status(&store, &spent.id, JobStatus::Poisoned).await;
    orch.shutdown().await;
}

#[tokio::test]
async fn start_finishes_jobs_caught_between_verdict_and_terminal_state() {
    let store = Arc::new(MemoryStore::new());
    let completing = JobBuilder::new("s").status(JobStatus::ReadyToComplete).build();
    let poisoning = JobBuilder::new("s").status(JobStatus::ReadyToPoison).build();
    store.store(&completing).await.unwrap();
    store.store(&poisoning).await.unwrap();

    let orch = orchestrator(&store, Arc::new(ScriptedRuntime::default()));
    orch.start().await.unwrap();

    wait_for_status(&store, &completing.id, JobStatus::Completed).await;
    wait_for_status(&store, &poisoning.id, JobStatus::Poisoned).await;
    orch.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_workers() {
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(&store, Arc::new(ScriptedRuntime::default()));
    orch.start().await.unwrap();

    // Must return promptly even with idle parked workers.
    tokio::time::timeout(Duration::from_secs(2), orch.shutdown())
        .await
        .expect("shutdown hung");
}
