// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::UserActivityError;
use crate::testkit::Harness;
use std::time::Duration;
use trellis_core::{Continuation, JobBuilder};
use trellis_store::ScriptedStore;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_000_000).unwrap()
}

fn running_job(activity_type: &str) -> Job {
    JobBuilder::new(activity_type).status(JobStatus::Running).build()
}

/// Poll the store until the job reaches `status`, or give up.
async fn wait_for_status(store: &ScriptedStore, id: &trellis_core::JobId, status: JobStatus) {
    for _ in 0..200 {
        if let Ok(job) = store.load(id).await {
            if job.status == status {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("job {id} never reached {status}");
}

#[tokio::test]
async fn complete_runs_through_ready_to_complete() {
    let h = Harness::new().await;
    let job = running_job("s");
    h.store.seed(&job).await;

    let job = h.transitions.complete(job).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.store.load(&job.id).await.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn a_returned_activity_persists_children_before_the_parent_waits() {
    let h = Harness::new().await;
    let parent = running_job("p");
    h.store.seed(&parent).await;
    let parent_id = parent.id.clone();

    let activity = Activity::parallel(vec![
        Activity::call("s", "left"),
        Activity::call("s", "right"),
    ]);
    let parent = h
        .transitions
        .wait_for_children(parent, &activity, now())
        .await
        .unwrap();

    // One batch write carried both children.
    assert_eq!(h.store.store_batch_calls(), 1);
    assert_eq!(parent.status, JobStatus::WaitingForChildren);
    match parent.continuation.as_ref() {
        Some(Continuation::All { children, .. }) => assert_eq!(children.len(), 2),
        other => panic!("expected All continuation, got {other:?}"),
    }

    // Both children were readied and routed exactly once.
    let durable = h.store.load(&parent_id).await.unwrap();
    let continuation = durable.continuation.unwrap();
    assert_eq!(continuation.ready_leaves().len(), 2);
    assert_eq!(h.router.default_queue().buffered(), 2);
    let a = h.router.default_queue().read().await.unwrap();
    let b = h.router.default_queue().read().await.unwrap();
    assert_eq!(a.status, JobStatus::Ready);
    assert_eq!(b.status, JobStatus::Ready);
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn a_failed_dispatch_is_repaired_by_the_liveness_check() {
    let h = Harness::new().await;
    let parent = running_job("p");
    h.store.seed(&parent).await;

    // Plain stores during wait_for_children: #1 persists the parent's wait
    // status, #2 is the dispatcher persisting its Ready marks. Failing #2
    // kills the dispatch halfway, which must schedule a liveness pass
    // instead of undoing the durable steps.
    h.store.fail_store_window(1, 1);

    let activity = Activity::parallel(vec![
        Activity::call("s", "left"),
        Activity::call("s", "right"),
    ]);
    let parent = h
        .transitions
        .wait_for_children(parent, &activity, now())
        .await
        .unwrap();

    assert_eq!(parent.status, JobStatus::WaitingForChildren);
    let child_ids = parent.continuation.as_ref().unwrap().ready_leaves();
    assert_eq!(child_ids.len(), 2);

    // The scheduled liveness pass readies both stranded children.
    for id in &child_ids {
        wait_for_status(&h.store, id, JobStatus::Ready).await;
    }
    for _ in 0..200 {
        if h.router.default_queue().buffered() == 2 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("children were never routed");
}

#[tokio::test]
async fn an_invalid_activity_graph_fails_the_parent() {
    let h = Harness::with_configs(vec![]).await;
    let mut parent = running_job("p");
    parent.retry_count = 100; // no budget left: straight to poison
    h.store.seed(&parent).await;

    let parent = h
        .transitions
        .wait_for_children(parent, &Activity::parallel(vec![]), now())
        .await
        .unwrap();

    assert_eq!(parent.status, JobStatus::Poisoned);
    assert!(parent.error.as_deref().unwrap_or("").contains("empty"));
}

#[tokio::test]
async fn failure_with_budget_requeues_after_the_delay() {
    let configs = vec![ActivityConfig::for_type("s")
        .max_queue_length(4)
        .max_retries(2)
        .retry_delay(Duration::from_millis(5))];
    let h = Harness::with_configs(configs).await;
    let job = running_job("s");
    h.store.seed(&job).await;

    let job = h
        .transitions
        .fail(job, &UserActivityError::new("boom"))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Ready);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.error.as_deref(), Some("boom"));
    assert_eq!(h.router.queue_for(&"s".into()).buffered(), 1);
}

#[tokio::test]
async fn failure_without_budget_poisons() {
    let configs = vec![ActivityConfig::for_type("s").max_retries(1)];
    let h = Harness::with_configs(configs).await;
    let mut job = running_job("s");
    job.retry_count = 1;
    h.store.seed(&job).await;

    let job = h
        .transitions
        .fail(job, &UserActivityError::new("boom"))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Poisoned);
    assert_eq!(h.router.queue_for(&"s".into()).buffered(), 0);
}

#[tokio::test]
async fn poison_retries_grant_a_fresh_round() {
    let configs = vec![ActivityConfig::for_type("s")
        .max_queue_length(4)
        .max_retries(1)
        .retry_delay(Duration::from_millis(1))
        .max_poison_retries(1)];
    let h = Harness::with_configs(configs).await;
    let mut job = running_job("s");
    job.retry_count = 1; // ordinary budget spent
    h.store.seed(&job).await;

    let job = h
        .transitions
        .fail(job, &UserActivityError::new("boom"))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Ready);
    assert_eq!(job.poison_retry_count, 1);
    assert_eq!(job.retry_count, 1, "fresh round consumed its first retry");
}

#[tokio::test]
async fn a_completed_child_completes_its_waiting_parent() {
    let h = Harness::new().await;
    let mut child = running_job("s");
    let parent = JobBuilder::new("p")
        .status(JobStatus::WaitingForChildren)
        .continuation(Continuation::all(
            vec![Continuation::single(child.id.clone())],
            false,
        ))
        .build();
    child.parent_id = Some(parent.id.clone());
    {
        let mut parent = parent.clone();
        parent.continuation.as_mut().unwrap().mark_ready(&child.id);
        h.store.seed(&parent).await;
    }
    h.store.seed(&child).await;

    h.transitions.complete(child.clone()).await.unwrap();

    // The notification rides the parent's coordinator lane.
    wait_for_status(&h.store, &parent.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn a_poisoned_child_poisons_a_fail_fast_parent() {
    let h = Harness::new().await;
    let mut child = running_job("s");
    child.retry_count = 100;
    let parent = JobBuilder::new("p")
        .status(JobStatus::WaitingForChildren)
        .continuation(Continuation::all(
            vec![Continuation::single(child.id.clone())],
            true,
        ))
        .build();
    child.parent_id = Some(parent.id.clone());
    {
        let mut parent = parent.clone();
        parent.continuation.as_mut().unwrap().mark_ready(&child.id);
        h.store.seed(&parent).await;
    }
    h.store.seed(&child).await;

    h.transitions
        .fail(child, &UserActivityError::new("boom"))
        .await
        .unwrap();

    wait_for_status(&h.store, &parent.id, JobStatus::Poisoned).await;
}

#[tokio::test]
async fn grandparents_hear_about_cascaded_completions() {
    let h = Harness::new().await;
    // root waits on mid; mid waits on leaf.
    let mut leaf = running_job("s");
    let mut mid = JobBuilder::new("m").status(JobStatus::WaitingForChildren).build();
    let root = JobBuilder::new("r").status(JobStatus::WaitingForChildren).build();

    mid.parent_id = Some(root.id.clone());
    leaf.parent_id = Some(mid.id.clone());

    let mut mid_tree = Continuation::single(leaf.id.clone());
    mid_tree.mark_ready(&leaf.id);
    mid.continuation = Some(mid_tree);

    let mut root_tree = Continuation::single(mid.id.clone());
    root_tree.mark_ready(&mid.id);
    let mut root = root;
    root.continuation = Some(root_tree);

    for job in [&leaf, &mid, &root] {
        h.store.seed(job).await;
    }

    h.transitions.complete(leaf).await.unwrap();

    wait_for_status(&h.store, &mid.id, JobStatus::Completed).await;
    wait_for_status(&h.store, &root.id, JobStatus::Completed).await;
}
