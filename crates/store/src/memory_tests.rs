// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use trellis_core::test_support::ready_job;
use trellis_core::JobBuilder;

#[tokio::test]
async fn store_then_load_round_trips() {
    let store = MemoryStore::new();
    let job = ready_job("orders.Invoice");

    store.store(&job).await.unwrap();
    let loaded = store.load(&job.id).await.unwrap();

    assert_eq!(loaded, job);
}

#[tokio::test]
async fn load_missing_is_not_found() {
    let store = MemoryStore::new();
    let err = store.load(&JobId::from_string("job-missing")).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn load_by_correlation_returns_the_root() {
    let store = MemoryStore::new();
    let root = ready_job("orders.Invoice");
    let child = JobBuilder::new("mail.Send").parent(root.id.clone()).build();
    // Children share the tree id; only the root should come back.
    let mut child = child;
    child.correlation_id = root.correlation_id.clone();

    store.store(&root).await.unwrap();
    store.store(&child).await.unwrap();

    let loaded = store.load_by_correlation(&root.correlation_id).await.unwrap();
    assert_eq!(loaded.id, root.id);
}

#[tokio::test]
async fn load_by_status_filters() {
    let store = MemoryStore::new();
    let ready = ready_job("a");
    let running = JobBuilder::new("b").status(JobStatus::Running).build();

    store.store(&ready).await.unwrap();
    store.store(&running).await.unwrap();

    let loaded = store.load_by_status(JobStatus::Running).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, running.id);
}

#[tokio::test]
async fn store_is_an_upsert() {
    let store = MemoryStore::new();
    let mut job = ready_job("orders.Invoice");
    store.store(&job).await.unwrap();

    job.status = JobStatus::Running;
    job.dispatch_count = 1;
    store.store(&job).await.unwrap();

    let loaded = store.load(&job.id).await.unwrap();
    assert_eq!(loaded.status, JobStatus::Running);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn store_batch_inserts_every_job() {
    let store = MemoryStore::new();
    let jobs = vec![ready_job("a"), ready_job("b"), ready_job("c")];

    store.store_batch(&jobs).await.unwrap();

    assert_eq!(store.len(), 3);
    for job in &jobs {
        assert_eq!(store.load(&job.id).await.unwrap().id, job.id);
    }
}

#[tokio::test]
async fn load_suspended_is_fifo_by_creation_and_capped() {
    let store = MemoryStore::new();
    let old = JobBuilder::new("s").suspended(true).created_ms(1_000).build();
    let mid = JobBuilder::new("s").suspended(true).created_ms(2_000).build();
    let new = JobBuilder::new("s").suspended(true).created_ms(3_000).build();
    let other = JobBuilder::new("t").suspended(true).created_ms(500).build();
    let live = JobBuilder::new("s").suspended(false).created_ms(100).build();

    for job in [&new, &old, &mid, &other, &live] {
        store.store(job).await.unwrap();
    }

    let selector = QueueSelector::Typed("s".into());
    let loaded = store.load_suspended(&selector, 2).await.unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, old.id);
    assert_eq!(loaded[1].id, mid.id);
}

#[tokio::test]
async fn default_selector_excludes_dedicated_types() {
    let store = MemoryStore::new();
    let claimed = JobBuilder::new("s").suspended(true).build();
    let unclaimed = JobBuilder::new("t").suspended(true).build();

    store.store(&claimed).await.unwrap();
    store.store(&unclaimed).await.unwrap();

    let selector = QueueSelector::Default { exclude: vec!["s".into()] };
    let loaded = store.load_suspended(&selector, 10).await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, unclaimed.id);
    assert_eq!(store.count_suspended(&selector).await.unwrap(), 1);
}

#[tokio::test]
async fn count_suspended_is_exact() {
    let store = MemoryStore::new();
    for _ in 0..3 {
        store
            .store(&JobBuilder::new("s").suspended(true).build())
            .await
            .unwrap();
    }
    store.store(&JobBuilder::new("s").build()).await.unwrap();

    let selector = QueueSelector::Typed("s".into());
    assert_eq!(store.count_suspended(&selector).await.unwrap(), 3);
}
