// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advances a parent's continuation tree and schedules its children.

use crate::mutator::JobMutator;
use crate::recover::RecoverableAction;
use crate::router::JobRouter;
use crate::EngineError;
use std::sync::Arc;
use trellis_core::{Job, JobId, JobStatus};
use trellis_store::{JobStore, StoreError};

/// How a parent moved after its continuation changed.
#[derive(Debug)]
pub enum ParentProgress {
    /// Parent was not waiting, or the child was unknown; nothing changed.
    Unchanged,
    /// The wait is satisfied; the parent is now `ReadyToComplete`.
    Satisfied(Job),
    /// The wait failed under policy; the parent is now `ReadyToPoison`.
    FailedWait(Job),
    /// More children were dispatched; the parent keeps waiting.
    Advanced(Job),
}

/// Walks continuation trees, marks pending leaves ready, and routes their
/// referenced children.
#[derive(Clone)]
pub struct ContinuationDispatcher {
    store: Arc<dyn JobStore>,
    mutator: JobMutator,
    recovery: RecoverableAction,
    router: Arc<JobRouter>,
}

impl ContinuationDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        mutator: JobMutator,
        recovery: RecoverableAction,
        router: Arc<JobRouter>,
    ) -> Self {
        Self {
            store,
            mutator,
            recovery,
            router,
        }
    }

    /// Dispatch the parent's pending leaves, loading children from the
    /// store. Returns the readied leaf ids in declaration order.
    pub async fn dispatch(&self, parent: &mut Job) -> Result<Vec<JobId>, EngineError> {
        self.dispatch_inner(parent, None).await
    }

    /// Variant primed with freshly created children, avoiding the store
    /// round-trip per child.
    pub async fn dispatch_with(
        &self,
        parent: &mut Job,
        new_jobs: &[Job],
    ) -> Result<Vec<JobId>, EngineError> {
        self.dispatch_inner(parent, Some(new_jobs)).await
    }

    async fn dispatch_inner(
        &self,
        parent: &mut Job,
        primed: Option<&[Job]>,
    ) -> Result<Vec<JobId>, EngineError> {
        let Some(continuation) = parent.continuation.as_mut() else {
            return Ok(Vec::new());
        };
        let pending = continuation.pending();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        for id in &pending {
            continuation.mark_ready(id);
        }
        // The continuation is part of the parent's durable record; persist
        // the Ready marks before any child becomes runnable.
        self.store.store(parent).await.map_err(EngineError::from)?;

        let mut readied = Vec::new();
        for id in pending {
            let candidate = match primed {
                Some(jobs) => jobs.iter().find(|j| j.id == id).cloned(),
                None => match self.store.load(&id).await {
                    Ok(job) => Some(job),
                    Err(StoreError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                },
            };
            // Only `Created` children are candidates; anything further
            // along was dispatched by an earlier invocation.
            let Some(child) = candidate.filter(|j| j.status == JobStatus::Created) else {
                continue;
            };
            self.ready_and_route(child).await;
            readied.push(id);
        }
        Ok(readied)
    }

    /// Created -> Ready (persisted, retried), then hand the child to the
    /// router. The routing side effect runs at most once, only after the
    /// status change is durable.
    pub(crate) async fn ready_and_route(&self, child: Job) {
        let child_id = child.id.clone();
        let log_id = child_id.clone();
        let mutator = self.mutator.clone();
        let router = Arc::clone(&self.router);
        self.recovery
            .run(
                &child_id,
                move || {
                    let mutator = mutator.clone();
                    let child = child.clone();
                    async move { mutator.set_status(child, JobStatus::Ready).await }
                },
                |ready| async move {
                    if let Err(e) = router.route(ready).await {
                        tracing::error!(job = %log_id, error = %e, "readied child could not be routed");
                    }
                },
            )
            .await;
    }

    /// Serialized on the parent's coordinator lane: fold a child's terminal
    /// result into the parent's continuation and classify what comes next.
    pub async fn on_child_terminal(
        &self,
        parent_id: &JobId,
        child_id: &JobId,
        completed: bool,
    ) -> Result<ParentProgress, EngineError> {
        let mut parent = match self.store.load(parent_id).await {
            Ok(parent) => parent,
            // Parent already gone; the notification is stale.
            Err(StoreError::NotFound(_)) => return Ok(ParentProgress::Unchanged),
            Err(e) => return Err(e.into()),
        };
        if parent.status != JobStatus::WaitingForChildren {
            return Ok(ParentProgress::Unchanged);
        }
        let Some(continuation) = parent.continuation.as_mut() else {
            return Ok(ParentProgress::Unchanged);
        };
        if !continuation.record_child(child_id, completed) {
            return Ok(ParentProgress::Unchanged);
        }
        self.settle(parent).await
    }

    /// Persist the parent's continuation state and translate it into
    /// progress: satisfied -> `ReadyToComplete`, failed -> `ReadyToPoison`,
    /// otherwise dispatch whatever became pending (sequence advance).
    pub async fn settle(&self, parent: Job) -> Result<ParentProgress, EngineError> {
        let Some(continuation) = parent.continuation.as_ref() else {
            return Ok(ParentProgress::Unchanged);
        };
        if continuation.is_satisfied() {
            let parent = self
                .mutator
                .set_status(parent, JobStatus::ReadyToComplete)
                .await?;
            Ok(ParentProgress::Satisfied(parent))
        } else if continuation.is_failed() {
            let parent = self
                .mutator
                .set_status(parent, JobStatus::ReadyToPoison)
                .await?;
            Ok(ParentProgress::FailedWait(parent))
        } else {
            let mut parent = self.mutator.update_continuation(parent).await?;
            self.dispatch(&mut parent).await?;
            Ok(ParentProgress::Advanced(parent))
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
