// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery for parents stuck after a partial dispatch failure.

use crate::dispatch::{ContinuationDispatcher, ParentProgress};
use crate::EngineError;
use std::sync::Arc;
use trellis_core::{JobId, JobStatus};
use trellis_store::{JobStore, StoreError};

/// Reconciles a waiting parent against durable child state.
///
/// After a crash or a failed dispatch, a continuation can hold leaves
/// already marked `Ready` whose children never ran, or whose children
/// finished without the parent hearing about it. `verify` repairs both.
#[derive(Clone)]
pub struct ContinuationLiveness {
    store: Arc<dyn JobStore>,
    dispatcher: ContinuationDispatcher,
}

impl ContinuationLiveness {
    pub fn new(store: Arc<dyn JobStore>, dispatcher: ContinuationDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Reload the parent, fold in any terminal children its continuation
    /// missed, re-route children that were marked ready but never left
    /// `Created`, and classify how the parent should proceed.
    pub async fn verify(&self, parent_id: &JobId) -> Result<ParentProgress, EngineError> {
        let mut parent = match self.store.load(parent_id).await {
            Ok(parent) => parent,
            Err(StoreError::NotFound(_)) => return Ok(ParentProgress::Unchanged),
            Err(e) => return Err(e.into()),
        };
        if parent.status != JobStatus::WaitingForChildren {
            return Ok(ParentProgress::Unchanged);
        }
        let Some(continuation) = parent.continuation.as_mut() else {
            return Ok(ParentProgress::Unchanged);
        };

        let mut stuck = Vec::new();
        for leaf_id in continuation.ready_leaves() {
            match self.store.load(&leaf_id).await {
                Ok(child) if child.status.is_terminal() => {
                    continuation
                        .record_child(&leaf_id, child.status == JobStatus::Completed);
                }
                // Marked ready but never routed: the dispatch died between
                // persisting the parent and readying the child.
                Ok(child) if child.status == JobStatus::Created => stuck.push(child),
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    // The referenced child can never finish; fail the leaf
                    // so the wait resolves instead of hanging forever.
                    tracing::warn!(parent = %parent_id, child = %leaf_id, "waited child missing from store");
                    continuation.record_child(&leaf_id, false);
                }
                Err(e) => return Err(e.into()),
            }
        }

        for child in stuck {
            self.dispatcher.ready_and_route(child).await;
        }

        self.dispatcher.settle(parent).await
    }
}

#[cfg(test)]
#[path = "liveness_tests.rs"]
mod tests;
