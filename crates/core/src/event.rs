// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fire-and-forget event stream for orchestrator observers.

use crate::id::JobId;
use crate::job::JobSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Advisory events. Consumers may lag; lagged events are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A job mutation was persisted.
    Job(JobSnapshot),
    /// A suspended-spill store write failed and was swallowed. The durable
    /// record may carry a stale `suspended` flag until the next boot scan
    /// picks the job up again.
    StoreDrift { id: JobId },
}

/// Broadcast publication surface with no backpressure.
///
/// Publishing never blocks and never fails; with no subscribers the event
/// is simply discarded.
#[derive(Clone)]
pub struct EventStream {
    tx: broadcast::Sender<OrchestratorEvent>,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
