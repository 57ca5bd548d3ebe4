// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and lifecycle state machine.

use crate::continuation::Continuation;
use crate::id::{ActivityType, CorrelationId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Ready,
    Running,
    WaitingForChildren,
    ReadyToComplete,
    ReadyToPoison,
    Completed,
    Failed,
    Poisoned,
}

crate::simple_display! {
    JobStatus {
        Created => "created",
        Ready => "ready",
        Running => "running",
        WaitingForChildren => "waiting_for_children",
        ReadyToComplete => "ready_to_complete",
        ReadyToPoison => "ready_to_poison",
        Completed => "completed",
        Failed => "failed",
        Poisoned => "poisoned",
    }
}

impl JobStatus {
    /// Terminal states are never left. `Failed` is not terminal: it can
    /// re-enter `Ready` while retry budget remains.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Poisoned)
    }

    /// Whether `self -> next` is a legal edge of the lifecycle graph.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Created, Ready)
                | (Ready, Running)
                | (Running, WaitingForChildren)
                | (Running, ReadyToComplete)
                | (Running, ReadyToPoison)
                | (Running, Failed)
                | (WaitingForChildren, ReadyToComplete)
                | (WaitingForChildren, ReadyToPoison)
                | (ReadyToComplete, Completed)
                | (ReadyToPoison, Poisoned)
                | (Failed, Ready)
                | (Failed, ReadyToPoison)
        )
    }
}

/// The durable, schedulable unit of work.
///
/// Jobs are created by submission or by a parent's returned activity graph,
/// then mutated only through the engine's mutator, which persists every
/// change before it becomes visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JobId>,
    pub root_id: JobId,
    pub activity_type: ActivityType,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
    pub status: JobStatus,
    /// Times the job has been handed to the runtime. Monotonic.
    #[serde(default)]
    pub dispatch_count: u32,
    /// Retries consumed by the current poison round.
    #[serde(default)]
    pub retry_count: u32,
    /// Delay applied before the most recent retry, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Extra full retry rounds consumed after the budget first ran out.
    #[serde(default)]
    pub poison_retry_count: u32,
    /// True when the job is durable-only: spilled from a bounded queue and
    /// not held in memory anywhere.
    #[serde(default)]
    pub suspended: bool,
    /// Wait tree; present exactly while `status` is `WaitingForChildren`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<Continuation>,
    pub created_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Root job for a submitted call. Starts its own correlation tree.
    pub fn root(
        activity_type: ActivityType,
        method: impl Into<String>,
        arguments: Vec<Value>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = JobId::generate();
        Self {
            root_id: id.clone(),
            id,
            correlation_id: CorrelationId::generate(),
            parent_id: None,
            activity_type,
            method: method.into(),
            arguments,
            status: JobStatus::Created,
            dispatch_count: 0,
            retry_count: 0,
            retry_delay_ms: 0,
            poison_retry_count: 0,
            suspended: false,
            continuation: None,
            created_utc: now,
            error: None,
        }
    }

    /// Child job spawned by `parent`'s returned activity graph. Inherits
    /// the correlation tree.
    pub fn child_of(
        parent: &Job,
        activity_type: ActivityType,
        method: impl Into<String>,
        arguments: Vec<Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            correlation_id: parent.correlation_id.clone(),
            parent_id: Some(parent.id.clone()),
            root_id: parent.root_id.clone(),
            activity_type,
            method: method.into(),
            arguments,
            status: JobStatus::Created,
            dispatch_count: 0,
            retry_count: 0,
            retry_delay_ms: 0,
            poison_retry_count: 0,
            suspended: false,
            continuation: None,
            created_utc: now,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Record published on the event stream after a persisted mutation.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            activity_type: self.activity_type.clone(),
            method: self.method.clone(),
            status: self.status,
            dispatch_count: self.dispatch_count,
        }
    }
}

/// Advisory record of a persisted job mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub activity_type: ActivityType,
    pub method: String,
    pub status: JobStatus,
    pub dispatch_count: u32,
}

/// Test builder with defaults for the fields most tests never touch.
#[cfg(any(test, feature = "test-support"))]
pub struct JobBuilder {
    activity_type: ActivityType,
    method: String,
    status: JobStatus,
    parent_id: Option<JobId>,
    suspended: bool,
    retry_count: u32,
    continuation: Option<Continuation>,
    created_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
impl JobBuilder {
    pub fn new(activity_type: impl Into<ActivityType>) -> Self {
        Self {
            activity_type: activity_type.into(),
            method: "run".to_string(),
            status: JobStatus::Ready,
            parent_id: None,
            suspended: false,
            retry_count: 0,
            continuation: None,
            created_ms: 1_000_000,
        }
    }

    crate::setters! {
        into {
            method: String,
        }
        set {
            status: JobStatus,
            suspended: bool,
            retry_count: u32,
            created_ms: u64,
        }
    }

    pub fn parent(mut self, id: impl Into<JobId>) -> Self {
        self.parent_id = Some(id.into());
        self
    }

    pub fn continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = Some(continuation);
        self
    }

    pub fn build(self) -> Job {
        let id = JobId::generate();
        Job {
            root_id: self.parent_id.clone().unwrap_or_else(|| id.clone()),
            id,
            correlation_id: CorrelationId::generate(),
            parent_id: self.parent_id,
            activity_type: self.activity_type,
            method: self.method,
            arguments: Vec::new(),
            status: self.status,
            dispatch_count: 0,
            retry_count: self.retry_count,
            retry_delay_ms: 0,
            poison_retry_count: 0,
            suspended: self.suspended,
            continuation: self.continuation,
            created_utc: DateTime::from_timestamp_millis(self.created_ms as i64)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            error: None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
