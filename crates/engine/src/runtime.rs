// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam to the activity runtime that executes user code.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use trellis_core::{Activity, Job};

/// Failure raised by user code. Feeds the retry / poison policy.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UserActivityError {
    pub message: String,
}

impl UserActivityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What one dispatch of a job produced.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The activity returned a value; the job is done.
    Value(Value),
    /// The activity spawned further work; the job waits on it.
    Activity(Activity),
    /// User code failed.
    Error(UserActivityError),
}

/// Executes user activities. External collaborator: the engine hands a job
/// over at least once and interprets the outcome; it never cancels user
/// code in flight.
#[async_trait]
pub trait ActivityRuntime: Send + Sync {
    async fn execute(&self, job: &Job) -> ExecutionOutcome;
}
