// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::continuation::Continuation;
use crate::job::{Job, JobBuilder, JobStatus};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::continuation::ContinuationStatus;
    use crate::job::JobStatus;
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Created),
            Just(JobStatus::Ready),
            Just(JobStatus::Running),
            Just(JobStatus::WaitingForChildren),
            Just(JobStatus::ReadyToComplete),
            Just(JobStatus::ReadyToPoison),
            Just(JobStatus::Completed),
            Just(JobStatus::Failed),
            Just(JobStatus::Poisoned),
        ]
    }

    pub fn arb_continuation_status() -> impl Strategy<Value = ContinuationStatus> {
        prop_oneof![
            Just(ContinuationStatus::WaitingForChildren),
            Just(ContinuationStatus::Ready),
            Just(ContinuationStatus::Completed),
            Just(ContinuationStatus::Failed),
        ]
    }
}

// ── Job factories ───────────────────────────────────────────────────────

/// A ready root job of the given type.
pub fn ready_job(activity_type: &str) -> Job {
    JobBuilder::new(activity_type).build()
}

/// A parent in `WaitingForChildren` over single-leaf waits on `children`.
pub fn waiting_parent(activity_type: &str, children: &[Job]) -> Job {
    let leaves = children
        .iter()
        .map(|c| Continuation::single(c.id.clone()))
        .collect();
    JobBuilder::new(activity_type)
        .status(JobStatus::WaitingForChildren)
        .continuation(Continuation::all(leaves, false))
        .build()
}
