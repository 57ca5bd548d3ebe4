// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-engine: the scheduler core.
//!
//! Bounded per-type job queues with spill-to-store backpressure, the
//! per-job coordinator, recoverable durable mutations, the continuation
//! engine, and the lifecycle transitions that drive a job from `Created`
//! to a terminal state.

pub mod convert;
pub mod coordinator;
pub mod dispatch;
pub mod liveness;
pub mod mutator;
pub mod queue;
pub mod recover;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod transitions;

#[cfg(test)]
pub(crate) mod testkit;

pub use convert::{ActivityConverter, ConvertError, ConvertedActivity};
pub use coordinator::JobCoordinator;
pub use dispatch::{ContinuationDispatcher, ParentProgress};
pub use liveness::ContinuationLiveness;
pub use mutator::{JobMutator, MutateError};
pub use queue::{JobQueue, QueueError};
pub use recover::{RecoverableAction, RecoverableFailure, RecoveryPolicy};
pub use router::JobRouter;
pub use runtime::{ActivityRuntime, ExecutionOutcome, UserActivityError};
pub use scheduler::{Orchestrator, OrchestratorBuilder};
pub use transitions::Transitions;

use thiserror::Error;
use trellis_store::StoreError;

/// Engine-level failures. Folded into job state at the worker boundary;
/// only programmer errors (`AlreadyInitialized`, `InvalidTransition`)
/// reach callers of the public API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Mutate(#[from] MutateError),
    #[error(transparent)]
    Converter(#[from] ConvertError),
}
