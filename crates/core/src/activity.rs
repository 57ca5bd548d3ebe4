// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative descriptions of work: a single call or a composition.

use crate::id::ActivityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a user activity asks the orchestrator to run next.
///
/// Returned by user code to spawn children, or handed to `submit` (as a
/// single `Call`) to start a tree. Compositions nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activity {
    /// One call on a user activity implementation.
    Call {
        activity_type: ActivityType,
        method: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        arguments: Vec<Value>,
    },
    /// All branches run concurrently.
    Parallel {
        branches: Vec<Activity>,
        /// Fail the whole group as soon as any branch fails, instead of
        /// waiting for the stragglers.
        #[serde(default)]
        on_any_failed: bool,
    },
    /// Branches run strictly one after another; a failure stops the chain.
    Sequence { branches: Vec<Activity> },
    /// First branch to complete wins. The losers keep running unobserved.
    Any { branches: Vec<Activity> },
}

impl Activity {
    pub fn call(activity_type: impl Into<ActivityType>, method: impl Into<String>) -> Self {
        Self::Call {
            activity_type: activity_type.into(),
            method: method.into(),
            arguments: Vec::new(),
        }
    }

    pub fn call_with(
        activity_type: impl Into<ActivityType>,
        method: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self::Call {
            activity_type: activity_type.into(),
            method: method.into(),
            arguments,
        }
    }

    pub fn parallel(branches: Vec<Activity>) -> Self {
        Self::Parallel {
            branches,
            on_any_failed: false,
        }
    }

    pub fn sequence(branches: Vec<Activity>) -> Self {
        Self::Sequence { branches }
    }

    pub fn any(branches: Vec<Activity>) -> Self {
        Self::Any { branches }
    }

    /// Fail-fast variant of a parallel group.
    pub fn fail_fast(self) -> Self {
        match self {
            Self::Parallel { branches, .. } => Self::Parallel {
                branches,
                on_any_failed: true,
            },
            other => other,
        }
    }

    /// Chain `next` after `self`, flattening nested sequences.
    pub fn then(self, next: Activity) -> Self {
        match self {
            Self::Sequence { mut branches } => {
                branches.push(next);
                Self::Sequence { branches }
            }
            first => Self::Sequence {
                branches: vec![first, next],
            },
        }
    }

    /// Number of `Call` leaves in the graph.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Call { .. } => 1,
            Self::Parallel { branches, .. } | Self::Sequence { branches } | Self::Any { branches } => {
                branches.iter().map(Activity::leaf_count).sum()
            }
        }
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
