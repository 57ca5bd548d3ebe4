// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turns a returned activity graph into child jobs plus their wait tree.

use chrono::{DateTime, Utc};
use thiserror::Error;
use trellis_core::{Activity, Continuation, Job};

/// The user activity produced a graph the orchestrator cannot schedule.
/// Surfaces as a failure of the parent job.
#[derive(Debug, Clone, Error)]
#[error("invalid activity graph: {0}")]
pub struct ConvertError(pub String);

/// Newly constructed child jobs and the continuation over them.
///
/// Jobs are in `Created` state and not yet persisted; the continuation's
/// leaves reference them in declaration order.
#[derive(Debug, Clone)]
pub struct ConvertedActivity {
    pub continuation: Continuation,
    pub jobs: Vec<Job>,
}

/// Pure transformer: no persistence, no dispatch.
pub struct ActivityConverter;

impl ActivityConverter {
    pub fn convert(
        parent: &Job,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<ConvertedActivity, ConvertError> {
        let mut jobs = Vec::new();
        let continuation = Self::node(parent, activity, now, &mut jobs)?;
        Ok(ConvertedActivity { continuation, jobs })
    }

    fn node(
        parent: &Job,
        activity: &Activity,
        now: DateTime<Utc>,
        jobs: &mut Vec<Job>,
    ) -> Result<Continuation, ConvertError> {
        match activity {
            Activity::Call {
                activity_type,
                method,
                arguments,
            } => {
                let job = Job::child_of(
                    parent,
                    activity_type.clone(),
                    method.clone(),
                    arguments.clone(),
                    now,
                );
                let leaf = Continuation::single(job.id.clone());
                jobs.push(job);
                Ok(leaf)
            }
            Activity::Parallel {
                branches,
                on_any_failed,
            } => {
                let children = Self::nodes(parent, branches, now, jobs, "parallel")?;
                Ok(Continuation::all(children, *on_any_failed))
            }
            Activity::Sequence { branches } => {
                let children = Self::nodes(parent, branches, now, jobs, "sequence")?;
                Ok(Continuation::sequence(children))
            }
            Activity::Any { branches } => {
                let children = Self::nodes(parent, branches, now, jobs, "any")?;
                Ok(Continuation::any(children))
            }
        }
    }

    fn nodes(
        parent: &Job,
        branches: &[Activity],
        now: DateTime<Utc>,
        jobs: &mut Vec<Job>,
        group: &str,
    ) -> Result<Vec<Continuation>, ConvertError> {
        if branches.is_empty() {
            return Err(ConvertError(format!("empty {group} group")));
        }
        branches
            .iter()
            .map(|branch| Self::node(parent, branch, now, jobs))
            .collect()
    }
}

#[cfg(test)]
#[path = "convert_tests.rs"]
mod tests;
