// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for jobs, correlation trees, and activity routing.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

crate::define_id! {
    /// Unique identifier for a job. Immutable once assigned.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Identifier shared by every job in one submission tree; the root job
    /// carries it and children inherit it.
    pub struct CorrelationId("cor-");
}

/// Routing key identifying a user activity implementation.
///
/// Not a generated id: callers supply the key (in practice a fully-qualified
/// type name) and the router matches it against registered queues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityType(SmolStr);

impl ActivityType {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(SmolStr::new(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for ActivityType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActivityType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ActivityType {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<&str> for ActivityType {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
