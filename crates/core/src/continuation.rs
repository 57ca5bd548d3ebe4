// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted wait tree linking a parent job to its children.

use crate::id::JobId;
use serde::{Deserialize, Serialize};

/// Wait-state of a continuation node.
///
/// Leaves move `WaitingForChildren -> Ready` when their child is scheduled
/// and then to a terminal state when the child finishes. Composite nodes
/// stay `WaitingForChildren` until their rule resolves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationStatus {
    WaitingForChildren,
    Ready,
    Completed,
    Failed,
}

impl ContinuationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

crate::simple_display! {
    ContinuationStatus {
        WaitingForChildren => "waiting_for_children",
        Ready => "ready",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Tree of waits. Always a tree, never a graph: nodes own their children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Continuation {
    /// Waits on a single child job.
    Single {
        id: JobId,
        status: ContinuationStatus,
    },
    /// Waits on every child.
    All {
        children: Vec<Continuation>,
        status: ContinuationStatus,
        /// Fail the group on the first child failure instead of waiting
        /// for the remaining children to finish.
        #[serde(default)]
        on_any_failed: bool,
    },
    /// Satisfied by the first child to complete; fails only when every
    /// child has failed.
    Any {
        children: Vec<Continuation>,
        status: ContinuationStatus,
    },
    /// Children are dispatched strictly in order; a failure stops the chain.
    Sequence {
        children: Vec<Continuation>,
        status: ContinuationStatus,
    },
}

impl Continuation {
    pub fn single(id: JobId) -> Self {
        Self::Single {
            id,
            status: ContinuationStatus::WaitingForChildren,
        }
    }

    pub fn all(children: Vec<Continuation>, on_any_failed: bool) -> Self {
        Self::All {
            children,
            status: ContinuationStatus::WaitingForChildren,
            on_any_failed,
        }
    }

    pub fn any(children: Vec<Continuation>) -> Self {
        Self::Any {
            children,
            status: ContinuationStatus::WaitingForChildren,
        }
    }

    pub fn sequence(children: Vec<Continuation>) -> Self {
        Self::Sequence {
            children,
            status: ContinuationStatus::WaitingForChildren,
        }
    }

    pub fn status(&self) -> ContinuationStatus {
        match self {
            Self::Single { status, .. }
            | Self::All { status, .. }
            | Self::Any { status, .. }
            | Self::Sequence { status, .. } => *status,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.status() == ContinuationStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status() == ContinuationStatus::Failed
    }

    /// The minimal set of leaves whose child must be scheduled next to
    /// advance the tree, in declaration order.
    ///
    /// `All` and `Any` groups expose every un-dispatched leaf at once; a
    /// `Sequence` exposes only its current branch.
    pub fn pending(&self) -> Vec<JobId> {
        let mut out = Vec::new();
        self.collect_pending(&mut out);
        out
    }

    fn collect_pending(&self, out: &mut Vec<JobId>) {
        if self.status().is_terminal() {
            return;
        }
        match self {
            Self::Single { id, status } => {
                if *status == ContinuationStatus::WaitingForChildren {
                    out.push(id.clone());
                }
            }
            Self::All { children, .. } | Self::Any { children, .. } => {
                for child in children {
                    child.collect_pending(out);
                }
            }
            Self::Sequence { children, .. } => {
                for child in children {
                    match child.status() {
                        ContinuationStatus::Completed => continue,
                        ContinuationStatus::Failed => break,
                        _ => {
                            child.collect_pending(out);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Leaves that were dispatched but have not reported back yet.
    pub fn ready_leaves(&self) -> Vec<JobId> {
        let mut out = Vec::new();
        self.visit_leaves(&mut |id, status| {
            if status == ContinuationStatus::Ready {
                out.push(id.clone());
            }
        });
        out
    }

    /// Status of the leaf waiting on `id`, if any.
    pub fn leaf_status(&self, id: &JobId) -> Option<ContinuationStatus> {
        let mut found = None;
        self.visit_leaves(&mut |leaf, status| {
            if leaf == id {
                found = Some(status);
            }
        });
        found
    }

    fn visit_leaves(&self, f: &mut impl FnMut(&JobId, ContinuationStatus)) {
        match self {
            Self::Single { id, status } => f(id, *status),
            Self::All { children, .. }
            | Self::Any { children, .. }
            | Self::Sequence { children, .. } => {
                for child in children {
                    child.visit_leaves(f);
                }
            }
        }
    }

    /// Mark the leaf waiting on `id` as dispatched. Returns false when no
    /// un-dispatched leaf references the id.
    pub fn mark_ready(&mut self, id: &JobId) -> bool {
        match self {
            Self::Single { id: leaf, status } => {
                if leaf == id && *status == ContinuationStatus::WaitingForChildren {
                    *status = ContinuationStatus::Ready;
                    true
                } else {
                    false
                }
            }
            Self::All { children, .. }
            | Self::Any { children, .. }
            | Self::Sequence { children, .. } => {
                children.iter_mut().any(|child| child.mark_ready(id))
            }
        }
    }

    /// Fold a child's terminal result into the tree and recompute composite
    /// statuses bottom-up. Returns false when no live leaf references the id.
    pub fn record_child(&mut self, id: &JobId, completed: bool) -> bool {
        let hit = self.record_leaf(id, completed);
        if hit {
            self.recompute();
        }
        hit
    }

    fn record_leaf(&mut self, id: &JobId, completed: bool) -> bool {
        match self {
            Self::Single { id: leaf, status } => {
                if leaf == id && !status.is_terminal() {
                    *status = if completed {
                        ContinuationStatus::Completed
                    } else {
                        ContinuationStatus::Failed
                    };
                    true
                } else {
                    false
                }
            }
            Self::All { children, .. }
            | Self::Any { children, .. }
            | Self::Sequence { children, .. } => {
                children.iter_mut().any(|child| child.record_leaf(id, completed))
            }
        }
    }

    /// Recompute composite statuses bottom-up. A node that already reached a
    /// terminal state keeps it.
    fn recompute(&mut self) {
        match self {
            Self::Single { .. } => {}
            Self::All {
                children,
                status,
                on_any_failed,
            } => {
                for child in children.iter_mut() {
                    child.recompute();
                }
                if status.is_terminal() {
                    return;
                }
                let failed = children.iter().filter(|c| c.is_failed()).count();
                let all_terminal = children.iter().all(|c| c.status().is_terminal());
                if *on_any_failed && failed > 0 {
                    *status = ContinuationStatus::Failed;
                } else if all_terminal {
                    *status = if failed > 0 {
                        ContinuationStatus::Failed
                    } else {
                        ContinuationStatus::Completed
                    };
                }
            }
            Self::Any { children, status } => {
                for child in children.iter_mut() {
                    child.recompute();
                }
                if status.is_terminal() {
                    return;
                }
                if children.iter().any(|c| c.is_satisfied()) {
                    *status = ContinuationStatus::Completed;
                } else if children.iter().all(|c| c.is_failed()) {
                    *status = ContinuationStatus::Failed;
                }
            }
            Self::Sequence { children, status } => {
                for child in children.iter_mut() {
                    child.recompute();
                }
                if status.is_terminal() {
                    return;
                }
                if children.iter().any(|c| c.is_failed()) {
                    *status = ContinuationStatus::Failed;
                } else if children.iter().all(|c| c.is_satisfied()) {
                    *status = ContinuationStatus::Completed;
                }
            }
        }
    }

    /// True when at least one leaf can still move (the invariant a
    /// `WaitingForChildren` parent relies on).
    pub fn has_live_leaf(&self) -> bool {
        let mut live = false;
        self.visit_leaves(&mut |_, status| {
            if !status.is_terminal() {
                live = true;
            }
        });
        live
    }
}

#[cfg(test)]
#[path = "continuation_tests.rs"]
mod tests;
