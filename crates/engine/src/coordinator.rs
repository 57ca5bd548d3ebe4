// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job serialization of state-changing callbacks.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use trellis_core::JobId;

type Callback = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Per-id serial lanes.
///
/// For a given job id, at most one callback is in flight; later callbacks
/// for the same id queue behind it in submission order. A lane's drainer
/// task retires when its queue runs dry. Because every callback for an id
/// is awaited to completion before the next one starts, a store write
/// issued by an earlier callback is durable before its successor begins.
#[derive(Clone, Default)]
pub struct JobCoordinator {
    lanes: Arc<Mutex<HashMap<JobId, VecDeque<Callback>>>>,
}

impl JobCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `callback` on the job's serial lane.
    pub fn run<F>(&self, id: &JobId, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut lanes = self.lanes.lock();
        if let Some(lane) = lanes.get_mut(id) {
            lane.push_back(Box::pin(callback));
            return;
        }
        // A map entry marks an active drainer; the first callback rides
        // along instead of passing through the queue.
        lanes.insert(id.clone(), VecDeque::new());
        drop(lanes);

        let this = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let mut next: Callback = Box::pin(callback);
            loop {
                next.await;
                let follow = {
                    let mut lanes = this.lanes.lock();
                    match lanes.get_mut(&id).and_then(VecDeque::pop_front) {
                        Some(cb) => Some(cb),
                        None => {
                            lanes.remove(&id);
                            None
                        }
                    }
                };
                match follow {
                    Some(cb) => next = cb,
                    None => break,
                }
            }
        });
    }

    /// Number of ids with an active lane. Test hook.
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().len()
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
