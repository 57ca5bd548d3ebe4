// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes jobs to the queue registered for their activity type.

use crate::queue::{JobQueue, QueueError};
use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::{ActivityType, Job};

/// Registry of queues, built once at boot. Routing is a pure function of
/// the job's activity type: dedicated queue if registered, default queue
/// otherwise.
pub struct JobRouter {
    queues: HashMap<ActivityType, Arc<JobQueue>>,
    default_queue: Arc<JobQueue>,
}

impl JobRouter {
    pub fn new(queues: HashMap<ActivityType, Arc<JobQueue>>, default_queue: Arc<JobQueue>) -> Self {
        Self {
            queues,
            default_queue,
        }
    }

    pub fn queue_for(&self, activity_type: &ActivityType) -> &Arc<JobQueue> {
        self.queues.get(activity_type).unwrap_or(&self.default_queue)
    }

    /// Write `job` to its queue.
    pub async fn route(&self, job: Job) -> Result<(), QueueError> {
        self.queue_for(&job.activity_type).write(job).await
    }

    /// Every queue, dedicated ones first, the default queue last.
    pub fn all_queues(&self) -> Vec<Arc<JobQueue>> {
        let mut queues: Vec<Arc<JobQueue>> = self.queues.values().cloned().collect();
        queues.push(Arc::clone(&self.default_queue));
        queues
    }

    pub fn default_queue(&self) -> &Arc<JobQueue> {
        &self.default_queue
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
