// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-activity-type ready buffer with spill-to-store overflow.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use trellis_core::{ActivityConfig, ActivityType, EventStream, Job, OrchestratorEvent};
use trellis_store::{JobStore, QueueSelector, StoreError};

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// `initialize` called twice. Programmer error; propagates.
    #[error("queue already initialized")]
    AlreadyInitialized,
    /// `read` or `write` before `initialize`. Programmer error; propagates.
    #[error("queue not initialized")]
    NotInitialized,
    /// Orderly stop; parked reads resolve here.
    #[error("queue shut down")]
    Shutdown,
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct QueueState {
    initialized: bool,
    shutdown: bool,
    buffer: VecDeque<Job>,
    /// Durable-only jobs owned by this queue's selector. Primed from the
    /// store at initialize, adjusted as jobs spill and reload.
    suspended_count: usize,
    /// Parked readers, in parking order. Each wake token completes one.
    waiters: VecDeque<oneshot::Sender<()>>,
    /// At most one reader drains the suspended pool at a time.
    reloading: bool,
}

enum ReadStep {
    Got(Job),
    Reload(usize),
    Park(oneshot::Receiver<()>),
}

/// One queue per activity type, plus one default queue.
///
/// `write` never blocks: it admits to the in-memory buffer or spills the
/// job to the store with `suspended = true`. `read` pops the buffer,
/// reloads spilled jobs when the buffer runs dry, and parks when there is
/// nothing anywhere. The default queue is unbounded and never spills.
pub struct JobQueue {
    config: ActivityConfig,
    selector: QueueSelector,
    store: Arc<dyn JobStore>,
    events: EventStream,
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new(config: ActivityConfig, store: Arc<dyn JobStore>, events: EventStream) -> Self {
        let selector = match &config.activity_type {
            Some(t) => QueueSelector::Typed(t.clone()),
            None => QueueSelector::Default {
                exclude: Vec::new(),
            },
        };
        Self {
            config,
            selector,
            store,
            events,
            state: Mutex::new(QueueState {
                initialized: false,
                shutdown: false,
                buffer: VecDeque::new(),
                suspended_count: 0,
                waiters: VecDeque::new(),
                reloading: false,
            }),
        }
    }

    /// For the default queue: the activity types dedicated queues claim,
    /// which this queue must not drain from the suspended pool.
    pub fn with_excluded(mut self, exclude: Vec<ActivityType>) -> Self {
        if self.config.is_default_queue() {
            self.selector = QueueSelector::Default { exclude };
        }
        self
    }

    pub fn activity_type(&self) -> Option<&ActivityType> {
        self.config.activity_type.as_ref()
    }

    fn bound(&self) -> Option<usize> {
        self.config.max_queue_length
    }

    fn claims(&self, job: &Job) -> bool {
        self.selector.matches(&job.activity_type)
    }

    /// One-time setup: claim matching `candidates` up to the bound and
    /// prime the suspended count from the store. Returns the candidates
    /// this queue did not claim. Matching candidates beyond the bound are
    /// dropped here — they are already durable and suspended.
    pub async fn initialize(&self, candidates: Vec<Job>) -> Result<Vec<Job>, QueueError> {
        {
            let mut state = self.state.lock();
            if state.initialized {
                return Err(QueueError::AlreadyInitialized);
            }
            state.initialized = true;
        }

        let suspended = self.store.count_suspended(&self.selector).await?;

        let mut rest = Vec::new();
        let mut state = self.state.lock();
        state.suspended_count = suspended;
        for job in candidates {
            if !self.claims(&job) {
                rest.push(job);
            } else if self.bound().map_or(true, |b| state.buffer.len() < b) {
                state.buffer.push_back(job);
            }
        }
        Ok(rest)
    }

    /// Admit `job` to the buffer or spill it to the store. Never blocks.
    pub async fn write(&self, mut job: Job) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            if !state.initialized {
                return Err(QueueError::NotInitialized);
            }
            if state.shutdown {
                return Err(QueueError::Shutdown);
            }
            let admit = match self.bound() {
                None => true,
                // While the suspended pool is draining, new writes join the
                // back of it so FIFO holds across the spill.
                Some(b) => state.buffer.len() < b && state.suspended_count == 0,
            };
            if admit {
                state.buffer.push_back(job);
                if let Some(waiter) = state.waiters.pop_front() {
                    let _ = waiter.send(());
                }
                return Ok(());
            }
            job.suspended = true;
        }

        // Spill outside the lock. The job is already durable from earlier
        // states; a failed flag update is caught by the boot status scan,
        // so it is surfaced to operators and otherwise ignored.
        if let Err(e) = self.store.store(&job).await {
            tracing::warn!(job = %job.id, error = %e, "suspended spill not persisted");
            self.events
                .publish(OrchestratorEvent::StoreDrift { id: job.id.clone() });
        }

        let mut state = self.state.lock();
        state.suspended_count += 1;
        // A reader may be parked on a failed reload; nudge it to retry.
        if let Some(waiter) = state.waiters.pop_front() {
            let _ = waiter.send(());
        }
        Ok(())
    }

    /// Take the next ready job. Suspends the caller while the buffer and
    /// the suspended pool are both empty; resolves with
    /// [`QueueError::Shutdown`] on orderly stop.
    pub async fn read(&self) -> Result<Job, QueueError> {
        loop {
            let step = {
                let mut state = self.state.lock();
                if !state.initialized {
                    return Err(QueueError::NotInitialized);
                }
                if state.shutdown {
                    return Err(QueueError::Shutdown);
                }
                if let Some(job) = state.buffer.pop_front() {
                    ReadStep::Got(job)
                } else if state.suspended_count > 0 && !state.reloading {
                    state.reloading = true;
                    let max = self
                        .bound()
                        .unwrap_or(state.suspended_count)
                        .min(state.suspended_count);
                    ReadStep::Reload(max)
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    ReadStep::Park(rx)
                }
            };

            match step {
                ReadStep::Got(job) => return Ok(job),
                ReadStep::Reload(max) => {
                    let outcome = self.reload(max).await;
                    let parked = {
                        let mut state = self.state.lock();
                        state.reloading = false;
                        match outcome {
                            Ok(batch) => {
                                // A short batch means the pool is drier than the
                                // counter thought (e.g. a spill that never hit
                                // the store); trust the store.
                                if batch.len() < max {
                                    state.suspended_count = 0;
                                } else {
                                    state.suspended_count =
                                        state.suspended_count.saturating_sub(batch.len());
                                }
                                for job in batch {
                                    state.buffer.push_back(job);
                                }
                                // One item is ours; hand the rest to parked peers.
                                let extra = state.buffer.len().saturating_sub(1);
                                for _ in 0..extra {
                                    match state.waiters.pop_front() {
                                        Some(waiter) => {
                                            let _ = waiter.send(());
                                        }
                                        None => break,
                                    }
                                }
                                if let Some(job) = state.buffer.pop_front() {
                                    return Ok(job);
                                }
                                // Nothing came back; park like an empty queue.
                                let (tx, rx) = oneshot::channel();
                                state.waiters.push_back(tx);
                                Some(rx)
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "suspended reload failed; parking");
                                let (tx, rx) = oneshot::channel();
                                state.waiters.push_back(tx);
                                Some(rx)
                            }
                        }
                    };
                    if let Some(rx) = parked {
                        let _ = rx.await;
                    }
                }
                ReadStep::Park(rx) => {
                    let _ = rx.await;
                }
            }
        }
    }

    /// Load up to `max` suspended jobs and clear their flag. The load is
    /// retried once per read attempt; clear failures leave the job visible
    /// with a stale durable flag.
    async fn reload(&self, max: usize) -> Result<Vec<Job>, StoreError> {
        let batch = match self.store.load_suspended(&self.selector, max).await {
            Ok(batch) => batch,
            Err(first) => {
                tracing::warn!(error = %first, "suspended load failed; retrying once");
                self.store.load_suspended(&self.selector, max).await?
            }
        };
        let mut cleared = Vec::with_capacity(batch.len());
        for mut job in batch {
            job.suspended = false;
            if let Err(e) = self.store.store(&job).await {
                tracing::warn!(job = %job.id, error = %e, "suspended clear not persisted");
                self.events
                    .publish(OrchestratorEvent::StoreDrift { id: job.id.clone() });
            }
            cleared.push(job);
        }
        Ok(cleared)
    }

    /// Release every parked reader with [`QueueError::Shutdown`] and refuse
    /// further traffic.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// In-memory buffer size. Test hook.
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Current suspended counter. Test hook.
    pub fn suspended_count(&self) -> usize {
        self.state.lock().suspended_count
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
