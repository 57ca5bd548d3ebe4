// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wiring for engine unit tests.

use crate::coordinator::JobCoordinator;
use crate::dispatch::ContinuationDispatcher;
use crate::liveness::ContinuationLiveness;
use crate::mutator::JobMutator;
use crate::queue::JobQueue;
use crate::recover::{RecoverableAction, RecoveryPolicy};
use crate::router::JobRouter;
use crate::transitions::{PolicySet, Transitions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use trellis_core::{ActivityConfig, EventStream};
use trellis_store::{JobStore, ScriptedStore};

/// Fast retry policy so failure tests finish quickly.
pub(crate) fn fast_policy() -> RecoveryPolicy {
    RecoveryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

/// Fully wired engine over a [`ScriptedStore`], with every queue already
/// initialized empty.
pub(crate) struct Harness {
    pub store: Arc<ScriptedStore>,
    pub events: EventStream,
    pub coordinator: JobCoordinator,
    pub recovery: RecoverableAction,
    pub mutator: JobMutator,
    pub router: Arc<JobRouter>,
    pub dispatcher: ContinuationDispatcher,
    pub liveness: ContinuationLiveness,
    pub transitions: Arc<Transitions>,
}

impl Harness {
    pub async fn with_configs(configs: Vec<ActivityConfig>) -> Self {
        let store = Arc::new(ScriptedStore::new());
        let dyn_store: Arc<dyn JobStore> = store.clone();
        let events = EventStream::new(64);
        let recovery = RecoverableAction::new(Arc::clone(&dyn_store), events.clone(), fast_policy());
        let mutator = JobMutator::new(Arc::clone(&dyn_store), events.clone(), recovery.clone());
        let coordinator = JobCoordinator::new();

        let mut queues = HashMap::new();
        let mut exclude = Vec::new();
        for config in &configs {
            if let Some(activity_type) = config.activity_type.clone() {
                exclude.push(activity_type.clone());
                queues.insert(
                    activity_type,
                    Arc::new(JobQueue::new(
                        config.clone(),
                        Arc::clone(&dyn_store),
                        events.clone(),
                    )),
                );
            }
        }
        let default_queue = Arc::new(
            JobQueue::new(
                ActivityConfig::default_queue(),
                Arc::clone(&dyn_store),
                events.clone(),
            )
            .with_excluded(exclude),
        );
        let router = Arc::new(JobRouter::new(queues, default_queue));
        for queue in router.all_queues() {
            queue.initialize(Vec::new()).await.expect("initialize");
        }

        let dispatcher = ContinuationDispatcher::new(
            Arc::clone(&dyn_store),
            mutator.clone(),
            recovery.clone(),
            Arc::clone(&router),
        );
        let liveness = ContinuationLiveness::new(Arc::clone(&dyn_store), dispatcher.clone());
        let policies = PolicySet::new(configs, ActivityConfig::default_queue());
        let transitions = Arc::new(Transitions::new(
            Arc::clone(&dyn_store),
            mutator.clone(),
            dispatcher.clone(),
            liveness.clone(),
            coordinator.clone(),
            recovery.clone(),
            Arc::clone(&router),
            policies,
        ));

        Self {
            store,
            events,
            coordinator,
            recovery,
            mutator,
            router,
            dispatcher,
            liveness,
            transitions,
        }
    }

    pub async fn new() -> Self {
        Self::with_configs(Vec::new()).await
    }
}
