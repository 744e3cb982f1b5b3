use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::backend::ExecutionBackend;
use crate::config::SchedulerConfig;
use crate::executor::SubScheduler;
use crate::graph::MonotaskGraph;
use crate::model::{MacrotaskAttemptId, MacrotaskStatus, Monotask, MonotaskId, ResourceKind};

/// Arena slot for one registered monotask. The dependency links live here,
/// keyed by id, so the bidirectional graph never holds monotask pointers in
/// both directions.
struct Entry {
    monotask: Arc<dyn Monotask>,
    /// Ids of monotasks that must still complete before this one may run.
    remaining_dependencies: HashSet<MonotaskId>,
    dependents: HashSet<MonotaskId>,
}

/// Bookkeeping guarded by the scheduler's single lock.
#[derive(Default)]
struct Bookkeeping {
    /// Registered but not yet dispatched. Introspection aid only.
    waiting: HashSet<MonotaskId>,
    /// Dispatched to a sub-scheduler, outcome not yet reported. Introspection aid only.
    running: HashSet<MonotaskId>,
    /// Macrotask attempts in flight. Removal is the exactly-once guard for
    /// backend notification.
    active_macrotasks: HashSet<MacrotaskAttemptId>,
    entries: HashMap<MonotaskId, Entry>,
}

impl Bookkeeping {
    fn new() -> Self {
        Self::default()
    }
}

/// Dependency-tracking scheduler routing ready monotasks to per-resource
/// sub-schedulers.
///
/// Every state-mutating operation runs under one exclusive lock covering
/// all bookkeeping, so each submission/completion/failure event is atomic
/// with respect to every other event. Monotask `execute` never runs under
/// that lock. The coarse lock is a deliberate simplification: it buys a
/// trivially correct linearization of graph mutations at the cost of
/// serializing unrelated scheduling events.
///
/// Known limitation, by design: a monotask already handed to a
/// sub-scheduler when a sibling fails is not cancelled. It runs to
/// completion and its own callback observes the deactivated macrotask,
/// falling back to the idempotent failure-propagation walk.
pub struct LocalDagScheduler {
    state: Mutex<Bookkeeping>,
    sub_schedulers: HashMap<ResourceKind, Arc<dyn SubScheduler>>,
    backend: Arc<dyn ExecutionBackend>,
    completion_poll_interval: Duration,
}

impl LocalDagScheduler {
    pub fn new(
        sub_schedulers: HashMap<ResourceKind, Arc<dyn SubScheduler>>,
        backend: Arc<dyn ExecutionBackend>,
        config: &SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Bookkeeping::new()),
            sub_schedulers,
            backend,
            completion_poll_interval: config.completion_poll_interval,
        })
    }

    /// Registers a single dependency-free monotask and dispatches it.
    ///
    /// Monotasks with intra-macrotask dependencies go through
    /// [`submit_batch`](Self::submit_batch), which registers the whole
    /// sibling set atomically.
    pub fn submit(&self, monotask: Arc<dyn Monotask>) {
        let id = monotask.id();
        let attempt_id = monotask.context().attempt_id();

        let mut state = self.state.lock().unwrap();
        state.active_macrotasks.insert(attempt_id);
        state.entries.insert(
            id,
            Entry {
                monotask,
                remaining_dependencies: HashSet::new(),
                dependents: HashSet::new(),
            },
        );
        debug!(monotask_id = id, attempt_id, "submitted monotask");
        self.schedule_monotask(&mut state, id);
    }

    /// Registers every monotask of one macrotask as a single logical
    /// operation and dispatches those with no dependencies.
    ///
    /// All entries are registered before the first dispatch, under one lock
    /// acquisition, so a completion callback racing in from a sub-scheduler
    /// cannot observe a partially wired graph. Callers must not interleave
    /// this with another submission for the same macrotask.
    pub fn submit_batch(&self, graph: MonotaskGraph) {
        let MonotaskGraph {
            context,
            monotasks,
            mut dependencies,
            mut dependents,
        } = graph;
        let attempt_id = context.attempt_id();

        let mut state = self.state.lock().unwrap();
        state.active_macrotasks.insert(attempt_id);

        let mut ready = Vec::new();
        for monotask in monotasks {
            let id = monotask.id();
            let remaining = dependencies.remove(&id).unwrap_or_default();
            if remaining.is_empty() {
                ready.push(id);
            } else {
                state.waiting.insert(id);
            }
            state.entries.insert(
                id,
                Entry {
                    monotask,
                    remaining_dependencies: remaining,
                    dependents: dependents.remove(&id).unwrap_or_default(),
                },
            );
        }

        info!(
            attempt_id,
            ready = ready.len(),
            waiting = state.waiting.len(),
            "submitted monotask batch"
        );

        for id in ready {
            self.schedule_monotask(&mut state, id);
        }
    }

    /// Called by a sub-scheduler when a monotask's `execute` succeeded.
    ///
    /// `serialized_result` is present only for the macrotask's terminal
    /// monotask; its arrival finalizes the attempt and notifies the backend
    /// with a FINISHED status.
    pub fn on_completed(&self, monotask: &dyn Monotask, serialized_result: Option<Bytes>) {
        let id = monotask.id();
        let context = monotask.context().clone();
        let attempt_id = context.attempt_id();

        let mut notification = None;
        {
            let mut state = self.state.lock().unwrap();
            let dependents = state
                .entries
                .remove(&id)
                .map(|entry| entry.dependents)
                .unwrap_or_default();

            if state.active_macrotasks.contains(&attempt_id) {
                debug!(monotask_id = id, attempt_id, "monotask completed");
                for dep_id in &dependents {
                    let now_ready = {
                        let entry = state
                            .entries
                            .get_mut(dep_id)
                            .expect("dependent of a completed monotask is not registered");
                        entry.remaining_dependencies.remove(&id);
                        entry.remaining_dependencies.is_empty()
                    };
                    if now_ready {
                        // A monotask leaves waiting exactly when it is
                        // dispatched; its absence here means it was
                        // dispatched twice.
                        assert!(
                            state.waiting.contains(dep_id),
                            "monotask {dep_id} became ready but is not in the waiting set"
                        );
                        self.schedule_monotask(&mut state, *dep_id);
                    }
                }
                if let Some(result) = serialized_result {
                    state.active_macrotasks.remove(&attempt_id);
                    context.mark_completed();
                    notification = Some((MacrotaskStatus::Finished, result));
                }
            } else {
                // The macrotask was already failed by a sibling while this
                // monotask was still running. Do not dispatch dependents;
                // sweep any that are still waiting.
                debug!(
                    monotask_id = id,
                    attempt_id, "late completion for inactive macrotask"
                );
                self.fail_waiting_dependents(&mut state, id, dependents);
            }

            state.running.remove(&id);
        }

        if let Some((status, payload)) = notification {
            info!(attempt_id, "macrotask finished");
            self.backend.status_update(attempt_id, status, payload);
        }
    }

    /// Called by a sub-scheduler when a monotask's `execute` failed.
    ///
    /// Every transitive dependent that has not been dispatched is removed
    /// from the waiting set and never runs. The backend receives exactly one
    /// FAILED status per macrotask attempt, no matter how many of its
    /// monotasks fail concurrently.
    pub fn on_failed(&self, monotask: &dyn Monotask, serialized_reason: Bytes) {
        let id = monotask.id();
        let context = monotask.context().clone();
        let attempt_id = context.attempt_id();

        let notify = {
            let mut state = self.state.lock().unwrap();
            state.running.remove(&id);
            let dependents = state
                .entries
                .remove(&id)
                .map(|entry| entry.dependents)
                .unwrap_or_default();

            warn!(monotask_id = id, attempt_id, "monotask failed");
            self.fail_waiting_dependents(&mut state, id, dependents);

            if state.active_macrotasks.remove(&attempt_id) {
                context.mark_completed();
                true
            } else {
                false
            }
        };

        if notify {
            info!(attempt_id, "macrotask failed");
            self.backend
                .status_update(attempt_id, MacrotaskStatus::Failed, serialized_reason);
        }
    }

    /// Removes every transitively dependent monotask still in the waiting
    /// set, worklist-driven to stay off the call stack on deep chains.
    ///
    /// Idempotent: each visit checks membership, so re-running the walk from
    /// a late-completing sibling is harmless. Monotasks already dispatched
    /// are left to run; their own callbacks re-enter this path.
    fn fail_waiting_dependents(
        &self,
        state: &mut Bookkeeping,
        origin: MonotaskId,
        dependents: HashSet<MonotaskId>,
    ) {
        let mut worklist: Vec<MonotaskId> = dependents.into_iter().collect();
        while let Some(dep_id) = worklist.pop() {
            if !state.waiting.remove(&dep_id) {
                continue;
            }
            if let Some(entry) = state.entries.remove(&dep_id) {
                debug!(
                    monotask_id = dep_id,
                    origin, "failing monotask because an ancestor failed"
                );
                worklist.extend(entry.dependents);
            }
        }
    }

    /// Dispatches a ready monotask to the sub-scheduler matching its kind.
    ///
    /// The id enters `running` before it leaves `waiting`, so an outside
    /// observer never sees both sets empty while a dispatch is in flight.
    fn schedule_monotask(&self, state: &mut Bookkeeping, id: MonotaskId) {
        let monotask = {
            let entry = state
                .entries
                .get(&id)
                .expect("scheduling a monotask that is not registered");
            assert!(
                entry.remaining_dependencies.is_empty(),
                "monotask {id} dispatched with unmet dependencies"
            );
            entry.monotask.clone()
        };
        let kind = monotask.kind();

        state.running.insert(id);
        state.waiting.remove(&id);

        match self.sub_schedulers.get(&kind) {
            Some(sub_scheduler) => {
                debug!(monotask_id = id, %kind, "dispatching monotask");
                sub_scheduler.submit_monotask(monotask);
            }
            None => {
                error!(
                    monotask_id = id,
                    %kind, "no sub-scheduler registered for kind; dropping monotask"
                );
            }
        }
    }

    pub fn num_waiting_monotasks(&self) -> usize {
        self.state.lock().unwrap().waiting.len()
    }

    pub fn num_running_monotasks(&self) -> usize {
        self.state.lock().unwrap().running.len()
    }

    /// Count of monotasks of one resource kind currently executing.
    pub fn num_running_monotasks_of(&self, kind: ResourceKind) -> usize {
        let state = self.state.lock().unwrap();
        state
            .running
            .iter()
            .filter(|id| {
                state
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.monotask.kind() == kind)
            })
            .count()
    }

    pub fn num_active_macrotasks(&self) -> usize {
        self.state.lock().unwrap().active_macrotasks.len()
    }

    /// Polls the bookkeeping sets until both `waiting` and `running` are
    /// empty or the timeout elapses. Returns whether completion was
    /// observed. Polling, not signalling: the completion hot path stays
    /// free of wakeup bookkeeping.
    pub async fn wait_until_all_monotasks_complete(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = self.state.lock().unwrap();
                if state.waiting.is_empty() && state.running.is_empty() {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.completion_poll_interval).await;
        }
    }
}
