use crate::model::{Monotask, ResourceKind};
use crate::scheduler::LocalDagScheduler;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Per-resource executor contract.
///
/// `submit_monotask` accepts a ready monotask of the matching kind and must
/// not block: it is called while the DAG scheduler's bookkeeping lock is
/// held. The implementation schedules `execute` under its own concurrency
/// policy and eventually invokes exactly one of the DAG scheduler's
/// `on_completed`/`on_failed` callbacks, from any thread, in any order
/// relative to other monotasks of the same macrotask.
pub trait SubScheduler: Send + Sync {
    fn submit_monotask(&self, monotask: Arc<dyn Monotask>);
}

/// Sub-scheduler backed by a semaphore-bounded pool of tokio tasks.
///
/// One instance per resource kind; the semaphore caps how many monotasks of
/// that kind execute concurrently. Bound to its DAG scheduler after
/// construction via [`bind`](Self::bind), held as a `Weak` so the two do not
/// keep each other alive.
pub struct LocalSubScheduler {
    kind: ResourceKind,
    slots: Arc<Semaphore>,
    scheduler: OnceLock<Weak<LocalDagScheduler>>,
}

impl LocalSubScheduler {
    pub fn new(kind: ResourceKind, workers: usize) -> Arc<Self> {
        Arc::new(Self {
            kind,
            slots: Arc::new(Semaphore::new(workers)),
            scheduler: OnceLock::new(),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Attaches the DAG scheduler that receives completion callbacks.
    pub fn bind(&self, scheduler: &Arc<LocalDagScheduler>) {
        if self.scheduler.set(Arc::downgrade(scheduler)).is_err() {
            warn!(kind = %self.kind, "sub-scheduler already bound; ignoring rebind");
        }
    }
}

impl SubScheduler for LocalSubScheduler {
    fn submit_monotask(&self, monotask: Arc<dyn Monotask>) {
        let Some(scheduler) = self.scheduler.get().and_then(Weak::upgrade) else {
            error!(
                kind = %self.kind,
                monotask_id = monotask.id(),
                "sub-scheduler has no live DAG scheduler; dropping monotask"
            );
            return;
        };
        let slots = self.slots.clone();
        let kind = self.kind;

        tokio::spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!(%kind, "worker semaphore closed; dropping monotask");
                    return;
                }
            };

            let id = monotask.id();
            debug!(monotask_id = id, %kind, "executing monotask");
            if monotask.execute().await {
                let result = monotask.serialized_result();
                scheduler.on_completed(monotask.as_ref(), result);
            } else {
                let reason = monotask.failure_reason();
                scheduler.on_failed(monotask.as_ref(), reason);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoggingBackend;
    use crate::config::SchedulerConfig;
    use crate::model::{MacrotaskContext, MonotaskId};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SleepMonotask {
        id: MonotaskId,
        context: Arc<MacrotaskContext>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Monotask for SleepMonotask {
        fn id(&self) -> MonotaskId {
            self.id
        }

        fn kind(&self) -> ResourceKind {
            ResourceKind::Compute
        }

        fn context(&self) -> &Arc<MacrotaskContext> {
            &self.context
        }

        async fn execute(&self) -> bool {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_unbound_sub_scheduler_drops_monotask() {
        let sub = LocalSubScheduler::new(ResourceKind::Compute, 1);
        let context = Arc::new(MacrotaskContext::new(1));
        let monotask: Arc<dyn Monotask> = Arc::new(SleepMonotask {
            id: 1,
            context,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        });
        // Must not panic or spawn without a scheduler to report to.
        sub.submit_monotask(monotask);
    }

    #[tokio::test]
    async fn test_semaphore_bounds_concurrency() {
        let sub = LocalSubScheduler::new(ResourceKind::Compute, 2);
        let mut subs: HashMap<ResourceKind, Arc<dyn SubScheduler>> = HashMap::new();
        subs.insert(ResourceKind::Compute, sub.clone());
        let scheduler = LocalDagScheduler::new(
            subs,
            Arc::new(LoggingBackend),
            &SchedulerConfig::development(),
        );
        sub.bind(&scheduler);

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let context = Arc::new(MacrotaskContext::new(1));
        for id in 1..=6 {
            scheduler.submit(Arc::new(SleepMonotask {
                id,
                context: context.clone(),
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            }));
        }

        assert!(
            scheduler
                .wait_until_all_monotasks_complete(Duration::from_secs(5))
                .await
        );
        assert!(peak.load(Ordering::SeqCst) <= 2, "worker cap exceeded");
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }
}
