use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Type aliases
pub type MonotaskId = u64;
pub type MacrotaskAttemptId = u64;

/// Resource kind a monotask is bound to; decides which sub-scheduler runs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Compute,
    Network,
    Disk,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Compute => write!(f, "compute"),
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Disk => write!(f, "disk"),
        }
    }
}

/// Terminal status reported to the execution backend, once per macrotask attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacrotaskStatus {
    Finished,
    Failed,
}

/// Execution context shared by every monotask of one macrotask attempt.
///
/// Read-mostly: the attempt id is fixed at creation; the completion marker
/// flips at most once, when the DAG scheduler finalizes the attempt.
#[derive(Debug)]
pub struct MacrotaskContext {
    attempt_id: MacrotaskAttemptId,
    completed: AtomicBool,
}

impl MacrotaskContext {
    pub fn new(attempt_id: MacrotaskAttemptId) -> Self {
        Self {
            attempt_id,
            completed: AtomicBool::new(false),
        }
    }

    pub fn attempt_id(&self) -> MacrotaskAttemptId {
        self.attempt_id
    }

    /// Marks the macrotask attempt completed. Idempotent; returns true only
    /// for the call that performed the transition.
    pub fn mark_completed(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

/// A fine-grained schedulable unit tied to exactly one resource kind.
///
/// Implementations are created by the macrotask-decomposition layer and
/// handed to the DAG scheduler via a [`MonotaskGraph`](crate::MonotaskGraph).
/// Inter-monotask dependency links live in the graph, keyed by id; the
/// monotask itself only carries identity, kind, context, and behavior.
///
/// `execute` must communicate its outcome solely through the returned
/// boolean. It is never run while the scheduler's bookkeeping lock is held,
/// so it may be arbitrarily slow without stalling unrelated scheduling.
#[async_trait]
pub trait Monotask: Send + Sync + 'static {
    /// Process-unique id, stable for the monotask's lifetime.
    fn id(&self) -> MonotaskId;

    fn kind(&self) -> ResourceKind;

    /// Context of the enclosing macrotask attempt.
    fn context(&self) -> &Arc<MacrotaskContext>;

    /// Runs the unit of work. Returns true on success. Must not panic on
    /// expected failures (missing resources, I/O errors); those are logged
    /// by the implementation and surface as `false`.
    async fn execute(&self) -> bool;

    /// Serialized macrotask result. Present only on the monotask designated
    /// terminal for its macrotask, and only after a successful `execute`.
    fn serialized_result(&self) -> Option<Bytes> {
        None
    }

    /// Serialized reason reported to the backend when `execute` fails.
    fn failure_reason(&self) -> Bytes {
        Bytes::from(format!("monotask {} failed", self.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_completed_is_idempotent() {
        let ctx = MacrotaskContext::new(7);
        assert!(!ctx.is_completed());
        assert!(ctx.mark_completed());
        assert!(!ctx.mark_completed());
        assert!(ctx.is_completed());
        assert_eq!(ctx.attempt_id(), 7);
    }
}
