use crate::model::{MacrotaskAttemptId, MonotaskId};
use thiserror::Error;

/// Graph-construction and configuration errors.
///
/// Execution failures never appear here: a monotask's `execute` converts
/// them into a boolean outcome at the monotask boundary, and corrupted-graph
/// conditions (double dispatch, dispatching with unmet dependencies) are
/// hard assertions rather than recoverable errors.
#[derive(Error, Debug)]
pub enum DagError {
    #[error("duplicate monotask id {monotask_id} in macrotask attempt {attempt_id}")]
    DuplicateMonotask {
        monotask_id: MonotaskId,
        attempt_id: MacrotaskAttemptId,
    },

    #[error("monotask {monotask_id} depends on unknown monotask {dependency_id}")]
    UnknownDependency {
        monotask_id: MonotaskId,
        dependency_id: MonotaskId,
    },

    #[error("monotask {monotask_id} depends on itself")]
    SelfDependency { monotask_id: MonotaskId },

    #[error("circular dependency in macrotask attempt {attempt_id}")]
    CircularDependency { attempt_id: MacrotaskAttemptId },

    #[error(
        "monotask {monotask_id} belongs to macrotask attempt {found}, expected attempt {expected}"
    )]
    MixedMacrotask {
        monotask_id: MonotaskId,
        found: MacrotaskAttemptId,
        expected: MacrotaskAttemptId,
    },

    #[error("configuration invalid: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, DagError>;
