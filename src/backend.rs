use crate::model::{MacrotaskAttemptId, MacrotaskStatus};
use bytes::Bytes;
use tracing::info;

/// Receiver of final macrotask status.
///
/// The DAG scheduler calls `status_update` at most once per macrotask
/// attempt, from whichever thread finalized the attempt, after that
/// thread's bookkeeping has been fully applied. The payload is the
/// serialized result for `Finished` and the serialized failure reason for
/// `Failed`; the scheduler treats it as opaque bytes.
pub trait ExecutionBackend: Send + Sync {
    fn status_update(
        &self,
        attempt_id: MacrotaskAttemptId,
        status: MacrotaskStatus,
        payload: Bytes,
    );
}

/// Backend that only logs terminal statuses. Useful as a default sink and
/// in examples where no driver is attached.
#[derive(Debug, Default)]
pub struct LoggingBackend;

impl ExecutionBackend for LoggingBackend {
    fn status_update(
        &self,
        attempt_id: MacrotaskAttemptId,
        status: MacrotaskStatus,
        payload: Bytes,
    ) {
        info!(
            attempt_id,
            ?status,
            payload_len = payload.len(),
            "macrotask status update"
        );
    }
}
