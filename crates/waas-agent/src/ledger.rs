//! Operation ledger
//!
//! Tracks the lifecycle of every MPC operation seen during a run so a
//! consumed operation is never computed twice.
//!
//! ```text
//! Pending --poll--> Materialized --begin--> Computing --ok--> Consumed
//!                        ^                      |
//!                        |                     err
//!                        +------- Failed <------+
//! ```
//!
//! A failed compute leaves the operation eligible for a later poll; only a
//! successful compute is terminal. While an operation is `Computing` polls
//! withhold it and every other compute call is refused.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for the entry table: every access is a map
//! lookup or insert and the lock is never held across `.await`.

use std::collections::HashMap;

use parking_lot::Mutex;
use waas_core::{OperationKind, OperationStatus, PendingOperation, WaasError, WaasResult};

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: OperationKind,
    status: OperationStatus,
}

/// Per-run record of operation status keyed by operation name
#[derive(Debug, Default)]
pub struct OperationLedger {
    entries: Mutex<HashMap<String, Entry>>,
}

impl OperationLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation the caller just initiated
    pub fn record_pending(&self, operation: &str, kind: OperationKind) {
        self.entries
            .lock()
            .entry(operation.to_string())
            .or_insert(Entry {
                kind,
                status: OperationStatus::Pending,
            });
    }

    /// Note that a poll returned `operation`
    ///
    /// Returns false if the operation is being computed or was already
    /// consumed and must be withheld from the caller.
    pub fn observe(&self, operation: &PendingOperation) -> bool {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(operation.operation().to_string())
            .or_insert(Entry {
                kind: operation.kind(),
                status: OperationStatus::Materialized,
            });
        match entry.status {
            OperationStatus::Computing | OperationStatus::Consumed => false,
            OperationStatus::Pending | OperationStatus::Failed => {
                entry.status = OperationStatus::Materialized;
                true
            }
            OperationStatus::Materialized => true,
        }
    }

    /// Claim `operation` for a compute call accepting `allowed`
    ///
    /// The claim moves the operation to `Computing` under the table lock, so
    /// of two concurrent callers only one reaches the engine. Settle the
    /// claim with [`mark_consumed`](Self::mark_consumed) or
    /// [`mark_failed`](Self::mark_failed).
    pub fn begin_compute(
        &self,
        operation: &PendingOperation,
        allowed: &[OperationKind],
    ) -> WaasResult<()> {
        let kind = operation.kind();
        if !allowed.contains(&kind) {
            return Err(WaasError::invalid_argument(format!(
                "{kind} operation {} cannot be computed here",
                operation.operation()
            )));
        }

        let mut entries = self.entries.lock();
        let entry = entries
            .entry(operation.operation().to_string())
            .or_insert(Entry {
                kind,
                status: OperationStatus::Materialized,
            });
        match entry.status {
            OperationStatus::Computing | OperationStatus::Consumed => {
                Err(WaasError::operation_consumed(operation.operation()))
            }
            OperationStatus::Pending | OperationStatus::Materialized | OperationStatus::Failed => {
                entry.status = OperationStatus::Computing;
                Ok(())
            }
        }
    }

    /// Mark a successfully computed operation
    pub fn mark_consumed(&self, operation: &PendingOperation) {
        self.set(operation, OperationStatus::Consumed);
    }

    /// Mark an operation whose compute failed
    pub fn mark_failed(&self, operation: &PendingOperation) {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(operation.operation().to_string())
            .or_insert(Entry {
                kind: operation.kind(),
                status: OperationStatus::Failed,
            });
        if entry.status != OperationStatus::Consumed {
            entry.status = OperationStatus::Failed;
        }
    }

    fn set(&self, operation: &PendingOperation, status: OperationStatus) {
        self.entries.lock().insert(
            operation.operation().to_string(),
            Entry {
                kind: operation.kind(),
                status,
            },
        );
    }

    /// Current status of `operation`, if seen
    pub fn status(&self, operation: &str) -> Option<OperationStatus> {
        self.entries.lock().get(operation).map(|e| e.status)
    }

    /// Kind recorded for `operation`, if seen
    pub fn kind(&self, operation: &str) -> Option<OperationKind> {
        self.entries.lock().get(operation).map(|e| e.kind)
    }

    /// True once `operation` has been computed successfully
    pub fn is_consumed(&self, operation: &str) -> bool {
        self.status(operation) == Some(OperationStatus::Consumed)
    }

    /// Number of consumed operations
    pub fn consumed_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|e| e.status == OperationStatus::Consumed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use waas_core::{MpcData, PendingDeviceGroup, PendingSignature};

    fn group_op(operation: &str) -> PendingOperation {
        PendingOperation::CreateDeviceGroup(PendingDeviceGroup {
            device_group: "pools/p1/deviceGroups/g1".to_string(),
            operation: operation.to_string(),
            mpc_data: MpcData::new("data"),
        })
    }

    #[test]
    fn test_lifecycle_to_consumed() {
        let ledger = OperationLedger::new();
        let op = group_op("operations/w1");

        ledger.record_pending("operations/w1", OperationKind::CreateDeviceGroup);
        assert_eq!(ledger.status("operations/w1"), Some(OperationStatus::Pending));

        assert!(ledger.observe(&op));
        assert_eq!(ledger.status("operations/w1"), Some(OperationStatus::Materialized));

        ledger
            .begin_compute(&op, &[OperationKind::CreateDeviceGroup])
            .unwrap();
        ledger.mark_consumed(&op);
        assert!(ledger.is_consumed("operations/w1"));
        assert!(!ledger.observe(&op));
        assert_eq!(ledger.consumed_count(), 1);
    }

    #[test]
    fn test_consumed_operation_is_refused() {
        let ledger = OperationLedger::new();
        let op = group_op("operations/w1");
        ledger.mark_consumed(&op);

        let err = ledger.begin_compute(&op, &[OperationKind::CreateDeviceGroup]);
        assert_matches!(err, Err(WaasError::OperationConsumed { operation }) if operation == "operations/w1");
    }

    #[test]
    fn test_kind_mismatch_is_invalid_argument() {
        let ledger = OperationLedger::new();
        let op = PendingOperation::CreateSignature(PendingSignature {
            device_group: "pools/p1/deviceGroups/g1".to_string(),
            operation: "operations/s1".to_string(),
            mpc_data: MpcData::new("data"),
            payload: "abcd".to_string(),
        });

        let err = ledger.begin_compute(&op, &[OperationKind::AddDevice]);
        assert_matches!(err, Err(WaasError::InvalidArgument { .. }));
    }

    #[test]
    fn test_failed_compute_can_be_retried_after_poll() {
        let ledger = OperationLedger::new();
        let op = group_op("operations/w1");
        assert!(ledger.observe(&op));
        ledger.mark_failed(&op);
        assert_eq!(ledger.status("operations/w1"), Some(OperationStatus::Failed));

        assert!(ledger.observe(&op));
        assert!(ledger
            .begin_compute(&op, &[OperationKind::CreateDeviceGroup])
            .is_ok());
    }

    #[test]
    fn test_claimed_operation_is_withheld_and_refused() {
        let ledger = OperationLedger::new();
        let op = group_op("operations/w1");
        assert!(ledger.observe(&op));

        ledger
            .begin_compute(&op, &[OperationKind::CreateDeviceGroup])
            .unwrap();
        assert_eq!(ledger.status("operations/w1"), Some(OperationStatus::Computing));
        assert!(!ledger.observe(&op));
        assert_matches!(
            ledger.begin_compute(&op, &[OperationKind::CreateDeviceGroup]),
            Err(WaasError::OperationConsumed { .. })
        );

        ledger.mark_failed(&op);
        assert!(ledger.observe(&op));
    }

    #[test]
    fn test_concurrent_claims_admit_one_caller() {
        let ledger = std::sync::Arc::new(OperationLedger::new());
        let op = group_op("operations/w1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                let op = op.clone();
                std::thread::spawn(move || {
                    ledger
                        .begin_compute(&op, &[OperationKind::CreateDeviceGroup])
                        .is_ok()
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_failure_never_downgrades_consumed() {
        let ledger = OperationLedger::new();
        let op = group_op("operations/w1");
        ledger.mark_consumed(&op);
        ledger.mark_failed(&op);
        assert!(ledger.is_consumed("operations/w1"));
        assert_eq!(ledger.kind("operations/w1"), Some(OperationKind::CreateDeviceGroup));
    }
}
