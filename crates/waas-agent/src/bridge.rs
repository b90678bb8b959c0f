//! # Callback Bridge
//!
//! Normalizes the two completion styles of the crypto engine into one
//! awaitable `WaasResult`.
//!
//! ## Responsibilities
//!
//! - Hand a one-shot [`Completion`] to callback-style engine calls and await
//!   its single terminal event
//! - Report a completion dropped without a result as a `ComputeError`
//! - Map synchronous engine results into `WaasResult`
//! - Track outstanding registrations
//!
//! Abandoning the awaiting future releases its registration; a late
//! completion is then discarded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use waas_core::{Completion, EngineResult, WaasError, WaasResult};

/// Bridges engine completions into futures
#[derive(Debug, Clone, Default)]
pub struct CallbackBridge {
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter when the awaiting future finishes or is dropped
struct Registration {
    in_flight: Arc<AtomicUsize>,
}

impl Registration {
    fn new(in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::AcqRel);
        Self { in_flight }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl CallbackBridge {
    /// Create a bridge with no registrations
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callback calls still awaiting their completion
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Invoke a callback-style engine call and await its result
    ///
    /// `invoke` receives the [`Completion`] and must pass it to the engine.
    /// The engine may complete inline or from another thread.
    pub async fn call<F>(&self, operation: &'static str, invoke: F) -> WaasResult<String>
    where
        F: FnOnce(Completion) + Send,
    {
        let _registration = Registration::new(self.in_flight.clone());
        let (tx, rx) = oneshot::channel();
        invoke(Completion::new(move |result| {
            // The receiver is gone if the caller stopped waiting
            let _ = tx.send(result);
        }));

        match rx.await {
            Ok(result) => result.map_err(WaasError::from),
            Err(_) => {
                tracing::warn!(operation, "engine dropped completion without a result");
                Err(WaasError::compute(format!(
                    "{operation} completed without a result"
                )))
            }
        }
    }

    /// Run a synchronous engine call
    pub fn call_sync<T, F>(&self, operation: &'static str, invoke: F) -> WaasResult<T>
    where
        F: FnOnce() -> EngineResult<T>,
    {
        invoke().map_err(|e| {
            tracing::debug!(operation, error = %e, "engine call failed");
            WaasError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use waas_core::EngineError;

    #[tokio::test]
    async fn test_inline_completion() {
        let bridge = CallbackBridge::new();
        let result = bridge
            .call("get_registration_data", |done| done.succeed("data"))
            .await;
        assert_eq!(result.unwrap(), "data");
        assert_eq!(bridge.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_completion_from_other_thread() {
        let bridge = CallbackBridge::new();
        let result = bridge
            .call("export_device_backup", |done| {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(10));
                    done.complete(Err(EngineError::new("no backup")));
                });
            })
            .await;
        assert_eq!(result, Err(WaasError::compute("no backup")));
    }

    #[tokio::test]
    async fn test_dropped_completion_is_compute_error() {
        let bridge = CallbackBridge::new();
        let result = bridge.call("bootstrap_device", drop).await;
        assert_matches!(result, Err(WaasError::ComputeError { message }) if message.contains("without a result"));
    }

    #[tokio::test]
    async fn test_abandoned_call_releases_registration() {
        let bridge = CallbackBridge::new();
        let (park_tx, park_rx) = std::sync::mpsc::channel();

        let waiting = bridge.call("get_registration_data", move |done| {
            let _ = park_tx.send(done);
        });
        let outcome = tokio::time::timeout(Duration::from_millis(20), waiting).await;
        assert!(outcome.is_err());
        assert_eq!(bridge.in_flight(), 0);

        // A late completion after abandonment is harmless
        park_rx.recv().unwrap().succeed("late");
    }

    #[test]
    fn test_sync_call_maps_engine_error() {
        let bridge = CallbackBridge::new();
        let result: WaasResult<()> =
            bridge.call_sync("reset_passcode", || Err(EngineError::new("not bootstrapped")));
        assert_eq!(result, Err(WaasError::compute("not bootstrapped")));
    }
}
