//! # Operation Poller
//!
//! Repeatedly asks the key service for pending MPC operations until at least
//! one materializes or the poll is stopped.
//!
//! ## Responsibilities
//!
//! - At most one active poll per (operation kind, device group)
//! - Run poll loops on a background runtime, never on the caller's task
//! - Stop polls promptly and only report once the slot is free again
//!
//! ## Architecture
//!
//! Each (kind, device group) pair being polled owns a [`PollSlot`]. The
//! `Idle -> Polling` transition is a compare-and-set on the slot state,
//! taken under the slot table lock; whoever wins spawns the loop. The loop
//! task holds a release guard, so the slot returns to `Idle` however the
//! loop ends: materialized, cancelled, errored or aborted because the
//! caller dropped the `start_poll` future. Releasing also removes the slot
//! from the table, which therefore holds only pairs with an active poll.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for the slot table and the per-slot run handle:
//! locks are O(1), never held across `.await`, and do no I/O. The table lock
//! is always taken before a slot's run lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use waas_core::{
    OperationKind, PendingOperation, PendingOperationSet, WaasError, WaasResult,
};

const IDLE: u8 = 0;
const POLLING: u8 = 1;

type SlotKey = (OperationKind, String);
type SlotTable = Mutex<HashMap<SlotKey, Arc<PollSlot>>>;

/// Where a poll loop gets pending operations from
#[async_trait]
pub trait PendingOperationSource: Send + Sync {
    /// Fetch the operations of `kind` currently pending for `device_group`
    async fn fetch_pending(
        &self,
        kind: OperationKind,
        device_group: &str,
    ) -> WaasResult<Vec<PendingOperation>>;
}

/// How a poll ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// At least one operation materialized
    Completed(PendingOperationSet),
    /// The poll was stopped before anything materialized
    Cancelled,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// An active poll was cancelled and its slot is idle again
    Stopped,
    /// Nothing was polling
    NoOp,
}

/// Exclusivity slot of one (kind, device group) pair
#[derive(Debug)]
struct PollSlot {
    state: AtomicU8,
    /// Cancellation sender of the active run; `Some` exactly while polling
    run: Mutex<Option<watch::Sender<bool>>>,
    released: Notify,
}

impl PollSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            run: Mutex::new(None),
            released: Notify::new(),
        }
    }

    fn is_polling(&self) -> bool {
        self.state.load(Ordering::Acquire) == POLLING
    }

    /// Claim the slot, returning the run's cancellation receiver
    fn acquire(&self) -> Option<watch::Receiver<bool>> {
        let mut run = self.run.lock();
        if self
            .state
            .compare_exchange(IDLE, POLLING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let (tx, rx) = watch::channel(false);
        *run = Some(tx);
        Some(rx)
    }

    fn release(&self) {
        {
            let mut run = self.run.lock();
            *run = None;
            self.state.store(IDLE, Ordering::Release);
        }
        self.released.notify_waiters();
    }

    async fn stop(&self) -> StopOutcome {
        let released = self.released.notified();
        tokio::pin!(released);
        released.as_mut().enable();

        {
            let run = self.run.lock();
            match run.as_ref() {
                Some(cancel) => {
                    let _ = cancel.send(true);
                }
                None => return StopOutcome::NoOp,
            }
        }

        released.await;
        StopOutcome::Stopped
    }
}

/// Returns the slot to `Idle` and drops it from the table when the loop
/// task ends or is aborted
struct SlotRelease {
    table: Arc<SlotTable>,
    key: SlotKey,
    slot: Arc<PollSlot>,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut slots = self.table.lock();
        self.slot.release();
        if slots
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
        {
            slots.remove(&self.key);
        }
    }
}

/// Aborts the loop task if the caller stops awaiting it
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_poll_loop(
    kind: OperationKind,
    device_group: String,
    interval: Duration,
    source: Arc<dyn PendingOperationSource>,
    mut cancel: watch::Receiver<bool>,
    _release: SlotRelease,
) -> WaasResult<PollOutcome> {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        tracing::debug!(%kind, device_group = %device_group, attempt, "polling for pending operations");

        let fetched = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return Ok(PollOutcome::Cancelled),
            fetched = source.fetch_pending(kind, &device_group) => fetched,
        };

        let operations = match fetched {
            Ok(operations) => operations,
            Err(err) => {
                tracing::warn!(%kind, device_group = %device_group, error = %err, "poll failed");
                return Err(err);
            }
        };
        if !operations.is_empty() {
            let set = PendingOperationSet::new(kind, device_group, operations)?;
            tracing::info!(%kind, device_group = %set.device_group(), count = set.len(), attempt, "pending operations materialized");
            return Ok(PollOutcome::Completed(set));
        }

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return Ok(PollOutcome::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Polls for pending operations with per-resource exclusivity
#[derive(Debug, Default)]
pub struct OperationPoller {
    slots: Arc<SlotTable>,
    runtime: Option<Handle>,
}

impl OperationPoller {
    /// Poller spawning onto the runtime current at each `start_poll`
    pub fn new() -> Self {
        Self::default()
    }

    /// Poller spawning onto `runtime`
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            slots: Arc::default(),
            runtime: Some(runtime),
        }
    }

    /// Claim the pair's slot, creating it if nothing is polling the pair
    fn claim(&self, key: SlotKey) -> Option<(SlotRelease, watch::Receiver<bool>)> {
        let mut slots = self.slots.lock();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(PollSlot::new()))
            .clone();
        let cancel = slot.acquire()?;
        let release = SlotRelease {
            table: self.slots.clone(),
            key,
            slot,
        };
        Some((release, cancel))
    }

    fn spawn_handle(&self) -> WaasResult<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current()
                .map_err(|e| WaasError::invalid_argument(format!("no runtime to poll on: {e}"))),
        }
    }

    /// Poll until operations of `kind` materialize for `device_group`
    ///
    /// Fails with `AlreadyPolling` if the pair is already being polled. A
    /// source error ends the poll with that error. Dropping the returned
    /// future cancels the loop and frees the slot.
    pub async fn start_poll(
        &self,
        kind: OperationKind,
        device_group: &str,
        interval: Duration,
        source: Arc<dyn PendingOperationSource>,
    ) -> WaasResult<PollOutcome> {
        if interval.is_zero() {
            return Err(WaasError::invalid_argument("poll interval must be greater than zero"));
        }
        if device_group.is_empty() {
            return Err(WaasError::invalid_argument("device group must not be empty"));
        }
        let runtime = self.spawn_handle()?;

        let Some((release, cancel)) = self.claim((kind, device_group.to_string())) else {
            return Err(WaasError::already_polling(kind, device_group));
        };

        tracing::info!(%kind, device_group, interval_ms = interval.as_millis() as u64, "started polling");

        let task = runtime.spawn(run_poll_loop(
            kind,
            device_group.to_string(),
            interval,
            source,
            cancel,
            release,
        ));

        let mut task = AbortOnDrop(task);
        match (&mut task.0).await {
            Ok(outcome) => {
                if matches!(outcome, Ok(PollOutcome::Cancelled)) {
                    tracing::warn!(%kind, "polling stopped before operations materialized");
                }
                outcome
            }
            Err(err) if err.is_cancelled() => Ok(PollOutcome::Cancelled),
            Err(err) => Err(WaasError::cancelled(format!("poll task failed: {err}"))),
        }
    }

    /// Stop every active poll of `kind`
    pub async fn stop_poll(&self, kind: OperationKind) -> StopOutcome {
        let slots: Vec<Arc<PollSlot>> = self
            .slots
            .lock()
            .iter()
            .filter(|((k, _), slot)| *k == kind && slot.is_polling())
            .map(|(_, slot)| slot.clone())
            .collect();
        Self::stop_slots(slots).await
    }

    /// Stop the poll of one (kind, device group) pair
    pub async fn stop_poll_for(&self, kind: OperationKind, device_group: &str) -> StopOutcome {
        let slot = self
            .slots
            .lock()
            .get(&(kind, device_group.to_string()))
            .cloned();
        match slot {
            Some(slot) => slot.stop().await,
            None => StopOutcome::NoOp,
        }
    }

    /// Stop every active poll
    pub async fn stop_all(&self) -> StopOutcome {
        let slots: Vec<Arc<PollSlot>> = self
            .slots
            .lock()
            .values()
            .filter(|slot| slot.is_polling())
            .cloned()
            .collect();
        Self::stop_slots(slots).await
    }

    async fn stop_slots(slots: Vec<Arc<PollSlot>>) -> StopOutcome {
        let outcomes = join_all(slots.iter().map(|slot| slot.stop())).await;
        if outcomes.contains(&StopOutcome::Stopped) {
            StopOutcome::Stopped
        } else {
            StopOutcome::NoOp
        }
    }

    /// True while a poll of the pair is active
    pub fn is_polling(&self, kind: OperationKind, device_group: &str) -> bool {
        self.slots
            .lock()
            .get(&(kind, device_group.to_string()))
            .is_some_and(|slot| slot.is_polling())
    }

    /// Pairs currently being polled
    pub fn active_polls(&self) -> Vec<(OperationKind, String)> {
        let mut active: Vec<(OperationKind, String)> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.is_polling())
            .map(|(key, _)| key.clone())
            .collect();
        active.sort();
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;
    use waas_core::{MpcData, PendingDeviceGroup};

    const GROUP: &str = "pools/p1/deviceGroups/g1";

    /// Reports nothing for `empty_polls` fetches, then one operation
    struct ScriptedSource {
        empty_polls: usize,
        fetches: AtomicUsize,
        fail: bool,
    }

    impl ScriptedSource {
        fn after(empty_polls: usize) -> Arc<Self> {
            Arc::new(Self {
                empty_polls,
                fetches: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn never() -> Arc<Self> {
            Self::after(usize::MAX)
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                empty_polls: 0,
                fetches: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl PendingOperationSource for ScriptedSource {
        async fn fetch_pending(
            &self,
            _kind: OperationKind,
            device_group: &str,
        ) -> WaasResult<Vec<PendingOperation>> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WaasError::service(waas_core::ServiceKind::MpcKey, "unavailable"));
            }
            if n < self.empty_polls {
                return Ok(Vec::new());
            }
            Ok(vec![PendingOperation::CreateDeviceGroup(PendingDeviceGroup {
                device_group: device_group.to_string(),
                operation: "operations/op-1".to_string(),
                mpc_data: MpcData::new("data"),
            })])
        }
    }

    const FAST: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_poll_completes_once_operations_materialize() {
        let poller = OperationPoller::new();
        let source = ScriptedSource::after(2);
        let outcome = poller
            .start_poll(OperationKind::CreateDeviceGroup, GROUP, FAST, source.clone())
            .await
            .unwrap();

        assert_matches!(outcome, PollOutcome::Completed(set) if set.len() == 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
        assert!(!poller.is_polling(OperationKind::CreateDeviceGroup, GROUP));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_poll_is_rejected_until_stopped() {
        let poller = Arc::new(OperationPoller::new());
        let first = {
            let poller = poller.clone();
            tokio::spawn(async move {
                poller
                    .start_poll(OperationKind::CreateSignature, GROUP, FAST, ScriptedSource::never())
                    .await
            })
        };
        while !poller.is_polling(OperationKind::CreateSignature, GROUP) {
            tokio::task::yield_now().await;
        }

        let second = poller
            .start_poll(OperationKind::CreateSignature, GROUP, FAST, ScriptedSource::never())
            .await;
        assert_matches!(second, Err(WaasError::AlreadyPolling { .. }));

        assert_eq!(poller.stop_poll(OperationKind::CreateSignature).await, StopOutcome::Stopped);
        assert!(!poller.is_polling(OperationKind::CreateSignature, GROUP));
        assert_matches!(first.await.unwrap(), Ok(PollOutcome::Cancelled));

        let third = poller
            .start_poll(OperationKind::CreateSignature, GROUP, FAST, ScriptedSource::after(0))
            .await;
        assert_matches!(third, Ok(PollOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let poller = OperationPoller::new();
        assert_eq!(poller.stop_poll(OperationKind::AddDevice).await, StopOutcome::NoOp);
        assert_eq!(
            poller.stop_poll_for(OperationKind::AddDevice, GROUP).await,
            StopOutcome::NoOp
        );
        assert_eq!(poller.stop_all().await, StopOutcome::NoOp);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_different_pairs_poll_independently() {
        let poller = Arc::new(OperationPoller::new());
        let other_group = "pools/p1/deviceGroups/g2";
        let background = {
            let poller = poller.clone();
            tokio::spawn(async move {
                poller
                    .start_poll(OperationKind::PrepareDeviceBackup, GROUP, FAST, ScriptedSource::never())
                    .await
            })
        };
        while !poller.is_polling(OperationKind::PrepareDeviceBackup, GROUP) {
            tokio::task::yield_now().await;
        }

        let same_kind_other_group = poller
            .start_poll(OperationKind::PrepareDeviceBackup, other_group, FAST, ScriptedSource::after(1))
            .await;
        assert_matches!(same_kind_other_group, Ok(PollOutcome::Completed(_)));
        let other_kind = poller
            .start_poll(OperationKind::PrepareDeviceArchive, GROUP, FAST, ScriptedSource::after(0))
            .await;
        assert_matches!(other_kind, Ok(PollOutcome::Completed(_)));

        assert_eq!(
            poller.active_polls(),
            vec![(OperationKind::PrepareDeviceBackup, GROUP.to_string())]
        );
        assert_eq!(poller.stop_all().await, StopOutcome::Stopped);
        assert_matches!(background.await.unwrap(), Ok(PollOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_source_error_ends_poll_and_frees_slot() {
        let poller = OperationPoller::new();
        let source = ScriptedSource::failing();
        let result = poller
            .start_poll(OperationKind::AddDevice, GROUP, FAST, source.clone())
            .await;
        assert_matches!(result, Err(WaasError::ServiceError { .. }));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(!poller.is_polling(OperationKind::AddDevice, GROUP));
    }

    #[tokio::test]
    async fn test_dropping_poll_future_frees_slot() {
        let poller = OperationPoller::new();
        let outcome = tokio::time::timeout(
            Duration::from_millis(30),
            poller.start_poll(OperationKind::CreateDeviceGroup, GROUP, FAST, ScriptedSource::never()),
        )
        .await;
        assert!(outcome.is_err());

        // The aborted task releases the slot once the runtime drops it
        for _ in 0..100 {
            if !poller.is_polling(OperationKind::CreateDeviceGroup, GROUP) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(!poller.is_polling(OperationKind::CreateDeviceGroup, GROUP));
    }

    #[tokio::test]
    async fn test_finished_polls_leave_no_slots_behind() {
        let poller = OperationPoller::new();
        for i in 0..32 {
            let group = format!("pools/p1/deviceGroups/g{i}");
            let outcome = poller
                .start_poll(OperationKind::CreateSignature, &group, FAST, ScriptedSource::after(0))
                .await;
            assert_matches!(outcome, Ok(PollOutcome::Completed(_)));
        }
        let _ = poller
            .start_poll(OperationKind::AddDevice, GROUP, FAST, ScriptedSource::failing())
            .await;

        assert!(poller.slots.lock().is_empty());
        assert!(poller.active_polls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stopped_poll_slot_is_removed_and_reusable() {
        let poller = Arc::new(OperationPoller::new());
        let background = {
            let poller = poller.clone();
            tokio::spawn(async move {
                poller
                    .start_poll(OperationKind::AddDevice, GROUP, FAST, ScriptedSource::never())
                    .await
            })
        };
        while !poller.is_polling(OperationKind::AddDevice, GROUP) {
            tokio::task::yield_now().await;
        }
        assert_eq!(poller.slots.lock().len(), 1);

        assert_eq!(
            poller.stop_poll_for(OperationKind::AddDevice, GROUP).await,
            StopOutcome::Stopped
        );
        assert!(poller.slots.lock().is_empty());
        assert_matches!(background.await.unwrap(), Ok(PollOutcome::Cancelled));

        let again = poller
            .start_poll(OperationKind::AddDevice, GROUP, FAST, ScriptedSource::after(0))
            .await;
        assert_matches!(again, Ok(PollOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_zero_interval_is_invalid() {
        let poller = OperationPoller::new();
        let result = poller
            .start_poll(OperationKind::AddDevice, GROUP, Duration::ZERO, ScriptedSource::after(0))
            .await;
        assert_matches!(result, Err(WaasError::InvalidArgument { .. }));
    }
}
