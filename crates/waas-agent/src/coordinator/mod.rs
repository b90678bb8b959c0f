//! # Workflow Coordinator
//!
//! Entry points for every wallet phase, threaded through one explicit
//! [`WaasContext`].
//!
//! ## Responsibilities
//!
//! - Connect the remote services and the crypto engine once, on `initialize`
//! - Refuse every phase with `NotInitialized` before that, without side effects
//! - Validate resource names before any remote or local call
//! - Poll for pending operations through the [`OperationPoller`], hiding
//!   operations the [`OperationLedger`] has already consumed
//! - Bridge callback-style engine calls through the [`CallbackBridge`]
//!
//! Phases live in submodules by area: `device`, `wallet`, `signing` and
//! `export`. Multi-phase flows are in [`crate::flows`].
//!
//! # Blocking Lock Usage
//!
//! The context slot is a `parking_lot::RwLock`. It is written once by
//! `initialize` and otherwise read to clone the `Arc`; it is never held
//! across `.await`.

mod context;
mod device;
mod export;
mod signing;
mod wallet;

pub use context::WaasContext;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use waas_core::{
    validate_name, ClientConfig, CryptoEngineProvider, InitParams, KeyService, OperationKind,
    PendingOperation, ResourcePattern, ServiceConnector, ServiceKind, WaasError, WaasResult,
};

use crate::bridge::CallbackBridge;
use crate::ledger::OperationLedger;
use crate::poller::{OperationPoller, PendingOperationSource, PollOutcome, StopOutcome};

/// Component named in `NotInitialized` errors raised by engine phases
pub(crate) const ENGINE_COMPONENT: &str = "MPCSdk";

/// Timing used by polls and operation waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Interval between pending-operation polls in flows
    pub poll_interval: Duration,
    /// Interval between long-running operation checks
    pub wait_interval: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            wait_interval: Duration::from_millis(1_000),
        }
    }
}

impl CoordinatorSettings {
    /// Settings taken from a client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            wait_interval: config.wait_interval(),
        }
    }
}

/// Pending-operation source that withholds consumed operations
struct LedgerFilteredSource {
    key: Arc<dyn KeyService>,
    ledger: Arc<OperationLedger>,
}

#[async_trait]
impl PendingOperationSource for LedgerFilteredSource {
    async fn fetch_pending(
        &self,
        kind: OperationKind,
        device_group: &str,
    ) -> WaasResult<Vec<PendingOperation>> {
        let operations = self.key.list_pending_operations(kind, device_group).await?;
        Ok(operations
            .into_iter()
            .filter(|op| {
                let fresh = self.ledger.observe(op);
                if !fresh {
                    tracing::debug!(operation = op.operation(), "skipping claimed or consumed operation");
                }
                fresh
            })
            .collect())
    }
}

/// Orchestrates wallet phases against the remote services and crypto engine
pub struct WorkflowCoordinator {
    connector: Arc<dyn ServiceConnector>,
    engine_provider: Arc<dyn CryptoEngineProvider>,
    context: RwLock<Option<Arc<WaasContext>>>,
    poller: Arc<OperationPoller>,
    ledger: Arc<OperationLedger>,
    bridge: CallbackBridge,
    settings: CoordinatorSettings,
}

impl WorkflowCoordinator {
    /// Coordinator with default settings polling on the caller's runtime
    pub fn new(
        connector: Arc<dyn ServiceConnector>,
        engine_provider: Arc<dyn CryptoEngineProvider>,
    ) -> Self {
        Self {
            connector,
            engine_provider,
            context: RwLock::new(None),
            poller: Arc::new(OperationPoller::new()),
            ledger: Arc::new(OperationLedger::new()),
            bridge: CallbackBridge::new(),
            settings: CoordinatorSettings::default(),
        }
    }

    /// Coordinator using timing from `config`
    pub fn from_config(
        config: &ClientConfig,
        connector: Arc<dyn ServiceConnector>,
        engine_provider: Arc<dyn CryptoEngineProvider>,
    ) -> Self {
        Self::new(connector, engine_provider).with_settings(CoordinatorSettings::from_config(config))
    }

    /// Replace the timing settings
    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run poll loops on `runtime` instead of the caller's runtime
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.poller = Arc::new(OperationPoller::with_runtime(runtime));
        self
    }

    /// Connect the services and initialize the crypto engine
    ///
    /// The connection mode follows [`InitParams::connection_mode`]. Calling
    /// this again once initialized changes nothing.
    pub fn initialize(&self, params: &InitParams) -> WaasResult<()> {
        let mut slot = self.context.write();
        if slot.is_some() {
            tracing::info!("coordinator already initialized, ignoring");
            return Ok(());
        }

        let mode = params.connection_mode()?;
        let services = self.connector.connect(&mode)?;
        let engine = self.engine_provider.initialize(params.is_simulator)?;

        tracing::info!(
            secure = mode.is_secure(),
            is_simulator = params.is_simulator,
            "coordinator initialized"
        );
        *slot = Some(Arc::new(WaasContext::new(
            services,
            engine,
            mode,
            params.is_simulator,
        )));
        Ok(())
    }

    /// True once `initialize` has succeeded
    pub fn is_initialized(&self) -> bool {
        self.context.read().is_some()
    }

    /// The initialized context, or `NotInitialized` naming `component`
    pub fn context(&self, component: &'static str) -> WaasResult<Arc<WaasContext>> {
        self.context
            .read()
            .clone()
            .ok_or(WaasError::NotInitialized { component })
    }

    pub(crate) fn service_context(&self, service: ServiceKind) -> WaasResult<Arc<WaasContext>> {
        self.context(service.name())
    }

    pub(crate) fn engine_context(&self) -> WaasResult<Arc<WaasContext>> {
        self.context(ENGINE_COMPONENT)
    }

    /// Timing settings
    pub fn settings(&self) -> CoordinatorSettings {
        self.settings
    }

    /// Ledger of operations seen in this run
    pub fn ledger(&self) -> &OperationLedger {
        &self.ledger
    }

    /// Poller running this coordinator's polls
    pub fn poller(&self) -> &OperationPoller {
        &self.poller
    }

    /// Bridge used for callback-style engine calls
    pub fn bridge(&self) -> &CallbackBridge {
        &self.bridge
    }

    async fn poll_for(
        &self,
        kind: OperationKind,
        device_group: &str,
        interval: Duration,
    ) -> WaasResult<PollOutcome> {
        let context = self.service_context(ServiceKind::MpcKey)?;
        validate_name("device_group", device_group, ResourcePattern::DeviceGroup)?;

        let source = Arc::new(LedgerFilteredSource {
            key: context.services().key.clone(),
            ledger: self.ledger.clone(),
        });
        self.poller
            .start_poll(kind, device_group, interval, source)
            .await
    }

    async fn stop_polling(&self, kind: OperationKind) -> WaasResult<StopOutcome> {
        self.service_context(ServiceKind::MpcKey)?;
        let outcome = self.poller.stop_poll(kind).await;
        if outcome == StopOutcome::Stopped {
            tracing::info!(%kind, "stopped polling");
        }
        Ok(outcome)
    }

    /// Poll until the CreateDeviceGroup operation of `device_group` materializes
    pub async fn poll_for_pending_device_group(
        &self,
        device_group: &str,
        interval: Duration,
    ) -> WaasResult<PollOutcome> {
        self.poll_for(OperationKind::CreateDeviceGroup, device_group, interval)
            .await
    }

    /// Poll until CreateSignature operations of `device_group` materialize
    pub async fn poll_for_pending_signatures(
        &self,
        device_group: &str,
        interval: Duration,
    ) -> WaasResult<PollOutcome> {
        self.poll_for(OperationKind::CreateSignature, device_group, interval)
            .await
    }

    /// Poll until PrepareDeviceArchive operations of `device_group` materialize
    pub async fn poll_for_pending_device_archives(
        &self,
        device_group: &str,
        interval: Duration,
    ) -> WaasResult<PollOutcome> {
        self.poll_for(OperationKind::PrepareDeviceArchive, device_group, interval)
            .await
    }

    /// Poll until PrepareDeviceBackup operations of `device_group` materialize
    pub async fn poll_for_pending_device_backups(
        &self,
        device_group: &str,
        interval: Duration,
    ) -> WaasResult<PollOutcome> {
        self.poll_for(OperationKind::PrepareDeviceBackup, device_group, interval)
            .await
    }

    /// Poll until AddDevice operations of `device_group` materialize
    pub async fn poll_for_pending_devices(
        &self,
        device_group: &str,
        interval: Duration,
    ) -> WaasResult<PollOutcome> {
        self.poll_for(OperationKind::AddDevice, device_group, interval)
            .await
    }

    /// Stop device group polls
    pub async fn stop_polling_for_device_group(&self) -> WaasResult<StopOutcome> {
        self.stop_polling(OperationKind::CreateDeviceGroup).await
    }

    /// Stop signature polls
    pub async fn stop_polling_for_signatures(&self) -> WaasResult<StopOutcome> {
        self.stop_polling(OperationKind::CreateSignature).await
    }

    /// Stop device archive polls
    pub async fn stop_polling_for_device_archives(&self) -> WaasResult<StopOutcome> {
        self.stop_polling(OperationKind::PrepareDeviceArchive).await
    }

    /// Stop device backup polls
    pub async fn stop_polling_for_device_backups(&self) -> WaasResult<StopOutcome> {
        self.stop_polling(OperationKind::PrepareDeviceBackup).await
    }

    /// Stop add-device polls
    pub async fn stop_polling_for_devices(&self) -> WaasResult<StopOutcome> {
        self.stop_polling(OperationKind::AddDevice).await
    }

    /// Stop every active poll
    pub async fn shutdown(&self) -> StopOutcome {
        let outcome = self.poller.stop_all().await;
        tracing::info!(?outcome, "coordinator shut down");
        outcome
    }

    /// Mark the outcome of a compute call in the ledger
    pub(crate) fn settle<T>(&self, operation: &PendingOperation, result: WaasResult<T>) -> WaasResult<T> {
        match &result {
            Ok(_) => {
                self.ledger.mark_consumed(operation);
                tracing::info!(
                    kind = %operation.kind(),
                    operation = operation.operation(),
                    "operation computed"
                );
            }
            Err(err) => {
                self.ledger.mark_failed(operation);
                tracing::warn!(
                    kind = %operation.kind(),
                    operation = operation.operation(),
                    error = %err,
                    "operation compute failed"
                );
            }
        }
        result
    }
}

impl std::fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("context", &*self.context.read())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use waas_testkit::{TestEnvironment, TEST_PROXY_URL};

    fn coordinator(env: &TestEnvironment) -> WorkflowCoordinator {
        WorkflowCoordinator::new(env.connector.clone(), env.engine_provider.clone())
    }

    #[test]
    fn test_initialize_once() {
        let env = TestEnvironment::new();
        let coordinator = coordinator(&env);
        assert!(!coordinator.is_initialized());

        coordinator
            .initialize(&InitParams::proxy(TEST_PROXY_URL).with_simulator(true))
            .unwrap();
        coordinator.initialize(&InitParams::proxy(TEST_PROXY_URL)).unwrap();

        assert!(coordinator.is_initialized());
        assert_eq!(env.connector.modes().len(), 1);
        assert_eq!(env.engine_provider.simulator_flags(), vec![true]);
    }

    #[test]
    fn test_partial_credentials_leave_coordinator_uninitialized() {
        let env = TestEnvironment::new();
        let coordinator = coordinator(&env);
        let err = coordinator.initialize(&InitParams::direct("organizations/o1/apiKeys/k1", ""));
        assert_matches!(err, Err(WaasError::InvalidArgument { .. }));
        assert!(!coordinator.is_initialized());
        assert!(env.recorder.is_empty());
    }

    #[test]
    fn test_connector_failure_is_surfaced() {
        let env = TestEnvironment::new();
        env.connector.fail_next("bad proxy");
        let coordinator = coordinator(&env);
        let err = coordinator.initialize(&InitParams::proxy(TEST_PROXY_URL));
        assert_matches!(err, Err(WaasError::InvalidArgument { message }) if message == "bad proxy");
        assert!(!coordinator.is_initialized());
    }

    #[test]
    fn test_context_names_component() {
        let env = TestEnvironment::new();
        let coordinator = coordinator(&env);
        assert_matches!(
            coordinator.service_context(ServiceKind::Pool),
            Err(WaasError::NotInitialized { component: "PoolService" })
        );
        assert_matches!(
            coordinator.engine_context(),
            Err(WaasError::NotInitialized { component: "MPCSdk" })
        );
    }

    #[tokio::test]
    async fn test_poll_rejects_malformed_group() {
        let env = TestEnvironment::new();
        let coordinator = coordinator(&env);
        coordinator.initialize(&InitParams::proxy(TEST_PROXY_URL)).unwrap();

        let err = coordinator
            .poll_for_pending_signatures("pools/p1", Duration::from_millis(5))
            .await;
        assert_matches!(err, Err(WaasError::InvalidArgument { .. }));
        assert_eq!(env.recorder.count("KeyService.list_pending_operations"), 0);
    }

    #[tokio::test]
    async fn test_stop_polling_when_idle_is_noop() {
        let env = TestEnvironment::new();
        let coordinator = coordinator(&env);
        coordinator.initialize(&InitParams::proxy(TEST_PROXY_URL)).unwrap();
        assert_eq!(
            coordinator.stop_polling_for_devices().await.unwrap(),
            StopOutcome::NoOp
        );
        assert_eq!(coordinator.shutdown().await, StopOutcome::NoOp);
    }

    #[test]
    fn test_settings_from_config() {
        let config = ClientConfig {
            poll_interval_ms: 250,
            wait_interval_ms: 50,
            ..ClientConfig::default()
        };
        let settings = CoordinatorSettings::from_config(&config);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.wait_interval, Duration::from_millis(50));
    }
}
