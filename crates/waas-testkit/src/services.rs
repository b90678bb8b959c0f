//! In-memory doubles for the Key, Wallet and Pool services
//!
//! The three doubles share one [`MockBackend`] that models the remote side:
//! initiating an operation adds a pending MPC operation for its device
//! group, and the operation completes once the linked
//! [`MockCryptoEngine`](crate::MockCryptoEngine) computes it.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex`; no double awaits while holding it.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use waas_core::{
    Address, CreateMpcWalletResponse, Device, DeviceGroup, KeyService, LongRunningOperation,
    MpcData, MpcWallet, OperationKind, PendingDevice, PendingDeviceArchive, PendingDeviceBackup,
    PendingDeviceGroup, PendingOperation, PendingSignature, Pool, PoolService, ServiceHandles,
    ServiceKind, Signature, Transaction, WaasError, WaasResult, WalletService,
};

use crate::recorder::CallRecorder;

/// Shared remote state behind the service doubles
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<BackendState>,
    recorder: CallRecorder,
}

#[derive(Debug, Default)]
struct BackendState {
    next_id: u64,
    devices: Vec<String>,
    device_groups: HashMap<String, DeviceGroup>,
    wallets: HashMap<String, MpcWallet>,
    wallet_operations: HashMap<String, WalletOperation>,
    signature_operations: HashMap<String, SignatureOperation>,
    pending: Vec<PendingOperation>,
    addresses: HashMap<String, Address>,
    pools: HashMap<String, Pool>,
    failures: HashMap<String, String>,
    delayed_polls: HashMap<(OperationKind, String), usize>,
    retain_completed: bool,
}

#[derive(Debug, Clone)]
struct WalletOperation {
    wallet: MpcWallet,
    device: String,
    done: bool,
}

#[derive(Debug, Clone)]
struct SignatureOperation {
    signature: Signature,
    done: bool,
}

impl BackendState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn digest_hex(input: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(input.as_ref()))
}

fn trait_name(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::MpcKey => "KeyService",
        ServiceKind::MpcWallet => "WalletService",
        ServiceKind::Pool => "PoolService",
    }
}

impl MockBackend {
    /// Create an empty backend recording into `recorder`
    pub fn new(recorder: CallRecorder) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState::default()),
            recorder,
        })
    }

    /// Recorder shared with the other doubles
    pub fn recorder(&self) -> &CallRecorder {
        &self.recorder
    }

    /// Service handles backed by this backend
    pub fn handles(self: &Arc<Self>) -> ServiceHandles {
        ServiceHandles {
            key: Arc::new(MockKeyService::new(self.clone())),
            wallet: Arc::new(MockWalletService::new(self.clone())),
            pool: Arc::new(MockPoolService::new(self.clone())),
        }
    }

    /// Fail the next call to `call` (e.g. `WalletService.create_mpc_wallet`)
    pub fn fail_next(&self, call: &str, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .insert(call.to_string(), message.into());
    }

    /// Report nothing pending for the next `polls` list calls of a pair
    pub fn delay_pending(&self, kind: OperationKind, device_group: &str, polls: usize) {
        self.state
            .lock()
            .delayed_polls
            .insert((kind, device_group.to_string()), polls);
    }

    /// Keep completed operations in pending listings, like a lagging server
    pub fn retain_completed_operations(&self, retain: bool) {
        self.state.lock().retain_completed = retain;
    }

    /// Add a scripted pending operation
    pub fn inject_pending(&self, operation: PendingOperation) {
        self.state.lock().pending.push(operation);
    }

    /// Snapshot of pending operations
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.state.lock().pending.clone()
    }

    /// Insert a device group directly
    pub fn add_device_group(&self, group: DeviceGroup) {
        self.state
            .lock()
            .device_groups
            .insert(group.name.clone(), group);
    }

    /// Look up a device group
    pub fn device_group(&self, name: &str) -> Option<DeviceGroup> {
        self.state.lock().device_groups.get(name).cloned()
    }

    /// Registered device names
    pub fn devices(&self) -> Vec<String> {
        self.state.lock().devices.clone()
    }

    /// Complete the pending operation carrying `mpc_data`.
    ///
    /// Returns false if no pending operation matches.
    pub fn complete_operation(&self, mpc_data: &MpcData) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.pending.iter().position(|op| op.mpc_data() == mpc_data) else {
            return false;
        };
        let operation = if state.retain_completed {
            state.pending[index].clone()
        } else {
            state.pending.remove(index)
        };

        match &operation {
            PendingOperation::CreateDeviceGroup(op) => {
                if let Some(wallet_op) = state.wallet_operations.get_mut(&op.operation) {
                    wallet_op.done = true;
                    let wallet = wallet_op.wallet.clone();
                    let device = wallet_op.device.clone();
                    let id = state.next_id();
                    state.device_groups.insert(
                        op.device_group.clone(),
                        DeviceGroup {
                            name: op.device_group.clone(),
                            mpc_key_export_metadata: format!("export-metadata-{id}"),
                            devices: vec![device],
                        },
                    );
                    state.wallets.insert(wallet.name.clone(), wallet);
                }
            }
            PendingOperation::CreateSignature(op) => {
                if let Some(sig_op) = state.signature_operations.get_mut(&op.operation) {
                    sig_op.done = true;
                }
            }
            PendingOperation::AddDevice(op) => {
                if let (Some(device), Some(group)) = (
                    op.device.clone(),
                    state.device_groups.get_mut(&op.device_group),
                ) {
                    group.devices.push(device);
                }
            }
            PendingOperation::PrepareDeviceArchive(_) | PendingOperation::PrepareDeviceBackup(_) => {}
        }
        true
    }

    fn begin(&self, service: ServiceKind, call: &str) -> WaasResult<parking_lot::MutexGuard<'_, BackendState>> {
        let label = format!("{}.{call}", trait_name(service));
        self.recorder.record(label.clone());
        let mut state = self.state.lock();
        if let Some(message) = state.failures.remove(&label) {
            return Err(WaasError::service(service, message));
        }
        Ok(state)
    }

    fn initiate_group_operation(
        &self,
        call: &str,
        kind: OperationKind,
        device_group: &str,
        device: &str,
    ) -> WaasResult<String> {
        let mut state = self.begin(ServiceKind::MpcKey, call)?;
        if !state.device_groups.contains_key(device_group) {
            return Err(WaasError::service(
                ServiceKind::MpcKey,
                format!("device group not found: {device_group}"),
            ));
        }
        let id = state.next_id();
        let operation = format!("operations/{}-{id}", kind.as_str().to_lowercase());
        let mpc_data = MpcData::new(format!("mpc-{kind}-{id}"));
        let device_group = device_group.to_string();
        let device = Some(device.to_string());
        let pending = match kind {
            OperationKind::PrepareDeviceArchive => {
                PendingOperation::PrepareDeviceArchive(PendingDeviceArchive {
                    device_group,
                    operation: operation.clone(),
                    mpc_data,
                    device,
                })
            }
            OperationKind::PrepareDeviceBackup => {
                PendingOperation::PrepareDeviceBackup(PendingDeviceBackup {
                    device_group,
                    operation: operation.clone(),
                    mpc_data,
                    device,
                })
            }
            _ => PendingOperation::AddDevice(PendingDevice {
                device_group,
                operation: operation.clone(),
                mpc_data,
                device,
            }),
        };
        state.pending.push(pending);
        Ok(operation)
    }
}

/// Key service double
#[derive(Debug, Clone)]
pub struct MockKeyService {
    backend: Arc<MockBackend>,
}

impl MockKeyService {
    /// Wrap a backend
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl KeyService for MockKeyService {
    async fn register_device(&self, registration_data: &str) -> WaasResult<Device> {
        let mut state = self.backend.begin(ServiceKind::MpcKey, "register_device")?;
        if registration_data.is_empty() {
            return Err(WaasError::service(
                ServiceKind::MpcKey,
                "registration data must not be empty",
            ));
        }
        let id = state.next_id();
        let name = format!("devices/device-{id}");
        state.devices.push(name.clone());
        Ok(Device { name })
    }

    async fn list_pending_operations(
        &self,
        kind: OperationKind,
        device_group: &str,
    ) -> WaasResult<Vec<PendingOperation>> {
        let mut state = self
            .backend
            .begin(ServiceKind::MpcKey, "list_pending_operations")?;
        let key = (kind, device_group.to_string());
        if let Some(remaining) = state.delayed_polls.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Vec::new());
            }
        }
        Ok(state
            .pending
            .iter()
            .filter(|op| op.kind() == kind && op.device_group() == device_group)
            .cloned()
            .collect())
    }

    async fn get_device_group(&self, name: &str) -> WaasResult<DeviceGroup> {
        let state = self.backend.begin(ServiceKind::MpcKey, "get_device_group")?;
        state.device_groups.get(name).cloned().ok_or_else(|| {
            WaasError::service(ServiceKind::MpcKey, format!("device group not found: {name}"))
        })
    }

    async fn create_signature(
        &self,
        parent: &str,
        transaction: &Transaction,
    ) -> WaasResult<String> {
        let mut state = self.backend.begin(ServiceKind::MpcKey, "create_signature")?;
        let device_group = parent
            .split("/mpcKeys/")
            .next()
            .unwrap_or(parent)
            .to_string();
        let tx_json = transaction.to_json()?;
        let payload = digest_hex(tx_json.as_bytes());
        let id = state.next_id();
        let operation = format!("operations/signature-{id}");
        let signature = Signature {
            name: format!("{parent}/signatures/signature-{id}"),
            signed_payload: digest_hex(format!("signed:{payload}")),
            payload: payload.clone(),
        };
        state.signature_operations.insert(
            operation.clone(),
            SignatureOperation {
                signature,
                done: false,
            },
        );
        state
            .pending
            .push(PendingOperation::CreateSignature(PendingSignature {
                device_group,
                operation: operation.clone(),
                mpc_data: MpcData::new(format!("mpc-CreateSignature-{id}")),
                payload,
            }));
        Ok(operation)
    }

    async fn get_signature_operation(
        &self,
        operation: &str,
    ) -> WaasResult<LongRunningOperation<Signature>> {
        let state = self
            .backend
            .begin(ServiceKind::MpcKey, "get_signature_operation")?;
        let op = state.signature_operations.get(operation).ok_or_else(|| {
            WaasError::service(ServiceKind::MpcKey, format!("operation not found: {operation}"))
        })?;
        Ok(if op.done {
            LongRunningOperation::completed(operation, op.signature.clone())
        } else {
            LongRunningOperation::pending(operation)
        })
    }

    async fn prepare_device_archive(
        &self,
        device_group: &str,
        device: &str,
    ) -> WaasResult<String> {
        self.backend.initiate_group_operation(
            "prepare_device_archive",
            OperationKind::PrepareDeviceArchive,
            device_group,
            device,
        )
    }

    async fn prepare_device_backup(&self, device_group: &str, device: &str) -> WaasResult<String> {
        self.backend.initiate_group_operation(
            "prepare_device_backup",
            OperationKind::PrepareDeviceBackup,
            device_group,
            device,
        )
    }

    async fn add_device(&self, device_group: &str, device: &str) -> WaasResult<String> {
        self.backend.initiate_group_operation(
            "add_device",
            OperationKind::AddDevice,
            device_group,
            device,
        )
    }
}

/// Wallet service double
#[derive(Debug, Clone)]
pub struct MockWalletService {
    backend: Arc<MockBackend>,
}

impl MockWalletService {
    /// Wrap a backend
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl WalletService for MockWalletService {
    async fn create_mpc_wallet(
        &self,
        parent: &str,
        device: &str,
    ) -> WaasResult<CreateMpcWalletResponse> {
        let mut state = self
            .backend
            .begin(ServiceKind::MpcWallet, "create_mpc_wallet")?;
        let id = state.next_id();
        let device_group = format!("{parent}/deviceGroups/group-{id}");
        let operation = format!("operations/wallet-{id}");
        state.wallet_operations.insert(
            operation.clone(),
            WalletOperation {
                wallet: MpcWallet {
                    name: format!("{parent}/mpcWallets/wallet-{id}"),
                    device_group: device_group.clone(),
                },
                device: device.to_string(),
                done: false,
            },
        );
        state
            .pending
            .push(PendingOperation::CreateDeviceGroup(PendingDeviceGroup {
                device_group: device_group.clone(),
                operation: operation.clone(),
                mpc_data: MpcData::new(format!("mpc-CreateDeviceGroup-{id}")),
            }));
        Ok(CreateMpcWalletResponse {
            device_group,
            operation,
        })
    }

    async fn get_mpc_wallet_operation(
        &self,
        operation: &str,
    ) -> WaasResult<LongRunningOperation<MpcWallet>> {
        let state = self
            .backend
            .begin(ServiceKind::MpcWallet, "get_mpc_wallet_operation")?;
        let op = state.wallet_operations.get(operation).ok_or_else(|| {
            WaasError::service(
                ServiceKind::MpcWallet,
                format!("operation not found: {operation}"),
            )
        })?;
        Ok(if op.done {
            LongRunningOperation::completed(operation, op.wallet.clone())
        } else {
            LongRunningOperation::pending(operation)
        })
    }

    async fn generate_address(&self, mpc_wallet: &str, network: &str) -> WaasResult<Address> {
        let mut state = self
            .backend
            .begin(ServiceKind::MpcWallet, "generate_address")?;
        let Some(wallet) = state.wallets.get(mpc_wallet).cloned() else {
            return Err(WaasError::service(
                ServiceKind::MpcWallet,
                format!("wallet not found: {mpc_wallet}"),
            ));
        };
        let id = state.next_id();
        let digest = digest_hex(format!("{mpc_wallet}/{id}"));
        let address = Address {
            name: format!("networks/{network}/addresses/address-{id}"),
            address: format!("0x{}", &digest[..40]),
            mpc_wallet: mpc_wallet.to_string(),
            mpc_keys: vec![format!("{}/mpcKeys/key-{id}", wallet.device_group)],
        };
        state.addresses.insert(address.name.clone(), address.clone());
        Ok(address)
    }

    async fn get_address(&self, name: &str) -> WaasResult<Address> {
        let state = self.backend.begin(ServiceKind::MpcWallet, "get_address")?;
        state.addresses.get(name).cloned().ok_or_else(|| {
            WaasError::service(ServiceKind::MpcWallet, format!("address not found: {name}"))
        })
    }
}

/// Pool service double
#[derive(Debug, Clone)]
pub struct MockPoolService {
    backend: Arc<MockBackend>,
}

impl MockPoolService {
    /// Wrap a backend
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PoolService for MockPoolService {
    async fn create_pool(&self, display_name: &str, pool_id: &str) -> WaasResult<Pool> {
        let mut state = self.backend.begin(ServiceKind::Pool, "create_pool")?;
        let id = if pool_id.is_empty() {
            format!("pool-{}", state.next_id())
        } else {
            pool_id.to_string()
        };
        let name = format!("pools/{id}");
        if state.pools.contains_key(&name) {
            return Err(WaasError::service(
                ServiceKind::Pool,
                format!("pool already exists: {name}"),
            ));
        }
        let pool = Pool {
            name: name.clone(),
            display_name: display_name.to_string(),
        };
        state.pools.insert(name, pool.clone());
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_wallet_creation_materializes_group_operation() {
        let backend = MockBackend::new(CallRecorder::new());
        let handles = backend.handles();

        let response = handles
            .wallet
            .create_mpc_wallet("pools/p1", "devices/d1")
            .await
            .unwrap();
        let pending = handles
            .key
            .list_pending_operations(OperationKind::CreateDeviceGroup, &response.device_group)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation(), response.operation);

        let op = handles
            .wallet
            .get_mpc_wallet_operation(&response.operation)
            .await
            .unwrap();
        assert!(!op.done);

        assert!(backend.complete_operation(pending[0].mpc_data()));
        let op = handles
            .wallet
            .get_mpc_wallet_operation(&response.operation)
            .await
            .unwrap();
        assert!(op.done);
        assert!(backend.device_group(&response.device_group).is_some());
    }

    #[tokio::test]
    async fn test_scripted_failure_fires_once() {
        let backend = MockBackend::new(CallRecorder::new());
        let handles = backend.handles();
        backend.fail_next("PoolService.create_pool", "quota exceeded");

        let err = handles.pool.create_pool("Test", "p1").await;
        assert_matches!(err, Err(WaasError::ServiceError { service: ServiceKind::Pool, .. }));
        handles.pool.create_pool("Test", "p1").await.unwrap();
        assert_eq!(backend.recorder().count("PoolService.create_pool"), 2);
    }

    #[tokio::test]
    async fn test_delayed_polls_report_nothing() {
        let backend = MockBackend::new(CallRecorder::new());
        let handles = backend.handles();
        let response = handles
            .wallet
            .create_mpc_wallet("pools/p1", "devices/d1")
            .await
            .unwrap();
        backend.delay_pending(OperationKind::CreateDeviceGroup, &response.device_group, 1);

        let first = handles
            .key
            .list_pending_operations(OperationKind::CreateDeviceGroup, &response.device_group)
            .await
            .unwrap();
        assert!(first.is_empty());
        let second = handles
            .key
            .list_pending_operations(OperationKind::CreateDeviceGroup, &response.device_group)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
    }
}
