//! Remote service effect traits
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `waas-client` (REST), `waas-testkit` (recording doubles)
//! - **Usage**: `waas-agent` phases, through the `WaasContext`
//!
//! Every method validates nothing itself; callers check resource names
//! before issuing a call. Failures are `ServiceError`s carrying the remote
//! message verbatim.

use crate::config::ConnectionMode;
use crate::errors::WaasResult;
use crate::types::{
    Address, CreateMpcWalletResponse, Device, DeviceGroup, LongRunningOperation, MpcWallet,
    OperationKind, PendingOperation, Pool, Signature, Transaction,
};
use async_trait::async_trait;
use std::sync::Arc;

/// MPC Key Service: devices, device groups, signatures and MPC operations
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Register the local device from its registration data
    async fn register_device(&self, registration_data: &str) -> WaasResult<Device>;

    /// List operations of `kind` waiting on a local compute step
    async fn list_pending_operations(
        &self,
        kind: OperationKind,
        device_group: &str,
    ) -> WaasResult<Vec<PendingOperation>>;

    /// Fetch a device group
    async fn get_device_group(&self, name: &str) -> WaasResult<DeviceGroup>;

    /// Initiate a signature over a transaction, returning the operation name
    async fn create_signature(&self, parent: &str, transaction: &Transaction)
        -> WaasResult<String>;

    /// Fetch the long-running operation of a signature
    async fn get_signature_operation(
        &self,
        operation: &str,
    ) -> WaasResult<LongRunningOperation<Signature>>;

    /// Initiate archive preparation, returning the operation name
    async fn prepare_device_archive(&self, device_group: &str, device: &str)
        -> WaasResult<String>;

    /// Initiate backup preparation, returning the operation name
    async fn prepare_device_backup(&self, device_group: &str, device: &str) -> WaasResult<String>;

    /// Initiate adding a device, returning the operation name
    async fn add_device(&self, device_group: &str, device: &str) -> WaasResult<String>;
}

/// MPC Wallet Service: wallets and addresses
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Initiate wallet creation under a pool for a device
    async fn create_mpc_wallet(
        &self,
        parent: &str,
        device: &str,
    ) -> WaasResult<CreateMpcWalletResponse>;

    /// Fetch the long-running operation of a wallet creation
    async fn get_mpc_wallet_operation(
        &self,
        operation: &str,
    ) -> WaasResult<LongRunningOperation<MpcWallet>>;

    /// Derive a new address of a wallet on a network
    async fn generate_address(&self, mpc_wallet: &str, network: &str) -> WaasResult<Address>;

    /// Fetch an address
    async fn get_address(&self, name: &str) -> WaasResult<Address>;
}

/// Pool Service
#[async_trait]
pub trait PoolService: Send + Sync {
    /// Create a pool
    async fn create_pool(&self, display_name: &str, pool_id: &str) -> WaasResult<Pool>;
}

/// Connected handles to the three services
#[derive(Clone)]
pub struct ServiceHandles {
    /// MPC Key Service
    pub key: Arc<dyn KeyService>,
    /// MPC Wallet Service
    pub wallet: Arc<dyn WalletService>,
    /// Pool Service
    pub pool: Arc<dyn PoolService>,
}

/// Builds service handles for a connection mode
pub trait ServiceConnector: Send + Sync {
    /// Connect the three services
    fn connect(&self, mode: &ConnectionMode) -> WaasResult<ServiceHandles>;
}
