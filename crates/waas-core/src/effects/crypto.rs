//! Crypto engine effect trait
//!
//! # Effect Classification
//!
//! - **Category**: External Collaborator
//! - **Implementation**: the platform MPC SDK; `waas-testkit` provides a double
//! - **Usage**: `waas-agent` compute phases
//!
//! The engine is synchronous. Three calls report their result through a
//! one-shot [`Completion`] instead of a return value; `waas-agent` bridges
//! them into futures.

use crate::errors::WaasError;
use crate::types::{DeviceBackup, MpcData, Passcode, RawSignedTransaction, Signature};
use crate::WaasResult;
use std::fmt;
use std::sync::Arc;

/// Failure reported by the crypto engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    /// Engine message
    pub message: String,
}

impl EngineError {
    /// Create an engine error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<EngineError> for WaasError {
    fn from(err: EngineError) -> Self {
        WaasError::compute(err.message)
    }
}

/// Result of an engine call
pub type EngineResult<T> = Result<T, EngineError>;

/// One-shot completion handed to callback-style engine calls
///
/// Consuming it with [`Completion::complete`] delivers the terminal event.
/// Dropping it without completing is observed by the caller as a failure.
pub struct Completion {
    deliver: Box<dyn FnOnce(EngineResult<String>) + Send>,
}

impl Completion {
    /// Wrap a delivery function
    pub fn new<F>(deliver: F) -> Self
    where
        F: FnOnce(EngineResult<String>) + Send + 'static,
    {
        Self {
            deliver: Box::new(deliver),
        }
    }

    /// Deliver the result
    pub fn complete(self, result: EngineResult<String>) {
        (self.deliver)(result);
    }

    /// Deliver a success
    pub fn succeed(self, value: impl Into<String>) {
        self.complete(Ok(value.into()));
    }

    /// Deliver a failure
    pub fn fail(self, message: impl Into<String>) {
        self.complete(Err(EngineError::new(message)));
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// Local MPC primitives
pub trait CryptoEngine: Send + Sync {
    /// Create local key material protected by `passcode`
    fn bootstrap_device(&self, passcode: &Passcode, done: Completion);

    /// Re-encrypt local key material under a new passcode
    fn reset_passcode(&self, new_passcode: &Passcode) -> EngineResult<()>;

    /// Produce the data the key service needs to register this device
    fn get_registration_data(&self, done: Completion);

    /// Run the local step of a CreateDeviceGroup or CreateSignature operation
    fn compute_mpc_operation(&self, mpc_data: &MpcData) -> EngineResult<()>;

    /// Run the local step of a PrepareDeviceArchive operation
    fn compute_prepare_device_archive_mpc_operation(
        &self,
        mpc_data: &MpcData,
        passcode: &Passcode,
    ) -> EngineResult<()>;

    /// Run the local step of a PrepareDeviceBackup operation
    fn compute_prepare_device_backup_mpc_operation(
        &self,
        mpc_data: &MpcData,
        passcode: &Passcode,
    ) -> EngineResult<()>;

    /// Export the encrypted backup prepared by the backup operation
    fn export_device_backup(&self, done: Completion);

    /// Run the local step of an AddDevice operation
    fn compute_add_device_mpc_operation(
        &self,
        mpc_data: &MpcData,
        passcode: &Passcode,
        backup: &DeviceBackup,
    ) -> EngineResult<()>;

    /// Export private keys as a JSON array of `{Address, PrivateKey}`
    fn export_private_keys(
        &self,
        mpc_key_export_metadata: &str,
        passcode: &Passcode,
    ) -> EngineResult<String>;

    /// Combine a transaction (JSON) and its signature into a signed transaction
    fn get_signed_transaction(
        &self,
        transaction_json: &str,
        signature: &Signature,
    ) -> EngineResult<RawSignedTransaction>;
}

/// Initializes the crypto engine
pub trait CryptoEngineProvider: Send + Sync {
    /// Initialize the engine, in simulator mode when requested
    fn initialize(&self, is_simulator: bool) -> WaasResult<Arc<dyn CryptoEngine>>;
}
