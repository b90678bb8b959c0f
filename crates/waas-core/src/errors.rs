//! Error types for the WaaS client
//!
//! A single error enum is shared by every crate in the workspace. Each
//! variant maps to a stable [`ErrorCode`] that callers can match on without
//! parsing messages; remote and engine messages are carried verbatim.

use crate::types::OperationKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for WaaS operations
pub type WaasResult<T> = std::result::Result<T, WaasError>;

/// The remote service an RPC was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// MPC Key Service (devices, device groups, signatures, MPC operations)
    MpcKey,
    /// MPC Wallet Service (wallets and addresses)
    MpcWallet,
    /// Pool Service
    Pool,
}

impl ServiceKind {
    /// Human-readable service name used in logs and messages
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::MpcKey => "MPCKeyService",
            ServiceKind::MpcWallet => "MPCWalletService",
            ServiceKind::Pool => "PoolService",
        }
    }

    /// Error code reported for failures of this service
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServiceKind::MpcKey => ErrorCode::MpcKeyService,
            ServiceKind::MpcWallet => ErrorCode::MpcWalletService,
            ServiceKind::Pool => ErrorCode::PoolService,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable error codes exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Call made before initialization
    NotInitialized,
    /// Malformed or missing call parameters
    InvalidArgument,
    /// A poll of the same kind is already active for the device group
    AlreadyPolling,
    /// The device was already bootstrapped in this context
    AlreadyBootstrapped,
    /// The operation was already consumed by a compute phase
    OperationConsumed,
    /// The workflow was cancelled by stopping its poll
    Cancelled,
    /// MPC Key Service failure
    MpcKeyService,
    /// MPC Wallet Service failure
    MpcWalletService,
    /// Pool Service failure
    PoolService,
    /// Crypto engine failure
    MpcSdk,
    /// Malformed JSON payload
    Serialization,
    /// Malformed configuration
    Config,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::AlreadyPolling => "ALREADY_POLLING",
            ErrorCode::AlreadyBootstrapped => "ALREADY_BOOTSTRAPPED",
            ErrorCode::OperationConsumed => "OPERATION_CONSUMED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::MpcKeyService => "E_MPC_KEY_SERVICE",
            ErrorCode::MpcWalletService => "E_MPC_WALLET_SERVICE",
            ErrorCode::PoolService => "E_POOL_SERVICE",
            ErrorCode::MpcSdk => "E_MPC_SDK",
            ErrorCode::Serialization => "SERIALIZATION_ERROR",
            ErrorCode::Config => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while driving WaaS workflows
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaasError {
    /// A component was used before `initialize`
    #[error("{component} must be initialized")]
    NotInitialized {
        /// Component that was not initialized
        component: &'static str,
    },

    /// Call parameters were rejected before any side effect
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the arguments
        message: String,
    },

    /// Exclusivity violation on a (kind, device group) poll slot
    #[error("Already polling for pending {kind} operations of {device_group}")]
    AlreadyPolling {
        /// Operation kind being polled
        kind: OperationKind,
        /// Device group being polled
        device_group: String,
    },

    /// Second bootstrap of the device within one context
    #[error("Device has already been bootstrapped")]
    AlreadyBootstrapped,

    /// Recompute of an operation that was already consumed
    #[error("Operation {operation} has already been consumed")]
    OperationConsumed {
        /// Operation resource name
        operation: String,
    },

    /// A workflow stopped because its poll was cancelled
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Which phase was cancelled
        message: String,
    },

    /// Remote RPC failure, message carried verbatim
    #[error("{service} error: {message}")]
    ServiceError {
        /// Service that failed
        service: ServiceKind,
        /// Remote or transport message
        message: String,
    },

    /// Local cryptographic step failure
    #[error("MPC SDK error: {message}")]
    ComputeError {
        /// Engine message
        message: String,
    },

    /// Malformed JSON exchanged with a service or the engine
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Parser message
        message: String,
    },

    /// Unreadable or malformed configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },
}

impl WaasError {
    /// Create a not-initialized error for a component
    pub fn not_initialized(component: &'static str) -> Self {
        Self::NotInitialized { component }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an already-polling error
    pub fn already_polling(kind: OperationKind, device_group: impl Into<String>) -> Self {
        Self::AlreadyPolling {
            kind,
            device_group: device_group.into(),
        }
    }

    /// Create an operation-consumed error
    pub fn operation_consumed(operation: impl Into<String>) -> Self {
        Self::OperationConsumed {
            operation: operation.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a service error
    pub fn service(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::ServiceError {
            service,
            message: message.into(),
        }
    }

    /// Create a compute error
    pub fn compute(message: impl Into<String>) -> Self {
        Self::ComputeError {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get the stable error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            WaasError::NotInitialized { .. } => ErrorCode::NotInitialized,
            WaasError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            WaasError::AlreadyPolling { .. } => ErrorCode::AlreadyPolling,
            WaasError::AlreadyBootstrapped => ErrorCode::AlreadyBootstrapped,
            WaasError::OperationConsumed { .. } => ErrorCode::OperationConsumed,
            WaasError::Cancelled { .. } => ErrorCode::Cancelled,
            WaasError::ServiceError { service, .. } => service.error_code(),
            WaasError::ComputeError { .. } => ErrorCode::MpcSdk,
            WaasError::SerializationError { .. } => ErrorCode::Serialization,
            WaasError::Config { .. } => ErrorCode::Config,
        }
    }

    /// Whether the failed phase can be retried as-is by the caller.
    ///
    /// Only remote RPC failures qualify. Compute and export phases need fresh
    /// operation data before they can run again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WaasError::ServiceError { .. })
    }
}

impl From<serde_json::Error> for WaasError {
    fn from(err: serde_json::Error) -> Self {
        WaasError::serialization(err.to_string())
    }
}
