//! # WaaS Core
//!
//! Foundation types for the MPC wallet-as-a-service client.
//!
//! ## Responsibilities
//!
//! - Domain types exchanged with the Key, Wallet and Pool services
//! - Resource-name validation
//! - The shared error type and stable error codes
//! - Client configuration and connection-mode selection
//! - Effect traits for the remote services and the crypto engine
//!
//! Nothing in this crate performs I/O besides reading a configuration file.

pub mod config;
pub mod effects;
pub mod errors;
pub mod names;
pub mod types;

pub use config::{
    ClientConfig, ConnectionMode, Credentials, InitParams, ServiceEndpoints, DEFAULT_PROXY_URL,
};
pub use effects::{
    Completion, CryptoEngine, CryptoEngineProvider, EngineError, EngineResult, KeyService,
    PoolService, ServiceConnector, ServiceHandles, WalletService,
};
pub use errors::{ErrorCode, ServiceKind, WaasError, WaasResult};
pub use names::{validate_id, validate_name, ResourcePattern};
pub use types::*;
