//! Effect traits for the external collaborators
//!
//! The remote services and the crypto engine are only reached through these
//! traits, so the orchestration layer can run against the REST client in
//! production and against recording doubles in tests.

pub mod crypto;
pub mod services;

pub use crypto::{Completion, CryptoEngine, CryptoEngineProvider, EngineError, EngineResult};
pub use services::{KeyService, PoolService, ServiceConnector, ServiceHandles, WalletService};
