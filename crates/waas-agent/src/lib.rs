//! # WaaS Agent
//!
//! Client-side orchestration of MPC wallet operations.
//!
//! ## Responsibilities
//!
//! - Poll the key service for pending MPC operations, at most one poll per
//!   (operation kind, device group) at a time
//! - Bridge the crypto engine's callback-style calls into futures
//! - Sequence the wallet phases (bootstrap, registration, wallet creation,
//!   signing, archive, backup and add-device) and the flows combining them
//! - Track which operations have been computed so none is computed twice
//!
//! ## What Does NOT Belong Here
//!
//! - REST transport and authentication (`waas-client`)
//! - Domain types, names and errors (`waas-core`)
//! - Test doubles (`waas-testkit`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waas_agent::WorkflowCoordinator;
//! use waas_core::{InitParams, Passcode};
//!
//! let coordinator = WorkflowCoordinator::new(connector, engine_provider);
//! coordinator.initialize(&InitParams::proxy("http://localhost:8091"))?;
//!
//! let device = coordinator.onboard_device_flow(&Passcode::new("123456")?).await?;
//! let wallet = coordinator.create_wallet_flow("pools/my-pool", &device.name).await?;
//! ```

pub mod bridge;
pub mod coordinator;
pub mod flows;
pub mod ledger;
pub mod poller;

pub use bridge::CallbackBridge;
pub use coordinator::{CoordinatorSettings, WaasContext, WorkflowCoordinator};
pub use ledger::OperationLedger;
pub use poller::{OperationPoller, PendingOperationSource, PollOutcome, StopOutcome};
