//! # WaaS Testkit
//!
//! Test doubles for every external collaborator of the orchestration layer.
//!
//! ## Responsibilities
//!
//! - `MockKeyService`, `MockWalletService`, `MockPoolService` over one
//!   in-memory `MockBackend`
//! - `MockCryptoEngine` with deterministic outputs and configurable
//!   completion delivery
//! - `MockConnector` / `MockEngineProvider` for `initialize`
//! - A shared `CallRecorder` and ready-made fixtures

#![allow(clippy::unwrap_used, clippy::expect_used)]

pub mod engine;
pub mod fixtures;
pub mod providers;
pub mod recorder;
pub mod services;

pub use engine::{CompletionMode, MockCryptoEngine};
pub use fixtures::{
    init_test_tracing, pending_device_group, pending_signature, sample_transaction,
    TestEnvironment, TEST_PASSCODE, TEST_POOL, TEST_PROXY_URL,
};
pub use providers::{MockConnector, MockEngineProvider};
pub use recorder::CallRecorder;
pub use services::{MockBackend, MockKeyService, MockPoolService, MockWalletService};
