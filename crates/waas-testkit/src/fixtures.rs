//! Fixtures shared by the agent and client tests

use std::sync::Arc;
use waas_core::{MpcData, PendingDeviceGroup, PendingOperation, PendingSignature, Transaction};

use crate::engine::MockCryptoEngine;
use crate::providers::{MockConnector, MockEngineProvider};
use crate::recorder::CallRecorder;
use crate::services::MockBackend;

/// Pool used by the fixtures
pub const TEST_POOL: &str = "pools/test-pool";

/// Passcode used by the fixtures
pub const TEST_PASSCODE: &str = "123456";

/// Proxy URL used by the fixtures
pub const TEST_PROXY_URL: &str = "http://localhost:8091";

/// A linked backend, engine, connector and provider sharing one recorder
#[derive(Debug, Clone)]
pub struct TestEnvironment {
    /// Shared call log
    pub recorder: CallRecorder,
    /// Remote state
    pub backend: Arc<MockBackend>,
    /// Engine double linked to the backend
    pub engine: Arc<MockCryptoEngine>,
    /// Connector over the backend
    pub connector: Arc<MockConnector>,
    /// Provider of the engine
    pub engine_provider: Arc<MockEngineProvider>,
}

impl TestEnvironment {
    /// Build a fresh environment
    pub fn new() -> Self {
        let recorder = CallRecorder::new();
        let backend = MockBackend::new(recorder.clone());
        let engine = Arc::new(MockCryptoEngine::linked(backend.clone()));
        Self {
            connector: Arc::new(MockConnector::new(backend.clone())),
            engine_provider: Arc::new(MockEngineProvider::new(engine.clone())),
            recorder,
            backend,
            engine,
        }
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// A small EIP-1559 transfer on Goerli
pub fn sample_transaction() -> Transaction {
    Transaction {
        chain_id: "5".to_string(),
        nonce: 0,
        max_priority_fee_per_gas: "1000000000".to_string(),
        max_fee_per_gas: "2000000000".to_string(),
        gas: 21_000,
        to: "0x4d9a7c38b1e5e0f2c1d4a6b8e9f0a1b2c3d4e5f6".to_string(),
        value: "1000000000000000".to_string(),
        data: String::new(),
        extra: serde_json::Map::new(),
    }
}

/// A pending CreateDeviceGroup operation
pub fn pending_device_group(device_group: &str, operation: &str, mpc_data: &str) -> PendingOperation {
    PendingOperation::CreateDeviceGroup(PendingDeviceGroup {
        device_group: device_group.to_string(),
        operation: operation.to_string(),
        mpc_data: MpcData::new(mpc_data),
    })
}

/// A pending CreateSignature operation
pub fn pending_signature(
    device_group: &str,
    operation: &str,
    mpc_data: &str,
    payload: &str,
) -> PendingOperation {
    PendingOperation::CreateSignature(PendingSignature {
        device_group: device_group.to_string(),
        operation: operation.to_string(),
        mpc_data: MpcData::new(mpc_data),
        payload: payload.to_string(),
    })
}

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
