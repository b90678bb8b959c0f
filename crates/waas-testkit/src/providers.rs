//! Connector and engine provider doubles used by `initialize`

use parking_lot::Mutex;
use std::sync::Arc;
use waas_core::{
    ConnectionMode, CryptoEngine, CryptoEngineProvider, ServiceConnector, ServiceHandles,
    WaasError, WaasResult,
};

use crate::engine::MockCryptoEngine;
use crate::services::MockBackend;

/// Hands out the backend's service doubles and remembers the requested mode
#[derive(Debug)]
pub struct MockConnector {
    backend: Arc<MockBackend>,
    modes: Mutex<Vec<ConnectionMode>>,
    failure: Mutex<Option<String>>,
}

impl MockConnector {
    /// Connector over `backend`
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self {
            backend,
            modes: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Reject the next connect with an invalid-argument error
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Modes passed to `connect`, in order
    pub fn modes(&self) -> Vec<ConnectionMode> {
        self.modes.lock().clone()
    }
}

impl ServiceConnector for MockConnector {
    fn connect(&self, mode: &ConnectionMode) -> WaasResult<ServiceHandles> {
        self.backend.recorder().record("ServiceConnector.connect");
        if let Some(message) = self.failure.lock().take() {
            return Err(WaasError::invalid_argument(message));
        }
        self.modes.lock().push(mode.clone());
        Ok(self.backend.handles())
    }
}

/// Hands out one shared engine double
#[derive(Debug)]
pub struct MockEngineProvider {
    engine: Arc<MockCryptoEngine>,
    simulator_flags: Mutex<Vec<bool>>,
}

impl MockEngineProvider {
    /// Provider returning `engine`
    pub fn new(engine: Arc<MockCryptoEngine>) -> Self {
        Self {
            engine,
            simulator_flags: Mutex::new(Vec::new()),
        }
    }

    /// `is_simulator` values passed to `initialize`, in order
    pub fn simulator_flags(&self) -> Vec<bool> {
        self.simulator_flags.lock().clone()
    }
}

impl CryptoEngineProvider for MockEngineProvider {
    fn initialize(&self, is_simulator: bool) -> WaasResult<Arc<dyn CryptoEngine>> {
        self.simulator_flags.lock().push(is_simulator);
        let engine: Arc<dyn CryptoEngine> = self.engine.clone();
        Ok(engine)
    }
}
