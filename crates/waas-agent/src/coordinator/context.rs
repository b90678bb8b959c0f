//! Initialized collaborators shared by every phase

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use waas_core::{ConnectionMode, CryptoEngine, ServiceHandles};

/// Service handles and crypto engine produced by `initialize`
///
/// Immutable after construction apart from the bootstrap flag, and shared
/// across phases through an `Arc`.
pub struct WaasContext {
    services: ServiceHandles,
    engine: Arc<dyn CryptoEngine>,
    mode: ConnectionMode,
    is_simulator: bool,
    bootstrapped: AtomicBool,
}

impl WaasContext {
    pub(crate) fn new(
        services: ServiceHandles,
        engine: Arc<dyn CryptoEngine>,
        mode: ConnectionMode,
        is_simulator: bool,
    ) -> Self {
        Self {
            services,
            engine,
            mode,
            is_simulator,
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// Remote service handles
    pub fn services(&self) -> &ServiceHandles {
        &self.services
    }

    /// Crypto engine handle
    pub fn engine(&self) -> &Arc<dyn CryptoEngine> {
        &self.engine
    }

    /// Connection mode the services were connected with
    pub fn mode(&self) -> &ConnectionMode {
        &self.mode
    }

    /// True if the engine was initialized in simulator mode
    pub fn is_simulator(&self) -> bool {
        self.is_simulator
    }

    /// True once a bootstrap has succeeded in this context
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    /// Claim the bootstrap; false if another bootstrap already claimed it
    pub(crate) fn claim_bootstrap(&self) -> bool {
        self.bootstrapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_bootstrap(&self) {
        self.bootstrapped.store(false, Ordering::Release);
    }
}

impl fmt::Debug for WaasContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaasContext")
            .field("secure", &self.mode.is_secure())
            .field("is_simulator", &self.is_simulator)
            .field("bootstrapped", &self.is_bootstrapped())
            .finish_non_exhaustive()
    }
}
