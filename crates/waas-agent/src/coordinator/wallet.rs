//! Pool, wallet and address phases

use waas_core::{
    validate_id, validate_name, Address, CreateMpcWalletResponse, MpcWallet, OperationKind, Pool,
    ResourcePattern, ServiceKind, WaasError, WaasResult,
};

use super::WorkflowCoordinator;

impl WorkflowCoordinator {
    /// Create a pool
    ///
    /// An empty `pool_id` lets the service choose the id.
    pub async fn create_pool(&self, display_name: &str, pool_id: &str) -> WaasResult<Pool> {
        let context = self.service_context(ServiceKind::Pool)?;
        if display_name.trim().is_empty() {
            return Err(WaasError::invalid_argument("display_name must not be empty"));
        }
        if !pool_id.is_empty() {
            validate_id("pool_id", pool_id)?;
        }

        let pool = context
            .services()
            .pool
            .create_pool(display_name, pool_id)
            .await?;
        tracing::info!(pool = %pool.name, "pool created");
        Ok(pool)
    }

    /// Start creating an MPC wallet in `parent` (a pool) for `device`
    ///
    /// Returns the device group whose CreateDeviceGroup operation must be
    /// polled and computed, and the wallet operation to wait on.
    pub async fn create_mpc_wallet(
        &self,
        parent: &str,
        device: &str,
    ) -> WaasResult<CreateMpcWalletResponse> {
        let context = self.service_context(ServiceKind::MpcWallet)?;
        validate_name("parent", parent, ResourcePattern::Pool)?;
        validate_name("device", device, ResourcePattern::Device)?;

        let response = context
            .services()
            .wallet
            .create_mpc_wallet(parent, device)
            .await?;
        self.ledger()
            .record_pending(&response.operation, OperationKind::CreateDeviceGroup);
        tracing::info!(
            device_group = %response.device_group,
            operation = %response.operation,
            "wallet creation initiated"
        );
        Ok(response)
    }

    /// Wait until the wallet operation `operation` is done
    pub async fn wait_pending_mpc_wallet(&self, operation: &str) -> WaasResult<MpcWallet> {
        let context = self.service_context(ServiceKind::MpcWallet)?;
        validate_name("operation", operation, ResourcePattern::Any)?;

        loop {
            let current = context
                .services()
                .wallet
                .get_mpc_wallet_operation(operation)
                .await?;
            if let Some(wallet) = current.into_result(ServiceKind::MpcWallet)? {
                tracing::info!(wallet = %wallet.name, "wallet created");
                return Ok(wallet);
            }
            tracing::debug!(operation, "wallet operation not done");
            tokio::time::sleep(self.settings().wait_interval).await;
        }
    }

    /// Derive a new address of `mpc_wallet` on `network` (e.g. `ethereum-goerli`)
    pub async fn generate_address(&self, mpc_wallet: &str, network: &str) -> WaasResult<Address> {
        let context = self.service_context(ServiceKind::MpcWallet)?;
        validate_name("mpc_wallet", mpc_wallet, ResourcePattern::MpcWallet)?;
        validate_id("network", network)?;

        let address = context
            .services()
            .wallet
            .generate_address(mpc_wallet, network)
            .await?;
        tracing::info!(address = %address.name, "address generated");
        Ok(address)
    }

    /// Fetch an address by name
    pub async fn get_address(&self, name: &str) -> WaasResult<Address> {
        let context = self.service_context(ServiceKind::MpcWallet)?;
        validate_name("name", name, ResourcePattern::Address)?;
        context.services().wallet.get_address(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::WorkflowCoordinator;
    use assert_matches::assert_matches;
    use waas_core::{InitParams, OperationStatus, ServiceKind, WaasError};
    use waas_testkit::{TestEnvironment, TEST_POOL, TEST_PROXY_URL};

    fn initialized(env: &TestEnvironment) -> WorkflowCoordinator {
        let coordinator =
            WorkflowCoordinator::new(env.connector.clone(), env.engine_provider.clone());
        coordinator.initialize(&InitParams::proxy(TEST_PROXY_URL)).unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_create_pool_validates_before_calling() {
        let env = TestEnvironment::new();
        let coordinator = initialized(&env);

        assert_matches!(
            coordinator.create_pool("  ", "p1").await,
            Err(WaasError::InvalidArgument { .. })
        );
        assert_matches!(
            coordinator.create_pool("Pool", "a/b").await,
            Err(WaasError::InvalidArgument { .. })
        );
        assert_eq!(env.recorder.count("PoolService.create_pool"), 0);

        let pool = coordinator.create_pool("Pool", "").await.unwrap();
        assert!(pool.name.starts_with("pools/"));
    }

    #[tokio::test]
    async fn test_create_wallet_records_pending_operation() {
        let env = TestEnvironment::new();
        let coordinator = initialized(&env);

        let response = coordinator
            .create_mpc_wallet(TEST_POOL, "devices/d1")
            .await
            .unwrap();
        assert_eq!(
            coordinator.ledger().status(&response.operation),
            Some(OperationStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_create_wallet_rejects_malformed_names() {
        let env = TestEnvironment::new();
        let coordinator = initialized(&env);

        let err = coordinator
            .create_mpc_wallet("pools/p1/deviceGroups/g1", "devices/d1")
            .await;
        assert_matches!(err, Err(WaasError::InvalidArgument { .. }));
        let err = coordinator.create_mpc_wallet(TEST_POOL, "d1").await;
        assert_matches!(err, Err(WaasError::InvalidArgument { .. }));
        assert_eq!(env.recorder.count("WalletService.create_mpc_wallet"), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_verbatim() {
        let env = TestEnvironment::new();
        let coordinator = initialized(&env);
        env.backend
            .fail_next("WalletService.create_mpc_wallet", "pool pools/test-pool not found");

        let err = coordinator.create_mpc_wallet(TEST_POOL, "devices/d1").await;
        assert_eq!(
            err,
            Err(WaasError::service(
                ServiceKind::MpcWallet,
                "pool pools/test-pool not found"
            ))
        );
    }

    #[tokio::test]
    async fn test_generate_address_requires_wallet_name() {
        let env = TestEnvironment::new();
        let coordinator = initialized(&env);
        let err = coordinator
            .generate_address(TEST_POOL, "ethereum-goerli")
            .await;
        assert_matches!(err, Err(WaasError::InvalidArgument { .. }));
    }
}
