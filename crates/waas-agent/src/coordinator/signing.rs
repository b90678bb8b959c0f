//! Key phases: device groups, signatures and MPC computation

use waas_core::{
    validate_name, DeviceGroup, OperationKind, PendingOperation, ResourcePattern, ServiceKind,
    Signature, SignedTransaction, Transaction, WaasResult,
};

use super::WorkflowCoordinator;

/// Kinds `compute_mpc_operation` accepts; the others need a passcode
const PLAIN_COMPUTE_KINDS: [OperationKind; 2] =
    [OperationKind::CreateDeviceGroup, OperationKind::CreateSignature];

impl WorkflowCoordinator {
    /// Fetch a device group, including its key export metadata
    pub async fn get_device_group(&self, name: &str) -> WaasResult<DeviceGroup> {
        let context = self.service_context(ServiceKind::MpcKey)?;
        validate_name("name", name, ResourcePattern::DeviceGroup)?;
        context.services().key.get_device_group(name).await
    }

    /// Ask the key service to sign `transaction` with the MPC key `parent`
    ///
    /// Returns the signature operation. Its CreateSignature operation must be
    /// polled and computed before `wait_pending_signature` can finish.
    pub async fn create_signature_from_tx(
        &self,
        parent: &str,
        transaction: &Transaction,
    ) -> WaasResult<String> {
        let context = self.service_context(ServiceKind::MpcKey)?;
        validate_name("parent", parent, ResourcePattern::MpcKey)?;
        transaction.validate()?;

        let operation = context
            .services()
            .key
            .create_signature(parent, transaction)
            .await?;
        self.ledger()
            .record_pending(&operation, OperationKind::CreateSignature);
        tracing::info!(mpc_key = parent, operation = %operation, "signature requested");
        Ok(operation)
    }

    /// Wait until the signature operation `operation` is done
    pub async fn wait_pending_signature(&self, operation: &str) -> WaasResult<Signature> {
        let context = self.service_context(ServiceKind::MpcKey)?;
        validate_name("operation", operation, ResourcePattern::Any)?;

        loop {
            let current = context
                .services()
                .key
                .get_signature_operation(operation)
                .await?;
            if let Some(signature) = current.into_result(ServiceKind::MpcKey)? {
                tracing::info!(signature = %signature.name, "signature completed");
                return Ok(signature);
            }
            tracing::debug!(operation, "signature operation not done");
            tokio::time::sleep(self.settings().wait_interval).await;
        }
    }

    /// Combine `transaction` and its `signature` into a broadcastable transaction
    pub fn get_signed_transaction(
        &self,
        transaction: &Transaction,
        signature: &Signature,
    ) -> WaasResult<SignedTransaction> {
        let context = self.engine_context()?;
        transaction.validate()?;
        let transaction_json = transaction.to_json()?;

        let raw = self.bridge().call_sync("get_signed_transaction", || {
            context
                .engine()
                .get_signed_transaction(&transaction_json, signature)
        })?;
        Ok(SignedTransaction {
            transaction: transaction.clone(),
            signature: signature.clone(),
            raw_transaction: raw.raw_transaction,
            transaction_hash: raw.transaction_hash,
        })
    }

    /// Compute a CreateDeviceGroup or CreateSignature operation
    ///
    /// `operation` must come from a poll result. An operation already
    /// computed in this run is refused with `OperationConsumed`.
    pub fn compute_mpc_operation(&self, operation: &PendingOperation) -> WaasResult<()> {
        let context = self.engine_context()?;
        self.ledger().begin_compute(operation, &PLAIN_COMPUTE_KINDS)?;

        let result = self.bridge().call_sync("compute_mpc_operation", || {
            context.engine().compute_mpc_operation(operation.mpc_data())
        });
        self.settle(operation, result)
    }
}
