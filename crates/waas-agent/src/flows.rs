//! Multi-phase flows
//!
//! Each flow chains the coordinator phases in their required order:
//! initiate a remote operation, poll until its MPC operations materialize,
//! compute every one of them in the order received, then collect the result.
//! The first failing phase aborts the flow with its error and nothing is
//! retried. A flow whose poll is stopped fails with `Cancelled`.

use waas_core::{
    validate_name, Device, DeviceBackup, ExportedKey, MpcWallet, OperationKind, Passcode,
    PendingOperation, PendingOperationSet, ResourcePattern, SignedTransaction, Transaction,
    WaasError, WaasResult,
};

use crate::coordinator::WorkflowCoordinator;
use crate::poller::PollOutcome;

impl WorkflowCoordinator {
    async fn await_operations(
        &self,
        kind: OperationKind,
        device_group: &str,
        initiated: &str,
    ) -> WaasResult<PendingOperationSet> {
        let interval = self.settings().poll_interval;
        let outcome = match kind {
            OperationKind::CreateDeviceGroup => {
                self.poll_for_pending_device_group(device_group, interval).await?
            }
            OperationKind::CreateSignature => {
                self.poll_for_pending_signatures(device_group, interval).await?
            }
            OperationKind::PrepareDeviceArchive => {
                self.poll_for_pending_device_archives(device_group, interval)
                    .await?
            }
            OperationKind::PrepareDeviceBackup => {
                self.poll_for_pending_device_backups(device_group, interval)
                    .await?
            }
            OperationKind::AddDevice => {
                self.poll_for_pending_devices(device_group, interval).await?
            }
        };

        match outcome {
            PollOutcome::Completed(set) => {
                if set.find(initiated).is_none() {
                    tracing::debug!(
                        %kind,
                        operation = initiated,
                        "initiated operation not among materialized operations"
                    );
                }
                Ok(set)
            }
            PollOutcome::Cancelled => Err(WaasError::cancelled(format!(
                "polling for {kind} operations of {device_group} was stopped"
            ))),
        }
    }

    fn compute_all<F>(&self, set: &PendingOperationSet, mut compute: F) -> WaasResult<()>
    where
        F: FnMut(&PendingOperation) -> WaasResult<()>,
    {
        for operation in set.iter() {
            compute(operation)?;
        }
        Ok(())
    }

    /// Bootstrap this device and register it with the key service
    ///
    /// The device can take part in a group once another member invites it.
    pub async fn onboard_device_flow(&self, passcode: &Passcode) -> WaasResult<Device> {
        self.engine_context()?;
        self.bootstrap_device(passcode).await?;
        self.register_device().await
    }

    /// Create an MPC wallet in `pool` with `device` as its first member
    pub async fn create_wallet_flow(&self, pool: &str, device: &str) -> WaasResult<MpcWallet> {
        let response = self.create_mpc_wallet(pool, device).await?;
        let set = self
            .await_operations(
                OperationKind::CreateDeviceGroup,
                &response.device_group,
                &response.operation,
            )
            .await?;
        self.compute_all(&set, |op| self.compute_mpc_operation(op))?;
        self.wait_pending_mpc_wallet(&response.operation).await
    }

    /// Sign `transaction` with the MPC key `mpc_key`
    pub async fn signing_flow(
        &self,
        mpc_key: &str,
        transaction: &Transaction,
    ) -> WaasResult<SignedTransaction> {
        validate_name("mpc_key", mpc_key, ResourcePattern::MpcKey)?;
        let device_group = device_group_of_key(mpc_key)?;

        let operation = self.create_signature_from_tx(mpc_key, transaction).await?;
        let set = self
            .await_operations(OperationKind::CreateSignature, device_group, &operation)
            .await?;
        self.compute_all(&set, |op| self.compute_mpc_operation(op))?;
        let signature = self.wait_pending_signature(&operation).await?;
        self.get_signed_transaction(transaction, &signature)
    }

    /// Archive `device`'s shares of `device_group` and export the private keys
    pub async fn device_archive_flow(
        &self,
        device_group: &str,
        device: &str,
        passcode: &Passcode,
    ) -> WaasResult<Vec<ExportedKey>> {
        let operation = self.prepare_device_archive(device_group, device).await?;
        let set = self
            .await_operations(OperationKind::PrepareDeviceArchive, device_group, &operation)
            .await?;
        self.compute_all(&set, |op| {
            self.compute_prepare_device_archive_mpc_operation(op, passcode)
        })?;

        let group = self.get_device_group(device_group).await?;
        self.export_private_keys(&group.mpc_key_export_metadata, passcode)
    }

    /// Back up `device`'s shares of `device_group`
    pub async fn device_backup_flow(
        &self,
        device_group: &str,
        device: &str,
        passcode: &Passcode,
    ) -> WaasResult<DeviceBackup> {
        let operation = self.prepare_device_backup(device_group, device).await?;
        let set = self
            .await_operations(OperationKind::PrepareDeviceBackup, device_group, &operation)
            .await?;
        self.compute_all(&set, |op| {
            self.compute_prepare_device_backup_mpc_operation(op, passcode)
        })?;
        self.export_device_backup().await
    }

    /// Join `device` to `device_group` using a backup from an existing member
    ///
    /// Returns the add-device operation name.
    pub async fn add_device_flow(
        &self,
        device_group: &str,
        device: &str,
        passcode: &Passcode,
        backup: &DeviceBackup,
    ) -> WaasResult<String> {
        let operation = self.add_device(device_group, device).await?;
        let set = self
            .await_operations(OperationKind::AddDevice, device_group, &operation)
            .await?;
        self.compute_all(&set, |op| {
            self.compute_add_device_mpc_operation(op, passcode, backup)
        })?;
        tracing::info!(device_group, device, "device added");
        Ok(operation)
    }
}

/// `pools/p/deviceGroups/g` of `pools/p/deviceGroups/g/mpcKeys/k`
fn device_group_of_key(mpc_key: &str) -> WaasResult<&str> {
    mpc_key
        .rsplit_once("/mpcKeys/")
        .map(|(group, _)| group)
        .ok_or_else(|| {
            WaasError::invalid_argument(format!("mpc_key has no device group: {mpc_key:?}"))
        })
}
