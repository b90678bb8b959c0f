//! Archive, backup and add-device phases
//!
//! Each area has an initiating call on the key service, a passcode-protected
//! compute on the engine, and for archives and backups an export step.

use waas_core::{
    validate_name, DeviceBackup, ExportedKey, OperationKind, Passcode, PendingOperation,
    ResourcePattern, ServiceKind, WaasError, WaasResult,
};

use super::WorkflowCoordinator;

impl WorkflowCoordinator {
    async fn initiate(
        &self,
        kind: OperationKind,
        device_group: &str,
        device: &str,
    ) -> WaasResult<String> {
        let context = self.service_context(ServiceKind::MpcKey)?;
        validate_name("device_group", device_group, ResourcePattern::DeviceGroup)?;
        validate_name("device", device, ResourcePattern::Device)?;

        let key = &context.services().key;
        let operation = match kind {
            OperationKind::PrepareDeviceArchive => {
                key.prepare_device_archive(device_group, device).await?
            }
            OperationKind::PrepareDeviceBackup => {
                key.prepare_device_backup(device_group, device).await?
            }
            OperationKind::AddDevice => key.add_device(device_group, device).await?,
            other => {
                return Err(WaasError::invalid_argument(format!(
                    "{other} is not initiated per device"
                )))
            }
        };
        self.ledger().record_pending(&operation, kind);
        tracing::info!(%kind, device_group, operation = %operation, "operation initiated");
        Ok(operation)
    }

    /// Start preparing an archive of `device`'s key shares in `device_group`
    pub async fn prepare_device_archive(
        &self,
        device_group: &str,
        device: &str,
    ) -> WaasResult<String> {
        self.initiate(OperationKind::PrepareDeviceArchive, device_group, device)
            .await
    }

    /// Compute a PrepareDeviceArchive operation under `passcode`
    pub fn compute_prepare_device_archive_mpc_operation(
        &self,
        operation: &PendingOperation,
        passcode: &Passcode,
    ) -> WaasResult<()> {
        let context = self.engine_context()?;
        self.ledger()
            .begin_compute(operation, &[OperationKind::PrepareDeviceArchive])?;

        let result = self.bridge().call_sync("compute_prepare_device_archive_mpc_operation", || {
            context
                .engine()
                .compute_prepare_device_archive_mpc_operation(operation.mpc_data(), passcode)
        });
        self.settle(operation, result)
    }

    /// Export the private keys of a device group from its archive
    ///
    /// `mpc_key_export_metadata` comes from [`WorkflowCoordinator::get_device_group`].
    pub fn export_private_keys(
        &self,
        mpc_key_export_metadata: &str,
        passcode: &Passcode,
    ) -> WaasResult<Vec<ExportedKey>> {
        let context = self.engine_context()?;
        if mpc_key_export_metadata.is_empty() {
            return Err(WaasError::invalid_argument(
                "mpc_key_export_metadata must not be empty",
            ));
        }

        let exported = self.bridge().call_sync("export_private_keys", || {
            context
                .engine()
                .export_private_keys(mpc_key_export_metadata, passcode)
        })?;
        let keys: Vec<ExportedKey> = serde_json::from_str(&exported)?;
        tracing::info!(count = keys.len(), "private keys exported");
        Ok(keys)
    }

    /// Start preparing a backup of `device`'s key shares in `device_group`
    pub async fn prepare_device_backup(
        &self,
        device_group: &str,
        device: &str,
    ) -> WaasResult<String> {
        self.initiate(OperationKind::PrepareDeviceBackup, device_group, device)
            .await
    }

    /// Compute a PrepareDeviceBackup operation under `passcode`
    pub fn compute_prepare_device_backup_mpc_operation(
        &self,
        operation: &PendingOperation,
        passcode: &Passcode,
    ) -> WaasResult<()> {
        let context = self.engine_context()?;
        self.ledger()
            .begin_compute(operation, &[OperationKind::PrepareDeviceBackup])?;

        let result = self.bridge().call_sync("compute_prepare_device_backup_mpc_operation", || {
            context
                .engine()
                .compute_prepare_device_backup_mpc_operation(operation.mpc_data(), passcode)
        });
        self.settle(operation, result)
    }

    /// Export the backup prepared by the last backup computation
    pub async fn export_device_backup(&self) -> WaasResult<DeviceBackup> {
        let context = self.engine_context()?;
        let engine = context.engine().clone();
        let backup = self
            .bridge()
            .call("export_device_backup", |done| engine.export_device_backup(done))
            .await?;
        DeviceBackup::new(backup)
            .map_err(|_| WaasError::compute("export_device_backup returned an empty backup"))
    }

    /// Start adding `device` to `device_group`
    pub async fn add_device(&self, device_group: &str, device: &str) -> WaasResult<String> {
        self.initiate(OperationKind::AddDevice, device_group, device)
            .await
    }

    /// Compute an AddDevice operation from a backup of another device
    pub fn compute_add_device_mpc_operation(
        &self,
        operation: &PendingOperation,
        passcode: &Passcode,
        backup: &DeviceBackup,
    ) -> WaasResult<()> {
        let context = self.engine_context()?;
        self.ledger()
            .begin_compute(operation, &[OperationKind::AddDevice])?;

        let result = self.bridge().call_sync("compute_add_device_mpc_operation", || {
            context
                .engine()
                .compute_add_device_mpc_operation(operation.mpc_data(), passcode, backup)
        });
        self.settle(operation, result)
    }
}
