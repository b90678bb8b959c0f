//! Device phases: bootstrap, passcode reset and registration

use waas_core::{Device, Passcode, ServiceKind, WaasError, WaasResult};

use super::{WaasContext, WorkflowCoordinator};

/// Bootstrap claim released on drop unless the bootstrap succeeded
struct BootstrapClaim<'a> {
    context: &'a WaasContext,
    kept: bool,
}

impl<'a> BootstrapClaim<'a> {
    fn take(context: &'a WaasContext) -> Option<Self> {
        context.claim_bootstrap().then(|| Self {
            context,
            kept: false,
        })
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for BootstrapClaim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.context.release_bootstrap();
        }
    }
}

impl WorkflowCoordinator {
    /// Initialize the device's local key material protected by `passcode`
    ///
    /// Succeeds once per context; a second call fails with
    /// `AlreadyBootstrapped` without reaching the engine. A failed or
    /// abandoned bootstrap may be retried.
    pub async fn bootstrap_device(&self, passcode: &Passcode) -> WaasResult<()> {
        let context = self.engine_context()?;
        let Some(claim) = BootstrapClaim::take(&context) else {
            return Err(WaasError::AlreadyBootstrapped);
        };

        let engine = context.engine().clone();
        self.bridge()
            .call("bootstrap_device", |done| engine.bootstrap_device(passcode, done))
            .await?;

        claim.keep();
        tracing::info!("device bootstrapped");
        Ok(())
    }

    /// Replace the passcode protecting the local key material
    ///
    /// Previously prepared archives and backups stay encrypted under the old
    /// passcode: run the archive and backup flows again for every device
    /// group afterwards.
    pub fn reset_passcode(&self, new_passcode: &Passcode) -> WaasResult<()> {
        let context = self.engine_context()?;
        self.bridge()
            .call_sync("reset_passcode", || context.engine().reset_passcode(new_passcode))?;
        tracing::info!("passcode reset");
        Ok(())
    }

    /// Registration data identifying this device to the key service
    pub async fn registration_data(&self) -> WaasResult<String> {
        let context = self.engine_context()?;
        let engine = context.engine().clone();
        self.bridge()
            .call("get_registration_data", |done| engine.get_registration_data(done))
            .await
    }

    /// Register this device with the key service
    pub async fn register_device(&self) -> WaasResult<Device> {
        let context = self.service_context(ServiceKind::MpcKey)?;
        self.engine_context()?;

        let registration_data = self.registration_data().await?;
        let device = context
            .services()
            .key
            .register_device(&registration_data)
            .await?;
        tracing::info!(device = %device.name, "device registered");
        Ok(device)
    }
}
