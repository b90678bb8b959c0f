//! REST implementation of the MPC Key Service

use crate::transport::RestTransport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waas_core::{
    Device, DeviceGroup, KeyService, LongRunningOperation, OperationKind, PendingOperation,
    Signature, Transaction, WaasResult,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDeviceRequest<'a> {
    registration_data: &'a str,
}

#[derive(Serialize)]
struct CreateSignatureRequest<'a> {
    transaction: &'a Transaction,
}

#[derive(Serialize)]
struct DeviceRequest<'a> {
    device: &'a str,
}

/// Reference to a long-running operation returned by initiating calls
#[derive(Debug, Deserialize)]
pub(crate) struct OperationRef {
    pub(crate) name: String,
}

/// Key service client
#[derive(Debug, Clone)]
pub struct HttpKeyService {
    transport: RestTransport,
}

impl HttpKeyService {
    /// Wrap a transport
    pub fn new(transport: RestTransport) -> Self {
        Self { transport }
    }

    /// Underlying transport
    pub fn transport(&self) -> &RestTransport {
        &self.transport
    }

    async fn initiate(&self, device_group: &str, method: &str, device: &str) -> WaasResult<String> {
        let op: OperationRef = self
            .transport
            .post(&format!("{device_group}:{method}"), &[], &DeviceRequest { device })
            .await?;
        Ok(op.name)
    }
}

#[async_trait]
impl KeyService for HttpKeyService {
    async fn register_device(&self, registration_data: &str) -> WaasResult<Device> {
        self.transport
            .post(
                "device:register",
                &[],
                &RegisterDeviceRequest { registration_data },
            )
            .await
    }

    async fn list_pending_operations(
        &self,
        kind: OperationKind,
        device_group: &str,
    ) -> WaasResult<Vec<PendingOperation>> {
        let body = self
            .transport
            .get_text(
                &format!("{device_group}/mpcOperations"),
                &[("kind", kind.as_str())],
            )
            .await?;
        PendingOperation::parse_list(kind, &body)
    }

    async fn get_device_group(&self, name: &str) -> WaasResult<DeviceGroup> {
        self.transport.get(name, &[]).await
    }

    async fn create_signature(
        &self,
        parent: &str,
        transaction: &Transaction,
    ) -> WaasResult<String> {
        let op: OperationRef = self
            .transport
            .post(
                &format!("{parent}/signatures"),
                &[],
                &CreateSignatureRequest { transaction },
            )
            .await?;
        Ok(op.name)
    }

    async fn get_signature_operation(
        &self,
        operation: &str,
    ) -> WaasResult<LongRunningOperation<Signature>> {
        self.transport.get(operation, &[]).await
    }

    async fn prepare_device_archive(
        &self,
        device_group: &str,
        device: &str,
    ) -> WaasResult<String> {
        self.initiate(device_group, "prepareDeviceArchive", device).await
    }

    async fn prepare_device_backup(&self, device_group: &str, device: &str) -> WaasResult<String> {
        self.initiate(device_group, "prepareDeviceBackup", device).await
    }

    async fn add_device(&self, device_group: &str, device: &str) -> WaasResult<String> {
        self.initiate(device_group, "addDevice", device).await
    }
}
