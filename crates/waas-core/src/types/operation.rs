//! MPC operations and pending-operation sets
//!
//! The key service reports operations that need a local compute step as
//! JSON arrays, one array per operation kind. Each kind has its own record
//! schema; records are validated when parsed so the coordinator only ever
//! sees complete operations.

use crate::errors::{WaasError, WaasResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of MPC operation that requires a local compute step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    /// Formation of a new device group (wallet creation)
    CreateDeviceGroup,
    /// Threshold signature over a payload
    CreateSignature,
    /// Preparation of an encrypted key archive for export
    PrepareDeviceArchive,
    /// Preparation of an encrypted backup used to add a device
    PrepareDeviceBackup,
    /// Addition of a new device to an existing group
    AddDevice,
}

impl OperationKind {
    /// Every operation kind, in declaration order
    pub const ALL: [OperationKind; 5] = [
        OperationKind::CreateDeviceGroup,
        OperationKind::CreateSignature,
        OperationKind::PrepareDeviceArchive,
        OperationKind::PrepareDeviceBackup,
        OperationKind::AddDevice,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateDeviceGroup => "CreateDeviceGroup",
            OperationKind::CreateSignature => "CreateSignature",
            OperationKind::PrepareDeviceArchive => "PrepareDeviceArchive",
            OperationKind::PrepareDeviceBackup => "PrepareDeviceBackup",
            OperationKind::AddDevice => "AddDevice",
        }
    }

    /// Name of the pending resource, as used in poll/stop messages
    pub fn pending_resource(&self) -> &'static str {
        match self {
            OperationKind::CreateDeviceGroup => "DeviceGroup",
            OperationKind::CreateSignature => "Signatures",
            OperationKind::PrepareDeviceArchive => "Device Archives",
            OperationKind::PrepareDeviceBackup => "Device Backups",
            OperationKind::AddDevice => "Devices",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an operation as seen by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Initiated remotely, not yet observed by a poll
    Pending,
    /// Returned by a poll and ready to compute
    Materialized,
    /// Claimed by a compute call that has not returned yet
    Computing,
    /// Processed by a successful compute step; terminal
    Consumed,
    /// The compute step failed; needs a fresh poll before retrying
    Failed,
}

/// Opaque MPC payload handed to the crypto engine
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MpcData(String);

impl MpcData {
    /// Wrap raw MPC data
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    /// Borrow the raw payload
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MpcData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MpcData(<{} bytes>)", self.0.len())
    }
}

/// Pending CreateDeviceGroup operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeviceGroup {
    /// Device group being formed
    #[serde(rename = "DeviceGroup")]
    pub device_group: String,
    /// Operation resource name
    #[serde(rename = "Operation")]
    pub operation: String,
    /// Data for the compute step
    #[serde(rename = "MPCData")]
    pub mpc_data: MpcData,
}

/// Pending CreateSignature operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignature {
    /// Device group holding the signing key
    #[serde(rename = "DeviceGroup")]
    pub device_group: String,
    /// Operation resource name
    #[serde(rename = "Operation")]
    pub operation: String,
    /// Data for the compute step
    #[serde(rename = "MPCData")]
    pub mpc_data: MpcData,
    /// Hex payload being signed
    #[serde(rename = "Payload")]
    pub payload: String,
}

/// Pending PrepareDeviceArchive operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeviceArchive {
    /// Device group being archived
    #[serde(rename = "DeviceGroup")]
    pub device_group: String,
    /// Operation resource name
    #[serde(rename = "Operation")]
    pub operation: String,
    /// Data for the compute step
    #[serde(rename = "MPCData")]
    pub mpc_data: MpcData,
    /// Device whose share is archived, when reported
    #[serde(rename = "Device", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Pending PrepareDeviceBackup operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeviceBackup {
    /// Device group being backed up
    #[serde(rename = "DeviceGroup")]
    pub device_group: String,
    /// Operation resource name
    #[serde(rename = "Operation")]
    pub operation: String,
    /// Data for the compute step
    #[serde(rename = "MPCData")]
    pub mpc_data: MpcData,
    /// Device whose share is backed up, when reported
    #[serde(rename = "Device", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Pending AddDevice operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDevice {
    /// Device group gaining a member
    #[serde(rename = "DeviceGroup")]
    pub device_group: String,
    /// Operation resource name
    #[serde(rename = "Operation")]
    pub operation: String,
    /// Data for the compute step
    #[serde(rename = "MPCData")]
    pub mpc_data: MpcData,
    /// Device being added, when reported
    #[serde(rename = "Device", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// A materialized operation awaiting its local compute step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Kind")]
pub enum PendingOperation {
    /// Device group formation
    CreateDeviceGroup(PendingDeviceGroup),
    /// Threshold signature
    CreateSignature(PendingSignature),
    /// Key archive preparation
    PrepareDeviceArchive(PendingDeviceArchive),
    /// Backup preparation
    PrepareDeviceBackup(PendingDeviceBackup),
    /// Device addition
    AddDevice(PendingDevice),
}

impl PendingOperation {
    /// Kind of this operation
    pub fn kind(&self) -> OperationKind {
        match self {
            PendingOperation::CreateDeviceGroup(_) => OperationKind::CreateDeviceGroup,
            PendingOperation::CreateSignature(_) => OperationKind::CreateSignature,
            PendingOperation::PrepareDeviceArchive(_) => OperationKind::PrepareDeviceArchive,
            PendingOperation::PrepareDeviceBackup(_) => OperationKind::PrepareDeviceBackup,
            PendingOperation::AddDevice(_) => OperationKind::AddDevice,
        }
    }

    /// Operation resource name
    pub fn operation(&self) -> &str {
        match self {
            PendingOperation::CreateDeviceGroup(op) => &op.operation,
            PendingOperation::CreateSignature(op) => &op.operation,
            PendingOperation::PrepareDeviceArchive(op) => &op.operation,
            PendingOperation::PrepareDeviceBackup(op) => &op.operation,
            PendingOperation::AddDevice(op) => &op.operation,
        }
    }

    /// Parent device group
    pub fn device_group(&self) -> &str {
        match self {
            PendingOperation::CreateDeviceGroup(op) => &op.device_group,
            PendingOperation::CreateSignature(op) => &op.device_group,
            PendingOperation::PrepareDeviceArchive(op) => &op.device_group,
            PendingOperation::PrepareDeviceBackup(op) => &op.device_group,
            PendingOperation::AddDevice(op) => &op.device_group,
        }
    }

    /// Data for the compute step
    pub fn mpc_data(&self) -> &MpcData {
        match self {
            PendingOperation::CreateDeviceGroup(op) => &op.mpc_data,
            PendingOperation::CreateSignature(op) => &op.mpc_data,
            PendingOperation::PrepareDeviceArchive(op) => &op.mpc_data,
            PendingOperation::PrepareDeviceBackup(op) => &op.mpc_data,
            PendingOperation::AddDevice(op) => &op.mpc_data,
        }
    }

    /// Parse the JSON array the key service returns for one kind.
    ///
    /// Unknown fields are ignored. Missing or empty required fields fail
    /// with `SerializationError`.
    pub fn parse_list(kind: OperationKind, json: &str) -> WaasResult<Vec<PendingOperation>> {
        match kind {
            OperationKind::CreateDeviceGroup => {
                parse_records(json, PendingOperation::CreateDeviceGroup)
            }
            OperationKind::CreateSignature => parse_records(json, PendingOperation::CreateSignature),
            OperationKind::PrepareDeviceArchive => {
                parse_records(json, PendingOperation::PrepareDeviceArchive)
            }
            OperationKind::PrepareDeviceBackup => {
                parse_records(json, PendingOperation::PrepareDeviceBackup)
            }
            OperationKind::AddDevice => parse_records(json, PendingOperation::AddDevice),
        }
    }

    /// Parse an already-decoded JSON array for one kind
    pub fn from_value_list(
        kind: OperationKind,
        value: serde_json::Value,
    ) -> WaasResult<Vec<PendingOperation>> {
        Self::parse_list(kind, &value.to_string())
    }

    /// Check required fields are present and non-empty
    pub fn validate(&self) -> WaasResult<()> {
        require("DeviceGroup", self.device_group())?;
        require("Operation", self.operation())?;
        require("MPCData", self.mpc_data().as_str())?;
        if let PendingOperation::CreateSignature(op) = self {
            require("Payload", &op.payload)?;
        }
        Ok(())
    }
}

fn parse_records<R, F>(json: &str, wrap: F) -> WaasResult<Vec<PendingOperation>>
where
    R: DeserializeOwned,
    F: Fn(R) -> PendingOperation,
{
    // A JSON null is what the service sends for "nothing pending"
    let records: Option<Vec<R>> = serde_json::from_str(json)?;
    let operations: Vec<PendingOperation> = records
        .unwrap_or_default()
        .into_iter()
        .map(wrap)
        .collect();
    for op in &operations {
        op.validate()?;
    }
    Ok(operations)
}

fn require(field: &str, value: &str) -> WaasResult<()> {
    if value.is_empty() {
        Err(WaasError::serialization(format!(
            "pending operation is missing {field}"
        )))
    } else {
        Ok(())
    }
}

/// One poll cycle's result: operations of one kind for one device group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOperationSet {
    kind: OperationKind,
    device_group: String,
    operations: Vec<PendingOperation>,
}

impl PendingOperationSet {
    /// Build a set, checking every operation belongs to `kind` and `device_group`
    pub fn new(
        kind: OperationKind,
        device_group: impl Into<String>,
        operations: Vec<PendingOperation>,
    ) -> WaasResult<Self> {
        let device_group = device_group.into();
        for op in &operations {
            if op.kind() != kind {
                return Err(WaasError::serialization(format!(
                    "expected {kind} operation, got {} ({})",
                    op.kind(),
                    op.operation()
                )));
            }
            if op.device_group() != device_group {
                return Err(WaasError::serialization(format!(
                    "operation {} belongs to {}, not {device_group}",
                    op.operation(),
                    op.device_group()
                )));
            }
        }
        Ok(Self {
            kind,
            device_group,
            operations,
        })
    }

    /// Kind of every operation in the set
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Device group the set was polled for
    pub fn device_group(&self) -> &str {
        &self.device_group
    }

    /// Operations in the order the service reported them
    pub fn operations(&self) -> &[PendingOperation] {
        &self.operations
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Find an operation by resource name
    pub fn find(&self, operation: &str) -> Option<&PendingOperation> {
        self.operations.iter().find(|op| op.operation() == operation)
    }

    /// Iterate over the operations
    pub fn iter(&self) -> std::slice::Iter<'_, PendingOperation> {
        self.operations.iter()
    }
}

impl IntoIterator for PendingOperationSet {
    type Item = PendingOperation;
    type IntoIter = std::vec::IntoIter<PendingOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}
