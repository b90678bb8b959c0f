//! Remote resources returned by the Key, Wallet and Pool services

use crate::errors::{ServiceKind, WaasError, WaasResult};
use crate::names::segment_after;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A registered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    /// Resource name, `devices/{id}`
    pub name: String,
}

/// A set of devices jointly holding MPC key shares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGroup {
    /// Resource name, `pools/{pool}/deviceGroups/{group}`
    #[serde(rename = "Name")]
    pub name: String,
    /// Opaque metadata consumed by `export_private_keys`
    #[serde(rename = "MPCKeyExportMetadata", default)]
    pub mpc_key_export_metadata: String,
    /// Member device names
    #[serde(rename = "Devices", default)]
    pub devices: Vec<String>,
}

/// An MPC wallet backed by a device group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MpcWallet {
    /// Resource name, `pools/{pool}/mpcWallets/{wallet}`
    pub name: String,
    /// Device group holding the wallet's keys
    pub device_group: String,
}

/// Result of initiating wallet creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateMpcWalletResponse {
    /// Device group being formed for the wallet
    pub device_group: String,
    /// Long-running operation to wait on
    pub operation: String,
}

/// An on-chain address derived from an MPC wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Resource name, `networks/{network}/addresses/{address}`
    #[serde(rename = "Name")]
    pub name: String,
    /// The address string
    #[serde(rename = "Address")]
    pub address: String,
    /// Wallet the address belongs to
    #[serde(rename = "MPCWallet")]
    pub mpc_wallet: String,
    /// MPC keys backing the address
    #[serde(rename = "MPCKeys", default)]
    pub mpc_keys: Vec<String>,
}

impl Address {
    /// Network id parsed from the resource name
    pub fn network(&self) -> Option<&str> {
        segment_after(&self.name, "networks")
    }
}

/// A pool of wallets and device groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    /// Resource name, `pools/{id}`
    pub name: String,
    /// Display name chosen at creation
    #[serde(default)]
    pub display_name: String,
}

/// A threshold signature over a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Signature {
    /// Resource name under the signing key
    pub name: String,
    /// Hex payload that was signed
    pub payload: String,
    /// Signed payload produced by the key service
    pub signed_payload: String,
}

/// A private key exported from a device group
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "PascalCase")]
pub struct ExportedKey {
    address: String,
    private_key: String,
}

impl ExportedKey {
    /// Build an exported key
    pub fn new(address: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            private_key: private_key.into(),
        }
    }

    /// Address controlled by the key
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Hex private key
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for ExportedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedKey")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Error attached to a finished long-running operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// Numeric status code
    #[serde(default)]
    pub code: i32,
    /// Remote message
    #[serde(default)]
    pub message: String,
}

/// A remote long-running operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct LongRunningOperation<T> {
    /// Operation resource name
    pub name: String,
    /// True once the operation has a result or an error
    #[serde(default)]
    pub done: bool,
    /// Result, present when done without error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
    /// Failure, present when done with error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl<T> LongRunningOperation<T> {
    /// An unfinished operation
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            response: None,
            error: None,
        }
    }

    /// A finished operation with a result
    pub fn completed(name: impl Into<String>, response: T) -> Self {
        Self {
            name: name.into(),
            done: true,
            response: Some(response),
            error: None,
        }
    }

    /// A finished operation with an error
    pub fn failed(name: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            response: None,
            error: Some(OperationError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Resolve the operation: `None` while running, the result once done.
    ///
    /// A done operation carrying an error becomes a `ServiceError` of
    /// `service`; a done operation without a result is malformed.
    pub fn into_result(self, service: ServiceKind) -> WaasResult<Option<T>> {
        if !self.done {
            return Ok(None);
        }
        if let Some(error) = self.error {
            return Err(WaasError::service(service, error.message));
        }
        match self.response {
            Some(response) => Ok(Some(response)),
            None => Err(WaasError::serialization(format!(
                "operation {} finished without a result",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_device_group_wire_format() {
        let json = r#"{
            "Name": "pools/p1/deviceGroups/g1",
            "MPCKeyExportMetadata": "meta",
            "Devices": ["devices/d1", "devices/d2"],
            "Extra": true
        }"#;
        let group: DeviceGroup = serde_json::from_str(json).unwrap();
        assert_eq!(group.name, "pools/p1/deviceGroups/g1");
        assert_eq!(group.mpc_key_export_metadata, "meta");
        assert_eq!(group.devices.len(), 2);
    }

    #[test]
    fn test_address_network() {
        let address = Address {
            name: "networks/ethereum-goerli/addresses/a1".to_string(),
            address: "0xabc".to_string(),
            mpc_wallet: "pools/p1/mpcWallets/w1".to_string(),
            mpc_keys: vec![],
        };
        assert_eq!(address.network(), Some("ethereum-goerli"));
    }

    #[test]
    fn test_missing_signature_field_is_rejected() {
        let json = r#"{"Name": "sig", "Payload": "0x01"}"#;
        let parsed: Result<Signature, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_exported_key_debug_is_redacted() {
        let key = ExportedKey::new("0xabc", "deadbeef");
        let rendered = format!("{key:?}");
        assert!(rendered.contains("0xabc"));
        assert!(!rendered.contains("deadbeef"));
    }

    #[test]
    fn test_long_running_operation_resolution() {
        let running: LongRunningOperation<MpcWallet> = LongRunningOperation::pending("operations/1");
        assert_eq!(running.into_result(ServiceKind::MpcWallet).unwrap(), None);

        let failed: LongRunningOperation<MpcWallet> =
            LongRunningOperation::failed("operations/1", 9, "group formation failed");
        assert_matches!(
            failed.into_result(ServiceKind::MpcWallet),
            Err(WaasError::ServiceError { service: ServiceKind::MpcWallet, message }) if message == "group formation failed"
        );

        let json = r#"{"name": "operations/2", "done": true}"#;
        let malformed: LongRunningOperation<MpcWallet> = serde_json::from_str(json).unwrap();
        assert_matches!(
            malformed.into_result(ServiceKind::MpcWallet),
            Err(WaasError::SerializationError { .. })
        );
    }
}
