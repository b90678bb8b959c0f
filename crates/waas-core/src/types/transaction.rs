//! EIP-1559 transactions and their signed form

use crate::errors::{WaasError, WaasResult};
use crate::types::Signature;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An unsigned EIP-1559 transaction
///
/// Fields the client does not know about are kept in `extra` and sent back
/// untouched, so newer services can add fields without breaking signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Chain id as a decimal string
    #[serde(rename = "ChainID")]
    pub chain_id: String,
    /// Sender nonce
    #[serde(rename = "Nonce")]
    pub nonce: u64,
    /// Priority fee in wei
    #[serde(rename = "MaxPriorityFeePerGas")]
    pub max_priority_fee_per_gas: String,
    /// Fee cap in wei
    #[serde(rename = "MaxFeePerGas")]
    pub max_fee_per_gas: String,
    /// Gas limit
    #[serde(rename = "Gas")]
    pub gas: u64,
    /// Recipient address
    #[serde(rename = "To")]
    pub to: String,
    /// Transfer value in wei
    #[serde(rename = "Value")]
    pub value: String,
    /// Hex call data
    #[serde(rename = "Data", default)]
    pub data: String,
    /// Unrecognized fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// Parse a transaction from its JSON form
    pub fn from_json(json: &str) -> WaasResult<Self> {
        let tx: Transaction = serde_json::from_str(json)?;
        tx.validate()?;
        Ok(tx)
    }

    /// Serialize to the JSON form the engine and key service expect
    pub fn to_json(&self) -> WaasResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reject transactions that cannot be signed
    pub fn validate(&self) -> WaasResult<()> {
        if self.chain_id.is_empty() {
            return Err(WaasError::invalid_argument("transaction ChainID must not be empty"));
        }
        if self.to.is_empty() {
            return Err(WaasError::invalid_argument("transaction To must not be empty"));
        }
        Ok(())
    }
}

/// Raw bytes and hash produced by the engine for a signed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSignedTransaction {
    /// Hex-encoded signed transaction
    pub raw_transaction: String,
    /// Transaction hash
    pub transaction_hash: String,
}

/// A transaction together with its signature, ready to broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedTransaction {
    /// The unsigned transaction
    pub transaction: Transaction,
    /// Signature produced for it
    pub signature: Signature,
    /// Hex-encoded signed transaction
    pub raw_transaction: String,
    /// Transaction hash
    pub transaction_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const TX: &str = r#"{
        "ChainID": "0x5",
        "Nonce": 0,
        "MaxPriorityFeePerGas": "0x400",
        "MaxFeePerGas": "0x400",
        "Gas": 63000,
        "To": "0xd8ee596ed0a2b4d4e7a9b6fd3a7c3b3b7e3c1f9a",
        "Value": "0x1000",
        "Data": "",
        "AccessList": []
    }"#;

    #[test]
    fn test_extra_fields_survive_reserialization() {
        let tx = Transaction::from_json(TX).unwrap();
        assert_eq!(tx.gas, 63000);
        assert!(tx.extra.contains_key("AccessList"));

        let again: Value = serde_json::from_str(&tx.to_json().unwrap()).unwrap();
        assert_eq!(again["AccessList"], Value::Array(vec![]));
        assert_eq!(again["ChainID"], "0x5");
    }

    #[test]
    fn test_missing_recipient_is_invalid() {
        let json = TX.replace("0xd8ee596ed0a2b4d4e7a9b6fd3a7c3b3b7e3c1f9a", "");
        assert_matches!(Transaction::from_json(&json), Err(WaasError::InvalidArgument { .. }));
    }

    #[test]
    fn test_missing_nonce_is_serialization_error() {
        let json = TX.replace("\"Nonce\": 0,", "");
        assert_matches!(Transaction::from_json(&json), Err(WaasError::SerializationError { .. }));
    }
}
