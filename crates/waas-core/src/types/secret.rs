//! Secret values that must not outlive their use or reach logs

use crate::errors::{WaasError, WaasResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Passcode protecting the device's local key material
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Passcode(String);

impl Passcode {
    /// Wrap a passcode, rejecting an empty one
    pub fn new(passcode: impl Into<String>) -> WaasResult<Self> {
        let passcode = passcode.into();
        if passcode.is_empty() {
            return Err(WaasError::invalid_argument("passcode must not be empty"));
        }
        Ok(Self(passcode))
    }

    /// Expose the passcode to the crypto engine
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passcode(<redacted>)")
    }
}

/// Encrypted device backup, hex encoded
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct DeviceBackup(String);

impl DeviceBackup {
    /// Wrap a backup, rejecting an empty one
    pub fn new(backup: impl Into<String>) -> WaasResult<Self> {
        let backup = backup.into();
        if backup.is_empty() {
            return Err(WaasError::invalid_argument("device backup must not be empty"));
        }
        Ok(Self(backup))
    }

    /// Expose the backup to the crypto engine
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceBackup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceBackup(<{} bytes>)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_passcode_rejected() {
        assert!(Passcode::new("").is_err());
        assert!(DeviceBackup::new(String::new()).is_err());
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let passcode = Passcode::new("123456").unwrap();
        assert!(!format!("{passcode:?}").contains("123456"));

        let backup = DeviceBackup::new("cafebabe").unwrap();
        assert!(!format!("{backup:?}").contains("cafebabe"));
    }
}
