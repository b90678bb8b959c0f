//! Hierarchical resource names
//!
//! Resources are addressed by slash-separated names such as
//! `pools/p1/deviceGroups/g1`. Every name argument is checked here before a
//! call has any remote or local effect.

use crate::errors::{WaasError, WaasResult};

/// Shape a resource name is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePattern {
    /// `pools/{pool}`
    Pool,
    /// `devices/{device}`
    Device,
    /// `pools/{pool}/deviceGroups/{group}`
    DeviceGroup,
    /// `pools/{pool}/deviceGroups/{group}/mpcKeys/{key}`
    MpcKey,
    /// `pools/{pool}/mpcWallets/{wallet}`
    MpcWallet,
    /// `networks/{network}/addresses/{address}`
    Address,
    /// Any well-formed name (operations, opaque parents)
    Any,
}

impl ResourcePattern {
    /// Collection segments expected at even positions, `None` for `Any`
    fn collections(&self) -> Option<&'static [&'static str]> {
        match self {
            ResourcePattern::Pool => Some(&["pools"]),
            ResourcePattern::Device => Some(&["devices"]),
            ResourcePattern::DeviceGroup => Some(&["pools", "deviceGroups"]),
            ResourcePattern::MpcKey => Some(&["pools", "deviceGroups", "mpcKeys"]),
            ResourcePattern::MpcWallet => Some(&["pools", "mpcWallets"]),
            ResourcePattern::Address => Some(&["networks", "addresses"]),
            ResourcePattern::Any => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ResourcePattern::Pool => "pools/{pool}",
            ResourcePattern::Device => "devices/{device}",
            ResourcePattern::DeviceGroup => "pools/{pool}/deviceGroups/{group}",
            ResourcePattern::MpcKey => "pools/{pool}/deviceGroups/{group}/mpcKeys/{key}",
            ResourcePattern::MpcWallet => "pools/{pool}/mpcWallets/{wallet}",
            ResourcePattern::Address => "networks/{network}/addresses/{address}",
            ResourcePattern::Any => "a resource name",
        }
    }
}

/// Validate a resource name argument against a pattern
///
/// # Arguments
/// * `field` - Argument name, used in the error message
/// * `value` - The supplied name
/// * `pattern` - Expected shape
pub fn validate_name(field: &str, value: &str, pattern: ResourcePattern) -> WaasResult<()> {
    if value.is_empty() {
        return Err(WaasError::invalid_argument(format!("{field} must not be empty")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(WaasError::invalid_argument(format!(
            "{field} must not contain whitespace: {value:?}"
        )));
    }

    let segments: Vec<&str> = value.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(WaasError::invalid_argument(format!(
            "{field} has an empty path segment: {value:?}"
        )));
    }

    let Some(collections) = pattern.collections() else {
        return Ok(());
    };

    let matches = segments.len() == collections.len() * 2
        && collections
            .iter()
            .enumerate()
            .all(|(i, collection)| segments[i * 2] == *collection);

    if matches {
        Ok(())
    } else {
        Err(WaasError::invalid_argument(format!(
            "{field} must have the form {}, got {value:?}",
            pattern.describe()
        )))
    }
}

/// Validate a single identifier segment (pool id, network id)
pub fn validate_id(field: &str, value: &str) -> WaasResult<()> {
    if value.is_empty() {
        return Err(WaasError::invalid_argument(format!("{field} must not be empty")));
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(WaasError::invalid_argument(format!(
            "{field} must be a single path segment without whitespace: {value:?}"
        )));
    }
    Ok(())
}

/// Return the id following `collection` in a name, if present
///
/// `segment_after("networks/ethereum-goerli/addresses/a1", "networks")`
/// yields `Some("ethereum-goerli")`.
pub fn segment_after<'a>(name: &'a str, collection: &str) -> Option<&'a str> {
    let mut segments = name.split('/');
    while let Some(segment) = segments.next() {
        if segment == collection {
            return segments.next().filter(|s| !s.is_empty());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_well_formed_names() {
        validate_name("parent", "pools/p1", ResourcePattern::Pool).unwrap();
        validate_name("device", "devices/d1", ResourcePattern::Device).unwrap();
        validate_name(
            "deviceGroup",
            "pools/p1/deviceGroups/g1",
            ResourcePattern::DeviceGroup,
        )
        .unwrap();
        validate_name(
            "parent",
            "pools/p1/deviceGroups/g1/mpcKeys/k1",
            ResourcePattern::MpcKey,
        )
        .unwrap();
        validate_name("operation", "operations/abc-123", ResourcePattern::Any).unwrap();
    }

    #[test]
    fn test_rejects_wrong_collection() {
        let err = validate_name("deviceGroup", "pools/p1/mpcWallets/w1", ResourcePattern::DeviceGroup);
        assert_matches!(err, Err(WaasError::InvalidArgument { .. }));
    }

    #[test]
    fn test_rejects_empty_and_trailing_slash() {
        assert_matches!(
            validate_name("device", "", ResourcePattern::Device),
            Err(WaasError::InvalidArgument { .. })
        );
        assert_matches!(
            validate_name("device", "devices/d1/", ResourcePattern::Device),
            Err(WaasError::InvalidArgument { .. })
        );
    }

    #[test]
    fn test_segment_after() {
        assert_eq!(
            segment_after("networks/ethereum-goerli/addresses/a1", "networks"),
            Some("ethereum-goerli")
        );
        assert_eq!(segment_after("pools/p1", "networks"), None);
        assert_eq!(segment_after("networks", "networks"), None);
    }

    proptest! {
        #[test]
        fn prop_generated_device_groups_validate(pool in "[a-z0-9-]{1,16}", group in "[a-z0-9-]{1,16}") {
            let name = format!("pools/{pool}/deviceGroups/{group}");
            prop_assert!(validate_name("deviceGroup", &name, ResourcePattern::DeviceGroup).is_ok());
            prop_assert!(validate_name("deviceGroup", &name, ResourcePattern::Any).is_ok());
            prop_assert!(validate_name("deviceGroup", &name, ResourcePattern::MpcWallet).is_err());
        }

        #[test]
        fn prop_whitespace_is_always_rejected(prefix in "[a-z/]{0,8}", suffix in "[a-z/]{0,8}", ws in "[ \t\n]") {
            let name = format!("{prefix}{ws}{suffix}");
            prop_assert!(validate_name("name", &name, ResourcePattern::Any).is_err());
        }
    }
}
