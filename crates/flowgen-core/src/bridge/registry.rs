//! The closed capability registry.
//!
//! Every operation here is read-only introspection; nothing the bridge
//! exposes mutates durable state.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::BridgeError;

/// A registry operation the bridge may be asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ListCapabilities,
    DescribeCapability,
    ListOperations,
    DescribeOperation,
    GetAuthStatus,
    ValidateParameters,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ListCapabilities,
        Capability::DescribeCapability,
        Capability::ListOperations,
        Capability::DescribeOperation,
        Capability::GetAuthStatus,
        Capability::ValidateParameters,
    ];

    /// Wire name sent as `params.name`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ListCapabilities => "list_capabilities",
            Capability::DescribeCapability => "describe_capability",
            Capability::ListOperations => "list_operations",
            Capability::DescribeOperation => "describe_operation",
            Capability::GetAuthStatus => "get_auth_status",
            Capability::ValidateParameters => "validate_parameters",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Capability::ListCapabilities => "Enumerate the integrations available to flows",
            Capability::DescribeCapability => "Describe one integration and its configuration",
            Capability::ListOperations => "Enumerate the operations of an integration",
            Capability::DescribeOperation => "Describe an operation and its parameter schema",
            Capability::GetAuthStatus => "Report which integrations already have credentials",
            Capability::ValidateParameters => "Check parameters against an operation's schema",
        }
    }

    /// Argument names the operation expects.
    pub fn arguments(&self) -> &'static [&'static str] {
        match self {
            Capability::ListCapabilities => &[],
            Capability::DescribeCapability => &["capability"],
            Capability::ListOperations => &["capability"],
            Capability::DescribeOperation => &["capability", "operation"],
            Capability::GetAuthStatus => &[],
            Capability::ValidateParameters => &["capability", "operation", "parameters"],
        }
    }

    /// Name the reasoning process sees for this capability when the bridge
    /// is mounted as server `server`.
    pub fn tool_name(&self, server: &str) -> String {
        format!("mcp__{}__{}", server, self.as_str())
    }

    /// Reverse of [`Capability::tool_name`]: accepts bare or prefixed names.
    pub fn from_tool_name(name: &str) -> Option<Capability> {
        let bare = match name.strip_prefix("mcp__") {
            Some(rest) => rest.split_once("__").map(|(_, tool)| tool)?,
            None => name,
        };
        bare.parse().ok()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| BridgeError::UnknownCapability(s.to_string()))
    }
}

/// Registry entry as listed to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: &'static [&'static str],
}

/// List the whole registry.
pub fn describe_registry() -> Vec<CapabilityInfo> {
    Capability::ALL
        .iter()
        .map(|c| CapabilityInfo {
            name: c.as_str(),
            description: c.description(),
            arguments: c.arguments(),
        })
        .collect()
}
