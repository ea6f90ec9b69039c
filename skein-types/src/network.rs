use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::error::SkeinError;
use crate::primitives::{address_hex, Address, Principal};

/// Network identifier for distinguishing dev, testnet, and mainnet
/// environments. Principals embed the network so identities cannot be
/// replayed across environments.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Dev,
    Testnet,
    Mainnet,
}

impl NetworkId {
    /// Short lowercase identifier (for CLI/config and principal strings).
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::Dev => "dev",
            NetworkId::Testnet => "testnet",
            NetworkId::Mainnet => "mainnet",
        }
    }

    /// Parse from a string identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dev" => Some(NetworkId::Dev),
            "testnet" => Some(NetworkId::Testnet),
            "mainnet" => Some(NetworkId::Mainnet),
            _ => None,
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            NetworkId::Dev => "Development",
            NetworkId::Testnet => "Testnet",
            NetworkId::Mainnet => "Mainnet",
        }
    }

    /// Build the principal string for an account address on this network.
    pub fn principal_for(&self, address: &Address) -> Principal {
        format!("skein:{}:{}", self.as_str(), address_hex(address))
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Split a principal into its network and account address.
///
/// Accepts only the exact `skein:<net>:<40-hex>` shape; anything else is
/// a malformed principal.
pub fn parse_principal(principal: &str) -> Result<(NetworkId, Address), SkeinError> {
    let mut parts = principal.splitn(3, ':');
    let scheme = parts.next().unwrap_or_default();
    let net = parts.next().unwrap_or_default();
    let hex = parts.next().unwrap_or_default();

    if scheme != "skein" {
        return Err(SkeinError::MalformedPrincipal(principal.to_string()));
    }
    let network = NetworkId::parse(net)
        .ok_or_else(|| SkeinError::MalformedPrincipal(principal.to_string()))?;
    if hex.len() != 40 || !hex.is_ascii() {
        return Err(SkeinError::MalformedPrincipal(principal.to_string()));
    }

    let mut address = [0u8; 20];
    for (i, byte) in address.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| SkeinError::MalformedPrincipal(principal.to_string()))?;
    }
    Ok((network, address))
}
