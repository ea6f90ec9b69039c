/// 32-byte BLAKE3 hash.
pub type Hash = [u8; 32];

/// 32-byte Ed25519 node (transport) public key.
pub type NodePublicKey = [u8; 32];

/// 64-byte Ed25519 signature made with a node key.
pub type NodeSignature = [u8; 64];

/// 65-byte recoverable secp256k1 signature made with a wallet key
/// (64-byte ECDSA signature followed by a 1-byte recovery id).
pub type WalletSignature = [u8; 65];

/// 20-byte account address derived from BLAKE3(wallet pubkey)[0..20].
pub type Address = [u8; 20];

/// Stable account-derived identity string, portable across devices.
/// Format: `skein:<net>:<40-hex address>`.
pub type Principal = String;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Serde helper for [u8; 64] fields.
pub mod serde_sig {
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = Vec::deserialize(deserializer)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes for signature"))
    }
}

/// Serde helper for [u8; 65] fields (recoverable wallet signatures).
pub mod serde_wallet_sig {
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &[u8; 65], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 65], D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = Vec::deserialize(deserializer)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 65 bytes for wallet signature"))
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hex-encode an address for display and principal construction.
pub fn address_hex(address: &Address) -> String {
    address.iter().map(|b| format!("{:02x}", b)).collect()
}
