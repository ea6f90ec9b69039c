use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::error::SkeinError;
use crate::primitives::{serde_wallet_sig, NodePublicKey, Principal, Timestamp, WalletSignature};

/// A short-lived, wallet-signed statement binding a device-local node key
/// to a principal.
///
/// The signature covers the canonical borsh encoding of every other field
/// (see [`AttestationPayload`]). Attestations are created fresh per
/// handshake attempt, verified once, then discarded — they are never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Attestation {
    /// Format version; checked exactly against `ATTESTATION_VERSION`.
    pub version: u8,
    /// The account this node key acts for.
    pub principal: Principal,
    /// Ed25519 transport public key being bound.
    pub node_public_key: NodePublicKey,
    /// Unix time the attestation was issued.
    pub issued_at: Timestamp,
    /// Unix time after which the attestation is no longer accepted.
    pub expires_at: Timestamp,
    /// Replay-defense nonce, 16–32 bytes.
    pub nonce: Vec<u8>,
    /// Domain-separation string; must equal `ATTESTATION_DOMAIN`.
    pub domain: String,
    /// Recoverable wallet signature over the canonical payload.
    #[serde(with = "serde_wallet_sig")]
    pub signature: WalletSignature,
}

/// The signed portion of an attestation: every field except the signature,
/// in canonical borsh field order.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AttestationPayload {
    pub version: u8,
    pub principal: Principal,
    pub node_public_key: NodePublicKey,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub nonce: Vec<u8>,
    pub domain: String,
}

impl AttestationPayload {
    /// Deterministic byte encoding the wallet key signs and verifiers
    /// re-derive. Re-encoding an attestation received off the wire yields
    /// byte-identical output, so signature validity survives transport.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, SkeinError> {
        borsh::to_vec(self).map_err(|e| SkeinError::SerializationError {
            reason: e.to_string(),
        })
    }
}

impl Attestation {
    /// Reconstruct the signed payload from a full attestation.
    pub fn payload(&self) -> AttestationPayload {
        AttestationPayload {
            version: self.version,
            principal: self.principal.clone(),
            node_public_key: self.node_public_key,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            nonce: self.nonce.clone(),
            domain: self.domain.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Attestation {
        Attestation {
            version: 1,
            principal: "skein:testnet:00112233445566778899aabbccddeeff00112233".to_string(),
            node_public_key: [7u8; 32],
            issued_at: 1_700_000_000,
            expires_at: 1_700_086_400,
            nonce: vec![9u8; 32],
            domain: crate::constants::ATTESTATION_DOMAIN.to_string(),
            signature: [3u8; 65],
        }
    }

    #[test]
    fn test_payload_excludes_signature() {
        let a = sample();
        let bytes = a.payload().canonical_bytes().unwrap();
        let mut b = a.clone();
        b.signature = [0xffu8; 65];
        assert_eq!(bytes, b.payload().canonical_bytes().unwrap());
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let a = sample();
        assert_eq!(
            a.payload().canonical_bytes().unwrap(),
            a.payload().canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_canonical_bytes_field_sensitive() {
        let a = sample();
        let mut b = a.clone();
        b.expires_at += 1;
        assert_ne!(
            a.payload().canonical_bytes().unwrap(),
            b.payload().canonical_bytes().unwrap()
        );
    }
}
