use rand::RngCore;
use skein_crypto::wallet::recover_address;
use skein_types::attestation::{Attestation, AttestationPayload};
use skein_types::constants::{
    ATTESTATION_DOMAIN, ATTESTATION_VERSION, CLOCK_SKEW_TOLERANCE, MAX_ATTESTATION_NONCE_LEN,
    MIN_ATTESTATION_NONCE_LEN,
};
use skein_types::error::SkeinError;
use skein_types::network::{parse_principal, NetworkId};
use skein_types::primitives::unix_now;

use crate::identity::Identity;

/// Create a fresh attestation binding this identity's node key to its
/// principal, valid for `validity_secs` from now.
///
/// Pure function of the identity plus randomness and the clock; nothing is
/// persisted. Every handshake attempt creates its own.
pub fn create_attestation(
    identity: &Identity,
    validity_secs: u64,
) -> Result<Attestation, SkeinError> {
    let now = unix_now();
    let mut nonce = vec![0u8; MAX_ATTESTATION_NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let payload = AttestationPayload {
        version: ATTESTATION_VERSION,
        principal: identity.principal().clone(),
        node_public_key: identity.node_public_key(),
        issued_at: now,
        expires_at: now + validity_secs,
        nonce,
        domain: ATTESTATION_DOMAIN.to_string(),
    };

    let signature = identity.wallet().sign_recoverable(&payload.canonical_bytes()?)?;

    Ok(Attestation {
        version: payload.version,
        principal: payload.principal,
        node_public_key: payload.node_public_key,
        issued_at: payload.issued_at,
        expires_at: payload.expires_at,
        nonce: payload.nonce,
        domain: payload.domain,
        signature,
    })
}

/// Verify an attestation received from a peer. Strictly boolean: any
/// structural, temporal, or cryptographic defect yields `false`, never an
/// error.
pub fn verify_attestation(attestation: &Attestation, network: NetworkId) -> bool {
    let now = unix_now();

    if attestation.version != ATTESTATION_VERSION {
        return false;
    }

    if attestation.domain != ATTESTATION_DOMAIN {
        return false;
    }

    let nonce_len = attestation.nonce.len();
    if !(MIN_ATTESTATION_NONCE_LEN..=MAX_ATTESTATION_NONCE_LEN).contains(&nonce_len) {
        return false;
    }

    // Expired, beyond the tolerated skew.
    if attestation.expires_at <= now.saturating_sub(CLOCK_SKEW_TOLERANCE) {
        return false;
    }

    // Issued in the future, beyond the tolerated skew.
    if attestation.issued_at > now + CLOCK_SKEW_TOLERANCE {
        return false;
    }

    // The principal must parse and belong to our network.
    let expected_address = match parse_principal(&attestation.principal) {
        Ok((net, address)) if net == network => address,
        _ => return false,
    };

    // Recover the signer's address from the canonical payload and compare.
    let payload_bytes = match attestation.payload().canonical_bytes() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    match recover_address(&payload_bytes, &attestation.signature) {
        Ok(address) => address == expected_address,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_types::constants::DEFAULT_ATTESTATION_VALIDITY;

    fn identity() -> Identity {
        Identity::generate(NetworkId::Testnet).unwrap()
    }

    /// Re-sign a hand-modified payload so only the targeted check fails.
    fn signed(identity: &Identity, payload: AttestationPayload) -> Attestation {
        let signature = identity
            .wallet()
            .sign_recoverable(&payload.canonical_bytes().unwrap())
            .unwrap();
        Attestation {
            version: payload.version,
            principal: payload.principal,
            node_public_key: payload.node_public_key,
            issued_at: payload.issued_at,
            expires_at: payload.expires_at,
            nonce: payload.nonce,
            domain: payload.domain,
            signature,
        }
    }

    #[test]
    fn test_fresh_attestation_verifies() {
        let id = identity();
        let attestation = create_attestation(&id, DEFAULT_ATTESTATION_VALIDITY).unwrap();
        assert!(verify_attestation(&attestation, NetworkId::Testnet));
    }

    #[test]
    fn test_wrong_network_rejected() {
        let id = identity();
        let attestation = create_attestation(&id, DEFAULT_ATTESTATION_VALIDITY).unwrap();
        assert!(!verify_attestation(&attestation, NetworkId::Mainnet));
    }

    #[test]
    fn test_tampered_fields_rejected() {
        let id = identity();
        let valid = create_attestation(&id, DEFAULT_ATTESTATION_VALIDITY).unwrap();

        let mut principal_swap = valid.clone();
        principal_swap.principal =
            Identity::generate(NetworkId::Testnet).unwrap().principal().clone();
        assert!(!verify_attestation(&principal_swap, NetworkId::Testnet));

        let mut node_key_swap = valid.clone();
        node_key_swap.node_public_key = [0u8; 32];
        assert!(!verify_attestation(&node_key_swap, NetworkId::Testnet));

        let mut expiry_stretch = valid.clone();
        expiry_stretch.expires_at += 3600;
        assert!(!verify_attestation(&expiry_stretch, NetworkId::Testnet));

        let mut nonce_swap = valid.clone();
        nonce_swap.nonce = vec![0u8; 32];
        assert!(!verify_attestation(&nonce_swap, NetworkId::Testnet));

        let mut sig_flip = valid.clone();
        sig_flip.signature[0] ^= 0xff;
        assert!(!verify_attestation(&sig_flip, NetworkId::Testnet));
    }

    #[test]
    fn test_wrong_domain_rejected_even_if_signed() {
        let id = identity();
        let valid = create_attestation(&id, DEFAULT_ATTESTATION_VALIDITY).unwrap();
        let mut payload = valid.payload();
        payload.domain = "some-other-domain-v1".to_string();
        // Correctly signed over the foreign domain, still rejected.
        let attestation = signed(&id, payload);
        assert!(!verify_attestation(&attestation, NetworkId::Testnet));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let id = identity();
        let mut payload = create_attestation(&id, DEFAULT_ATTESTATION_VALIDITY)
            .unwrap()
            .payload();
        payload.version = 2;
        let attestation = signed(&id, payload);
        assert!(!verify_attestation(&attestation, NetworkId::Testnet));
    }

    #[test]
    fn test_nonce_length_bounds() {
        let id = identity();
        let base = create_attestation(&id, DEFAULT_ATTESTATION_VALIDITY)
            .unwrap()
            .payload();

        let mut short = base.clone();
        short.nonce = vec![1u8; MIN_ATTESTATION_NONCE_LEN - 1];
        assert!(!verify_attestation(&signed(&id, short), NetworkId::Testnet));

        let mut long = base.clone();
        long.nonce = vec![1u8; MAX_ATTESTATION_NONCE_LEN + 1];
        assert!(!verify_attestation(&signed(&id, long), NetworkId::Testnet));

        let mut minimal = base;
        minimal.nonce = vec![1u8; MIN_ATTESTATION_NONCE_LEN];
        assert!(verify_attestation(&signed(&id, minimal), NetworkId::Testnet));
    }

    #[test]
    fn test_expired_rejected_within_skew_accepted() {
        let id = identity();
        let now = unix_now();
        let base = create_attestation(&id, DEFAULT_ATTESTATION_VALIDITY)
            .unwrap()
            .payload();

        // Expired longer ago than the skew tolerance: rejected.
        let mut expired = base.clone();
        expired.issued_at = now - 7200;
        expired.expires_at = now - CLOCK_SKEW_TOLERANCE - 1;
        assert!(!verify_attestation(&signed(&id, expired), NetworkId::Testnet));

        // Expired, but within the skew window: still accepted.
        let mut skewed = base.clone();
        skewed.issued_at = now - 7200;
        skewed.expires_at = now - CLOCK_SKEW_TOLERANCE + 30;
        assert!(verify_attestation(&signed(&id, skewed), NetworkId::Testnet));

        // Issued too far in the future: rejected.
        let mut future = base;
        future.issued_at = now + CLOCK_SKEW_TOLERANCE + 60;
        future.expires_at = now + 7200;
        assert!(!verify_attestation(&signed(&id, future), NetworkId::Testnet));
    }

    #[test]
    fn test_recovered_identity_attests_for_same_principal() {
        let original = identity();
        let recovered =
            Identity::recover(original.mnemonic().clone(), NetworkId::Testnet).unwrap();
        let attestation = create_attestation(&recovered, DEFAULT_ATTESTATION_VALIDITY).unwrap();
        assert!(verify_attestation(&attestation, NetworkId::Testnet));
        assert_eq!(attestation.principal, *original.principal());
    }
}
