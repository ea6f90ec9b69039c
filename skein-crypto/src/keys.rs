use ed25519_dalek::{Signer, Verifier};
use skein_types::error::SkeinError;
use skein_types::primitives::{NodePublicKey, NodeSignature};

/// Device-local Ed25519 transport keypair.
///
/// Node keys are generated fresh per device and are disposable; they gain
/// meaning only through a wallet-signed attestation binding them to a
/// principal.
pub struct NodeKeypair {
    inner: ed25519_dalek::SigningKey,
}

impl NodeKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        Self { inner: signing_key }
    }

    /// Create a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(seed);
        Self { inner: signing_key }
    }

    /// Get the public key bytes.
    pub fn public_key(&self) -> NodePublicKey {
        self.inner.verifying_key().to_bytes()
    }

    /// Get the 32-byte seed (secret key bytes) of this keypair.
    pub fn seed(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> NodeSignature {
        let sig = self.inner.sign(message);
        sig.to_bytes()
    }
}

// Note: SigningKey with the "zeroize" feature implements ZeroizeOnDrop,
// so key material is automatically wiped when NodeKeypair is dropped.

/// Verify an Ed25519 signature against a node public key.
pub fn verify(
    message: &[u8],
    signature: &NodeSignature,
    pubkey: &NodePublicKey,
) -> Result<(), SkeinError> {
    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(pubkey)
        .map_err(|_| SkeinError::InvalidKeyMaterial)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| SkeinError::InvalidSignature)
}
