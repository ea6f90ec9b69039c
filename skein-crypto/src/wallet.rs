use bip39::Mnemonic;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use skein_types::error::SkeinError;
use skein_types::network::NetworkId;
use skein_types::primitives::{Address, Principal, WalletSignature};

use crate::hash::{blake3_hash, blake3_kdf};

/// KDF context for turning a BIP-39 seed into a wallet scalar.
const WALLET_SCALAR_CONTEXT: &str = "skein-wallet-scalar";

/// Long-lived secp256k1 account keypair.
///
/// The wallet key signs attestations with a recoverable ECDSA signature, so
/// verifiers need only the signature and message to re-derive the account
/// address; no public key travels with the attestation. Re-derivable from
/// its mnemonic, which is the only form in which it is ever persisted.
pub struct WalletKeypair {
    inner: SigningKey,
}

impl WalletKeypair {
    /// Generate a fresh wallet with a new 24-word mnemonic.
    pub fn generate() -> Result<(Self, Mnemonic), SkeinError> {
        let mnemonic = generate_mnemonic();
        let keypair = Self::from_mnemonic(&mnemonic)?;
        Ok((keypair, mnemonic))
    }

    /// Re-derive the wallet from a mnemonic. Deterministic: the same phrase
    /// always yields the same account address on every device.
    pub fn from_mnemonic(mnemonic: &Mnemonic) -> Result<Self, SkeinError> {
        let seed = mnemonic.to_seed("");
        let scalar = blake3_kdf(WALLET_SCALAR_CONTEXT, &seed);
        let inner = SigningKey::from_slice(&scalar).map_err(|_| SkeinError::InvalidKeyMaterial)?;
        Ok(Self { inner })
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn public_key(&self) -> [u8; 33] {
        let point = self.inner.verifying_key().to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Account address for this wallet.
    pub fn address(&self) -> Address {
        pubkey_to_address(&self.public_key())
    }

    /// Principal string for this wallet on the given network.
    pub fn principal(&self, network: NetworkId) -> Principal {
        network.principal_for(&self.address())
    }

    /// Sign a message with a recoverable signature
    /// (64-byte ECDSA over BLAKE3(message), plus 1 recovery byte).
    pub fn sign_recoverable(&self, message: &[u8]) -> Result<WalletSignature, SkeinError> {
        let prehash = blake3_hash(message);
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(&prehash)
            .map_err(|_| SkeinError::InvalidKeyMaterial)?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(out)
    }
}

/// Derive an account address from a compressed wallet public key.
/// Address = BLAKE3(pubkey)[0..20]
pub fn pubkey_to_address(pubkey: &[u8; 33]) -> Address {
    let hash = blake3_hash(pubkey);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[..20]);
    address
}

/// Recover the signing account's address from a message and a recoverable
/// signature. Fails on malformed signatures; a valid-but-wrong signature
/// recovers a *different* address, which the caller compares against the
/// expected principal.
pub fn recover_address(
    message: &[u8],
    signature: &WalletSignature,
) -> Result<Address, SkeinError> {
    let prehash = blake3_hash(message);
    let sig =
        EcdsaSignature::from_slice(&signature[..64]).map_err(|_| SkeinError::RecoveryFailed)?;
    let recovery_id = RecoveryId::from_byte(signature[64]).ok_or(SkeinError::RecoveryFailed)?;

    let verifying_key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|_| SkeinError::RecoveryFailed)?;

    let point = verifying_key.to_encoded_point(true);
    let mut pubkey = [0u8; 33];
    pubkey.copy_from_slice(point.as_bytes());
    Ok(pubkey_to_address(&pubkey))
}

/// Generate a new 24-word BIP-39 mnemonic.
pub fn generate_mnemonic() -> Mnemonic {
    // 24 words = 256 bits of entropy = 32 bytes
    let mut entropy = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut entropy);
    Mnemonic::from_entropy(&entropy).expect("32 bytes is valid entropy for 24 words")
}

/// Parse a mnemonic from a string of space-separated words.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, SkeinError> {
    Mnemonic::parse_normalized(phrase).map_err(|_| SkeinError::InvalidMnemonic)
}
