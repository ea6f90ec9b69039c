use std::path::Path;

use argon2::Argon2;
use borsh::{BorshDeserialize, BorshSerialize};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use thiserror::Error;

use skein_types::constants::{KEYSTORE_VERSION, MIN_PASSWORD_LEN};
use skein_types::network::NetworkId;
use skein_types::primitives::Principal;

use crate::identity::Identity;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Errors from the encrypted identity keystore.
///
/// `InvalidPasswordOrCorrupt` deliberately covers every decryption-path
/// failure: a wrong password and a corrupted file are indistinguishable to
/// the caller.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("unsupported keystore version: {version}")]
    UnsupportedVersion { version: u8 },

    #[error("invalid password or corrupted identity file")]
    InvalidPasswordOrCorrupt,

    #[error("failed to encrypt identity: {reason}")]
    EncryptionFailed { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything needed to rebuild an identity, serialized inside the
/// encrypted blob. The node seed is stored so a reload is the *same*
/// device identity, not a recovery.
#[derive(BorshSerialize, BorshDeserialize)]
struct KeystoreRecord {
    principal: Principal,
    network: NetworkId,
    mnemonic: String,
    node_seed: [u8; 32],
    nickname: Option<String>,
}

/// Derive the 32-byte AEAD key from a password and salt with Argon2id.
fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32], KeystoreError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| KeystoreError::EncryptionFailed {
            reason: e.to_string(),
        })?;
    Ok(key)
}

/// Encrypt and save an identity (including its mnemonic) to `path`.
///
/// Blob layout: `[1-byte version][16-byte salt][24-byte nonce][ciphertext]`.
/// The file is written with owner-only permissions.
pub fn save_identity(
    identity: &Identity,
    password: &str,
    path: &Path,
) -> Result<(), KeystoreError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(KeystoreError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }

    let record = KeystoreRecord {
        principal: identity.principal().clone(),
        network: identity.network(),
        mnemonic: identity.mnemonic().to_string(),
        node_seed: identity.node().seed(),
        nickname: identity.nickname().map(str::to_string),
    };
    let plaintext = borsh::to_vec(&record).map_err(|e| KeystoreError::EncryptionFailed {
        reason: e.to_string(),
    })?;

    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|e| {
        KeystoreError::EncryptionFailed {
            reason: e.to_string(),
        }
    })?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| KeystoreError::EncryptionFailed {
            reason: e.to_string(),
        })?;

    let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    blob.push(KEYSTORE_VERSION);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }

    std::fs::write(path, &blob)?;

    // Owner read/write only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Decrypt and load an identity from `path`.
///
/// A missing file is `Ok(None)`; the caller decides whether that means
/// onboarding. Every failure past that point is fatal and generic.
pub fn load_identity(password: &str, path: &Path) -> Result<Option<Identity>, KeystoreError> {
    if !path.exists() {
        return Ok(None);
    }

    let blob = std::fs::read(path)?;
    if blob.len() < HEADER_LEN {
        return Err(KeystoreError::InvalidPasswordOrCorrupt);
    }

    let version = blob[0];
    if version != KEYSTORE_VERSION {
        return Err(KeystoreError::UnsupportedVersion { version });
    }

    let salt = &blob[1..1 + SALT_LEN];
    let nonce = &blob[1 + SALT_LEN..HEADER_LEN];
    let ciphertext = &blob[HEADER_LEN..];

    let key = derive_key(password, salt)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|_| KeystoreError::InvalidPasswordOrCorrupt)?;
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| KeystoreError::InvalidPasswordOrCorrupt)?;

    let record = KeystoreRecord::try_from_slice(&plaintext)
        .map_err(|_| KeystoreError::InvalidPasswordOrCorrupt)?;
    let mnemonic = skein_crypto::wallet::parse_mnemonic(&record.mnemonic)
        .map_err(|_| KeystoreError::InvalidPasswordOrCorrupt)?;

    let identity =
        Identity::from_parts(record.network, mnemonic, &record.node_seed, record.nickname)
            .map_err(|_| KeystoreError::InvalidPasswordOrCorrupt)?;

    // The stored principal must match what the mnemonic re-derives.
    if *identity.principal() != record.principal {
        return Err(KeystoreError::InvalidPasswordOrCorrupt);
    }

    Ok(Some(identity))
}

/// Whether an identity blob exists at `path`.
pub fn identity_exists(path: &Path) -> bool {
    path.exists()
}

/// Update the nickname stored in an existing keystore.
pub fn set_nickname(
    password: &str,
    path: &Path,
    nickname: Option<String>,
) -> Result<(), KeystoreError> {
    let mut identity =
        load_identity(password, path)?.ok_or(KeystoreError::InvalidPasswordOrCorrupt)?;
    identity.set_nickname(nickname);
    save_identity(&identity, password, path)
}
