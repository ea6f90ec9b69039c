//! Identity and attestation management for the Skein substrate.
//!
//! An identity binds a long-lived, mnemonic-recoverable wallet key (the
//! account) to a disposable per-device node key (the transport) via
//! short-lived wallet-signed attestations. Identities live on disk only
//! inside an encrypted keystore blob.

pub mod attestation;
pub mod identity;
pub mod keystore;
pub mod resolver;

pub use attestation::{create_attestation, verify_attestation};
pub use identity::Identity;
pub use keystore::{identity_exists, load_identity, save_identity, KeystoreError};
pub use resolver::{IdentityResolver, SingleIdentityResolver};
