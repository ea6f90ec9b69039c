use thiserror::Error;

/// Shared error codes for the Skein substrate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkeinError {
    // ─── Crypto Errors ───────────────────────────────────────────────────────
    #[error("invalid key material")]
    InvalidKeyMaterial,

    #[error("invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("signature recovery failed")]
    RecoveryFailed,

    // ─── Principal Errors ────────────────────────────────────────────────────
    #[error("malformed principal: {0}")]
    MalformedPrincipal(String),

    #[error("principal network mismatch: expected {expected}, got {actual}")]
    NetworkMismatch { expected: String, actual: String },

    // ─── Serialization Errors ────────────────────────────────────────────────
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("deserialization error: {reason}")]
    DeserializationError { reason: String },

    // ─── Wire Errors ─────────────────────────────────────────────────────────
    #[error("message too large: {size} > {max_size}")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("invalid message format: {reason}")]
    InvalidMessageFormat { reason: String },
}
