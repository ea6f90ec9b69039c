use thiserror::Error;

/// Errors that can occur in the session and discovery layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// A transport-level failure (dial, listen, stream I/O).
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Failed to encode or decode a frame.
    #[error("codec error: {reason}")]
    Codec { reason: String },

    /// Frame exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Peer is speaking an incompatible wire version.
    #[error("wire version mismatch: peer sent v{peer}, we run v{ours}")]
    VersionMismatch { peer: u8, ours: u8 },

    /// A handshake message arrived out of order or with the wrong type.
    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: String,
    },

    /// The peer's attestation failed verification.
    #[error("attestation rejected")]
    AttestationRejected,

    /// The post-authentication authorization gate refused the peer.
    #[error("no local identity accepts peer {principal}")]
    PeerNotAccepted { principal: String },

    /// A handshake-level failure not covered by a more specific variant.
    #[error("handshake failed: {reason}")]
    Handshake { reason: String },

    /// Operation requires an authenticated session.
    #[error("session not authenticated")]
    NotAuthenticated,

    /// The session or stream has been closed.
    #[error("session closed")]
    Closed,

    /// A wait exceeded its fixed budget.
    #[error("timed out")]
    Timeout,

    /// The identity resolver produced no identity.
    #[error("no identity available")]
    NoIdentity,
}
