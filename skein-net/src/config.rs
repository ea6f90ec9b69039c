use std::time::Duration;

use skein_types::constants::{
    DEFAULT_ATTESTATION_VALIDITY, DEFAULT_LIVENESS_WINDOW, DEFAULT_MAX_PUSH_PEERS,
    DEFAULT_PEER_CACHE_TTL, DEFAULT_PX_SWEEP_INTERVAL, DEFAULT_RESOLVE_TIMEOUT, HANDSHAKE_TIMEOUT,
};
use skein_types::primitives::Principal;

/// Configuration for the session protocol handler.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Budget for each awaited handshake message.
    pub handshake_timeout: Duration,
    /// Validity window for attestations created per handshake attempt.
    pub attestation_validity_secs: u64,
    /// Silence window after which an unanswered ping degrades liveness.
    pub liveness_window: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            attestation_validity_secs: DEFAULT_ATTESTATION_VALIDITY,
            liveness_window: DEFAULT_LIVENESS_WINDOW,
        }
    }
}

/// Who may learn a peer's address record from us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Share with anyone.
    Public,
    /// Share only with allowlisted requesters.
    Private,
    /// Never share.
    Stealth,
}

/// Configuration for the peer-exchange service.
#[derive(Debug, Clone)]
pub struct PxConfig {
    pub visibility: Visibility,
    /// Requester principals allowed under `Visibility::Private`.
    pub allowlist: Vec<Principal>,
    /// How long a cached record stays valid, from insertion.
    pub cache_ttl: Duration,
    /// Interval between eviction sweeps.
    pub sweep_interval: Duration,
    /// Budget for an outstanding resolve request.
    pub resolve_timeout: Duration,
    /// Cap on records per unsolicited push.
    pub max_push_peers: usize,
}

impl Default for PxConfig {
    fn default() -> Self {
        Self {
            visibility: Visibility::Public,
            allowlist: Vec::new(),
            cache_ttl: DEFAULT_PEER_CACHE_TTL,
            sweep_interval: DEFAULT_PX_SWEEP_INTERVAL,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            max_push_peers: DEFAULT_MAX_PUSH_PEERS,
        }
    }
}
