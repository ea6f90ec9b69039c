use std::time::Duration;

// ─── Attestation Parameters ──────────────────────────────────────────────────

/// Current attestation format version. Any other value is rejected outright.
pub const ATTESTATION_VERSION: u8 = 1;

/// Domain-separation string signed into every attestation.
pub const ATTESTATION_DOMAIN: &str = "skein-nodekey-attestation-v1";

/// Default attestation validity (seconds).
pub const DEFAULT_ATTESTATION_VALIDITY: u64 = 86_400; // 24 hours

/// Tolerated clock skew between peers when checking attestation timestamps
/// (seconds).
pub const CLOCK_SKEW_TOLERANCE: u64 = 300; // 5 minutes

/// Minimum accepted attestation nonce length in bytes.
pub const MIN_ATTESTATION_NONCE_LEN: usize = 16;

/// Maximum accepted attestation nonce length in bytes.
pub const MAX_ATTESTATION_NONCE_LEN: usize = 32;

// ─── Keystore Parameters ─────────────────────────────────────────────────────

/// On-disk keystore blob format version.
pub const KEYSTORE_VERSION: u8 = 1;

/// Minimum password length accepted when saving an identity.
pub const MIN_PASSWORD_LEN: usize = 12;

// ─── Network Parameters ──────────────────────────────────────────────────────

/// Maximum framed message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1_048_576; // 1 MB

/// Handshake step timeout: each awaited handshake message must arrive
/// within this budget.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness window: a ping left unanswered this long marks the session
/// degraded (never closed automatically).
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(90);

// ─── Peer Exchange Parameters ────────────────────────────────────────────────

/// How long a cached peer record stays valid, measured from insertion.
pub const DEFAULT_PEER_CACHE_TTL: Duration = Duration::from_secs(300);

/// Interval between cache eviction sweeps.
pub const DEFAULT_PX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Budget for an outstanding resolve request.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of records included in one unsolicited push.
pub const DEFAULT_MAX_PUSH_PEERS: usize = 16;
