use serde::{Deserialize, Serialize};

use skein_types::primitives::Principal;

/// Per-identity policy, owned by the hosting configuration store and
/// read-only to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Whether local (same-host) clients may act as this identity.
    #[serde(default)]
    pub allow_local: bool,
    /// Remote principals allowed to message this identity. The wildcard
    /// `"*"` admits everyone; otherwise entries match exactly.
    #[serde(default)]
    pub allowed_remote_peers: Vec<Principal>,
    /// Whether the host loads this identity at startup.
    #[serde(default)]
    pub autoload: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            allow_local: false,
            allowed_remote_peers: Vec::new(),
            autoload: false,
        }
    }
}

impl IdentityConfig {
    /// Whether this identity's ACL admits `peer`.
    pub fn allows_peer(&self, peer: &str) -> bool {
        self.allowed_remote_peers
            .iter()
            .any(|allowed| allowed == "*" || allowed == peer)
    }
}
