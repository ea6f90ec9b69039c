use std::sync::Arc;

use crate::identity::Identity;

/// Chooses which local identity a session speaks for.
///
/// Called twice per handshake: once with no remote principal to pick the
/// identity for the initial exchange, and once more after the peer has
/// authenticated, with the now-known remote principal. Returning `None`
/// from the second call aborts the session — an authorization gate layered
/// on top of successful cryptographic authentication.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, remote_principal: Option<&str>) -> Option<Arc<Identity>>;
}

/// Resolver for hosts with exactly one identity: it answers every exchange
/// and accepts every authenticated peer. Access control, if any, happens
/// downstream in the message router.
pub struct SingleIdentityResolver {
    identity: Arc<Identity>,
}

impl SingleIdentityResolver {
    pub fn new(identity: Arc<Identity>) -> Self {
        Self { identity }
    }
}

impl IdentityResolver for SingleIdentityResolver {
    fn resolve(&self, _remote_principal: Option<&str>) -> Option<Arc<Identity>> {
        Some(Arc::clone(&self.identity))
    }
}
