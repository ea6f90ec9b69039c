use std::sync::{Arc, RwLock, RwLockReadGuard};

use thiserror::Error;
use tracing::debug;

use skein_identity::{Identity, IdentityResolver};
use skein_types::wire::ChatMessage;

use crate::registry::{IdentityRegistry, LoadedIdentity};

/// Routing refusals. Structured values, never panics: the caller decides
/// whether a refusal is an error, a log line, or a dropped message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no loaded identity found for recipient {to}")]
    NoIdentityForRecipient { to: String },

    #[error("sender {from} not in allowed_remote_peers of {to}")]
    SenderNotAllowed { from: String, to: String },

    #[error("no loaded identity found for sender {from}")]
    NoIdentityForSender { from: String },

    #[error("no identities loaded")]
    NoIdentitiesLoaded,
}

/// Pure routing and ACL decisions over the shared identity registry.
///
/// Performs no I/O and never mutates the registry; safe to call from any
/// concurrency context.
pub struct MessageRouter {
    registry: Arc<RwLock<IdentityRegistry>>,
}

impl MessageRouter {
    pub fn new(registry: Arc<RwLock<IdentityRegistry>>) -> Self {
        Self { registry }
    }

    /// Shared handle to the underlying registry (for loading/unloading).
    pub fn registry(&self) -> Arc<RwLock<IdentityRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Route an inbound message: the identity addressed by `message.to`
    /// must be loaded and its ACL must admit `from_principal`.
    pub fn route_inbound(
        &self,
        message: &ChatMessage,
        from_principal: &str,
    ) -> Result<LoadedIdentity, RouteError> {
        let registry = self.read();
        let target = registry
            .get(&message.to)
            .ok_or_else(|| RouteError::NoIdentityForRecipient {
                to: message.to.clone(),
            })?;

        if !target.config.allows_peer(from_principal) {
            debug!(from = %from_principal, to = %message.to, "inbound message refused by ACL");
            return Err(RouteError::SenderNotAllowed {
                from: from_principal.to_string(),
                to: message.to.clone(),
            });
        }

        Ok(target.clone())
    }

    /// Route an outbound message: a non-empty `message.from` demands that
    /// exact loaded identity; an empty one falls back to the first loaded.
    pub fn route_outbound(&self, message: &ChatMessage) -> Result<LoadedIdentity, RouteError> {
        let registry = self.read();

        if !message.from.is_empty() {
            return registry
                .get(&message.from)
                .cloned()
                .ok_or_else(|| RouteError::NoIdentityForSender {
                    from: message.from.clone(),
                });
        }

        registry
            .all()
            .first()
            .cloned()
            .ok_or(RouteError::NoIdentitiesLoaded)
    }

    /// Whether a local (same-host) client may act as `principal`.
    /// Unknown principals are simply `false`, not an error.
    pub fn is_local_access_allowed(&self, principal: &str) -> bool {
        self.read()
            .get(principal)
            .map(|entry| entry.config.allow_local)
            .unwrap_or(false)
    }

    /// Every loaded identity whose ACL admits `peer_principal`, in load
    /// order.
    pub fn find_identities_for_peer(&self, peer_principal: &str) -> Vec<LoadedIdentity> {
        self.read()
            .all()
            .iter()
            .filter(|entry| entry.config.allows_peer(peer_principal))
            .cloned()
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, IdentityRegistry> {
        self.registry.read().unwrap_or_else(|p| p.into_inner())
    }
}

/// The router doubles as the session layer's identity resolver: the
/// no-argument call picks the default (first loaded) identity for the
/// initial exchange, and the post-authentication call finds any identity
/// whose ACL accepts the now-known peer — `None` aborts the session.
impl IdentityResolver for MessageRouter {
    fn resolve(&self, remote_principal: Option<&str>) -> Option<Arc<Identity>> {
        let registry = self.read();
        match remote_principal {
            None => registry.all().first().map(|entry| Arc::clone(&entry.identity)),
            Some(peer) => registry
                .all()
                .iter()
                .find(|entry| entry.config.allows_peer(peer))
                .map(|entry| Arc::clone(&entry.identity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use skein_types::network::NetworkId;
    use skein_types::primitives::unix_now;

    fn identity() -> Arc<Identity> {
        Arc::new(Identity::generate(NetworkId::Dev).unwrap())
    }

    fn message(from: &str, to: &str) -> ChatMessage {
        ChatMessage {
            id: "m1".to_string(),
            from: from.to_string(),
            to: to.to_string(),
            nick: None,
            content: "hello".to_string(),
            timestamp: unix_now(),
        }
    }

    fn router() -> MessageRouter {
        MessageRouter::new(Arc::new(RwLock::new(IdentityRegistry::new())))
    }

    fn load(router: &MessageRouter, identity: Arc<Identity>, allowed: &[&str]) {
        let config = IdentityConfig {
            allow_local: true,
            allowed_remote_peers: allowed.iter().map(|s| s.to_string()).collect(),
            autoload: false,
        };
        router.registry().write().unwrap().load(identity, config).unwrap();
    }

    #[test]
    fn test_inbound_wildcard_accepts_anyone() {
        let router = router();
        let receiver = identity();
        load(&router, Arc::clone(&receiver), &["*"]);

        let msg = message("skein:dev:anyone", receiver.principal());
        let routed = router.route_inbound(&msg, "skein:dev:anyone").unwrap();
        assert_eq!(routed.identity.principal(), receiver.principal());
    }

    #[test]
    fn test_inbound_exact_allowlist() {
        let router = router();
        let receiver = identity();
        load(&router, Arc::clone(&receiver), &["skein:dev:p1"]);

        let msg = message("skein:dev:p1", receiver.principal());
        assert!(router.route_inbound(&msg, "skein:dev:p1").is_ok());

        let msg = message("skein:dev:p2", receiver.principal());
        let err = router.route_inbound(&msg, "skein:dev:p2").unwrap_err();
        assert!(matches!(err, RouteError::SenderNotAllowed { .. }));
    }

    #[test]
    fn test_inbound_unknown_recipient() {
        let router = router();
        let msg = message("skein:dev:p1", "skein:dev:nobody");
        let err = router.route_inbound(&msg, "skein:dev:p1").unwrap_err();
        assert!(matches!(err, RouteError::NoIdentityForRecipient { .. }));
    }

    #[test]
    fn test_outbound_explicit_sender() {
        let router = router();
        let first = identity();
        let second = identity();
        load(&router, Arc::clone(&first), &["*"]);
        load(&router, Arc::clone(&second), &["*"]);

        let msg = message(second.principal(), "skein:dev:dest");
        let routed = router.route_outbound(&msg).unwrap();
        assert_eq!(routed.identity.principal(), second.principal());
    }

    #[test]
    fn test_outbound_explicit_sender_must_be_loaded() {
        let router = router();
        load(&router, identity(), &["*"]);

        let msg = message("skein:dev:ghost", "skein:dev:dest");
        let err = router.route_outbound(&msg).unwrap_err();
        assert!(matches!(err, RouteError::NoIdentityForSender { .. }));
    }

    #[test]
    fn test_outbound_empty_sender_falls_back_to_first_loaded() {
        let router = router();
        let first = identity();
        let second = identity();
        load(&router, Arc::clone(&first), &["*"]);
        load(&router, Arc::clone(&second), &["*"]);

        let msg = message("", "skein:dev:dest");
        let routed = router.route_outbound(&msg).unwrap();
        assert_eq!(routed.identity.principal(), first.principal());
    }

    #[test]
    fn test_outbound_with_nothing_loaded() {
        let router = router();
        let msg = message("", "skein:dev:dest");
        let err = router.route_outbound(&msg).unwrap_err();
        assert!(matches!(err, RouteError::NoIdentitiesLoaded));
    }

    #[test]
    fn test_local_access_flag() {
        let router = router();
        let open = identity();
        load(&router, Arc::clone(&open), &["*"]);

        let closed = identity();
        router
            .registry()
            .write()
            .unwrap()
            .load(
                Arc::clone(&closed),
                IdentityConfig {
                    allow_local: false,
                    allowed_remote_peers: vec!["*".to_string()],
                    autoload: false,
                },
            )
            .unwrap();

        assert!(router.is_local_access_allowed(open.principal()));
        assert!(!router.is_local_access_allowed(closed.principal()));
        // Unknown principal: false, not an error.
        assert!(!router.is_local_access_allowed("skein:dev:unknown"));
    }

    #[test]
    fn test_find_identities_for_peer_in_load_order() {
        let router = router();
        let open = identity();
        let selective = identity();
        let closed = identity();
        load(&router, Arc::clone(&open), &["*"]);
        load(&router, Arc::clone(&selective), &["skein:dev:friend"]);
        load(&router, Arc::clone(&closed), &[]);

        let matches = router.find_identities_for_peer("skein:dev:friend");
        let principals: Vec<_> = matches
            .iter()
            .map(|entry| entry.identity.principal().clone())
            .collect();
        assert_eq!(principals, vec![
            open.principal().clone(),
            selective.principal().clone()
        ]);

        let matches = router.find_identities_for_peer("skein:dev:stranger");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_resolver_default_and_gate() {
        let router = router();
        assert!(router.resolve(None).is_none());

        let first = identity();
        let selective = identity();
        load(&router, Arc::clone(&first), &["skein:dev:friend"]);
        load(&router, Arc::clone(&selective), &["skein:dev:other"]);

        // Initial exchange: first loaded identity.
        let initial = router.resolve(None).unwrap();
        assert_eq!(initial.principal(), first.principal());

        // Gate: first identity whose ACL accepts the peer.
        let gated = router.resolve(Some("skein:dev:other")).unwrap();
        assert_eq!(gated.principal(), selective.principal());

        // Nobody accepts this peer: the session must abort.
        assert!(router.resolve(Some("skein:dev:stranger")).is_none());
    }
}
