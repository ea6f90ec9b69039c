use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use skein_identity::Identity;
use skein_types::primitives::Principal;

use crate::config::IdentityConfig;

/// Errors from loading and unloading identities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("identity {0} is already loaded")]
    AlreadyLoaded(Principal),

    #[error("nickname {0} is already in use")]
    NicknameInUse(String),

    #[error("identity {0} is not loaded")]
    NotLoaded(Principal),
}

/// A loaded identity together with its hosting policy.
#[derive(Clone)]
pub struct LoadedIdentity {
    pub identity: Arc<Identity>,
    pub config: IdentityConfig,
}

impl std::fmt::Debug for LoadedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedIdentity")
            .field("principal", &self.identity.principal())
            .field("config", &self.config)
            .finish()
    }
}

/// Holds every currently loaded identity, in load order.
///
/// Load order matters: outbound routing with no explicit sender falls back
/// to the first loaded identity, and resolver lookups scan in this order.
#[derive(Default)]
pub struct IdentityRegistry {
    entries: Vec<LoadedIdentity>,
    by_principal: HashMap<Principal, usize>,
    by_nickname: HashMap<String, usize>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an identity under the given configuration.
    pub fn load(
        &mut self,
        identity: Arc<Identity>,
        config: IdentityConfig,
    ) -> Result<(), RegistryError> {
        let principal = identity.principal().clone();
        if self.by_principal.contains_key(&principal) {
            return Err(RegistryError::AlreadyLoaded(principal));
        }
        if let Some(nick) = identity.nickname() {
            if self.by_nickname.contains_key(nick) {
                return Err(RegistryError::NicknameInUse(nick.to_string()));
            }
        }

        let index = self.entries.len();
        if let Some(nick) = identity.nickname() {
            self.by_nickname.insert(nick.to_string(), index);
        }
        self.by_principal.insert(principal.clone(), index);
        self.entries.push(LoadedIdentity { identity, config });

        info!(%principal, "identity loaded");
        Ok(())
    }

    /// Unload an identity by principal.
    pub fn unload(&mut self, principal: &str) -> Result<(), RegistryError> {
        let index = self
            .by_principal
            .remove(principal)
            .ok_or_else(|| RegistryError::NotLoaded(principal.to_string()))?;

        let removed = self.entries.remove(index);
        if let Some(nick) = removed.identity.nickname() {
            self.by_nickname.remove(nick);
        }
        // Later entries shifted down by one.
        for stored in self.by_principal.values_mut() {
            if *stored > index {
                *stored -= 1;
            }
        }
        for stored in self.by_nickname.values_mut() {
            if *stored > index {
                *stored -= 1;
            }
        }

        info!(%principal, "identity unloaded");
        Ok(())
    }

    /// Look up by principal or nickname; principals win ties.
    pub fn get(&self, principal_or_nick: &str) -> Option<&LoadedIdentity> {
        let index = self
            .by_principal
            .get(principal_or_nick)
            .or_else(|| self.by_nickname.get(principal_or_nick))?;
        self.entries.get(*index)
    }

    /// Whether an identity is loaded, by principal or nickname.
    pub fn is_loaded(&self, principal_or_nick: &str) -> bool {
        self.get(principal_or_nick).is_some()
    }

    /// All loaded identities, in load order.
    pub fn all(&self) -> &[LoadedIdentity] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_types::network::NetworkId;

    fn identity(nick: Option<&str>) -> Arc<Identity> {
        let mut identity = Identity::generate(NetworkId::Dev).unwrap();
        identity.set_nickname(nick.map(str::to_string));
        Arc::new(identity)
    }

    #[test]
    fn test_load_get_unload() {
        let mut registry = IdentityRegistry::new();
        let id = identity(Some("alice"));
        let principal = id.principal().clone();

        registry.load(id, IdentityConfig::default()).unwrap();
        assert!(registry.is_loaded(&principal));
        assert!(registry.is_loaded("alice"));

        registry.unload(&principal).unwrap();
        assert!(!registry.is_loaded(&principal));
        assert!(!registry.is_loaded("alice"));
    }

    #[test]
    fn test_duplicate_load_rejected() {
        let mut registry = IdentityRegistry::new();
        let id = identity(None);
        registry
            .load(Arc::clone(&id), IdentityConfig::default())
            .unwrap();
        let err = registry.load(id, IdentityConfig::default()).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyLoaded(_)));
    }

    #[test]
    fn test_duplicate_nickname_rejected() {
        let mut registry = IdentityRegistry::new();
        registry
            .load(identity(Some("alice")), IdentityConfig::default())
            .unwrap();
        let err = registry
            .load(identity(Some("alice")), IdentityConfig::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::NicknameInUse(_)));
    }

    #[test]
    fn test_unload_unknown_rejected() {
        let mut registry = IdentityRegistry::new();
        let err = registry.unload("skein:dev:ghost").unwrap_err();
        assert!(matches!(err, RegistryError::NotLoaded(_)));
    }

    #[test]
    fn test_load_order_preserved_across_unload() {
        let mut registry = IdentityRegistry::new();
        let first = identity(None);
        let second = identity(None);
        let third = identity(Some("carol"));

        registry
            .load(Arc::clone(&first), IdentityConfig::default())
            .unwrap();
        registry
            .load(Arc::clone(&second), IdentityConfig::default())
            .unwrap();
        registry
            .load(Arc::clone(&third), IdentityConfig::default())
            .unwrap();

        registry.unload(first.principal()).unwrap();

        let order: Vec<_> = registry
            .all()
            .iter()
            .map(|entry| entry.identity.principal().clone())
            .collect();
        assert_eq!(order, vec![
            second.principal().clone(),
            third.principal().clone()
        ]);
        // Index maps survived the shift.
        assert!(registry.get(second.principal()).is_some());
        assert!(registry.get("carol").is_some());
    }
}
