use bip39::Mnemonic;
use skein_crypto::keys::NodeKeypair;
use skein_crypto::wallet::WalletKeypair;
use skein_types::error::SkeinError;
use skein_types::network::NetworkId;
use skein_types::primitives::{NodePublicKey, Principal};

/// A node's dual-key identity.
///
/// The wallet keypair is the durable account: re-derivable from its mnemonic,
/// it yields the same principal on every device. The node keypair is local to
/// this device and disposable; a fresh one is generated whenever an identity
/// is created or recovered.
pub struct Identity {
    principal: Principal,
    network: NetworkId,
    wallet: WalletKeypair,
    node: NodeKeypair,
    mnemonic: Mnemonic,
    nickname: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal)
            .field("network", &self.network)
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Create a new identity with a freshly generated mnemonic and node key.
    pub fn generate(network: NetworkId) -> Result<Self, SkeinError> {
        let (wallet, mnemonic) = WalletKeypair::generate()?;
        Ok(Self::assemble(network, wallet, mnemonic, NodeKeypair::generate(), None))
    }

    /// Recover an identity from an existing mnemonic.
    ///
    /// The principal is identical to the one originally generated from this
    /// mnemonic; the node key is new to this device.
    pub fn recover(mnemonic: Mnemonic, network: NetworkId) -> Result<Self, SkeinError> {
        let wallet = WalletKeypair::from_mnemonic(&mnemonic)?;
        Ok(Self::assemble(network, wallet, mnemonic, NodeKeypair::generate(), None))
    }

    /// Rebuild an identity from keystore parts, reusing the stored node seed.
    pub(crate) fn from_parts(
        network: NetworkId,
        mnemonic: Mnemonic,
        node_seed: &[u8; 32],
        nickname: Option<String>,
    ) -> Result<Self, SkeinError> {
        let wallet = WalletKeypair::from_mnemonic(&mnemonic)?;
        let node = NodeKeypair::from_seed(node_seed);
        Ok(Self::assemble(network, wallet, mnemonic, node, nickname))
    }

    fn assemble(
        network: NetworkId,
        wallet: WalletKeypair,
        mnemonic: Mnemonic,
        node: NodeKeypair,
        nickname: Option<String>,
    ) -> Self {
        let principal = wallet.principal(network);
        Self {
            principal,
            network,
            wallet,
            node,
            mnemonic,
            nickname,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn wallet(&self) -> &WalletKeypair {
        &self.wallet
    }

    pub fn node(&self) -> &NodeKeypair {
        &self.node
    }

    pub fn node_public_key(&self) -> NodePublicKey {
        self.node.public_key()
    }

    /// The recovery phrase. Handle with care; it is the whole account.
    pub fn mnemonic(&self) -> &Mnemonic {
        &self.mnemonic
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn set_nickname(&mut self, nickname: Option<String>) {
        self.nickname = nickname;
    }

    /// Display form: `principal(nick)` when a nickname is set.
    pub fn display_name(&self) -> String {
        match &self.nickname {
            Some(nick) => format!("{}({})", self.principal, nick),
            None => self.principal.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_principals() {
        let a = Identity::generate(NetworkId::Dev).unwrap();
        let b = Identity::generate(NetworkId::Dev).unwrap();
        assert_ne!(a.principal(), b.principal());
    }

    #[test]
    fn test_recover_same_principal_new_node_key() {
        let original = Identity::generate(NetworkId::Testnet).unwrap();
        let recovered =
            Identity::recover(original.mnemonic().clone(), NetworkId::Testnet).unwrap();
        assert_eq!(original.principal(), recovered.principal());
        // A recovery is a new device: the node key must differ.
        assert_ne!(original.node_public_key(), recovered.node_public_key());
    }

    #[test]
    fn test_network_changes_principal() {
        let identity = Identity::generate(NetworkId::Dev).unwrap();
        let mainnet = Identity::recover(identity.mnemonic().clone(), NetworkId::Mainnet).unwrap();
        assert_ne!(identity.principal(), mainnet.principal());
    }

    #[test]
    fn test_display_name_with_nick() {
        let mut identity = Identity::generate(NetworkId::Dev).unwrap();
        assert_eq!(identity.display_name(), *identity.principal());
        identity.set_nickname(Some("alice".to_string()));
        assert!(identity.display_name().ends_with("(alice)"));
    }
}
