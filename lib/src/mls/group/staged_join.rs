use std::collections::BTreeMap;

use subtle::ConstantTimeEq;

use crate::mls::crypto::config::CryptoConfig;
use crate::mls::crypto::provider::{ensure_supported, CryptoProvider};
use crate::mls::framing::welcome::Welcome;
use crate::mls::group::config::GroupConfig;
use crate::mls::group::transcript::ConfirmedTranscriptHash;
use crate::mls::group::{EpochState, Group};
use crate::mls::key_package::KeyPackageRef;
use crate::mls::ratchet_tree::{path_position, RatchetTree};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::tree_math::LeafIndex;

/// [RFC9420 Sec.12.4.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1) A welcome
/// that has been fully validated but not yet turned into a group.
///
/// Staging lets the caller inspect the group it is about to join before the key package behind
/// the welcome is consumed.
#[derive(Debug)]
pub struct StagedJoin {
    config: GroupConfig,
    key_package_ref: KeyPackageRef,
    state: EpochState,
}

impl StagedJoin {
    /// Decrypts `welcome` with a key package from the provider's key store and rebuilds the
    /// group's first epoch for this member.
    ///
    /// `ratchet_tree` is the tree received out of band. Without it, the welcome must carry the
    /// tree in its group info.
    pub fn new(
        crypto_provider: &impl CryptoProvider,
        config: GroupConfig,
        welcome: &Welcome,
        ratchet_tree: Option<RatchetTree>,
    ) -> Result<Self> {
        let cipher_suite = welcome.cipher_suite();
        ensure_supported(crypto_provider, cipher_suite)?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.1
        let key_store = crypto_provider.key_store();
        let (key_package_ref, init_private_key) = welcome
            .secrets()
            .iter()
            .find_map(|secrets| {
                let key_package_ref = secrets.new_member();
                key_store
                    .retrieve(key_package_ref)
                    .map(|init_key| (key_package_ref.clone(), init_key))
            })
            .ok_or(Error::NoMatchingKeyPackage)?;

        let group_secrets =
            welcome.decrypt_group_secrets(crypto_provider, &key_package_ref, &init_private_key)?;
        let group_info = welcome.decrypt_group_info(crypto_provider, &group_secrets.joiner_secret)?;
        let group_context = group_info.group_context.clone();
        if group_context.cipher_suite != cipher_suite {
            return Err(Error::CipherSuiteMismatch(group_context.cipher_suite));
        }

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.4
        let ratchet_tree = match ratchet_tree {
            Some(ratchet_tree) => ratchet_tree,
            None => group_info.ratchet_tree()?.ok_or(Error::NoRatchetTree)?,
        };

        let signer = ratchet_tree
            .get_leaf(group_info.signer)
            .ok_or(Error::UnknownSender(group_info.signer.0))?;
        group_info.verify_signature(crypto_provider, signer.signature_key())?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.6
        let tree_hash = ratchet_tree.compute_root_tree_hash(crypto_provider, cipher_suite)?;
        if !bool::from(tree_hash[..].ct_eq(&group_context.tree_hash[..])) {
            return Err(Error::TreeHashMismatch);
        }
        ratchet_tree.verify_integrity(crypto_provider, cipher_suite, &group_context.group_id)?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.7
        let own_encryption_key = key_store
            .leaf_key(&key_package_ref)
            .ok_or(Error::OwnLeafNotFound)?;
        let own_leaf_index = ratchet_tree
            .leaves()
            .find(|(_, leaf)| leaf.encryption_key()[..] == own_encryption_key[..])
            .map(|(leaf_index, _)| leaf_index)
            .ok_or(Error::OwnLeafNotFound)?;
        let leaf_private_key = key_store
            .retrieve(&own_encryption_key)
            .ok_or(Error::OwnLeafNotFound)?;

        let mut private_keys = BTreeMap::from([(own_leaf_index.node_index(), leaf_private_key)]);

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.8
        if let Some(path_secret) = group_secrets.path_secret.clone() {
            let filtered_direct_path =
                ratchet_tree.filtered_direct_path(group_info.signer.node_index());
            let position = path_position(&filtered_direct_path, own_leaf_index).ok_or(
                Error::TreeIntegrity("path secret for a leaf outside the signer's path"),
            )?;
            let (path_keys, _) = ratchet_tree.derive_path_keys(
                crypto_provider,
                cipher_suite,
                &filtered_direct_path[position..],
                path_secret,
            )?;
            private_keys.extend(path_keys);
        }

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.9
        let epoch_secret =
            group_context.extract_epoch_secret(crypto_provider, &group_secrets.joiner_secret)?;
        let confirmed_hash = group_context.confirmed_transcript_hash.clone();
        let mut state = EpochState::new(
            crypto_provider,
            group_context,
            ratchet_tree,
            own_leaf_index,
            private_keys,
            &epoch_secret,
            ConfirmedTranscriptHash::default(),
        )?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.10
        if !crypto_provider.verify_mac(
            cipher_suite,
            &state.epoch_secrets.confirmation_key,
            &confirmed_hash,
            &group_info.confirmation_tag,
        )? {
            return Err(Error::ConfirmationTagMismatch);
        }
        state.transcript = ConfirmedTranscriptHash::with_confirmation_tag(
            crypto_provider,
            cipher_suite,
            confirmed_hash,
            &group_info.confirmation_tag,
        )?;

        let mut config = config;
        config.crypto_config = CryptoConfig {
            version: state.group_context.version,
            cipher_suite,
        };

        Ok(Self {
            config,
            key_package_ref,
            state,
        })
    }

    pub fn group_id(&self) -> &[u8] {
        &self.state.group_context.group_id
    }

    pub fn epoch(&self) -> u64 {
        self.state.group_context.epoch
    }

    pub fn own_leaf_index(&self) -> LeafIndex {
        self.state.own_leaf_index
    }

    pub fn ratchet_tree(&self) -> &RatchetTree {
        &self.state.ratchet_tree
    }

    /// Consumes the key package behind the welcome and returns the joined group.
    pub fn complete_join(self, crypto_provider: &impl CryptoProvider) -> Group {
        let key_store = crypto_provider.key_store();
        key_store.delete(&self.key_package_ref);
        key_store.delete_leaf_key(&self.key_package_ref);
        if let Some(own_leaf) = self.state.ratchet_tree.get_leaf(self.state.own_leaf_index) {
            key_store.delete(own_leaf.encryption_key());
        }

        let group = Group::from_state(self.config, self.state);
        log::debug!(
            "joined group {} at epoch {} as leaf {}",
            hex::encode(group.group_id()),
            group.epoch(),
            group.own_leaf_index()
        );

        group
    }
}
