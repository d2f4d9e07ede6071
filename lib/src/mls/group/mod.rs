//! [RFC9420 Sec.11](https://www.rfc-editor.org/rfc/rfc9420.html#section-11) Group Creation and
//! [RFC9420 Sec.12](https://www.rfc-editor.org/rfc/rfc9420.html#section-12) Group Evolution
//!
//! A group is always created with a single member, the "creator". Other members are then added to
//! the group using the usual Add/Commit mechanism.
//!
//! A [`Group`] is one member's view of the group. It moves from epoch to epoch only by merging a
//! commit it staged itself, or by applying a commit received from another member. Every operation
//! that fails leaves the group exactly as it was.

use std::collections::{BTreeMap, HashSet};

use bytes::Bytes;

use transcript::ConfirmedTranscriptHash;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::credential::Credential;
use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::crypto::{HPKEPrivateKey, Secret};
use crate::mls::framing::public_message::PublicMessage;
use crate::mls::framing::MlsGroupId;
use crate::mls::group::config::GroupConfig;
use crate::mls::identity::Identity;
use crate::mls::key_package::KeyPackageRef;
use crate::mls::key_schedule::{EpochSecrets, GroupContext};
use crate::mls::ratchet_tree::RatchetTree;
use crate::mls::secret_tree::SecretTree;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::Serializer;
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex};

#[cfg(test)]
mod group_test;

pub mod config;
pub mod creation;
pub mod evolution;
pub mod messaging;
pub mod processing;
pub mod staged_join;
pub mod transcript;

/// Everything a member holds for one epoch.
#[derive(Debug)]
pub(crate) struct EpochState {
    pub(crate) group_context: GroupContext,
    pub(crate) ratchet_tree: RatchetTree,
    pub(crate) own_leaf_index: LeafIndex,
    /// Private keys of the nodes this member knows: its own leaf and part of its direct path.
    pub(crate) private_keys: BTreeMap<NodeIndex, HPKEPrivateKey>,
    pub(crate) epoch_secrets: EpochSecrets,
    pub(crate) secret_tree: SecretTree,
    pub(crate) transcript: ConfirmedTranscriptHash,
}

impl EpochState {
    /// Derives the epoch's secrets and secret tree from `epoch_secret`.
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        group_context: GroupContext,
        ratchet_tree: RatchetTree,
        own_leaf_index: LeafIndex,
        private_keys: BTreeMap<NodeIndex, HPKEPrivateKey>,
        epoch_secret: &[u8],
        transcript: ConfirmedTranscriptHash,
    ) -> Result<Self> {
        let cipher_suite = group_context.cipher_suite;
        let epoch_secrets = EpochSecrets::derive(crypto_provider, cipher_suite, epoch_secret)?;
        let secret_tree = SecretTree::new(
            cipher_suite,
            ratchet_tree.num_leaves(),
            epoch_secrets.encryption_secret.clone(),
        );

        Ok(Self {
            group_context,
            ratchet_tree,
            own_leaf_index,
            private_keys,
            epoch_secrets,
            secret_tree,
            transcript,
        })
    }

    /// ```text
    /// confirmation_tag = MAC(confirmation_key, confirmed_transcript_hash)
    /// ```
    pub(crate) fn confirmation_tag(&self, crypto_provider: &impl CryptoProvider) -> Result<Bytes> {
        crypto_provider.sign_mac(
            self.group_context.cipher_suite,
            &self.epoch_secrets.confirmation_key,
            &self.group_context.confirmed_transcript_hash,
        )
    }
}

/// A commit this member created and has not merged yet.
#[derive(Debug)]
pub(crate) struct StagedCommit {
    pub(crate) message: PublicMessage,
    pub(crate) state: EpochState,
}

#[derive(Debug)]
pub struct Group {
    config: GroupConfig,
    state: EpochState,
    /// Key packages already added to the group through this member's view.
    consumed_key_packages: HashSet<KeyPackageRef>,
    pending_commit: Option<Box<StagedCommit>>,
}

impl Group {
    /// Marks key packages as added, both for this group and for every group sharing the
    /// provider.
    pub(crate) fn record_consumed(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        key_package_refs: Vec<KeyPackageRef>,
    ) {
        let key_store = crypto_provider.key_store();
        for key_package_ref in key_package_refs {
            key_store.mark_consumed(&key_package_ref);
            self.consumed_key_packages.insert(key_package_ref);
        }
    }

    pub(crate) fn from_state(config: GroupConfig, state: EpochState) -> Self {
        Self {
            config,
            state,
            consumed_key_packages: HashSet::new(),
            pending_commit: None,
        }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn group_id(&self) -> &MlsGroupId {
        &self.state.group_context.group_id
    }

    pub fn epoch(&self) -> u64 {
        self.state.group_context.epoch
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.state.group_context.cipher_suite
    }

    pub fn group_context(&self) -> &GroupContext {
        &self.state.group_context
    }

    pub fn own_leaf_index(&self) -> LeafIndex {
        self.state.own_leaf_index
    }

    pub fn ratchet_tree(&self) -> &RatchetTree {
        &self.state.ratchet_tree
    }

    /// The roster: every occupied leaf with the credential it presents.
    pub fn members(&self) -> Vec<(LeafIndex, Credential)> {
        self.state
            .ratchet_tree
            .leaves()
            .map(|(index, leaf)| (index, leaf.credential().clone()))
            .collect()
    }

    /// Root tree hash of the current epoch.
    pub fn tree_hash(&self) -> &Bytes {
        &self.state.group_context.tree_hash
    }

    /// The commit staged by [`Group::add_members`], if it has not been merged or discarded.
    pub fn pending_commit(&self) -> Option<&PublicMessage> {
        self.pending_commit.as_ref().map(|staged| &staged.message)
    }

    pub fn clear_pending_commit(&mut self) {
        if self.pending_commit.take().is_some() {
            log::debug!(
                "discarded pending commit in group {}",
                hex::encode(self.group_id())
            );
        }
    }

    /// [RFC9420 Sec.8.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.5) Exports a secret
    /// of the current epoch for use outside the group.
    pub fn export_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        label: &[u8],
        context: &[u8],
        length: u16,
    ) -> Result<Secret> {
        self.state.epoch_secrets.export_secret(
            crypto_provider,
            self.cipher_suite(),
            label,
            context,
            length,
        )
    }

    /// [RFC9420 Sec.8.7](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.7) Epoch
    /// Authenticator
    pub fn epoch_authenticator(&self) -> &Secret {
        &self.state.epoch_secrets.epoch_authenticator
    }

    /// The public ratchet tree of the current epoch, for joiners that receive it out of band.
    pub fn export_ratchet_tree(&self) -> Result<Bytes> {
        self.state.ratchet_tree.serialize_detached()
    }

    /// Fails unless `signer` owns this member's leaf.
    fn ensure_own_signer(&self, signer: &Identity) -> Result<()> {
        if signer.cipher_suite() != self.cipher_suite() {
            return Err(Error::CipherSuiteMismatch(signer.cipher_suite()));
        }

        let own_leaf = self
            .state
            .ratchet_tree
            .get_leaf(self.state.own_leaf_index)
            .ok_or(Error::OwnLeafNotFound)?;
        if own_leaf.signature_key() != signer.signature_public_key() {
            return Err(Error::SignerMismatch);
        }

        Ok(())
    }
}
