use std::time::SystemTime;

use bytes::Bytes;

use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::extensibility::list::MlsExtension;
use crate::mls::extensibility::{Extensions, RatchetTreeExtension};
use crate::mls::framing::commit::Commit;
use crate::mls::framing::group_info::{GroupInfo, GroupSecrets};
use crate::mls::framing::proposal::{AddProposal, Proposal};
use crate::mls::framing::public_message::PublicMessage;
use crate::mls::framing::welcome::Welcome;
use crate::mls::framing::{AuthenticatedContent, Content, FramedContent, Sender, WireFormat};
use crate::mls::group::transcript::ConfirmedTranscriptHash;
use crate::mls::group::{EpochState, Group, StagedCommit};
use crate::mls::identity::Identity;
use crate::mls::key_package::{KeyPackage, KeyPackageRef};
use crate::mls::key_schedule::{ConfirmedTranscriptHashInput, GroupContext};
use crate::mls::ratchet_tree::PathUpdate;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::Serializer;
use crate::mls::utilities::tree_math::LeafIndex;

impl Group {
    /// [RFC9420 Sec.12.4.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1) Creates a
    /// commit adding the owners of `key_packages`, and one welcome per new member.
    ///
    /// The group itself stays in its current epoch: the commit is staged until
    /// [`Group::merge_pending_commit`] (or [`Group::apply_commit`] on the returned message) moves
    /// to the next one. The key packages count as used from here on, even if the staged commit
    /// is later discarded.
    pub fn add_members(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        signer: &Identity,
        key_packages: &[KeyPackage],
    ) -> Result<(PublicMessage, Vec<Welcome>)> {
        self.ensure_own_signer(signer)?;
        if key_packages.is_empty() {
            return Err(Error::NoKeyPackages);
        }

        let cipher_suite = self.cipher_suite();
        let now = SystemTime::now();
        let mut key_package_refs = Vec::with_capacity(key_packages.len());
        for key_package in key_packages {
            let key_package_ref =
                self.validate_key_package(crypto_provider, key_package, now, &key_package_refs)?;
            if crypto_provider.key_store().is_consumed(&key_package_ref) {
                log::warn!("rejected key package {key_package_ref} already added elsewhere");
                return Err(Error::KeyPackageAlreadyUsed(key_package_ref.to_string()));
            }
            key_package_refs.push(key_package_ref);
        }

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.3
        let old_state = &self.state;
        let own_leaf_index = old_state.own_leaf_index;
        let mut ratchet_tree = old_state.ratchet_tree.clone();
        let new_leaves: Vec<LeafIndex> = key_packages
            .iter()
            .map(|key_package| ratchet_tree.add_leaf(key_package.leaf_node().clone()))
            .collect();

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.5.2.1
        let mut path_update = ratchet_tree.update_direct_path(
            crypto_provider,
            signer,
            &old_state.group_context.group_id,
            own_leaf_index,
        )?;
        let tree_hash = ratchet_tree.compute_root_tree_hash(crypto_provider, cipher_suite)?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.5.2.3.1
        let mut group_context = GroupContext {
            epoch: old_state.group_context.epoch + 1,
            tree_hash: tree_hash.clone(),
            ..old_state.group_context.clone()
        };
        let update_path = path_update.encrypt(
            crypto_provider,
            cipher_suite,
            &ratchet_tree,
            own_leaf_index,
            &group_context.serialize_detached()?,
            &new_leaves,
        )?;

        let commit = Commit {
            proposals: key_packages
                .iter()
                .map(|key_package| {
                    Proposal::Add(AddProposal {
                        key_package: key_package.clone(),
                    })
                })
                .collect(),
            path: Some(update_path),
            tree_hash,
        };

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.6
        let content = FramedContent {
            group_id: old_state.group_context.group_id.clone(),
            epoch: old_state.group_context.epoch,
            sender: Sender::Member(own_leaf_index),
            authenticated_data: Bytes::new(),
            content: Content::Commit(commit),
        };
        let mut authenticated_content = AuthenticatedContent::new(
            crypto_provider,
            signer,
            WireFormat::PublicMessage,
            content,
            &old_state.group_context,
        )?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.7
        let confirmed_hash = old_state.transcript.hash_new_confirmed_transcript_hash(
            crypto_provider,
            cipher_suite,
            &ConfirmedTranscriptHashInput {
                wire_format: WireFormat::PublicMessage,
                content: authenticated_content.content.clone(),
                signature: authenticated_content.auth.signature.clone(),
            },
        )?;
        group_context.confirmed_transcript_hash = confirmed_hash.clone();

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.8
        let joiner_secret = group_context.extract_joiner_secret(
            crypto_provider,
            &old_state.epoch_secrets.init_secret,
            &path_update.commit_secret,
        )?;
        let epoch_secret = group_context.extract_epoch_secret(crypto_provider, &joiner_secret)?;

        let private_keys = std::mem::take(&mut path_update.private_keys)
            .into_iter()
            .collect();
        let mut new_state = EpochState::new(
            crypto_provider,
            group_context,
            ratchet_tree,
            own_leaf_index,
            private_keys,
            &epoch_secret,
            ConfirmedTranscriptHash::default(),
        )?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.10
        let confirmation_tag = new_state.confirmation_tag(crypto_provider)?;
        new_state.transcript = ConfirmedTranscriptHash::with_confirmation_tag(
            crypto_provider,
            cipher_suite,
            confirmed_hash,
            &confirmation_tag,
        )?;
        authenticated_content.auth.confirmation_tag = Some(confirmation_tag.clone());

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1-3.11
        let membership_tag = authenticated_content.membership_tag(
            crypto_provider,
            cipher_suite,
            &old_state.epoch_secrets.membership_key,
            &old_state.group_context,
        )?;
        let message = PublicMessage::new(authenticated_content, membership_tag);

        let welcomes = self.create_welcomes(
            crypto_provider,
            signer,
            &new_state,
            &path_update,
            &joiner_secret,
            confirmation_tag,
            key_packages.iter().zip(key_package_refs.iter().cloned()).zip(new_leaves),
        )?;

        self.record_consumed(crypto_provider, key_package_refs);
        self.pending_commit = Some(Box::new(StagedCommit {
            message: message.clone(),
            state: new_state,
        }));

        log::debug!(
            "staged commit adding {} member(s) to group {} for epoch {}",
            key_packages.len(),
            hex::encode(self.group_id()),
            self.epoch() + 1
        );

        Ok((message, welcomes))
    }

    /// [RFC9420 Sec.12.4.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3) One
    /// welcome per new member, all sharing the same encrypted group info.
    #[allow(clippy::too_many_arguments)]
    fn create_welcomes<'a>(
        &self,
        crypto_provider: &impl CryptoProvider,
        signer: &Identity,
        new_state: &EpochState,
        path_update: &PathUpdate,
        joiner_secret: &[u8],
        confirmation_tag: Bytes,
        new_members: impl Iterator<Item = ((&'a KeyPackage, KeyPackageRef), LeafIndex)>,
    ) -> Result<Vec<Welcome>> {
        let cipher_suite = new_state.group_context.cipher_suite;

        let mut extensions = vec![];
        if self.config.use_ratchet_tree_extension {
            extensions.push(MlsExtension::RatchetTree(RatchetTreeExtension::new(
                new_state.ratchet_tree.clone(),
            )));
        }
        let extensions: Extensions = extensions.try_into()?;

        let group_info = GroupInfo::new(
            crypto_provider,
            signer,
            new_state.group_context.clone(),
            extensions,
            confirmation_tag,
            new_state.own_leaf_index,
        )?;
        let encrypted_group_info =
            Welcome::encrypt_group_info(crypto_provider, cipher_suite, joiner_secret, &group_info)?;

        new_members
            .map(|((key_package, key_package_ref), leaf_index)| {
                let group_secrets = GroupSecrets {
                    joiner_secret: joiner_secret.into(),
                    path_secret: path_update.path_secret_for(leaf_index).cloned(),
                };
                let secrets = Welcome::encrypt_group_secrets(
                    crypto_provider,
                    cipher_suite,
                    key_package_ref,
                    key_package.init_key(),
                    &encrypted_group_info,
                    &group_secrets,
                )?;

                Ok(Welcome {
                    cipher_suite,
                    secrets: vec![secrets],
                    encrypted_group_info: encrypted_group_info.clone(),
                })
            })
            .collect()
    }

    /// [RFC9420 Sec.12.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.2) Checks a key
    /// package named by an Add proposal, and returns its reference.
    ///
    /// `batch` holds the references of the key packages added by the same commit.
    pub(crate) fn validate_key_package(
        &self,
        crypto_provider: &impl CryptoProvider,
        key_package: &KeyPackage,
        now: SystemTime,
        batch: &[KeyPackageRef],
    ) -> Result<KeyPackageRef> {
        if key_package.cipher_suite() != self.cipher_suite() {
            return Err(Error::MalformedKeyPackage(
                "cipher suite differs from the group's",
            ));
        }
        key_package.verify(crypto_provider)?;
        key_package.verify_lifetime(now)?;

        let key_package_ref = key_package.generate_ref(crypto_provider)?;
        let encryption_key = key_package.leaf_node().encryption_key();
        if self.consumed_key_packages.contains(&key_package_ref)
            || batch.contains(&key_package_ref)
            || self
                .state
                .ratchet_tree
                .leaves()
                .any(|(_, leaf)| leaf.encryption_key() == encryption_key)
        {
            log::warn!("rejected reused key package {key_package_ref}");
            return Err(Error::KeyPackageAlreadyUsed(key_package_ref.to_string()));
        }

        Ok(key_package_ref)
    }
}
