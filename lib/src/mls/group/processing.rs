use std::collections::BTreeMap;
use std::time::SystemTime;

use subtle::ConstantTimeEq;

use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::framing::commit::Commit;
use crate::mls::framing::proposal::Proposal;
use crate::mls::framing::public_message::PublicMessage;
use crate::mls::framing::WireFormat;
use crate::mls::group::transcript::ConfirmedTranscriptHash;
use crate::mls::group::{EpochState, Group};
use crate::mls::key_package::KeyPackageRef;
use crate::mls::key_schedule::{ConfirmedTranscriptHashInput, GroupContext};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::Serializer;
use crate::mls::utilities::tree_math::LeafIndex;

impl Group {
    /// [RFC9420 Sec.12.4.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2) Validates
    /// a commit for the current epoch and moves the group to the next one.
    ///
    /// A commit authored by this member is accepted only if it is the pending commit, and then
    /// has the same effect as [`Group::merge_pending_commit`]. On any failure the group is left
    /// untouched.
    pub fn apply_commit(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        message: &PublicMessage,
    ) -> Result<()> {
        if message.group_id() != self.group_id() {
            return Err(Error::GroupIdMismatch);
        }
        if message.epoch() != self.epoch() {
            log::warn!(
                "rejected commit for epoch {} in group {} at epoch {}",
                message.epoch(),
                hex::encode(self.group_id()),
                self.epoch()
            );
            return Err(Error::StaleEpoch {
                expected: self.epoch(),
                got: message.epoch(),
            });
        }
        let commit = message.commit().ok_or(Error::UnexpectedContentType)?;

        let sender = message.sender().leaf_index();
        if sender == self.state.own_leaf_index {
            return match &self.pending_commit {
                Some(staged) if staged.message == *message => self.merge_pending_commit(),
                _ => Err(Error::NoPendingCommit),
            };
        }

        match self.stage_commit(crypto_provider, message, commit, sender) {
            Ok((state, key_package_refs)) => {
                self.state = state;
                self.pending_commit = None;
                self.record_consumed(crypto_provider, key_package_refs);
                log::debug!(
                    "applied commit from leaf {sender} in group {}, now at epoch {}",
                    hex::encode(self.group_id()),
                    self.epoch()
                );
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "rejected commit from leaf {sender} in group {}: {err}",
                    hex::encode(self.group_id())
                );
                Err(err)
            }
        }
    }

    /// Replaces the live epoch with the one staged by [`Group::add_members`].
    pub fn merge_pending_commit(&mut self) -> Result<()> {
        let staged = self.pending_commit.take().ok_or(Error::NoPendingCommit)?;
        self.state = staged.state;

        log::debug!(
            "merged pending commit in group {}, now at epoch {}",
            hex::encode(self.group_id()),
            self.epoch()
        );

        Ok(())
    }

    /// Computes the epoch `commit` leads to without touching the group.
    fn stage_commit(
        &self,
        crypto_provider: &impl CryptoProvider,
        message: &PublicMessage,
        commit: &Commit,
        sender: LeafIndex,
    ) -> Result<(EpochState, Vec<KeyPackageRef>)> {
        let old_state = &self.state;
        let cipher_suite = self.cipher_suite();

        let sender_leaf = old_state
            .ratchet_tree
            .get_leaf(sender)
            .ok_or(Error::UnknownSender(sender.0))?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-6.2-5
        let authenticated_content = message.authenticated_content();
        authenticated_content.verify_membership_tag(
            crypto_provider,
            cipher_suite,
            &old_state.epoch_secrets.membership_key,
            &old_state.group_context,
            &message.membership_tag,
        )?;
        authenticated_content.verify_signature(
            crypto_provider,
            cipher_suite,
            sender_leaf.signature_key(),
            &old_state.group_context,
        )?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2-2.3
        if commit.proposals().is_empty() {
            return Err(Error::NoKeyPackages);
        }
        let now = SystemTime::now();
        let mut ratchet_tree = old_state.ratchet_tree.clone();
        let mut key_package_refs = Vec::with_capacity(commit.proposals().len());
        let mut new_leaves = Vec::with_capacity(commit.proposals().len());
        for proposal in commit.proposals() {
            let Proposal::Add(add) = proposal;
            let key_package_ref = self.validate_key_package(
                crypto_provider,
                &add.key_package,
                now,
                &key_package_refs,
            )?;
            key_package_refs.push(key_package_ref);
            new_leaves.push(ratchet_tree.add_leaf(add.key_package.leaf_node().clone()));
        }

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2-2.6
        let update_path = commit.path().ok_or(Error::MissingUpdatePath)?;
        let filtered_direct_path = ratchet_tree.merge_update_path(
            crypto_provider,
            cipher_suite,
            &old_state.group_context.group_id,
            sender,
            update_path,
        )?;

        let tree_hash = ratchet_tree.compute_root_tree_hash(crypto_provider, cipher_suite)?;
        if !bool::from(tree_hash[..].ct_eq(&commit.tree_hash()[..])) {
            return Err(Error::TreeHashMismatch);
        }

        let mut group_context = GroupContext {
            epoch: old_state.group_context.epoch + 1,
            tree_hash,
            ..old_state.group_context.clone()
        };

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2-2.6.3
        let (position, path_secret) = ratchet_tree.decrypt_path_secret(
            crypto_provider,
            cipher_suite,
            old_state.own_leaf_index,
            sender,
            &filtered_direct_path,
            update_path,
            &old_state.private_keys,
            &group_context.serialize_detached()?,
            &new_leaves,
        )?;
        let (path_keys, commit_secret) = ratchet_tree.derive_path_keys(
            crypto_provider,
            cipher_suite,
            &filtered_direct_path[position..],
            path_secret,
        )?;

        let sender_direct_path = ratchet_tree.num_leaves().direct_path(sender.node_index());
        let mut private_keys: BTreeMap<_, _> = old_state
            .private_keys
            .iter()
            .filter(|(node, _)| !sender_direct_path.contains(node))
            .map(|(node, key)| (*node, key.clone()))
            .collect();
        private_keys.extend(path_keys);

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2-2.7
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

        let joiner_secret = group_context.extract_joiner_secret(
            crypto_provider,
            &old_state.epoch_secrets.init_secret,
            &commit_secret,
        )?;
        let epoch_secret = group_context.extract_epoch_secret(crypto_provider, &joiner_secret)?;
        let mut new_state = EpochState::new(
            crypto_provider,
            group_context,
            ratchet_tree,
            old_state.own_leaf_index,
            private_keys,
            &epoch_secret,
            ConfirmedTranscriptHash::default(),
        )?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2-2.9
        let confirmation_tag = authenticated_content
            .auth
            .confirmation_tag
            .as_ref()
            .ok_or(Error::ConfirmationTagMismatch)?;
        if !crypto_provider.verify_mac(
            cipher_suite,
            &new_state.epoch_secrets.confirmation_key,
            &confirmed_hash,
            confirmation_tag,
        )? {
            return Err(Error::ConfirmationTagMismatch);
        }
        new_state.transcript = ConfirmedTranscriptHash::with_confirmation_tag(
            crypto_provider,
            cipher_suite,
            confirmed_hash,
            confirmation_tag,
        )?;

        Ok((new_state, key_package_refs))
    }
}
