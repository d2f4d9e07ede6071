use std::collections::BTreeMap;

use bytes::Bytes;

use crate::mls::crypto::rng::random_array;
use crate::mls::crypto::provider::{ensure_supported, CryptoProvider};
use crate::mls::crypto::Secret;
use crate::mls::extensibility::Extensions;
use crate::mls::framing::MlsGroupId;
use crate::mls::group::config::GroupConfig;
use crate::mls::group::transcript::ConfirmedTranscriptHash;
use crate::mls::group::{EpochState, Group};
use crate::mls::identity::Identity;
use crate::mls::key_package::{Lifetime, DEFAULT_KEY_PACKAGE_LIFETIME};
use crate::mls::key_schedule::GroupContext;
use crate::mls::ratchet_tree::leaf_node::{Capabilities, LeafNode, LeafNodeSource, TreeInfoTBS};
use crate::mls::ratchet_tree::RatchetTree;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::tree_math::LeafIndex;

const GROUP_ID_LENGTH: usize = 16;

impl Group {
    /// [RFC9420 Sec.11](https://www.rfc-editor.org/rfc/rfc9420.html#section-11) Creates a group
    /// at epoch 0 with `identity` as its only member, under a random group id.
    pub fn new(
        crypto_provider: &impl CryptoProvider,
        identity: &Identity,
        group_config: GroupConfig,
    ) -> Result<Self> {
        let group_id = Bytes::from(random_array::<GROUP_ID_LENGTH>().to_vec());
        Self::with_group_id(crypto_provider, identity, group_config, group_id)
    }

    pub fn with_group_id(
        crypto_provider: &impl CryptoProvider,
        identity: &Identity,
        group_config: GroupConfig,
        group_id: MlsGroupId,
    ) -> Result<Self> {
        let cipher_suite = identity.cipher_suite();
        ensure_supported(crypto_provider, cipher_suite)?;
        if group_config.crypto_config.cipher_suite != cipher_suite {
            return Err(Error::CipherSuiteMismatch(
                group_config.crypto_config.cipher_suite,
            ));
        }

        // A tree with a single node, a leaf node containing an HPKE public key and credential for
        // the creator
        let (leaf_node, encryption_key_pair) = LeafNode::new(
            crypto_provider,
            identity,
            LeafNodeSource::KeyPackage(Lifetime::new(DEFAULT_KEY_PACKAGE_LIFETIME)),
            Capabilities::for_provider(crypto_provider),
            Extensions::default(),
            &TreeInfoTBS::KeyPackage,
        )?;
        let ratchet_tree = RatchetTree::new(leaf_node);
        let own_leaf_index = LeafIndex(0);

        let group_context = GroupContext {
            version: group_config.crypto_config.version,
            cipher_suite,
            group_id,
            epoch: 0,
            tree_hash: ratchet_tree.compute_root_tree_hash(crypto_provider, cipher_suite)?,
            confirmed_transcript_hash: Bytes::new(),
            extensions: Extensions::default(),
        };

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-11-2.4
        let secret_size = crypto_provider.hpke(cipher_suite)?.kdf_extract_size() as usize;
        let epoch_secret = Secret::random(secret_size);

        let private_keys =
            BTreeMap::from([(own_leaf_index.node_index(), encryption_key_pair.private_key)]);

        let state = EpochState::new(
            crypto_provider,
            group_context,
            ratchet_tree,
            own_leaf_index,
            private_keys,
            &epoch_secret,
            ConfirmedTranscriptHash::default(),
        )?;

        let group = Self::from_state(group_config, state);
        log::debug!(
            "created group {} with {} as its founder",
            hex::encode(group.group_id()),
            identity.credential()
        );

        Ok(group)
    }
}
