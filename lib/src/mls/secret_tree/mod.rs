//! [RFC9420 Sec.9](https://www.rfc-editor.org/rfc/rfc9420.html#section-9) Secret Tree
//!
//! Each epoch's `encryption_secret` seeds a tree with the same shape as the ratchet tree. Every
//! leaf secret starts a per-sender application ratchet; node secrets are erased as soon as their
//! children are derived.


use std::collections::BTreeMap;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::crypto::Secret;
use crate::mls::group::config::SenderRatchetConfiguration;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex, NumLeaves};

const LABEL_TREE: &[u8] = b"tree";
const LABEL_LEFT: &[u8] = b"left";
const LABEL_RIGHT: &[u8] = b"right";
const LABEL_APPLICATION: &[u8] = b"application";
const LABEL_KEY: &[u8] = b"key";
const LABEL_NONCE: &[u8] = b"nonce";
const LABEL_SECRET: &[u8] = b"secret";

/// The AEAD key and nonce for one generation of a sender's ratchet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MessageKeys {
    pub(crate) generation: u32,
    pub(crate) key: Secret,
    pub(crate) nonce: Secret,
}

impl MessageKeys {
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// [RFC9420 Sec.9.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-9.1) Encryption Keys
///
/// ```text
/// ratchet_key_[i]_[j] = ExpandWithLabel(ratchet_secret_[i]_[j], "key", generation, AEAD.Nk)
/// ratchet_nonce_[i]_[j] = ExpandWithLabel(ratchet_secret_[i]_[j], "nonce", generation, AEAD.Nn)
/// ratchet_secret_[i]_[j+1] = ExpandWithLabel(ratchet_secret_[i]_[j], "secret", generation, KDF.Nh)
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct SenderRatchet {
    cipher_suite: CipherSuite,
    secret: Secret,
    /// Generation `secret` belongs to: the next one to be handed out.
    generation: u32,
    /// Keys for skipped generations, kept for out-of-order delivery.
    past_keys: BTreeMap<u32, MessageKeys>,
}

impl SenderRatchet {
    fn new(cipher_suite: CipherSuite, secret: Secret) -> Self {
        Self {
            cipher_suite,
            secret,
            generation: 0,
            past_keys: BTreeMap::new(),
        }
    }

    /// Derives the keys of the current generation and ratchets forward, erasing the old secret.
    fn advance(&mut self, crypto_provider: &impl CryptoProvider) -> Result<MessageKeys> {
        let generation = self.generation;
        let next_generation = generation.checked_add(1).ok_or(Error::GenerationExhausted)?;

        let hpke = crypto_provider.hpke(self.cipher_suite)?;
        let context = generation.to_be_bytes();
        let key = crypto_provider.expand_with_label(
            self.cipher_suite,
            &self.secret,
            LABEL_KEY,
            &context,
            hpke.aead_key_size(),
        )?;
        let nonce = crypto_provider.expand_with_label(
            self.cipher_suite,
            &self.secret,
            LABEL_NONCE,
            &context,
            hpke.aead_nonce_size(),
        )?;
        self.secret = crypto_provider.expand_with_label(
            self.cipher_suite,
            &self.secret,
            LABEL_SECRET,
            &context,
            hpke.kdf_extract_size(),
        )?;
        self.generation = next_generation;

        Ok(MessageKeys {
            generation,
            key,
            nonce,
        })
    }

    /// Keys for the next message this member sends.
    pub(crate) fn next(&mut self, crypto_provider: &impl CryptoProvider) -> Result<MessageKeys> {
        self.advance(crypto_provider)
    }

    /// Keys for a received message of `generation`. Every generation is handed out at most once.
    pub(crate) fn get(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        sender: LeafIndex,
        generation: u32,
        config: &SenderRatchetConfiguration,
    ) -> Result<MessageKeys> {
        if generation < self.generation {
            return self
                .past_keys
                .remove(&generation)
                .ok_or(Error::ReplayDetected {
                    leaf: sender.0,
                    generation,
                });
        }

        if generation - self.generation > config.maximum_forward_distance {
            return Err(Error::GenerationTooFarAhead {
                generation,
                current: self.generation,
            });
        }

        while self.generation < generation {
            let skipped = self.advance(crypto_provider)?;
            self.past_keys.insert(skipped.generation, skipped);
            while self.past_keys.len() > config.out_of_order_tolerance as usize {
                self.past_keys.pop_first();
            }
        }

        self.advance(crypto_provider)
    }
}

/// [RFC9420 Sec.9](https://www.rfc-editor.org/rfc/rfc9420.html#section-9) The secret tree of one
/// epoch.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub(crate) struct SecretTree {
    cipher_suite: CipherSuite,
    num_leaves: NumLeaves,
    /// Node secrets not yet consumed, indexed like the ratchet tree.
    tree_secrets: Vec<Option<Secret>>,
    ratchets: BTreeMap<LeafIndex, SenderRatchet>,
}

impl SecretTree {
    pub(crate) fn new(
        cipher_suite: CipherSuite,
        num_leaves: NumLeaves,
        encryption_secret: Secret,
    ) -> Self {
        let mut tree_secrets = vec![None; num_leaves.width() as usize];
        if let Some(root) = tree_secrets.get_mut(num_leaves.root().0 as usize) {
            *root = Some(encryption_secret);
        }

        Self {
            cipher_suite,
            num_leaves,
            tree_secrets,
            ratchets: BTreeMap::new(),
        }
    }

    /// The application ratchet of `leaf_index`, started from its leaf secret on first use.
    pub(crate) fn ratchet_mut(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        leaf_index: LeafIndex,
    ) -> Result<&mut SenderRatchet> {
        if leaf_index.0 >= self.num_leaves.0 {
            return Err(Error::UnknownSender(leaf_index.0));
        }

        if !self.ratchets.contains_key(&leaf_index) {
            let leaf_secret = self.take_leaf_secret(crypto_provider, leaf_index)?;
            let application_secret = crypto_provider.expand_with_label(
                self.cipher_suite,
                &leaf_secret,
                LABEL_APPLICATION,
                &[],
                crypto_provider.hpke(self.cipher_suite)?.kdf_extract_size(),
            )?;
            self.ratchets.insert(
                leaf_index,
                SenderRatchet::new(self.cipher_suite, application_secret),
            );
        }

        self.ratchets
            .get_mut(&leaf_index)
            .ok_or(Error::UnknownSender(leaf_index.0))
    }

    /// Replaces the ratchet of `leaf_index` with one advanced on a copy.
    pub(crate) fn store_ratchet(&mut self, leaf_index: LeafIndex, ratchet: SenderRatchet) {
        self.ratchets.insert(leaf_index, ratchet);
    }

    /// Derives the secret of `leaf_index` from its lowest ancestor still holding one, keeping the
    /// off-path children and erasing everything on the path.
    fn take_leaf_secret(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        leaf_index: LeafIndex,
    ) -> Result<Secret> {
        let target = leaf_index.node_index();
        let mut path = vec![target];
        path.extend(self.num_leaves.direct_path(target));

        let start = path
            .iter()
            .position(|node| self.secret_at(*node).is_some())
            .ok_or(Error::UnknownSender(leaf_index.0))?;
        let mut secret = self
            .take_secret_at(path[start])
            .ok_or(Error::UnknownSender(leaf_index.0))?;

        let secret_size = crypto_provider.hpke(self.cipher_suite)?.kdf_extract_size();
        for &parent in path[1..=start].iter().rev() {
            let (Some(left), Some(right)) = (parent.left(), parent.right()) else {
                return Err(Error::UnknownSender(leaf_index.0));
            };
            let left_secret = crypto_provider.expand_with_label(
                self.cipher_suite,
                &secret,
                LABEL_TREE,
                LABEL_LEFT,
                secret_size,
            )?;
            let right_secret = crypto_provider.expand_with_label(
                self.cipher_suite,
                &secret,
                LABEL_TREE,
                LABEL_RIGHT,
                secret_size,
            )?;

            if target.is_in_subtree_of(left) {
                self.put_secret_at(right, right_secret);
                secret = left_secret;
            } else {
                self.put_secret_at(left, left_secret);
                secret = right_secret;
            }
        }

        Ok(secret)
    }

    fn secret_at(&self, index: NodeIndex) -> Option<&Secret> {
        self.tree_secrets.get(index.0 as usize)?.as_ref()
    }

    fn take_secret_at(&mut self, index: NodeIndex) -> Option<Secret> {
        self.tree_secrets.get_mut(index.0 as usize)?.take()
    }

    fn put_secret_at(&mut self, index: NodeIndex, secret: Secret) {
        if let Some(slot) = self.tree_secrets.get_mut(index.0 as usize) {
            *slot = Some(secret);
        }
    }
}
