//! [RFC9420 Sec.7.4](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.4) Synchronizing
//! Views of the Tree through an `UpdatePath`.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use subtle::ConstantTimeEq;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::crypto::{HPKEPrivateKey, HPKEPublicKey, Secret};
use crate::mls::framing::MlsGroupId;
use crate::mls::identity::Identity;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_vector, serialize_opaque_vec, serialize_vector,
    Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex};

use super::leaf_node::{LeafNode, LeafNodeSource, TreeInfoTBS, TreePosition};
use super::parent_node::ParentNode;
use super::{copath_child, Node, RatchetTree};

const LABEL_UPDATE_PATH_NODE: &[u8] = b"UpdatePathNode";
const LABEL_PATH: &[u8] = b"path";

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct HPKECiphertext {
    pub kem_output: Bytes,
    pub ciphertext: Bytes,
}

impl Deserializer for HPKECiphertext {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let kem_output = deserialize_opaque_vec(buf)?;
        let ciphertext = deserialize_opaque_vec(buf)?;

        Ok(Self {
            kem_output,
            ciphertext,
        })
    }
}

impl Serializer for HPKECiphertext {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.kem_output, buf)?;
        serialize_opaque_vec(&self.ciphertext, buf)
    }
}

/// One re-keyed node: its new public key, and its path secret encrypted to each node in the
/// resolution of its copath child.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct UpdatePathNode {
    pub encryption_key: HPKEPublicKey,
    pub encrypted_path_secret: Vec<HPKECiphertext>,
}

impl Deserializer for UpdatePathNode {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let encryption_key = HPKEPublicKey::deserialize(buf)?;

        let mut encrypted_path_secret = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            encrypted_path_secret.push(HPKECiphertext::deserialize(b)?);
            Ok(())
        })?;

        Ok(Self {
            encryption_key,
            encrypted_path_secret,
        })
    }
}

impl Serializer for UpdatePathNode {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.encryption_key.serialize(buf)?;
        serialize_vector(
            self.encrypted_path_secret.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                self.encrypted_path_secret[i].serialize(b)
            },
        )
    }
}

/// [RFC9420 Sec.7.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.6) The committer's new
/// leaf and one entry per node of its filtered direct path.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct UpdatePath {
    pub leaf_node: LeafNode,
    pub nodes: Vec<UpdatePathNode>,
}

impl Deserializer for UpdatePath {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let leaf_node = LeafNode::deserialize(buf)?;

        let mut nodes = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            nodes.push(UpdatePathNode::deserialize(b)?);
            Ok(())
        })?;

        Ok(Self { leaf_node, nodes })
    }
}

impl Serializer for UpdatePath {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.leaf_node.serialize(buf)?;
        serialize_vector(
            self.nodes.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.nodes[i].serialize(b) },
        )
    }
}

/// Everything the committer learns while re-keying its direct path.
pub(crate) struct PathUpdate {
    pub(crate) leaf_node: LeafNode,
    pub(crate) filtered_direct_path: Vec<NodeIndex>,
    pub(crate) path_secrets: Vec<Secret>,
    /// New private keys for the committer's leaf and every node of its filtered direct path.
    pub(crate) private_keys: Vec<(NodeIndex, HPKEPrivateKey)>,
    pub(crate) commit_secret: Secret,
}

/// Position in `filtered_direct_path` of the lowest node above `leaf_index`.
pub(crate) fn path_position(
    filtered_direct_path: &[NodeIndex],
    leaf_index: LeafIndex,
) -> Option<usize> {
    let node = leaf_index.node_index();
    filtered_direct_path
        .iter()
        .position(|parent| node.is_in_subtree_of(*parent))
}

impl PathUpdate {
    /// The path secret a member at `leaf_index` needs to join this path.
    pub(crate) fn path_secret_for(&self, leaf_index: LeafIndex) -> Option<&Secret> {
        path_position(&self.filtered_direct_path, leaf_index).map(|i| &self.path_secrets[i])
    }

    /// [RFC9420 Sec.7.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.6) Encrypts each
    /// path secret to the resolution of the matching copath node, skipping the leaves in
    /// `exclude`.
    pub(crate) fn encrypt(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        ratchet_tree: &RatchetTree,
        sender: LeafIndex,
        group_context: &[u8],
        exclude: &[LeafIndex],
    ) -> Result<UpdatePath> {
        let sender_node = sender.node_index();
        let mut nodes = Vec::with_capacity(self.filtered_direct_path.len());

        for (&parent, path_secret) in self.filtered_direct_path.iter().zip(&self.path_secrets) {
            let encryption_key = ratchet_tree
                .get_parent(parent)
                .ok_or(Error::TreeIntegrity("filtered direct path node is blank"))?
                .encryption_key
                .clone();
            let sibling = copath_child(parent, sender_node)
                .ok_or(Error::TreeIntegrity("parent node has no children"))?;

            let encrypted_path_secret = ratchet_tree
                .resolution_excluding(sibling, exclude)
                .into_iter()
                .map(|recipient| {
                    let public_key = ratchet_tree
                        .get(recipient)
                        .map(Node::encryption_key)
                        .ok_or(Error::TreeIntegrity("resolution contains a blank node"))?;
                    let (kem_output, ciphertext) = crypto_provider.encrypt_with_label(
                        cipher_suite,
                        public_key,
                        LABEL_UPDATE_PATH_NODE,
                        group_context,
                        path_secret,
                    )?;
                    Ok(HPKECiphertext {
                        kem_output,
                        ciphertext,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            nodes.push(UpdatePathNode {
                encryption_key,
                encrypted_path_secret,
            });
        }

        Ok(UpdatePath {
            leaf_node: self.leaf_node.clone(),
            nodes,
        })
    }
}

impl RatchetTree {
    /// [RFC9420 Sec.7.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.5) Re-keys the
    /// direct path of `sender` with fresh path secrets and signs a new commit leaf for it.
    pub(crate) fn update_direct_path(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        signer: &Identity,
        group_id: &MlsGroupId,
        sender: LeafIndex,
    ) -> Result<PathUpdate> {
        let cipher_suite = signer.cipher_suite();
        let old_leaf = self
            .get_leaf(sender)
            .ok_or(Error::OwnLeafNotFound)?
            .clone();

        let sender_node = sender.node_index();
        let filtered_direct_path = self.filtered_direct_path(sender_node);
        self.blank_direct_path(sender);

        let secret_size = crypto_provider.hpke(cipher_suite)?.kdf_extract_size() as usize;
        let mut path_secret = Secret::random(secret_size);
        let mut path_secrets = Vec::with_capacity(filtered_direct_path.len());
        let mut private_keys = Vec::with_capacity(filtered_direct_path.len() + 1);

        for &parent in &filtered_direct_path {
            let key_pair = crypto_provider.derive_node_key_pair(cipher_suite, &path_secret)?;
            self.set(
                parent,
                Some(Node::Parent(ParentNode::new(key_pair.public_key.clone()))),
            );
            private_keys.push((parent, key_pair.private_key));

            let next = crypto_provider.derive_secret(cipher_suite, &path_secret, LABEL_PATH)?;
            path_secrets.push(std::mem::replace(&mut path_secret, next));
        }
        let commit_secret = path_secret;

        let parent_hash = self.set_parent_hashes(
            crypto_provider,
            cipher_suite,
            sender,
            &filtered_direct_path,
        )?;

        let (leaf_node, encryption_key_pair) = LeafNode::new(
            crypto_provider,
            signer,
            LeafNodeSource::Commit(parent_hash),
            old_leaf.payload.capabilities,
            old_leaf.payload.extensions,
            &TreeInfoTBS::UpdateOrCommit(TreePosition {
                group_id: group_id.clone(),
                leaf_index: sender,
            }),
        )?;
        self.set(sender_node, Some(Node::Leaf(leaf_node.clone())));
        private_keys.push((sender_node, encryption_key_pair.private_key));

        Ok(PathUpdate {
            leaf_node,
            filtered_direct_path,
            path_secrets,
            private_keys,
            commit_secret,
        })
    }

    /// [RFC9420 Sec.12.4.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2) Merges the
    /// public part of a received `UpdatePath` into the tree, checking the committer's new leaf
    /// and the parent hash chain it anchors.
    ///
    /// Returns the committer's filtered direct path.
    pub(crate) fn merge_update_path(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        group_id: &MlsGroupId,
        sender: LeafIndex,
        update_path: &UpdatePath,
    ) -> Result<Vec<NodeIndex>> {
        let old_leaf = self
            .get_leaf(sender)
            .ok_or(Error::UnknownSender(sender.0))?;
        if old_leaf.signature_key() != update_path.leaf_node.signature_key() {
            return Err(Error::SignerMismatch);
        }

        let Some(leaf_parent_hash) = update_path.leaf_node.parent_hash() else {
            return Err(Error::TreeIntegrity("update path leaf is not a commit leaf"));
        };
        update_path.leaf_node.verify_signature(
            crypto_provider,
            cipher_suite,
            &update_path.leaf_node.tree_info(group_id, sender),
        )?;

        let sender_node = sender.node_index();
        let filtered_direct_path = self.filtered_direct_path(sender_node);
        if filtered_direct_path.len() != update_path.nodes.len() {
            return Err(Error::InvalidUpdatePathLength);
        }

        self.blank_direct_path(sender);
        for (&parent, path_node) in filtered_direct_path.iter().zip(&update_path.nodes) {
            self.set(
                parent,
                Some(Node::Parent(ParentNode::new(path_node.encryption_key.clone()))),
            );
        }

        let parent_hash = self.set_parent_hashes(
            crypto_provider,
            cipher_suite,
            sender,
            &filtered_direct_path,
        )?;
        if !bool::from(parent_hash[..].ct_eq(&leaf_parent_hash[..])) {
            return Err(Error::ParentHashMismatch);
        }

        self.set(sender_node, Some(Node::Leaf(update_path.leaf_node.clone())));

        Ok(filtered_direct_path)
    }

    /// Finds the ciphertext in `update_path` addressed to a node `own_leaf` holds a private key
    /// for, and decrypts it.
    ///
    /// Returns the position in `filtered_direct_path` the secret belongs to, and the secret.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn decrypt_path_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        own_leaf: LeafIndex,
        sender: LeafIndex,
        filtered_direct_path: &[NodeIndex],
        update_path: &UpdatePath,
        private_keys: &BTreeMap<NodeIndex, HPKEPrivateKey>,
        group_context: &[u8],
        exclude: &[LeafIndex],
    ) -> Result<(usize, Secret)> {
        let position = path_position(filtered_direct_path, own_leaf)
            .ok_or(Error::PathSecretDecryptionFailed)?;
        let sibling = copath_child(filtered_direct_path[position], sender.node_index())
            .ok_or(Error::TreeIntegrity("parent node has no children"))?;

        let (slot, private_key) = self
            .resolution_excluding(sibling, exclude)
            .iter()
            .enumerate()
            .find_map(|(i, node)| private_keys.get(node).map(|key| (i, key)))
            .ok_or(Error::PathSecretDecryptionFailed)?;

        let ciphertext = update_path
            .nodes
            .get(position)
            .and_then(|node| node.encrypted_path_secret.get(slot))
            .ok_or(Error::InvalidUpdatePathLength)?;

        let path_secret = crypto_provider
            .decrypt_with_label(
                cipher_suite,
                private_key,
                LABEL_UPDATE_PATH_NODE,
                group_context,
                &ciphertext.kem_output,
                &ciphertext.ciphertext,
            )
            .map_err(|_| Error::PathSecretDecryptionFailed)?;

        Ok((position, path_secret))
    }

    /// Derives the private keys of `nodes` (ordered leaf to root) from the path secret of the
    /// first one, checking each against the public key in the tree.
    ///
    /// Returns the keys and the secret derived after the last node, the commit secret when
    /// `nodes` runs to the end of a filtered direct path.
    pub(crate) fn derive_path_keys(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        nodes: &[NodeIndex],
        path_secret: Secret,
    ) -> Result<(Vec<(NodeIndex, HPKEPrivateKey)>, Secret)> {
        let mut path_secret = path_secret;
        let mut private_keys = Vec::with_capacity(nodes.len());

        for &node in nodes {
            let key_pair = crypto_provider.derive_node_key_pair(cipher_suite, &path_secret)?;
            let expected = self
                .get_parent(node)
                .map(|parent| &parent.encryption_key)
                .ok_or(Error::TreeIntegrity("filtered direct path node is blank"))?;
            if expected != key_pair.public_key() {
                return Err(Error::PathPublicKeyMismatch);
            }

            private_keys.push((node, key_pair.private_key));
            path_secret = crypto_provider.derive_secret(cipher_suite, &path_secret, LABEL_PATH)?;
        }

        Ok((private_keys, path_secret))
    }
}
