//! [RFC9420 Sec.7.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.8) Tree Hashes and
//! [RFC9420 Sec.7.9](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.9) Parent Hashes

use std::collections::HashSet;

use bytes::{BufMut, Bytes, BytesMut};
use subtle::ConstantTimeEq;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::framing::MlsGroupId;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{serialize_opaque_vec, serialize_optional, Serializer};
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex};

use super::parent_node::ParentNode;
use super::{children, copath_child, Node, RatchetTree, NODE_TYPE_LEAF, NODE_TYPE_PARENT};

impl RatchetTree {
    pub fn compute_root_tree_hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<Bytes> {
        let root = self.num_leaves().root();
        self.compute_tree_hash(crypto_provider, cipher_suite, root, &[])
    }

    /// Tree hash of the subtree at `index`, as if the leaves in `exclude` were blank and absent
    /// from every unmerged leaves list.
    pub(crate) fn compute_tree_hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        index: NodeIndex,
        exclude: &[LeafIndex],
    ) -> Result<Bytes> {
        let mut buf = BytesMut::new();

        if let Some(leaf_index) = index.leaf_index() {
            // struct { uint32 leaf_index; optional<LeafNode> leaf_node; } LeafNodeHashInput;
            buf.put_u8(NODE_TYPE_LEAF);
            leaf_index.serialize(&mut buf)?;
            match self
                .get_leaf(leaf_index)
                .filter(|_| !exclude.contains(&leaf_index))
            {
                Some(leaf_node) => {
                    serialize_optional(true, &mut buf)?;
                    leaf_node.serialize(&mut buf)?;
                }
                None => serialize_optional(false, &mut buf)?,
            }
        } else {
            // struct { optional<ParentNode> parent_node; opaque left_hash<V>;
            //          opaque right_hash<V>; } ParentNodeHashInput;
            let (left, right) =
                children(index).ok_or(Error::TreeIntegrity("parent node has no children"))?;
            let left_hash = self.compute_tree_hash(crypto_provider, cipher_suite, left, exclude)?;
            let right_hash =
                self.compute_tree_hash(crypto_provider, cipher_suite, right, exclude)?;

            buf.put_u8(NODE_TYPE_PARENT);
            match self.get_parent(index) {
                Some(parent) if exclude.is_empty() => {
                    serialize_optional(true, &mut buf)?;
                    parent.serialize(&mut buf)?;
                }
                Some(parent) => {
                    serialize_optional(true, &mut buf)?;
                    ParentNode {
                        encryption_key: parent.encryption_key.clone(),
                        parent_hash: parent.parent_hash.clone(),
                        unmerged_leaves: parent
                            .unmerged_leaves
                            .iter()
                            .filter(|leaf| !exclude.contains(leaf))
                            .copied()
                            .collect(),
                    }
                    .serialize(&mut buf)?;
                }
                None => serialize_optional(false, &mut buf)?,
            }
            serialize_opaque_vec(&left_hash, &mut buf)?;
            serialize_opaque_vec(&right_hash, &mut buf)?;
        }

        Ok(crypto_provider.hash(cipher_suite)?.digest(&buf))
    }

    /// ```text
    /// struct {
    ///     HPKEPublicKey encryption_key;
    ///     opaque parent_hash<V>;
    ///     opaque original_sibling_tree_hash<V>;
    /// } ParentHashInput;
    /// ```
    ///
    /// `sibling` is the child of `parent` that is not on the path of the node storing the hash.
    pub(crate) fn compute_parent_hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        parent: NodeIndex,
        sibling: NodeIndex,
    ) -> Result<Bytes> {
        let parent_node = self
            .get_parent(parent)
            .ok_or(Error::TreeIntegrity("parent hash of a blank node"))?;
        let original_sibling_tree_hash = self.compute_tree_hash(
            crypto_provider,
            cipher_suite,
            sibling,
            &parent_node.unmerged_leaves,
        )?;

        let mut buf = BytesMut::new();
        parent_node.encryption_key.serialize(&mut buf)?;
        serialize_opaque_vec(&parent_node.parent_hash, &mut buf)?;
        serialize_opaque_vec(&original_sibling_tree_hash, &mut buf)?;

        Ok(crypto_provider.hash(cipher_suite)?.digest(&buf))
    }

    /// Chains parent hashes down `filtered_direct_path` (ordered leaf to root), from the root
    /// side. Returns the parent hash the leaf at `leaf_index` must carry.
    pub(crate) fn set_parent_hashes(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        leaf_index: LeafIndex,
        filtered_direct_path: &[NodeIndex],
    ) -> Result<Bytes> {
        let leaf_node = leaf_index.node_index();
        let mut parent_hash = Bytes::new();

        for &parent in filtered_direct_path.iter().rev() {
            match self.get_mut(parent) {
                Some(Node::Parent(parent_node)) => parent_node.parent_hash = parent_hash,
                _ => return Err(Error::TreeIntegrity("filtered direct path node is blank")),
            }

            let sibling = copath_child(parent, leaf_node)
                .ok_or(Error::TreeIntegrity("parent node has no children"))?;
            parent_hash =
                self.compute_parent_hash(crypto_provider, cipher_suite, parent, sibling)?;
        }

        Ok(parent_hash)
    }

    /// Whether some node in the resolution of `child` carries `parent_hash`.
    fn has_parent_hash(&self, child: NodeIndex, parent_hash: &Bytes) -> bool {
        self.resolution(child)
            .into_iter()
            .any(|node| match self.get(node) {
                Some(Node::Leaf(leaf)) => leaf
                    .parent_hash()
                    .is_some_and(|hash| bool::from(hash[..].ct_eq(&parent_hash[..]))),
                Some(Node::Parent(parent)) => {
                    bool::from(parent.parent_hash[..].ct_eq(&parent_hash[..]))
                }
                None => false,
            })
    }

    /// [RFC9420 Sec.7.9.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.9.2) Every
    /// non-blank parent must be parent-hash valid.
    fn verify_parent_hashes(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<()> {
        for (i, node) in self.0.iter().enumerate() {
            if !matches!(node, Some(Node::Parent(_))) {
                continue;
            }

            let index = NodeIndex(i as u32);
            let (left, right) =
                children(index).ok_or(Error::TreeIntegrity("parent node has no children"))?;

            let left_hash = self.compute_parent_hash(crypto_provider, cipher_suite, index, right)?;
            if self.has_parent_hash(left, &left_hash) {
                continue;
            }

            let right_hash = self.compute_parent_hash(crypto_provider, cipher_suite, index, left)?;
            if !self.has_parent_hash(right, &right_hash) {
                log::warn!("parent node {i} is not parent-hash valid");
                return Err(Error::ParentHashMismatch);
            }
        }

        Ok(())
    }

    /// [RFC9420 Sec.12.4.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1)
    /// Checks a tree received from outside the group: leaf signatures, unique encryption keys,
    /// well-formed unmerged leaves, and parent hashes.
    pub fn verify_integrity(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        group_id: &MlsGroupId,
    ) -> Result<()> {
        for (leaf_index, leaf_node) in self.leaves() {
            leaf_node.verify_signature(
                crypto_provider,
                cipher_suite,
                &leaf_node.tree_info(group_id, leaf_index),
            )?;
        }

        let mut encryption_keys = HashSet::new();
        for (i, node) in self.0.iter().enumerate() {
            let Some(node) = node else { continue };
            if !encryption_keys.insert(node.encryption_key()) {
                return Err(Error::TreeIntegrity("duplicate encryption key"));
            }

            if let Node::Parent(parent) = node {
                let index = NodeIndex(i as u32);
                for leaf in &parent.unmerged_leaves {
                    if !leaf.node_index().is_in_subtree_of(index) || self.get_leaf(*leaf).is_none()
                    {
                        return Err(Error::TreeIntegrity("invalid unmerged leaf"));
                    }
                }
            }
        }

        self.verify_parent_hashes(crypto_provider, cipher_suite)
    }
}
