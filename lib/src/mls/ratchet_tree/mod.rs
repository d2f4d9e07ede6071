//! [RFC9420 Sec.7](https://www.rfc-editor.org/rfc/rfc9420.html#section-7) Ratchet Tree Operations
//!
//! The tree is held in its array form and is always full: blank nodes are `None`, and the number
//! of leaves is a power of two. Trailing blank nodes are dropped only on the wire.

#[cfg(test)]
mod ratchet_tree_test;

pub mod leaf_node;
pub mod parent_node;
mod tree_hash;
mod update_path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::HPKEPublicKey;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_optional, deserialize_u8, deserialize_vector, serialize_optional,
    serialize_vector, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex, NumLeaves};

use self::leaf_node::LeafNode;
use self::parent_node::ParentNode;

pub use self::update_path::{HPKECiphertext, UpdatePath, UpdatePathNode};
pub(crate) use self::update_path::{path_position, PathUpdate};

const NODE_TYPE_LEAF: u8 = 0x01;
const NODE_TYPE_PARENT: u8 = 0x02;

/// [RFC9420 Sec.7.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.8) A non-blank node
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Node {
    Leaf(LeafNode),
    Parent(ParentNode),
}

impl Node {
    pub fn encryption_key(&self) -> &HPKEPublicKey {
        match self {
            Node::Leaf(leaf) => leaf.encryption_key(),
            Node::Parent(parent) => &parent.encryption_key,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Parent(_) => None,
        }
    }

    pub fn as_parent(&self) -> Option<&ParentNode> {
        match self {
            Node::Parent(parent) => Some(parent),
            Node::Leaf(_) => None,
        }
    }
}

impl Deserializer for Node {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u8(buf)? {
            NODE_TYPE_LEAF => Ok(Node::Leaf(LeafNode::deserialize(buf)?)),
            NODE_TYPE_PARENT => Ok(Node::Parent(ParentNode::deserialize(buf)?)),
            v => Err(Error::InvalidNodeType(v)),
        }
    }
}

impl Serializer for Node {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        match self {
            Node::Leaf(leaf) => {
                buf.put_u8(NODE_TYPE_LEAF);
                leaf.serialize(buf)
            }
            Node::Parent(parent) => {
                buf.put_u8(NODE_TYPE_PARENT);
                parent.serialize(buf)
            }
        }
    }
}

/// [RFC9420 Sec.7](https://www.rfc-editor.org/rfc/rfc9420.html#section-7) The ratchet tree of a
/// group, in array representation.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct RatchetTree(pub(crate) Vec<Option<Node>>);

impl RatchetTree {
    /// A one-member tree holding only `leaf_node`.
    pub(crate) fn new(leaf_node: LeafNode) -> Self {
        Self(vec![Some(Node::Leaf(leaf_node))])
    }

    pub fn num_leaves(&self) -> NumLeaves {
        NumLeaves::from_width(self.0.len() as u32)
    }

    /// Number of non-blank leaves.
    pub fn member_count(&self) -> usize {
        self.leaves().count()
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        self.0.get(index.0 as usize)?.as_ref()
    }

    fn get_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.0.get_mut(index.0 as usize)?.as_mut()
    }

    fn set(&mut self, index: NodeIndex, node: Option<Node>) {
        if let Some(slot) = self.0.get_mut(index.0 as usize) {
            *slot = node;
        }
    }

    pub fn get_leaf(&self, leaf_index: LeafIndex) -> Option<&LeafNode> {
        if leaf_index.0 >= self.num_leaves().0 {
            return None;
        }
        self.get(leaf_index.node_index()).and_then(Node::as_leaf)
    }

    pub(crate) fn get_parent(&self, index: NodeIndex) -> Option<&ParentNode> {
        self.get(index).and_then(Node::as_parent)
    }

    /// Non-blank leaves with their indices, left to right.
    pub fn leaves(&self) -> impl Iterator<Item = (LeafIndex, &LeafNode)> {
        self.0.iter().step_by(2).enumerate().filter_map(|(i, node)| {
            node.as_ref()
                .and_then(Node::as_leaf)
                .map(|leaf| (LeafIndex(i as u32), leaf))
        })
    }

    pub fn find_leaf(&self, leaf_node: &LeafNode) -> Option<LeafIndex> {
        self.leaves()
            .find(|(_, leaf)| *leaf == leaf_node)
            .map(|(index, _)| index)
    }

    /// [RFC9420 Sec.4.1.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-4.1.2) The
    /// resolution of a node: the minimal set of non-blank nodes covering all of its non-blank
    /// descendants.
    pub fn resolution(&self, index: NodeIndex) -> Vec<NodeIndex> {
        match self.get(index) {
            Some(Node::Leaf(_)) => vec![index],
            Some(Node::Parent(parent)) => {
                let mut resolution = vec![index];
                resolution.extend(
                    parent
                        .unmerged_leaves
                        .iter()
                        .map(|leaf| leaf.node_index())
                        .filter(|node| self.get(*node).is_some()),
                );
                resolution
            }
            None => match children(index) {
                Some((left, right)) => {
                    let mut resolution = self.resolution(left);
                    resolution.extend(self.resolution(right));
                    resolution
                }
                None => vec![],
            },
        }
    }

    /// The resolution of `index` without the leaves in `exclude`.
    pub(crate) fn resolution_excluding(
        &self,
        index: NodeIndex,
        exclude: &[LeafIndex],
    ) -> Vec<NodeIndex> {
        self.resolution(index)
            .into_iter()
            .filter(|node| node.leaf_index().map_or(true, |leaf| !exclude.contains(&leaf)))
            .collect()
    }

    /// [RFC9420 Sec.4.1.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-4.1.2) The direct
    /// path of `index` without the nodes whose copath child has an empty resolution.
    pub fn filtered_direct_path(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.num_leaves()
            .direct_path(index)
            .into_iter()
            .filter(|parent| {
                copath_child(*parent, index)
                    .map(|child| !self.resolution(child).is_empty())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// [RFC9420 Sec.7.7](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.7) Adds a leaf at
    /// the leftmost blank position, extending the tree when it is full.
    ///
    /// The new leaf becomes unmerged at every non-blank parent above it.
    pub(crate) fn add_leaf(&mut self, leaf_node: LeafNode) -> LeafIndex {
        let num_leaves = self.num_leaves();
        let leaf_index = match (0..num_leaves.0)
            .map(LeafIndex)
            .find(|leaf| self.get(leaf.node_index()).is_none())
        {
            Some(blank) => blank,
            None => {
                self.extend();
                LeafIndex(num_leaves.0)
            }
        };

        let node_index = leaf_index.node_index();
        self.set(node_index, Some(Node::Leaf(leaf_node)));

        for parent in self.num_leaves().direct_path(node_index) {
            if let Some(Node::Parent(parent)) = self.get_mut(parent) {
                parent.add_unmerged_leaf(leaf_index);
            }
        }

        leaf_index
    }

    /// Doubles the number of leaves; the new half is blank.
    fn extend(&mut self) {
        if self.0.is_empty() {
            self.0.push(None);
        } else {
            let width = 2 * self.0.len() + 1;
            self.0.resize(width, None);
        }
    }

    /// Blanks every parent on the direct path of `leaf_index`.
    fn blank_direct_path(&mut self, leaf_index: LeafIndex) {
        for node in self.num_leaves().direct_path(leaf_index.node_index()) {
            self.set(node, None);
        }
    }
}

/// Left and right child of a parent node.
pub(crate) fn children(index: NodeIndex) -> Option<(NodeIndex, NodeIndex)> {
    Some((index.left()?, index.right()?))
}

/// The child of `parent` whose subtree does not contain `descendant`.
pub(crate) fn copath_child(parent: NodeIndex, descendant: NodeIndex) -> Option<NodeIndex> {
    let (left, right) = children(parent)?;
    if descendant.is_in_subtree_of(left) {
        Some(right)
    } else {
        Some(left)
    }
}

impl Deserializer for RatchetTree {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut nodes = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            if deserialize_optional(b)? {
                nodes.push(Some(Node::deserialize(b)?));
            } else {
                nodes.push(None);
            }
            Ok(())
        })?;

        match nodes.last() {
            None => return Err(Error::MalformedRatchetTree("tree has no nodes")),
            Some(None) => return Err(Error::MalformedRatchetTree("tree ends with a blank node")),
            Some(Some(_)) => {}
        }

        for (i, node) in nodes.iter().enumerate() {
            let at_leaf_position = i % 2 == 0;
            match node {
                Some(Node::Leaf(_)) if !at_leaf_position => {
                    return Err(Error::MalformedRatchetTree("leaf node at a parent position"))
                }
                Some(Node::Parent(_)) if at_leaf_position => {
                    return Err(Error::MalformedRatchetTree("parent node at a leaf position"))
                }
                _ => {}
            }
        }

        let width = u32::try_from(nodes.len())
            .map_err(|_| Error::MalformedRatchetTree("tree is too wide"))?;
        let leaves = NumLeaves::from_width(width)
            .0
            .checked_next_power_of_two()
            .ok_or(Error::MalformedRatchetTree("tree is too wide"))?;
        nodes.resize(NumLeaves::new(leaves).width() as usize, None);

        Ok(Self(nodes))
    }
}

impl Serializer for RatchetTree {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        let end = self
            .0
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);
        let nodes = &self.0[..end];

        serialize_vector(
            nodes.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                match &nodes[i] {
                    Some(node) => {
                        serialize_optional(true, b)?;
                        node.serialize(b)
                    }
                    None => serialize_optional(false, b),
                }
            },
        )
    }
}
