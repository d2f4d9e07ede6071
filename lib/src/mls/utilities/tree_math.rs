//! [RFC9420 Appendix C](https://www.rfc-editor.org/rfc/rfc9420.html#appendix-C) Array-based trees.
//!
//! Leaves sit at even node indices, parents at odd ones. The tree is always full: the number of
//! leaves is a power of two, so every node has a well defined parent and sibling.

use std::fmt::{Display, Formatter};

use bytes::{Buf, BufMut};

use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{deserialize_u32, Deserializer, Serializer};

/// Position of a member among the leaves of the tree.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct LeafIndex(pub u32);

/// Position of any node in the flattened tree array.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeIndex(pub u32);

/// Number of leaves in the tree, always zero or a power of two.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NumLeaves(pub u32);

impl LeafIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Leaf indices past `u32::MAX / 2` saturate to an odd index, which never names a leaf.
    pub fn node_index(self) -> NodeIndex {
        NodeIndex(self.0.checked_mul(2).unwrap_or(u32::MAX))
    }
}

impl Display for LeafIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deserializer for LeafIndex {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self(deserialize_u32(buf)?))
    }
}

impl Serializer for LeafIndex {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u32(self.0);
        Ok(())
    }
}

impl NodeIndex {
    pub fn is_leaf(self) -> bool {
        self.0 % 2 == 0
    }

    /// The leaf index of this node, if it is a leaf.
    pub fn leaf_index(self) -> Option<LeafIndex> {
        self.is_leaf().then_some(LeafIndex(self.0 >> 1))
    }

    /// Height of the node above the leaves: the number of trailing one bits.
    pub fn level(self) -> u32 {
        self.0.trailing_ones()
    }

    /// Left child. Leaves have no children.
    pub fn left(self) -> Option<NodeIndex> {
        let k = self.level();
        (k != 0).then(|| NodeIndex(self.0 ^ (1 << (k - 1))))
    }

    /// Right child. Leaves have no children.
    pub fn right(self) -> Option<NodeIndex> {
        let k = self.level();
        (k != 0).then(|| NodeIndex(self.0 ^ (3 << (k - 1))))
    }

    /// Whether `self` lies in the subtree rooted at `ancestor` (inclusive).
    pub fn is_in_subtree_of(self, ancestor: NodeIndex) -> bool {
        let k = ancestor.level();
        if k == 0 {
            return self == ancestor;
        }
        self.level() <= k && (self.0 >> (k + 1)) == (ancestor.0 >> (k + 1))
    }
}

impl NumLeaves {
    pub fn new(leaves: u32) -> Self {
        Self(leaves)
    }

    /// Number of leaves needed to hold a tree array of `width` nodes.
    pub fn from_width(width: u32) -> Self {
        if width == 0 {
            Self(0)
        } else {
            Self(width / 2 + 1)
        }
    }

    /// Number of nodes in the tree array.
    pub fn width(self) -> u32 {
        if self.0 == 0 {
            0
        } else {
            2 * (self.0 - 1) + 1
        }
    }

    pub fn root(self) -> NodeIndex {
        let w = self.width();
        if w == 0 {
            return NodeIndex(0);
        }
        NodeIndex((1 << w.ilog2()) - 1)
    }

    /// Parent of `x`, or `None` for the root.
    pub fn parent(self, x: NodeIndex) -> Option<NodeIndex> {
        if x == self.root() {
            return None;
        }
        let k = x.level();
        let b = (x.0 >> (k + 1)) & 0x01;
        Some(NodeIndex((x.0 | (1 << k)) ^ (b << (k + 1))))
    }

    /// The other child of `x`'s parent.
    pub fn sibling(self, x: NodeIndex) -> Option<NodeIndex> {
        let p = self.parent(x)?;
        if x.0 < p.0 {
            p.right()
        } else {
            p.left()
        }
    }

    /// Ancestors of `x`, from its parent up to and including the root.
    pub fn direct_path(self, x: NodeIndex) -> Vec<NodeIndex> {
        let mut path = Vec::new();
        let mut node = x;
        while let Some(parent) = self.parent(node) {
            path.push(parent);
            node = parent;
        }
        path
    }

    /// Siblings of `x` and of each of its ancestors except the root.
    pub fn copath(self, x: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![x];
        path.extend(self.direct_path(x));
        path.pop();
        path.into_iter().filter_map(|n| self.sibling(n)).collect()
    }

    /// Lowest node whose subtree contains both `x` and `y`.
    pub fn common_ancestor(self, x: NodeIndex, y: NodeIndex) -> NodeIndex {
        let lx = x.level() + 1;
        let ly = y.level() + 1;
        if lx <= ly && x.0 >> ly == y.0 >> ly {
            return y;
        }
        if ly <= lx && x.0 >> lx == y.0 >> lx {
            return x;
        }

        let (mut xn, mut yn) = (x.0, y.0);
        let mut k = 0;
        while xn != yn {
            xn >>= 1;
            yn >>= 1;
            k += 1;
        }
        NodeIndex((xn << k) + (1 << (k - 1)) - 1)
    }
}
