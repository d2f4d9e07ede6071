use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::HPKEPublicKey;
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_vector, serialize_opaque_vec, serialize_vector,
    Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

/// [RFC9420 Sec.7.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.1) Parent Node Contents
///
/// `unmerged_leaves` lists, in ascending order, the leaves added below this node since it was
/// last set. They do not know its private key.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct ParentNode {
    pub encryption_key: HPKEPublicKey,
    pub parent_hash: Bytes,
    pub unmerged_leaves: Vec<LeafIndex>,
}

impl ParentNode {
    pub fn new(encryption_key: HPKEPublicKey) -> Self {
        Self {
            encryption_key,
            ..Default::default()
        }
    }

    /// Records a newly added leaf below this node, keeping the list sorted.
    pub(crate) fn add_unmerged_leaf(&mut self, leaf_index: LeafIndex) {
        if let Err(pos) = self.unmerged_leaves.binary_search(&leaf_index) {
            self.unmerged_leaves.insert(pos, leaf_index);
        }
    }
}

impl Deserializer for ParentNode {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let encryption_key = HPKEPublicKey::deserialize(buf)?;
        let parent_hash = deserialize_opaque_vec(buf)?;

        let mut unmerged_leaves = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            unmerged_leaves.push(LeafIndex::deserialize(b)?);
            Ok(())
        })?;

        Ok(Self {
            encryption_key,
            parent_hash,
            unmerged_leaves,
        })
    }
}

impl Serializer for ParentNode {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.encryption_key.serialize(buf)?;
        serialize_opaque_vec(&self.parent_hash, buf)?;
        serialize_vector(
            self.unmerged_leaves.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.unmerged_leaves[i].serialize(b) },
        )
    }
}
