use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::framing::proposal::Proposal;
use crate::mls::ratchet_tree::UpdatePath;
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_optional, deserialize_vector, serialize_opaque_vec,
    serialize_optional, serialize_vector, Deserializer, Serializer,
};

/// [RFC9420 Sec.12.4](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4) A commit applies
/// its proposals and re-keys the committer's path.
///
/// `tree_hash` is the root tree hash the committer computed after applying the commit. Receivers
/// recompute it and reject the commit on mismatch.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    pub(crate) proposals: Vec<Proposal>,
    pub(crate) path: Option<UpdatePath>,
    pub(crate) tree_hash: Bytes,
}

impl Commit {
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    pub fn path(&self) -> Option<&UpdatePath> {
        self.path.as_ref()
    }

    pub fn tree_hash(&self) -> &Bytes {
        &self.tree_hash
    }
}

impl Deserializer for Commit {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut proposals = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            proposals.push(Proposal::deserialize(b)?);
            Ok(())
        })?;

        let has_path = deserialize_optional(buf)?;
        let path = if has_path {
            Some(UpdatePath::deserialize(buf)?)
        } else {
            None
        };

        let tree_hash = deserialize_opaque_vec(buf)?;

        Ok(Self {
            proposals,
            path,
            tree_hash,
        })
    }
}

impl Serializer for Commit {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.proposals.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.proposals[i].serialize(b) },
        )?;
        serialize_optional(self.path.is_some(), buf)?;
        if let Some(update_path) = &self.path {
            update_path.serialize(buf)?;
        }
        serialize_opaque_vec(&self.tree_hash, buf)
    }
}
