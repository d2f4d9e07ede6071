//! [RFC9420 Sec.12.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.1) Proposals
//!
//! Only Add proposals are produced or accepted. They are always carried by value inside the
//! commit that applies them.

use bytes::{Buf, BufMut};

use crate::mls::key_package::KeyPackage;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{deserialize_u16, Deserializer, Serializer};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum ProposalType {
    Add = 0x0001,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Proposal {
    Add(AddProposal),
}

impl Proposal {
    pub fn proposal_type(&self) -> ProposalType {
        match self {
            Proposal::Add(_) => ProposalType::Add,
        }
    }
}

impl Deserializer for Proposal {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u16(buf)? {
            0x0001 => Ok(Proposal::Add(AddProposal::deserialize(buf)?)),
            v => Err(Error::InvalidProposalType(v)),
        }
    }
}

impl Serializer for Proposal {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(self.proposal_type() as u16);
        match self {
            Proposal::Add(add) => add.serialize(buf),
        }
    }
}

/// [RFC9420 Sec.12.1.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.1.1) An Add
/// proposal requests that a client with a specified `KeyPackage` be added to the group.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AddProposal {
    pub key_package: KeyPackage,
}

impl Deserializer for AddProposal {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            key_package: KeyPackage::deserialize(buf)?,
        })
    }
}

impl Serializer for AddProposal {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.key_package.serialize(buf)
    }
}
