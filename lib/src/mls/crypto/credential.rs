//! [RFC9420 Sec.5.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.3) Each member of a
//! group presents a credential that provides one or more identities for the member and
//! associates them with the member's signing key.

use bytes::{Buf, BufMut, Bytes};
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use crate::mls::utilities::{
    error::{Error, Result},
    serde::{
        deserialize_opaque_vec, deserialize_u16, serialize_opaque_vec, Deserializer, Serializer,
    },
};

/// [RFC9420 Sec.5.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.3) Enum type of
/// Credential
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum CredentialType {
    #[default]
    /// A "basic" credential type
    Basic = 0x0001,
    Unknown(u16),
}

impl From<u16> for CredentialType {
    fn from(v: u16) -> Self {
        match v {
            0x0001 => CredentialType::Basic,
            _ => CredentialType::Unknown(v),
        }
    }
}

impl From<CredentialType> for u16 {
    fn from(val: CredentialType) -> u16 {
        match val {
            CredentialType::Basic => 0x0001,
            CredentialType::Unknown(v) => v,
        }
    }
}

/// A bare assertion of an identity, without any additional information
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash)]
pub struct BasicIdentity(Bytes);

impl BasicIdentity {
    /// Creates a new `BasicIdentity`
    pub fn new<T: Into<Bytes>>(identity: T) -> Self {
        Self(identity.into())
    }
}

impl Deref for BasicIdentity {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deserializer for BasicIdentity {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(BasicIdentity(deserialize_opaque_vec(buf)?))
    }
}

impl Serializer for BasicIdentity {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.0, buf)
    }
}

/// [RFC9420 Sec.5.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.3) Credential provides
/// "presented identifiers"
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Credential {
    /// A "basic" credential is a bare assertion of an identity, without any additional information.
    /// The format of the encoded identity is defined by the application.
    Basic(BasicIdentity),
}

impl Default for Credential {
    fn default() -> Self {
        Self::Basic(BasicIdentity::default())
    }
}

impl Credential {
    /// Create a basic Credential from an application defined identity string
    pub fn basic<T: Into<Bytes>>(identity: T) -> Self {
        Self::Basic(BasicIdentity::new(identity))
    }

    /// Returns the identity of a given credential if it is basic type
    pub fn identity(&self) -> Option<&BasicIdentity> {
        let Credential::Basic(identity) = self;

        Some(identity)
    }
}

impl Display for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Basic(identity) => write!(f, "{}", String::from_utf8_lossy(identity)),
        }
    }
}

impl Deserializer for Credential {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let credential_type = deserialize_u16(buf)?.into();

        match credential_type {
            CredentialType::Basic => Ok(Self::Basic(BasicIdentity::deserialize(buf)?)),
            CredentialType::Unknown(_) => Err(Error::InvalidCredentialTypeValue),
        }
    }
}

impl Serializer for Credential {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(self.credential_type().into());
        match self {
            Credential::Basic(identity) => identity.serialize(buf),
        }
    }
}

impl Credential {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Credential::Basic(_) => CredentialType::Basic,
        }
    }
}

impl Deserializer for CredentialType {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(deserialize_u16(buf)?.into())
    }
}

impl Serializer for CredentialType {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16((*self).into());
        Ok(())
    }
}
