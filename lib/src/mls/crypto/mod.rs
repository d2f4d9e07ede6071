//! [RFC9420 Sec.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-5) Cryptographic Objects
#[cfg(test)]
mod crypto_test;

use bytes::{Buf, BufMut, Bytes};
use std::ops::Deref;

pub use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, serialize_opaque_vec, Deserializer, Serializer,
};

pub mod cipher_suite;
pub mod config;
pub mod credential;
pub mod key_pair;
pub mod provider;
pub(crate) mod rng;
pub mod secret;

pub use secret::Secret;

/// Public key material, opaque to everything but the cipher suite.
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Key(pub(crate) Bytes);

impl Key {
    pub fn new<T: Into<Bytes>>(key: T) -> Self {
        Self(key.into())
    }
}

impl Deref for Key {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deserializer for Key {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Key(deserialize_opaque_vec(buf)?))
    }
}

impl Serializer for Key {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.0, buf)
    }
}

/// Encryption keys of tree nodes and key package init keys, in the KEM's own encoding
/// ([RFC9180 Sec.4](https://www.rfc-editor.org/rfc/rfc9180.html#section-4)).
pub type HPKEPublicKey = Key;
pub type HPKEPrivateKey = Secret;

/// Leaf signature keys, encoded as the cipher suite's signature scheme defines.
pub type SignaturePublicKey = Key;
pub type SignaturePrivateKey = Secret;

/// HPKE KEM identifiers from the
/// [RFC9180 Sec.7.1](https://www.rfc-editor.org/rfc/rfc9180.html#section-7.1) registry.
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum Kem {
    #[default]
    KEM_X25519_HKDF_SHA256 = 0x20,
}

/// HPKE KDF identifiers
/// ([RFC9180 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9180.html#section-7.2)).
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum Kdf {
    #[default]
    KDF_HKDF_SHA256 = 0x01,
}

/// HPKE AEAD identifiers
/// ([RFC9180 Sec.7.3](https://www.rfc-editor.org/rfc/rfc9180.html#section-7.3)).
/// The same AEAD protects application messages and welcome group info.
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum Aead {
    #[default]
    AEAD_AES128GCM = 0x01,
}
