use bytes::{Buf, BufMut};

use crate::mls::crypto::provider::SignatureScheme;
use crate::mls::crypto::{HPKEPrivateKey, HPKEPublicKey, SignaturePrivateKey, SignaturePublicKey};
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{Deserializer, Serializer};

/// A signing key pair. The private half never leaves the owning identity.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignatureKeyPair {
    pub(crate) private_key: SignaturePrivateKey,
    pub(crate) public_key: SignaturePublicKey,
    pub(crate) signature_scheme: SignatureScheme,
}

impl SignatureKeyPair {
    pub(crate) fn private_key(&self) -> &SignaturePrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &SignaturePublicKey {
        &self.public_key
    }

    pub fn signature_scheme(&self) -> SignatureScheme {
        self.signature_scheme
    }
}

/// An HPKE key pair, used both as key package init key and as tree node encryption key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HPKEKeyPair {
    pub(crate) private_key: HPKEPrivateKey,
    pub(crate) public_key: HPKEPublicKey,
}

pub type EncryptionKeyPair = HPKEKeyPair;

impl HPKEKeyPair {
    pub(crate) fn private_key(&self) -> &HPKEPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &HPKEPublicKey {
        &self.public_key
    }
}

impl Deserializer for HPKEKeyPair {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let private_key = HPKEPrivateKey::deserialize(buf)?;
        let public_key = HPKEPublicKey::deserialize(buf)?;

        Ok(Self {
            private_key,
            public_key,
        })
    }
}

impl Serializer for HPKEKeyPair {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.private_key.serialize(buf)?;
        self.public_key.serialize(buf)
    }
}
