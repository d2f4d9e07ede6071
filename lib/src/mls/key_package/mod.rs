//! [RFC9420 Sec.10](https://www.rfc-editor.org/rfc/rfc9420.html#section-10) Key Packages
//!
//! A key package is a signed, single-use advertisement that a client can be added to a group.
//! Creating one stores its private init key and leaf encryption key in the provider's key store,
//! where a later welcome finds them.


use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::time::{Duration, SystemTime};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::{ensure_supported, CryptoProvider};
use crate::mls::crypto::key_pair::HPKEKeyPair;
use crate::mls::crypto::HPKEPublicKey;
use crate::mls::extensibility::Extensions;
use crate::mls::framing::ProtocolVersion;
use crate::mls::identity::Identity;
use crate::mls::ratchet_tree::leaf_node::{
    Capabilities, LeafNode, LeafNodeSource, TreeInfoTBS,
};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, serialize_opaque_vec, Deserializer, Serializer,
};

pub use crate::mls::ratchet_tree::leaf_node::Lifetime;

const LABEL_KEY_PACKAGE_TBS: &[u8] = b"KeyPackageTBS";
const LABEL_KEY_PACKAGE_REF: &[u8] = b"MLS 1.0 KeyPackage Reference";

/// Default validity of a fresh key package.
pub const DEFAULT_KEY_PACKAGE_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 7 * 12);

/// [RFC9420 Sec.5.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.2) `KeyPackageRef`,
/// the hash that names a key package inside a welcome.
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash)]
pub struct KeyPackageRef(Bytes);

impl KeyPackageRef {
    pub fn new<T: Into<Bytes>>(r: T) -> Self {
        Self(r.into())
    }
}

impl Deref for KeyPackageRef {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for KeyPackageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl Deserializer for KeyPackageRef {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self(deserialize_opaque_vec(buf)?))
    }
}

impl Serializer for KeyPackageRef {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.0, buf)
    }
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct KeyPackageTBS {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub init_key: HPKEPublicKey,
    pub leaf_node: LeafNode,
    pub extensions: Extensions,
}

impl Deserializer for KeyPackageTBS {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let version = ProtocolVersion::deserialize(buf)?;
        let cipher_suite = CipherSuite::deserialize(buf)?;
        let init_key = HPKEPublicKey::deserialize(buf)?;
        let leaf_node = LeafNode::deserialize(buf)?;
        let extensions = Extensions::deserialize(buf)?;

        Ok(Self {
            version,
            cipher_suite,
            init_key,
            leaf_node,
            extensions,
        })
    }
}

impl Serializer for KeyPackageTBS {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.version.serialize(buf)?;
        self.cipher_suite.serialize(buf)?;
        self.init_key.serialize(buf)?;
        self.leaf_node.serialize(buf)?;
        self.extensions.serialize(buf)
    }
}

/// [RFC9420 Sec.10](https://www.rfc-editor.org/rfc/rfc9420.html#section-10) Key Packages
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct KeyPackage {
    pub payload: KeyPackageTBS,
    pub signature: Bytes,
}

impl Deserializer for KeyPackage {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let payload = KeyPackageTBS::deserialize(buf)?;
        let signature = deserialize_opaque_vec(buf)?;

        Ok(Self { payload, signature })
    }
}

impl Serializer for KeyPackage {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.payload.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}

impl KeyPackage {
    /// A key package for `identity` valid for [`DEFAULT_KEY_PACKAGE_LIFETIME`].
    pub fn new(crypto_provider: &impl CryptoProvider, identity: &Identity) -> Result<Self> {
        Self::with_lifetime(
            crypto_provider,
            identity,
            Lifetime::new(DEFAULT_KEY_PACKAGE_LIFETIME),
        )
    }

    pub fn with_lifetime(
        crypto_provider: &impl CryptoProvider,
        identity: &Identity,
        lifetime: Lifetime,
    ) -> Result<Self> {
        let cipher_suite = identity.cipher_suite();
        ensure_supported(crypto_provider, cipher_suite)?;

        let init_key_pair = crypto_provider.generate_hpke_key_pair(cipher_suite)?;
        let (leaf_node, encryption_key_pair) = LeafNode::new(
            crypto_provider,
            identity,
            LeafNodeSource::KeyPackage(lifetime),
            Capabilities::for_provider(crypto_provider),
            Extensions::default(),
            &TreeInfoTBS::KeyPackage,
        )?;

        let payload = KeyPackageTBS {
            version: ProtocolVersion::MLS10,
            cipher_suite,
            init_key: init_key_pair.public_key().clone(),
            leaf_node,
            extensions: Extensions::default(),
        };
        let signature = identity.sign_with_label(
            crypto_provider,
            LABEL_KEY_PACKAGE_TBS,
            &payload.serialize_detached()?,
        )?;
        let key_package = Self { payload, signature };

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.1
        let key_package_ref = key_package.generate_ref(crypto_provider)?;
        let key_store = crypto_provider.key_store();
        let HPKEKeyPair {
            private_key: encryption_private_key,
            public_key: encryption_key,
        } = encryption_key_pair;
        key_store.store(&key_package_ref, init_key_pair.private_key);
        key_store.store(&encryption_key, encryption_private_key);
        key_store.store_leaf_key(&key_package_ref, encryption_key.0);

        log::debug!("created key package {key_package_ref}");

        Ok(key_package)
    }

    /// Decodes a key package and checks its signatures.
    pub fn from_bytes(crypto_provider: &impl CryptoProvider, bytes: &[u8]) -> Result<Self> {
        let key_package = Self::deserialize_exact(bytes)?;
        key_package.verify(crypto_provider)?;
        Ok(key_package)
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.payload.cipher_suite
    }

    pub fn leaf_node(&self) -> &LeafNode {
        &self.payload.leaf_node
    }

    pub fn init_key(&self) -> &HPKEPublicKey {
        &self.payload.init_key
    }

    pub fn lifetime(&self) -> Option<&Lifetime> {
        match &self.payload.leaf_node.payload.leaf_node_source {
            LeafNodeSource::KeyPackage(lifetime) => Some(lifetime),
            _ => None,
        }
    }

    /// ```text
    /// KeyPackageRef = RefHash("MLS 1.0 KeyPackage Reference", value)
    /// ```
    pub fn generate_ref(&self, crypto_provider: &impl CryptoProvider) -> Result<KeyPackageRef> {
        Ok(KeyPackageRef(crypto_provider.ref_hash(
            self.payload.cipher_suite,
            LABEL_KEY_PACKAGE_REF,
            &self.serialize_detached()?,
        )?))
    }

    /// [RFC9420 Sec.10.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-10.1) Key package
    /// validation, short of the lifetime.
    pub fn verify(&self, crypto_provider: &impl CryptoProvider) -> Result<()> {
        let cipher_suite = self.payload.cipher_suite;
        if !crypto_provider.supports(cipher_suite) {
            return Err(Error::MalformedKeyPackage("unsupported cipher suite"));
        }

        if self.lifetime().is_none() {
            return Err(Error::MalformedKeyPackage(
                "leaf node does not come from a key package",
            ));
        }

        self.payload
            .leaf_node
            .verify_signature(crypto_provider, cipher_suite, &TreeInfoTBS::KeyPackage)
            .map_err(|_| Error::InvalidKeyPackageSignature)?;

        crypto_provider
            .verify_with_label(
                cipher_suite,
                self.payload.leaf_node.signature_key(),
                LABEL_KEY_PACKAGE_TBS,
                &self.payload.serialize_detached()?,
                &self.signature,
            )
            .map_err(|_| Error::InvalidKeyPackageSignature)?;

        if self.payload.init_key == *self.payload.leaf_node.encryption_key() {
            return Err(Error::MalformedKeyPackage(
                "init key and encryption key are equal",
            ));
        }

        Ok(())
    }

    /// Fails with [`Error::KeyPackageExpired`] unless `time` falls inside the key package's
    /// lifetime.
    pub fn verify_lifetime(&self, time: SystemTime) -> Result<()> {
        match self.lifetime() {
            Some(lifetime) if lifetime.is_valid_at(time) => Ok(()),
            _ => Err(Error::KeyPackageExpired),
        }
    }

    /// Serialized form, the stable format for storage and transport.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf)?;
        Ok(buf.freeze())
    }
}
