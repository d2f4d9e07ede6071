//! [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) Leaf Node Contents

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::credential::{Credential, CredentialType};
use crate::mls::crypto::key_pair::EncryptionKeyPair;
use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::crypto::{HPKEPublicKey, SignaturePublicKey};
use crate::mls::extensibility::{ExtensionType, Extensions};
use crate::mls::framing::{MlsGroupId, ProtocolVersion};
use crate::mls::identity::Identity;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u16, deserialize_u64, deserialize_u8, deserialize_vector,
    serialize_opaque_vec, serialize_vector, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

const LABEL_LEAF_NODE_TBS: &[u8] = b"LeafNodeTBS";

/// How long before "now" a fresh lifetime starts, to tolerate clock skew between members.
const LIFETIME_BACKDATE: Duration = Duration::from_secs(60 * 60);

/// [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) The range of time,
/// in seconds since the UNIX epoch, a key package leaf is valid for.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Lifetime {
    pub not_before: u64,
    pub not_after: u64,
}

impl Lifetime {
    /// A lifetime running from one hour ago to `duration` from now.
    pub fn new(duration: Duration) -> Self {
        let now = seconds_since_epoch(SystemTime::now());
        Self {
            not_before: now.saturating_sub(LIFETIME_BACKDATE.as_secs()),
            not_after: now.saturating_add(duration.as_secs()),
        }
    }

    pub fn is_valid_at(&self, time: SystemTime) -> bool {
        let t = seconds_since_epoch(time);
        self.not_before <= t && t <= self.not_after
    }
}

fn seconds_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl Deserializer for Lifetime {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let not_before = deserialize_u64(buf)?;
        let not_after = deserialize_u64(buf)?;
        Ok(Self {
            not_before,
            not_after,
        })
    }
}

impl Serializer for Lifetime {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u64(self.not_before);
        buf.put_u64(self.not_after);
        Ok(())
    }
}

/// [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) What a client
/// supports, advertised in its leaf.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Capabilities {
    pub versions: Vec<ProtocolVersion>,
    pub cipher_suites: Vec<CipherSuite>,
    pub extensions: Vec<ExtensionType>,
    pub proposals: Vec<u16>,
    pub credentials: Vec<CredentialType>,
}

impl Capabilities {
    /// The capabilities of a client backed by `crypto_provider`.
    pub fn for_provider(crypto_provider: &impl CryptoProvider) -> Self {
        Self {
            versions: vec![ProtocolVersion::MLS10],
            cipher_suites: crypto_provider.supported(),
            extensions: vec![],
            proposals: vec![],
            credentials: vec![CredentialType::Basic],
        }
    }
}

impl Deserializer for Capabilities {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut versions = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            versions.push(ProtocolVersion::deserialize(b)?);
            Ok(())
        })?;

        let mut cipher_suites = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            cipher_suites.push(CipherSuite::deserialize(b)?);
            Ok(())
        })?;

        let mut extensions = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            extensions.push(ExtensionType::deserialize(b)?);
            Ok(())
        })?;

        let mut proposals = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            proposals.push(deserialize_u16(b)?);
            Ok(())
        })?;

        let mut credentials = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            credentials.push(CredentialType::deserialize(b)?);
            Ok(())
        })?;

        Ok(Self {
            versions,
            cipher_suites,
            extensions,
            proposals,
            credentials,
        })
    }
}

impl Serializer for Capabilities {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.versions.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.versions[i].serialize(b) },
        )?;
        serialize_vector(
            self.cipher_suites.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.cipher_suites[i].serialize(b) },
        )?;
        serialize_vector(
            self.extensions.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.extensions[i].serialize(b) },
        )?;
        serialize_vector(
            self.proposals.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                b.put_u16(self.proposals[i]);
                Ok(())
            },
        )?;
        serialize_vector(
            self.credentials.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.credentials[i].serialize(b) },
        )
    }
}

/// [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) Where a leaf node
/// came from. A commit leaf carries the parent hash that anchors its path.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum LeafNodeSource {
    KeyPackage(Lifetime),
    Update,
    Commit(Bytes),
}

impl Default for LeafNodeSource {
    fn default() -> Self {
        LeafNodeSource::KeyPackage(Lifetime::default())
    }
}

impl Deserializer for LeafNodeSource {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u8(buf)? {
            0x01 => Ok(LeafNodeSource::KeyPackage(Lifetime::deserialize(buf)?)),
            0x02 => Ok(LeafNodeSource::Update),
            0x03 => Ok(LeafNodeSource::Commit(deserialize_opaque_vec(buf)?)),
            v => Err(Error::InvalidLeafNodeSource(v)),
        }
    }
}

impl Serializer for LeafNodeSource {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        match self {
            LeafNodeSource::KeyPackage(lifetime) => {
                buf.put_u8(0x01);
                lifetime.serialize(buf)
            }
            LeafNodeSource::Update => {
                buf.put_u8(0x02);
                Ok(())
            }
            LeafNodeSource::Commit(parent_hash) => {
                buf.put_u8(0x03);
                serialize_opaque_vec(parent_hash, buf)
            }
        }
    }
}

/// Position of a leaf, bound into its signature unless the leaf comes from a key package.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TreePosition {
    pub group_id: MlsGroupId,
    pub leaf_index: LeafIndex,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TreeInfoTBS {
    KeyPackage,
    UpdateOrCommit(TreePosition),
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct LeafNodePayload {
    pub encryption_key: HPKEPublicKey,
    pub signature_key: SignaturePublicKey,
    pub credential: Credential,
    pub capabilities: Capabilities,
    pub leaf_node_source: LeafNodeSource,
    pub extensions: Extensions,
}

impl Deserializer for LeafNodePayload {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let encryption_key = HPKEPublicKey::deserialize(buf)?;
        let signature_key = SignaturePublicKey::deserialize(buf)?;
        let credential = Credential::deserialize(buf)?;
        let capabilities = Capabilities::deserialize(buf)?;
        let leaf_node_source = LeafNodeSource::deserialize(buf)?;
        let extensions = Extensions::deserialize(buf)?;

        Ok(Self {
            encryption_key,
            signature_key,
            credential,
            capabilities,
            leaf_node_source,
            extensions,
        })
    }
}

impl Serializer for LeafNodePayload {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.encryption_key.serialize(buf)?;
        self.signature_key.serialize(buf)?;
        self.credential.serialize(buf)?;
        self.capabilities.serialize(buf)?;
        self.leaf_node_source.serialize(buf)?;
        self.extensions.serialize(buf)
    }
}

/// [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) A member's leaf:
/// its encryption key, signature key and credential, signed by that member.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct LeafNode {
    pub payload: LeafNodePayload,
    pub signature: Bytes,
}

impl LeafNode {
    /// Builds and signs a leaf for `signer` around a fresh encryption key pair.
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        signer: &Identity,
        leaf_node_source: LeafNodeSource,
        capabilities: Capabilities,
        extensions: Extensions,
        tree_info: &TreeInfoTBS,
    ) -> Result<(Self, EncryptionKeyPair)> {
        let encryption_key_pair = crypto_provider.generate_hpke_key_pair(signer.cipher_suite())?;

        let payload = LeafNodePayload {
            encryption_key: encryption_key_pair.public_key().clone(),
            signature_key: signer.signature_public_key().clone(),
            credential: signer.credential().clone(),
            capabilities,
            leaf_node_source,
            extensions,
        };

        let tbs = leaf_node_tbs(&payload, tree_info)?;
        let signature = signer.sign_with_label(crypto_provider, LABEL_LEAF_NODE_TBS, &tbs)?;

        Ok((Self { payload, signature }, encryption_key_pair))
    }

    pub(crate) fn verify_signature(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        tree_info: &TreeInfoTBS,
    ) -> Result<()> {
        let tbs = leaf_node_tbs(&self.payload, tree_info)?;
        crypto_provider
            .verify_with_label(
                cipher_suite,
                &self.payload.signature_key,
                LABEL_LEAF_NODE_TBS,
                &tbs,
                &self.signature,
            )
            .map_err(|_| Error::InvalidLeafNodeSignature)
    }

    pub fn credential(&self) -> &Credential {
        &self.payload.credential
    }

    pub fn encryption_key(&self) -> &HPKEPublicKey {
        &self.payload.encryption_key
    }

    pub fn signature_key(&self) -> &SignaturePublicKey {
        &self.payload.signature_key
    }

    /// The parent hash a commit leaf carries; empty for other sources.
    pub(crate) fn parent_hash(&self) -> Option<&Bytes> {
        match &self.payload.leaf_node_source {
            LeafNodeSource::Commit(parent_hash) => Some(parent_hash),
            _ => None,
        }
    }

    /// The tree position this leaf's signature is bound to.
    pub(crate) fn tree_info(&self, group_id: &MlsGroupId, leaf_index: LeafIndex) -> TreeInfoTBS {
        match self.payload.leaf_node_source {
            LeafNodeSource::KeyPackage(_) => TreeInfoTBS::KeyPackage,
            LeafNodeSource::Update | LeafNodeSource::Commit(_) => {
                TreeInfoTBS::UpdateOrCommit(TreePosition {
                    group_id: group_id.clone(),
                    leaf_index,
                })
            }
        }
    }
}

fn leaf_node_tbs(payload: &LeafNodePayload, tree_info: &TreeInfoTBS) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    payload.serialize(&mut buf)?;
    if let TreeInfoTBS::UpdateOrCommit(position) = tree_info {
        serialize_opaque_vec(&position.group_id, &mut buf)?;
        position.leaf_index.serialize(&mut buf)?;
    }
    Ok(buf.freeze())
}

impl Deserializer for LeafNode {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let payload = LeafNodePayload::deserialize(buf)?;
        let signature = deserialize_opaque_vec(buf)?;

        Ok(Self { payload, signature })
    }
}

impl Serializer for LeafNode {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.payload.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}
