//! [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Message Framing
//!
//! Handshake messages (commits) travel as [`public_message::PublicMessage`], signed and tagged
//! with the membership key. Application messages travel as
//! [`private_message::PrivateMessage`], signed and then encrypted under the secret tree.

#[cfg(test)]
mod framing_test;

pub mod commit;
pub mod group_info;
pub mod private_message;
pub mod proposal;
pub mod public_message;
pub mod welcome;

use bytes::{Buf, BufMut, Bytes};

use crate::mls::crypto::rng::random_array;
use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::identity::Identity;
use crate::mls::key_schedule::GroupContext;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u16, deserialize_u32, deserialize_u64, deserialize_u8,
    serialize_opaque_vec, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

use self::commit::Commit;
use self::proposal::Proposal;

pub type MlsGroupId = Bytes;

const LABEL_FRAMED_CONTENT_TBS: &[u8] = b"FramedContentTBS";

/// [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Protocol version
#[derive(
    Default, Debug, Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ProtocolVersion {
    #[default]
    MLS10,
}

impl Deserializer for ProtocolVersion {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u16(buf)? {
            1 => Ok(ProtocolVersion::MLS10),
            v => Err(Error::InvalidProtocolVersion(v)),
        }
    }
}

impl Serializer for ProtocolVersion {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        match self {
            ProtocolVersion::MLS10 => buf.put_u16(1),
        }
        Ok(())
    }
}

/// [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Wire format of a message
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum WireFormat {
    #[default]
    PublicMessage = 0x0001,
    PrivateMessage = 0x0002,
    Welcome = 0x0003,
    GroupInfo = 0x0004,
    KeyPackage = 0x0005,
}

impl Deserializer for WireFormat {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u16(buf)? {
            0x0001 => Ok(WireFormat::PublicMessage),
            0x0002 => Ok(WireFormat::PrivateMessage),
            0x0003 => Ok(WireFormat::Welcome),
            0x0004 => Ok(WireFormat::GroupInfo),
            0x0005 => Ok(WireFormat::KeyPackage),
            v => Err(Error::InvalidWireFormat(v)),
        }
    }
}

impl Serializer for WireFormat {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(*self as u16);
        Ok(())
    }
}

/// [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Content type
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ContentType {
    #[default]
    Application = 0x01,
    Proposal = 0x02,
    Commit = 0x03,
}

impl Deserializer for ContentType {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u8(buf)? {
            0x01 => Ok(ContentType::Application),
            0x02 => Ok(ContentType::Proposal),
            0x03 => Ok(ContentType::Commit),
            v => Err(Error::InvalidContentType(v)),
        }
    }
}

impl Serializer for ContentType {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(*self as u8);
        Ok(())
    }
}

/// [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Sender of a message.
/// Only group members send messages here.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Sender {
    Member(LeafIndex),
}

impl Default for Sender {
    fn default() -> Self {
        Sender::Member(LeafIndex::default())
    }
}

impl Sender {
    pub fn leaf_index(&self) -> LeafIndex {
        let Sender::Member(leaf_index) = self;
        *leaf_index
    }
}

impl Deserializer for Sender {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u8(buf)? {
            0x01 => Ok(Sender::Member(LeafIndex::deserialize(buf)?)),
            v => Err(Error::InvalidSenderType(v)),
        }
    }
}

impl Serializer for Sender {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        match self {
            Sender::Member(leaf_index) => {
                buf.put_u8(0x01);
                leaf_index.serialize(buf)
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Content {
    Application(Bytes),
    Proposal(Proposal),
    Commit(Commit),
}

impl Default for Content {
    fn default() -> Self {
        Content::Application(Bytes::new())
    }
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::Application(_) => ContentType::Application,
            Content::Proposal(_) => ContentType::Proposal,
            Content::Commit(_) => ContentType::Commit,
        }
    }

    pub(crate) fn deserialize<B>(buf: &mut B, content_type: ContentType) -> Result<Self>
    where
        B: Buf,
    {
        match content_type {
            ContentType::Application => Ok(Content::Application(deserialize_opaque_vec(buf)?)),
            ContentType::Proposal => Ok(Content::Proposal(Proposal::deserialize(buf)?)),
            ContentType::Commit => Ok(Content::Commit(Commit::deserialize(buf)?)),
        }
    }

    /// Serializes the body only; the content type is written by the enclosing structure.
    pub(crate) fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        B: BufMut,
    {
        match self {
            Content::Application(application) => serialize_opaque_vec(application, buf),
            Content::Proposal(proposal) => proposal.serialize(buf),
            Content::Commit(commit) => commit.serialize(buf),
        }
    }
}

/// [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Content of a message
/// together with the information needed to place it in a group and epoch.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct FramedContent {
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub sender: Sender,
    pub authenticated_data: Bytes,
    pub content: Content,
}

impl Deserializer for FramedContent {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let group_id = deserialize_opaque_vec(buf)?;
        let epoch = deserialize_u64(buf)?;
        let sender = Sender::deserialize(buf)?;
        let authenticated_data = deserialize_opaque_vec(buf)?;
        let content_type = ContentType::deserialize(buf)?;
        let content = Content::deserialize(buf, content_type)?;

        Ok(Self {
            group_id,
            epoch,
            sender,
            authenticated_data,
            content,
        })
    }
}

impl Serializer for FramedContent {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.group_id, buf)?;
        buf.put_u64(self.epoch);
        self.sender.serialize(buf)?;
        serialize_opaque_vec(&self.authenticated_data, buf)?;
        self.content.content_type().serialize(buf)?;
        self.content.serialize(buf)
    }
}

/// [RFC9420 Sec.6.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.1) The signed portion of
/// a message. Member senders always bind the group context.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FramedContentTBS<'a> {
    pub version: ProtocolVersion,
    pub wire_format: WireFormat,
    pub content: &'a FramedContent,
    pub context: &'a GroupContext,
}

impl Serializer for FramedContentTBS<'_> {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.version.serialize(buf)?;
        self.wire_format.serialize(buf)?;
        self.content.serialize(buf)?;
        self.context.serialize(buf)
    }
}

/// [RFC9420 Sec.6.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.1) Signature over the
/// content, plus the confirmation tag when the content is a commit.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct FramedContentAuthData {
    pub signature: Bytes,
    pub confirmation_tag: Option<Bytes>,
}

impl FramedContentAuthData {
    pub(crate) fn deserialize<B>(buf: &mut B, content_type: ContentType) -> Result<Self>
    where
        B: Buf,
    {
        let signature = deserialize_opaque_vec(buf)?;
        let confirmation_tag = if content_type == ContentType::Commit {
            Some(deserialize_opaque_vec(buf)?)
        } else {
            None
        };

        Ok(Self {
            signature,
            confirmation_tag,
        })
    }

    pub(crate) fn serialize<B>(&self, buf: &mut B, content_type: ContentType) -> Result<()>
    where
        B: BufMut,
    {
        serialize_opaque_vec(&self.signature, buf)?;
        if content_type == ContentType::Commit {
            let tag = self.confirmation_tag.as_deref().unwrap_or_default();
            serialize_opaque_vec(tag, buf)?;
        }
        Ok(())
    }
}

/// [RFC9420 Sec.6.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.1) Content with its
/// authentication data, before it is put on the wire.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct AuthenticatedContent {
    pub wire_format: WireFormat,
    pub content: FramedContent,
    pub auth: FramedContentAuthData,
}

impl AuthenticatedContent {
    /// Signs `content` as `signer`. The confirmation tag, if any, is filled in by the caller.
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        signer: &Identity,
        wire_format: WireFormat,
        content: FramedContent,
        ctx: &GroupContext,
    ) -> Result<Self> {
        let tbs = FramedContentTBS {
            version: ctx.version,
            wire_format,
            content: &content,
            context: ctx,
        };
        let signature = signer.sign_with_label(
            crypto_provider,
            LABEL_FRAMED_CONTENT_TBS,
            &tbs.serialize_detached()?,
        )?;

        Ok(Self {
            wire_format,
            content,
            auth: FramedContentAuthData {
                signature,
                confirmation_tag: None,
            },
        })
    }

    pub(crate) fn verify_signature(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        verify_key: &[u8],
        ctx: &GroupContext,
    ) -> Result<()> {
        let tbs = FramedContentTBS {
            version: ctx.version,
            wire_format: self.wire_format,
            content: &self.content,
            context: ctx,
        };

        crypto_provider
            .verify_with_label(
                cipher_suite,
                verify_key,
                LABEL_FRAMED_CONTENT_TBS,
                &tbs.serialize_detached()?,
                &self.auth.signature,
            )
            .map_err(|_| Error::InvalidContentSignature)
    }

    /// [RFC9420 Sec.6.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.2)
    ///
    /// ```text
    /// membership_tag = MAC(membership_key, AuthenticatedContentTBM)
    /// ```
    pub(crate) fn membership_tag(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        membership_key: &[u8],
        ctx: &GroupContext,
    ) -> Result<Bytes> {
        let tbm = self.tbm(ctx)?;
        crypto_provider.sign_mac(cipher_suite, membership_key, &tbm)
    }

    pub(crate) fn verify_membership_tag(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        membership_key: &[u8],
        ctx: &GroupContext,
        membership_tag: &[u8],
    ) -> Result<()> {
        let tbm = self.tbm(ctx)?;
        if crypto_provider.verify_mac(cipher_suite, membership_key, &tbm, membership_tag)? {
            Ok(())
        } else {
            Err(Error::MembershipTagMismatch)
        }
    }

    fn tbm(&self, ctx: &GroupContext) -> Result<Bytes> {
        let mut buf = bytes::BytesMut::new();
        FramedContentTBS {
            version: ctx.version,
            wire_format: self.wire_format,
            content: &self.content,
            context: ctx,
        }
        .serialize(&mut buf)?;
        self.auth
            .serialize(&mut buf, self.content.content.content_type())?;
        Ok(buf.freeze())
    }
}

/// [RFC9420 Sec.6.3.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3.2) Sender data,
/// encrypted separately so that only members learn who sent a message.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct SenderData {
    pub leaf_index: LeafIndex,
    pub generation: u32,
    pub reuse_guard: [u8; 4],
}

impl SenderData {
    /// Sender data with a fresh random reuse guard.
    pub fn new(leaf_index: LeafIndex, generation: u32) -> Self {
        Self {
            leaf_index,
            generation,
            reuse_guard: random_array::<4>(),
        }
    }
}

impl Deserializer for SenderData {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let leaf_index = LeafIndex::deserialize(buf)?;
        let generation = deserialize_u32(buf)?;
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall);
        }
        let mut reuse_guard = [0u8; 4];
        buf.copy_to_slice(&mut reuse_guard);

        Ok(Self {
            leaf_index,
            generation,
            reuse_guard,
        })
    }
}

impl Serializer for SenderData {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.leaf_index.serialize(buf)?;
        buf.put_u32(self.generation);
        buf.put_slice(&self.reuse_guard);
        Ok(())
    }
}

/// [RFC9420 Sec.6.3.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3.2) Additional
/// authenticated data of the sender data encryption.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct SenderDataAAD {
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub content_type: ContentType,
}

impl Serializer for SenderDataAAD {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.group_id, buf)?;
        buf.put_u64(self.epoch);
        self.content_type.serialize(buf)
    }
}

fn ciphertext_sample(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    ciphertext: &[u8],
) -> Result<usize> {
    let nh = crypto_provider.hpke(cipher_suite)?.kdf_extract_size() as usize;
    Ok(nh.min(ciphertext.len()))
}

/// ```text
/// sender_data_key = ExpandWithLabel(sender_data_secret, "key", ciphertext_sample, AEAD.Nk)
/// ```
pub fn expand_sender_data_key(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    sender_data_secret: &[u8],
    ciphertext: &[u8],
) -> Result<Secret> {
    let sample = &ciphertext[..ciphertext_sample(crypto_provider, cipher_suite, ciphertext)?];
    let key_size = crypto_provider.hpke(cipher_suite)?.aead_key_size();
    crypto_provider.expand_with_label(cipher_suite, sender_data_secret, b"key", sample, key_size)
}

/// ```text
/// sender_data_nonce = ExpandWithLabel(sender_data_secret, "nonce", ciphertext_sample, AEAD.Nn)
/// ```
pub fn expand_sender_data_nonce(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    sender_data_secret: &[u8],
    ciphertext: &[u8],
) -> Result<Secret> {
    let sample = &ciphertext[..ciphertext_sample(crypto_provider, cipher_suite, ciphertext)?];
    let nonce_size = crypto_provider.hpke(cipher_suite)?.aead_nonce_size();
    crypto_provider.expand_with_label(
        cipher_suite,
        sender_data_secret,
        b"nonce",
        sample,
        nonce_size,
    )
}

pub(crate) fn encrypt_sender_data(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    sender_data_secret: &[u8],
    sender_data: &SenderData,
    content: &FramedContent,
    ciphertext: &[u8],
) -> Result<Bytes> {
    let key =
        expand_sender_data_key(crypto_provider, cipher_suite, sender_data_secret, ciphertext)?;
    let nonce =
        expand_sender_data_nonce(crypto_provider, cipher_suite, sender_data_secret, ciphertext)?;

    let aad = SenderDataAAD {
        group_id: content.group_id.clone(),
        epoch: content.epoch,
        content_type: content.content.content_type(),
    };

    crypto_provider.hpke(cipher_suite)?.aead_seal(
        &key,
        &nonce,
        &sender_data.serialize_detached()?,
        &aad.serialize_detached()?,
    )
}
