use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::framing::{
    encrypt_sender_data, expand_sender_data_key, expand_sender_data_nonce, AuthenticatedContent,
    Content, ContentType, FramedContent, FramedContentAuthData, MlsGroupId, ProtocolVersion,
    Sender, SenderData, SenderDataAAD, WireFormat,
};
use crate::mls::secret_tree::MessageKeys;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u64, serialize_opaque_vec, Deserializer, Serializer,
};

/// [RFC9420 Sec.6.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3) Authenticated and
/// encrypted messages are encoded using the `PrivateMessage` structure.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct PrivateMessage {
    pub(crate) group_id: MlsGroupId,
    pub(crate) epoch: u64,
    pub(crate) content_type: ContentType,
    pub(crate) authenticated_data: Bytes,
    pub(crate) encrypted_sender_data: Bytes,
    pub(crate) ciphertext: Bytes,
}

impl Deserializer for PrivateMessage {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        ProtocolVersion::deserialize(buf)?;
        let wire_format = WireFormat::deserialize(buf)?;
        if wire_format != WireFormat::PrivateMessage {
            return Err(Error::InvalidWireFormat(wire_format as u16));
        }

        let group_id = deserialize_opaque_vec(buf)?;
        let epoch = deserialize_u64(buf)?;
        let content_type = ContentType::deserialize(buf)?;
        let authenticated_data = deserialize_opaque_vec(buf)?;
        let encrypted_sender_data = deserialize_opaque_vec(buf)?;
        let ciphertext = deserialize_opaque_vec(buf)?;

        Ok(Self {
            group_id,
            epoch,
            content_type,
            authenticated_data,
            encrypted_sender_data,
            ciphertext,
        })
    }
}

impl Serializer for PrivateMessage {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        ProtocolVersion::MLS10.serialize(buf)?;
        WireFormat::PrivateMessage.serialize(buf)?;
        serialize_opaque_vec(&self.group_id, buf)?;
        buf.put_u64(self.epoch);
        self.content_type.serialize(buf)?;
        serialize_opaque_vec(&self.authenticated_data, buf)?;
        serialize_opaque_vec(&self.encrypted_sender_data, buf)?;
        serialize_opaque_vec(&self.ciphertext, buf)
    }
}

impl PrivateMessage {
    pub fn group_id(&self) -> &MlsGroupId {
        &self.group_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn authenticated_data(&self) -> &Bytes {
        &self.authenticated_data
    }

    /// Encrypts signed content under `keys`, then hides the sender behind the sender data key.
    pub(crate) fn encrypt(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        authenticated_content: &AuthenticatedContent,
        keys: &MessageKeys,
        sender_data: &SenderData,
        sender_data_secret: &[u8],
        padding_size: usize,
    ) -> Result<PrivateMessage> {
        let content = &authenticated_content.content;

        let ciphertext = encrypt_private_message_content(
            crypto_provider,
            cipher_suite,
            authenticated_content,
            keys,
            &sender_data.reuse_guard,
            padding_size,
        )?;
        let encrypted_sender_data = encrypt_sender_data(
            crypto_provider,
            cipher_suite,
            sender_data_secret,
            sender_data,
            content,
            &ciphertext,
        )?;

        Ok(PrivateMessage {
            group_id: content.group_id.clone(),
            epoch: content.epoch,
            content_type: content.content.content_type(),
            authenticated_data: content.authenticated_data.clone(),
            encrypted_sender_data,
            ciphertext,
        })
    }

    pub(crate) fn decrypt_sender_data(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        sender_data_secret: &[u8],
    ) -> Result<SenderData> {
        let key = expand_sender_data_key(
            crypto_provider,
            cipher_suite,
            sender_data_secret,
            &self.ciphertext,
        )?;
        let nonce = expand_sender_data_nonce(
            crypto_provider,
            cipher_suite,
            sender_data_secret,
            &self.ciphertext,
        )?;

        let aad = SenderDataAAD {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
        };
        let raw_aad = aad.serialize_detached()?;

        let raw_sender_data = crypto_provider
            .hpke(cipher_suite)?
            .aead_open(&key, &nonce, &self.encrypted_sender_data, &raw_aad)
            .map_err(|_| Error::SenderDataDecryptionFailed)?;

        SenderData::deserialize_exact(&raw_sender_data)
    }

    pub(crate) fn decrypt_content(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        keys: &MessageKeys,
        reuse_guard: &[u8],
    ) -> Result<PrivateMessageContent> {
        let nonce = apply_reuse_guard(&keys.nonce, reuse_guard)?;

        let aad = PrivateContentAAD {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
            authenticated_data: self.authenticated_data.clone(),
        };

        let raw_aad = aad.serialize_detached()?;
        let raw_content = crypto_provider
            .hpke(cipher_suite)?
            .aead_open(&keys.key, &nonce, &self.ciphertext, &raw_aad)
            .map_err(|_| Error::MessageDecryptionFailed)?;

        let mut buf = raw_content.as_ref();
        PrivateMessageContent::deserialize(&mut buf, self.content_type)
    }

    pub(crate) fn authenticated_content(
        &self,
        sender_data: &SenderData,
        content: PrivateMessageContent,
    ) -> AuthenticatedContent {
        AuthenticatedContent {
            wire_format: WireFormat::PrivateMessage,
            content: FramedContent {
                group_id: self.group_id.clone(),
                epoch: self.epoch,
                sender: Sender::Member(sender_data.leaf_index),
                authenticated_data: self.authenticated_data.clone(),
                content: content.content,
            },
            auth: content.auth,
        }
    }
}

/// [RFC9420 Sec.6.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3.1) Content to be
/// encrypted is encoded in a `PrivateMessageContent` structure.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct PrivateMessageContent {
    pub content: Content,
    pub auth: FramedContentAuthData,
}

impl PrivateMessageContent {
    fn deserialize<B>(buf: &mut B, ct: ContentType) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let content = Content::deserialize(buf, ct)?;
        let auth = FramedContentAuthData::deserialize(buf, ct)?;

        while buf.has_remaining() {
            if buf.get_u8() != 0 {
                return Err(Error::PaddingContainsNonZeroBytes);
            }
        }

        Ok(Self { content, auth })
    }

    fn serialize_padded(&self, padding_size: usize) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.content.serialize(&mut buf)?;
        self.auth
            .serialize(&mut buf, self.content.content_type())?;

        if padding_size > 0 {
            let remainder = buf.len() % padding_size;
            if remainder != 0 {
                buf.put_bytes(0, padding_size - remainder);
            }
        }

        Ok(buf.freeze())
    }
}

/// [RFC9420 Sec.6.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3.1) The Additional
/// Authenticated Data (AAD) input to the encryption contains an object of the following form,
/// with the values used to identify the key and nonce
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct PrivateContentAAD {
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub content_type: ContentType,
    pub authenticated_data: Bytes,
}

impl Serializer for PrivateContentAAD {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.group_id, buf)?;
        buf.put_u64(self.epoch);
        self.content_type.serialize(buf)?;
        serialize_opaque_vec(&self.authenticated_data, buf)
    }
}

/// XORs the reuse guard into the first bytes of the per-generation nonce.
fn apply_reuse_guard(nonce: &Secret, reuse_guard: &[u8]) -> Result<Secret> {
    let mut nonce = nonce.to_vec();
    if nonce.len() < reuse_guard.len() {
        return Err(Error::NonceAndReuseGuardLenNotMatch);
    }

    for (n, g) in nonce.iter_mut().zip(reuse_guard) {
        *n ^= g;
    }

    Ok(Secret::new(nonce))
}

fn encrypt_private_message_content(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    authenticated_content: &AuthenticatedContent,
    keys: &MessageKeys,
    reuse_guard: &[u8],
    padding_size: usize,
) -> Result<Bytes> {
    let content = &authenticated_content.content;
    let priv_content = PrivateMessageContent {
        content: content.content.clone(),
        auth: authenticated_content.auth.clone(),
    };

    let plaintext = priv_content.serialize_padded(padding_size)?;
    let nonce = apply_reuse_guard(&keys.nonce, reuse_guard)?;

    let aad = PrivateContentAAD {
        group_id: content.group_id.clone(),
        epoch: content.epoch,
        content_type: content.content.content_type(),
        authenticated_data: content.authenticated_data.clone(),
    };
    let raw_aad = aad.serialize_detached()?;

    crypto_provider
        .hpke(cipher_suite)?
        .aead_seal(&keys.key, &nonce, &plaintext, &raw_aad)
}
