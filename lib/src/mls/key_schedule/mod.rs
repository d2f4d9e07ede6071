//! [RFC9420 Sec.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-8) Key Schedule
//!
//! ```text
//!                      init_secret_[n-1]
//!                            |
//!                            V
//!       commit_secret --> KDF.Extract
//!                            |
//!                            V
//!                    ExpandWithLabel(., "joiner", GroupContext_[n], KDF.Nh)
//!                            |
//!                            V
//!                       joiner_secret
//!                            |
//!                            V
//! psk_secret (or 0) --> KDF.Extract
//!                            |
//!                            +--> DeriveSecret(., "welcome")
//!                            |    = welcome_secret
//!                            V
//!                    ExpandWithLabel(., "epoch", GroupContext_[n], KDF.Nh)
//!                            |
//!                            V
//!                       epoch_secret
//! ```
//!
//! Pre-shared keys are not supported, so `psk_secret` is always the all-zero string.


use bytes::{Buf, BufMut, Bytes};

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::crypto::Secret;
use crate::mls::extensibility::Extensions;
use crate::mls::framing::{FramedContent, MlsGroupId, ProtocolVersion, WireFormat};
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u64, serialize_opaque_vec, Deserializer, Serializer,
};

pub const SECRET_LABEL_SENDER_DATA: &[u8] = b"sender data";
pub const SECRET_LABEL_ENCRYPTION: &[u8] = b"encryption";
pub const SECRET_LABEL_EXPORTER: &[u8] = b"exporter";
pub const SECRET_LABEL_CONFIRM: &[u8] = b"confirm";
pub const SECRET_LABEL_MEMBERSHIP: &[u8] = b"membership";
pub const SECRET_LABEL_AUTHENTICATION: &[u8] = b"authentication";
pub const SECRET_LABEL_INIT: &[u8] = b"init";

const LABEL_JOINER: &[u8] = b"joiner";
const LABEL_EPOCH: &[u8] = b"epoch";
const LABEL_WELCOME: &[u8] = b"welcome";
const LABEL_EXPORTED: &[u8] = b"exported";

/// [RFC9420 Sec.8.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.1) Group Context
///
/// Summarizes the state of the group and is mixed into every key derived for an epoch.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct GroupContext {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub tree_hash: Bytes,
    pub confirmed_transcript_hash: Bytes,
    pub extensions: Extensions,
}

impl Deserializer for GroupContext {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let version = ProtocolVersion::deserialize(buf)?;
        let cipher_suite = CipherSuite::deserialize(buf)?;
        let group_id = deserialize_opaque_vec(buf)?;
        let epoch = deserialize_u64(buf)?;
        let tree_hash = deserialize_opaque_vec(buf)?;
        let confirmed_transcript_hash = deserialize_opaque_vec(buf)?;
        let extensions = Extensions::deserialize(buf)?;

        Ok(Self {
            version,
            cipher_suite,
            group_id,
            epoch,
            tree_hash,
            confirmed_transcript_hash,
            extensions,
        })
    }
}

impl Serializer for GroupContext {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.version.serialize(buf)?;
        self.cipher_suite.serialize(buf)?;
        serialize_opaque_vec(&self.group_id, buf)?;
        buf.put_u64(self.epoch);
        serialize_opaque_vec(&self.tree_hash, buf)?;
        serialize_opaque_vec(&self.confirmed_transcript_hash, buf)?;
        self.extensions.serialize(buf)
    }
}

impl GroupContext {
    pub(crate) fn extract_joiner_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        prev_init_secret: &[u8],
        commit_secret: &[u8],
    ) -> Result<Secret> {
        let hpke = crypto_provider.hpke(self.cipher_suite)?;
        let extracted = hpke.kdf_extract(commit_secret, prev_init_secret)?;
        let raw_group_context = self.serialize_detached()?;

        crypto_provider.expand_with_label(
            self.cipher_suite,
            &extracted,
            LABEL_JOINER,
            &raw_group_context,
            hpke.kdf_extract_size(),
        )
    }

    pub(crate) fn extract_epoch_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        joiner_secret: &[u8],
    ) -> Result<Secret> {
        let hpke = crypto_provider.hpke(self.cipher_suite)?;
        let psk_secret = Secret::zero(hpke.kdf_extract_size() as usize);
        let extracted = hpke.kdf_extract(&psk_secret, joiner_secret)?;
        let raw_group_context = self.serialize_detached()?;

        crypto_provider.expand_with_label(
            self.cipher_suite,
            &extracted,
            LABEL_EPOCH,
            &raw_group_context,
            hpke.kdf_extract_size(),
        )
    }
}

pub(crate) fn extract_welcome_secret(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    joiner_secret: &[u8],
) -> Result<Secret> {
    let hpke = crypto_provider.hpke(cipher_suite)?;
    let psk_secret = Secret::zero(hpke.kdf_extract_size() as usize);
    let extracted = hpke.kdf_extract(&psk_secret, joiner_secret)?;

    crypto_provider.derive_secret(cipher_suite, &extracted, LABEL_WELCOME)
}

/// [RFC9420 Sec.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-8) The secrets derived
/// from an epoch secret.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub(crate) struct EpochSecrets {
    pub(crate) sender_data_secret: Secret,
    pub(crate) encryption_secret: Secret,
    pub(crate) exporter_secret: Secret,
    pub(crate) confirmation_key: Secret,
    pub(crate) membership_key: Secret,
    pub(crate) init_secret: Secret,
    pub(crate) epoch_authenticator: Secret,
}

impl EpochSecrets {
    pub(crate) fn derive(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        epoch_secret: &[u8],
    ) -> Result<Self> {
        let derive =
            |label: &[u8]| crypto_provider.derive_secret(cipher_suite, epoch_secret, label);

        Ok(Self {
            sender_data_secret: derive(SECRET_LABEL_SENDER_DATA)?,
            encryption_secret: derive(SECRET_LABEL_ENCRYPTION)?,
            exporter_secret: derive(SECRET_LABEL_EXPORTER)?,
            confirmation_key: derive(SECRET_LABEL_CONFIRM)?,
            membership_key: derive(SECRET_LABEL_MEMBERSHIP)?,
            init_secret: derive(SECRET_LABEL_INIT)?,
            epoch_authenticator: derive(SECRET_LABEL_AUTHENTICATION)?,
        })
    }

    /// [RFC9420 Sec.8.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.5) Exporters
    ///
    /// ```text
    /// MLS-Exporter(Label, Context, Length) =
    ///        ExpandWithLabel(DeriveSecret(exporter_secret, Label),
    ///                          "exported", Hash(Context), Length)
    /// ```
    pub(crate) fn export_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        label: &[u8],
        context: &[u8],
        length: u16,
    ) -> Result<Secret> {
        let derived = crypto_provider.derive_secret(cipher_suite, &self.exporter_secret, label)?;
        let context_hash = crypto_provider.hash(cipher_suite)?.digest(context);

        crypto_provider.expand_with_label(
            cipher_suite,
            &derived,
            LABEL_EXPORTED,
            &context_hash,
            length,
        )
    }
}

/// [RFC9420 Sec.8.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.2) Transcript Hashes
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct ConfirmedTranscriptHashInput {
    pub wire_format: WireFormat,
    pub content: FramedContent,
    pub signature: Bytes,
}

impl Serializer for ConfirmedTranscriptHashInput {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.wire_format.serialize(buf)?;
        self.content.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}

impl ConfirmedTranscriptHashInput {
    /// `Hash(interim_transcript_hash_[epoch - 1] || ConfirmedTranscriptHashInput_[epoch])`
    pub fn hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        interim_transcript_hash_before: &[u8],
    ) -> Result<Bytes> {
        let mut buf = interim_transcript_hash_before.to_vec();
        self.serialize(&mut buf)?;
        Ok(crypto_provider.hash(cipher_suite)?.digest(&buf))
    }
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct InterimTranscriptHashInput {
    pub confirmation_tag: Bytes,
}

impl Serializer for InterimTranscriptHashInput {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.confirmation_tag, buf)
    }
}

impl InterimTranscriptHashInput {
    /// `Hash(confirmed_transcript_hash_[epoch] || InterimTranscriptHashInput_[epoch])`
    pub fn hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        confirmed_transcript_hash: &[u8],
    ) -> Result<Bytes> {
        let mut buf = confirmed_transcript_hash.to_vec();
        self.serialize(&mut buf)?;
        Ok(crypto_provider.hash(cipher_suite)?.digest(&buf))
    }
}
