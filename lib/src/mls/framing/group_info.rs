use bytes::{Buf, BufMut, Bytes};

use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::extensibility::{list::MlsExtension, ExtensionType, Extensions};
use crate::mls::identity::Identity;
use crate::mls::key_schedule::GroupContext;
use crate::mls::ratchet_tree::RatchetTree;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_optional, serialize_opaque_vec, serialize_optional,
    Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

const LABEL_GROUP_INFO_TBS: &[u8] = b"GroupInfoTBS";

/// [RFC9420 Sec.12.4.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3) Information
/// about the group a new member needs to join, signed by the member that added it.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct GroupInfo {
    pub(crate) group_context: GroupContext,
    pub(crate) extensions: Extensions,
    pub(crate) confirmation_tag: Bytes,
    pub(crate) signer: LeafIndex,
    pub(crate) signature: Bytes,
}

impl GroupInfo {
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        signer_identity: &Identity,
        group_context: GroupContext,
        extensions: Extensions,
        confirmation_tag: Bytes,
        signer: LeafIndex,
    ) -> Result<Self> {
        let mut group_info = Self {
            group_context,
            extensions,
            confirmation_tag,
            signer,
            signature: Bytes::new(),
        };

        group_info.signature = signer_identity.sign_with_label(
            crypto_provider,
            LABEL_GROUP_INFO_TBS,
            &group_info.tbs()?,
        )?;

        Ok(group_info)
    }

    pub(crate) fn verify_signature(
        &self,
        crypto_provider: &impl CryptoProvider,
        verify_key: &[u8],
    ) -> Result<()> {
        crypto_provider
            .verify_with_label(
                self.group_context.cipher_suite,
                verify_key,
                LABEL_GROUP_INFO_TBS,
                &self.tbs()?,
                &self.signature,
            )
            .map_err(|_| Error::InvalidGroupInfoSignature)
    }

    /// The ratchet tree carried in the `ratchet_tree` extension, if present.
    pub(crate) fn ratchet_tree(&self) -> Result<Option<RatchetTree>> {
        let Some(extension) = self.extensions.find_extension(ExtensionType::RatchetTree) else {
            return Ok(None);
        };

        let MlsExtension::RatchetTree(ext) = MlsExtension::decode_extension(extension.clone())?;
        Ok(Some(ext.ratchet_tree))
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.group_context.cipher_suite
    }

    fn tbs(&self) -> Result<Bytes> {
        let mut buf = bytes::BytesMut::new();
        self.group_context.serialize(&mut buf)?;
        self.extensions.serialize(&mut buf)?;
        serialize_opaque_vec(&self.confirmation_tag, &mut buf)?;
        self.signer.serialize(&mut buf)?;
        Ok(buf.freeze())
    }
}

impl Deserializer for GroupInfo {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let group_context = GroupContext::deserialize(buf)?;
        let extensions = Extensions::deserialize(buf)?;
        let confirmation_tag = deserialize_opaque_vec(buf)?;
        let signer = LeafIndex::deserialize(buf)?;
        let signature = deserialize_opaque_vec(buf)?;

        Ok(Self {
            group_context,
            extensions,
            confirmation_tag,
            signer,
            signature,
        })
    }
}

impl Serializer for GroupInfo {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.group_context.serialize(buf)?;
        self.extensions.serialize(buf)?;
        serialize_opaque_vec(&self.confirmation_tag, buf)?;
        self.signer.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}

/// [RFC9420 Sec.12.4.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3) Secrets
/// encrypted to each new member: the joiner secret, and the path secret of the lowest node the
/// new member shares with the committer.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct GroupSecrets {
    pub(crate) joiner_secret: Secret,
    pub(crate) path_secret: Option<Secret>,
}

impl Deserializer for GroupSecrets {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let joiner_secret = Secret::deserialize(buf)?;
        let path_secret = if deserialize_optional(buf)? {
            Some(Secret::deserialize(buf)?)
        } else {
            None
        };

        Ok(Self {
            joiner_secret,
            path_secret,
        })
    }
}

impl Serializer for GroupSecrets {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.joiner_secret.serialize(buf)?;
        serialize_optional(self.path_secret.is_some(), buf)?;
        if let Some(path_secret) = &self.path_secret {
            path_secret.serialize(buf)?;
        }
        Ok(())
    }
}
