use bytes::{Buf, BufMut, Bytes};

use crate::mls::framing::commit::Commit;
use crate::mls::framing::{
    AuthenticatedContent, Content, FramedContent, FramedContentAuthData, ProtocolVersion, Sender,
    WireFormat,
};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, serialize_opaque_vec, Deserializer, Serializer,
};

/// [RFC9420 Sec.6.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.2) Messages that are
/// authenticated but not encrypted. Commits are sent this way so that every member can check
/// them before processing.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct PublicMessage {
    pub(crate) content: FramedContent,
    pub(crate) auth: FramedContentAuthData,
    pub(crate) membership_tag: Bytes,
}

impl PublicMessage {
    pub(crate) fn new(authenticated_content: AuthenticatedContent, membership_tag: Bytes) -> Self {
        Self {
            content: authenticated_content.content,
            auth: authenticated_content.auth,
            membership_tag,
        }
    }

    pub(crate) fn authenticated_content(&self) -> AuthenticatedContent {
        AuthenticatedContent {
            wire_format: WireFormat::PublicMessage,
            content: self.content.clone(),
            auth: self.auth.clone(),
        }
    }

    pub fn group_id(&self) -> &Bytes {
        &self.content.group_id
    }

    pub fn epoch(&self) -> u64 {
        self.content.epoch
    }

    pub fn sender(&self) -> Sender {
        self.content.sender
    }

    /// The commit carried by this message, if it is one.
    pub fn commit(&self) -> Option<&Commit> {
        match &self.content.content {
            Content::Commit(commit) => Some(commit),
            _ => None,
        }
    }
}

impl Deserializer for PublicMessage {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        ProtocolVersion::deserialize(buf)?;
        let wire_format = WireFormat::deserialize(buf)?;
        if wire_format != WireFormat::PublicMessage {
            return Err(Error::InvalidWireFormat(wire_format as u16));
        }

        let content = FramedContent::deserialize(buf)?;
        let auth = FramedContentAuthData::deserialize(buf, content.content.content_type())?;
        let membership_tag = deserialize_opaque_vec(buf)?;

        Ok(Self {
            content,
            auth,
            membership_tag,
        })
    }
}

impl Serializer for PublicMessage {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        ProtocolVersion::MLS10.serialize(buf)?;
        WireFormat::PublicMessage.serialize(buf)?;
        self.content.serialize(buf)?;
        self.auth
            .serialize(buf, self.content.content.content_type())?;
        serialize_opaque_vec(&self.membership_tag, buf)
    }
}
