//! [RFC9420 Sec.13](https://www.rfc-editor.org/rfc/rfc9420.html#section-13) Extensibility

pub mod list;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::ratchet_tree::RatchetTree;
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u16, deserialize_vector, serialize_opaque_vec,
    serialize_vector, Deserializer, Serializer,
};

/// [RFC9420 Sec.17.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-17.3) Extension types
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExtensionType {
    #[default]
    ApplicationId,
    RatchetTree,
    RequiredCapabilities,
    ExternalPub,
    ExternalSenders,
    Unknown(u16),
}

impl From<u16> for ExtensionType {
    fn from(v: u16) -> Self {
        match v {
            0x0001 => ExtensionType::ApplicationId,
            0x0002 => ExtensionType::RatchetTree,
            0x0003 => ExtensionType::RequiredCapabilities,
            0x0004 => ExtensionType::ExternalPub,
            0x0005 => ExtensionType::ExternalSenders,
            _ => ExtensionType::Unknown(v),
        }
    }
}

impl From<ExtensionType> for u16 {
    fn from(val: ExtensionType) -> u16 {
        match val {
            ExtensionType::ApplicationId => 0x0001,
            ExtensionType::RatchetTree => 0x0002,
            ExtensionType::RequiredCapabilities => 0x0003,
            ExtensionType::ExternalPub => 0x0004,
            ExtensionType::ExternalSenders => 0x0005,
            ExtensionType::Unknown(v) => v,
        }
    }
}

impl Deserializer for ExtensionType {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(deserialize_u16(buf)?.into())
    }
}

impl Serializer for ExtensionType {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16((*self).into());
        Ok(())
    }
}

/// An extension in its serialized form.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub extension_data: Bytes,
}

impl Deserializer for Extension {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let extension_type = ExtensionType::deserialize(buf)?;
        let extension_data = deserialize_opaque_vec(buf)?;

        Ok(Self {
            extension_type,
            extension_data,
        })
    }
}

impl Serializer for Extension {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.extension_type.serialize(buf)?;
        serialize_opaque_vec(&self.extension_data, buf)
    }
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Extensions(pub(crate) Vec<Extension>);

impl Extensions {
    pub fn new(extensions: Vec<Extension>) -> Self {
        Self(extensions)
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.0
    }

    pub fn find_extension(&self, extension_type: ExtensionType) -> Option<&Extension> {
        self.0
            .iter()
            .find(|ext| ext.extension_type == extension_type)
    }

    pub fn find_extension_data(&self, extension_type: ExtensionType) -> Option<&Bytes> {
        self.find_extension(extension_type)
            .map(|ext| &ext.extension_data)
    }
}

impl Deserializer for Extensions {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut extensions = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            extensions.push(Extension::deserialize(b)?);
            Ok(())
        })?;

        Ok(Self(extensions))
    }
}

impl Serializer for Extensions {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.0.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.0[i].serialize(b) },
        )
    }
}

/// [RFC9420 Sec.12.4.3.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.3) The full
/// ratchet tree, carried in a `GroupInfo` so joiners do not need it out of band.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RatchetTreeExtension {
    pub ratchet_tree: RatchetTree,
}

impl RatchetTreeExtension {
    pub fn new(ratchet_tree: RatchetTree) -> Self {
        Self { ratchet_tree }
    }
}
