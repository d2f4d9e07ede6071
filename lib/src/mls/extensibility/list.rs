//! MLS handles extensions in serialized forms (see [`super::Extension`] and [`super::Extensions`]).
//!
//! We therefore keep a separate enum of the non-serialized forms of every extension we understand,
//! with ways to convert between one another

use super::{Extension, ExtensionType, Extensions};
use crate::mls::{
    ratchet_tree::RatchetTree,
    utilities::{
        error::{Error, Result},
        serde::{Deserializer, Serializer},
    },
};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MlsExtension {
    RatchetTree(super::RatchetTreeExtension),
}

impl MlsExtension {
    pub(crate) fn encode_extension(&self) -> Result<Extension> {
        match self {
            MlsExtension::RatchetTree(ratchet_tree_extension) => Ok(Extension {
                extension_type: ExtensionType::RatchetTree,
                extension_data: ratchet_tree_extension.ratchet_tree.serialize_detached()?,
            }),
        }
    }

    pub(crate) fn decode_extension(extension: Extension) -> Result<Self> {
        match extension.extension_type {
            ExtensionType::RatchetTree => Ok(Self::RatchetTree(super::RatchetTreeExtension {
                ratchet_tree: RatchetTree::deserialize_exact(extension.extension_data)?,
            })),
            other => Err(Error::UnsupportedExtension(other.into())),
        }
    }
}

impl TryFrom<Vec<MlsExtension>> for Extensions {
    type Error = Error;

    fn try_from(value: Vec<MlsExtension>) -> std::result::Result<Self, Self::Error> {
        let extensions = value
            .iter()
            .map(MlsExtension::encode_extension)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self(extensions))
    }
}
