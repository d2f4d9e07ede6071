use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::mls::crypto::provider::{Hash, HashScheme};
use crate::mls::utilities::error::Result;

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct HashSchemeWrapper(pub(super) HashScheme);

fn sha2_digest<D: Digest>(data: &[u8]) -> Bytes {
    Bytes::from(D::digest(data).to_vec())
}

fn hmac_tag<M: Mac + hmac::digest::KeyInit>(key: &[u8], message: &[u8]) -> Result<Bytes> {
    let mut mac = <M as Mac>::new_from_slice(key)?;
    mac.update(message);
    Ok(Bytes::from(mac.finalize().into_bytes().to_vec()))
}

impl Hash for HashSchemeWrapper {
    fn size(&self) -> usize {
        match self.0 {
            HashScheme::SHA256 => <Sha256 as Digest>::output_size(),
        }
    }

    fn digest(&self, data: &[u8]) -> Bytes {
        match self.0 {
            HashScheme::SHA256 => sha2_digest::<Sha256>(data),
        }
    }

    fn mac(&self, key: &[u8], message: &[u8]) -> Result<Bytes> {
        match self.0 {
            HashScheme::SHA256 => hmac_tag::<Hmac<Sha256>>(key, message),
        }
    }
}
