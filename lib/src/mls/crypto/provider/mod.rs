//! The ciphersuite provider seam. The protocol never touches a primitive directly: it asks a
//! [`CryptoProvider`] for the [`Hash`], [`Hpke`] and [`Signature`] implementations of a
//! [`CipherSuite`], and composes them through the labelled operations of
//! [RFC9420 Sec.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-5).

mod key_store;
mod rust;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

pub use self::key_store::{KeyStore, MemoryKeyStore};
pub use self::rust::RustCryptoProvider;
pub use super::{Aead, Kdf, Kem};

use super::cipher_suite::CipherSuite;
use super::key_pair::{HPKEKeyPair, SignatureKeyPair};
use super::Secret;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::serialize_opaque_vec;

const MLS_LABEL_PREFIX: &[u8] = b"MLS 1.0 ";

#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub enum HashScheme {
    #[default]
    SHA256,
}

/// [RFC9420 Sec.17.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-17.1) signature
/// schemes, numbered as in the TLS `SignatureScheme` registry.
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum SignatureScheme {
    #[default]
    ED25519 = 0x0807,
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub struct HpkeSuite {
    pub kem: Kem,
    pub kdf: Kdf,
    pub aead: Aead,
}

pub trait Hash: Send + Sync {
    fn size(&self) -> usize;

    fn digest(&self, data: &[u8]) -> Bytes;

    fn mac(&self, key: &[u8], message: &[u8]) -> Result<Bytes>;
}

pub trait Hpke: Send + Sync {
    fn hpke_suite(&self) -> HpkeSuite;

    fn kem_derive_key_pair(&self, ikm: &[u8]) -> Result<HPKEKeyPair>;

    fn kdf_expand(&self, secret: &[u8], info: &[u8], length: u16) -> Result<Secret>;

    fn kdf_extract(&self, secret: &[u8], salt: &[u8]) -> Result<Secret>;

    fn kdf_extract_size(&self) -> u16;

    fn aead_key_size(&self) -> u16;

    fn aead_nonce_size(&self) -> u16;

    fn aead_open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes>;

    fn aead_seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes>;

    /// HPKE base mode single-shot encryption. Returns `(kem_output, ciphertext)`.
    fn hpke_seal(
        &self,
        public_key: &[u8],
        info: &[u8],
        additional_data: &[u8],
        plaintext: &[u8],
    ) -> Result<(Bytes, Bytes)>;

    /// HPKE base mode single-shot decryption.
    fn hpke_open(
        &self,
        private_key: &[u8],
        kem_output: &[u8],
        info: &[u8],
        additional_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Secret>;
}

pub trait Signature: Send + Sync {
    fn signature_key_pair(&self) -> Result<SignatureKeyPair>;

    fn signature_scheme(&self) -> SignatureScheme;

    fn sign(&self, sign_key: &[u8], message: &[u8]) -> Result<Bytes>;

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()>;
}

/// Supplies the primitives of every cipher suite it supports, plus the key store that keeps
/// private keys of key packages until they are consumed.
pub trait CryptoProvider {
    fn supports(&self, cipher_suite: CipherSuite) -> bool;

    fn supported(&self) -> Vec<CipherSuite>;

    fn key_store(&self) -> &dyn KeyStore;

    fn hash(&self, cipher_suite: CipherSuite) -> Result<&dyn Hash>;

    fn hpke(&self, cipher_suite: CipherSuite) -> Result<&dyn Hpke>;

    fn signature(&self, cipher_suite: CipherSuite) -> Result<&dyn Signature>;

    /// ```text
    /// RefHash(label, value) = Hash(RefHashInput)
    /// ```
    fn ref_hash(&self, cipher_suite: CipherSuite, label: &[u8], value: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        serialize_opaque_vec(label, &mut buf)?;
        serialize_opaque_vec(value, &mut buf)?;

        Ok(self.hash(cipher_suite)?.digest(&buf))
    }

    /// ```text
    /// ExpandWithLabel(Secret, Label, Context, Length) =
    ///     KDF.Expand(Secret, KDFLabel, Length)
    /// ```
    fn expand_with_label(
        &self,
        cipher_suite: CipherSuite,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        length: u16,
    ) -> Result<Secret> {
        let mut kdf_label = BytesMut::new();
        kdf_label.put_u16(length);
        serialize_opaque_vec(&[MLS_LABEL_PREFIX, label].concat(), &mut kdf_label)?;
        serialize_opaque_vec(context, &mut kdf_label)?;

        self.hpke(cipher_suite)?
            .kdf_expand(secret, &kdf_label, length)
    }

    /// ```text
    /// DeriveSecret(Secret, Label) = ExpandWithLabel(Secret, Label, "", KDF.Nh)
    /// ```
    fn derive_secret(
        &self,
        cipher_suite: CipherSuite,
        secret: &[u8],
        label: &[u8],
    ) -> Result<Secret> {
        let length = self.hpke(cipher_suite)?.kdf_extract_size();
        self.expand_with_label(cipher_suite, secret, label, &[], length)
    }

    fn sign_with_label(
        &self,
        cipher_suite: CipherSuite,
        sign_key: &[u8],
        label: &[u8],
        content: &[u8],
    ) -> Result<Bytes> {
        let sign_content = sign_content(label, content)?;
        self.signature(cipher_suite)?.sign(sign_key, &sign_content)
    }

    fn verify_with_label(
        &self,
        cipher_suite: CipherSuite,
        verify_key: &[u8],
        label: &[u8],
        content: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let sign_content = sign_content(label, content)?;
        self.signature(cipher_suite)?
            .verify(verify_key, &sign_content, signature)
    }

    /// HPKE encryption with the `EncryptContext` of the given label as `info`.
    fn encrypt_with_label(
        &self,
        cipher_suite: CipherSuite,
        public_key: &[u8],
        label: &[u8],
        context: &[u8],
        plaintext: &[u8],
    ) -> Result<(Bytes, Bytes)> {
        let encrypt_context = encrypt_context(label, context)?;
        self.hpke(cipher_suite)?
            .hpke_seal(public_key, &encrypt_context, &[], plaintext)
    }

    fn decrypt_with_label(
        &self,
        cipher_suite: CipherSuite,
        private_key: &[u8],
        label: &[u8],
        context: &[u8],
        kem_output: &[u8],
        ciphertext: &[u8],
    ) -> Result<Secret> {
        let encrypt_context = encrypt_context(label, context)?;
        self.hpke(cipher_suite)?
            .hpke_open(private_key, kem_output, &encrypt_context, &[], ciphertext)
    }

    fn sign_mac(&self, cipher_suite: CipherSuite, key: &[u8], message: &[u8]) -> Result<Bytes> {
        self.hash(cipher_suite)?.mac(key, message)
    }

    /// Recomputes the MAC and compares it to `tag` in constant time.
    fn verify_mac(
        &self,
        cipher_suite: CipherSuite,
        key: &[u8],
        message: &[u8],
        tag: &[u8],
    ) -> Result<bool> {
        let expected = self.sign_mac(cipher_suite, key, message)?;
        Ok(expected.as_ref().ct_eq(tag).into())
    }

    /// ```text
    /// node_priv, node_pub = KEM.DeriveKeyPair(DeriveSecret(path_secret, "node"))
    /// ```
    fn derive_node_key_pair(
        &self,
        cipher_suite: CipherSuite,
        path_secret: &[u8],
    ) -> Result<HPKEKeyPair> {
        let node_secret = self.derive_secret(cipher_suite, path_secret, b"node")?;
        self.hpke(cipher_suite)?.kem_derive_key_pair(&node_secret)
    }

    /// A fresh HPKE key pair from the system CSPRNG.
    fn generate_hpke_key_pair(&self, cipher_suite: CipherSuite) -> Result<HPKEKeyPair> {
        let hpke = self.hpke(cipher_suite)?;
        let ikm = Secret::random(hpke.kdf_extract_size() as usize);
        hpke.kem_derive_key_pair(&ikm)
    }
}

fn sign_content(label: &[u8], content: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    serialize_opaque_vec(&[MLS_LABEL_PREFIX, label].concat(), &mut buf)?;
    serialize_opaque_vec(content, &mut buf)?;
    Ok(buf.freeze())
}

fn encrypt_context(label: &[u8], context: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    serialize_opaque_vec(&[MLS_LABEL_PREFIX, label].concat(), &mut buf)?;
    serialize_opaque_vec(context, &mut buf)?;
    Ok(buf.freeze())
}

/// Fails with [`Error::UnsupportedCipherSuite`] unless `provider` can run `cipher_suite`.
pub fn ensure_supported(provider: &impl CryptoProvider, cipher_suite: CipherSuite) -> Result<()> {
    if provider.supports(cipher_suite) {
        Ok(())
    } else {
        Err(Error::UnsupportedCipherSuite(cipher_suite))
    }
}
