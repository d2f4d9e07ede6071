//! A member's long-term identity: a credential bound to a signing key pair.
//!
//! The private signing key never leaves this type. Everything signed on a member's behalf
//! (leaf nodes, key packages, framed content, group infos) goes through
//! [`Identity::sign_with_label`].

use bytes::Bytes;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::credential::Credential;
use crate::mls::crypto::key_pair::SignatureKeyPair;
use crate::mls::crypto::provider::{ensure_supported, CryptoProvider};
use crate::mls::crypto::SignaturePublicKey;
use crate::mls::key_package::KeyPackage;
use crate::mls::utilities::error::Result;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Identity {
    credential: Credential,
    signer: SignatureKeyPair,
    cipher_suite: CipherSuite,
}

impl Identity {
    /// Generates a signing key pair for `cipher_suite` and binds it to a basic credential
    /// carrying `name`.
    pub fn new(
        crypto_provider: &impl CryptoProvider,
        name: impl Into<Bytes>,
        cipher_suite: CipherSuite,
    ) -> Result<Self> {
        ensure_supported(crypto_provider, cipher_suite)?;
        let signer = crypto_provider
            .signature(cipher_suite)?
            .signature_key_pair()?;

        Ok(Self {
            credential: Credential::basic(name),
            signer,
            cipher_suite,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    pub fn signature_public_key(&self) -> &SignaturePublicKey {
        self.signer.public_key()
    }

    /// [RFC9420 Sec.5.1.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.1.2)
    /// `SignWithLabel` under this identity's private key.
    pub(crate) fn sign_with_label(
        &self,
        crypto_provider: &impl CryptoProvider,
        label: &[u8],
        content: &[u8],
    ) -> Result<Bytes> {
        crypto_provider.sign_with_label(
            self.cipher_suite,
            self.signer.private_key(),
            label,
            content,
        )
    }

    /// A fresh key package for this identity with the default lifetime.
    pub fn create_key_package(&self, crypto_provider: &impl CryptoProvider) -> Result<KeyPackage> {
        KeyPackage::new(crypto_provider, self)
    }
}
