use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::framing::group_info::{GroupInfo, GroupSecrets};
use crate::mls::key_package::KeyPackageRef;
use crate::mls::key_schedule::extract_welcome_secret;
use crate::mls::ratchet_tree::HPKECiphertext;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_vector, serialize_opaque_vec, serialize_vector,
    Deserializer, Serializer,
};

const LABEL_WELCOME: &[u8] = b"Welcome";

/// [RFC9420 Sec.12.4.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1) Joining
/// via a Welcome message.
///
/// The group info is encrypted once under the welcome secret; the group secrets are encrypted to
/// the init key of each new member's key package.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Welcome {
    pub(crate) cipher_suite: CipherSuite,
    pub(crate) secrets: Vec<EncryptedGroupSecrets>,
    pub(crate) encrypted_group_info: Bytes,
}

impl Deserializer for Welcome {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let cipher_suite = CipherSuite::deserialize(buf)?;

        let mut secrets = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            secrets.push(EncryptedGroupSecrets::deserialize(b)?);
            Ok(())
        })?;

        let encrypted_group_info = deserialize_opaque_vec(buf)?;

        Ok(Self {
            cipher_suite,
            secrets,
            encrypted_group_info,
        })
    }
}

impl Serializer for Welcome {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.cipher_suite.serialize(buf)?;
        serialize_vector(
            self.secrets.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.secrets[i].serialize(b) },
        )?;
        serialize_opaque_vec(&self.encrypted_group_info, buf)
    }
}

impl Welcome {
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// Return the encrypted group secrets in this Welcome message.
    pub fn secrets(&self) -> &[EncryptedGroupSecrets] {
        self.secrets.as_ref()
    }

    /// Find `EncryptedGroupSecrets` based on a `KeyPackageRef`
    pub fn find_secret(&self, r: &KeyPackageRef) -> Option<&EncryptedGroupSecrets> {
        self.secrets.iter().find(|sec| &sec.new_member == r)
    }

    /// Merges welcomes produced by the same commit into one message addressed to every new member.
    pub fn combine(welcomes: Vec<Welcome>) -> Result<Welcome> {
        let mut welcomes = welcomes.into_iter();
        let Some(mut combined) = welcomes.next() else {
            return Err(Error::WelcomeMismatch);
        };

        for welcome in welcomes {
            if welcome.cipher_suite != combined.cipher_suite
                || welcome.encrypted_group_info != combined.encrypted_group_info
            {
                return Err(Error::WelcomeMismatch);
            }
            combined.secrets.extend(welcome.secrets);
        }

        Ok(combined)
    }

    /// Encrypts `group_secrets` to the init key of the member referenced by `new_member`.
    pub(crate) fn encrypt_group_secrets(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        new_member: KeyPackageRef,
        init_key: &[u8],
        encrypted_group_info: &[u8],
        group_secrets: &GroupSecrets,
    ) -> Result<EncryptedGroupSecrets> {
        let (kem_output, ciphertext) = crypto_provider.encrypt_with_label(
            cipher_suite,
            init_key,
            LABEL_WELCOME,
            encrypted_group_info,
            &group_secrets.serialize_detached()?,
        )?;

        Ok(EncryptedGroupSecrets::new(
            new_member,
            HPKECiphertext {
                kem_output,
                ciphertext,
            },
        ))
    }

    pub(crate) fn decrypt_group_secrets(
        &self,
        crypto_provider: &impl CryptoProvider,
        r: &KeyPackageRef,
        init_key_priv: &[u8],
    ) -> Result<GroupSecrets> {
        if let Some(sec) = self.find_secret(r) {
            let raw_group_secrets = crypto_provider
                .decrypt_with_label(
                    self.cipher_suite,
                    init_key_priv,
                    LABEL_WELCOME,
                    &self.encrypted_group_info,
                    &sec.encrypted_group_secrets.kem_output,
                    &sec.encrypted_group_secrets.ciphertext,
                )
                .map_err(|_| Error::WelcomeDecryptionFailed)?;

            GroupSecrets::deserialize_exact(raw_group_secrets.as_bytes())
        } else {
            Err(Error::EncryptedGroupSecretsNotFoundForProvidedKeyPackageRef)
        }
    }

    pub(crate) fn extract_key_and_nonce(
        welcome_secret: &[u8],
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<(Secret, Secret)> {
        let aead_nonce_size = crypto_provider.hpke(cipher_suite)?.aead_nonce_size();
        let welcome_nonce = crypto_provider.expand_with_label(
            cipher_suite,
            welcome_secret,
            b"nonce",
            &[],
            aead_nonce_size,
        )?;

        let aead_key_size = crypto_provider.hpke(cipher_suite)?.aead_key_size();
        let welcome_key = crypto_provider.expand_with_label(
            cipher_suite,
            welcome_secret,
            b"key",
            &[],
            aead_key_size,
        )?;

        Ok((welcome_key, welcome_nonce))
    }

    /// Encrypts a group info under the welcome key derived from `joiner_secret`.
    pub(crate) fn encrypt_group_info(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        joiner_secret: &[u8],
        group_info: &GroupInfo,
    ) -> Result<Bytes> {
        let welcome_secret = extract_welcome_secret(crypto_provider, cipher_suite, joiner_secret)?;
        let (welcome_key, welcome_nonce) =
            Self::extract_key_and_nonce(&welcome_secret, crypto_provider, cipher_suite)?;

        crypto_provider.hpke(cipher_suite)?.aead_seal(
            &welcome_key,
            &welcome_nonce,
            &group_info.serialize_detached()?,
            &[],
        )
    }

    pub(crate) fn decrypt_group_info(
        &self,
        crypto_provider: &impl CryptoProvider,
        joiner_secret: &[u8],
    ) -> Result<GroupInfo> {
        let welcome_secret =
            extract_welcome_secret(crypto_provider, self.cipher_suite, joiner_secret)?;

        let (welcome_key, welcome_nonce) =
            Self::extract_key_and_nonce(&welcome_secret, crypto_provider, self.cipher_suite)?;

        let raw_group_info = crypto_provider
            .hpke(self.cipher_suite)?
            .aead_open(
                &welcome_key,
                &welcome_nonce,
                &self.encrypted_group_info,
                &[],
            )
            .map_err(|_| Error::WelcomeDecryptionFailed)?;

        GroupInfo::deserialize_exact(&raw_group_info)
    }
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct EncryptedGroupSecrets {
    new_member: KeyPackageRef,
    encrypted_group_secrets: HPKECiphertext,
}

impl Deserializer for EncryptedGroupSecrets {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let new_member = KeyPackageRef::deserialize(buf)?;
        let encrypted_group_secrets = HPKECiphertext::deserialize(buf)?;

        Ok(Self {
            new_member,
            encrypted_group_secrets,
        })
    }
}

impl Serializer for EncryptedGroupSecrets {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.new_member.serialize(buf)?;
        self.encrypted_group_secrets.serialize(buf)
    }
}

impl EncryptedGroupSecrets {
    /// Create a new `EncryptedGroupSecrets`
    pub fn new(new_member: KeyPackageRef, encrypted_group_secrets: HPKECiphertext) -> Self {
        Self {
            new_member,
            encrypted_group_secrets,
        }
    }

    /// Return `KeyPackageRef` of encrypted group secrets
    pub fn new_member(&self) -> &KeyPackageRef {
        &self.new_member
    }

    /// Return encrypted group secrets
    pub fn encrypted_group_secrets(&self) -> &HPKECiphertext {
        &self.encrypted_group_secrets
    }
}
