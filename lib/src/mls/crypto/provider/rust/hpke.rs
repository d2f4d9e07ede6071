use aes_gcm::{
    aead::{consts::U12, AeadInPlace},
    Aes128Gcm, Key as AesKey, Nonce,
};
use bytes::Bytes;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use hpke::{
    aead::AesGcm128, kdf::HkdfSha256, kem::X25519HkdfSha256, Deserializable, Kem as KemTrait,
    OpModeR, OpModeS, Serializable,
};
use sha2::Sha256;

use crate::mls::crypto::rng::rng;
use crate::mls::crypto::key_pair::HPKEKeyPair;
use crate::mls::crypto::provider::HpkeSuite;
use crate::mls::crypto::{provider, Aead, Error, Kdf, Key, Result, Secret};

type X25519PublicKey = <X25519HkdfSha256 as KemTrait>::PublicKey;
type X25519PrivateKey = <X25519HkdfSha256 as KemTrait>::PrivateKey;
type X25519EncappedKey = <X25519HkdfSha256 as KemTrait>::EncappedKey;

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct HpkeSuiteWrapper(pub(super) HpkeSuite);

impl provider::Hpke for HpkeSuiteWrapper {
    fn hpke_suite(&self) -> HpkeSuite {
        self.0
    }

    fn kem_derive_key_pair(&self, ikm: &[u8]) -> Result<HPKEKeyPair> {
        match self.0.kem {
            provider::Kem::KEM_X25519_HKDF_SHA256 => {
                let (private_key, public_key) = X25519HkdfSha256::derive_keypair(ikm);
                Ok(HPKEKeyPair {
                    private_key: Secret::new(private_key.to_bytes().to_vec()),
                    public_key: Key(Bytes::from(public_key.to_bytes().to_vec())),
                })
            }
        }
    }

    fn kdf_expand(&self, secret: &[u8], info: &[u8], length: u16) -> Result<Secret> {
        let mut out = vec![0u8; length as usize];

        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => {
                let hkdf = Hkdf::<Sha256>::from_prk(secret)
                    .map_err(|err| Error::KdfError(err.to_string()))?;
                hkdf.expand(info, &mut out)
                    .map_err(|err| Error::KdfError(err.to_string()))?;
            }
        };

        Ok(Secret::new(out))
    }

    fn kdf_extract(&self, secret: &[u8], salt: &[u8]) -> Result<Secret> {
        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => {
                let mut m = Hmac::<Sha256>::new_from_slice(salt)?;
                m.update(secret);
                Ok(Secret::new(m.finalize().into_bytes().to_vec()))
            }
        }
    }

    fn kdf_extract_size(&self) -> u16 {
        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => 32,
        }
    }

    // key_size returns the size in bytes of the keys used by the AEAD cipher.
    fn aead_key_size(&self) -> u16 {
        match self.0.aead {
            Aead::AEAD_AES128GCM => 16,
        }
    }

    // nonce_size returns the size in bytes of the nonce used by the AEAD cipher.
    fn aead_nonce_size(&self) -> u16 {
        match self.0.aead {
            Aead::AEAD_AES128GCM => 12,
        }
    }

    fn aead_open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes> {
        use aes_gcm::KeyInit;
        match self.0.aead {
            Aead::AEAD_AES128GCM => {
                if key.len() != 16 || nonce.len() != 12 {
                    return Err(Error::AeadError);
                }
                let key: &AesKey<Aes128Gcm> = key.into();
                let nonce: &Nonce<U12> = nonce.into();

                let cipher = Aes128Gcm::new(key);
                let mut in_out = ciphertext.to_vec();
                cipher
                    .decrypt_in_place(nonce, additional_data, &mut in_out)
                    .map_err(|_| Error::AeadError)?;

                Ok(Bytes::from(in_out))
            }
        }
    }

    fn aead_seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes> {
        use aes_gcm::KeyInit;
        match self.0.aead {
            Aead::AEAD_AES128GCM => {
                if key.len() != 16 || nonce.len() != 12 {
                    return Err(Error::AeadError);
                }
                let key: &AesKey<Aes128Gcm> = key.into();
                let nonce: &Nonce<U12> = nonce.into();

                let cipher = Aes128Gcm::new(key);
                let mut in_out = plaintext.to_vec();
                cipher
                    .encrypt_in_place(nonce, additional_data, &mut in_out)
                    .map_err(|_| Error::AeadError)?;

                Ok(Bytes::from(in_out))
            }
        }
    }

    fn hpke_seal(
        &self,
        public_key: &[u8],
        info: &[u8],
        additional_data: &[u8],
        plaintext: &[u8],
    ) -> Result<(Bytes, Bytes)> {
        match (self.0.kem, self.0.kdf, self.0.aead) {
            (
                provider::Kem::KEM_X25519_HKDF_SHA256,
                Kdf::KDF_HKDF_SHA256,
                Aead::AEAD_AES128GCM,
            ) => {
                let public_key =
                    X25519PublicKey::from_bytes(public_key).map_err(|_| Error::InvalidHpkeKey)?;
                let (kem_output, ciphertext) =
                    hpke::single_shot_seal::<AesGcm128, HkdfSha256, X25519HkdfSha256, _>(
                        &OpModeS::Base,
                        &public_key,
                        info,
                        plaintext,
                        additional_data,
                        &mut rng(),
                    )
                    .map_err(|_| Error::HpkeError)?;

                Ok((
                    Bytes::from(kem_output.to_bytes().to_vec()),
                    Bytes::from(ciphertext),
                ))
            }
        }
    }

    fn hpke_open(
        &self,
        private_key: &[u8],
        kem_output: &[u8],
        info: &[u8],
        additional_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Secret> {
        match (self.0.kem, self.0.kdf, self.0.aead) {
            (
                provider::Kem::KEM_X25519_HKDF_SHA256,
                Kdf::KDF_HKDF_SHA256,
                Aead::AEAD_AES128GCM,
            ) => {
                let private_key =
                    X25519PrivateKey::from_bytes(private_key).map_err(|_| Error::InvalidHpkeKey)?;
                let kem_output =
                    X25519EncappedKey::from_bytes(kem_output).map_err(|_| Error::HpkeError)?;
                let plaintext =
                    hpke::single_shot_open::<AesGcm128, HkdfSha256, X25519HkdfSha256>(
                        &OpModeR::Base,
                        &private_key,
                        &kem_output,
                        info,
                        ciphertext,
                        additional_data,
                    )
                    .map_err(|_| Error::HpkeError)?;

                Ok(Secret::new(plaintext))
            }
        }
    }
}
