//! [RustCrypto](https://github.com/RustCrypto) primitives behind the [`CryptoProvider`] seam.

mod hash;
mod hpke;
mod signature;

use self::hash::HashSchemeWrapper;
use self::hpke::HpkeSuiteWrapper;
use self::signature::SignatureSchemeWrapper;
use super::{
    Aead, CipherSuite, CryptoProvider, Error, Hash, HashScheme, Hpke, HpkeSuite, Kdf, Kem,
    KeyStore, MemoryKeyStore, Result, Signature, SignatureScheme,
};

/// The primitives one cipher suite is assembled from.
struct Primitives {
    hash: HashSchemeWrapper,
    hpke: HpkeSuiteWrapper,
    signature: SignatureSchemeWrapper,
}

static X25519_AES128GCM_SHA256_ED25519: Primitives = Primitives {
    hash: HashSchemeWrapper(HashScheme::SHA256),
    hpke: HpkeSuiteWrapper(HpkeSuite {
        kem: Kem::KEM_X25519_HKDF_SHA256,
        kdf: Kdf::KDF_HKDF_SHA256,
        aead: Aead::AEAD_AES128GCM,
    }),
    signature: SignatureSchemeWrapper(SignatureScheme::ED25519),
};

/// Provider for suite 0x0001, with an in-memory key store.
#[derive(Default, Debug)]
pub struct RustCryptoProvider {
    key_store: MemoryKeyStore,
}

impl RustCryptoProvider {
    fn primitives(cipher_suite: CipherSuite) -> Result<&'static Primitives> {
        match cipher_suite {
            CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519 => {
                Ok(&X25519_AES128GCM_SHA256_ED25519)
            }
            _ => Err(Error::UnsupportedCipherSuite(cipher_suite)),
        }
    }
}

impl CryptoProvider for RustCryptoProvider {
    fn supports(&self, cipher_suite: CipherSuite) -> bool {
        Self::primitives(cipher_suite).is_ok()
    }

    fn supported(&self) -> Vec<CipherSuite> {
        vec![CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519]
    }

    fn key_store(&self) -> &dyn KeyStore {
        &self.key_store
    }

    fn hash(&self, cipher_suite: CipherSuite) -> Result<&dyn Hash> {
        Ok(&Self::primitives(cipher_suite)?.hash)
    }

    fn hpke(&self, cipher_suite: CipherSuite) -> Result<&dyn Hpke> {
        Ok(&Self::primitives(cipher_suite)?.hpke)
    }

    fn signature(&self, cipher_suite: CipherSuite) -> Result<&dyn Signature> {
        Ok(&Self::primitives(cipher_suite)?.signature)
    }
}
