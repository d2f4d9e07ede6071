use bytes::Bytes;
use ed25519_dalek::{Signature as Ed25519Signature, SigningKey, VerifyingKey};
use signature::{Signer, Verifier};

use crate::mls::crypto::rng::rng;
use crate::mls::crypto::{key_pair::SignatureKeyPair, provider::SignatureScheme, Key, Secret};
use crate::mls::utilities::error::{Error, Result};

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct SignatureSchemeWrapper(pub(super) SignatureScheme);

fn ed25519_signing_key(private_key: &[u8]) -> Result<SigningKey> {
    let seed = private_key
        .try_into()
        .map_err(|_| Error::InvalidEd25519PrivateKey)?;
    Ok(SigningKey::from_bytes(seed))
}

fn ed25519_verifying_key(public_key: &[u8]) -> Result<VerifyingKey> {
    let point = public_key
        .try_into()
        .map_err(|_| Error::InvalidEd25519PublicKey)?;
    Ok(VerifyingKey::from_bytes(point)?)
}

impl crate::mls::crypto::provider::Signature for SignatureSchemeWrapper {
    fn signature_key_pair(&self) -> Result<SignatureKeyPair> {
        match self.0 {
            SignatureScheme::ED25519 => {
                let signing_key = SigningKey::generate(&mut rng());
                let public_key = signing_key.verifying_key().to_bytes();
                Ok(SignatureKeyPair {
                    private_key: Secret::new(signing_key.to_bytes().to_vec()),
                    public_key: Key(Bytes::copy_from_slice(&public_key)),
                    signature_scheme: self.0,
                })
            }
        }
    }

    fn signature_scheme(&self) -> SignatureScheme {
        self.0
    }

    fn sign(&self, sign_key: &[u8], message: &[u8]) -> Result<Bytes> {
        match self.0 {
            SignatureScheme::ED25519 => {
                let signature: Ed25519Signature = ed25519_signing_key(sign_key)?.sign(message);
                Ok(Bytes::copy_from_slice(&signature.to_bytes()))
            }
        }
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        match self.0 {
            SignatureScheme::ED25519 => {
                let signature = Ed25519Signature::from_slice(signature)?;
                ed25519_verifying_key(public_key)?.verify(message, &signature)?;
                Ok(())
            }
        }
    }
}
