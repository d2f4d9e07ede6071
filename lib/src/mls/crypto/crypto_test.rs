use bytes::Bytes;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::{CryptoProvider, KeyStore, RustCryptoProvider};
use crate::mls::crypto::Secret;
use crate::mls::utilities::error::{Error, ErrorKind, Result};

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

#[test]
fn test_hkdf_rfc5869_case_1() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let hpke = provider.hpke(SUITE)?;

    let ikm = [0x0bu8; 22];
    let salt: Vec<u8> = (0x00u8..=0x0c).collect();
    let info: Vec<u8> = (0xf0u8..=0xf9).collect();

    let prk = hpke.kdf_extract(&ikm, &salt)?;
    assert_eq!(
        hex::encode(prk.as_bytes()),
        "077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5",
        "extract output"
    );

    let okm = hpke.kdf_expand(&prk, &info, 42)?;
    assert_eq!(
        hex::encode(okm.as_bytes()),
        "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865",
        "expand output"
    );

    Ok(())
}

#[test]
fn test_expand_with_label_is_label_bound() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let secret = [7u8; 32];

    let a = provider.expand_with_label(SUITE, &secret, b"key", b"ctx", 16)?;
    let b = provider.expand_with_label(SUITE, &secret, b"nonce", b"ctx", 16)?;
    let c = provider.expand_with_label(SUITE, &secret, b"key", b"other", 16)?;

    assert_eq!(a.len(), 16, "requested length");
    assert_ne!(a, b, "different labels give different output");
    assert_ne!(a, c, "different contexts give different output");
    assert_eq!(
        provider.derive_secret(SUITE, &secret, b"key")?.len(),
        32,
        "derive_secret outputs Nh bytes"
    );

    Ok(())
}

#[test]
fn test_sign_with_label() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let key_pair = provider.signature(SUITE)?.signature_key_pair()?;

    let signature =
        provider.sign_with_label(SUITE, key_pair.private_key(), b"LeafNodeTBS", b"content")?;
    provider.verify_with_label(
        SUITE,
        key_pair.public_key(),
        b"LeafNodeTBS",
        b"content",
        &signature,
    )?;

    let wrong_label = provider.verify_with_label(
        SUITE,
        key_pair.public_key(),
        b"KeyPackageTBS",
        b"content",
        &signature,
    );
    assert_eq!(
        wrong_label.map_err(|err| err.kind()),
        Err(ErrorKind::SignatureError),
        "a signature is bound to its label"
    );

    Ok(())
}

#[test]
fn test_encrypt_with_label() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let key_pair = provider.generate_hpke_key_pair(SUITE)?;

    let (kem_output, ciphertext) = provider.encrypt_with_label(
        SUITE,
        key_pair.public_key(),
        b"UpdatePathNode",
        b"group context",
        b"path secret",
    )?;
    let plaintext = provider.decrypt_with_label(
        SUITE,
        key_pair.private_key(),
        b"UpdatePathNode",
        b"group context",
        &kem_output,
        &ciphertext,
    )?;
    assert_eq!(plaintext.as_bytes(), b"path secret", "round trip");

    let wrong_context = provider.decrypt_with_label(
        SUITE,
        key_pair.private_key(),
        b"UpdatePathNode",
        b"another context",
        &kem_output,
        &ciphertext,
    );
    assert_eq!(
        wrong_context.map_err(|err| err.kind()),
        Err(ErrorKind::DecryptionError),
        "context is authenticated"
    );

    Ok(())
}

#[test]
fn test_aead_rejects_tampering() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let hpke = provider.hpke(SUITE)?;
    let key = [1u8; 16];
    let nonce = [2u8; 12];

    let mut ciphertext = hpke.aead_seal(&key, &nonce, b"hello", b"aad")?.to_vec();
    assert_eq!(
        hpke.aead_open(&key, &nonce, &ciphertext, b"aad")?.as_ref(),
        b"hello",
        "round trip"
    );

    ciphertext[0] ^= 0x01;
    assert_eq!(
        hpke.aead_open(&key, &nonce, &ciphertext, b"aad"),
        Err(Error::AeadError),
        "tampered ciphertext"
    );
    assert_eq!(
        hpke.aead_open(&key[..8], &nonce, &ciphertext, b"aad"),
        Err(Error::AeadError),
        "short key"
    );

    Ok(())
}

#[test]
fn test_node_key_pair_is_deterministic() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let path_secret = Secret::new(vec![9u8; 32]);

    let a = provider.derive_node_key_pair(SUITE, &path_secret)?;
    let b = provider.derive_node_key_pair(SUITE, &path_secret)?;
    assert_eq!(a.public_key(), b.public_key(), "same secret, same key");

    let c = provider.derive_node_key_pair(SUITE, &[8u8; 32])?;
    assert_ne!(a.public_key(), c.public_key(), "different secret, different key");

    Ok(())
}

#[test]
fn test_verify_mac() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let tag = provider.sign_mac(SUITE, b"key", b"message")?;

    assert!(provider.verify_mac(SUITE, b"key", b"message", &tag)?, "valid tag");
    assert!(
        !provider.verify_mac(SUITE, b"key", b"massage", &tag)?,
        "tag bound to message"
    );
    assert!(
        !provider.verify_mac(SUITE, b"key", b"message", &tag[..16])?,
        "truncated tag"
    );

    Ok(())
}

#[test]
fn test_unsupported_cipher_suite() {
    let provider = RustCryptoProvider::default();
    let unknown = CipherSuite::Unknown(0x0003);

    assert!(!provider.supports(unknown), "only suite 1 is supported");
    assert_eq!(
        provider.hash(unknown).err().map(|err| err.kind()),
        Some(ErrorKind::CiphersuiteUnsupported),
        "hash lookup"
    );
    assert_eq!(
        provider.supported(),
        vec![CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519],
        "supported list"
    );
}

#[test]
fn test_memory_key_store() {
    let provider = RustCryptoProvider::default();
    let store = provider.key_store();

    store.store(b"ref", Secret::new(vec![1, 2, 3]));
    assert_eq!(
        store.retrieve(b"ref"),
        Some(Secret::new(vec![1, 2, 3])),
        "stored value"
    );

    store.store(b"ref", Secret::new(vec![4]));
    assert_eq!(store.retrieve(b"ref"), Some(Secret::new(vec![4])), "overwritten");

    assert!(store.delete(b"ref").is_some(), "deleted");
    assert_eq!(store.retrieve(b"ref"), None, "gone after delete");
    assert!(store.delete(b"ref").is_none(), "second delete is a no-op");
}

#[test]
fn test_memory_key_store_tracks_leaf_keys_and_consumption() {
    let provider = RustCryptoProvider::default();
    let store = provider.key_store();

    store.store_leaf_key(b"ref", Bytes::from_static(b"leaf key"));
    assert_eq!(
        store.leaf_key(b"ref"),
        Some(Bytes::from_static(b"leaf key")),
        "leaf key is remembered under the ref"
    );
    store.delete_leaf_key(b"ref");
    assert_eq!(store.leaf_key(b"ref"), None, "leaf key gone after delete");

    assert!(!store.is_consumed(b"ref"), "fresh ref is not consumed");
    assert!(store.mark_consumed(b"ref"), "first consumption is recorded");
    assert!(!store.mark_consumed(b"ref"), "second consumption is refused");
    assert!(store.is_consumed(b"ref"), "ref stays consumed");
}
