use super::private_message::PrivateMessage;
use super::public_message::PublicMessage;
use super::welcome::Welcome;
use super::*;
use crate::mls::crypto::provider::RustCryptoProvider;
use crate::mls::extensibility::Extensions;
use crate::mls::secret_tree::MessageKeys;
use crate::mls::utilities::error::ErrorKind;

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

fn group_context() -> GroupContext {
    GroupContext {
        version: ProtocolVersion::MLS10,
        cipher_suite: SUITE,
        group_id: Bytes::from_static(b"framing"),
        epoch: 3,
        tree_hash: Bytes::from_static(&[0x33; 32]),
        confirmed_transcript_hash: Bytes::from_static(&[0x44; 32]),
        extensions: Extensions::default(),
    }
}

fn application_content(
    provider: &RustCryptoProvider,
    signer: &Identity,
    plaintext: &'static [u8],
) -> Result<AuthenticatedContent> {
    let ctx = group_context();
    AuthenticatedContent::new(
        provider,
        signer,
        WireFormat::PrivateMessage,
        FramedContent {
            group_id: ctx.group_id.clone(),
            epoch: ctx.epoch,
            sender: Sender::Member(LeafIndex(1)),
            authenticated_data: Bytes::new(),
            content: Content::Application(Bytes::from_static(plaintext)),
        },
        &ctx,
    )
}

fn message_keys(generation: u32, fill: u8) -> MessageKeys {
    MessageKeys {
        generation,
        key: Secret::new(vec![fill; 16]),
        nonce: Secret::new(vec![fill; 12]),
    }
}

#[test]
fn test_private_message_round_trip() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let signer = Identity::new(&provider, "bob", SUITE)?;
    let sender_data_secret = [0x07; 32];
    let keys = message_keys(4, 0x09);
    let authenticated_content = application_content(&provider, &signer, b"hello")?;
    let sender_data = SenderData::new(LeafIndex(1), keys.generation());

    let message = PrivateMessage::encrypt(
        &provider,
        SUITE,
        &authenticated_content,
        &keys,
        &sender_data,
        &sender_data_secret,
        0,
    )?;
    let message = PrivateMessage::deserialize_exact(message.serialize_detached()?)?;
    assert_eq!(message.epoch(), 3, "epoch is visible");
    assert_eq!(message.content_type(), ContentType::Application, "content type is visible");

    let decrypted_sender_data =
        message.decrypt_sender_data(&provider, SUITE, &sender_data_secret)?;
    assert_eq!(decrypted_sender_data, sender_data, "sender data");

    let content = message.decrypt_content(&provider, SUITE, &keys, &sender_data.reuse_guard)?;
    let received = message.authenticated_content(&decrypted_sender_data, content);
    assert_eq!(received, authenticated_content, "content and signature");
    received.verify_signature(&provider, SUITE, signer.signature_public_key(), &group_context())?;

    Ok(())
}

#[test]
fn test_private_message_padding() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let signer = Identity::new(&provider, "bob", SUITE)?;
    let keys = message_keys(0, 0x01);
    let sender_data = SenderData::new(LeafIndex(1), 0);
    let authenticated_content = application_content(&provider, &signer, b"short")?;

    let padded = PrivateMessage::encrypt(
        &provider,
        SUITE,
        &authenticated_content,
        &keys,
        &sender_data,
        &[0x02; 32],
        64,
    )?;
    // AES-128-GCM appends a 16 byte tag.
    assert_eq!((padded.ciphertext.len() - 16) % 64, 0, "plaintext padded to 64 bytes");

    let content = padded.decrypt_content(&provider, SUITE, &keys, &sender_data.reuse_guard)?;
    assert_eq!(
        content.content,
        Content::Application(Bytes::from_static(b"short")),
        "padding is stripped"
    );

    Ok(())
}

#[test]
fn test_private_message_wrong_keys() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let signer = Identity::new(&provider, "bob", SUITE)?;
    let keys = message_keys(0, 0x01);
    let sender_data = SenderData::new(LeafIndex(1), 0);
    let message = PrivateMessage::encrypt(
        &provider,
        SUITE,
        &application_content(&provider, &signer, b"secret")?,
        &keys,
        &sender_data,
        &[0x02; 32],
        0,
    )?;

    assert_eq!(
        message.decrypt_sender_data(&provider, SUITE, &[0x03; 32]),
        Err(Error::SenderDataDecryptionFailed),
        "wrong sender data secret"
    );
    assert_eq!(
        message
            .decrypt_content(&provider, SUITE, &message_keys(0, 0x05), &sender_data.reuse_guard)
            .map_err(|e| e.kind()),
        Err(ErrorKind::AuthenticationFailure),
        "wrong message keys"
    );
    assert_eq!(
        message
            .decrypt_content(&provider, SUITE, &keys, &[0xff; 4])
            .map_err(|e| e.kind()),
        Err(ErrorKind::AuthenticationFailure),
        "wrong reuse guard"
    );

    Ok(())
}

#[test]
fn test_signature_is_bound_to_group_context() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let signer = Identity::new(&provider, "bob", SUITE)?;
    let authenticated_content = application_content(&provider, &signer, b"hello")?;

    let mut other_epoch = group_context();
    other_epoch.epoch += 1;
    assert_eq!(
        authenticated_content.verify_signature(
            &provider,
            SUITE,
            signer.signature_public_key(),
            &other_epoch
        ),
        Err(Error::InvalidContentSignature),
        "context of another epoch"
    );

    Ok(())
}

#[test]
fn test_membership_tag() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let signer = Identity::new(&provider, "alice", SUITE)?;
    let ctx = group_context();
    let membership_key = [0x0a; 32];

    let authenticated_content = AuthenticatedContent::new(
        &provider,
        &signer,
        WireFormat::PublicMessage,
        FramedContent {
            group_id: ctx.group_id.clone(),
            epoch: ctx.epoch,
            sender: Sender::Member(LeafIndex(0)),
            authenticated_data: Bytes::new(),
            content: Content::Application(Bytes::from_static(b"tagged")),
        },
        &ctx,
    )?;
    let tag = authenticated_content.membership_tag(&provider, SUITE, &membership_key, &ctx)?;
    let message = PublicMessage::new(authenticated_content, tag);

    let message = PublicMessage::deserialize_exact(message.serialize_detached()?)?;
    message.authenticated_content().verify_membership_tag(
        &provider,
        SUITE,
        &membership_key,
        &ctx,
        &message.membership_tag,
    )?;
    assert_eq!(
        message.authenticated_content().verify_membership_tag(
            &provider,
            SUITE,
            &[0x0b; 32],
            &ctx,
            &message.membership_tag,
        ),
        Err(Error::MembershipTagMismatch),
        "tag made with another membership key"
    );
    assert!(message.commit().is_none(), "not a commit");

    Ok(())
}

#[test]
fn test_message_wire_format_is_checked() -> Result<()> {
    let private = PrivateMessage::default().serialize_detached()?;

    assert_eq!(
        PublicMessage::deserialize_exact(&private),
        Err(Error::InvalidWireFormat(WireFormat::PrivateMessage as u16)),
        "private message is not a public message"
    );

    let mut raw = private.to_vec();
    raw[3] = 0x09;
    assert_eq!(
        PrivateMessage::deserialize_exact(&raw),
        Err(Error::InvalidWireFormat(0x09)),
        "unknown wire format"
    );

    Ok(())
}

#[test]
fn test_welcome_combine() {
    let welcome = |cipher_suite, encrypted_group_info: &'static [u8]| Welcome {
        cipher_suite,
        secrets: vec![],
        encrypted_group_info: Bytes::from_static(encrypted_group_info),
    };

    assert_eq!(
        Welcome::combine(vec![]),
        Err(Error::WelcomeMismatch),
        "nothing to combine"
    );
    assert_eq!(
        Welcome::combine(vec![welcome(SUITE, b"a"), welcome(SUITE, b"b")]),
        Err(Error::WelcomeMismatch),
        "welcomes of different commits"
    );
    assert!(
        Welcome::combine(vec![welcome(SUITE, b"a"), welcome(SUITE, b"a")]).is_ok(),
        "welcomes of the same commit"
    );
}
