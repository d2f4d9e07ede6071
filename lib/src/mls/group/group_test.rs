use bytes::Bytes;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::config::CryptoConfig;
use crate::mls::crypto::provider::RustCryptoProvider;
use crate::mls::framing::private_message::PrivateMessage;
use crate::mls::framing::public_message::PublicMessage;
use crate::mls::framing::Sender;
use crate::mls::framing::welcome::Welcome;
use crate::mls::group::config::{GroupConfig, SenderRatchetConfiguration};
use crate::mls::group::staged_join::StagedJoin;
use crate::mls::group::Group;
use crate::mls::identity::Identity;
use crate::mls::key_package::{KeyPackage, Lifetime};
use crate::mls::ratchet_tree::RatchetTree;
use crate::mls::utilities::error::{Error, ErrorKind, Result};
use crate::mls::utilities::serde::{Deserializer, Serializer};
use crate::mls::utilities::tree_math::LeafIndex;

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

/// One device: its own provider, so its own key store.
struct Client {
    provider: RustCryptoProvider,
    identity: Identity,
}

impl Client {
    fn new(name: &'static str) -> Result<Self> {
        let provider = RustCryptoProvider::default();
        let identity = Identity::new(&provider, name, SUITE)?;
        Ok(Self { provider, identity })
    }

    fn key_package(&self) -> Result<KeyPackage> {
        // Key packages travel as bytes.
        let key_package = self.identity.create_key_package(&self.provider)?;
        KeyPackage::from_bytes(&self.provider, &key_package.to_bytes()?)
    }

    fn create_group(&self, config: GroupConfig) -> Result<Group> {
        Group::new(&self.provider, &self.identity, config)
    }

    fn join(
        &self,
        config: GroupConfig,
        welcome: &Welcome,
        ratchet_tree: Option<RatchetTree>,
    ) -> Result<Group> {
        let welcome = Welcome::deserialize_exact(welcome.serialize_detached()?)?;
        let staged = StagedJoin::new(&self.provider, config, &welcome, ratchet_tree)?;
        Ok(staged.complete_join(&self.provider))
    }

    fn send(&self, group: &mut Group, plaintext: &[u8]) -> Result<PrivateMessage> {
        let message = group.encrypt_message(&self.provider, &self.identity, plaintext)?;
        PrivateMessage::deserialize_exact(message.serialize_detached()?)
    }

    fn receive(&self, group: &mut Group, message: &PrivateMessage) -> Result<Bytes> {
        group.decrypt_message(&self.provider, message)
    }
}

fn exported_tree(group: &Group) -> Result<Option<RatchetTree>> {
    Ok(Some(RatchetTree::deserialize_exact(
        group.export_ratchet_tree()?,
    )?))
}

fn on_the_wire(message: &PublicMessage) -> Result<PublicMessage> {
    PublicMessage::deserialize_exact(message.serialize_detached()?)
}

/// Alice creates a group and adds Bob, who joins with the exported tree.
fn alice_and_bob(config: GroupConfig) -> Result<(Client, Group, Client, Group)> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;

    let mut alice_group = alice.create_group(config)?;
    let (_, welcomes) =
        alice_group.add_members(&alice.provider, &alice.identity, &[bob.key_package()?])?;
    alice_group.merge_pending_commit()?;

    let bob_group = bob.join(config, &welcomes[0], exported_tree(&alice_group)?)?;

    Ok((alice, alice_group, bob, bob_group))
}

fn assert_same_epoch(a: &Group, b: &Group) -> Result<()> {
    let provider = RustCryptoProvider::default();
    assert_eq!(a.group_id(), b.group_id(), "group id");
    assert_eq!(a.epoch(), b.epoch(), "epoch");
    assert_eq!(a.tree_hash(), b.tree_hash(), "tree hash");
    assert_eq!(a.group_context(), b.group_context(), "group context");
    assert_eq!(a.ratchet_tree(), b.ratchet_tree(), "ratchet tree");
    assert_eq!(
        a.epoch_authenticator(),
        b.epoch_authenticator(),
        "epoch authenticator"
    );
    assert_eq!(
        a.export_secret(&provider, b"test", b"context", 32)?,
        b.export_secret(&provider, b"test", b"context", 32)?,
        "exported secret"
    );
    Ok(())
}

#[test]
fn test_create_group() -> Result<()> {
    let alice = Client::new("alice")?;
    let group = alice.create_group(GroupConfig::default())?;

    assert_eq!(group.epoch(), 0, "new groups start at epoch 0");
    assert_eq!(group.group_id().len(), 16, "random 16 byte group id");
    assert_eq!(group.own_leaf_index(), LeafIndex(0), "creator is leaf 0");
    assert_eq!(group.members().len(), 1, "creator is the only member");
    assert_eq!(group.members()[0].1.to_string(), "alice", "creator credential");
    assert!(group.pending_commit().is_none(), "nothing staged");

    let other = alice.create_group(GroupConfig::default())?;
    assert_ne!(group.group_id(), other.group_id(), "group ids are random");

    Ok(())
}

#[test]
fn test_create_group_with_group_id() -> Result<()> {
    let alice = Client::new("alice")?;
    let group = Group::with_group_id(
        &alice.provider,
        &alice.identity,
        GroupConfig::default(),
        Bytes::from_static(b"chosen id"),
    )?;

    assert_eq!(group.group_id().as_ref(), b"chosen id", "caller chosen id");

    Ok(())
}

#[test]
fn test_create_group_with_mismatched_cipher_suite() -> Result<()> {
    let alice = Client::new("alice")?;
    let config = GroupConfig::builder()
        .with_crypto_config(CryptoConfig::with_default_version(CipherSuite::Unknown(
            0x0099,
        )))
        .build();

    let err = alice.create_group(config).map_err(|e| e.kind());
    assert_eq!(
        err.map(|_| ()),
        Err(ErrorKind::CiphersuiteUnsupported),
        "config asks for another cipher suite"
    );

    let err = Identity::new(&alice.provider, "eve", CipherSuite::Unknown(0x0099));
    assert_eq!(
        err.map(|_| ()),
        Err(Error::UnsupportedCipherSuite(CipherSuite::Unknown(0x0099))),
        "identity for an unsupported suite"
    );

    Ok(())
}

#[test]
fn test_add_member_with_exported_tree() -> Result<()> {
    let (_, alice_group, _, bob_group) = alice_and_bob(GroupConfig::default())?;

    assert_eq!(alice_group.epoch(), 1, "one commit merged");
    assert_same_epoch(&alice_group, &bob_group)?;
    assert_eq!(bob_group.own_leaf_index(), LeafIndex(1), "bob takes leaf 1");

    let names: Vec<String> = bob_group
        .members()
        .iter()
        .map(|(_, credential)| credential.to_string())
        .collect();
    assert_eq!(names, vec!["alice", "bob"], "roster in leaf order");

    Ok(())
}

#[test]
fn test_add_member_with_ratchet_tree_extension() -> Result<()> {
    let config = GroupConfig::builder()
        .use_ratchet_tree_extension(true)
        .build();
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;

    let mut alice_group = alice.create_group(config)?;
    let (_, welcomes) =
        alice_group.add_members(&alice.provider, &alice.identity, &[bob.key_package()?])?;
    alice_group.merge_pending_commit()?;

    let bob_group = bob.join(config, &welcomes[0], None)?;
    assert_same_epoch(&alice_group, &bob_group)?;

    Ok(())
}

#[test]
fn test_join_without_ratchet_tree() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;

    let mut alice_group = alice.create_group(GroupConfig::default())?;
    let (_, welcomes) =
        alice_group.add_members(&alice.provider, &alice.identity, &[bob.key_package()?])?;

    let err = bob.join(GroupConfig::default(), &welcomes[0], None);
    assert_eq!(err.map(|_| ()), Err(Error::NoRatchetTree), "tree is neither given nor carried");
    assert_eq!(
        Error::NoRatchetTree.kind(),
        ErrorKind::TreeMismatch,
        "missing tree is a tree mismatch"
    );

    Ok(())
}

#[test]
fn test_join_with_wrong_tree() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;

    let mut alice_group = alice.create_group(GroupConfig::default())?;
    let stale_tree = exported_tree(&alice_group)?;
    let (_, welcomes) =
        alice_group.add_members(&alice.provider, &alice.identity, &[bob.key_package()?])?;

    let err = bob
        .join(GroupConfig::default(), &welcomes[0], stale_tree)
        .map_err(|e| e.kind());
    assert_eq!(
        err.map(|_| ()),
        Err(ErrorKind::TreeMismatch),
        "tree of the previous epoch"
    );

    Ok(())
}

#[test]
fn test_welcome_for_someone_else() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;
    let eve = Client::new("eve")?;

    let mut alice_group = alice.create_group(GroupConfig::default())?;
    let (_, welcomes) =
        alice_group.add_members(&alice.provider, &alice.identity, &[bob.key_package()?])?;
    alice_group.merge_pending_commit()?;

    let err = eve.join(GroupConfig::default(), &welcomes[0], exported_tree(&alice_group)?);
    assert_eq!(
        err.map(|_| ()).map_err(|e| e.kind()),
        Err(ErrorKind::DecryptionError),
        "eve holds no matching key package"
    );

    Ok(())
}

#[test]
fn test_welcome_is_single_use() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;

    let mut alice_group = alice.create_group(GroupConfig::default())?;
    let (_, welcomes) =
        alice_group.add_members(&alice.provider, &alice.identity, &[bob.key_package()?])?;
    alice_group.merge_pending_commit()?;
    let tree = exported_tree(&alice_group)?;

    let staged = StagedJoin::new(
        &bob.provider,
        GroupConfig::default(),
        &welcomes[0],
        tree.clone(),
    )?;
    assert_eq!(staged.epoch(), 1, "staged join exposes the epoch");
    assert_eq!(staged.own_leaf_index(), LeafIndex(1), "and the leaf");
    // Staging alone does not consume the key package.
    let group = StagedJoin::new(&bob.provider, GroupConfig::default(), &welcomes[0], tree.clone())?
        .complete_join(&bob.provider);
    assert_same_epoch(&alice_group, &group)?;

    let err = bob.join(GroupConfig::default(), &welcomes[0], tree);
    assert_eq!(
        err.map(|_| ()),
        Err(Error::NoMatchingKeyPackage),
        "key package was consumed by the first join"
    );

    Ok(())
}

#[test]
fn test_application_messages_both_ways() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;

    let message = alice.send(&mut alice_group, b"hi bob")?;
    assert_eq!(message.epoch(), 1, "sent in the current epoch");
    assert_eq!(
        bob.receive(&mut bob_group, &message)?,
        Bytes::from_static(b"hi bob"),
        "bob reads alice"
    );

    let reply = bob.send(&mut bob_group, b"hi alice")?;
    assert_eq!(
        alice.receive(&mut alice_group, &reply)?,
        Bytes::from_static(b"hi alice"),
        "alice reads bob"
    );

    let empty = alice.send(&mut alice_group, b"")?;
    assert!(bob.receive(&mut bob_group, &empty)?.is_empty(), "empty plaintext");

    Ok(())
}

#[test]
fn test_padded_application_messages() -> Result<()> {
    let config = GroupConfig::builder().with_padding_size(32).build();
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(config)?;

    let message = alice.send(&mut alice_group, b"padded")?;
    assert_eq!(
        bob.receive(&mut bob_group, &message)?,
        Bytes::from_static(b"padded"),
        "padding is transparent"
    );

    Ok(())
}

#[test]
fn test_replayed_message() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;

    let message = alice.send(&mut alice_group, b"once")?;
    bob.receive(&mut bob_group, &message)?;

    let err = bob.receive(&mut bob_group, &message).map_err(|e| e.kind());
    assert_eq!(err, Err(ErrorKind::ReplayDetected), "second delivery");

    let own = alice.receive(&mut alice_group, &message).map_err(|e| e.kind());
    assert_eq!(own, Err(ErrorKind::ReplayDetected), "own message echoed back");

    Ok(())
}

#[test]
fn test_out_of_order_messages() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;

    let messages = (0..4)
        .map(|i| alice.send(&mut alice_group, format!("message {i}").as_bytes()))
        .collect::<Result<Vec<_>>>()?;

    for i in [3, 0, 2, 1] {
        assert_eq!(
            bob.receive(&mut bob_group, &messages[i])?,
            Bytes::from(format!("message {i}")),
            "message {i} out of order"
        );
    }

    Ok(())
}

#[test]
fn test_message_beyond_forward_distance() -> Result<()> {
    let config = GroupConfig::builder()
        .with_sender_ratchet_configuration(SenderRatchetConfiguration {
            out_of_order_tolerance: 5,
            maximum_forward_distance: 2,
        })
        .build();
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(config)?;

    let messages = (0..4)
        .map(|_| alice.send(&mut alice_group, b"skip"))
        .collect::<Result<Vec<_>>>()?;

    let err = bob.receive(&mut bob_group, &messages[3]).map_err(|e| e.kind());
    assert_eq!(err, Err(ErrorKind::DecryptionError), "generation 3 is too far ahead");
    bob.receive(&mut bob_group, &messages[2])?;
    bob.receive(&mut bob_group, &messages[3])?;

    Ok(())
}

#[test]
fn test_tampered_message() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;

    let message = alice.send(&mut alice_group, b"intact")?;
    let mut tampered = message.clone();
    let mut ciphertext = tampered.ciphertext.to_vec();
    ciphertext[0] ^= 0x80;
    tampered.ciphertext = Bytes::from(ciphertext);

    let err = bob.receive(&mut bob_group, &tampered).map_err(|e| e.kind());
    assert_eq!(err, Err(ErrorKind::AuthenticationFailure), "flipped ciphertext bit");

    assert_eq!(
        bob.receive(&mut bob_group, &message)?,
        Bytes::from_static(b"intact"),
        "rejected message did not advance the ratchet"
    );

    Ok(())
}

#[test]
fn test_message_from_another_group() -> Result<()> {
    let (_, _, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let (eve, mut eve_group, _, _) = alice_and_bob(GroupConfig::default())?;

    let message = eve.send(&mut eve_group, b"let me in")?;
    let err = bob.receive(&mut bob_group, &message).map_err(|e| e.kind());
    assert_eq!(err, Err(ErrorKind::AuthenticationFailure), "foreign group");

    Ok(())
}

#[test]
fn test_wrong_signer() -> Result<()> {
    let (alice, mut alice_group, bob, _) = alice_and_bob(GroupConfig::default())?;

    let err = alice_group
        .encrypt_message(&alice.provider, &bob.identity, b"spoof")
        .map_err(|e| e.kind());
    assert_eq!(err.map(|_| ()), Err(ErrorKind::SignatureError), "bob's identity in alice's group");

    Ok(())
}

#[test]
fn test_three_members() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let carol = Client::new("carol")?;

    let (commit, welcomes) =
        alice_group.add_members(&alice.provider, &alice.identity, &[carol.key_package()?])?;
    assert_eq!(alice_group.epoch(), 1, "commit is staged, not applied");
    assert_eq!(alice_group.pending_commit(), Some(&commit), "staged commit");

    bob_group.apply_commit(&bob.provider, &on_the_wire(&commit)?)?;
    alice_group.apply_commit(&alice.provider, &commit)?;
    assert!(alice_group.pending_commit().is_none(), "own commit merged");

    let mut carol_group =
        carol.join(GroupConfig::default(), &welcomes[0], exported_tree(&alice_group)?)?;

    assert_same_epoch(&alice_group, &bob_group)?;
    assert_same_epoch(&alice_group, &carol_group)?;
    assert_eq!(carol_group.own_leaf_index(), LeafIndex(2), "carol takes leaf 2");
    assert_eq!(carol_group.members().len(), 3, "three members");

    let from_carol = carol.send(&mut carol_group, b"hello both")?;
    assert_eq!(
        alice.receive(&mut alice_group, &from_carol)?,
        Bytes::from_static(b"hello both"),
        "alice reads carol"
    );
    assert_eq!(
        bob.receive(&mut bob_group, &from_carol)?,
        Bytes::from_static(b"hello both"),
        "bob reads carol"
    );

    let from_bob = bob.send(&mut bob_group, b"welcome carol")?;
    assert_eq!(
        carol.receive(&mut carol_group, &from_bob)?,
        Bytes::from_static(b"welcome carol"),
        "carol reads bob"
    );

    Ok(())
}

#[test]
fn test_add_several_members_in_one_commit() -> Result<()> {
    let alice = Client::new("alice")?;
    let joiners = ["bob", "carol", "dave"]
        .into_iter()
        .map(Client::new)
        .collect::<Result<Vec<_>>>()?;
    let key_packages = joiners
        .iter()
        .map(Client::key_package)
        .collect::<Result<Vec<_>>>()?;

    let mut alice_group = alice.create_group(GroupConfig::default())?;
    let (_, welcomes) = alice_group.add_members(&alice.provider, &alice.identity, &key_packages)?;
    alice_group.merge_pending_commit()?;
    assert_eq!(welcomes.len(), 3, "one welcome per new member");

    let combined = Welcome::combine(welcomes)?;
    assert_eq!(combined.secrets().len(), 3, "combined welcome addresses everyone");

    let tree = exported_tree(&alice_group)?;
    for (leaf, joiner) in (1..).zip(&joiners) {
        let group = joiner.join(GroupConfig::default(), &combined, tree.clone())?;
        assert_same_epoch(&alice_group, &group)?;
        assert_eq!(group.own_leaf_index(), LeafIndex(leaf), "joiner at leaf {leaf}");
    }

    Ok(())
}

#[test]
fn test_member_added_by_a_joiner() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let carol = Client::new("carol")?;

    let (commit, welcomes) =
        bob_group.add_members(&bob.provider, &bob.identity, &[carol.key_package()?])?;
    bob_group.merge_pending_commit()?;
    alice_group.apply_commit(&alice.provider, &on_the_wire(&commit)?)?;
    let carol_group =
        carol.join(GroupConfig::default(), &welcomes[0], exported_tree(&bob_group)?)?;

    assert_same_epoch(&alice_group, &bob_group)?;
    assert_same_epoch(&bob_group, &carol_group)?;

    Ok(())
}

#[test]
fn test_key_package_reuse() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;
    let carol = Client::new("carol")?;
    let bob_key_package = bob.key_package()?;

    let mut group = alice.create_group(GroupConfig::default())?;
    group.add_members(&alice.provider, &alice.identity, &[bob_key_package.clone()])?;
    group.merge_pending_commit()?;

    let err = group
        .add_members(&alice.provider, &alice.identity, &[bob_key_package])
        .map_err(|e| e.kind());
    assert_eq!(
        err.map(|_| ()),
        Err(ErrorKind::InvalidKeyPackage),
        "key package already added"
    );

    let carol_key_package = carol.key_package()?;
    let err = group
        .add_members(
            &alice.provider,
            &alice.identity,
            &[carol_key_package.clone(), carol_key_package],
        )
        .map_err(|e| e.kind());
    assert_eq!(
        err.map(|_| ()),
        Err(ErrorKind::InvalidKeyPackage),
        "same key package twice in one commit"
    );
    assert!(group.pending_commit().is_none(), "nothing staged");

    Ok(())
}

#[test]
fn test_empty_add() -> Result<()> {
    let alice = Client::new("alice")?;
    let mut group = alice.create_group(GroupConfig::default())?;

    let err = group
        .add_members(&alice.provider, &alice.identity, &[])
        .map_err(|e| e.kind());
    assert_eq!(err.map(|_| ()), Err(ErrorKind::InvalidKeyPackage), "nothing to add");
    assert_eq!(group.epoch(), 0, "group unchanged");

    Ok(())
}

#[test]
fn test_expired_key_package() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;
    let expired = KeyPackage::with_lifetime(
        &bob.provider,
        &bob.identity,
        Lifetime {
            not_before: 0,
            not_after: 1,
        },
    )?;

    let mut group = alice.create_group(GroupConfig::default())?;
    let err = group
        .add_members(&alice.provider, &alice.identity, &[expired])
        .map_err(|e| e.kind());
    assert_eq!(err.map(|_| ()), Err(ErrorKind::ExpiredKeyPackage), "expired key package");
    assert!(group.pending_commit().is_none(), "nothing staged");

    Ok(())
}

#[test]
fn test_no_pending_commit() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;
    let mut group = alice.create_group(GroupConfig::default())?;

    assert_eq!(
        group.merge_pending_commit().map_err(|e| e.kind()),
        Err(ErrorKind::NoPendingCommit),
        "nothing staged"
    );

    let (commit, _) = group.add_members(&alice.provider, &alice.identity, &[bob.key_package()?])?;
    group.clear_pending_commit();
    assert_eq!(
        group.apply_commit(&alice.provider, &commit),
        Err(Error::NoPendingCommit),
        "own commit after it was discarded"
    );
    assert_eq!(group.epoch(), 0, "group unchanged");

    Ok(())
}

#[test]
fn test_stale_commit() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let carol = Client::new("carol")?;

    let (commit, _) =
        alice_group.add_members(&alice.provider, &alice.identity, &[carol.key_package()?])?;
    alice_group.merge_pending_commit()?;
    bob_group.apply_commit(&bob.provider, &commit)?;

    let err = bob_group.apply_commit(&bob.provider, &commit);
    assert_eq!(
        err,
        Err(Error::StaleEpoch {
            expected: 2,
            got: 1
        }),
        "commit applied twice"
    );
    assert_eq!(
        err.map_err(|e| e.kind()),
        Err(ErrorKind::StaleEpoch),
        "stale epoch kind"
    );

    Ok(())
}

#[test]
fn test_application_message_from_previous_epoch() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let carol = Client::new("carol")?;

    let old = bob.send(&mut bob_group, b"too late")?;
    let (commit, _) =
        alice_group.add_members(&alice.provider, &alice.identity, &[carol.key_package()?])?;
    alice_group.merge_pending_commit()?;
    bob_group.apply_commit(&bob.provider, &commit)?;

    let err = alice.receive(&mut alice_group, &old);
    assert_eq!(
        err,
        Err(Error::EpochMismatch {
            expected: 2,
            got: 1
        }),
        "message of epoch 1 in epoch 2"
    );

    Ok(())
}

#[test]
fn test_tampered_commit_leaves_group_untouched() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let carol = Client::new("carol")?;

    let (commit, _) =
        alice_group.add_members(&alice.provider, &alice.identity, &[carol.key_package()?])?;
    alice_group.merge_pending_commit()?;

    let mut tampered = commit.clone();
    let mut tag = tampered.membership_tag.to_vec();
    tag[0] ^= 0x01;
    tampered.membership_tag = Bytes::from(tag);
    let err = bob_group
        .apply_commit(&bob.provider, &tampered)
        .map_err(|e| e.kind());
    assert_eq!(err, Err(ErrorKind::AuthenticationFailure), "bad membership tag");

    let mut other_group = commit.clone();
    other_group.content.group_id = Bytes::from_static(b"another group");
    let err = bob_group
        .apply_commit(&bob.provider, &other_group)
        .map_err(|e| e.kind());
    assert_eq!(err, Err(ErrorKind::AuthenticationFailure), "commit of another group");

    assert_eq!(bob_group.epoch(), 1, "bob is still at epoch 1");
    bob_group.apply_commit(&bob.provider, &commit)?;
    assert_same_epoch(&alice_group, &bob_group)?;

    Ok(())
}

#[test]
fn test_commit_from_out_of_range_sender() -> Result<()> {
    let (alice, mut alice_group, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let carol = Client::new("carol")?;

    let (commit, _) =
        alice_group.add_members(&alice.provider, &alice.identity, &[carol.key_package()?])?;
    alice_group.merge_pending_commit()?;

    // 0x8000_0000 doubles to node 0 in 32 bits, which is alice's leaf.
    let mut forged = commit.clone();
    forged.content.sender = Sender::Member(LeafIndex(0x8000_0000));
    let err = bob_group.apply_commit(&bob.provider, &on_the_wire(&forged)?);
    assert_eq!(err, Err(Error::UnknownSender(0x8000_0000)), "leaf index past the tree");
    assert_eq!(
        err.map_err(|e| e.kind()),
        Err(ErrorKind::UnknownSender),
        "unknown sender kind"
    );

    assert_eq!(bob_group.epoch(), 1, "bob is still at epoch 1");
    bob_group.apply_commit(&bob.provider, &commit)?;
    assert_same_epoch(&alice_group, &bob_group)?;

    Ok(())
}

#[test]
fn test_key_package_reuse_across_groups() -> Result<()> {
    let alice = Client::new("alice")?;
    let bob = Client::new("bob")?;
    let bob_key_package = bob.key_package()?;

    let mut first = alice.create_group(GroupConfig::default())?;
    first.add_members(&alice.provider, &alice.identity, &[bob_key_package.clone()])?;
    first.merge_pending_commit()?;

    let mut second = alice.create_group(GroupConfig::default())?;
    let err = second
        .add_members(&alice.provider, &alice.identity, &[bob_key_package])
        .map_err(|e| e.kind());
    assert_eq!(
        err.map(|_| ()),
        Err(ErrorKind::InvalidKeyPackage),
        "key package already added to another group of the same provider"
    );
    assert!(second.pending_commit().is_none(), "nothing staged");
    assert_eq!(second.epoch(), 0, "second group unchanged");

    Ok(())
}

#[test]
fn test_joiners_sharing_a_provider() -> Result<()> {
    let alice = Client::new("alice")?;
    let provider = RustCryptoProvider::default();
    let bob = Identity::new(&provider, "bob", SUITE)?;
    let carol = Identity::new(&provider, "carol", SUITE)?;
    let key_packages = [
        bob.create_key_package(&provider)?,
        carol.create_key_package(&provider)?,
    ];

    let mut alice_group = alice.create_group(GroupConfig::default())?;
    let (_, welcomes) = alice_group.add_members(&alice.provider, &alice.identity, &key_packages)?;
    alice_group.merge_pending_commit()?;
    let tree = exported_tree(&alice_group)?;

    // Carol joins first, while bob's key package is still pending in the same store.
    let carol_group =
        StagedJoin::new(&provider, GroupConfig::default(), &welcomes[1], tree.clone())?
            .complete_join(&provider);
    assert_eq!(carol_group.own_leaf_index(), LeafIndex(2), "carol takes leaf 2");
    assert_same_epoch(&alice_group, &carol_group)?;

    let bob_group = StagedJoin::new(&provider, GroupConfig::default(), &welcomes[0], tree)?
        .complete_join(&provider);
    assert_eq!(bob_group.own_leaf_index(), LeafIndex(1), "bob takes leaf 1");
    assert_same_epoch(&alice_group, &bob_group)?;

    Ok(())
}

#[test]
fn test_message_from_a_group_reusing_the_group_id() -> Result<()> {
    let (_, _, bob, mut bob_group) = alice_and_bob(GroupConfig::default())?;
    let eve = Client::new("eve")?;
    let mallory = Client::new("mallory")?;

    let mut eve_group = Group::with_group_id(
        &eve.provider,
        &eve.identity,
        GroupConfig::default(),
        bob_group.group_id().clone(),
    )?;
    eve_group.add_members(&eve.provider, &eve.identity, &[mallory.key_package()?])?;
    eve_group.merge_pending_commit()?;
    assert_eq!(eve_group.epoch(), bob_group.epoch(), "same group id and epoch");

    let message = eve.send(&mut eve_group, b"let me in")?;
    let err = bob.receive(&mut bob_group, &message);
    assert_eq!(
        err,
        Err(Error::SenderDataDecryptionFailed),
        "sender data sealed under another key schedule"
    );
    assert_eq!(
        err.map_err(|e| e.kind()),
        Err(ErrorKind::AuthenticationFailure),
        "third-party message kind"
    );

    Ok(())
}

#[test]
fn test_group_config_serde() -> serde_json::Result<()> {
    let config = GroupConfig::builder()
        .with_padding_size(16)
        .use_ratchet_tree_extension(true)
        .with_sender_ratchet_configuration(SenderRatchetConfiguration {
            out_of_order_tolerance: 10,
            maximum_forward_distance: 100,
        })
        .build();

    let json = serde_json::to_string(&config)?;
    let decoded: GroupConfig = serde_json::from_str(&json)?;
    assert_eq!(decoded, config, "config survives JSON");

    let defaults: GroupConfig = serde_json::from_str("{}")?;
    assert_eq!(defaults, GroupConfig::default(), "every field has a default");
    assert_eq!(
        defaults.sender_ratchet_configuration().maximum_forward_distance,
        1000,
        "default forward distance"
    );

    Ok(())
}
