use std::collections::BTreeMap;

use super::*;
use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::{CryptoProvider, KeyStore, RustCryptoProvider};
use crate::mls::identity::Identity;
use crate::mls::key_package::KeyPackage;

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;
const GROUP_ID: &[u8] = b"ratchet tree test";

struct Member {
    identity: Identity,
    key_package: KeyPackage,
}

fn member(provider: &RustCryptoProvider, name: &'static str) -> Result<Member> {
    let identity = Identity::new(provider, name, SUITE)?;
    let key_package = KeyPackage::new(provider, &identity)?;
    Ok(Member {
        identity,
        key_package,
    })
}

/// A tree of `members` added one after the other, with no parent nodes yet.
fn tree_of(members: &[Member]) -> RatchetTree {
    let mut tree = RatchetTree::default();
    for m in members {
        tree.add_leaf(m.key_package.leaf_node().clone());
    }
    tree
}

#[test]
fn test_add_leaf_grows_to_power_of_two() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let members = ["a", "b", "c"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;

    let tree = tree_of(&members);
    assert_eq!(tree.num_leaves(), NumLeaves(4), "3 members need 4 leaves");
    assert_eq!(tree.0.len(), 7, "full tree of 4 leaves has 7 nodes");
    assert_eq!(tree.member_count(), 3, "one leaf is blank");
    assert_eq!(
        tree.find_leaf(members[2].key_package.leaf_node()),
        Some(LeafIndex(2)),
        "leaves fill left to right"
    );

    Ok(())
}

#[test]
fn test_resolution_and_filtered_direct_path() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let members = ["a", "b", "c"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;
    let tree = tree_of(&members);

    // Blank parents resolve to their non-blank leaves.
    assert_eq!(
        tree.resolution(NodeIndex(3)),
        vec![NodeIndex(0), NodeIndex(2), NodeIndex(4)],
        "root"
    );
    assert_eq!(tree.resolution(NodeIndex(5)), vec![NodeIndex(4)], "right subtree");
    assert!(tree.resolution(NodeIndex(6)).is_empty(), "blank leaf");

    assert_eq!(
        tree.filtered_direct_path(NodeIndex(0)),
        vec![NodeIndex(1), NodeIndex(3)],
        "both copath nodes are populated"
    );
    assert_eq!(
        tree.filtered_direct_path(NodeIndex(4)),
        vec![NodeIndex(3)],
        "node 5 is skipped, its copath child is blank"
    );

    Ok(())
}

#[test]
fn test_ratchet_tree_encoding_drops_trailing_blanks() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let members = ["a", "b", "c"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;
    let tree = tree_of(&members);

    let raw = tree.serialize_detached()?;
    let decoded = RatchetTree::deserialize_exact(&raw)?;
    assert_eq!(decoded, tree, "decoding restores the full width");
    assert_eq!(
        decoded.compute_root_tree_hash(&provider, SUITE)?,
        tree.compute_root_tree_hash(&provider, SUITE)?,
        "tree hash survives the encoding"
    );

    Ok(())
}

#[test]
fn test_ratchet_tree_rejects_malformed_encodings() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let a = member(&provider, "a")?;

    let empty = RatchetTree::default().serialize_detached()?;
    assert_eq!(
        RatchetTree::deserialize_exact(&empty),
        Err(Error::MalformedRatchetTree("tree has no nodes")),
        "empty tree"
    );

    let misplaced = RatchetTree(vec![
        None,
        Some(Node::Leaf(a.key_package.leaf_node().clone())),
        None,
    ]);
    let raw = misplaced.serialize_detached()?;
    assert_eq!(
        RatchetTree::deserialize_exact(&raw),
        Err(Error::MalformedRatchetTree("leaf node at a parent position")),
        "leaf at odd index"
    );

    Ok(())
}

#[test]
fn test_tree_hash_tracks_changes() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let members = ["a", "b"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;

    let one = tree_of(&members[..1]);
    let two = tree_of(&members);
    let hash_one = one.compute_root_tree_hash(&provider, SUITE)?;
    let hash_two = two.compute_root_tree_hash(&provider, SUITE)?;

    assert_eq!(hash_one.len(), 32, "SHA-256 tree hash");
    assert_ne!(hash_one, hash_two, "adding a leaf changes the tree hash");
    assert_eq!(
        hash_two,
        tree_of(&members).compute_root_tree_hash(&provider, SUITE)?,
        "tree hash is deterministic"
    );

    Ok(())
}

#[test]
fn test_update_path_round_trip() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let group_id = Bytes::from_static(GROUP_ID);
    let members = ["alice", "bob", "carol"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;
    let alice = LeafIndex(0);
    let context = b"group context";

    let mut committer_tree = tree_of(&members);
    let path_update =
        committer_tree.update_direct_path(&provider, &members[0].identity, &group_id, alice)?;
    assert_eq!(
        path_update.filtered_direct_path,
        vec![NodeIndex(1), NodeIndex(3)],
        "committer re-keys its filtered direct path"
    );
    let update_path =
        path_update.encrypt(&provider, SUITE, &committer_tree, alice, context, &[])?;

    for (i, receiver) in members.iter().enumerate().skip(1) {
        let own_leaf = LeafIndex(i as u32);
        let mut tree = tree_of(&members);
        let fdp = tree.merge_update_path(&provider, SUITE, &group_id, alice, &update_path)?;
        assert_eq!(tree, committer_tree, "receiver {i} converges on the same tree");

        let leaf_key = provider
            .key_store()
            .retrieve(receiver.key_package.leaf_node().encryption_key())
            .ok_or(Error::OwnLeafNotFound)?;
        let private_keys = BTreeMap::from([(own_leaf.node_index(), leaf_key)]);

        let (position, path_secret) = tree.decrypt_path_secret(
            &provider,
            SUITE,
            own_leaf,
            alice,
            &fdp,
            &update_path,
            &private_keys,
            context,
            &[],
        )?;
        assert_eq!(
            Some(&path_secret),
            path_update.path_secret_for(own_leaf),
            "receiver {i} decrypts its path secret"
        );

        let (keys, commit_secret) =
            tree.derive_path_keys(&provider, SUITE, &fdp[position..], path_secret)?;
        assert_eq!(keys.len(), fdp.len() - position, "one key per node above the receiver");
        assert_eq!(
            commit_secret, path_update.commit_secret,
            "receiver {i} derives the commit secret"
        );
    }

    committer_tree.verify_integrity(&provider, SUITE, &group_id)?;

    Ok(())
}

#[test]
fn test_update_path_excludes_new_leaves() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let group_id = Bytes::from_static(GROUP_ID);
    let members = ["alice", "bob"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;

    let mut tree = tree_of(&members);
    let path_update =
        tree.update_direct_path(&provider, &members[0].identity, &group_id, LeafIndex(0))?;
    let update_path =
        path_update.encrypt(&provider, SUITE, &tree, LeafIndex(0), b"ctx", &[LeafIndex(1)])?;

    assert_eq!(update_path.nodes.len(), 1, "one path node");
    assert!(
        update_path.nodes[0].encrypted_path_secret.is_empty(),
        "nothing is encrypted to the excluded leaf"
    );

    Ok(())
}

#[test]
fn test_merge_update_path_rejects_foreign_signer() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let group_id = Bytes::from_static(GROUP_ID);
    let members = ["alice", "bob"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;
    let mallory = Identity::new(&provider, "mallory", SUITE)?;

    let mut forged = tree_of(&members);
    let path_update = forged.update_direct_path(&provider, &mallory, &group_id, LeafIndex(0))?;
    let update_path =
        path_update.encrypt(&provider, SUITE, &forged, LeafIndex(0), b"ctx", &[])?;

    let mut tree = tree_of(&members);
    assert_eq!(
        tree.merge_update_path(&provider, SUITE, &group_id, LeafIndex(0), &update_path),
        Err(Error::SignerMismatch),
        "leaf 0 belongs to alice"
    );

    Ok(())
}

#[test]
fn test_out_of_range_leaf_index_is_absent() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let members = ["a", "b"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;
    let tree = tree_of(&members);

    assert!(tree.get_leaf(LeafIndex(2)).is_none(), "past the last leaf");
    assert!(tree.get_leaf(LeafIndex(0x8000_0000)).is_none(), "node index would wrap to 0");
    assert!(tree.get_leaf(LeafIndex(u32::MAX)).is_none(), "largest leaf index");
    assert!(
        !LeafIndex(0x8000_0000).node_index().is_leaf(),
        "an overflowing node index never names a leaf"
    );
    assert_eq!(LeafIndex(3).node_index(), NodeIndex(6), "in-range leaves are unaffected");

    Ok(())
}

#[test]
fn test_verify_integrity_rejects_altered_parent_hash() -> Result<()> {
    let provider = RustCryptoProvider::default();
    let group_id = Bytes::from_static(GROUP_ID);
    let members = ["alice", "bob", "carol"]
        .into_iter()
        .map(|name| member(&provider, name))
        .collect::<Result<Vec<_>>>()?;

    let mut tree = tree_of(&members);
    tree.update_direct_path(&provider, &members[0].identity, &group_id, LeafIndex(0))?;
    tree.verify_integrity(&provider, SUITE, &group_id)?;

    let Some(Node::Parent(parent)) = tree.get_mut(NodeIndex(1)) else {
        panic!("node 1 is populated by the update path");
    };
    let mut altered = parent.parent_hash.to_vec();
    assert!(!altered.is_empty(), "node 1 chains to the root");
    altered[0] ^= 0x01;
    parent.parent_hash = Bytes::from(altered);

    assert_eq!(
        tree.verify_integrity(&provider, SUITE, &group_id),
        Err(Error::ParentHashMismatch),
        "same-length hash differing in one byte"
    );

    Ok(())
}
