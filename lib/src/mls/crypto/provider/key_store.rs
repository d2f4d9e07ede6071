use std::fmt::Debug;

use bytes::Bytes;

use crate::mls::crypto::Secret;

/// Storage for private keys that must outlive a single call, keyed by an opaque reference.
///
/// Key package init and encryption keys are stored here when a key package is created and
/// deleted once the package has been used to join a group. The store also remembers which key
/// packages were consumed by an add, so a package cannot be added twice through one provider.
pub trait KeyStore: Send + Sync + Debug {
    fn store(&self, key: &[u8], value: Secret);

    fn retrieve(&self, key: &[u8]) -> Option<Secret>;

    fn delete(&self, key: &[u8]) -> Option<Secret>;

    /// Remembers the leaf encryption key advertised by a pending key package.
    fn store_leaf_key(&self, key_package_ref: &[u8], encryption_key: Bytes);

    fn leaf_key(&self, key_package_ref: &[u8]) -> Option<Bytes>;

    fn delete_leaf_key(&self, key_package_ref: &[u8]);

    /// Records that an add consumed `key_package_ref`. Returns `false` if it already was.
    fn mark_consumed(&self, key_package_ref: &[u8]) -> bool;

    fn is_consumed(&self, key_package_ref: &[u8]) -> bool;
}

#[derive(Default, Debug)]
pub struct MemoryKeyStore {
    values: scc::HashMap<Vec<u8>, Secret>,
    leaf_keys: scc::HashMap<Vec<u8>, Bytes>,
    consumed: scc::HashSet<Vec<u8>>,
}

impl MemoryKeyStore {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyStore for MemoryKeyStore {
    fn store(&self, key: &[u8], value: Secret) {
        self.values.upsert(key.to_vec(), value);
    }

    fn retrieve(&self, key: &[u8]) -> Option<Secret> {
        self.values.read(key, |_, v| v.clone())
    }

    fn delete(&self, key: &[u8]) -> Option<Secret> {
        self.values.remove(key).map(|(_, v)| v)
    }

    fn store_leaf_key(&self, key_package_ref: &[u8], encryption_key: Bytes) {
        self.leaf_keys.upsert(key_package_ref.to_vec(), encryption_key);
    }

    fn leaf_key(&self, key_package_ref: &[u8]) -> Option<Bytes> {
        self.leaf_keys.read(key_package_ref, |_, v| v.clone())
    }

    fn delete_leaf_key(&self, key_package_ref: &[u8]) {
        self.leaf_keys.remove(key_package_ref);
    }

    fn mark_consumed(&self, key_package_ref: &[u8]) -> bool {
        self.consumed.insert(key_package_ref.to_vec()).is_ok()
    }

    fn is_consumed(&self, key_package_ref: &[u8]) -> bool {
        self.consumed.contains(key_package_ref)
    }
}
