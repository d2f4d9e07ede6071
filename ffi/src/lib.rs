//! C ABI over [`treegroup`].
//!
//! Every entity crosses the boundary as a small `#[repr(C)]` context struct holding an opaque
//! 64-bit id into a process-wide arena. Contexts are created by exactly one call and released by
//! the matching `free_*` call; a released or zeroed context yields a `ResourceMisuse` error.
//!
//! Fallible calls return an [`FfiResult`]. On failure `error_message` holds `<kind>: <detail>`
//! and must be released with [`free_error_message`]. Byte buffers handed out by the library are
//! released with [`free_buffer`].
//!
//! All identities, groups and key packages in the process share one crypto provider, so the
//! private keys behind a key package stay available until the welcome that consumes it is
//! joined.

#![warn(unsafe_op_in_unsafe_fn)]

pub mod error;

mod arena;

#[cfg(test)]
mod ffi_test;

use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use treegroup::mls::default_cipher_suite;
use treegroup::mls::ratchet_tree::RatchetTree;
use treegroup::mls::utilities::serde::{Deserializer, Serializer};
use treegroup::{
    CipherSuite, Credential, Error, Group, GroupConfig, Identity, KeyPackage, PrivateMessage,
    PublicMessage, RustCryptoProvider, StagedJoin, Welcome,
};

use crate::arena::Arena;
pub use crate::error::{FfiError, FfiResult};
use crate::error::Result;

macro_rules! context {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[repr(C)]
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            id: u64,
        }
    };
}

context!(
    /// A member's view of a group.
    GroupContext
);
context!(
    /// The signing half of an identity.
    SignerContext
);
context!(
    /// The credential half of an identity.
    CredentialContext
);
context!(KeyPackageContext);
context!(WelcomeContext);
context!(
    /// A validated welcome that has not been joined yet.
    StagedWelcomeContext
);
context!(
    /// A commit, as sent to the other members.
    MlsMessageOutContext
);

struct GroupEntry {
    group: Group,
    /// Signer of the last call that authenticated as this member, used by [`send_message`].
    signer: Option<Identity>,
}

static PROVIDER: LazyLock<RustCryptoProvider> = LazyLock::new(RustCryptoProvider::default);

static CREDENTIALS: Arena<Credential> = Arena::new("credential");
static SIGNERS: Arena<Identity> = Arena::new("signer");
static KEY_PACKAGES: Arena<KeyPackage> = Arena::new("key package");
static GROUPS: Arena<GroupEntry> = Arena::new("group");
static WELCOMES: Arena<Welcome> = Arena::new("welcome");
static STAGED_WELCOMES: Arena<StagedJoin> = Arena::new("staged welcome");
static MESSAGES: Arena<PublicMessage> = Arena::new("message");

/// Groups created or joined through this interface always carry the ratchet tree in their
/// welcomes, so joiners may pass an empty tree.
fn group_config() -> GroupConfig {
    GroupConfig::builder().use_ratchet_tree_extension(true).build()
}

/// 0 selects the default cipher suite.
fn cipher_suite(ciphersuite_id: u32) -> CipherSuite {
    match ciphersuite_id {
        0 => default_cipher_suite(),
        id => u16::try_from(id).map_or(CipherSuite::Unknown(u16::MAX), CipherSuite::from),
    }
}

fn call(operation: &'static str, body: impl FnOnce() -> Result<()>) -> FfiResult {
    let result = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or(Err(FfiError::Panic));
    match result {
        Ok(()) => FfiResult::ok(),
        Err(err) => {
            log::warn!("{operation} failed: {err}");
            FfiResult::error(&err)
        }
    }
}

fn release<T>(arena: &Arena<T>, id: u64) {
    if let Err(err) = arena.remove(id) {
        log::debug!("ignored release: {err}");
    }
}

/// # Safety
///
/// `ptr` is null or valid for reads.
unsafe fn read<T: Copy>(ptr: *const T, what: &'static str) -> Result<T> {
    // SAFETY: the caller guarantees `ptr` is null or valid for reads.
    unsafe { ptr.as_ref() }
        .copied()
        .ok_or(FfiError::NullPointer(what))
}

/// # Safety
///
/// `data` is null or points to `len` readable bytes that outlive `'a`.
unsafe fn bytes<'a>(data: *const u8, len: usize, what: &'static str) -> Result<&'a [u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    // SAFETY: `data` is non-null and the caller guarantees `len` readable bytes.
    Ok(unsafe { std::slice::from_raw_parts(data, len) })
}

/// # Safety
///
/// `ptr` is null or points to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    // SAFETY: `ptr` is non-null and the caller guarantees NUL termination.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiError::InvalidUtf8(what))
}

/// A destination the caller provided for one value.
struct Out<T> {
    ptr: *mut T,
}

impl<T> Out<T> {
    fn new(ptr: *mut T, what: &'static str) -> Result<Self> {
        if ptr.is_null() {
            return Err(FfiError::NullPointer(what));
        }
        Ok(Self { ptr })
    }

    /// # Safety
    ///
    /// The pointer given to [`Out::new`] is valid for writes.
    unsafe fn write(self, value: T) {
        // SAFETY: checked non-null in `new`, writable per the caller's contract.
        unsafe { self.ptr.write(value) }
    }
}

/// A destination the caller provided for an owned byte buffer.
struct BufferOut {
    data: Out<*mut u8>,
    len: Out<usize>,
}

impl BufferOut {
    fn new(data: *mut *mut u8, len: *mut usize) -> Result<Self> {
        Ok(Self {
            data: Out::new(data, "out_data")?,
            len: Out::new(len, "out_len")?,
        })
    }

    /// Hands a copy of `bytes` to the caller, to be released with [`free_buffer`].
    ///
    /// # Safety
    ///
    /// The pointers given to [`BufferOut::new`] are valid for writes.
    unsafe fn write(self, bytes: &[u8]) {
        let buffer: Box<[u8]> = bytes.into();
        let len = buffer.len();
        // SAFETY: forwarded from the caller's contract.
        unsafe {
            self.data.write(Box::into_raw(buffer).cast::<u8>());
            self.len.write(len);
        }
    }
}

/// Resolves the identity behind `signer` and checks that `credential` belongs to it.
///
/// # Safety
///
/// Both pointers are null or valid for reads.
unsafe fn bound_identity(
    signer: *const SignerContext,
    credential: *const CredentialContext,
) -> Result<Identity> {
    // SAFETY: forwarded from the caller's contract.
    let (signer, credential) =
        unsafe { (read(signer, "signer")?, read(credential, "credential")?) };
    let identity = SIGNERS.get(signer.id)?;
    let credential = CREDENTIALS.get(credential.id)?;
    if identity.credential() != &credential {
        return Err(Error::SignerMismatch.into());
    }
    Ok(identity)
}

/// Releases a message returned in a failed [`FfiResult`].
///
/// # Safety
///
/// `result` was returned by this library and its message has not been released yet.
#[no_mangle]
pub unsafe extern "C" fn free_error_message(result: FfiResult) {
    if !result.error_message.is_null() {
        // SAFETY: the message was allocated by `CString::into_raw` in `FfiResult::error`.
        drop(unsafe { CString::from_raw(result.error_message) });
    }
}

/// Releases a buffer handed out by this library.
///
/// # Safety
///
/// `buffer` and `len` were returned together by one call of this library and `buffer` has not
/// been released yet.
#[no_mangle]
pub unsafe extern "C" fn free_buffer(buffer: *mut u8, len: usize) {
    if !buffer.is_null() {
        // SAFETY: the buffer was a `Box<[u8]>` of `len` bytes, see `BufferOut::write`.
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(buffer, len)) });
    }
}

#[no_mangle]
pub extern "C" fn get_default_ciphersuite() -> u32 {
    u32::from(u16::from(default_cipher_suite()))
}

/// Creates an identity for the default cipher suite.
///
/// # Safety
///
/// `identity` is a NUL-terminated UTF-8 string. The out pointers are valid for writes.
#[no_mangle]
pub unsafe extern "C" fn generate_credential(
    identity: *const c_char,
    out_credential: *mut CredentialContext,
    out_signer: *mut SignerContext,
) -> FfiResult {
    // SAFETY: forwarded from the caller's contract.
    unsafe { generate_credential_with_ciphersuite(identity, 0, out_credential, out_signer) }
}

/// Creates an identity named `identity` for the cipher suite `ciphersuite_id`.
///
/// # Safety
///
/// `identity` is a NUL-terminated UTF-8 string. The out pointers are valid for writes.
#[no_mangle]
pub unsafe extern "C" fn generate_credential_with_ciphersuite(
    identity: *const c_char,
    ciphersuite_id: u32,
    out_credential: *mut CredentialContext,
    out_signer: *mut SignerContext,
) -> FfiResult {
    call("generate_credential", || {
        // SAFETY: forwarded from the caller's contract.
        let name = unsafe { c_str(identity, "identity")? };
        let out_credential = Out::new(out_credential, "out_credential")?;
        let out_signer = Out::new(out_signer, "out_signer")?;

        let identity =
            Identity::new(&*PROVIDER, name.as_bytes().to_vec(), cipher_suite(ciphersuite_id))?;
        let credential = CREDENTIALS.insert(identity.credential().clone())?;
        let signer = SIGNERS.insert(identity).inspect_err(|_| release(&CREDENTIALS, credential))?;

        // SAFETY: forwarded from the caller's contract.
        unsafe {
            out_credential.write(CredentialContext { id: credential });
            out_signer.write(SignerContext { id: signer });
        }
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn free_credential(context: CredentialContext) {
    release(&CREDENTIALS, context.id);
}

#[no_mangle]
pub extern "C" fn free_signer(context: SignerContext) {
    release(&SIGNERS, context.id);
}

/// Creates a key package for the identity behind `signer` and `credential`.
///
/// # Safety
///
/// `signer` and `credential` are valid for reads, `out_key_package` for writes.
#[no_mangle]
pub unsafe extern "C" fn generate_key_package(
    signer: *const SignerContext,
    credential: *const CredentialContext,
    out_key_package: *mut KeyPackageContext,
) -> FfiResult {
    // SAFETY: forwarded from the caller's contract.
    unsafe { generate_key_package_with_ciphersuite(0, signer, credential, out_key_package) }
}

/// Like [`generate_key_package`], failing unless the identity uses `ciphersuite_id`.
/// 0 accepts the identity's own cipher suite.
///
/// # Safety
///
/// `signer` and `credential` are valid for reads, `out_key_package` for writes.
#[no_mangle]
pub unsafe extern "C" fn generate_key_package_with_ciphersuite(
    ciphersuite_id: u32,
    signer: *const SignerContext,
    credential: *const CredentialContext,
    out_key_package: *mut KeyPackageContext,
) -> FfiResult {
    call("generate_key_package", || {
        // SAFETY: forwarded from the caller's contract.
        let identity = unsafe { bound_identity(signer, credential)? };
        let out_key_package = Out::new(out_key_package, "out_key_package")?;

        let requested = cipher_suite(ciphersuite_id);
        if ciphersuite_id != 0 && requested != identity.cipher_suite() {
            return Err(Error::CipherSuiteMismatch(requested).into());
        }

        let key_package = identity.create_key_package(&*PROVIDER)?;
        let id = KEY_PACKAGES.insert(key_package)?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out_key_package.write(KeyPackageContext { id }) };
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn free_key_package(context: KeyPackageContext) {
    release(&KEY_PACKAGES, context.id);
}

/// Creates a group with the identity behind `signer` and `credential` as its only member.
///
/// # Safety
///
/// `signer` and `credential` are valid for reads, `out_group` for writes.
#[no_mangle]
pub unsafe extern "C" fn create_mls_group(
    signer: *const SignerContext,
    credential: *const CredentialContext,
    out_group: *mut GroupContext,
) -> FfiResult {
    call("create_mls_group", || {
        // SAFETY: forwarded from the caller's contract.
        let identity = unsafe { bound_identity(signer, credential)? };
        let out_group = Out::new(out_group, "out_group")?;

        let group = Group::new(&*PROVIDER, &identity, group_config())?;
        let id = GROUPS.insert(GroupEntry {
            group,
            signer: Some(identity),
        })?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out_group.write(GroupContext { id }) };
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn free_group(context: GroupContext) {
    release(&GROUPS, context.id);
}

/// Stages a commit adding the owners of `key_packages` and returns one welcome addressed to all
/// of them. The group moves to the next epoch on [`merge_pending_commit`]; the commit for the
/// other members is available through [`get_pending_commit`].
///
/// # Safety
///
/// `group` and `signer` are valid for reads. `key_packages` points to `key_package_count`
/// pointers that are each valid for reads. `out_welcome` is valid for writes.
#[no_mangle]
pub unsafe extern "C" fn add_members(
    group: *mut GroupContext,
    signer: *const SignerContext,
    key_packages: *const *const KeyPackageContext,
    key_package_count: usize,
    out_welcome: *mut WelcomeContext,
) -> FfiResult {
    call("add_members", || {
        // SAFETY: forwarded from the caller's contract.
        let (group, signer) = unsafe { (read(group, "group")?, read(signer, "signer")?) };
        let out_welcome = Out::new(out_welcome, "out_welcome")?;
        let identity = SIGNERS.get(signer.id)?;

        if key_package_count > 0 && key_packages.is_null() {
            return Err(FfiError::NullPointer("key_packages"));
        }
        let mut resolved = Vec::with_capacity(key_package_count);
        for i in 0..key_package_count {
            // SAFETY: `key_packages` holds `key_package_count` readable pointers.
            let key_package = unsafe { read(*key_packages.add(i), "key_packages")? };
            resolved.push(KEY_PACKAGES.get(key_package.id)?);
        }

        let welcomes = GROUPS.with(group.id, |entry| -> Result<Vec<Welcome>> {
            let (_, welcomes) = entry.group.add_members(&*PROVIDER, &identity, &resolved)?;
            entry.signer = Some(identity);
            Ok(welcomes)
        })??;
        let id = WELCOMES.insert(Welcome::combine(welcomes)?)?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out_welcome.write(WelcomeContext { id }) };
        Ok(())
    })
}

/// Moves the group to the epoch of its pending commit.
///
/// # Safety
///
/// `group` is valid for reads.
#[no_mangle]
pub unsafe extern "C" fn merge_pending_commit(group: *mut GroupContext) -> FfiResult {
    call("merge_pending_commit", || {
        // SAFETY: forwarded from the caller's contract.
        let group = unsafe { read(group, "group")? };
        GROUPS.with(group.id, |entry| entry.group.merge_pending_commit())??;
        Ok(())
    })
}

/// Returns the group's pending commit, to be delivered to the other members.
///
/// # Safety
///
/// `group` is valid for reads, `out_message` for writes.
#[no_mangle]
pub unsafe extern "C" fn get_pending_commit(
    group: *const GroupContext,
    out_message: *mut MlsMessageOutContext,
) -> FfiResult {
    call("get_pending_commit", || {
        // SAFETY: forwarded from the caller's contract.
        let group = unsafe { read(group, "group")? };
        let out_message = Out::new(out_message, "out_message")?;

        let commit = GROUPS.with(group.id, |entry| {
            entry
                .group
                .pending_commit()
                .cloned()
                .ok_or(Error::NoPendingCommit)
        })??;
        let id = MESSAGES.insert(commit)?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out_message.write(MlsMessageOutContext { id }) };
        Ok(())
    })
}

/// # Safety
///
/// `message` is valid for reads, `out_data` and `out_len` for writes.
#[no_mangle]
pub unsafe extern "C" fn serialize_message_out(
    message: *const MlsMessageOutContext,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> FfiResult {
    call("serialize_message_out", || {
        // SAFETY: forwarded from the caller's contract.
        let message = unsafe { read(message, "message")? };
        let out = BufferOut::new(out_data, out_len)?;

        let raw = MESSAGES.with(message.id, |message| message.serialize_detached())??;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out.write(&raw) };
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn free_message_out(context: MlsMessageOutContext) {
    release(&MESSAGES, context.id);
}

/// Applies a commit created by another member, moving the group to the next epoch.
///
/// # Safety
///
/// `group` is valid for reads and `message_data` points to `message_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn apply_commit(
    group: *mut GroupContext,
    message_data: *const u8,
    message_len: usize,
) -> FfiResult {
    call("apply_commit", || {
        // SAFETY: forwarded from the caller's contract.
        let (group, raw) = unsafe {
            (
                read(group, "group")?,
                bytes(message_data, message_len, "message_data")?,
            )
        };
        let message = PublicMessage::deserialize_exact(raw)?;
        GROUPS.with(group.id, |entry| entry.group.apply_commit(&*PROVIDER, &message))??;
        Ok(())
    })
}

/// Serializes the group's current ratchet tree for joiners.
///
/// # Safety
///
/// `group` is valid for reads, `out_data` and `out_len` for writes.
#[no_mangle]
pub unsafe extern "C" fn export_ratchet_tree(
    group: *const GroupContext,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> FfiResult {
    call("export_ratchet_tree", || {
        // SAFETY: forwarded from the caller's contract.
        let group = unsafe { read(group, "group")? };
        let out = BufferOut::new(out_data, out_len)?;

        let raw = GROUPS.with(group.id, |entry| entry.group.export_ratchet_tree())??;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out.write(&raw) };
        Ok(())
    })
}

/// # Safety
///
/// `welcome` is valid for reads, `out_data` and `out_len` for writes.
#[no_mangle]
pub unsafe extern "C" fn serialize_welcome(
    welcome: *const WelcomeContext,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> FfiResult {
    call("serialize_welcome", || {
        // SAFETY: forwarded from the caller's contract.
        let welcome = unsafe { read(welcome, "welcome")? };
        let out = BufferOut::new(out_data, out_len)?;

        let raw = WELCOMES.with(welcome.id, |welcome| welcome.serialize_detached())??;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out.write(&raw) };
        Ok(())
    })
}

/// # Safety
///
/// `data` points to `data_len` readable bytes, `out_welcome` is valid for writes.
#[no_mangle]
pub unsafe extern "C" fn deserialize_welcome(
    data: *const u8,
    data_len: usize,
    out_welcome: *mut WelcomeContext,
) -> FfiResult {
    call("deserialize_welcome", || {
        // SAFETY: forwarded from the caller's contract.
        let raw = unsafe { bytes(data, data_len, "data")? };
        let out_welcome = Out::new(out_welcome, "out_welcome")?;

        let id = WELCOMES.insert(Welcome::deserialize_exact(raw)?)?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out_welcome.write(WelcomeContext { id }) };
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn free_welcome(context: WelcomeContext) {
    release(&WELCOMES, context.id);
}

/// Validates `welcome` against a key package generated in this process. An empty
/// `ratchet_tree_data` takes the tree from the welcome itself.
///
/// # Safety
///
/// `welcome` is valid for reads, `ratchet_tree_data` points to `ratchet_tree_len` readable
/// bytes, and `out_staged_welcome` is valid for writes.
#[no_mangle]
pub unsafe extern "C" fn create_staged_welcome(
    welcome: *const WelcomeContext,
    ratchet_tree_data: *const u8,
    ratchet_tree_len: usize,
    out_staged_welcome: *mut StagedWelcomeContext,
) -> FfiResult {
    call("create_staged_welcome", || {
        // SAFETY: forwarded from the caller's contract.
        let (welcome, raw_tree) = unsafe {
            (
                read(welcome, "welcome")?,
                bytes(ratchet_tree_data, ratchet_tree_len, "ratchet_tree_data")?,
            )
        };
        let out_staged_welcome = Out::new(out_staged_welcome, "out_staged_welcome")?;

        let ratchet_tree = if raw_tree.is_empty() {
            None
        } else {
            Some(RatchetTree::deserialize_exact(raw_tree)?)
        };
        let welcome = WELCOMES.get(welcome.id)?;
        let staged = StagedJoin::new(&*PROVIDER, group_config(), &welcome, ratchet_tree)?;

        let id = STAGED_WELCOMES.insert(staged)?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out_staged_welcome.write(StagedWelcomeContext { id }) };
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn free_staged_welcome(context: StagedWelcomeContext) {
    release(&STAGED_WELCOMES, context.id);
}

/// Joins the group of a staged welcome. The staged welcome is consumed and its context zeroed.
///
/// # Safety
///
/// `staged_welcome` is valid for reads and writes, `out_group` for writes.
#[no_mangle]
pub unsafe extern "C" fn complete_group_join(
    staged_welcome: *mut StagedWelcomeContext,
    out_group: *mut GroupContext,
) -> FfiResult {
    call("complete_group_join", || {
        // SAFETY: forwarded from the caller's contract.
        let staged = unsafe { read(staged_welcome, "staged_welcome")? };
        let out_group = Out::new(out_group, "out_group")?;

        let group = STAGED_WELCOMES.remove(staged.id)?.complete_join(&*PROVIDER);
        let id = GROUPS.insert(GroupEntry {
            group,
            signer: None,
        })?;
        // SAFETY: forwarded from the caller's contract; `staged_welcome` was read above.
        unsafe {
            staged_welcome.write(StagedWelcomeContext::default());
            out_group.write(GroupContext { id });
        }
        Ok(())
    })
}

/// Encrypts an application message and binds `signer` to the group for [`send_message`].
///
/// # Safety
///
/// `group` and `signer` are valid for reads, `message_data` points to `message_len` readable
/// bytes, and `out_data` and `out_len` are valid for writes.
#[no_mangle]
pub unsafe extern "C" fn encrypt_message(
    group: *mut GroupContext,
    signer: *const SignerContext,
    message_data: *const u8,
    message_len: usize,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> FfiResult {
    call("encrypt_message", || {
        // SAFETY: forwarded from the caller's contract.
        let (group, signer, plaintext) = unsafe {
            (
                read(group, "group")?,
                read(signer, "signer")?,
                bytes(message_data, message_len, "message_data")?,
            )
        };
        let out = BufferOut::new(out_data, out_len)?;
        let identity = SIGNERS.get(signer.id)?;

        let raw = GROUPS.with(group.id, |entry| -> Result<_> {
            let message = entry.group.encrypt_message(&*PROVIDER, &identity, plaintext)?;
            entry.signer = Some(identity);
            Ok(message.serialize_detached()?)
        })??;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out.write(&raw) };
        Ok(())
    })
}

/// Decrypts an application message of the group's current epoch.
///
/// # Safety
///
/// `group` is valid for reads, `message_data` points to `message_len` readable bytes, and
/// `out_data` and `out_len` are valid for writes.
#[no_mangle]
pub unsafe extern "C" fn decrypt_message(
    group: *mut GroupContext,
    message_data: *const u8,
    message_len: usize,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> FfiResult {
    call("decrypt_message", || {
        // SAFETY: forwarded from the caller's contract.
        let (group, raw) = unsafe {
            (
                read(group, "group")?,
                bytes(message_data, message_len, "message_data")?,
            )
        };
        let out = BufferOut::new(out_data, out_len)?;

        let message = PrivateMessage::deserialize_exact(raw)?;
        let plaintext =
            GROUPS.with(group.id, |entry| entry.group.decrypt_message(&*PROVIDER, &message))??;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out.write(&plaintext) };
        Ok(())
    })
}

/// Encrypts `message_text` with the signer last bound to the group.
///
/// # Safety
///
/// `group` is valid for reads, `message_text` is a NUL-terminated UTF-8 string, and `out_data`
/// and `out_len` are valid for writes.
#[no_mangle]
pub unsafe extern "C" fn send_message(
    group: *mut GroupContext,
    message_text: *const c_char,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> FfiResult {
    call("send_message", || {
        // SAFETY: forwarded from the caller's contract.
        let (group, text) =
            unsafe { (read(group, "group")?, c_str(message_text, "message_text")?) };
        let out = BufferOut::new(out_data, out_len)?;

        let raw = GROUPS.with(group.id, |entry| -> Result<_> {
            let signer = entry.signer.as_ref().ok_or(FfiError::NoSigner)?;
            let message = entry.group.encrypt_message(&*PROVIDER, signer, text.as_bytes())?;
            Ok(message.serialize_detached()?)
        })??;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out.write(&raw) };
        Ok(())
    })
}

/// # Safety
///
/// `key_package` is valid for reads, `out_data` and `out_len` for writes.
#[no_mangle]
pub unsafe extern "C" fn serialize_key_package(
    key_package: *const KeyPackageContext,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> FfiResult {
    call("serialize_key_package", || {
        // SAFETY: forwarded from the caller's contract.
        let key_package = unsafe { read(key_package, "key_package")? };
        let out = BufferOut::new(out_data, out_len)?;

        let raw = KEY_PACKAGES.with(key_package.id, |key_package| key_package.to_bytes())??;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out.write(&raw) };
        Ok(())
    })
}

/// Decodes a key package and verifies its signature.
///
/// # Safety
///
/// `data` points to `data_len` readable bytes, `out_key_package` is valid for writes.
#[no_mangle]
pub unsafe extern "C" fn deserialize_key_package(
    data: *const u8,
    data_len: usize,
    out_key_package: *mut KeyPackageContext,
) -> FfiResult {
    call("deserialize_key_package", || {
        // SAFETY: forwarded from the caller's contract.
        let raw = unsafe { bytes(data, data_len, "data")? };
        let out_key_package = Out::new(out_key_package, "out_key_package")?;

        let id = KEY_PACKAGES.insert(KeyPackage::from_bytes(&*PROVIDER, raw)?)?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { out_key_package.write(KeyPackageContext { id }) };
        Ok(())
    })
}
