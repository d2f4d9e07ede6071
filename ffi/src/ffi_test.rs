use std::ffi::{CStr, CString};

use super::*;

type TestResult<T = ()> = std::result::Result<T, String>;

/// Turns a call's result into its error message, releasing it.
fn check(result: FfiResult) -> TestResult {
    if result.success {
        return Ok(());
    }
    // SAFETY: failed results carry a NUL-terminated message allocated by this library.
    let message = unsafe { CStr::from_ptr(result.error_message) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: the message is released exactly once.
    unsafe { free_error_message(result) };
    Err(message)
}

/// Copies a library buffer and releases it.
fn take_buffer(data: *mut u8, len: usize) -> Vec<u8> {
    // SAFETY: `data` and `len` were returned together by one library call.
    let copy = unsafe { std::slice::from_raw_parts(data, len) }.to_vec();
    // SAFETY: released exactly once.
    unsafe { free_buffer(data, len) };
    copy
}

fn buffer_call(f: impl FnOnce(*mut *mut u8, *mut usize) -> FfiResult) -> TestResult<Vec<u8>> {
    let mut data = std::ptr::null_mut();
    let mut len = 0;
    check(f(&mut data, &mut len))?;
    Ok(take_buffer(data, len))
}

struct Member {
    credential: CredentialContext,
    signer: SignerContext,
}

impl Member {
    fn new(name: &str) -> TestResult<Self> {
        let name = CString::new(name).map_err(|e| e.to_string())?;
        let mut credential = CredentialContext::default();
        let mut signer = SignerContext::default();
        // SAFETY: every pointer is valid for the duration of the call.
        check(unsafe { generate_credential(name.as_ptr(), &mut credential, &mut signer) })?;
        Ok(Self { credential, signer })
    }

    fn key_package(&self) -> TestResult<KeyPackageContext> {
        let mut key_package = KeyPackageContext::default();
        // SAFETY: every pointer is valid for the duration of the call.
        check(unsafe { generate_key_package(&self.signer, &self.credential, &mut key_package) })?;
        Ok(key_package)
    }

    fn create_group(&self) -> TestResult<GroupContext> {
        let mut group = GroupContext::default();
        // SAFETY: every pointer is valid for the duration of the call.
        check(unsafe { create_mls_group(&self.signer, &self.credential, &mut group) })?;
        Ok(group)
    }

    fn release(self) {
        free_credential(self.credential);
        free_signer(self.signer);
    }
}

fn add(
    group: &mut GroupContext,
    signer: &SignerContext,
    key_packages: &[KeyPackageContext],
) -> TestResult<WelcomeContext> {
    let pointers: Vec<*const KeyPackageContext> =
        key_packages.iter().map(std::ptr::from_ref).collect();
    let mut welcome = WelcomeContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    check(unsafe {
        add_members(
            group,
            signer,
            pointers.as_ptr(),
            pointers.len(),
            &mut welcome,
        )
    })?;
    Ok(welcome)
}

fn merge(group: &mut GroupContext) -> TestResult {
    // SAFETY: the pointer is valid for the duration of the call.
    check(unsafe { merge_pending_commit(group) })
}

fn ratchet_tree(group: &GroupContext) -> TestResult<Vec<u8>> {
    // SAFETY: every pointer is valid for the duration of the call.
    buffer_call(|data, len| unsafe { export_ratchet_tree(group, data, len) })
}

/// Moves a welcome through its wire encoding, then stages and completes the join.
fn join(welcome: &WelcomeContext, tree: &[u8]) -> TestResult<GroupContext> {
    // SAFETY: every pointer is valid for the duration of the call.
    let raw = buffer_call(|data, len| unsafe { serialize_welcome(welcome, data, len) })?;
    let mut received = WelcomeContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    check(unsafe { deserialize_welcome(raw.as_ptr(), raw.len(), &mut received) })?;

    let mut staged = StagedWelcomeContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    let staged_result =
        check(unsafe { create_staged_welcome(&received, tree.as_ptr(), tree.len(), &mut staged) });
    free_welcome(received);
    staged_result?;

    let mut group = GroupContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    check(unsafe { complete_group_join(&mut staged, &mut group) })?;
    assert_eq!(staged, StagedWelcomeContext::default(), "staged welcome is consumed");
    Ok(group)
}

fn encrypt(
    group: &mut GroupContext,
    signer: &SignerContext,
    plaintext: &[u8],
) -> TestResult<Vec<u8>> {
    // SAFETY: every pointer is valid for the duration of the call.
    buffer_call(|data, len| unsafe {
        encrypt_message(group, signer, plaintext.as_ptr(), plaintext.len(), data, len)
    })
}

fn send(group: &mut GroupContext, text: &str) -> TestResult<Vec<u8>> {
    let text = CString::new(text).map_err(|e| e.to_string())?;
    // SAFETY: every pointer is valid for the duration of the call.
    buffer_call(|data, len| unsafe { send_message(group, text.as_ptr(), data, len) })
}

fn decrypt(group: &mut GroupContext, message: &[u8]) -> TestResult<Vec<u8>> {
    // SAFETY: every pointer is valid for the duration of the call.
    buffer_call(|data, len| unsafe {
        decrypt_message(group, message.as_ptr(), message.len(), data, len)
    })
}

fn pending_commit(group: &GroupContext) -> TestResult<Vec<u8>> {
    let mut message = MlsMessageOutContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    check(unsafe { get_pending_commit(group, &mut message) })?;
    // SAFETY: every pointer is valid for the duration of the call.
    let raw = buffer_call(|data, len| unsafe { serialize_message_out(&message, data, len) });
    free_message_out(message);
    raw
}

fn apply(group: &mut GroupContext, commit: &[u8]) -> TestResult {
    // SAFETY: every pointer is valid for the duration of the call.
    check(unsafe { apply_commit(group, commit.as_ptr(), commit.len()) })
}

#[test]
fn test_default_ciphersuite() {
    assert_eq!(get_default_ciphersuite(), 1, "X25519, AES-128-GCM, SHA-256, Ed25519");
}

#[test]
fn test_two_members_exchange_messages() -> TestResult {
    let alice = Member::new("alice")?;
    let bob = Member::new("bob")?;

    let mut alice_group = alice.create_group()?;
    let bob_key_package = bob.key_package()?;
    let welcome = add(&mut alice_group, &alice.signer, &[bob_key_package])?;
    merge(&mut alice_group)?;
    let mut bob_group = join(&welcome, &ratchet_tree(&alice_group)?)?;
    free_welcome(welcome);
    free_key_package(bob_key_package);

    let message = send(&mut alice_group, "hello bob")?;
    assert_eq!(decrypt(&mut bob_group, &message)?, b"hello bob", "bob reads alice");

    let reply = encrypt(&mut bob_group, &bob.signer, b"hello alice")?;
    assert_eq!(decrypt(&mut alice_group, &reply)?, b"hello alice", "alice reads bob");

    // Bob's signer is now bound to his group.
    let again = send(&mut bob_group, "bound")?;
    assert_eq!(decrypt(&mut alice_group, &again)?, b"bound", "send_message after encrypt");

    let err = decrypt(&mut bob_group, &message).err().unwrap_or_default();
    assert!(err.starts_with("ReplayDetected"), "replay: {err}");

    free_group(alice_group);
    free_group(bob_group);
    alice.release();
    bob.release();
    Ok(())
}

#[test]
fn test_join_with_tree_from_welcome() -> TestResult {
    let alice = Member::new("alice")?;
    let bob = Member::new("bob")?;

    let mut alice_group = alice.create_group()?;
    let welcome = add(&mut alice_group, &alice.signer, &[bob.key_package()?])?;
    merge(&mut alice_group)?;

    let mut bob_group = join(&welcome, &[])?;
    let message = send(&mut alice_group, "no tree needed")?;
    assert_eq!(
        decrypt(&mut bob_group, &message)?,
        b"no tree needed",
        "tree came from the welcome"
    );

    Ok(())
}

#[test]
fn test_third_member_follows_commit() -> TestResult {
    let alice = Member::new("alice")?;
    let bob = Member::new("bob")?;
    let carol = Member::new("carol")?;

    let mut alice_group = alice.create_group()?;
    let welcome = add(&mut alice_group, &alice.signer, &[bob.key_package()?])?;
    merge(&mut alice_group)?;
    let mut bob_group = join(&welcome, &ratchet_tree(&alice_group)?)?;

    let welcome = add(&mut alice_group, &alice.signer, &[carol.key_package()?])?;
    let commit = pending_commit(&alice_group)?;
    merge(&mut alice_group)?;
    apply(&mut bob_group, &commit)?;
    let mut carol_group = join(&welcome, &ratchet_tree(&alice_group)?)?;

    assert_eq!(
        ratchet_tree(&bob_group)?,
        ratchet_tree(&carol_group)?,
        "bob and carol agree on the tree"
    );

    let message = encrypt(&mut carol_group, &carol.signer, b"hi all")?;
    assert_eq!(decrypt(&mut alice_group, &message)?, b"hi all", "alice reads carol");
    assert_eq!(decrypt(&mut bob_group, &message)?, b"hi all", "bob reads carol");

    let err = apply(&mut bob_group, &commit).err().unwrap_or_default();
    assert!(err.starts_with("StaleEpoch"), "commit applied twice: {err}");

    let err = pending_commit(&alice_group).err().unwrap_or_default();
    assert!(err.starts_with("NoPendingCommit"), "nothing staged: {err}");

    Ok(())
}

#[test]
fn test_key_package_round_trip() -> TestResult {
    let bob = Member::new("bob")?;
    let key_package = bob.key_package()?;

    // SAFETY: every pointer is valid for the duration of the call.
    let raw = buffer_call(|data, len| unsafe { serialize_key_package(&key_package, data, len) })?;
    let mut decoded = KeyPackageContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    check(unsafe { deserialize_key_package(raw.as_ptr(), raw.len(), &mut decoded) })?;
    assert_ne!(decoded, key_package, "decoding makes a new handle");

    // SAFETY: every pointer is valid for the duration of the call.
    let err = check(unsafe { deserialize_key_package(raw.as_ptr(), raw.len() - 1, &mut decoded) })
        .err()
        .unwrap_or_default();
    assert!(err.starts_with("SerializationError"), "truncated key package: {err}");

    Ok(())
}

#[test]
fn test_key_package_reuse_is_rejected() -> TestResult {
    let alice = Member::new("alice")?;
    let bob = Member::new("bob")?;

    let mut group = alice.create_group()?;
    let key_package = bob.key_package()?;
    add(&mut group, &alice.signer, &[key_package])?;
    merge(&mut group)?;

    let err = add(&mut group, &alice.signer, &[key_package])
        .err()
        .unwrap_or_default();
    assert!(err.starts_with("InvalidKeyPackage"), "second add: {err}");

    Ok(())
}

#[test]
fn test_mismatched_signer_and_credential() -> TestResult {
    let alice = Member::new("alice")?;
    let bob = Member::new("bob")?;

    let mut group = GroupContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    let err = check(unsafe { create_mls_group(&alice.signer, &bob.credential, &mut group) })
        .err()
        .unwrap_or_default();
    assert!(err.starts_with("SignatureError"), "bob's credential with alice's signer: {err}");

    let mut key_package = KeyPackageContext::default();
    // SAFETY: every pointer is valid for the duration of the call.
    let err = check(unsafe {
        generate_key_package_with_ciphersuite(7, &alice.signer, &alice.credential, &mut key_package)
    })
    .err()
    .unwrap_or_default();
    assert!(err.starts_with("CiphersuiteUnsupported"), "unknown suite: {err}");

    Ok(())
}

#[test]
fn test_unsupported_ciphersuite() -> TestResult {
    let name = CString::new("eve").map_err(|e| e.to_string())?;
    let mut credential = CredentialContext::default();
    let mut signer = SignerContext::default();

    // SAFETY: every pointer is valid for the duration of the call.
    let err = check(unsafe {
        generate_credential_with_ciphersuite(name.as_ptr(), 0x0003, &mut credential, &mut signer)
    })
    .err()
    .unwrap_or_default();
    assert!(err.starts_with("CiphersuiteUnsupported"), "suite 3: {err}");

    Ok(())
}

#[test]
fn test_released_and_null_handles() -> TestResult {
    let alice = Member::new("alice")?;
    let mut group = alice.create_group()?;
    free_group(group);
    // Releasing twice is ignored.
    free_group(group);

    let err = merge(&mut group).err().unwrap_or_default();
    assert!(err.starts_with("ResourceMisuse"), "released group: {err}");

    let err = ratchet_tree(&GroupContext::default()).err().unwrap_or_default();
    assert!(err.starts_with("ResourceMisuse"), "zeroed group: {err}");

    // SAFETY: a null group pointer is rejected before anything is read.
    let err = check(unsafe { merge_pending_commit(std::ptr::null_mut()) })
        .err()
        .unwrap_or_default();
    assert!(err.starts_with("ResourceMisuse"), "null group: {err}");

    let mut credential = CredentialContext::default();
    let mut signer = SignerContext::default();
    // SAFETY: a null identity is rejected before anything is written.
    let err = check(unsafe {
        generate_credential(std::ptr::null(), &mut credential, &mut signer)
    })
    .err()
    .unwrap_or_default();
    assert!(err.starts_with("ResourceMisuse"), "null identity: {err}");

    let group = alice.create_group()?;
    // SAFETY: a null output is rejected before anything is written.
    let err =
        check(unsafe { export_ratchet_tree(&group, std::ptr::null_mut(), std::ptr::null_mut()) })
            .err()
            .unwrap_or_default();
    assert!(err.starts_with("ResourceMisuse"), "null output: {err}");

    Ok(())
}

#[test]
fn test_send_message_needs_a_bound_signer() -> TestResult {
    let alice = Member::new("alice")?;
    let bob = Member::new("bob")?;

    let mut alice_group = alice.create_group()?;
    let welcome = add(&mut alice_group, &alice.signer, &[bob.key_package()?])?;
    merge(&mut alice_group)?;
    let mut bob_group = join(&welcome, &[])?;

    let err = send(&mut bob_group, "who am I").err().unwrap_or_default();
    assert!(err.starts_with("ResourceMisuse"), "joined group has no signer yet: {err}");

    let err = encrypt(&mut bob_group, &alice.signer, b"spoof")
        .err()
        .unwrap_or_default();
    assert!(err.starts_with("SignatureError"), "alice's signer in bob's group: {err}");

    Ok(())
}
