//! [RFC9420](https://www.rfc-editor.org/rfc/rfc9420.html) Messaging Layer Security, narrowed to
//! group creation, member addition and application messages.

pub mod crypto;
pub mod extensibility;
pub mod framing;
pub mod group;
pub mod identity;
pub mod key_package;
pub mod key_schedule;
pub mod ratchet_tree;
pub mod secret_tree;
pub mod utilities;

use crypto::cipher_suite::CipherSuite;

/// The cipher suite used when the caller does not pick one.
pub fn default_cipher_suite() -> CipherSuite {
    CipherSuite::default()
}
