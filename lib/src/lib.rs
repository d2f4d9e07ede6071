//! Continuous group key agreement for multi-party messaging.
//!
//! The protocol core lives in [`mls`]: identities and key packages, the
//! replicated ratchet tree, commits and welcomes, and per-epoch message
//! encryption.
pub mod mls;

pub use mls::{
    crypto::{
        cipher_suite::CipherSuite,
        credential::Credential,
        provider::{CryptoProvider, RustCryptoProvider},
    },
    framing::{private_message::PrivateMessage, public_message::PublicMessage, welcome::Welcome},
    group::{config::GroupConfig, staged_join::StagedJoin, Group},
    identity::Identity,
    key_package::KeyPackage,
    utilities::error::{Error, ErrorKind, Result},
};
