//! Error type shared by every layer of the protocol core.

use std::fmt::{Display, Formatter};

use crate::mls::crypto::cipher_suite::CipherSuite;

pub type Result<T> = std::result::Result<T, Error>;

/// The coarse classes of failure callers are expected to branch on.
///
/// Every [`Error`] maps onto exactly one kind through [`Error::kind`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    CiphersuiteUnsupported,
    SignatureError,
    InvalidKeyPackage,
    ExpiredKeyPackage,
    StaleEpoch,
    TreeMismatch,
    DecryptionError,
    AuthenticationFailure,
    EpochMismatch,
    UnknownSender,
    ReplayDetected,
    SerializationError,
    NoPendingCommit,
    /// A handle was used after release, or a required input was null.
    /// This is a programming error on the caller's side.
    ResourceMisuse,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Wire encoding
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("invalid variable length integer prefix")]
    InvalidVariableLengthIntegerPrefix,
    #[error("minimum encoding was not used")]
    MinimumEncodingWasNotUsed,
    #[error("varint exceeds 30 bits")]
    VarintExceeds30Bits,
    #[error("opaque size exceeds maximum value of u32")]
    OpaqueSizeExceedsMaximumValueOfU32,
    #[error("invalid optional value")]
    InvalidOptionalValue,
    #[error("invalid credential type value")]
    InvalidCredentialTypeValue,
    #[error("invalid protocol version {0}")]
    InvalidProtocolVersion(u16),
    #[error("invalid wire format {0}")]
    InvalidWireFormat(u16),
    #[error("invalid content type {0}")]
    InvalidContentType(u8),
    #[error("invalid sender type {0}")]
    InvalidSenderType(u8),
    #[error("invalid proposal type {0}")]
    InvalidProposalType(u16),
    #[error("invalid node type {0}")]
    InvalidNodeType(u8),
    #[error("invalid leaf node source {0}")]
    InvalidLeafNodeSource(u8),
    #[error("input has {0} trailing bytes")]
    TrailingData(usize),
    #[error("padding contains non-zero bytes")]
    PaddingContainsNonZeroBytes,
    #[error("ratchet tree encoding is malformed: {0}")]
    MalformedRatchetTree(&'static str),
    #[error("unexpected content type in message")]
    UnexpectedContentType,
    #[error("unsupported extension type {0}")]
    UnsupportedExtension(u16),

    // Primitive cryptography
    #[error("cipher suite {0} is not supported")]
    UnsupportedCipherSuite(CipherSuite),
    #[error("cipher suite {0} does not match the group's cipher suite")]
    CipherSuiteMismatch(CipherSuite),
    #[error("invalid Ed25519 private key")]
    InvalidEd25519PrivateKey,
    #[error("invalid Ed25519 public key")]
    InvalidEd25519PublicKey,
    #[error("ed25519 error: {0}")]
    Ed25519(String),
    #[error("invalid HPKE key")]
    InvalidHpkeKey,
    #[error("HPKE operation failed")]
    HpkeError,
    #[error("key derivation failed: {0}")]
    KdfError(String),
    #[error("AEAD operation failed")]
    AeadError,
    #[error("nonce and reuse guard length do not match")]
    NonceAndReuseGuardLenNotMatch,

    // Identities and key packages
    #[error("signer does not match the group member's signature key")]
    SignerMismatch,
    #[error("leaf node signature is invalid")]
    InvalidLeafNodeSignature,
    #[error("key package signature is invalid")]
    InvalidKeyPackageSignature,
    #[error("key package is malformed: {0}")]
    MalformedKeyPackage(&'static str),
    #[error("key package lifetime has expired or is not yet valid")]
    KeyPackageExpired,
    #[error("key package {0} has already been used in this group")]
    KeyPackageAlreadyUsed(String),
    #[error("no key packages were supplied")]
    NoKeyPackages,
    #[error("no matching key package found in the key store")]
    NoMatchingKeyPackage,

    // Ratchet tree
    #[error("tree hash does not match the declared tree hash")]
    TreeHashMismatch,
    #[error("parent hash verification failed")]
    ParentHashMismatch,
    #[error("path secret derived a public key that does not match the tree")]
    PathPublicKeyMismatch,
    #[error("update path length does not match the filtered direct path")]
    InvalidUpdatePathLength,
    #[error("commit does not carry an update path")]
    MissingUpdatePath,
    #[error("ratchet tree integrity check failed: {0}")]
    TreeIntegrity(&'static str),
    #[error("own leaf not found in ratchet tree")]
    OwnLeafNotFound,
    #[error("no ratchet tree was supplied and the welcome carries none")]
    NoRatchetTree,

    // Group evolution
    #[error("message is for another group")]
    GroupIdMismatch,
    #[error("commit targets epoch {got} but the group is at epoch {expected}")]
    StaleEpoch { expected: u64, got: u64 },
    #[error("unknown sender at leaf {0}")]
    UnknownSender(u32),
    #[error("membership tag is invalid")]
    MembershipTagMismatch,
    #[error("framed content signature is invalid")]
    InvalidContentSignature,
    #[error("group info signature is invalid")]
    InvalidGroupInfoSignature,
    #[error("confirmation tag is invalid")]
    ConfirmationTagMismatch,
    #[error("no path secret could be decrypted for this member")]
    PathSecretDecryptionFailed,
    #[error("there is no pending commit")]
    NoPendingCommit,

    // Welcome
    #[error("encrypted group secrets not found for provided key package ref")]
    EncryptedGroupSecretsNotFoundForProvidedKeyPackageRef,
    #[error("welcome could not be decrypted")]
    WelcomeDecryptionFailed,
    #[error("welcomes do not belong to the same commit")]
    WelcomeMismatch,

    // Application messages
    #[error("message is for epoch {got} but the group is at epoch {expected}")]
    EpochMismatch { expected: u64, got: u64 },
    #[error("sender data could not be decrypted")]
    SenderDataDecryptionFailed,
    #[error("message content could not be decrypted")]
    MessageDecryptionFailed,
    #[error("generation {generation} from leaf {leaf} was already consumed")]
    ReplayDetected { leaf: u32, generation: u32 },
    #[error("generation {generation} is too far ahead of the ratchet at {current}")]
    GenerationTooFarAhead { generation: u32, current: u32 },
    #[error("generation counter is exhausted for this epoch")]
    GenerationExhausted,
}

impl Error {
    /// The caller-facing class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BufferTooSmall
            | Error::InvalidVariableLengthIntegerPrefix
            | Error::MinimumEncodingWasNotUsed
            | Error::VarintExceeds30Bits
            | Error::OpaqueSizeExceedsMaximumValueOfU32
            | Error::InvalidOptionalValue
            | Error::InvalidCredentialTypeValue
            | Error::InvalidProtocolVersion(_)
            | Error::InvalidWireFormat(_)
            | Error::InvalidContentType(_)
            | Error::InvalidSenderType(_)
            | Error::InvalidProposalType(_)
            | Error::InvalidNodeType(_)
            | Error::InvalidLeafNodeSource(_)
            | Error::TrailingData(_)
            | Error::PaddingContainsNonZeroBytes
            | Error::MalformedRatchetTree(_)
            | Error::UnexpectedContentType
            | Error::UnsupportedExtension(_) => ErrorKind::SerializationError,

            Error::UnsupportedCipherSuite(_) | Error::CipherSuiteMismatch(_) => {
                ErrorKind::CiphersuiteUnsupported
            }

            Error::InvalidEd25519PrivateKey
            | Error::InvalidEd25519PublicKey
            | Error::Ed25519(_)
            | Error::SignerMismatch
            | Error::InvalidLeafNodeSignature
            | Error::InvalidContentSignature
            | Error::InvalidGroupInfoSignature => ErrorKind::SignatureError,

            Error::InvalidHpkeKey
            | Error::HpkeError
            | Error::KdfError(_)
            | Error::AeadError
            | Error::NonceAndReuseGuardLenNotMatch
            | Error::NoMatchingKeyPackage
            | Error::PathSecretDecryptionFailed
            | Error::EncryptedGroupSecretsNotFoundForProvidedKeyPackageRef
            | Error::WelcomeDecryptionFailed
            | Error::GenerationTooFarAhead { .. }
            | Error::GenerationExhausted => ErrorKind::DecryptionError,

            Error::InvalidKeyPackageSignature
            | Error::MalformedKeyPackage(_)
            | Error::KeyPackageAlreadyUsed(_)
            | Error::NoKeyPackages => ErrorKind::InvalidKeyPackage,
            Error::KeyPackageExpired => ErrorKind::ExpiredKeyPackage,

            Error::TreeHashMismatch
            | Error::ParentHashMismatch
            | Error::PathPublicKeyMismatch
            | Error::InvalidUpdatePathLength
            | Error::MissingUpdatePath
            | Error::TreeIntegrity(_)
            | Error::OwnLeafNotFound
            | Error::NoRatchetTree
            | Error::WelcomeMismatch => ErrorKind::TreeMismatch,

            Error::GroupIdMismatch
            | Error::MembershipTagMismatch
            | Error::ConfirmationTagMismatch
            | Error::SenderDataDecryptionFailed
            | Error::MessageDecryptionFailed => ErrorKind::AuthenticationFailure,

            Error::StaleEpoch { .. } => ErrorKind::StaleEpoch,
            Error::EpochMismatch { .. } => ErrorKind::EpochMismatch,
            Error::UnknownSender(_) => ErrorKind::UnknownSender,
            Error::ReplayDetected { .. } => ErrorKind::ReplayDetected,
            Error::NoPendingCommit => ErrorKind::NoPendingCommit,
        }
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        Error::Ed25519(err.to_string())
    }
}

impl From<hmac::digest::InvalidLength> for Error {
    fn from(err: hmac::digest::InvalidLength) -> Self {
        Error::KdfError(err.to_string())
    }
}
