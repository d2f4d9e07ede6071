use serde::{Deserialize, Serialize};

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::framing::ProtocolVersion;

/// Protocol version and cipher suite a group, identity or key package is bound to.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CryptoConfig {
    #[serde(default)]
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
}

impl CryptoConfig {
    pub fn with_default_version(cipher_suite: CipherSuite) -> Self {
        Self {
            version: ProtocolVersion::default(),
            cipher_suite,
        }
    }
}
