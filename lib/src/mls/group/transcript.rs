use bytes::Bytes;

use crate::mls::{
    crypto::{cipher_suite::CipherSuite, provider::CryptoProvider},
    key_schedule::{ConfirmedTranscriptHashInput, InterimTranscriptHashInput},
    utilities::error::Result,
};

/// As described in <https://www.rfc-editor.org/rfc/rfc9420.html#name-transcript-hashes>
///
/// "A `confirmed_transcript_hash` that represents a transcript over the whole history
/// of Commit messages, up to and including the signature of the most recent Commit."
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConfirmedTranscriptHash {
    pub(crate) confirmed_hash: Bytes,
    pub(crate) interim_hash: Bytes,
}

impl Default for ConfirmedTranscriptHash {
    fn default() -> Self {
        // https://www.rfc-editor.org/rfc/rfc9420.html#section-8.2-7
        // ```
        // confirmed_transcript_hash_[0] = ""; /* zero-length octet string */
        // interim_transcript_hash_[0] = ""; /* zero-length octet string */
        // ```
        Self {
            confirmed_hash: Bytes::new(),
            interim_hash: Bytes::new(),
        }
    }
}

impl ConfirmedTranscriptHash {
    /// The confirmed transcript hash of the epoch a commit starts.
    ///
    /// ```text
    /// confirmed_transcript_hash_[epoch] =
    ///     Hash(interim_transcript_hash_[epoch - 1] || ConfirmedTranscriptHashInput_[epoch]);
    /// ```
    pub(crate) fn hash_new_confirmed_transcript_hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        new_confirmed_transcript: &ConfirmedTranscriptHashInput,
    ) -> Result<Bytes> {
        new_confirmed_transcript.hash(crypto_provider, cipher_suite, &self.interim_hash)
    }

    /// Completes the transcript of an epoch once its confirmation tag is known.
    ///
    /// ```text
    /// interim_transcript_hash_[epoch] =
    ///     Hash(confirmed_transcript_hash_[epoch] || InterimTranscriptHashInput_[epoch]);
    /// ```
    pub(crate) fn with_confirmation_tag(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        confirmed_hash: Bytes,
        confirmation_tag: &Bytes,
    ) -> Result<Self> {
        let interim_hash = InterimTranscriptHashInput {
            confirmation_tag: confirmation_tag.clone(),
        }
        .hash(crypto_provider, cipher_suite, &confirmed_hash)?;

        Ok(Self {
            confirmed_hash,
            interim_hash,
        })
    }
}
