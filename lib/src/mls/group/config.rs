use serde::{Deserialize, Serialize};

use crate::mls::crypto::config::CryptoConfig;

/// Bounds on how far a receiver tolerates reordering of a sender's application messages.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SenderRatchetConfiguration {
    /// Keys of skipped generations kept around for late messages.
    pub out_of_order_tolerance: u32,
    /// Largest jump ahead of the current generation a message may make.
    pub maximum_forward_distance: u32,
}

impl Default for SenderRatchetConfiguration {
    fn default() -> Self {
        Self {
            out_of_order_tolerance: 5,
            maximum_forward_distance: 1000,
        }
    }
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    pub(crate) crypto_config: CryptoConfig,
    #[serde(default)]
    pub(crate) sender_ratchet_configuration: SenderRatchetConfiguration,
    /// Application message plaintexts are zero padded to a multiple of this. 0 disables padding.
    #[serde(default)]
    pub(crate) padding_size: usize,
    /// Whether welcomes carry the ratchet tree, so joiners need no out-of-band copy.
    #[serde(default)]
    pub(crate) use_ratchet_tree_extension: bool,
}

impl GroupConfig {
    /// Create a group config builder
    pub fn builder() -> GroupConfigBuilder {
        GroupConfigBuilder::new()
    }

    pub fn crypto_config(&self) -> &CryptoConfig {
        &self.crypto_config
    }

    pub fn sender_ratchet_configuration(&self) -> &SenderRatchetConfiguration {
        &self.sender_ratchet_configuration
    }

    pub fn padding_size(&self) -> usize {
        self.padding_size
    }

    pub fn uses_ratchet_tree_extension(&self) -> bool {
        self.use_ratchet_tree_extension
    }
}

#[derive(Default, Debug)]
pub struct GroupConfigBuilder {
    group_config: GroupConfig,
}

impl GroupConfigBuilder {
    /// Create a group config
    pub fn new() -> Self {
        Self::default()
    }

    /// Build with crypto config
    #[must_use]
    pub fn with_crypto_config(mut self, crypto_config: CryptoConfig) -> Self {
        self.group_config.crypto_config = crypto_config;
        self
    }

    /// Build with a sender ratchet configuration
    #[must_use]
    pub fn with_sender_ratchet_configuration(
        mut self,
        sender_ratchet_configuration: SenderRatchetConfiguration,
    ) -> Self {
        self.group_config.sender_ratchet_configuration = sender_ratchet_configuration;
        self
    }

    /// Build with a padding block size for application messages
    #[must_use]
    pub fn with_padding_size(mut self, padding_size: usize) -> Self {
        self.group_config.padding_size = padding_size;
        self
    }

    /// Build with the ratchet tree extension in welcomes enabled or disabled
    #[must_use]
    pub fn use_ratchet_tree_extension(mut self, enabled: bool) -> Self {
        self.group_config.use_ratchet_tree_extension = enabled;
        self
    }

    /// Finalize and build the group config
    pub fn build(self) -> GroupConfig {
        self.group_config
    }
}
