use bytes::Bytes;

use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::framing::private_message::PrivateMessage;
use crate::mls::framing::{
    AuthenticatedContent, Content, ContentType, FramedContent, Sender, SenderData, WireFormat,
};
use crate::mls::group::Group;
use crate::mls::identity::Identity;
use crate::mls::utilities::error::{Error, Result};

impl Group {
    /// [RFC9420 Sec.6.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3) Signs and
    /// encrypts `plaintext` as an application message of the current epoch.
    ///
    /// Each call consumes one generation of this member's application ratchet.
    pub fn encrypt_message(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        signer: &Identity,
        plaintext: &[u8],
    ) -> Result<PrivateMessage> {
        self.ensure_own_signer(signer)?;

        let cipher_suite = self.cipher_suite();
        let own_leaf_index = self.state.own_leaf_index;
        let content = FramedContent {
            group_id: self.group_id().clone(),
            epoch: self.epoch(),
            sender: Sender::Member(own_leaf_index),
            authenticated_data: Bytes::new(),
            content: Content::Application(Bytes::copy_from_slice(plaintext)),
        };
        let authenticated_content = AuthenticatedContent::new(
            crypto_provider,
            signer,
            WireFormat::PrivateMessage,
            content,
            &self.state.group_context,
        )?;

        let keys = self
            .state
            .secret_tree
            .ratchet_mut(crypto_provider, own_leaf_index)?
            .next(crypto_provider)?;
        let sender_data = SenderData::new(own_leaf_index, keys.generation());

        PrivateMessage::encrypt(
            crypto_provider,
            cipher_suite,
            &authenticated_content,
            &keys,
            &sender_data,
            &self.state.epoch_secrets.sender_data_secret,
            self.config.padding_size,
        )
    }

    /// [RFC9420 Sec.6.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3) Decrypts an
    /// application message of the current epoch and checks its signature.
    ///
    /// The sender's ratchet only moves once the message has been fully authenticated, so a
    /// rejected message can't burn a generation.
    pub fn decrypt_message(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        message: &PrivateMessage,
    ) -> Result<Bytes> {
        if message.group_id() != self.group_id() {
            return Err(Error::GroupIdMismatch);
        }
        if message.epoch() != self.epoch() {
            return Err(Error::EpochMismatch {
                expected: self.epoch(),
                got: message.epoch(),
            });
        }
        if message.content_type() != ContentType::Application {
            return Err(Error::UnexpectedContentType);
        }

        let cipher_suite = self.cipher_suite();
        let sender_data = message.decrypt_sender_data(
            crypto_provider,
            cipher_suite,
            &self.state.epoch_secrets.sender_data_secret,
        )?;
        let sender = sender_data.leaf_index;
        let sender_leaf = self
            .state
            .ratchet_tree
            .get_leaf(sender)
            .ok_or(Error::UnknownSender(sender.0))?;
        // Own messages are never delivered back to the sender.
        if sender == self.state.own_leaf_index {
            return Err(Error::ReplayDetected {
                leaf: sender.0,
                generation: sender_data.generation,
            });
        }

        let mut ratchet = self
            .state
            .secret_tree
            .ratchet_mut(crypto_provider, sender)?
            .clone();
        let keys = ratchet.get(
            crypto_provider,
            sender,
            sender_data.generation,
            &self.config.sender_ratchet_configuration,
        );
        let keys = match keys {
            Ok(keys) => keys,
            Err(err) => {
                log::warn!(
                    "dropped message from leaf {sender} in group {}: {err}",
                    hex::encode(self.group_id())
                );
                return Err(err);
            }
        };

        let content = message.decrypt_content(
            crypto_provider,
            cipher_suite,
            &keys,
            &sender_data.reuse_guard,
        )?;
        let authenticated_content = message.authenticated_content(&sender_data, content);
        authenticated_content.verify_signature(
            crypto_provider,
            cipher_suite,
            sender_leaf.signature_key(),
            &self.state.group_context,
        )?;

        let Content::Application(plaintext) = authenticated_content.content.content else {
            return Err(Error::UnexpectedContentType);
        };

        self.state.secret_tree.store_ratchet(sender, ratchet);
        Ok(plaintext)
    }
}
