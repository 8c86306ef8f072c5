pub mod telegram;

use serde::Deserialize;

/// Webhook payload delivered by Telegram. Only the fields the handler reads
/// are modelled; everything else in the update is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<InboundMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// A message reduced to what the handler needs
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Destination for every reply
    pub chat_id: i64,
    /// The message text, empty when the message carried none
    pub text: String,
}

impl Update {
    pub fn incoming(&self) -> Option<IncomingMessage> {
        let message = self.message.as_ref()?;
        Some(IncomingMessage {
            chat_id: message.chat.id,
            text: message.text.clone().unwrap_or_default(),
        })
    }
}
