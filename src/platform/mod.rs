pub mod telegram;

use serde::Deserialize;

/// Webhook POST body. Only the fields the relay acts on are modelled;
/// everything else Telegram sends is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingUpdate {
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Reference to a voice note hosted by Telegram.
#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
}

impl IncomingMessage {
    pub fn chat_id(&self) -> Option<i64> {
        self.chat.as_ref().map(|c| c.id)
    }
}
