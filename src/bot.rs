use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{RelayConfig, RelayMode};
use crate::inference::Inference;
use crate::platform::telegram::{send_reply, Messenger};
use crate::platform::{IncomingMessage, IncomingUpdate};

/// What the relay did with one update. Logged per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No message, no chat to reply to, or no Telegram client.
    Ignored,
    /// Inference credentials are missing; the chat got an apology.
    Unavailable,
    Echoed,
    Replied,
    /// Text generation failed; the chat got the error.
    InferenceFailed,
    /// The getFile/download/transcribe chain failed; the chat got the error.
    VoiceFailed,
    /// Nothing to send to the model (sticker, empty transcript, ...).
    NoInput,
}

/// Shared, immutable relay state: one per process, cloned into each request as `Arc`.
pub struct Relay {
    config: RelayConfig,
    messenger: Option<Arc<dyn Messenger>>,
    inference: Option<Arc<dyn Inference>>,
}

/// Build the text-generation prompt from the configured template.
pub fn build_prompt(template: &str, input: &str) -> String {
    if template.contains("{text}") {
        template.replace("{text}", input)
    } else {
        format!("{}\n{}", template, input)
    }
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        messenger: Option<Arc<dyn Messenger>>,
        inference: Option<Arc<dyn Inference>>,
    ) -> Self {
        Self {
            config,
            messenger,
            inference,
        }
    }

    pub fn messenger(&self) -> Option<&dyn Messenger> {
        self.messenger.as_deref()
    }

    pub fn inference(&self) -> Option<&dyn Inference> {
        self.inference.as_deref()
    }

    pub fn mode(&self) -> RelayMode {
        self.config.mode
    }

    pub async fn handle_update(&self, update: IncomingUpdate) -> Outcome {
        let Some(message) = update.message else {
            debug!("Update without message, ignoring");
            return Outcome::Ignored;
        };
        let Some(chat_id) = message.chat_id() else {
            debug!("Message without chat id, ignoring");
            return Outcome::Ignored;
        };
        let Some(messenger) = self.messenger.as_deref() else {
            warn!("Telegram client not configured, dropping message from chat {}", chat_id);
            return Outcome::Ignored;
        };

        if self.config.mode == RelayMode::Echo {
            let text = message.text.unwrap_or_default();
            send_reply(messenger, chat_id, &format!("You said: {}", text)).await;
            return Outcome::Echoed;
        }

        let Some(inference) = self.inference.as_deref() else {
            send_reply(
                messenger,
                chat_id,
                "❌ Inference is unavailable: HF_TOKEN is not set.",
            )
            .await;
            return Outcome::Unavailable;
        };

        let input = match self.input_text(messenger, inference, chat_id, message).await {
            Ok(input) => input,
            Err(outcome) => return outcome,
        };
        if input.is_empty() {
            return Outcome::NoInput;
        }

        info!("Chat {}: generating reply for {} chars of input", chat_id, input.len());
        let prompt = build_prompt(&self.config.prompt_template, &input);
        let (reply, outcome) = match inference.generate(&prompt).await {
            Ok(generated) => (generated.trim().to_string(), Outcome::Replied),
            Err(e) => {
                warn!("Text generation failed for chat {}: {}", chat_id, e);
                (
                    format!("❌ Error from model {}: {}", inference.text_model(), e),
                    Outcome::InferenceFailed,
                )
            }
        };

        send_reply(messenger, chat_id, &reply).await;
        outcome
    }

    /// Typed text, or the transcript of a voice note. `Err` means the chat was
    /// already told about a failure and handling stops.
    async fn input_text(
        &self,
        messenger: &dyn Messenger,
        inference: &dyn Inference,
        chat_id: i64,
        message: IncomingMessage,
    ) -> Result<String, Outcome> {
        if let Some(text) = message.text {
            return Ok(text);
        }
        let Some(voice) = message.voice else {
            return Ok(String::new());
        };

        if self.config.notify_progress {
            send_reply(messenger, chat_id, "⏳ Voice received, transcribing...").await;
        }

        match transcribe_voice(messenger, inference, &voice.file_id).await {
            Ok(text) => {
                let text = text.trim().to_string();
                debug!("Chat {}: transcribed {} chars", chat_id, text.len());
                if self.config.notify_progress && !text.is_empty() {
                    send_reply(
                        messenger,
                        chat_id,
                        &format!("✅ Transcription: {}\nNow generating a reply...", text),
                    )
                    .await;
                }
                Ok(text)
            }
            Err(detail) => {
                warn!("Voice processing failed for chat {}: {}", chat_id, detail);
                send_reply(
                    messenger,
                    chat_id,
                    &format!("❌ Error processing voice message: {}", detail),
                )
                .await;
                Err(Outcome::VoiceFailed)
            }
        }
    }
}

/// getFile, download, transcribe. The error is the detail shown to the user.
async fn transcribe_voice(
    messenger: &dyn Messenger,
    inference: &dyn Inference,
    file_id: &str,
) -> Result<String, String> {
    let path = messenger
        .file_path(file_id)
        .await
        .map_err(|e| e.to_string())?;
    let audio = messenger.download(&path).await.map_err(|e| e.to_string())?;
    inference.transcribe(audio).await.map_err(|e| e.to_string())
}
