//! Outbound surface of the relay.
//!
//! The controller only talks to chats through [`RelayTransport`], which keeps
//! the media pipeline independent of the Telegram client.

use crate::bot::views::audio_keyboard;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, InputFile, MessageId, ReplyParameters};

/// Everything the relay sends to a chat
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Send a plain text notice, returning its message id
    async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<MessageId>;

    /// Send a video with a caption and the audio button, returning its message id
    async fn send_video(&self, chat_id: ChatId, video: &Path, caption: &str) -> Result<MessageId>;

    /// Send an audio file as a reply to `reply_to`
    async fn send_audio(&self, chat_id: ChatId, reply_to: MessageId, audio: &Path) -> Result<()>;

    /// Delete a previously sent message
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    /// Acknowledge the interaction that triggered the current handler, if any
    async fn acknowledge_interaction(&self) -> Result<()>;
}

/// Telegram-backed transport.
pub struct TelegramTransport {
    bot: Bot,
    callback: Option<CallbackQuery>,
}

impl TelegramTransport {
    /// Transport for handling an incoming message
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self {
            bot,
            callback: None,
        }
    }

    /// Transport for handling a button press; acknowledges `query`
    #[must_use]
    pub const fn for_callback(bot: Bot, query: CallbackQuery) -> Self {
        Self {
            bot,
            callback: Some(query),
        }
    }
}

#[async_trait]
impl RelayTransport for TelegramTransport {
    async fn send_notice(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let msg = self.bot.send_message(chat_id, text).await?;
        Ok(msg.id)
    }

    async fn send_video(&self, chat_id: ChatId, video: &Path, caption: &str) -> Result<MessageId> {
        let msg = self
            .bot
            .send_video(chat_id, InputFile::file(video.to_path_buf()))
            .caption(caption)
            .reply_markup(audio_keyboard())
            .await?;
        Ok(msg.id)
    }

    async fn send_audio(&self, chat_id: ChatId, reply_to: MessageId, audio: &Path) -> Result<()> {
        self.bot
            .send_audio(chat_id, InputFile::file(audio.to_path_buf()))
            .reply_parameters(ReplyParameters::new(reply_to))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.bot.delete_message(chat_id, message_id).await?;
        Ok(())
    }

    async fn acknowledge_interaction(&self) -> Result<()> {
        if let Some(q) = &self.callback {
            self.bot.answer_callback_query(q.id.clone()).await?;
        }
        Ok(())
    }
}
