//! Telegram update handlers
//!
//! Wires incoming updates to the [`RelayController`]. Long-running work is
//! spawned onto its own task so the dispatcher keeps serving other chats.

use crate::bot::transport::TelegramTransport;
use crate::bot::views::{DefaultRelayView, RelayView};
use crate::relay::RelayController;
use crate::store::PresentationHandle;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, warn};

/// Supported bot commands
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greeting with usage
    #[command(description = "show how to use the bot")]
    Start,
    /// Usage
    #[command(description = "show how to use the bot")]
    Help,
}

/// Build the dispatcher handler tree.
///
/// Every button press goes to the interaction path (the audio button is the
/// only control the bot attaches), commands get a usage reply, every other
/// text message goes to the message path.
#[must_use]
pub fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_audio_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| {
                        msg.text().is_some_and(|text| !text.starts_with('/'))
                    })
                    .endpoint(handle_text_message),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    relay: Arc<RelayController>,
) -> Result<(), teloxide::RequestError> {
    match cmd {
        Command::Start | Command::Help => {
            let text = DefaultRelayView::help(relay.link_marker());
            if let Err(e) = bot.send_message(msg.chat.id, text).await {
                error!(chat_id = msg.chat.id.0, error = %e, "Failed to send help");
            }
        }
    }
    respond(())
}

async fn handle_text_message(
    bot: Bot,
    msg: Message,
    relay: Arc<RelayController>,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text().map(ToString::to_string) else {
        return respond(());
    };
    if !text.contains(relay.link_marker()) {
        return respond(());
    }

    let chat_id = msg.chat.id;
    tokio::spawn(async move {
        let transport = TelegramTransport::new(bot);
        let outcome = relay.handle_text(&transport, chat_id, &text).await;
        debug!(chat_id = chat_id.0, ?outcome, "Message handled");
    });

    respond(())
}

/// The video message a button press refers to, whatever its callback data
fn interaction_handle(q: &CallbackQuery) -> Option<PresentationHandle> {
    q.message
        .as_ref()
        .map(|m| PresentationHandle::new(m.chat().id, m.id()))
}

async fn handle_audio_callback(
    bot: Bot,
    q: CallbackQuery,
    relay: Arc<RelayController>,
) -> Result<(), teloxide::RequestError> {
    let Some(handle) = interaction_handle(&q) else {
        warn!(data = ?q.data, "Callback query without an attached message");
        if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
            warn!(error = %e, "Failed to answer callback query");
        }
        return respond(());
    };

    tokio::spawn(async move {
        let transport = TelegramTransport::for_callback(bot, q);
        let outcome = relay.handle_interaction(&transport, handle).await;
        debug!(handle = %handle, ?outcome, "Interaction handled");
    });

    respond(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{ChatId, MessageId};

    fn callback(data: &str, with_message: bool) -> Result<CallbackQuery, serde_json::Error> {
        let mut value = serde_json::json!({
            "id": "4382bfdwdsb323b2d9",
            "from": { "id": 1, "is_bot": false, "first_name": "Alice" },
            "chat_instance": "-4211598447373389632",
            "data": data,
        });
        if with_message {
            value["message"] = serde_json::json!({
                "message_id": 7,
                "date": 1_700_000_000,
                "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                "from": { "id": 99, "is_bot": true, "first_name": "Relay", "username": "relay_bot" },
                "caption": "@alice",
                "video": {
                    "file_id": "BAACAgIAAxkBAAIB",
                    "file_unique_id": "AgAD",
                    "width": 720,
                    "height": 1280,
                    "duration": 12
                }
            });
        }
        serde_json::from_value(value)
    }

    #[test]
    fn test_any_callback_data_maps_to_video_message() -> Result<(), serde_json::Error> {
        let expected = Some(PresentationHandle::new(ChatId(42), MessageId(7)));
        assert_eq!(interaction_handle(&callback("audio", true)?), expected);
        assert_eq!(interaction_handle(&callback("stale-button", true)?), expected);
        Ok(())
    }

    #[test]
    fn test_callback_without_message_has_no_handle() -> Result<(), serde_json::Error> {
        assert_eq!(interaction_handle(&callback("audio", false)?), None);
        Ok(())
    }

    #[test]
    fn test_command_parsing() -> Result<(), teloxide::utils::command::ParseError> {
        assert!(matches!(Command::parse("/start", "relay_bot")?, Command::Start));
        assert!(matches!(Command::parse("/help", "relay_bot")?, Command::Help));
        assert!(Command::parse("/unknown", "relay_bot").is_err());
        Ok(())
    }
}
