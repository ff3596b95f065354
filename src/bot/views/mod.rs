//! Telegram UI components
//!
//! Texts and keyboards shown to users of the relay.

mod relay;

pub use relay::{audio_keyboard, DefaultRelayView, RelayView, AUDIO_BUTTON_LABEL, AUDIO_CALLBACK};
