/// Telegram update handlers and command definitions
pub mod handlers;
/// Outbound transport used by the relay
pub mod transport;
/// Notice texts and keyboards
pub mod views;
