//! Reel relay
//!
//! A Telegram bot that re-serves social media posts as videos and extracts
//! their audio on request.

/// Telegram-facing layer: handlers, transport, views
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Fetching, captioning and transcoding of media
pub mod media;
/// Conversation Controller
pub mod relay;
/// Artifact Store and staging directories
pub mod store;
/// In-process fakes for tests
pub mod testing;
/// Text helpers
pub mod utils;
