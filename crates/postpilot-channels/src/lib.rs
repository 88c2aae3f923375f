//! # PostPilot Channels
//! Messaging transport implementations. Telegram is the only channel; the
//! engine depends on the `Publisher` trait, never on this crate directly.

pub mod telegram;

pub use telegram::{TelegramChannel, TelegramConfig};
