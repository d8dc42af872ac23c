//! Telegram notifications for newly discovered deals.
//!
//! This crate provides:
//! - Telegram Bot API client for `sendMessage`
//! - Deal message formatting
//! - A notifier that delivers each deal at most once and never retries

pub mod notifier;
pub mod telegram;

pub use notifier::{DeliveryOutcome, Notifier, NotifierConfig};
pub use telegram::{format_deal_message, DeliveryError, TelegramClient};
