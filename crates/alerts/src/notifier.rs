//! Deal notification delivery.

use crate::telegram::{format_deal_message, TelegramClient};
use deals_core::DealRecord;
use tracing::{error, info};

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The messaging provider accepted the message.
    Delivered,
    /// Dry run: the message was only logged.
    Logged,
    /// Delivery failed; the failure was logged and will not be retried.
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, DeliveryOutcome::Failed(_))
    }
}

/// Configuration for the notifier.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Chat that receives every deal in broadcast mode.
    pub default_chat_id: String,
    /// Log messages instead of sending them.
    pub dry_run: bool,
}

/// Sends deal alerts to Telegram chats.
///
/// Each call makes a single attempt per destination. Failures are logged
/// and reported in the outcome, never propagated.
pub struct Notifier {
    client: Option<TelegramClient>,
    config: NotifierConfig,
}

impl Notifier {
    /// Create a notifier. `client` may be `None` only in dry-run mode.
    pub fn new(client: Option<TelegramClient>, config: NotifierConfig) -> Self {
        Self { client, config }
    }

    /// Notifier that only logs messages.
    pub fn dry_run(default_chat_id: impl Into<String>) -> Self {
        Self::new(
            None,
            NotifierConfig {
                default_chat_id: default_chat_id.into(),
                dry_run: true,
            },
        )
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Deliver a deal to the default chat.
    pub async fn send(&self, deal: &DealRecord) -> DeliveryOutcome {
        let message = format_deal_message(deal);
        self.deliver(deal, &self.config.default_chat_id, &message).await
    }

    /// Deliver a deal to each destination in order.
    pub async fn send_to(&self, deal: &DealRecord, destinations: &[String]) -> Vec<DeliveryOutcome> {
        let message = format_deal_message(deal);
        let mut outcomes = Vec::with_capacity(destinations.len());
        for chat_id in destinations {
            outcomes.push(self.deliver(deal, chat_id, &message).await);
        }
        outcomes
    }

    async fn deliver(&self, deal: &DealRecord, chat_id: &str, message: &str) -> DeliveryOutcome {
        let client = match &self.client {
            Some(client) if !self.config.dry_run => client,
            _ => {
                info!(chat_id, deal_id = %deal.id, message, "Dry run: alert not sent");
                return DeliveryOutcome::Logged;
            }
        };

        match client.send_message(chat_id, message).await {
            Ok(()) => {
                info!(
                    chat_id,
                    deal_id = %deal.id,
                    percent_off = deal.percent_off(),
                    "Alert sent"
                );
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                error!(chat_id, deal_id = %deal.id, error = %e, "Failed to send alert");
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }
}
