//! Telegram Bot API client and message formatting.

use deals_core::DealRecord;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Default Telegram Bot API host.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Telegram API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// `sendMessage` request body.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Minimal Telegram Bot API client.
pub struct TelegramClient {
    http_client: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl TelegramClient {
    /// Create a client for the given bot token.
    pub fn new(bot_token: impl Into<String>) -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http_client,
            api_url: TELEGRAM_API_URL.to_string(),
            bot_token: bot_token.into(),
        })
    }

    /// Point the client at a different API host.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.bot_token)
    }

    /// Send an HTML message to a chat. Anything but HTTP 200 is an error.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self
            .http_client
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }

        Ok(())
    }
}

/// Format a price as dollars with two decimals.
fn format_price(price: f64) -> String {
    format!("${:.2}", price)
}

/// Escape text for Telegram's HTML parse mode.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Format a deal as an HTML alert message.
pub fn format_deal_message(deal: &DealRecord) -> String {
    let mut msg = format!(
        "<strong>{}</strong>\n\
         <a href=\"{}\">Link all'offerta</a>\n\n\
         💰 Prezzo precedente: {}\n\
         💸 Nuovo prezzo: {}\n\
         🤑 Sconto: {:.3}%",
        escape_html(&deal.title),
        deal.product_link(),
        format_price(deal.average_price),
        format_price(deal.offer_price),
        deal.percent_off()
    );

    let now = chrono::Utc::now();
    msg.push_str(&format!("\n\n⏰ {}", now.format("%Y-%m-%d %H:%M:%S UTC")));

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn deal() -> DealRecord {
        DealRecord {
            id: "d1".into(),
            title: "Cable <USB-C> & charger".to_string(),
            asin: "B0CABLE".to_string(),
            offer_price: 7.5,
            average_price: 10.0,
            categories: vec!["electronics".into()],
        }
    }

    #[test]
    fn test_format_deal_message() {
        let msg = format_deal_message(&deal());

        assert!(msg.starts_with("<strong>Cable &lt;USB-C&gt; &amp; charger</strong>\n"));
        assert!(msg.contains("<a href=\"https://www.amazon.com/dp/B0CABLE\">"));
        assert!(msg.contains("Prezzo precedente: $10.00"));
        assert!(msg.contains("Nuovo prezzo: $7.50"));
        assert!(msg.contains("Sconto: 25.000%"));
        assert!(msg.contains("UTC"));
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0.0), "$0.00");
        assert_eq!(format_price(1234.567), "$1234.57");
    }

    #[test]
    fn test_send_message_url() {
        let client = TelegramClient::new("123:abc")
            .unwrap()
            .with_api_url("http://localhost:8081");
        assert_eq!(
            client.send_message_url(),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_send_message_payload() {
        let payload = SendMessage {
            chat_id: "-100123",
            text: "hi",
            parse_mode: "HTML",
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"chat_id": "-100123", "text": "hi", "parse_mode": "HTML"})
        );
    }
}
