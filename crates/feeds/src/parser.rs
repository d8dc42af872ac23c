//! Deal extraction from the feed's streamed response body.
//!
//! The feed answers with a line-oriented stream rather than plain JSON.
//! The deal data sits in the segment that follows [`DATA_DELIMITER`]:
//! a JSON array whose element at [`PAYLOAD_INDEX`] carries the deals in
//! its `initialData` field.

use deals_core::DealRecord;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

/// Marks the start of the embedded data segment.
pub const DATA_DELIMITER: &str = "]\n2:";

/// Position of the payload object inside the data segment.
pub const PAYLOAD_INDEX: usize = 3;

/// Field of the payload object holding the deal list.
pub const DEALS_FIELD: &str = "initialData";

/// Structural mismatches in a feed body. Never leaves this module.
#[derive(Debug, Error)]
enum ParseError {
    #[error("data delimiter not found")]
    MissingDelimiter,
    #[error("invalid JSON in data segment: {0}")]
    Json(#[from] serde_json::Error),
    #[error("data segment is empty")]
    EmptySegment,
    #[error("no payload at index 3")]
    MissingPayload,
    #[error("payload has no `initialData` array")]
    MissingDeals,
}

/// Best-effort parser for feed bodies.
pub struct ResponseParser;

impl ResponseParser {
    /// Extract deals from a raw feed body.
    ///
    /// Never fails: a malformed body is logged with its contents and yields
    /// an empty list. Individual entries that do not look like deals are
    /// skipped.
    pub fn extract(raw: &str) -> Vec<DealRecord> {
        match Self::try_extract(raw) {
            Ok(deals) => deals,
            Err(e) => {
                error!(error = %e, body = raw, "Failed to parse deals");
                Vec::new()
            }
        }
    }

    fn try_extract(raw: &str) -> Result<Vec<DealRecord>, ParseError> {
        let segment = raw
            .split(DATA_DELIMITER)
            .nth(1)
            .ok_or(ParseError::MissingDelimiter)?;

        // The segment may be followed by further stream lines; only the
        // first JSON value belongs to it.
        let data = serde_json::Deserializer::from_str(segment)
            .into_iter::<Value>()
            .next()
            .ok_or(ParseError::EmptySegment)??;

        let entries = data
            .get(PAYLOAD_INDEX)
            .ok_or(ParseError::MissingPayload)?
            .get(DEALS_FIELD)
            .and_then(Value::as_array)
            .ok_or(ParseError::MissingDeals)?;

        let deals = entries
            .iter()
            .filter_map(|entry| match serde_json::from_value::<DealRecord>(entry.clone()) {
                Ok(deal) => Some(deal),
                Err(e) => {
                    warn!(error = %e, entry = %entry, "Skipping malformed deal entry");
                    None
                }
            })
            .collect();

        Ok(deals)
    }
}
