//! Deal records extracted from the feed.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Feed-assigned unique deal identifier.
pub type DealId = CompactString;

/// Base URL for product pages built from an ASIN.
pub const PRODUCT_BASE_URL: &str = "https://www.amazon.com/dp/";

/// A single offer observed on the feed.
///
/// Deserialized straight from the feed's `initialData` entries. Only `id`
/// outlives a discovery pass (through the seen-set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    /// Feed-assigned identifier.
    #[serde(rename = "_id")]
    pub id: DealId,
    /// Product title.
    #[serde(default)]
    pub title: String,
    /// Amazon standard identification number.
    #[serde(default)]
    pub asin: String,
    /// Current offer price.
    #[serde(rename = "offerPrice")]
    pub offer_price: f64,
    /// Historical average price.
    #[serde(rename = "average")]
    pub average_price: f64,
    /// Categories the deal was discovered under.
    /// Assigned by the discovery pass, never read from the feed.
    #[serde(default, skip_deserializing)]
    pub categories: Vec<CompactString>,
}

impl DealRecord {
    /// Discount relative to the average price, in percent.
    ///
    /// Returns 0 when the average price is not positive.
    pub fn percent_off(&self) -> f64 {
        if self.average_price <= 0.0 {
            return 0.0;
        }
        (self.average_price - self.offer_price) / self.average_price * 100.0
    }

    /// Link to the product page.
    pub fn product_link(&self) -> String {
        format!("{}{}", PRODUCT_BASE_URL, self.asin)
    }

    /// Tag the deal with the category it was discovered under.
    pub fn with_category(mut self, category: &str) -> Self {
        self.categories = vec![CompactString::from(category)];
        self
    }

    /// Check whether the deal belongs to a category (case-insensitive).
    pub fn in_category(&self, category: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }
}
