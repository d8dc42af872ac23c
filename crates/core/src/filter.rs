//! Operator-defined filter rules and the validated filter configuration.

use serde::{Deserialize, Serialize};

/// Wildcard category that matches every deal.
pub const ALL_CATEGORIES: &str = "all";

/// Optional bounds a deal must satisfy. Absent bound = unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Criteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_off_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_off_max: Option<f64>,
    /// Allowed categories; may contain [`ALL_CATEGORIES`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

impl Criteria {
    /// Check whether the category bound admits a deal category.
    pub fn admits_category(&self, category: &str) -> bool {
        match &self.categories {
            None => true,
            Some(allowed) => allowed
                .iter()
                .any(|c| c.eq_ignore_ascii_case(ALL_CATEGORIES) || c.eq_ignore_ascii_case(category)),
        }
    }
}

/// A single routing rule. Evaluation order within a config is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRule {
    /// Human-readable label used in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// Role tag carried by every rule object.
    pub role: String,
    #[serde(default)]
    pub criteria: Criteria,
    /// Isolated rules suppress every rule after them once reached.
    #[serde(default)]
    pub isolated: bool,
    /// Destination channel identifiers, in order.
    #[serde(rename = "webhooks", alias = "destinations", default)]
    pub destinations: Vec<String>,
}

impl FilterRule {
    /// Label for logs: the rule name, or its role.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.role)
    }
}

/// How unseen deals are routed to destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Every unseen deal goes to the default channel.
    #[default]
    Broadcast,
    /// Destinations are resolved through the filter rules.
    Filtered,
}

/// Validated operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Fallback destinations when no rule matches in filtered mode.
    pub other_webhook: Vec<String>,
    /// Discount thresholds (percent) polled for every category.
    pub price_off: Vec<u32>,
    /// Categories polled by the priority cycle.
    pub priority_category: Vec<String>,
    /// Categories polled by the regular cycle.
    pub regular_category: Vec<String>,
    /// Ordered routing rules.
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub delivery: DeliveryMode,
    /// Required prefix for URL-shaped destinations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_pattern: Option<String>,
}

impl FilterConfig {
    /// Keys that must be present in a configuration document.
    pub const REQUIRED_KEYS: [&'static str; 5] = [
        "other_webhook",
        "price_off",
        "priority_category",
        "regular_category",
        "filters",
    ];

    /// Iterate over every destination named in the config.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.other_webhook
            .iter()
            .chain(self.filters.iter().flat_map(|f| f.destinations.iter()))
            .map(String::as_str)
    }
}
