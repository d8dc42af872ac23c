//! Rule evaluation with isolation precedence.
//!
//! Rules are evaluated in configuration order. The first isolated rule
//! reached switches isolation on, whether or not it matched, and no later
//! rule can match after that. Destinations of matching isolated rules win
//! over every regular match, including regular rules listed earlier.

use deals_core::{Criteria, DealRecord, FilterRule};
use tracing::trace;

/// Stateless evaluator for filter rules.
pub struct FilterEngine;

impl FilterEngine {
    /// Resolve the destinations a deal should be delivered to.
    pub fn resolve(deal: &DealRecord, rules: &[FilterRule]) -> Vec<String> {
        let percent_off = deal.percent_off();
        let mut isolated_destinations = Vec::new();
        let mut regular_destinations = Vec::new();
        let mut isolation_active = false;

        for rule in rules {
            let matches = !isolation_active && Self::satisfies(&rule.criteria, deal, percent_off);

            if rule.isolated && !isolation_active {
                isolation_active = true;
            }

            trace!(
                deal_id = %deal.id,
                rule = rule.label(),
                isolated = rule.isolated,
                matches,
                "Evaluated filter rule"
            );

            if matches {
                if rule.isolated {
                    isolated_destinations.extend(rule.destinations.iter().cloned());
                } else {
                    regular_destinations.extend(rule.destinations.iter().cloned());
                }
            }
        }

        if isolated_destinations.is_empty() {
            regular_destinations
        } else {
            isolated_destinations
        }
    }

    /// Check every present bound of `criteria` against a deal.
    fn satisfies(criteria: &Criteria, deal: &DealRecord, percent_off: f64) -> bool {
        let average = deal.average_price;

        if criteria.average_price_min.is_some_and(|min| average < min) {
            return false;
        }
        if criteria.average_price_max.is_some_and(|max| average > max) {
            return false;
        }
        if criteria.percent_off_min.is_some_and(|min| percent_off < min) {
            return false;
        }
        if criteria.percent_off_max.is_some_and(|max| percent_off > max) {
            return false;
        }

        match deal.categories.as_slice() {
            // Undiscovered deals only pass an unbounded or wildcard category bound.
            [] => criteria.admits_category(""),
            categories => categories.iter().any(|c| criteria.admits_category(c)),
        }
    }
}
