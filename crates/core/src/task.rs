//! Polling tasks produced by the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which listing age the feed is queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeMode {
    /// Newly listed deals (`age=false`).
    #[default]
    New,
    /// Older deals (`age=true`).
    Old,
}

impl AgeMode {
    /// Value of the feed's `age` query parameter.
    pub fn as_query(self) -> &'static str {
        match self {
            AgeMode::New => "false",
            AgeMode::Old => "true",
        }
    }
}

impl FromStr for AgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(AgeMode::New),
            "old" => Ok(AgeMode::Old),
            other => Err(format!("unknown age mode: {}", other)),
        }
    }
}

/// Polling cadence a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cadence {
    Priority,
    Regular,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Priority => write!(f, "priority"),
            Cadence::Regular => write!(f, "regular"),
        }
    }
}

/// One discovery pass to run: a (category, discount) pair for a cadence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleTask {
    pub category: String,
    /// Minimum discount in percent.
    pub discount: u32,
    pub age: AgeMode,
    pub cadence: Cadence,
}

impl ScheduleTask {
    pub fn new(category: impl Into<String>, discount: u32, age: AgeMode, cadence: Cadence) -> Self {
        Self {
            category: category.into(),
            discount,
            age,
            cadence,
        }
    }

    /// Build one task per (category, discount) pair, categories outermost.
    pub fn cross_product(
        categories: &[String],
        discounts: &[u32],
        age: AgeMode,
        cadence: Cadence,
    ) -> Vec<ScheduleTask> {
        categories
            .iter()
            .flat_map(|category| {
                discounts
                    .iter()
                    .map(move |&discount| ScheduleTask::new(category.clone(), discount, age, cadence))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_age_mode_query() {
        assert_eq!(AgeMode::New.as_query(), "false");
        assert_eq!(AgeMode::Old.as_query(), "true");
        assert_eq!("OLD".parse::<AgeMode>(), Ok(AgeMode::Old));
        assert!("ancient".parse::<AgeMode>().is_err());
    }

    #[test]
    fn test_cross_product() {
        let categories = vec!["electronics".to_string(), "toys".to_string()];
        let tasks = ScheduleTask::cross_product(&categories, &[20, 50], AgeMode::New, Cadence::Priority);

        assert_eq!(tasks.len(), 4);
        assert_eq!(
            tasks
                .iter()
                .map(|t| (t.category.as_str(), t.discount))
                .collect::<Vec<_>>(),
            vec![("electronics", 20), ("electronics", 50), ("toys", 20), ("toys", 50)]
        );
        assert!(tasks.iter().all(|t| t.cadence == Cadence::Priority));
    }

    #[test]
    fn test_cross_product_empty() {
        assert!(ScheduleTask::cross_product(&[], &[20], AgeMode::New, Cadence::Regular).is_empty());
    }
}
