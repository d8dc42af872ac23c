//! Deal routing and deduplication.
//!
//! This crate contains the filter engine that resolves rule destinations
//! for a deal and the seen-set that guarantees at-most-once notification
//! per deal id.

pub mod filter;
pub mod seen;

pub use filter::*;
pub use seen::*;
