//! Core data types for the deal watcher.

pub mod deal;
pub mod filter;
pub mod proxy;
pub mod task;

pub use deal::*;
pub use filter::*;
pub use proxy::*;
pub use task::*;
