//! Deal feed collection.
//!
//! Fetches the deals feed through a pool of rotating proxies and
//! extracts deal records from its streamed response body.
//!
//! ## Architecture
//!
//! - `client` - Retrying HTTP client with per-attempt random proxy selection
//! - `parser` - Extraction of `DealRecord`s from the raw feed body
//! - `feed` - Feed URL and header construction, page fetching

pub mod client;
pub mod error;
pub mod feed;
pub mod parser;

pub use client::*;
pub use error::*;
pub use feed::*;
pub use parser::*;
