//! HTTP client for the RPKI validation cache feed.

pub mod client;

pub use client::{CacheClient, FetchError, RoaRecord};
