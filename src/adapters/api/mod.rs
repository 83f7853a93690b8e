//! Scalix API Adapter
//!
//! Implements the HTTP side of the fetcher port: a bounded reqwest
//! client and the topic → endpoint mapping.
//!
//! Sub-modules:
//! - `client`: HTTP client with timeout, concurrency cap and error mapping
//! - `fetcher`: `TopicFetcher` implementation over the client

pub mod client;
pub mod fetcher;

pub use client::{ScalixClient, ScalixClientConfig};
pub use fetcher::HttpTopicFetcher;
