//! HTTP client and the sync transport built on it

pub mod client;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use transport::HttpSyncTransport;
