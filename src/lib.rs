//! Scout - media source discovery backend
//!
//! Fetches indexer pages through a cookie-aware, rate-limit-learning HTTP client,
//! parses free-text release listings, scores them, encrypts their identifiers for
//! storage and ranks them for playback.

pub mod config;
pub mod indexer;
pub mod services;

pub use config::Config;
