//! Indexer-facing data
//!
//! Scrapers for individual indexers live outside this crate; they hand over
//! [`RawListing`]s and [`SourceCandidate`]s in the shapes defined here.

pub mod types;

pub use types::{Availability, ListingFile, RawListing, SourceCandidate};
