//! Listing types produced by indexer scrapers

use serde::{Deserialize, Serialize};

/// One file inside a listed release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFile {
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
}

impl ListingFile {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Free-text listing exactly as an indexer shows it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawListing {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Indexer category label, e.g. "Movies/HD" or "TV/Episodes"
    #[serde(default)]
    pub category_hint: Option<String>,
    #[serde(default)]
    pub files: Vec<ListingFile>,
    /// Total size in bytes, 0 when the indexer did not say
    #[serde(default)]
    pub total_size: u64,
}

impl RawListing {
    pub fn from_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_hint = Some(category.into());
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, size: u64) -> Self {
        self.files.push(ListingFile::new(name, size));
        self
    }

    pub fn with_size(mut self, total_size: u64) -> Self {
        self.total_size = total_size;
        self
    }

    /// Declared total size, or the sum of file sizes when none was given
    pub fn effective_size(&self) -> u64 {
        if self.total_size > 0 {
            self.total_size
        } else {
            self.files.iter().map(|f| f.size).fold(0u64, u64::saturating_add)
        }
    }
}

/// Swarm counters reported for a release
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// Peers with the complete payload (seeders)
    pub broadcasters: u32,
    /// Peers still downloading (leechers)
    pub watchers: u32,
}

impl Availability {
    pub fn new(broadcasters: u32, watchers: u32) -> Self {
        Self {
            broadcasters,
            watchers,
        }
    }

    /// Complete copies count double
    pub fn combined(&self) -> u64 {
        2 * self.broadcasters as u64 + self.watchers as u64
    }
}

/// Everything a scraper knows about one downloadable release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub listing: RawListing,
    pub info_hash: String,
    /// Magnet or download link
    pub resource_link: String,
    pub availability: Availability,
    /// Locally cached payload (e.g. the .torrent file), if already fetched
    pub payload: Option<Vec<u8>>,
}
