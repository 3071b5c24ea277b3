//! Listing to stored-source pipeline: parse, score, encrypt.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::indexer::SourceCandidate;
use crate::services::encryption::{CryptoError, FieldCodec, NonceMode};
use crate::services::quality_scorer::{AvailabilityTier, QualityAssessment, assess};
use crate::services::ranking::Rankable;
use crate::services::release_parser::{ParsedRelease, parse_release};

/// A source ready to be stored: metadata in the clear, identifiers encrypted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSource {
    pub parent_media_id: String,
    pub release: ParsedRelease,
    pub assessment: QualityAssessment,
    /// Deterministic, so equal hashes compare equal while encrypted
    pub info_hash_enc: String,
    pub link_enc: String,
    pub payload_enc: Option<String>,
    pub streaming_score: f64,
}

impl ResolvedSource {
    /// Identity of a source within its parent media
    pub fn dedup_key(&self) -> (&str, &str) {
        (self.parent_media_id.as_str(), self.info_hash_enc.as_str())
    }
}

impl Rankable for ResolvedSource {
    fn has_payload(&self) -> bool {
        self.payload_enc.is_some()
    }

    fn video_codec(&self) -> Option<&str> {
        self.release.video_codec.as_deref()
    }

    fn streaming_score(&self) -> f64 {
        self.streaming_score
    }

    fn availability(&self) -> AvailabilityTier {
        self.assessment.availability
    }
}

/// Decrypted identifiers of a stored source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedSource {
    pub info_hash: String,
    pub resource_link: String,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct SourceResolver {
    codec: FieldCodec,
}

impl SourceResolver {
    pub fn new(codec: FieldCodec) -> Self {
        Self { codec }
    }

    pub fn resolve(
        &self,
        parent_media_id: &str,
        candidate: &SourceCandidate,
    ) -> Result<ResolvedSource, CryptoError> {
        let release = parse_release(&candidate.listing);
        let assessment = assess(&release, &candidate.availability);
        let info_hash = normalize_info_hash(&candidate.info_hash);

        let info_hash_enc = self.codec.encrypt(&info_hash, NonceMode::Deterministic)?;
        let link_enc = self
            .codec
            .encrypt(&candidate.resource_link, NonceMode::Random)?;
        let payload_enc = candidate
            .payload
            .as_deref()
            .map(|payload| self.codec.encrypt_bytes(payload, NonceMode::Random))
            .transpose()?;

        debug!(
            parent_media_id = %parent_media_id,
            title = %release.clean_title,
            score = assessment.score,
            availability = ?assessment.availability,
            has_payload = payload_enc.is_some(),
            "Resolved source"
        );

        Ok(ResolvedSource {
            parent_media_id: parent_media_id.to_string(),
            streaming_score: assessment.streaming_score(),
            release,
            assessment,
            info_hash_enc,
            link_enc,
            payload_enc,
        })
    }

    /// Resolve every candidate, dropping repeats of the same info hash
    pub fn resolve_all<'a>(
        &self,
        parent_media_id: &str,
        candidates: impl IntoIterator<Item = &'a SourceCandidate>,
    ) -> Result<Vec<ResolvedSource>, CryptoError> {
        let resolved = candidates
            .into_iter()
            .map(|candidate| self.resolve(parent_media_id, candidate))
            .collect::<Result<Vec<_>, _>>()?;
        let total = resolved.len();
        let unique = dedupe(resolved);

        info!(
            parent_media_id = %parent_media_id,
            total,
            unique = unique.len(),
            "Resolved sources"
        );
        Ok(unique)
    }

    pub fn reveal(&self, source: &ResolvedSource) -> Result<RevealedSource, CryptoError> {
        Ok(RevealedSource {
            info_hash: self.codec.decrypt(&source.info_hash_enc)?,
            resource_link: self.codec.decrypt(&source.link_enc)?,
            payload: source
                .payload_enc
                .as_deref()
                .map(|payload| self.codec.decrypt_bytes(payload))
                .transpose()?,
        })
    }
}

/// Keep the first source per (parent media, info hash)
pub fn dedupe(sources: Vec<ResolvedSource>) -> Vec<ResolvedSource> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| {
            seen.insert((
                source.parent_media_id.clone(),
                source.info_hash_enc.clone(),
            ))
        })
        .collect()
}

fn normalize_info_hash(info_hash: &str) -> String {
    info_hash.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{Availability, RawListing};

    fn resolver() -> SourceResolver {
        SourceResolver::new(FieldCodec::from_base64_key(&FieldCodec::generate_key()).unwrap())
    }

    fn candidate(title: &str, info_hash: &str) -> SourceCandidate {
        SourceCandidate {
            listing: RawListing::from_title(title).with_size(2 * 1024 * 1024 * 1024),
            info_hash: info_hash.to_string(),
            resource_link: format!("magnet:?xt=urn:btih:{}", info_hash),
            availability: Availability::new(15, 4),
            payload: Some(vec![0xd8, 0x34, 0x3a]),
        }
    }

    #[test]
    fn test_resolve_and_reveal() {
        let resolver = resolver();
        let source = resolver
            .resolve("movie-1", &candidate("The.Matrix.1999.1080p.BluRay.x264-GROUP", "ABCDEF"))
            .unwrap();

        assert_eq!(source.release.clean_title, "The Matrix");
        assert_eq!(source.assessment.availability, AvailabilityTier::High);
        assert_eq!(source.streaming_score, source.assessment.streaming_score());
        assert!(!source.info_hash_enc.contains("abcdef"));

        let revealed = resolver.reveal(&source).unwrap();
        assert_eq!(revealed.info_hash, "abcdef");
        assert_eq!(revealed.resource_link, "magnet:?xt=urn:btih:ABCDEF");
        assert_eq!(revealed.payload, Some(vec![0xd8, 0x34, 0x3a]));
    }

    #[test]
    fn test_dedupe_keeps_first_per_parent() {
        let resolver = resolver();
        let first = candidate("Movie.2020.1080p.WEB-DL.x264-AAA", "hash1");
        let repeat = candidate("Movie.2020.720p.WEB-DL.x264-BBB", "HASH1");
        let other = candidate("Movie.2020.2160p.WEB-DL.x265-CCC", "hash2");

        let resolved = resolver
            .resolve_all("movie-1", [&first, &repeat, &other])
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].release.release_group.as_deref(), Some("aaa"));

        let elsewhere = resolver.resolve("movie-2", &first).unwrap();
        let mut all = resolved.clone();
        all.push(elsewhere);
        assert_eq!(dedupe(all).len(), 3);
    }

    #[test]
    fn test_missing_payload_stays_missing() {
        let resolver = resolver();
        let mut without = candidate("Movie.2020.1080p.WEB-DL", "hash");
        without.payload = None;

        let source = resolver.resolve("movie-1", &without).unwrap();
        assert!(!source.has_payload());
        assert_eq!(resolver.reveal(&source).unwrap().payload, None);
    }
}
