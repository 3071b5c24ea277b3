//! Source filtering and ordering for playback

use crate::services::quality_scorer::{AvailabilityTier, CodecFamily, codec_family};

/// What ranking needs to know about a source
pub trait Rankable {
    /// A payload (e.g. the .torrent file) is already cached locally
    fn has_payload(&self) -> bool;
    fn video_codec(&self) -> Option<&str>;
    fn streaming_score(&self) -> f64;
    fn availability(&self) -> AvailabilityTier;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankingOptions {
    /// Drop HEVC/H.265 variants for clients that cannot decode them
    pub exclude_hevc: bool,
    pub min_availability: Option<AvailabilityTier>,
}

impl RankingOptions {
    pub fn without_hevc(mut self) -> Self {
        self.exclude_hevc = true;
        self
    }

    pub fn min_availability(mut self, tier: AvailabilityTier) -> Self {
        self.min_availability = Some(tier);
        self
    }
}

/// Playable sources, best first. Equal scores keep their input order.
pub fn filter_sources<S>(sources: impl IntoIterator<Item = S>, options: &RankingOptions) -> Vec<S>
where
    S: Rankable,
{
    let mut ranked: Vec<S> = sources
        .into_iter()
        .filter(|source| source.has_payload())
        .filter(|source| !(options.exclude_hevc && is_hevc(source.video_codec())))
        .filter(|source| {
            options
                .min_availability
                .is_none_or(|tier| source.availability() >= tier)
        })
        .collect();

    ranked.sort_by(|a, b| b.streaming_score().total_cmp(&a.streaming_score()));
    ranked
}

/// Sources at or above `tier`, order preserved
pub fn filter_by_availability<S>(sources: impl IntoIterator<Item = S>, tier: AvailabilityTier) -> Vec<S>
where
    S: Rankable,
{
    sources
        .into_iter()
        .filter(|source| source.availability() >= tier)
        .collect()
}

fn is_hevc(codec: Option<&str>) -> bool {
    codec.and_then(codec_family) == Some(CodecFamily::Hevc)
}
