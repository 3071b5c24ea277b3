//! Quality scoring for parsed releases
//!
//! A release gets a 1-5 score from its source, resolution, codec and size, a 0-1
//! confidence from how much of that was actually recognised, and an availability
//! tier from its swarm counters.

use serde::{Deserialize, Serialize};

use crate::indexer::Availability;
use crate::services::release_parser::{ParsedRelease, Resolution, SourceType};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;
pub const UNKNOWN_SOURCE_SCORE: f64 = 2.5;

pub const HIGH_AVAILABILITY: u64 = 20;
pub const MEDIUM_AVAILABILITY: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AvailabilityTier {
    Low,
    Medium,
    High,
}

impl AvailabilityTier {
    pub fn from_combined(combined: u64) -> Self {
        if combined >= HIGH_AVAILABILITY {
            AvailabilityTier::High
        } else if combined >= MEDIUM_AVAILABILITY {
            AvailabilityTier::Medium
        } else {
            AvailabilityTier::Low
        }
    }

    /// Multiplier applied to the score when ranking for playback
    pub fn streaming_weight(&self) -> f64 {
        match self {
            AvailabilityTier::High => 1.0,
            AvailabilityTier::Medium => 0.85,
            AvailabilityTier::Low => 0.6,
        }
    }
}

/// Video codec normalised to the family that decides its bonus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecFamily {
    Hevc,
    Av1,
    Avc,
    Vp9,
    Vp8,
    Xvid,
    Mpeg4,
    Mpeg2,
    Vc1,
}

impl CodecFamily {
    pub fn quality_bonus(&self) -> f64 {
        match self {
            CodecFamily::Hevc => 0.5,
            CodecFamily::Av1 => 0.4,
            CodecFamily::Avc => 0.3,
            CodecFamily::Vp9 => 0.2,
            CodecFamily::Vp8 | CodecFamily::Xvid | CodecFamily::Mpeg4 => 0.1,
            CodecFamily::Mpeg2 | CodecFamily::Vc1 => 0.0,
        }
    }
}

pub fn codec_family(codec: &str) -> Option<CodecFamily> {
    let normalized: String = codec
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' ' | '_'))
        .collect();

    let family = if ["x265", "h265", "hevc"].iter().any(|c| normalized.contains(c)) {
        CodecFamily::Hevc
    } else if ["x264", "h264", "avc"].iter().any(|c| normalized.contains(c)) {
        CodecFamily::Avc
    } else if normalized.contains("av1") {
        CodecFamily::Av1
    } else if normalized.contains("vp9") {
        CodecFamily::Vp9
    } else if normalized.contains("vp8") {
        CodecFamily::Vp8
    } else if normalized.contains("xvid") {
        CodecFamily::Xvid
    } else if normalized.contains("mpeg2") {
        CodecFamily::Mpeg2
    } else if normalized.contains("mpeg4") || normalized.contains("divx") {
        CodecFamily::Mpeg4
    } else if normalized.contains("vc1") {
        CodecFamily::Vc1
    } else {
        return None;
    };

    Some(family)
}

/// Derived quality view of one release, recomputed on demand
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    /// 1.0-5.0, one decimal
    pub score: f64,
    /// 0.0-1.0, two decimals
    pub confidence: f64,
    pub availability: AvailabilityTier,
    pub combined_availability: u64,
}

impl QualityAssessment {
    pub fn streaming_score(&self) -> f64 {
        round_to(self.score * self.availability.streaming_weight(), 2)
    }
}

pub fn assess(release: &ParsedRelease, availability: &Availability) -> QualityAssessment {
    let combined = availability.combined();

    QualityAssessment {
        score: calculate_quality_score(release, release.size),
        confidence: calculate_confidence(release, combined),
        availability: AvailabilityTier::from_combined(combined),
        combined_availability: combined,
    }
}

pub fn calculate_quality_score(release: &ParsedRelease, size: u64) -> f64 {
    let score = source_score(release.source)
        + release.resolution.map(resolution_bonus).unwrap_or(0.0)
        + release
            .video_codec
            .as_deref()
            .and_then(codec_family)
            .map(|family| family.quality_bonus())
            .unwrap_or(0.0)
        + release
            .resolution
            .map(|resolution| size_adjustment(size, resolution))
            .unwrap_or(0.0);

    round_to(score.clamp(MIN_SCORE, MAX_SCORE), 1)
}

pub fn calculate_confidence(release: &ParsedRelease, combined_availability: u64) -> f64 {
    let mut confidence = 0.5;

    confidence += match combined_availability {
        0 => -0.2,
        1..=10 => 0.1,
        11..=50 => 0.2,
        _ => 0.3,
    };
    if release.source.is_some() {
        confidence += 0.1;
    }
    if release.resolution.is_some() {
        confidence += 0.1;
    }

    round_to(f64::clamp(confidence, 0.0, 1.0), 2)
}

/// Base score by source, `UNKNOWN_SOURCE_SCORE` when unrecognised
pub fn source_score(source: Option<SourceType>) -> f64 {
    match source {
        Some(SourceType::UhdBluRay | SourceType::Remux | SourceType::BluRay) => 5.0,
        Some(SourceType::WebDl) => 4.5,
        Some(SourceType::WebRip | SourceType::BdRip) => 4.0,
        Some(SourceType::Hdtv) => 3.5,
        Some(SourceType::DvdRip | SourceType::Dvd) => 3.0,
        Some(SourceType::Telesync) => 2.0,
        Some(SourceType::Cam) => 1.0,
        Some(SourceType::Vhs) | None => UNKNOWN_SOURCE_SCORE,
    }
}

pub fn resolution_bonus(resolution: Resolution) -> f64 {
    match resolution {
        Resolution::P2160 => 1.5,
        Resolution::P1440 => 1.2,
        Resolution::P1080 => 1.0,
        Resolution::P720 => 0.5,
        Resolution::P480 => 0.2,
    }
}

/// Typical size of a feature-length release at this resolution, in bytes
pub fn expected_size(resolution: Resolution) -> f64 {
    GIB * match resolution {
        Resolution::P2160 => 8.0,
        Resolution::P1440 => 4.0,
        Resolution::P1080 => 2.0,
        Resolution::P720 => 1.0,
        Resolution::P480 => 0.7,
    }
}

/// Penalty for implausibly small files, tiny bonus for generous ones.
/// An unknown size (0) is left alone.
pub fn size_adjustment(size: u64, resolution: Resolution) -> f64 {
    if size == 0 {
        return 0.0;
    }

    let ratio = size as f64 / expected_size(resolution);
    if ratio < 0.3 {
        -1.0
    } else if ratio < 0.5 {
        -0.5
    } else if ratio < 0.7 {
        -0.2
    } else if ratio <= 2.0 {
        0.0
    } else if ratio <= 3.0 {
        0.1
    } else {
        -0.1
    }
}

/// Human-readable approximate size, e.g. "~1.5 GB"
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let size = bytes as f64 / 1024f64.powi(exponent as i32);

    format!("~{} {}", round_to(size, 1), UNITS[exponent])
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::release_parser::parse_title;

    fn release(source: Option<SourceType>, resolution: Option<Resolution>) -> ParsedRelease {
        ParsedRelease {
            source,
            resolution,
            ..ParsedRelease::default()
        }
    }

    #[test]
    fn test_score_for_typical_bluray() {
        let parsed = parse_title("The.Matrix.1999.1080p.BluRay.x264-GROUP");
        let two_gib = (2.0 * GIB) as u64;
        // 5.0 + 1.0 + 0.3, clamped
        assert_eq!(calculate_quality_score(&parsed, two_gib), 5.0);

        let parsed = parse_title("Movie.2019.720p.HDTV.x264");
        // 3.5 + 0.5 + 0.3
        assert_eq!(calculate_quality_score(&parsed, GIB as u64), 4.3);
    }

    #[test]
    fn test_unknown_release_scores_neutral() {
        let parsed = release(None, None);
        assert_eq!(calculate_quality_score(&parsed, 0), 2.5);
    }

    #[test]
    fn test_undersized_release_penalised() {
        let parsed = release(Some(SourceType::WebDl), Some(Resolution::P1080));
        let tiny = (0.2 * 2.0 * GIB) as u64;
        // 4.5 + 1.0 - 1.0
        assert_eq!(calculate_quality_score(&parsed, tiny), 4.5);
        assert_eq!(size_adjustment(tiny, Resolution::P1080), -1.0);
        assert_eq!(size_adjustment((0.6 * GIB) as u64, Resolution::P720), -0.2);
        assert_eq!(size_adjustment((2.5 * GIB) as u64, Resolution::P720), 0.1);
        assert_eq!(size_adjustment((3.5 * GIB) as u64, Resolution::P720), -0.1);
        assert_eq!(size_adjustment(0, Resolution::P720), 0.0);
    }

    #[test]
    fn test_source_tiers_strictly_ordered() {
        let tiers = [
            SourceType::BluRay,
            SourceType::WebDl,
            SourceType::WebRip,
            SourceType::Hdtv,
            SourceType::Dvd,
            SourceType::Telesync,
            SourceType::Cam,
        ];
        for pair in tiers.windows(2) {
            assert!(source_score(Some(pair[0])) > source_score(Some(pair[1])));
        }
        assert_eq!(source_score(Some(SourceType::UhdBluRay)), source_score(Some(SourceType::BluRay)));
        // parser prefers the rip label, the untouched web release still scores higher
        assert!(source_score(Some(SourceType::BdRip)) < source_score(Some(SourceType::WebDl)));
    }

    #[test]
    fn test_resolution_bonus_monotonic() {
        let ordered = [
            Resolution::P480,
            Resolution::P720,
            Resolution::P1080,
            Resolution::P1440,
            Resolution::P2160,
        ];
        for pair in ordered.windows(2) {
            assert!(resolution_bonus(pair[0]) <= resolution_bonus(pair[1]));
        }
    }

    #[test]
    fn test_score_and_confidence_bounds() {
        let sizes = [0, 1, 1 << 20, 1 << 30, 1 << 34, u64::MAX];
        let availabilities = [0, 1, 10, 11, 50, 51, u64::MAX];
        let sources = std::iter::once(None).chain(SourceType::ALL.into_iter().map(Some));

        for source in sources {
            for resolution in [None, Some(Resolution::P480), Some(Resolution::P2160)] {
                let mut parsed = release(source, resolution);
                parsed.video_codec = Some("x265".to_string());
                for size in sizes {
                    let score = calculate_quality_score(&parsed, size);
                    assert!((MIN_SCORE..=MAX_SCORE).contains(&score));
                }
                for availability in availabilities {
                    let confidence = calculate_confidence(&parsed, availability);
                    assert!((0.0..=1.0).contains(&confidence));
                }
            }
        }
    }

    #[test]
    fn test_confidence_steps() {
        let bare = release(None, None);
        assert_eq!(calculate_confidence(&bare, 0), 0.3);
        assert_eq!(calculate_confidence(&bare, 5), 0.6);
        assert_eq!(calculate_confidence(&bare, 30), 0.7);

        let full = release(Some(SourceType::BluRay), Some(Resolution::P1080));
        assert_eq!(calculate_confidence(&full, 100), 1.0);
    }

    #[test]
    fn test_availability_tiers() {
        assert_eq!(AvailabilityTier::from_combined(20), AvailabilityTier::High);
        assert_eq!(AvailabilityTier::from_combined(19), AvailabilityTier::Medium);
        assert_eq!(AvailabilityTier::from_combined(5), AvailabilityTier::Medium);
        assert_eq!(AvailabilityTier::from_combined(4), AvailabilityTier::Low);

        let parsed = release(Some(SourceType::WebDl), Some(Resolution::P1080));
        let assessment = assess(&parsed, &Availability::new(8, 4));
        assert_eq!(assessment.combined_availability, 20);
        assert_eq!(assessment.availability, AvailabilityTier::High);
    }

    #[test]
    fn test_streaming_score_weights_tier() {
        let assessment = QualityAssessment {
            score: 4.0,
            confidence: 0.8,
            availability: AvailabilityTier::Medium,
            combined_availability: 6,
        };
        assert_eq!(assessment.streaming_score(), 3.4);
    }

    #[test]
    fn test_codec_family() {
        assert_eq!(codec_family("H.265"), Some(CodecFamily::Hevc));
        assert_eq!(codec_family("x264"), Some(CodecFamily::Avc));
        assert_eq!(codec_family("AV1"), Some(CodecFamily::Av1));
        assert_eq!(codec_family("DivX"), Some(CodecFamily::Mpeg4));
        assert_eq!(codec_family("VC-1"), Some(CodecFamily::Vc1));
        assert_eq!(codec_family("mystery"), None);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "~512 B");
        assert_eq!(format_file_size(1536 * 1024 * 1024), "~1.5 GB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "~10 MB");
    }
}
