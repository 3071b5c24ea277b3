//! Release-title parser
//!
//! Turns free-text indexer listings such as
//! - "The.Matrix.1999.1080p.BluRay.x264-GROUP"
//! - "Show.Name.S02E05.720p.WEB-DL.AAC.5.1.x264"
//!
//! into a [`ParsedRelease`]. Parsing never fails; unrecognised parts are left empty.

pub mod group;
pub mod title;
pub mod vocabulary;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indexer::RawListing;

use self::vocabulary::{
    ATMOS, AUDIO_CODECS, CHANNEL_FAMILIES, CHANNELS_20, CHANNELS_51, CHANNELS_71, ChannelFlags,
    DEFAULT_LANGUAGE, DOLBY_VISION, HDR_FORMATS, HDR10, HDR10_PLUS, LANGUAGES,
    MULTI_LANGUAGE, MULTIPLE_LANGUAGES, RESOLUTIONS, SOURCE_TYPES, SPACED_DIGITS,
    STREAMING_SERVICE, SUBTITLE_FILE, SUBTITLE_LANGUAGE, SUBTITLE_MARKER, VIDEO_CODECS,
    all_matches, best_match, first_match,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a release was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "UHD BluRay")]
    UhdBluRay,
    BluRay,
    Remux,
    #[serde(rename = "BDRip")]
    BdRip,
    #[serde(rename = "WebDL")]
    WebDl,
    #[serde(rename = "WEBRip")]
    WebRip,
    #[serde(rename = "HDTV")]
    Hdtv,
    #[serde(rename = "DVDRip")]
    DvdRip,
    #[serde(rename = "DVD")]
    Dvd,
    #[serde(rename = "VHS")]
    Vhs,
    Telesync,
    #[serde(rename = "CAM")]
    Cam,
}

impl SourceType {
    pub const ALL: [SourceType; 12] = [
        SourceType::UhdBluRay,
        SourceType::BluRay,
        SourceType::Remux,
        SourceType::BdRip,
        SourceType::WebDl,
        SourceType::WebRip,
        SourceType::Hdtv,
        SourceType::DvdRip,
        SourceType::Dvd,
        SourceType::Vhs,
        SourceType::Telesync,
        SourceType::Cam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::UhdBluRay => "UHD BluRay",
            SourceType::BluRay => "BluRay",
            SourceType::Remux => "Remux",
            SourceType::BdRip => "BDRip",
            SourceType::WebDl => "WebDL",
            SourceType::WebRip => "WEBRip",
            SourceType::Hdtv => "HDTV",
            SourceType::DvdRip => "DVDRip",
            SourceType::Dvd => "DVD",
            SourceType::Vhs => "VHS",
            SourceType::Telesync => "Telesync",
            SourceType::Cam => "CAM",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown source type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
            Resolution::P1440 => "1440p",
            Resolution::P2160 => "2160p",
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Resolution::P480 => 480,
            Resolution::P720 => 720,
            Resolution::P1080 => 1080,
            Resolution::P1440 => 1440,
            Resolution::P2160 => 2160,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured metadata parsed from a listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRelease {
    /// Listing title as received
    pub title: String,
    pub clean_title: String,
    pub kind: MediaKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Whole-season pack without a single episode number
    pub complete_season: bool,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<String>,
    pub resolution: Option<Resolution>,
    pub source: Option<SourceType>,
    pub hdr_format: Option<String>,
    /// Detected audio languages, or the single entry "multiple"
    pub languages: Vec<String>,
    pub has_multiple_languages: bool,
    pub subtitles: bool,
    pub subtitle_language: Option<String>,
    pub release_group: Option<String>,
    pub year: Option<u16>,
    /// Bytes, 0 when unknown
    pub size: u64,
}

impl ParsedRelease {
    pub fn is_tv(&self) -> bool {
        self.kind == MediaKind::Tv
    }
}

/// Parse a bare title with no description, files or category
pub fn parse_title(title: &str) -> ParsedRelease {
    parse_release(&RawListing::from_title(title))
}

pub fn parse_release(listing: &RawListing) -> ParsedRelease {
    let title = listing.title.trim();
    let full_text = format!("{} {}", title, listing.description);
    let first_file = listing.files.first().map(|file| file.name.as_str());

    let marker = title::detect_episode(title).or_else(|| {
        listing
            .files
            .iter()
            .find_map(|file| title::detect_episode(&file.name))
    });
    let kind = if marker.is_some() || title::is_tv_category(listing.category_hint.as_deref()) {
        MediaKind::Tv
    } else {
        MediaKind::Movie
    };

    let release_group = group::extract_release_group(title);
    let (languages, has_multiple_languages) = detect_languages(&full_text);
    let subtitles = SUBTITLE_MARKER.is_match(&full_text)
        || listing.files.iter().any(|file| SUBTITLE_FILE.is_match(&file.name));
    let subtitle_language = SUBTITLE_LANGUAGE
        .captures(&full_text)
        .map(|captures| captures[1].to_lowercase());

    let parsed = ParsedRelease {
        title: title.to_string(),
        clean_title: title::clean_title(title),
        kind,
        season: marker.and_then(|m| m.season),
        episode: marker.and_then(|m| m.episode),
        complete_season: marker.is_some_and(|m| m.complete_season),
        video_codec: first_match(&VIDEO_CODECS, &full_text).map(|codec| codec.to_string()),
        audio_codec: first_match(&AUDIO_CODECS, &full_text).map(|codec| codec.to_string()),
        audio_channels: audio_channels(&full_text),
        resolution: first_match(&RESOLUTIONS, &full_text).copied(),
        source: source_type(&full_text),
        hdr_format: hdr_format(&full_text),
        languages,
        has_multiple_languages,
        subtitles,
        subtitle_language,
        release_group,
        year: title::extract_year(title, first_file, &listing.description),
        size: listing.effective_size(),
    };

    debug!(
        title = %parsed.title,
        clean_title = %parsed.clean_title,
        kind = %parsed.kind,
        resolution = ?parsed.resolution,
        source = ?parsed.source,
        group = ?parsed.release_group,
        "Parsed release"
    );

    parsed
}

fn source_type(text: &str) -> Option<SourceType> {
    best_match(&SOURCE_TYPES, text).copied().or_else(|| {
        STREAMING_SERVICE
            .is_match(text)
            .then_some(SourceType::WebDl)
    })
}

fn hdr_format(text: &str) -> Option<String> {
    let found = all_matches(&HDR_FORMATS, text);
    let has = |label: &str| found.iter().any(|format| **format == label);

    if has(DOLBY_VISION) && has(HDR10_PLUS) {
        return Some("DV HDR10+".to_string());
    }
    if has(DOLBY_VISION) && has(HDR10) {
        return Some("DV HDR10".to_string());
    }
    best_match(&HDR_FORMATS, text).map(|format| format.to_string())
}

fn audio_channels(text: &str) -> Option<String> {
    let normalized = SPACED_DIGITS
        .replace_all(&text.to_lowercase(), "$1.$2")
        .into_owned();
    let flags = ChannelFlags {
        atmos: ATMOS.is_match(&normalized),
        ch71: CHANNELS_71.is_match(&normalized),
        ch51: CHANNELS_51.is_match(&normalized),
        ch20: CHANNELS_20.is_match(&normalized),
    };

    CHANNEL_FAMILIES
        .iter()
        .find_map(|family| family.label(&normalized, &flags))
        .map(str::to_string)
}

fn detect_languages(text: &str) -> (Vec<String>, bool) {
    if MULTI_LANGUAGE.is_match(text) {
        return (vec![MULTIPLE_LANGUAGES.to_string()], true);
    }

    match all_matches(&LANGUAGES, text).as_slice() {
        [] => (vec![DEFAULT_LANGUAGE.to_string()], false),
        [single] => (vec![single.to_string()], false),
        _ => (vec![MULTIPLE_LANGUAGES.to_string()], true),
    }
}
