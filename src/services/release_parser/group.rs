use once_cell::sync::Lazy;
use regex::Regex;

use super::vocabulary::{VocabRule, first_match};

const KNOWN_GROUPS: &[&str] = &[
    "avoneguy",
    "turg",
    "rosy",
    "sgf",
    "thebiscuitman",
    "vyndros",
    "portalgoods",
    "mgb",
    "fgt",
    "rarbg",
    "yts",
    "etrg",
    "yify",
    "ettv",
    "sparks",
    "dimension",
    "ctrlhd",
    "ntb",
    "evo",
    "qxr",
    "hon3y",
    "d3g",
    "stuttershit",
    "framestor",
    "amiable",
    "dubby",
];

static KNOWN_GROUP_RULES: Lazy<Vec<VocabRule<&'static str>>> = Lazy::new(|| {
    KNOWN_GROUPS
        .iter()
        .map(|group| VocabRule::new(*group, 1, &format!(r"\b{}\b", group)))
        .collect()
});

static TRAILING_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-([A-Za-z0-9_]{2,15})(?:\.[A-Za-z0-9]{2,4})?\s*$").unwrap());
static SQUARE_BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Za-z0-9_-]{2,15})\]").unwrap());
static PARENTHESISED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Za-z0-9_-]{2,15})\)").unwrap());
static ATTRIBUTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:by|from)\s+([A-Za-z0-9_-]{2,15})\b").unwrap());

/// Technical tokens that look like group names but are not
static NOT_A_GROUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:x264|x265|h264|h265|hevc|avc|av1|vp9|xvid|divx|1080p|2160p|720p|480p|4k|uhd|hdr|hdr10|dv|bluray|brrip|bdrip|webrip|web-dl|webdl|web|dl|hdtv|remux|aac|ac3|dts|truehd|atmos|ddp|dd5|extended|repack|proper|rerip|complete|multi|dual|eng|subs?)\b",
    )
    .unwrap()
});

/// Lowercased release group, or `None` when nothing plausible is present
pub fn extract_release_group(title: &str) -> Option<String> {
    if let Some(group) = first_match(&KNOWN_GROUP_RULES, title) {
        return Some(group.to_string());
    }

    let trailing = TRAILING_GROUP.captures_iter(title);
    let square = SQUARE_BRACKETED.captures_iter(title);
    let parens = PARENTHESISED.captures_iter(title);
    let attributed = ATTRIBUTED.captures_iter(title);

    trailing
        .chain(square)
        .chain(parens)
        .chain(attributed)
        .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
        .find(|candidate| is_plausible(candidate))
        .map(str::to_lowercase)
}

fn is_plausible(candidate: &str) -> bool {
    (2..=15).contains(&candidate.len())
        && candidate.chars().any(|c| c.is_ascii_alphabetic())
        && !NOT_A_GROUP.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_group() {
        assert_eq!(
            extract_release_group("The.Matrix.1999.1080p.BluRay.x264-GROUP").as_deref(),
            Some("group")
        );
        assert_eq!(
            extract_release_group("Movie.2020.1080p.WEB-DL.H264-NoGrp.mkv").as_deref(),
            Some("nogrp")
        );
    }

    #[test]
    fn test_known_group_wins() {
        assert_eq!(
            extract_release_group("Movie.2019.1080p.BluRay.x264-SPARKS").as_deref(),
            Some("sparks")
        );
        assert_eq!(
            extract_release_group("Movie (2019) [1080p] [YTS]").as_deref(),
            Some("yts")
        );
    }

    #[test]
    fn test_bracketed_groups_skip_technical_tokens() {
        assert_eq!(
            extract_release_group("[SubsPlease] Show - 05 [1080p]").as_deref(),
            Some("subsplease")
        );
        assert_eq!(extract_release_group("Movie (2019) [1080p] [x265]"), None);
    }

    #[test]
    fn test_web_dl_suffix_is_not_a_group() {
        assert_eq!(extract_release_group("Movie.2020.1080p.WEB-DL"), None);
    }

    #[test]
    fn test_numeric_candidates_rejected() {
        assert_eq!(extract_release_group("Movie-2019"), None);
    }
}
