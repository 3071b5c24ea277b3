//! Title-level extraction: year, season/episode markers and the cleaned display title.

use once_cell::sync::Lazy;
use regex::Regex;

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

static TV_CATEGORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tv|series|episode|season").unwrap());

static STANDARD_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})\s*[.-]?\s*E(\d{1,3})\b").unwrap());
static VERBOSE_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bSeason\s*(\d{1,2})\s*Episode\s*(\d{1,3})\b").unwrap());
static ABBREVIATED_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})x(\d{2,3})\b").unwrap());
static COMPLETE_SEASON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})\b|\bSeason\s*(\d{1,2})\b").unwrap());

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").unwrap());
static LOOSE_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s-+|-+\s|^-+|-+$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(.+?)[\s,]+the$").unwrap());

static FILE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(?:mkv|mp4|m4v|avi|wmv|mov|webm|iso)\s*$").unwrap());
static TRAILING_GROUP_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-[A-Za-z0-9_]{2,15}\s*$").unwrap());

/// Season and episode markers, stripped before and after the technical tokens
static EPISODE_NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bS\d{1,2}\s*[.-]?\s*E\d{1,3}\b",
        r"\bSeason\s*\d{1,2}\s*Episode\s*\d{1,3}\b",
        r"\b\d{1,2}x\d{2,3}\b",
        r"\bComplete\s+Season\s*\d{0,2}\b",
        r"\bSeason\s*\d{1,2}\b",
        r"\bS\d{1,2}\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(&format!("(?i){}", pattern)).unwrap())
    .collect()
});

/// Technical tokens removed from titles, applied in order
static NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(?:true\s?hd|atmos|dts(?:-?hd)?(?:\s*ma)?|dts[:-]?x|e-?ac-?3|ac-?3|aac(?:[257]\s?[01])?|opus|flac|mp3)\b",
        r"\b\d{3,4}[pi]\b",
        r"\b(?:4k|uhd|fhd|hd|sd)\b",
        r"\b(?:ultrahd|complete)?\s*blu-?\s*ray(?:\s*rip)?\b",
        r"\b(?:remux|bdrip|brrip|bd50|bd25|bdiso)\b",
        r"\bweb-?\s*(?:dl|rip|download)?\b",
        r"\b(?:webdl|webrip|webdownload|dlmux)\b",
        r"\b(?:hdtv|pdtv|dsr|dtv|hdtvrip|tvrip|dvbrip)\b",
        r"\b(?:dvd\s*rip|dvd\s*r|dvd9|dvd5|dvdiso|dvd)\b",
        r"\b(?:vhs|vhsrip|telesync|hdts|dvdscr|dvdscreener|screener|camrip|hdcam)\b",
        r"\b(?:netflix|nf|amzn|amazon|hulu|disney|dsnp|hmax|itunes|appletv|atvp)\b\+?",
        r"\b(?:x264|x265|h\s?264|h\s?265|hevc|avc|av1|vp9|xvid|divx|vc-?1|mpeg-?[24])\b",
        r"\b(?:ddp|dd)(?:\+|\s*[257]\s*[01])?(?:\s|$)",
        r"\bdd\+",
        r"\b(?:[257]\s1|2\s0)\b",
        r"\b(?:dolby\s*vision|dovi|dv|hdr10plus|hdr10|hdr|hlg|10bit|8bit)\b\+?",
        r"\b(?:proper|repack|rerip|extended|unrated|remastered|limited|internal|multi|dual|subs?)\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(&format!("(?i){}", pattern)).unwrap())
    .collect()
});

/// Season and episode marker found in a title or file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeMarker {
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub complete_season: bool,
}

pub fn is_tv_category(hint: Option<&str>) -> bool {
    hint.is_some_and(|hint| TV_CATEGORY.is_match(hint))
}

/// First plausible year in the title, then the first file name, then the description
pub fn extract_year(title: &str, first_file: Option<&str>, description: &str) -> Option<u16> {
    [Some(title), first_file, Some(description)]
        .into_iter()
        .flatten()
        .find_map(|text| {
            YEAR.captures(text)
                .and_then(|captures| captures[1].parse().ok())
        })
}

pub fn detect_episode(text: &str) -> Option<EpisodeMarker> {
    let text = spaced(text);

    for pattern in [&*STANDARD_EPISODE, &*VERBOSE_EPISODE, &*ABBREVIATED_EPISODE] {
        if let Some(captures) = pattern.captures(&text) {
            return Some(EpisodeMarker {
                season: captures.get(1).and_then(|m| m.as_str().parse().ok()),
                episode: captures.get(2).and_then(|m| m.as_str().parse().ok()),
                complete_season: false,
            });
        }
    }

    COMPLETE_SEASON.captures(&text).map(|captures| EpisodeMarker {
        season: captures
            .get(1)
            .or_else(|| captures.get(2))
            .and_then(|m| m.as_str().parse().ok()),
        episode: None,
        complete_season: true,
    })
}

/// Human-readable title with technical tokens and the release group removed.
///
/// The trailing `-GROUP` suffix is dropped whichever group was detected.
/// Only the last year-like token is stripped, so titles that are themselves
/// numbers ("1917", "2001 A Space Odyssey") keep their name.
pub fn clean_title(title: &str) -> String {
    let title = FILE_EXTENSION.replace(title.trim(), "");
    let title = TRAILING_GROUP_SUFFIX.replace(&title, "");

    let mut cleaned = spaced(&title);
    cleaned = BRACKETED.replace_all(&cleaned, " ").into_owned();

    if let Some(range) = YEAR.find_iter(&cleaned).last().map(|year| year.range()) {
        cleaned.replace_range(range, " ");
    }

    cleaned = strip_episode_markers(cleaned);
    for noise in NOISE.iter() {
        cleaned = noise.replace_all(&cleaned, " ").into_owned();
    }
    // removing a token can join "Season" to a number that followed it
    cleaned = strip_episode_markers(cleaned);

    cleaned = LOOSE_HYPHEN.replace_all(&cleaned, " ").into_owned();
    cleaned = WHITESPACE.replace_all(&cleaned, " ").into_owned();
    let cleaned = cleaned.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'));

    match TRAILING_ARTICLE.captures(cleaned) {
        Some(captures) => format!("The {}", captures[1].trim_end_matches(',')),
        None => cleaned.to_string(),
    }
}

fn strip_episode_markers(mut text: String) -> String {
    loop {
        let mut stripped = text.clone();
        for marker in EPISODE_NOISE.iter() {
            stripped = marker.replace_all(&stripped, " ").into_owned();
        }
        stripped = WHITESPACE.replace_all(&stripped, " ").into_owned();
        if stripped == text {
            return text;
        }
        text = stripped;
    }
}

fn spaced(text: &str) -> String {
    text.replace(['.', '_'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_fallback_order() {
        assert_eq!(extract_year("Movie.1999.1080p", Some("Movie.2001.mkv"), ""), Some(1999));
        assert_eq!(extract_year("Movie.1080p", Some("Movie.2001.mkv"), "from 1995"), Some(2001));
        assert_eq!(extract_year("Movie", None, "released 1995"), Some(1995));
        assert_eq!(extract_year("Movie.2160p", None, ""), None);
    }

    #[test]
    fn test_episode_patterns() {
        let marker = detect_episode("Show.Name.S02E05.720p").unwrap();
        assert_eq!((marker.season, marker.episode), (Some(2), Some(5)));
        assert!(!marker.complete_season);

        let marker = detect_episode("Show Season 3 Episode 12").unwrap();
        assert_eq!((marker.season, marker.episode), (Some(3), Some(12)));

        let marker = detect_episode("Show 4x07 HDTV").unwrap();
        assert_eq!((marker.season, marker.episode), (Some(4), Some(7)));

        let marker = detect_episode("Show.S01.1080p.WEB-DL").unwrap();
        assert_eq!(marker.season, Some(1));
        assert_eq!(marker.episode, None);
        assert!(marker.complete_season);

        assert!(detect_episode("The.Matrix.1999.1080p.BluRay.x264").is_none());
        assert!(detect_episode("Movie.1920x1080").is_none());
    }

    #[test]
    fn test_clean_title_basic() {
        assert_eq!(
            clean_title("The.Matrix.1999.1080p.BluRay.x264-GROUP"),
            "The Matrix"
        );
        assert_eq!(
            clean_title("Show.Name.S02E05.720p.WEB-DL.AAC.5.1.x264"),
            "Show Name"
        );
    }

    #[test]
    fn test_clean_title_keeps_inner_hyphen_and_numeric_titles() {
        assert_eq!(
            clean_title("Spider-Man.2002.1080p.BluRay.x264"),
            "Spider-Man"
        );
        assert_eq!(clean_title("1917.2019.2160p.UHD.BluRay.x265"), "1917");
    }

    #[test]
    fn test_clean_title_drops_trailing_group_and_extension() {
        assert_eq!(clean_title("Movie.2020.1080p.WEB-DL.H264-NoGrp.mkv"), "Movie");
        assert_eq!(
            clean_title("The.Fourth.Dimension.2012.1080p.BluRay.x264-AMIABLEX"),
            "The Fourth Dimension"
        );
        assert_eq!(clean_title("Movie.2021.720p.HDTV.avi"), "Movie");
    }

    #[test]
    fn test_clean_title_strips_season_exposed_by_token_removal() {
        let cleaned = clean_title("Open.Season.720p.12.BluRay.x264");
        assert_eq!(cleaned, "Open");
        assert!(detect_episode(&cleaned).is_none());
    }

    #[test]
    fn test_clean_title_moves_trailing_article() {
        assert_eq!(clean_title("Matrix, The (1999) [1080p]"), "The Matrix");
    }

    #[test]
    fn test_clean_title_of_clean_title_is_stable() {
        let once = clean_title("Show.Name.S02E05.720p.WEB-DL.AAC.5.1.x264");
        assert_eq!(clean_title(&once), once);
        assert!(detect_episode(&once).is_none());
    }

    #[test]
    fn test_tv_category() {
        assert!(is_tv_category(Some("TV/HD")));
        assert!(is_tv_category(Some("Series")));
        assert!(!is_tv_category(Some("Movies")));
        assert!(!is_tv_category(None));
    }
}
