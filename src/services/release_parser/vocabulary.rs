//! Fixed vocabularies recognised in release titles.
//!
//! Each category is an ordered table of [`VocabRule`]s. The matching loops are
//! [`first_match`] (table order decides) and [`best_match`] (highest priority wins,
//! table order breaks ties).

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Resolution, SourceType};

pub struct VocabRule<T> {
    pub value: T,
    pub priority: u8,
    include: Regex,
    exclude: Option<Regex>,
}

impl<T> VocabRule<T> {
    pub(super) fn new(value: T, priority: u8, include: &str) -> Self {
        Self {
            value,
            priority,
            include: insensitive(include),
            exclude: None,
        }
    }

    /// Reject the match when `pattern` also matches
    fn unless(mut self, pattern: &str) -> Self {
        self.exclude = Some(insensitive(pattern));
        self
    }

    pub fn matches(&self, text: &str) -> bool {
        self.include.is_match(text)
            && !self
                .exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(text))
    }
}

fn insensitive(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).unwrap()
}

pub fn first_match<'a, T>(rules: &'a [VocabRule<T>], text: &str) -> Option<&'a T> {
    rules
        .iter()
        .find(|rule| rule.matches(text))
        .map(|rule| &rule.value)
}

pub fn best_match<'a, T>(rules: &'a [VocabRule<T>], text: &str) -> Option<&'a T> {
    let mut best: Option<&VocabRule<T>> = None;
    for rule in rules.iter().filter(|rule| rule.matches(text)) {
        if best.is_none_or(|current| rule.priority > current.priority) {
            best = Some(rule);
        }
    }
    best.map(|rule| &rule.value)
}

/// Every rule in `rules` that matches, in table order
pub fn all_matches<'a, T>(rules: &'a [VocabRule<T>], text: &str) -> Vec<&'a T> {
    rules
        .iter()
        .filter(|rule| rule.matches(text))
        .map(|rule| &rule.value)
        .collect()
}

pub static VIDEO_CODECS: Lazy<Vec<VocabRule<&'static str>>> = Lazy::new(|| {
    vec![
        VocabRule::new("HEVC", 12, r"\bhevc\b"),
        VocabRule::new("H.265", 11, r"\bx265\b|\bh[\s.]?265\b"),
        VocabRule::new("AVC", 10, r"\bavc\b"),
        VocabRule::new("x264", 9, r"\bx264\b"),
        VocabRule::new("H.264", 8, r"\bh[\s.]?264\b"),
        VocabRule::new("AV1", 7, r"\b(?:av1|av-1|aom-av1)\b"),
        VocabRule::new("VP9", 6, r"\bvp9\b"),
        VocabRule::new("XviD", 5, r"\bxvid\b"),
        VocabRule::new("DivX", 4, r"\bdivx\b"),
        VocabRule::new("VC-1", 3, r"\bvc-?1\b"),
        VocabRule::new("MPEG-2", 2, r"\bmpeg-?2\b"),
        VocabRule::new("MPEG-4", 1, r"\bmpeg-?4\b"),
    ]
});

pub static AUDIO_CODECS: Lazy<Vec<VocabRule<&'static str>>> = Lazy::new(|| {
    vec![
        VocabRule::new("TrueHD", 10, r"\btrue[\s.-]?hd\b"),
        VocabRule::new("DTS-HD MA", 9, r"\bdts[\s.-]?hd\b"),
        VocabRule::new("DTS:X", 8, r"\bdts[\s.:-]?x\b"),
        VocabRule::new("DTS", 7, r"\bdts\b"),
        VocabRule::new("DD+", 6, r"\bddp|\bdd\+|\be-?ac-?3\b|\bdolby[\s.]?digital[\s.]?plus\b"),
        VocabRule::new("DD", 5, r"\bdd(?:\b|[257])|\bac-?3\b|\bdolby[\s.]?digital\b"),
        VocabRule::new("AAC", 4, r"\baac(?:\b|\d)"),
        VocabRule::new("Opus", 3, r"\bopus\b"),
        VocabRule::new("FLAC", 2, r"\bflac\b"),
        VocabRule::new("MP3", 1, r"\bmp3\b"),
    ]
});

pub static HDR_FORMATS: Lazy<Vec<VocabRule<&'static str>>> = Lazy::new(|| {
    vec![
        VocabRule::new(DOLBY_VISION, 4, r"\b(?:dolby[\s.]?vision|dv|dovi)\b"),
        VocabRule::new(HDR10_PLUS, 3, r"\bhdr10(?:\+|plus)|\bhdr\+10\b"),
        VocabRule::new(HDR10, 2, r"\bhdr10\b").unless(r"\bhdr10(?:\+|plus)"),
        VocabRule::new("HDR", 1, r"\bhdr\b"),
        VocabRule::new("HLG", 1, r"\bhlg\b"),
    ]
});

pub const DOLBY_VISION: &str = "Dolby Vision";
pub const HDR10_PLUS: &str = "HDR10+";
pub const HDR10: &str = "HDR10";

/// Ordered so that Remux beats BluRay on equal priority
pub static SOURCE_TYPES: Lazy<Vec<VocabRule<SourceType>>> = Lazy::new(|| {
    vec![
        VocabRule::new(
            SourceType::UhdBluRay,
            5,
            r"\b(?:uhd[\s.-]*blu[\s.-]*ray|complete[\s.-]*uhd|ultrahd[\s.-]*blu[\s.-]*ray)\b",
        ),
        VocabRule::new(SourceType::Remux, 4, r"\bremux\b"),
        VocabRule::new(SourceType::BluRay, 4, r"\b(?:blu[\s.-]*ray|bd50|bd25|bdiso)\b")
            .unless(r"\bblu[\s.-]*ray[\s.-]*rip\b"),
        VocabRule::new(
            SourceType::BdRip,
            3,
            r"\b(?:bdrip|brrip|blu[\s.-]*ray[\s.-]*rip)\b",
        ),
        VocabRule::new(
            SourceType::WebDl,
            2,
            r"\b(?:web[\s.-]*dl|webdownload|web[\s.-]*download|dlmux)\b",
        ),
        VocabRule::new(
            SourceType::WebRip,
            2,
            r"\bweb[\s.-]*rip\b|\b(?:netflix|amzn|amazon|hulu|disney|itunes|appletv)[\s.-]*rip\b",
        ),
        VocabRule::new(
            SourceType::Hdtv,
            1,
            r"\b(?:hdtv|pdtv|dsr|dtv|hdtvrip|tvrip|dvbrip)\b",
        ),
        VocabRule::new(SourceType::DvdRip, 1, r"\bdvd[\s.-]*rip\b"),
        VocabRule::new(SourceType::Dvd, 1, r"\b(?:dvd[\s.-]*r|dvd9|dvd5|dvdiso)\b"),
        VocabRule::new(SourceType::Vhs, 0, r"\b(?:vhs|vhsrip)\b"),
        VocabRule::new(
            SourceType::Telesync,
            0,
            r"\b(?:ts|telesync|hdts|dvdscr|dvdscreener|screener|scr)\b",
        ),
        VocabRule::new(SourceType::Cam, 0, r"\b(?:cam|camrip|hdcam)\b"),
    ]
});

/// A streaming service named on its own implies a web download
pub static STREAMING_SERVICE: Lazy<Regex> = Lazy::new(|| {
    insensitive(r"\b(?:netflix|nf|amzn|amazon|hulu|disney\+?|dsnp|hmax|itunes|appletv|atvp)\b")
});

/// Explicit tags first, loose aliases after them
pub static RESOLUTIONS: Lazy<Vec<VocabRule<Resolution>>> = Lazy::new(|| {
    vec![
        VocabRule::new(Resolution::P2160, 5, r"\b(?:2160p|4k|uhd)\b"),
        VocabRule::new(Resolution::P1440, 4, r"\b1440p\b"),
        VocabRule::new(Resolution::P1080, 3, r"\b(?:1080p|1080i|fhd)\b"),
        VocabRule::new(Resolution::P720, 2, r"\b720p\b"),
        VocabRule::new(Resolution::P480, 1, r"\b(?:480p|576p)\b"),
        VocabRule::new(Resolution::P720, 0, r"\bhd\b").unless(r"\bdts[\s.-]?hd\b"),
        VocabRule::new(Resolution::P480, 0, r"\bsd\b"),
    ]
});

pub const MULTIPLE_LANGUAGES: &str = "multiple";
pub const DEFAULT_LANGUAGE: &str = "english";

pub static MULTI_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    insensitive(
        r"\b(?:multi(?:ple)?|multi[._ -]?(?:lang|language|sub|audio)s?|dual[._ -]?(?:lang|language|audio)?|2audio)\b",
    )
});

/// Two-letter codes that are also common words ("it", "he", "id", "de", "vi") are left out
pub static LANGUAGES: Lazy<Vec<VocabRule<&'static str>>> = Lazy::new(|| {
    [
        ("english", r"\b(?:english|eng|en)\b"),
        ("spanish", r"\b(?:spanish|spa|esp|es|castellano|catalan)\b"),
        ("french", r"\b(?:french|fra|francais|fre|fr|truefrench)\b"),
        ("german", r"\b(?:german|ger|deu|deutsch)\b"),
        ("italian", r"\b(?:italian|ita)\b"),
        ("russian", r"\b(?:russian|rus|ru)\b"),
        ("japanese", r"\b(?:japanese|jpn|jap|jp)\b"),
        ("korean", r"\b(?:korean|kor|kr)\b"),
        ("chinese", r"\b(?:chinese|chi|zh|cn|cmn|mandarin)\b"),
        ("portuguese", r"\b(?:portuguese|por|portugues|pt)\b"),
        ("brazilian", r"\b(?:brazilian|brazil|portugues[ -]?brasil|pt-br)\b"),
        ("arabic", r"\b(?:arabic|ara)\b"),
        ("hindi", r"\b(?:hindi|hin)\b"),
        ("tamil", r"\b(?:tamil|tam)\b"),
        ("telugu", r"\b(?:telugu|tel)\b"),
        ("malayalam", r"\b(?:malayalam|mal)\b"),
        ("czech", r"\b(?:czech|cze|cs)\b"),
        ("slovak", r"\b(?:slovak|slo|sk)\b"),
        ("polish", r"\b(?:polish|pol|pl)\b"),
        ("dutch", r"\b(?:dutch|nld|nl|nederlands)\b"),
        ("hungarian", r"\b(?:hungarian|hun|hu|magyar)\b"),
        ("turkish", r"\b(?:turkish|tur|tr)\b"),
        ("thai", r"\bthai\b"),
        ("vietnamese", r"\bvietnamese\b"),
        ("indonesian", r"\b(?:indonesian|ind)\b"),
        ("hebrew", r"\b(?:hebrew|heb)\b"),
        ("nordic", r"\b(?:nordic|scandinavian)\b"),
        ("other", r"\b(?:other|various)[\s.-]?(?:languages?|audio)\b"),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (language, pattern))| VocabRule::new(language, (100 - index) as u8, pattern))
    .collect()
});

pub static SUBTITLE_MARKER: Lazy<Regex> =
    Lazy::new(|| insensitive(r"\b(?:sub(?:title)?s?|srt|sdh|multi-?subs?)\b"));

pub static SUBTITLE_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    insensitive(
        r"\bsubs?(?:\.|:|\s)+(en|eng|english|es|spa|spanish|fr|french|de|german|it|italian|ru|russian|jp|jpn|japanese|ko|kor|korean|zh|chi|chinese|pt|por|portuguese|ar|ara|arabic|hi|hin|hindi)\b",
    )
});

pub static SUBTITLE_FILE: Lazy<Regex> = Lazy::new(|| insensitive(r"\.srt$"));

/// Channel layouts a codec family distinguishes, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Atmos71,
    Atmos51,
    Atmos,
    Ch71,
    Ch51,
    Ch20,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelFlags {
    pub atmos: bool,
    pub ch71: bool,
    pub ch51: bool,
    pub ch20: bool,
}

impl ChannelFlags {
    pub fn satisfies(&self, layout: Layout) -> bool {
        match layout {
            Layout::Atmos71 => self.atmos && self.ch71,
            Layout::Atmos51 => self.atmos && self.ch51,
            Layout::Atmos => self.atmos,
            Layout::Ch71 => self.ch71,
            Layout::Ch51 => self.ch51,
            Layout::Ch20 => self.ch20,
        }
    }
}

/// Audio family whose label changes with the channel layout
pub struct ChannelFamily {
    detect: Option<Regex>,
    variants: &'static [(Layout, &'static str)],
    plain: Option<&'static str>,
}

impl ChannelFamily {
    fn new(
        detect: Option<&str>,
        variants: &'static [(Layout, &'static str)],
        plain: Option<&'static str>,
    ) -> Self {
        Self {
            detect: detect.map(insensitive),
            variants,
            plain,
        }
    }

    /// `None` when the family is absent, otherwise the most specific label
    pub fn label(&self, text: &str, flags: &ChannelFlags) -> Option<&'static str> {
        if let Some(detect) = &self.detect {
            if !detect.is_match(text) {
                return None;
            }
        }

        self.variants
            .iter()
            .find(|(layout, _)| flags.satisfies(*layout))
            .map(|(_, label)| *label)
            .or(self.plain)
    }
}

pub static ATMOS: Lazy<Regex> = Lazy::new(|| insensitive(r"\batmos\b"));
pub static CHANNELS_71: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^0-9])7\.1(?:[^0-9]|$)").unwrap());
pub static CHANNELS_51: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^0-9])5\.1(?:[^0-9]|$)").unwrap());
pub static CHANNELS_20: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^0-9])2\.0(?:[^0-9]|$)").unwrap());
/// "5 1" and similar are written with a dot before the channel checks run
pub static SPACED_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s+(\d)").unwrap());

pub static CHANNEL_FAMILIES: Lazy<Vec<ChannelFamily>> = Lazy::new(|| {
    use Layout::*;
    vec![
        ChannelFamily::new(
            Some(r"\btrue[\s.]?hd\b"),
            &[
                (Atmos71, "TrueHD 7.1 Atmos"),
                (Atmos51, "TrueHD 5.1 Atmos"),
                (Atmos, "TrueHD Atmos"),
                (Ch71, "TrueHD 7.1"),
                (Ch51, "TrueHD 5.1"),
            ],
            Some("TrueHD"),
        ),
        ChannelFamily::new(
            Some(r"\bddp|\bdd\+|\be-?ac-?3\b|\bdolby\s*digital\s*plus\b"),
            &[
                (Atmos71, "DDP7.1 Atmos"),
                (Atmos51, "DDP5.1 Atmos"),
                (Ch71, "DDP7.1"),
                (Ch51, "DDP5.1"),
                (Ch20, "DDP2.0"),
                (Atmos, "DDP Atmos"),
            ],
            Some("DDP"),
        ),
        ChannelFamily::new(
            Some(r"\bdd(?:\b|[257])|\bac-?3\b|\bdolby\s*digital\b"),
            &[(Ch71, "DD7.1"), (Ch51, "DD5.1"), (Ch20, "DD2.0")],
            Some("DD"),
        ),
        ChannelFamily::new(
            Some(r"\bdts-?hd\b"),
            &[(Ch71, "DTS-HD MA 7.1"), (Ch51, "DTS-HD MA 5.1")],
            Some("DTS-HD MA"),
        ),
        ChannelFamily::new(
            Some(r"\bdts[:-]?x\b"),
            &[(Ch71, "DTS:X 7.1"), (Ch51, "DTS:X 5.1")],
            Some("DTS:X"),
        ),
        ChannelFamily::new(
            Some(r"\bdts\b"),
            &[(Ch71, "DTS 7.1"), (Ch51, "DTS 5.1")],
            Some("DTS"),
        ),
        ChannelFamily::new(
            Some(r"\baac(?:\b|\d)"),
            &[(Ch71, "AAC 7.1"), (Ch51, "AAC 5.1"), (Ch20, "AAC 2.0")],
            Some("AAC"),
        ),
        ChannelFamily::new(
            Some(r"\bopus\b"),
            &[(Ch71, "7.1 Opus"), (Ch51, "5.1 Opus"), (Ch20, "2.0 Opus")],
            Some("Opus"),
        ),
        ChannelFamily::new(
            Some(r"\bflac\b"),
            &[(Ch71, "FLAC 7.1"), (Ch51, "FLAC 5.1"), (Ch20, "FLAC 2.0")],
            Some("FLAC"),
        ),
        ChannelFamily::new(
            Some(r"\batmos\b"),
            &[(Ch71, "7.1 Atmos"), (Ch51, "5.1 Atmos")],
            Some("Atmos"),
        ),
        ChannelFamily::new(None, &[(Ch71, "7.1"), (Ch51, "5.1"), (Ch20, "2.0")], None),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_match_prefers_priority_then_order() {
        assert_eq!(
            best_match(&SOURCE_TYPES, "Movie.2160p.UHD.BluRay.x265"),
            Some(&SourceType::UhdBluRay)
        );
        assert_eq!(
            best_match(&SOURCE_TYPES, "Movie.1080p.BluRay.REMUX.AVC"),
            Some(&SourceType::Remux)
        );
        assert_eq!(
            best_match(&SOURCE_TYPES, "Movie.1080p.BluRay.Rip.x264"),
            Some(&SourceType::BdRip)
        );
    }

    #[test]
    fn test_exclusion_blocks_rule() {
        assert_eq!(best_match(&HDR_FORMATS, "Movie.HDR10+.2160p"), Some(&HDR10_PLUS));
        let matched = all_matches(&HDR_FORMATS, "Movie.HDR10+.2160p");
        assert!(!matched.contains(&&HDR10));
    }

    #[test]
    fn test_video_codec_order() {
        assert_eq!(first_match(&VIDEO_CODECS, "x265 HEVC"), Some(&"HEVC"));
        assert_eq!(first_match(&VIDEO_CODECS, "Movie.H.264-GRP"), Some(&"H.264"));
        assert_eq!(first_match(&VIDEO_CODECS, "Movie.XviD"), Some(&"XviD"));
        assert_eq!(first_match(&VIDEO_CODECS, "nothing here"), None);
    }

    #[test]
    fn test_resolution_alias_ignores_dts_hd() {
        assert_eq!(first_match(&RESOLUTIONS, "Movie DTS-HD MA"), None);
        assert_eq!(first_match(&RESOLUTIONS, "Movie HD"), Some(&Resolution::P720));
        assert_eq!(first_match(&RESOLUTIONS, "Movie 1080p DTS-HD"), Some(&Resolution::P1080));
    }

    #[test]
    fn test_channel_family_labels() {
        let flags = ChannelFlags {
            atmos: true,
            ch71: true,
            ..ChannelFlags::default()
        };
        let truehd = &CHANNEL_FAMILIES[0];
        assert_eq!(truehd.label("truehd 7.1 atmos", &flags), Some("TrueHD 7.1 Atmos"));
        assert_eq!(truehd.label("aac", &flags), None);

        let bare = CHANNEL_FAMILIES.last().unwrap();
        assert_eq!(bare.label("anything", &ChannelFlags::default()), None);
    }

    #[test]
    fn test_language_rules_skip_common_words() {
        assert!(all_matches(&LANGUAGES, "Catch.Me.If.You.Can.It.Is.He").is_empty());
        assert_eq!(all_matches(&LANGUAGES, "Movie.2019.FRENCH.1080p"), vec![&"french"]);
    }
}
