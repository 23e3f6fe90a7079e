//! Tag filtering and keyword classification.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::video::TouhouStatus;

/// Keywords whose presence (as a substring of any tag) marks a video as
/// Touhou-related.
pub const TOUHOU_KEYWORDS: &[&str] = &[
    "东方Project",
    "东方project",
    "东方PROJECT",
    "東方Project",
    "東方project",
    "東方PROJECT",
    "Touhou",
    "東方",
    "车万",
    "ZUN",
    "Zun",
    "zun",
];

// Tags of the form `$发现《...》^` are injected by the platform's music
// discovery feature and never describe the video itself.
static DISCOVERY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$发现《.+?》\^$").unwrap());

/// Drops discovery-marker tags, preserving the order of the rest.
pub fn filter_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .filter(|tag| !DISCOVERY_TAG.is_match(tag))
        .collect()
}

/// Classifies a video by keyword containment over its (already filtered)
/// tag list.
pub fn classify_tags(tags: &[String]) -> TouhouStatus {
    let matched = tags
        .iter()
        .any(|tag| TOUHOU_KEYWORDS.iter().any(|kw| tag.contains(kw)));
    if matched {
        TouhouStatus::AutoMatch
    } else {
        TouhouStatus::AutoNoMatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keyword_substring_matches() {
        assert_eq!(
            classify_tags(&tags(&["音乐", "Touhou Project"])),
            TouhouStatus::AutoMatch
        );
        assert_eq!(
            classify_tags(&tags(&["東方紅魔郷"])),
            TouhouStatus::AutoMatch
        );
        assert_eq!(
            classify_tags(&tags(&["音乐", "VOCALOID"])),
            TouhouStatus::AutoNoMatch
        );
        assert_eq!(classify_tags(&[]), TouhouStatus::AutoNoMatch);
    }

    #[test]
    fn discovery_markers_are_dropped() {
        let filtered = filter_tags(tags(&[
            "东方",
            "$发现《Bad Apple!!》^",
            "音乐",
            "$发现《ナイト・オブ・ナイツ》^",
        ]));
        assert_eq!(filtered, tags(&["东方", "音乐"]));
    }

    #[test]
    fn marker_pattern_is_anchored() {
        // Partial or prefixed forms are real tags and must survive.
        let kept = tags(&["发现《x》", "$发现《x》", "abc$发现《x》^"]);
        assert_eq!(filter_tags(kept.clone()), kept);
    }
}
