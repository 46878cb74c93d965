//! Subtitle catalog lookups and downloads.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::metadata::MediaKind;

pub mod subdl;

/// Language codes requested from the catalog, with their display names.
pub const LANGUAGES: [(&str, &str); 19] = [
    ("EN", "English"),
    ("ES", "Spanish"),
    ("FR", "French"),
    ("DE", "German"),
    ("IT", "Italian"),
    ("PT", "Portuguese"),
    ("AR", "Arabic"),
    ("ZH", "Chinese"),
    ("JA", "Japanese"),
    ("KO", "Korean"),
    ("RU", "Russian"),
    ("HI", "Hindi"),
    ("TR", "Turkish"),
    ("NL", "Dutch"),
    ("PL", "Polish"),
    ("SV", "Swedish"),
    ("DA", "Danish"),
    ("NO", "Norwegian"),
    ("FI", "Finnish"),
];

/// Downloads subtitle text for a catalog entry.
#[async_trait]
pub trait SubtitleFetcher: Send + Sync + Clone + 'static {
    /// Return the raw SRT text behind `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// What to look subtitles up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtitleQuery {
    pub tmdb_id: u64,
    pub kind: MediaKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// One downloadable subtitle from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleListing {
    #[serde(rename = "sd_id", default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub release_name: String,
    #[serde(rename = "lang", default)]
    pub language: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Path relative to the download host.
    pub url: String,
    /// Hearing-impaired track.
    #[serde(default)]
    pub hi: bool,
}

impl SubtitleListing {
    pub fn language_name(&self) -> &str {
        language_name(&self.language)
    }
}

/// Display name for a catalog language code, or the code itself when unknown.
pub fn language_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Distinct language codes in first-seen order.
pub fn languages(listings: &[SubtitleListing]) -> Vec<&str> {
    let mut seen = Vec::new();
    for listing in listings {
        if !seen.contains(&listing.language.as_str()) {
            seen.push(listing.language.as_str());
        }
    }
    seen
}

/// Keep only listings in `language`; `None` keeps everything.
pub fn filter_language<'a>(
    listings: &'a [SubtitleListing],
    language: Option<&'a str>,
) -> impl Iterator<Item = &'a SubtitleListing> {
    listings
        .iter()
        .filter(move |l| language.map_or(true, |lang| l.language.eq_ignore_ascii_case(lang)))
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(de)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listings() -> Vec<SubtitleListing> {
        serde_json::from_str(
            r#"[
                {"sd_id": 11, "name": "a", "release_name": "WEB", "lang": "EN", "url": "/subtitle/11.zip"},
                {"sd_id": "12", "name": "b", "release_name": "WEB", "lang": "FR", "url": "/subtitle/12.zip", "hi": true},
                {"sd_id": 13, "name": "c", "release_name": "BluRay", "lang": "EN", "url": "/subtitle/13.zip"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn reads_numeric_and_text_ids() {
        let l = listings();
        assert_eq!(l[0].id, "11");
        assert_eq!(l[1].id, "12");
        assert!(l[1].hi);
    }

    #[test]
    fn groups_languages() {
        let l = listings();
        assert_eq!(languages(&l), vec!["EN", "FR"]);
        assert_eq!(filter_language(&l, Some("en")).count(), 2);
        assert_eq!(filter_language(&l, None).count(), 3);
        assert_eq!(l[1].language_name(), "French");
        assert_eq!(language_name("XX"), "XX");
    }
}
