//! Typed view of the metadata catalog.
//! Only the fields the player and listings actually read are modelled.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

pub mod tmdb;

/// Base URL for poster and backdrop images.
pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
/// Shown when a title has no artwork.
pub const PLACEHOLDER_POSTER: &str = "/abstract-movie-poster.png";

/// Ratings treated as adult content by the safe-browsing filter.
const ADULT_RATINGS: [&str; 7] = ["R", "NC-17", "X", "TV-MA", "TV-18", "18", "18+"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
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

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            other => Err(anyhow!("unknown media kind {other:?}")),
        }
    }
}

/// Rows shown on the discovery pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Trending this week across movies and TV.
    Trending,
    /// Trending today.
    Latest,
    PopularMovies,
    PopularTv,
    /// Japanese animation series.
    Anime,
}

/// Poster or backdrop width requested from the image CDN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    #[default]
    W500,
    W780,
    Original,
}

impl ImageSize {
    fn as_str(self) -> &'static str {
        match self {
            ImageSize::W500 => "w500",
            ImageSize::W780 => "w780",
            ImageSize::Original => "original",
        }
    }
}

/// A movie or show as returned by list and search endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub id: u64,
    /// Movie title.
    #[serde(default)]
    pub title: Option<String>,
    /// Show name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    /// `movie`, `tv` or `person` on mixed endpoints; absent on typed ones.
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    /// Filled in locally from the certification lookup.
    #[serde(default)]
    pub certification: Option<String>,
}

impl Title {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("Untitled")
    }

    pub fn kind(&self) -> Option<MediaKind> {
        self.media_type.as_deref().and_then(|k| k.parse().ok())
    }

    /// Release year taken from whichever date field is present.
    pub fn year(&self) -> Option<u16> {
        self.release_date
            .as_deref()
            .or(self.first_air_date.as_deref())
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub season_number: u32,
    #[serde(default)]
    pub episode_count: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

/// Full record for the watch page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleDetails {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub tagline: Option<String>,
    /// Movie runtime in minutes.
    #[serde(default)]
    pub runtime: Option<u32>,
    /// Typical episode lengths in minutes.
    #[serde(default)]
    pub episode_run_time: Vec<u32>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
}

impl TitleDetails {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("Untitled")
    }

    /// Runtime in minutes, falling back to the first episode length for shows.
    pub fn runtime_minutes(&self) -> Option<u32> {
        self.runtime
            .filter(|m| *m > 0)
            .or_else(|| self.episode_run_time.first().copied())
    }

    /// Seasons that carry episodes, skipping the "Specials" season 0.
    pub fn regular_seasons(&self) -> impl Iterator<Item = &Season> {
        self.seasons.iter().filter(|s| s.season_number > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
    #[serde(default)]
    pub order: Option<u32>,
}

/// Source of titles, artwork, cast and ratings.
/// List lookups degrade to an empty list on failure; the UI shows an empty row.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn browse(&self, category: Category, page: u32) -> Vec<Title>;

    async fn search(&self, query: &str) -> Vec<Title>;

    async fn details(&self, kind: MediaKind, id: u64) -> Result<TitleDetails>;

    async fn credits(&self, kind: MediaKind, id: u64) -> Result<Vec<CastMember>>;

    async fn similar(&self, kind: MediaKind, id: u64) -> Vec<Title>;

    /// US certification or content rating; empty when unknown.
    async fn certification(&self, kind: MediaKind, id: u64) -> String;
}

/// Build a CDN URL for an artwork path, or the placeholder when there is none.
pub fn image_url(path: Option<&str>, size: ImageSize) -> String {
    match path {
        Some(p) if !p.is_empty() => format!("{IMAGE_BASE}/{}{p}", size.as_str()),
        _ => PLACEHOLDER_POSTER.to_string(),
    }
}

/// Whether a title should be hidden by the adult-content filter.
pub fn is_adult(title: &Title, certification: Option<&str>) -> bool {
    if title.adult {
        return true;
    }
    match certification {
        Some(cert) if !cert.is_empty() => {
            let cert = cert.to_ascii_uppercase();
            ADULT_RATINGS.contains(&cert.as_str())
        }
        _ => false,
    }
}

/// Drop adult titles when the filter is enabled.
pub fn filter_adult(titles: Vec<Title>, enabled: bool) -> Vec<Title> {
    if !enabled {
        return titles;
    }
    titles
        .into_iter()
        .filter(|t| !is_adult(t, t.certification.as_deref()))
        .collect()
}

/// Look up certifications for every title concurrently and store them on the titles.
/// Titles whose kind is unknown are treated as `fallback`.
pub async fn annotate_certifications<P: MetadataProvider + ?Sized>(
    provider: &P,
    titles: &mut [Title],
    fallback: MediaKind,
) {
    trace!("annotate_certifications: {} titles", titles.len());
    let lookups = titles
        .iter()
        .map(|t| provider.certification(t.kind().unwrap_or(fallback), t.id));
    let certs = join_all(lookups).await;
    for (title, cert) in titles.iter_mut().zip(certs) {
        title.certification = (!cert.is_empty()).then_some(cert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(id: u64, adult: bool, cert: Option<&str>) -> Title {
        Title {
            id,
            title: Some(format!("t{id}")),
            name: None,
            poster_path: None,
            backdrop_path: None,
            overview: String::new(),
            vote_average: 0.0,
            release_date: Some("1999-03-31".into()),
            first_air_date: None,
            media_type: Some("movie".into()),
            adult,
            genre_ids: vec![],
            certification: cert.map(str::to_string),
        }
    }

    #[test]
    fn builds_image_urls() {
        assert_eq!(
            image_url(Some("/abc.jpg"), ImageSize::W780),
            "https://image.tmdb.org/t/p/w780/abc.jpg"
        );
        assert_eq!(image_url(None, ImageSize::default()), PLACEHOLDER_POSTER);
    }

    #[test]
    fn adult_filter_uses_flag_and_rating() {
        let titles = vec![
            title(1, false, None),
            title(2, true, None),
            title(3, false, Some("tv-ma")),
            title(4, false, Some("PG-13")),
        ];
        let kept: Vec<u64> = filter_adult(titles.clone(), true).iter().map(|t| t.id).collect();
        assert_eq!(kept, vec![1, 4]);
        assert_eq!(filter_adult(titles, false).len(), 4);
    }

    #[test]
    fn reads_title_fields() {
        let t: Title = serde_json::from_str(
            r#"{"id": 7, "name": "Show", "first_air_date": "2008-01-20", "media_type": "tv"}"#,
        )
        .unwrap();
        assert_eq!(t.display_title(), "Show");
        assert_eq!(t.kind(), Some(MediaKind::Tv));
        assert_eq!(t.year(), Some(2008));
        assert_eq!(title(1, false, None).year(), Some(1999));
    }
}
