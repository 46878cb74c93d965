//! TMDB-backed metadata provider.

use super::{CastMember, Category, MediaKind, MetadataProvider, Title, TitleDetails};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
/// How long a certification lookup stays cached, failed lookups included.
pub const CERTIFICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Keyword id TMDB uses for anime.
const ANIME_KEYWORD: &str = "210024";
const ANIMATION_GENRE: &str = "16";

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<Title>,
}

#[derive(Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastMember>,
}

#[derive(Deserialize)]
struct Regional<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Deserialize)]
struct ReleaseDates {
    iso_3166_1: String,
    #[serde(default)]
    release_dates: Vec<ReleaseDate>,
}

#[derive(Deserialize)]
struct ReleaseDate {
    #[serde(default)]
    certification: String,
}

#[derive(Deserialize)]
struct ContentRating {
    iso_3166_1: String,
    #[serde(default)]
    rating: String,
}

/// Client for the TMDB v3 API.
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
    certifications: Mutex<HashMap<(MediaKind, u64), (String, Instant)>>,
}

impl TmdbClient {
    /// Create a client reading the API key from `TMDB_API_KEY`.
    pub fn new() -> Result<Self> {
        let key = std::env::var("TMDB_API_KEY")?;
        Ok(Self::with_base_url(key, TMDB_BASE_URL))
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            certifications: Mutex::new(HashMap::new()),
        }
    }

    /// GET `endpoint` with the API key and `params`, decoding the JSON body.
    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Result<T> {
        trace!("tmdb GET {endpoint} {params:?}");
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Fetch a page of titles. Failures become an empty list.
    /// `kind` fills `media_type` on endpoints that only return one kind.
    async fn list(&self, endpoint: &str, params: &[(&str, String)], kind: Option<MediaKind>) -> Vec<Title> {
        match self.get::<Page>(endpoint, params).await {
            Ok(page) => page
                .results
                .into_iter()
                .map(|mut t| {
                    if t.media_type.is_none() {
                        t.media_type = kind.map(|k| k.as_str().to_string());
                    }
                    t
                })
                .collect(),
            Err(err) => {
                warn!("tmdb {endpoint} failed: {err:#}");
                Vec::new()
            }
        }
    }

    fn cached_certification(&self, key: (MediaKind, u64)) -> Option<String> {
        let cache = self.certifications.lock().ok()?;
        cache
            .get(&key)
            .filter(|(_, at)| at.elapsed() < CERTIFICATION_TTL)
            .map(|(cert, _)| cert.clone())
    }

    fn store_certification(&self, key: (MediaKind, u64), cert: &str) {
        if let Ok(mut cache) = self.certifications.lock() {
            cache.insert(key, (cert.to_string(), Instant::now()));
        }
    }

    async fn fetch_certification(&self, kind: MediaKind, id: u64) -> Result<String> {
        let cert = match kind {
            MediaKind::Movie => {
                let data: Regional<ReleaseDates> =
                    self.get(&format!("/movie/{id}/release_dates"), &[]).await?;
                data.results
                    .into_iter()
                    .find(|r| r.iso_3166_1 == "US")
                    .and_then(|r| r.release_dates.into_iter().next())
                    .map(|d| d.certification)
            }
            MediaKind::Tv => {
                let data: Regional<ContentRating> =
                    self.get(&format!("/tv/{id}/content_ratings"), &[]).await?;
                data.results
                    .into_iter()
                    .find(|r| r.iso_3166_1 == "US")
                    .map(|r| r.rating)
            }
        };
        Ok(cert.unwrap_or_default())
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn browse(&self, category: Category, page: u32) -> Vec<Title> {
        let page = ("page", page.to_string());
        match category {
            Category::Trending => self.list("/trending/all/week", &[page], None).await,
            Category::Latest => self.list("/trending/all/day", &[page], None).await,
            Category::PopularMovies => {
                self.list("/movie/popular", &[page], Some(MediaKind::Movie)).await
            }
            Category::PopularTv => self.list("/tv/popular", &[page], Some(MediaKind::Tv)).await,
            Category::Anime => {
                let params = [
                    ("with_genres", ANIMATION_GENRE.to_string()),
                    ("with_keywords", ANIME_KEYWORD.to_string()),
                    page,
                ];
                self.list("/discover/tv", &params, Some(MediaKind::Tv)).await
            }
        }
    }

    /// Multi search over movies and shows; people are dropped.
    async fn search(&self, query: &str) -> Vec<Title> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        self.list("/search/multi", &[("query", query.to_string())], None)
            .await
            .into_iter()
            .filter(|t| t.media_type.as_deref() != Some("person"))
            .collect()
    }

    async fn details(&self, kind: MediaKind, id: u64) -> Result<TitleDetails> {
        self.get(&format!("/{kind}/{id}"), &[]).await
    }

    async fn credits(&self, kind: MediaKind, id: u64) -> Result<Vec<CastMember>> {
        let credits: Credits = self.get(&format!("/{kind}/{id}/credits"), &[]).await?;
        Ok(credits.cast)
    }

    async fn similar(&self, kind: MediaKind, id: u64) -> Vec<Title> {
        self.list(&format!("/{kind}/{id}/similar"), &[], Some(kind)).await
    }

    async fn certification(&self, kind: MediaKind, id: u64) -> String {
        let key = (kind, id);
        if let Some(cert) = self.cached_certification(key) {
            return cert;
        }
        let cert = match self.fetch_certification(kind, id).await {
            Ok(cert) => cert,
            Err(err) => {
                warn!("certification lookup for {kind} {id} failed: {err:#}");
                String::new()
            }
        };
        debug!("certification {kind} {id} = {cert:?}");
        self.store_certification(key, &cert);
        cert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{annotate_certifications, filter_adult};
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn browses_popular_movies_and_tags_kind() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/movie/popular")
                    .query_param("api_key", "k")
                    .query_param("page", "2");
                then.status(200).json_body(json!({
                    "page": 2,
                    "results": [{"id": 1, "title": "Heat", "adult": false}]
                }));
            })
            .await;
        let client = TmdbClient::with_base_url("k", server.base_url());
        let titles = client.browse(Category::PopularMovies, 2).await;
        mock.assert_async().await;
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].display_title(), "Heat");
        assert_eq!(titles[0].kind(), Some(MediaKind::Movie));
    }

    #[tokio::test]
    async fn failed_list_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/trending/all/week");
                then.status(500);
            })
            .await;
        let client = TmdbClient::with_base_url("k", server.base_url());
        assert!(client.browse(Category::Trending, 1).await.is_empty());
    }

    #[tokio::test]
    async fn search_drops_people() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search/multi").query_param("query", "alien");
                then.status(200).json_body(json!({"results": [
                    {"id": 1, "title": "Alien", "media_type": "movie"},
                    {"id": 2, "name": "Sigourney Weaver", "media_type": "person"},
                    {"id": 3, "name": "Alien Nation", "media_type": "tv"}
                ]}));
            })
            .await;
        let client = TmdbClient::with_base_url("k", server.base_url());
        let ids: Vec<u64> = client.search("alien").await.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(client.search("   ").await.is_empty());
    }

    #[tokio::test]
    async fn reads_details_and_credits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tv/42");
                then.status(200).json_body(json!({
                    "id": 42,
                    "name": "Show",
                    "episode_run_time": [44],
                    "genres": [{"id": 18, "name": "Drama"}],
                    "seasons": [
                        {"season_number": 0, "episode_count": 3, "name": "Specials"},
                        {"season_number": 1, "episode_count": 10, "name": "Season 1"}
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tv/42/credits");
                then.status(200).json_body(json!({"cast": [
                    {"id": 5, "name": "Lead", "character": "Hero", "order": 0}
                ]}));
            })
            .await;
        let client = TmdbClient::with_base_url("k", server.base_url());
        let details = client.details(MediaKind::Tv, 42).await.unwrap();
        assert_eq!(details.display_title(), "Show");
        assert_eq!(details.runtime_minutes(), Some(44));
        assert_eq!(details.regular_seasons().count(), 1);
        let cast = client.credits(MediaKind::Tv, 42).await.unwrap();
        assert_eq!(cast[0].character.as_deref(), Some("Hero"));
    }

    #[tokio::test]
    async fn caches_us_certification() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/movie/9/release_dates");
                then.status(200).json_body(json!({"results": [
                    {"iso_3166_1": "DE", "release_dates": [{"certification": "16"}]},
                    {"iso_3166_1": "US", "release_dates": [{"certification": "R"}]}
                ]}));
            })
            .await;
        let client = TmdbClient::with_base_url("k", server.base_url());
        assert_eq!(client.certification(MediaKind::Movie, 9).await, "R");
        assert_eq!(client.certification(MediaKind::Movie, 9).await, "R");
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn missing_rating_results_mean_no_certification() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/movie/7/release_dates");
                then.status(200).json_body(json!({"id": 7}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tv/7/content_ratings");
                then.status(200).json_body(json!({"id": 7}));
            })
            .await;
        let client = TmdbClient::with_base_url("k", server.base_url());
        assert_eq!(client.certification(MediaKind::Movie, 7).await, "");
        assert_eq!(client.certification(MediaKind::Tv, 7).await, "");
    }

    #[tokio::test]
    async fn annotated_titles_feed_the_adult_filter() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tv/1/content_ratings");
                then.status(200)
                    .json_body(json!({"results": [{"iso_3166_1": "US", "rating": "TV-MA"}]}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tv/2/content_ratings");
                then.status(404);
            })
            .await;
        let client = TmdbClient::with_base_url("k", server.base_url());
        let mut titles: Vec<Title> = serde_json::from_value(json!([
            {"id": 1, "name": "Grim"},
            {"id": 2, "name": "Gentle"}
        ]))
        .unwrap();
        annotate_certifications(&client, &mut titles, MediaKind::Tv).await;
        assert_eq!(titles[0].certification.as_deref(), Some("TV-MA"));
        assert_eq!(titles[1].certification, None);
        let kept = filter_adult(titles, true);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }
}
