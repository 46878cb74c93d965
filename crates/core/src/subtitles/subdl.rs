//! SubDL-backed subtitle catalog.
//! Downloads are often zip archives; the first `.srt` entry is returned.

use super::{SubtitleFetcher, SubtitleListing, SubtitleQuery, LANGUAGES};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::io::{Cursor, Read};
use tracing::{debug, info, trace};

pub const SUBDL_API_BASE: &str = "https://api.subdl.com";
pub const SUBDL_DOWNLOAD_BASE: &str = "https://dl.subdl.com";
/// Listings requested per search.
pub const SUBS_PER_PAGE: u32 = 30;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    subtitles: Vec<SubtitleListing>,
}

#[derive(Clone)]
pub struct SubdlClient {
    client: Client,
    api_key: String,
    api_base: String,
    download_base: String,
}

impl SubdlClient {
    /// Create a client reading the API key from `SUBDL_API_KEY`.
    pub fn new() -> Result<Self> {
        let key = std::env::var("SUBDL_API_KEY")?;
        Ok(Self::with_base_urls(key, SUBDL_API_BASE, SUBDL_DOWNLOAD_BASE))
    }

    pub fn with_base_urls(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        download_base: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            download_base: download_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// List subtitles for a title or episode. A response without results is an empty list.
    pub async fn search(&self, query: &SubtitleQuery) -> Result<Vec<SubtitleListing>> {
        trace!("search query={query:?}");
        let languages = LANGUAGES.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(",");
        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("tmdb_id", query.tmdb_id.to_string()),
            ("type", query.kind.to_string()),
            ("languages", languages),
            ("subs_per_page", SUBS_PER_PAGE.to_string()),
        ];
        if let Some(season) = query.season {
            params.push(("season_number", season.to_string()));
        }
        if let Some(episode) = query.episode {
            params.push(("episode_number", episode.to_string()));
        }
        let resp = self
            .client
            .get(format!("{}/api/v1/subtitles", self.api_base))
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await?;
        let data: SearchResponse = resp.error_for_status()?.json().await?;
        if !data.status {
            debug!("no subtitles found for {}", query.tmdb_id);
            return Ok(Vec::new());
        }
        info!("found {} subtitles for {}", data.subtitles.len(), query.tmdb_id);
        Ok(data.subtitles)
    }
}

#[async_trait]
impl SubtitleFetcher for SubdlClient {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(format!("{}{}", self.download_base, url))
            .send()
            .await?
            .error_for_status()?;
        let is_zip = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("zip"))
            .unwrap_or(false);
        let bytes = resp.bytes().await?;
        if is_zip || bytes.starts_with(b"PK\x03\x04") {
            extract_srt(&bytes)
        } else {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

/// Return the first `.srt` file inside a zip archive.
fn extract_srt(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if !file.name().to_ascii_lowercase().ends_with(".srt") {
            continue;
        }
        debug!("using {} from archive", file.name());
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        return Ok(String::from_utf8_lossy(&buf).into_owned());
    }
    Err(anyhow!("archive has no .srt file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MediaKind;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Write;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n";

    fn zipped(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn searches_episode_subtitles() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/subtitles")
                    .query_param("api_key", "key")
                    .query_param("tmdb_id", "1399")
                    .query_param("type", "tv")
                    .query_param("season_number", "1")
                    .query_param("episode_number", "2")
                    .query_param("subs_per_page", "30");
                then.status(200).json_body(json!({
                    "status": true,
                    "subtitles": [{"sd_id": 1, "name": "s", "release_name": "r", "lang": "EN", "url": "/subtitle/1.zip"}]
                }));
            })
            .await;
        let client = SubdlClient::with_base_urls("key", server.base_url(), server.base_url());
        let query = SubtitleQuery {
            tmdb_id: 1399,
            kind: MediaKind::Tv,
            season: Some(1),
            episode: Some(2),
        };
        let found = client.search(&query).await.unwrap();
        mock.assert_async().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "/subtitle/1.zip");
    }

    #[tokio::test]
    async fn unsuccessful_search_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/subtitles");
                then.status(200).json_body(json!({"status": false, "error": "not found"}));
            })
            .await;
        let client = SubdlClient::with_base_urls("key", server.base_url(), server.base_url());
        let query = SubtitleQuery {
            tmdb_id: 5,
            kind: MediaKind::Movie,
            season: None,
            episode: None,
        };
        assert!(client.search(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetches_plain_and_zipped_subtitles() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/plain.srt");
                then.status(200).header("content-type", "text/plain").body(SRT);
            })
            .await;
        let archive = zipped(&[("readme.txt", "ignore me"), ("Movie.EN.srt", SRT)]);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/subtitle/1.zip");
                then.status(200)
                    .header("content-type", "application/zip")
                    .body(archive.clone());
            })
            .await;
        let client = SubdlClient::with_base_urls("key", server.base_url(), server.base_url());
        assert_eq!(client.fetch("/plain.srt").await.unwrap(), SRT);
        assert_eq!(client.fetch("/subtitle/1.zip").await.unwrap(), SRT);
    }

    #[test]
    fn archive_without_srt_is_an_error() {
        let archive = zipped(&[("readme.txt", "nothing here")]);
        assert!(extract_srt(&archive).is_err());
    }
}
