//! Local persistence for watch history, comments and preferences.
//! Each collection is one JSON file in the data directory. Session state such
//! as the subtitle offset or failed mirrors is never written here.

use crate::metadata::MediaKind;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Entries kept in the watch history.
pub const HISTORY_LIMIT: usize = 50;
/// Entries shown in the continue-watching row.
pub const CONTINUE_LIMIT: usize = 10;

const HISTORY_FILE: &str = "watch_history.json";
const COMMENTS_FILE: &str = "comments.json";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub id: String,
    pub kind: MediaKind,
    pub title: String,
    pub poster_path: Option<String>,
    /// Milliseconds since the Unix epoch of the last update.
    pub timestamp: u64,
    /// Percent watched, 0 to 100.
    pub progress: f64,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl WatchEntry {
    pub fn new(id: impl Into<String>, kind: MediaKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            poster_path: None,
            timestamp: 0,
            progress: 0.0,
            season: None,
            episode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content_id: String,
    pub content_kind: MediaKind,
    pub author: String,
    pub text: String,
    /// Star rating given with the comment.
    pub rating: u8,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub default_server: String,
    pub autoplay: bool,
    pub theme: Theme,
    pub filter_adult_content: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_server: "vidsrc".to_string(),
            autoplay: true,
            theme: Theme::System,
            filter_adult_content: false,
        }
    }
}

/// Partial update for [`Preferences`]; `None` fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct PreferencesPatch {
    pub default_server: Option<String>,
    pub autoplay: Option<bool>,
    pub theme: Option<Theme>,
    pub filter_adult_content: Option<bool>,
}

pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open the store in `dir`, creating the directory when needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Read a collection. A missing or unreadable file yields the default.
    fn read<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        trace!("read path={}", path.display());
        if !path.exists() {
            return Ok(T::default());
        }
        let text = fs::read_to_string(&path)?;
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!("ignoring corrupt {}: {err}", path.display());
                Ok(T::default())
            }
        }
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string(value)?)?;
        debug!("saved {}", path.display());
        Ok(())
    }

    pub fn watch_history(&self) -> Result<Vec<WatchEntry>> {
        self.read(HISTORY_FILE)
    }

    /// Refresh an existing entry where it stands, or add a new one at the front.
    pub fn record_watch(&self, mut entry: WatchEntry) -> Result<()> {
        let mut history = self.watch_history()?;
        entry.timestamp = now_ms();
        entry.progress = entry.progress.clamp(0.0, 100.0);
        match history
            .iter_mut()
            .find(|h| h.id == entry.id && h.kind == entry.kind)
        {
            Some(existing) => *existing = entry,
            None => history.insert(0, entry),
        }
        history.truncate(HISTORY_LIMIT);
        self.write(HISTORY_FILE, &history)
    }

    /// Set the progress of an existing entry. Returns whether it was found.
    pub fn update_progress(&self, id: &str, kind: MediaKind, progress: f64) -> Result<bool> {
        let mut history = self.watch_history()?;
        let Some(item) = history.iter_mut().find(|h| h.id == id && h.kind == kind) else {
            return Ok(false);
        };
        item.progress = progress.clamp(0.0, 100.0);
        item.timestamp = now_ms();
        self.write(HISTORY_FILE, &history)?;
        Ok(true)
    }

    /// Titles started but not finished.
    pub fn continue_watching(&self) -> Result<Vec<WatchEntry>> {
        Ok(self
            .watch_history()?
            .into_iter()
            .filter(|h| h.progress > 5.0 && h.progress < 95.0)
            .take(CONTINUE_LIMIT)
            .collect())
    }

    /// Comments for one title, newest first.
    pub fn comments_for(&self, content_id: &str, kind: MediaKind) -> Result<Vec<Comment>> {
        let all: Vec<Comment> = self.read(COMMENTS_FILE)?;
        let mut found: Vec<Comment> = all
            .into_iter()
            .filter(|c| c.content_id == content_id && c.content_kind == kind)
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(found)
    }

    pub fn add_comment(
        &self,
        content_id: &str,
        kind: MediaKind,
        author: &str,
        text: &str,
        rating: u8,
    ) -> Result<Comment> {
        let mut all: Vec<Comment> = self.read(COMMENTS_FILE)?;
        let timestamp = now_ms();
        let comment = Comment {
            id: format!("{timestamp:x}-{}", all.len()),
            content_id: content_id.to_string(),
            content_kind: kind,
            author: author.to_string(),
            text: text.to_string(),
            rating,
            timestamp,
        };
        all.insert(0, comment.clone());
        self.write(COMMENTS_FILE, &all)?;
        Ok(comment)
    }

    /// Mean rating of a title's comments, 0 when there are none.
    pub fn average_rating(&self, content_id: &str, kind: MediaKind) -> Result<f64> {
        let comments = self.comments_for(content_id, kind)?;
        if comments.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = comments.iter().map(|c| f64::from(c.rating)).sum();
        Ok(sum / comments.len() as f64)
    }

    pub fn preferences(&self) -> Result<Preferences> {
        self.read(PREFERENCES_FILE)
    }

    pub fn update_preferences(&self, patch: PreferencesPatch) -> Result<Preferences> {
        let mut prefs = self.preferences()?;
        if let Some(server) = patch.default_server {
            prefs.default_server = server;
        }
        if let Some(autoplay) = patch.autoplay {
            prefs.autoplay = autoplay;
        }
        if let Some(theme) = patch.theme {
            prefs.theme = theme;
        }
        if let Some(filter) = patch.filter_adult_content {
            prefs.filter_adult_content = filter;
        }
        self.write(PREFERENCES_FILE, &prefs)?;
        Ok(prefs)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
