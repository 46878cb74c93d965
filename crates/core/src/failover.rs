//! Mirror selection for one playback session.
//! The selector decides which source the playback surface should show and
//! moves on to the next untried mirror when one errors or never finishes
//! loading. It performs no I/O and owns no timers: every transition returns a
//! [`Directive`] telling the owner which timer to arm or cancel.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a source may load without a success signal before it counts as failed.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(15);
/// Grace period shown as "switching mirrors" before the next source is tried.
pub const SWITCH_DELAY: Duration = Duration::from_secs(2);

/// Which playback surface a source needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A third-party player page shown in an iframe.
    Embed,
    /// A direct media URL played by the native element.
    Media,
}

impl SourceKind {
    /// Classify a provider type string such as `"iframe"` or `"video/mp4"`.
    pub fn from_type(kind: &str) -> Self {
        let kind = kind.trim().to_ascii_lowercase();
        if kind.starts_with("video/")
            || kind.contains("mpegurl")
            || matches!(kind.as_str(), "media" | "mp4" | "webm" | "hls" | "m3u8" | "direct")
        {
            SourceKind::Media
        } else {
            SourceKind::Embed
        }
    }
}

/// One mirror for a title or episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSource {
    pub url: String,
    pub kind: SourceKind,
    /// Provider name shown in the source picker.
    pub label: String,
}

impl PlaybackSource {
    pub fn new(label: impl Into<String>, kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            label: label.into(),
        }
    }

    /// Only native media can carry an overlay caption track.
    pub fn is_native(&self) -> bool {
        self.kind == SourceKind::Media
    }
}

/// Identifies one load attempt. Signals for older attempts are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Attempt(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "index", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading(usize),
    Playing(usize),
    Failed(usize),
    /// Every source failed. Only an explicit selection leaves this state.
    AllFailed,
}

/// What the owner of the selector must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Show source `index` and arm the load timeout for `attempt`.
    Load { attempt: Attempt, index: usize },
    /// The source is playing; cancel the load timeout.
    Settled,
    /// Arm the switch delay; call [`SourceSelector::switch_delay_elapsed`] when it fires.
    SwitchAfterDelay { attempt: Attempt },
    /// Nothing left to try; cancel every timer and tell the user.
    Exhausted,
    /// The signal was stale or did not apply in the current phase.
    Ignored,
}

/// Renderable view of the selection state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSnapshot {
    pub phase: Phase,
    pub active_index: Option<usize>,
    pub active: Option<PlaybackSource>,
    pub failed: Vec<usize>,
    pub retry_count: u32,
    pub source_count: usize,
}

impl SelectionSnapshot {
    /// Short status for the player overlay.
    pub fn status_line(&self) -> String {
        match self.phase {
            Phase::Idle => "Idle".to_string(),
            Phase::Loading(i) => format!("Loading video... (source {}/{})", i + 1, self.source_count),
            Phase::Playing(i) => format!("Playing source {}/{}", i + 1, self.source_count),
            Phase::Failed(_) => "Failed to load. Switching mirrors...".to_string(),
            Phase::AllFailed => "All sources failed. Pick a source to retry.".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct SourceSelector {
    sources: Vec<PlaybackSource>,
    phase: Phase,
    active: Option<usize>,
    failed: BTreeSet<usize>,
    retry_count: u32,
    attempt: u64,
}

impl SourceSelector {
    pub fn new(sources: Vec<PlaybackSource>) -> Self {
        Self {
            sources,
            phase: Phase::Idle,
            active: None,
            failed: BTreeSet::new(),
            retry_count: 0,
            attempt: 0,
        }
    }

    /// Begin the session by loading the first source.
    pub fn start(&mut self) -> Directive {
        if self.sources.is_empty() {
            warn!("no playback sources to try");
            self.phase = Phase::AllFailed;
            return Directive::Exhausted;
        }
        self.load(0)
    }

    /// Swap in the sources for a new title, season or episode and start over.
    pub fn change_content(&mut self, sources: Vec<PlaybackSource>) -> Directive {
        info!("content changed, {} sources", sources.len());
        // attempt ids keep counting so signals from the old content stay stale
        let attempt = self.attempt;
        *self = Self::new(sources);
        self.attempt = attempt;
        self.start()
    }

    /// Explicit user choice. Accepted from any phase, including a source that
    /// already failed this session; that source gets one more attempt.
    pub fn select_source(&mut self, index: usize) -> Result<Directive> {
        if index >= self.sources.len() {
            return Err(anyhow!(
                "source index {index} out of range ({} sources)",
                self.sources.len()
            ));
        }
        self.retry_count = 0;
        self.failed.remove(&index);
        Ok(self.load(index))
    }

    pub fn report_load_success(&mut self, attempt: Attempt) -> Directive {
        match self.phase {
            Phase::Loading(i) if self.is_current(attempt) => {
                info!("source {} ({}) is playing", i, self.sources[i].label);
                self.phase = Phase::Playing(i);
                Directive::Settled
            }
            _ => self.ignore("load success", attempt),
        }
    }

    pub fn report_load_failure(&mut self, attempt: Attempt) -> Directive {
        self.fail(attempt, "load error")
    }

    pub fn load_timeout_elapsed(&mut self, attempt: Attempt) -> Directive {
        self.fail(attempt, "load timeout")
    }

    /// The "switching mirrors" grace period is over; try the next untried source.
    pub fn switch_delay_elapsed(&mut self, attempt: Attempt) -> Directive {
        match self.phase {
            Phase::Failed(_) if self.is_current(attempt) => match self.next_untried() {
                Some(next) => self.load(next),
                None => self.exhaust(),
            },
            _ => self.ignore("switch delay", attempt),
        }
    }

    fn fail(&mut self, attempt: Attempt, reason: &str) -> Directive {
        let Phase::Loading(i) = self.phase else {
            return self.ignore(reason, attempt);
        };
        if !self.is_current(attempt) {
            return self.ignore(reason, attempt);
        }
        self.failed.insert(i);
        self.retry_count += 1;
        self.phase = Phase::Failed(i);
        info!(
            "source {} ({}) failed: {reason}, retry {}",
            i, self.sources[i].label, self.retry_count
        );
        if self.next_untried().is_some() {
            Directive::SwitchAfterDelay { attempt }
        } else {
            self.exhaust()
        }
    }

    fn load(&mut self, index: usize) -> Directive {
        self.attempt += 1;
        self.active = Some(index);
        self.phase = Phase::Loading(index);
        debug!("loading source {} attempt {}", index, self.attempt);
        Directive::Load {
            attempt: Attempt(self.attempt),
            index,
        }
    }

    fn exhaust(&mut self) -> Directive {
        warn!("all {} sources failed", self.sources.len());
        self.phase = Phase::AllFailed;
        Directive::Exhausted
    }

    fn ignore(&self, signal: &str, attempt: Attempt) -> Directive {
        debug!(
            "ignoring {signal} for attempt {} in {:?} (current attempt {})",
            attempt.0, self.phase, self.attempt
        );
        Directive::Ignored
    }

    fn is_current(&self, attempt: Attempt) -> bool {
        attempt.0 == self.attempt
    }

    /// First index in list order that has not failed this session.
    fn next_untried(&self) -> Option<usize> {
        (0..self.sources.len()).find(|i| !self.failed.contains(i))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn failed(&self) -> impl Iterator<Item = usize> + '_ {
        self.failed.iter().copied()
    }

    pub fn sources(&self) -> &[PlaybackSource] {
        &self.sources
    }

    pub fn source(&self, index: usize) -> Option<&PlaybackSource> {
        self.sources.get(index)
    }

    /// The source being loaded or shown, if any.
    pub fn active_source(&self) -> Option<&PlaybackSource> {
        match self.phase {
            Phase::Loading(i) | Phase::Playing(i) | Phase::Failed(i) => self.sources.get(i),
            Phase::Idle | Phase::AllFailed => None,
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            phase: self.phase,
            active_index: self.active,
            active: self.active_source().cloned(),
            failed: self.failed.iter().copied().collect(),
            retry_count: self.retry_count,
            source_count: self.sources.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(n: usize) -> Vec<PlaybackSource> {
        (0..n)
            .map(|i| {
                PlaybackSource::new(
                    format!("mirror{i}"),
                    SourceKind::Embed,
                    format!("https://m{i}.example/embed/1"),
                )
            })
            .collect()
    }

    fn attempt_of(directive: Directive) -> Attempt {
        match directive {
            Directive::Load { attempt, .. } | Directive::SwitchAfterDelay { attempt } => attempt,
            other => panic!("no attempt in {other:?}"),
        }
    }

    #[test]
    fn classifies_source_types() {
        assert_eq!(SourceKind::from_type("iframe"), SourceKind::Embed);
        assert_eq!(SourceKind::from_type("embed"), SourceKind::Embed);
        assert_eq!(SourceKind::from_type("video/mp4"), SourceKind::Media);
        assert_eq!(SourceKind::from_type("application/x-mpegURL"), SourceKind::Media);
    }

    #[test]
    fn exhausts_all_sources_in_order() {
        let mut sel = SourceSelector::new(sources(3));
        let mut phases = vec![];
        let mut directive = sel.start();
        loop {
            phases.push(sel.phase());
            let attempt = attempt_of(directive);
            match sel.report_load_failure(attempt) {
                Directive::SwitchAfterDelay { attempt } => {
                    phases.push(sel.phase());
                    directive = sel.switch_delay_elapsed(attempt);
                }
                Directive::Exhausted => {
                    // the last source fails and exhausts the list in one call
                    let last = sel.snapshot().active_index.unwrap();
                    assert!(sel.failed().any(|i| i == last));
                    phases.push(Phase::Failed(last));
                    phases.push(sel.phase());
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(
            phases,
            vec![
                Phase::Loading(0),
                Phase::Failed(0),
                Phase::Loading(1),
                Phase::Failed(1),
                Phase::Loading(2),
                Phase::Failed(2),
                Phase::AllFailed,
            ]
        );
        assert_eq!(sel.retry_count(), 3);
        assert_eq!(sel.failed().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(sel.active_source().is_none());
        assert_eq!(sel.snapshot().active_index, Some(2));
    }

    #[test]
    fn no_automatic_transition_after_exhaustion() {
        let mut sel = SourceSelector::new(sources(1));
        let attempt = attempt_of(sel.start());
        assert_eq!(sel.report_load_failure(attempt), Directive::Exhausted);
        assert_eq!(sel.switch_delay_elapsed(attempt), Directive::Ignored);
        assert_eq!(sel.load_timeout_elapsed(attempt), Directive::Ignored);
        assert_eq!(sel.report_load_success(attempt), Directive::Ignored);
        assert_eq!(sel.phase(), Phase::AllFailed);
    }

    #[test]
    fn reselecting_a_failed_source_retries_it_once() {
        let mut sel = SourceSelector::new(sources(3));
        let first = attempt_of(sel.start());
        let grace = attempt_of(sel.report_load_failure(first));
        let second = attempt_of(sel.switch_delay_elapsed(grace));
        assert_eq!(sel.phase(), Phase::Loading(1));

        let retry = attempt_of(sel.select_source(0).unwrap());
        assert_eq!(sel.phase(), Phase::Loading(0));
        assert_eq!(sel.retry_count(), 0);

        // signals for the superseded attempt on source 1 are stale
        assert_eq!(sel.report_load_failure(second), Directive::Ignored);

        let grace = attempt_of(sel.report_load_failure(retry));
        assert!(sel.failed().any(|i| i == 0));
        assert_eq!(sel.retry_count(), 1);
        sel.switch_delay_elapsed(grace);
        assert_eq!(sel.phase(), Phase::Loading(1));
    }

    #[test]
    fn selection_leaves_all_failed() {
        let mut sel = SourceSelector::new(sources(2));
        let a = attempt_of(sel.start());
        let g = attempt_of(sel.report_load_failure(a));
        let b = attempt_of(sel.switch_delay_elapsed(g));
        assert_eq!(sel.load_timeout_elapsed(b), Directive::Exhausted);

        let c = attempt_of(sel.select_source(1).unwrap());
        assert_eq!(sel.report_load_success(c), Directive::Settled);
        assert_eq!(sel.phase(), Phase::Playing(1));
        assert_eq!(sel.snapshot().failed, vec![0]);
    }

    #[test]
    fn stale_timeout_cannot_fail_a_playing_source() {
        let mut sel = SourceSelector::new(sources(2));
        let a = attempt_of(sel.start());
        sel.report_load_success(a);
        assert_eq!(sel.load_timeout_elapsed(a), Directive::Ignored);
        assert_eq!(sel.phase(), Phase::Playing(0));
    }

    #[test]
    fn content_change_resets_everything() {
        let mut sel = SourceSelector::new(sources(2));
        let a = attempt_of(sel.start());
        sel.report_load_failure(a);
        let directive = sel.change_content(sources(3));
        assert!(matches!(directive, Directive::Load { index: 0, .. }));
        assert_eq!(sel.retry_count(), 0);
        assert_eq!(sel.failed().count(), 0);
        assert_eq!(sel.sources().len(), 3);
        assert_eq!(sel.report_load_failure(a), Directive::Ignored);
        assert_eq!(sel.phase(), Phase::Loading(0));
    }

    #[test]
    fn empty_source_list_is_all_failed() {
        let mut sel = SourceSelector::new(vec![]);
        assert_eq!(sel.start(), Directive::Exhausted);
        assert!(sel.select_source(0).is_err());
        assert_eq!(sel.snapshot().status_line(), "All sources failed. Pick a source to retry.");
    }
}
