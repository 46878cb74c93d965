//! The subtitle track currently attached to a player.
//! Downloads are tagged with a ticket so a slow response for an old request
//! can never replace a newer track.

use crate::offset::{OffsetStep, SubtitleOffset};
use crate::srt::{self, SubtitleCue};
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Identifies one subtitle download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

/// What the track can show right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "cues", rename_all = "snake_case")]
pub enum TrackStatus {
    /// No track selected.
    None,
    Loading,
    /// Parsed with this many cues.
    Ready(usize),
    /// Downloaded but nothing usable inside; shown as "no subtitles available".
    Empty,
    /// The download failed.
    Unavailable,
}

/// Outcome of handing a finished download to the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackUpdate {
    Applied(TrackStatus),
    /// The ticket was superseded; the result was dropped.
    Stale,
}

#[derive(Debug)]
pub struct SubtitleTrack {
    cues: Vec<SubtitleCue>,
    offset: SubtitleOffset,
    generation: u64,
    status: TrackStatus,
}

impl Default for SubtitleTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl SubtitleTrack {
    pub fn new() -> Self {
        Self {
            cues: Vec::new(),
            offset: SubtitleOffset::default(),
            generation: 0,
            status: TrackStatus::None,
        }
    }

    /// Start a new download. Every ticket handed out earlier becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        self.status = TrackStatus::Loading;
        debug!("subtitle load #{} started", self.generation);
        LoadTicket(self.generation)
    }

    /// Apply a finished download if `ticket` is still the latest one.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<String>) -> TrackUpdate {
        if ticket.0 != self.generation || self.status != TrackStatus::Loading {
            debug!("dropping stale subtitle load #{}", ticket.0);
            return TrackUpdate::Stale;
        }
        match result {
            Ok(text) => self.replace(srt::parse(&text)),
            Err(err) => {
                warn!("subtitle download failed: {err:#}");
                self.cues.clear();
                self.status = TrackStatus::Unavailable;
            }
        }
        TrackUpdate::Applied(self.status)
    }

    /// Attach subtitle text that is already in memory.
    pub fn load_text(&mut self, text: &str) -> TrackStatus {
        self.generation += 1;
        self.replace(srt::parse(text));
        self.status
    }

    fn replace(&mut self, cues: Vec<SubtitleCue>) {
        self.offset.reset();
        self.status = if cues.is_empty() {
            TrackStatus::Empty
        } else {
            TrackStatus::Ready(cues.len())
        };
        info!("subtitle track loaded with {} cues", cues.len());
        self.cues = cues;
    }

    /// Drop the track and invalidate any download still in flight.
    pub fn unload(&mut self) {
        self.generation += 1;
        self.cues.clear();
        self.offset.reset();
        self.status = TrackStatus::None;
    }

    /// Cue to display at playback time `clock`, after applying the offset.
    pub fn caption_at(&self, clock: f64) -> Option<&SubtitleCue> {
        srt::current_cue(&self.cues, self.offset.apply(clock))
    }

    pub fn adjust_offset(&mut self, step: OffsetStep) {
        self.offset.step(step);
        debug!("subtitle offset now {}", self.offset);
    }

    pub fn offset(&self) -> SubtitleOffset {
        self.offset
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }
}
