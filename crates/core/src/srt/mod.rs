//! This module is responsible for SRT parsing and cue lookup.
//! Parsing is best-effort: blocks that do not look like a cue are dropped so
//! partial or damaged files still yield whatever valid cues they contain.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Timing line such as `00:00:01,500 --> 00:00:03,000`.
static TIMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2}),(\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2}),(\d{3})")
        .expect("timing pattern is valid")
});

/// A single caption entry with its display window in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// Sequence number as written in the file, if it was numeric.
    pub index: Option<u32>,
    pub start_time: f64,
    pub end_time: f64,
    /// Caption lines joined with `\n`.
    pub text: String,
}

impl SubtitleCue {
    /// Whether `time` falls inside the inclusive `[start_time, end_time]` window.
    /// A reversed window never contains anything.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time <= self.end_time
    }

    /// Caption text split back into display lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }
}

/// Parse SRT text into cues, keeping the order of the blocks in the file.
/// Blocks with fewer than three lines or an unreadable timing line are skipped.
pub fn parse(input: &str) -> Vec<SubtitleCue> {
    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in input.lines() {
        if line.trim().is_empty() {
            if let Some(cue) = parse_block(&block) {
                cues.push(cue);
            }
            block.clear();
        } else {
            block.push(line);
        }
    }
    if let Some(cue) = parse_block(&block) {
        cues.push(cue);
    }
    trace!("parse: {} cues", cues.len());
    cues
}

/// Turn the lines of one block into a cue, or `None` when the block is malformed.
fn parse_block(lines: &[&str]) -> Option<SubtitleCue> {
    if lines.is_empty() {
        return None;
    }
    if lines.len() < 3 {
        trace!("skipping block with {} lines", lines.len());
        return None;
    }
    let Some(caps) = TIMING.captures(lines[1]) else {
        trace!("skipping block with bad timing line {:?}", lines[1]);
        return None;
    };
    Some(SubtitleCue {
        index: lines[0].trim().parse().ok(),
        start_time: seconds(&caps, 1),
        end_time: seconds(&caps, 5),
        text: lines[2..].join("\n"),
    })
}

/// Read four consecutive capture groups starting at `first` as `H, M, S, ms`.
fn seconds(caps: &Captures, first: usize) -> f64 {
    let field = |i: usize| -> f64 {
        caps.get(first + i)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0) as f64
    };
    field(0) * 3600.0 + field(1) * 60.0 + field(2) + field(3) / 1000.0
}

/// Return the first cue, in file order, whose window contains `time`.
/// This is a plain linear scan with no cursor so the clock may jump around freely.
pub fn current_cue(cues: &[SubtitleCue], time: f64) -> Option<&SubtitleCue> {
    cues.iter().find(|cue| cue.contains(time))
}

/// Format cues back to SRT text.
/// Cues without a numeric index are numbered by their position.
pub fn format(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (pos, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index.unwrap_or(pos as u32 + 1),
            format_time(cue.start_time),
            format_time(cue.end_time),
            cue.text
        ));
    }
    out
}

/// Move every cue by `delta` seconds, clamping at zero.
pub fn shift(cues: &[SubtitleCue], delta: f64) -> Vec<SubtitleCue> {
    cues.iter()
        .map(|cue| SubtitleCue {
            start_time: (cue.start_time + delta).max(0.0),
            end_time: (cue.end_time + delta).max(0.0),
            ..cue.clone()
        })
        .collect()
}

/// Format seconds as `HH:MM:SS,mmm`.
fn format_time(secs: f64) -> String {
    let ms = (secs.max(0.0) * 1000.0).round() as u64;
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1000;
    let ms = ms % 1000;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}
