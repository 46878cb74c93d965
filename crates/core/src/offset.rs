//! User-adjustable subtitle delay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds added or removed per adjustment.
pub const OFFSET_STEP: f64 = 0.5;
/// Largest delay in either direction.
pub const OFFSET_LIMIT: f64 = 5.0;

/// Direction of a single offset adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetStep {
    Earlier,
    Later,
    Reset,
}

/// Signed shift applied to the playback clock before looking up a cue.
/// A positive value shows captions from further ahead in the track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleOffset(f64);

impl SubtitleOffset {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn increase(&mut self) {
        self.0 = (self.0 + OFFSET_STEP).min(OFFSET_LIMIT);
    }

    pub fn decrease(&mut self) {
        self.0 = (self.0 - OFFSET_STEP).max(-OFFSET_LIMIT);
    }

    pub fn reset(&mut self) {
        self.0 = 0.0;
    }

    pub fn step(&mut self, step: OffsetStep) {
        match step {
            OffsetStep::Earlier => self.decrease(),
            OffsetStep::Later => self.increase(),
            OffsetStep::Reset => self.reset(),
        }
    }

    /// Offset-adjusted clock used for cue lookup.
    pub fn apply(self, clock: f64) -> f64 {
        clock + self.0
    }
}

impl fmt::Display for SubtitleOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_clamped() {
        let mut offset = SubtitleOffset::default();
        for _ in 0..20 {
            offset.increase();
        }
        assert_eq!(offset.value(), OFFSET_LIMIT);
        for _ in 0..40 {
            offset.step(OffsetStep::Earlier);
        }
        assert_eq!(offset.value(), -OFFSET_LIMIT);
        offset.step(OffsetStep::Reset);
        assert_eq!(offset.value(), 0.0);
    }

    #[test]
    fn applies_additively_and_displays_one_decimal() {
        let mut offset = SubtitleOffset::default();
        offset.decrease();
        offset.decrease();
        offset.decrease();
        assert_eq!(offset.apply(10.0), 8.5);
        assert_eq!(offset.to_string(), "-1.5s");
    }
}
