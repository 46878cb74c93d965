//! Subtitle synchronisation and resilient playback for the fountain player.
//!
//! [`srt`] parses caption files and resolves the cue for a playback time,
//! [`failover`] decides which mirror to show, and [`player`] ties both to
//! timers and the UI. [`metadata`], [`subtitles`] and [`store`] are the
//! catalog, subtitle and local-storage collaborators around them.

pub mod failover;
pub mod metadata;
pub mod offset;
pub mod player;
pub mod srt;
pub mod store;
pub mod subtitles;
pub mod track;
