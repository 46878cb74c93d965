//! Playback session driver.
//! One task owns the source selector, the subtitle track and every timer for a
//! screen. The UI talks to it through a [`PlayerHandle`], the playback surface
//! receives [`SurfaceCommand`]s, and renderers watch a [`PlayerView`].

use crate::failover::{
    Attempt, Directive, Phase, PlaybackSource, SelectionSnapshot, SourceSelector, LOAD_TIMEOUT,
    SWITCH_DELAY,
};
use crate::offset::OffsetStep;
use crate::subtitles::SubtitleFetcher;
use crate::track::{LoadTicket, SubtitleTrack, TrackStatus, TrackUpdate};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

mod timer;

use timer::Timer;

/// Capacity of the player's inbound event queue.
const EVENT_QUEUE: usize = 64;

/// Idle time after which the player chrome hides during native playback.
pub const CONTROLS_HIDE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub load_timeout: Duration,
    pub switch_delay: Duration,
    pub controls_hide: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            load_timeout: LOAD_TIMEOUT,
            switch_delay: SWITCH_DELAY,
            controls_hide: CONTROLS_HIDE,
        }
    }
}

/// Signals from the UI and the playback surface.
#[derive(Debug)]
pub enum PlayerEvent {
    /// The surface finished loading the source for this attempt.
    SourceLoaded(Attempt),
    /// The surface reported an error for this attempt.
    SourceErrored(Attempt),
    SelectSource(usize),
    /// New title, season or episode.
    ChangeContent(Vec<PlaybackSource>),
    LoadSubtitle(String),
    UnloadSubtitle,
    /// Show or hide captions without dropping the loaded track.
    ShowCaptions(bool),
    /// Current playback position in seconds.
    ClockTick(f64),
    AdjustOffset(OffsetStep),
    /// Native media started (`true`) or paused (`false`).
    MediaPlaying(bool),
    /// Pointer moved over the player.
    PointerMoved,
    /// Pointer left the player.
    PointerLeft,
    Shutdown,
}

/// Instructions for the playback surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCommand {
    /// Load `source`; report back with `attempt`.
    Show {
        attempt: Attempt,
        source: PlaybackSource,
    },
    /// Nothing to show.
    Clear,
}

/// Everything a renderer needs for one frame of the player chrome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub selection: SelectionSnapshot,
    pub status: String,
    pub subtitles: TrackStatus,
    pub offset: f64,
    pub captions_enabled: bool,
    pub controls_visible: bool,
    /// Caption text to overlay, only ever set for native media.
    pub caption: Option<String>,
}

/// Player state that is neither source selection nor the track itself.
#[derive(Debug, Clone, Copy)]
struct Chrome {
    clock: f64,
    captions_enabled: bool,
    controls_visible: bool,
    media_playing: bool,
    // bumped on every pointer or playback change; older hide shots are stale
    controls_epoch: u64,
}

impl Default for Chrome {
    fn default() -> Self {
        Self {
            clock: 0.0,
            captions_enabled: false,
            controls_visible: true,
            media_playing: false,
            controls_epoch: 0,
        }
    }
}

enum Event {
    Ui(PlayerEvent),
    LoadTimedOut(Attempt),
    SwitchDue(Attempt),
    ControlsIdle(u64),
    SubtitleFetched(LoadTicket, Result<String>),
}

/// Cloneable sender side of a running player.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<Event>,
    view: watch::Receiver<PlayerView>,
}

impl PlayerHandle {
    pub async fn send(&self, event: PlayerEvent) -> Result<()> {
        self.tx
            .send(Event::Ui(event))
            .await
            .map_err(|_| anyhow!("player session has ended"))
    }

    pub async fn source_loaded(&self, attempt: Attempt) -> Result<()> {
        self.send(PlayerEvent::SourceLoaded(attempt)).await
    }

    pub async fn source_errored(&self, attempt: Attempt) -> Result<()> {
        self.send(PlayerEvent::SourceErrored(attempt)).await
    }

    pub async fn select_source(&self, index: usize) -> Result<()> {
        self.send(PlayerEvent::SelectSource(index)).await
    }

    pub async fn change_content(&self, sources: Vec<PlaybackSource>) -> Result<()> {
        self.send(PlayerEvent::ChangeContent(sources)).await
    }

    pub async fn tick(&self, clock: f64) -> Result<()> {
        self.send(PlayerEvent::ClockTick(clock)).await
    }

    pub async fn adjust_offset(&self, step: OffsetStep) -> Result<()> {
        self.send(PlayerEvent::AdjustOffset(step)).await
    }

    pub async fn show_captions(&self, enabled: bool) -> Result<()> {
        self.send(PlayerEvent::ShowCaptions(enabled)).await
    }

    pub async fn media_playing(&self, playing: bool) -> Result<()> {
        self.send(PlayerEvent::MediaPlaying(playing)).await
    }

    pub async fn pointer_moved(&self) -> Result<()> {
        self.send(PlayerEvent::PointerMoved).await
    }

    pub async fn pointer_left(&self) -> Result<()> {
        self.send(PlayerEvent::PointerLeft).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(PlayerEvent::Shutdown).await
    }

    /// Narrow handle for controls that only pick subtitle tracks.
    pub fn subtitle_loader(&self) -> SubtitleLoader {
        SubtitleLoader(self.clone())
    }

    /// Latest published view.
    pub fn view(&self) -> PlayerView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerView> {
        self.view.clone()
    }
}

/// Lets a subtitle picker ask the player for a track without seeing the rest of it.
#[derive(Clone)]
pub struct SubtitleLoader(PlayerHandle);

impl SubtitleLoader {
    pub async fn load(&self, url: impl Into<String>) -> Result<()> {
        self.0.send(PlayerEvent::LoadSubtitle(url.into())).await
    }

    pub async fn unload(&self) -> Result<()> {
        self.0.send(PlayerEvent::UnloadSubtitle).await
    }
}

pub struct Player<F: SubtitleFetcher> {
    selector: SourceSelector,
    track: SubtitleTrack,
    fetcher: F,
    config: PlayerConfig,
    chrome: Chrome,
    load_timeout: Timer,
    switch_delay: Timer,
    controls_hide: Timer,
    events: mpsc::Receiver<Event>,
    // weak so the loop ends once every handle is gone
    events_tx: mpsc::WeakSender<Event>,
    surface: mpsc::UnboundedSender<SurfaceCommand>,
    view: watch::Sender<PlayerView>,
}

impl<F: SubtitleFetcher> Player<F> {
    /// Build a player for `sources`. Call [`Player::run`] to start it.
    pub fn new(
        sources: Vec<PlaybackSource>,
        fetcher: F,
        config: PlayerConfig,
    ) -> (Self, PlayerHandle, mpsc::UnboundedReceiver<SurfaceCommand>) {
        let (tx, events) = mpsc::channel(EVENT_QUEUE);
        let (surface, surface_rx) = mpsc::unbounded_channel();
        let selector = SourceSelector::new(sources);
        let track = SubtitleTrack::new();
        let chrome = Chrome::default();
        let (view, view_rx) = watch::channel(render(&selector, &track, &chrome));
        let player = Self {
            selector,
            track,
            fetcher,
            config,
            chrome,
            load_timeout: Timer::new("load timeout"),
            switch_delay: Timer::new("switch delay"),
            controls_hide: Timer::new("controls hide"),
            events,
            events_tx: tx.downgrade(),
            surface,
            view,
        };
        let handle = PlayerHandle { tx, view: view_rx };
        (player, handle, surface_rx)
    }

    /// Drive the session until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        let directive = self.selector.start();
        self.apply(directive);
        self.publish();
        while let Some(event) = self.events.recv().await {
            if !self.handle(event) {
                break;
            }
            self.publish();
        }
        info!("player session ended");
        self.load_timeout.cancel();
        self.switch_delay.cancel();
        self.controls_hide.cancel();
        let _ = self.surface.send(SurfaceCommand::Clear);
    }

    /// Process one event; `false` ends the session.
    fn handle(&mut self, event: Event) -> bool {
        let directive = match event {
            Event::Ui(PlayerEvent::SourceLoaded(attempt)) => self.selector.report_load_success(attempt),
            Event::Ui(PlayerEvent::SourceErrored(attempt)) => self.selector.report_load_failure(attempt),
            Event::Ui(PlayerEvent::SelectSource(index)) => match self.selector.select_source(index) {
                Ok(directive) => directive,
                Err(err) => {
                    warn!("ignoring source selection: {err:#}");
                    Directive::Ignored
                }
            },
            Event::Ui(PlayerEvent::ChangeContent(sources)) => {
                self.track.unload();
                self.controls_hide.cancel();
                self.chrome = Chrome {
                    controls_epoch: self.chrome.controls_epoch + 1,
                    ..Chrome::default()
                };
                self.selector.change_content(sources)
            }
            Event::Ui(PlayerEvent::LoadSubtitle(url)) => {
                self.fetch_subtitle(url);
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::UnloadSubtitle) => {
                self.track.unload();
                self.chrome.captions_enabled = false;
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::ShowCaptions(enabled)) => {
                self.chrome.captions_enabled = enabled;
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::ClockTick(clock)) => {
                self.chrome.clock = clock;
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::AdjustOffset(step)) => {
                self.track.adjust_offset(step);
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::MediaPlaying(playing)) => {
                self.chrome.media_playing = playing;
                if playing {
                    self.schedule_controls_hide();
                } else {
                    self.controls_hide.cancel();
                    self.chrome.controls_epoch += 1;
                }
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::PointerMoved) => {
                self.chrome.controls_visible = true;
                if self.chrome.media_playing {
                    self.schedule_controls_hide();
                } else {
                    self.controls_hide.cancel();
                    self.chrome.controls_epoch += 1;
                }
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::PointerLeft) => {
                if self.chrome.media_playing {
                    self.controls_hide.cancel();
                    self.chrome.controls_epoch += 1;
                    self.chrome.controls_visible = false;
                }
                Directive::Ignored
            }
            Event::Ui(PlayerEvent::Shutdown) => return false,
            Event::LoadTimedOut(attempt) => self.selector.load_timeout_elapsed(attempt),
            Event::SwitchDue(attempt) => self.selector.switch_delay_elapsed(attempt),
            Event::ControlsIdle(epoch) => {
                if epoch == self.chrome.controls_epoch && self.chrome.media_playing {
                    self.chrome.controls_visible = false;
                }
                Directive::Ignored
            }
            Event::SubtitleFetched(ticket, result) => {
                if let TrackUpdate::Applied(TrackStatus::Ready(_)) =
                    self.track.finish_load(ticket, result)
                {
                    self.chrome.captions_enabled = true;
                }
                Directive::Ignored
            }
        };
        self.apply(directive);
        true
    }

    /// Arm or cancel timers and instruct the surface as the selector asks.
    fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Load { attempt, index } => {
                self.switch_delay.cancel();
                if let Some(tx) = self.events_tx.upgrade() {
                    self.load_timeout
                        .arm(self.config.load_timeout, tx, Event::LoadTimedOut(attempt));
                }
                if let Some(source) = self.selector.source(index) {
                    info!("showing source {} ({})", index, source.label);
                    let _ = self.surface.send(SurfaceCommand::Show {
                        attempt,
                        source: source.clone(),
                    });
                }
            }
            Directive::Settled => self.load_timeout.cancel(),
            Directive::SwitchAfterDelay { attempt } => {
                self.load_timeout.cancel();
                if let Some(tx) = self.events_tx.upgrade() {
                    self.switch_delay
                        .arm(self.config.switch_delay, tx, Event::SwitchDue(attempt));
                }
            }
            Directive::Exhausted => {
                self.load_timeout.cancel();
                self.switch_delay.cancel();
                let _ = self.surface.send(SurfaceCommand::Clear);
            }
            Directive::Ignored => {}
        }
    }

    /// Hide the chrome after `controls_hide` unless something happens first.
    fn schedule_controls_hide(&mut self) {
        self.chrome.controls_epoch += 1;
        if let Some(tx) = self.events_tx.upgrade() {
            self.controls_hide.arm(
                self.config.controls_hide,
                tx,
                Event::ControlsIdle(self.chrome.controls_epoch),
            );
        }
    }

    fn fetch_subtitle(&mut self, url: String) {
        let Some(tx) = self.events_tx.upgrade() else {
            return;
        };
        let ticket = self.track.begin_load();
        let fetcher = self.fetcher.clone();
        debug!("fetching subtitle {url}");
        tokio::spawn(async move {
            let result = fetcher.fetch(&url).await;
            let _ = tx.send(Event::SubtitleFetched(ticket, result)).await;
        });
    }

    fn publish(&self) {
        let view = render(&self.selector, &self.track, &self.chrome);
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

fn render(selector: &SourceSelector, track: &SubtitleTrack, chrome: &Chrome) -> PlayerView {
    let selection = selector.snapshot();
    let native_playing = matches!(selection.phase, Phase::Playing(_))
        && selection.active.as_ref().map_or(false, PlaybackSource::is_native);
    let caption = if native_playing && chrome.captions_enabled {
        track.caption_at(chrome.clock).map(|cue| cue.text.clone())
    } else {
        None
    };
    PlayerView {
        status: selection.status_line(),
        selection,
        subtitles: track.status(),
        offset: track.offset().value(),
        captions_enabled: chrome.captions_enabled,
        controls_visible: chrome.controls_visible,
        caption,
    }
}
