//! Binary entry point for the fountain player tools.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use fountain_core::failover::{Phase, PlaybackSource, SourceKind};
use fountain_core::metadata::tmdb::TmdbClient;
use fountain_core::metadata::{
    annotate_certifications, filter_adult, image_url, ImageSize, MediaKind, MetadataProvider,
};
use fountain_core::player::{Player, PlayerConfig, PlayerHandle, SurfaceCommand};
use fountain_core::srt;
use fountain_core::store::LocalStore;
use fountain_core::subtitles::subdl::SubdlClient;
use fountain_core::subtitles::{filter_language, SubtitleFetcher, SubtitleQuery};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Interval of the simulated playback clock.
const CLOCK_TICK: Duration = Duration::from_millis(100);

/// Command line options for the binary.
#[derive(Parser)]
struct Cli {
    /// Enable verbose debug and trace logs.
    #[arg(long, global = true)]
    debug: bool,

    /// Directory holding watch history, comments and preferences.
    #[arg(long, global = true, default_value = ".fountain")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the cues of an SRT file, show the cue at a time, or write a shifted copy.
    Cues {
        file: PathBuf,
        /// Playback time in seconds.
        #[arg(long, allow_hyphen_values = true)]
        at: Option<f64>,
        /// Seconds added to the playback time before lookup.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset: f64,
        /// Move every cue by this many seconds and write the result to `--out`.
        #[arg(long, requires = "out", allow_hyphen_values = true)]
        shift: Option<f64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Search the metadata catalog.
    Search {
        query: String,
        /// Hide adult titles even when the stored preference allows them.
        #[arg(long)]
        safe: bool,
    },
    /// List subtitles available for a title or episode.
    Subtitles {
        #[arg(long)]
        tmdb_id: u64,
        /// `movie` or `tv`.
        #[arg(long)]
        kind: MediaKind,
        #[arg(long)]
        season: Option<u32>,
        #[arg(long)]
        episode: Option<u32>,
        /// Only show this language code, e.g. `EN`.
        #[arg(long)]
        lang: Option<String>,
    },
    /// Try playback sources in order until one answers, optionally with subtitles.
    Play {
        /// Source as `label|type|url`; repeat for mirrors.
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        /// Subtitle file path or URL to overlay on native media.
        #[arg(long)]
        subtitle: Option<String>,
        /// Seconds of simulated playback to caption once a source plays.
        #[arg(long, default_value_t = 10)]
        watch_secs: u64,
        #[arg(long, default_value_t = 15)]
        load_timeout_secs: u64,
        #[arg(long, default_value_t = 2)]
        switch_delay_secs: u64,
    },
    /// Show the continue-watching list.
    History,
}

/// Loads subtitles from a local path or an HTTP URL.
#[derive(Clone)]
struct PathOrUrlFetcher {
    client: reqwest::Client,
}

#[async_trait]
impl SubtitleFetcher for PathOrUrlFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let resp = self.client.get(url).send().await?.error_for_status()?;
            Ok(resp.text().await?)
        } else {
            Ok(fs::read_to_string(url)?)
        }
    }
}

/// Parse `label|type|url`.
fn parse_source(spec: &str) -> Result<PlaybackSource> {
    let mut parts = spec.splitn(3, '|');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(label), Some(kind), Some(url)) if !url.is_empty() => Ok(PlaybackSource::new(
            label.trim(),
            SourceKind::from_type(kind),
            url.trim(),
        )),
        _ => Err(anyhow!("source must look like label|type|url, got {spec:?}")),
    }
}

/// Playback surface that treats a successful HTTP GET as "loaded".
async fn probe_surface(
    mut commands: mpsc::UnboundedReceiver<SurfaceCommand>,
    handle: PlayerHandle,
    client: reqwest::Client,
) {
    while let Some(command) = commands.recv().await {
        let SurfaceCommand::Show { attempt, source } = command else {
            continue;
        };
        let handle = handle.clone();
        let client = client.clone();
        tokio::spawn(async move {
            let ok = match client.get(&source.url).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(err) => {
                    debug!("probe of {} failed: {err}", source.url);
                    false
                }
            };
            let _ = if ok {
                handle.source_loaded(attempt).await
            } else {
                handle.source_errored(attempt).await
            };
        });
    }
}

async fn play(
    specs: &[String],
    subtitle: Option<String>,
    watch_secs: u64,
    config: PlayerConfig,
) -> Result<()> {
    let sources = specs
        .iter()
        .map(|s| parse_source(s))
        .collect::<Result<Vec<_>>>()?;
    let client = reqwest::Client::builder()
        .timeout(config.load_timeout)
        .build()?;
    let fetcher = PathOrUrlFetcher {
        client: client.clone(),
    };
    let (player, handle, surface) = Player::new(sources, fetcher, config);
    let session = tokio::spawn(player.run());
    tokio::spawn(probe_surface(surface, handle.clone(), client));
    if let Some(url) = subtitle {
        handle.subtitle_loader().load(url).await?;
    }

    let mut views = handle.subscribe();
    let mut last_status = String::new();
    loop {
        let view = views.borrow_and_update().clone();
        if view.status != last_status {
            println!("{}", view.status);
            last_status = view.status.clone();
        }
        match view.selection.phase {
            Phase::Playing(_) => break,
            Phase::AllFailed => {
                handle.shutdown().await?;
                session.await?;
                return Err(anyhow!("no playback source could be loaded"));
            }
            _ => views.changed().await?,
        }
    }

    // simulated playback clock driving the caption overlay
    let mut ticker = tokio::time::interval(CLOCK_TICK);
    let ticks = watch_secs * 1000 / CLOCK_TICK.as_millis() as u64;
    let mut last_caption: Option<String> = None;
    for tick in 0..=ticks {
        ticker.tick().await;
        handle.tick(tick as f64 * CLOCK_TICK.as_secs_f64()).await?;
        let caption = handle.view().caption;
        if caption != last_caption {
            if let Some(text) = &caption {
                println!("[{:>6.1}s] {}", tick as f64 * CLOCK_TICK.as_secs_f64(), text.replace('\n', " / "));
            }
            last_caption = caption;
        }
    }
    println!("{}", serde_json::to_string_pretty(&handle.view())?);
    handle.shutdown().await?;
    session.await?;
    Ok(())
}

fn cues(
    file: &Path,
    at: Option<f64>,
    offset: f64,
    shift: Option<f64>,
    out: Option<PathBuf>,
) -> Result<()> {
    let cues = srt::parse(&fs::read_to_string(file)?);
    info!("parsed {} cues from {}", cues.len(), file.display());
    if let (Some(delta), Some(out)) = (shift, out) {
        fs::write(&out, srt::format(&srt::shift(&cues, delta)))?;
        info!("wrote {}", out.display());
        return Ok(());
    }
    match at {
        Some(time) => match srt::current_cue(&cues, time + offset) {
            Some(cue) => println!("{}", cue.text),
            None => println!("(no subtitle at {time:.3}s)"),
        },
        None => {
            if cues.is_empty() {
                println!("no subtitles available");
            }
            for cue in &cues {
                println!(
                    "{:>9.3} -> {:>9.3}  {}",
                    cue.start_time,
                    cue.end_time,
                    cue.text.replace('\n', " / ")
                );
            }
        }
    }
    Ok(())
}

async fn search(store: &LocalStore, query: &str, safe: bool) -> Result<()> {
    let tmdb = TmdbClient::new()?;
    let filter = safe || store.preferences()?.filter_adult_content;
    let mut titles = tmdb.search(query).await;
    if filter {
        annotate_certifications(&tmdb, &mut titles, MediaKind::Movie).await;
    }
    for title in filter_adult(titles, filter) {
        println!(
            "{:>8}  {} ({})  [{}]  {}",
            title.id,
            title.display_title(),
            title.year().map(|y| y.to_string()).unwrap_or_else(|| "----".into()),
            title.media_type.as_deref().unwrap_or("?"),
            image_url(title.poster_path.as_deref(), ImageSize::W500)
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.debug {
        EnvFilter::default()
            .add_directive("fountain=trace".parse()?)
            .add_directive("fountain_core=trace".parse()?)
            .add_directive("info".parse()?)
    } else {
        EnvFilter::default()
            .add_directive("fountain=info".parse()?)
            .add_directive("fountain_core=info".parse()?)
            .add_directive("warn".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    run(cli).await
}

/// Dispatch one subcommand. Only the commands that read user state open the store.
async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Cues {
            file,
            at,
            offset,
            shift,
            out,
        } => cues(&file, at, offset, shift, out)?,
        Command::Search { query, safe } => {
            let store = LocalStore::open(&cli.data_dir)?;
            search(&store, &query, safe).await?
        }
        Command::Subtitles {
            tmdb_id,
            kind,
            season,
            episode,
            lang,
        } => {
            let subdl = SubdlClient::new()?;
            let query = SubtitleQuery {
                tmdb_id,
                kind,
                season,
                episode,
            };
            let listings = subdl.search(&query).await?;
            if listings.is_empty() {
                println!("no subtitles found");
            }
            for listing in filter_language(&listings, lang.as_deref()) {
                println!(
                    "{:<10} {}{}  {}",
                    listing.language_name(),
                    listing.release_name,
                    if listing.hi { " [HI]" } else { "" },
                    listing.url
                );
            }
        }
        Command::Play {
            sources,
            subtitle,
            watch_secs,
            load_timeout_secs,
            switch_delay_secs,
        } => {
            let config = PlayerConfig {
                load_timeout: Duration::from_secs(load_timeout_secs),
                switch_delay: Duration::from_secs(switch_delay_secs),
                ..PlayerConfig::default()
            };
            play(&sources, subtitle, watch_secs, config).await?;
        }
        Command::History => {
            let store = LocalStore::open(&cli.data_dir)?;
            for entry in store.continue_watching()? {
                let episode = match (entry.season, entry.episode) {
                    (Some(s), Some(e)) => format!(" S{s:02}E{e:02}"),
                    _ => String::new(),
                };
                println!("{:>5.1}%  {}{} [{}]", entry.progress, entry.title, episode, entry.kind);
            }
        }
    }
    Ok(())
}
