use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod catalog;
mod client;
mod config;
mod deadline;
mod error;
mod llm;
mod models;
mod playlist;
mod prompt;
mod rate_limit;


use crate::catalog::{CacheStore, CatalogProvider, FileCacheStore, LabelMatcher, MemoryCacheStore};
use crate::client::SpotifyClient;
use crate::config::load_config;
use crate::deadline::Deadline;
use crate::error::{ErrorKind, PipelineError};
use crate::llm::build_model;
use crate::playlist::{
    GeneratedPlaylist, GenerationRequest, PlaylistGenerator, PlaylistMetadata, SelectionConfig,
    StrategyKind, TempoPolicy, publish_playlist,
};
use crate::prompt::ActivityTable;

#[derive(Parser)]
#[command(name = "label-playlist-generator")]
#[command(about = "Generate playlists from a record label's catalog out of a natural-language prompt")]
#[command(version)]
struct Args {
    /// What the playlist is for, e.g. "playlist para correr 30 minutos"
    prompt: String,

    /// Path to an optional selection settings JSON file
    #[arg(short = 'c', long = "config")]
    config_file: Option<String>,

    /// Override the strategy: criteria, specific-tracks or catalog-pick
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Override the tempo policy: strict or relaxed
    #[arg(long = "tempo-policy")]
    tempo_policy: Option<TempoPolicy>,

    /// Rebuild the label catalog even if the cache is fresh
    #[arg(long = "refresh-catalog")]
    refresh_catalog: bool,

    /// Keep the catalog in memory only, without reading or writing the cache file
    #[arg(long = "no-cache")]
    no_cache: bool,

    /// Print the playlist without creating it on the streaming service
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Create the playlist as private
    #[arg(long)]
    private: bool,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Quiet mode - reduce output verbosity
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn init_tracing(debug: bool, quiet: bool) {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn exit_code(kind: ErrorKind) -> ExitCode {
    match kind {
        ErrorKind::UserInput => ExitCode::from(2),
        ErrorKind::Transient => ExitCode::from(3),
        ErrorKind::EmptyResult => ExitCode::from(4),
        ErrorKind::Fatal => ExitCode::FAILURE,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.debug, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<PipelineError>() {
            Some(pipeline) => {
                debug!(error = %pipeline, "Pipeline failed");
                eprintln!("✗ {}", pipeline.user_message());
                exit_code(pipeline.kind())
            }
            None => {
                eprintln!("✗ {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run(args: &Args) -> Result<()> {
    // Load configuration from .env
    let config = load_config()?;

    let mut selection = match &args.config_file {
        Some(path) => SelectionConfig::load_from_file(path)?,
        None => SelectionConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        selection.strategy = strategy;
    }
    if let Some(policy) = args.tempo_policy {
        selection.tempo_policy = policy;
    }

    let activities = match &config.activities_file {
        Some(path) => ActivityTable::load_from_file(path)?,
        None => ActivityTable::builtin(),
    };

    let client = SpotifyClient::new(&config);
    let label = LabelMatcher::new(&config.label, &config.label_variants);
    let store: Box<dyn CacheStore> = if args.no_cache {
        Box::new(MemoryCacheStore::new())
    } else {
        Box::new(FileCacheStore::new(&config.cache_path))
    };
    let provider = CatalogProvider::new(&client, store.as_ref(), &label, selection.catalog_settings());
    let model = build_model(&config.llm);
    debug!(model = %model.name(), strategy = %selection.strategy, "Pipeline ready");

    let catalog = if args.refresh_catalog {
        Some(provider.refresh()?)
    } else {
        None
    };

    let deadline = Deadline::after(config.deadline);
    debug!(remaining = ?deadline.remaining(), "Request deadline set");
    let generator = PlaylistGenerator::new(
        &client,
        &provider,
        model.as_ref(),
        &label,
        &activities,
        &selection,
    )
    .with_deadline(deadline);

    let playlist = generator.generate(GenerationRequest {
        prompt: args.prompt.clone(),
        catalog,
        taste: None,
    })?;
    debug!(applied = %playlist.applied, "Constraints used for selection");
    print_playlist(&playlist, args.quiet);

    if args.dry_run {
        println!("\nDry run - playlist not created.");
        return Ok(());
    }
    let Some(user_id) = &config.user_id else {
        warn!("SPOTIFY_USER_ID is not set, skipping playlist creation");
        return Ok(());
    };

    let published = publish_playlist(
        &client,
        user_id,
        &playlist.name,
        &playlist.description,
        &playlist.tracks,
        !args.private,
    )
    .context("creating the playlist")?;
    debug!(playlist_id = %published.id, added = published.added, "Published playlist");

    if published.failed_batches > 0 {
        println!(
            "⚠ Created playlist with {}/{} tracks: {}",
            published.added,
            playlist.tracks.len(),
            published.url
        );
    } else {
        println!("✓ Created playlist: {}", published.url);
    }
    Ok(())
}

fn print_playlist(playlist: &GeneratedPlaylist, quiet: bool) {
    let metadata = PlaylistMetadata::from_tracks(&playlist.tracks);

    println!("\n{}", playlist.name);
    println!("{}", "=".repeat(playlist.name.chars().count()));
    println!("{}", playlist.description);
    println!(
        "   Tracks: {} | Duration: {} | Unique Artists: {} | Strategy: {}",
        metadata.total_tracks,
        metadata.formatted_duration(),
        metadata.artist_count,
        playlist.strategy
    );
    if let (Some((min, max)), Some(average)) = (metadata.tempo_range, metadata.average_tempo) {
        println!("   Tempo: {min:.0}-{max:.0} bpm (avg {average:.0})");
    }
    if let Some(range) = &playlist.criteria.bpm_range {
        println!("   Target BPM: {range}");
    }
    for warning in &playlist.warnings {
        println!("   ⚠ {warning}");
    }

    if quiet {
        return;
    }
    println!();
    for (i, track) in playlist.tracks.iter().enumerate() {
        let tempo = track
            .tempo
            .map(|t| format!(" [{t:.0}bpm]"))
            .unwrap_or_default();
        let seconds = track.duration_ms / 1000;
        println!(
            "   {}. \"{}\" by {}{} {}:{:02}",
            i + 1,
            track.name,
            track.artist,
            tempo,
            seconds / 60,
            seconds % 60
        );
    }
}
