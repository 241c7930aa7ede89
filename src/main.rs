use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};

use listener_rating::config::Config;
use listener_rating::http::{JsonClient, UreqTransport};
use listener_rating::kodi::KodiClient;
use listener_rating::lastfm::LastfmResolver;
use listener_rating::library::SqliteLibrary;
use listener_rating::orchestrator::AlbumProcessor;
use listener_rating::progress::{format_duration, set_log_only};

const LIBRARY_FILE_NAME: &str = "library.db";

#[derive(Parser)]
#[command(name = "listener-rating")]
#[command(about = "Rate tracks and albums from Last.fm listener counts and sync them to Kodi")]
struct Args {
    /// Config file (default: <config dir>/listener-rating/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Library database (default: <data dir>/listener-rating/library.db)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Hide progress bars, log progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch listener counts and rate every matching album.
    Rate {
        /// Compute and log ratings without storing or pushing anything
        #[arg(long, alias = "dry-run")]
        pretend: bool,

        /// Only albums whose artist or title contains every term
        query: Vec<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut clog = colog::default_builder();
    clog.filter(None, level);
    clog.init();
}

fn library_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let dir = dirs::data_dir()
        .context("No data directory on this platform; pass --library")?
        .join("listener-rating");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir.join(LIBRARY_FILE_NAME))
}

fn json_client(config: &Config) -> JsonClient {
    JsonClient::new(Box::new(UreqTransport::new()), config.retry_policy(), config.timeout())
        .with_debug_api(config.debug_api)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    set_log_only(args.log_only);

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if config.lastfm_settings().api_key.is_none() {
        warn!("No Last.fm API key configured; every track will get 0 listeners");
    }

    let library_path = library_path(args.library)?;
    let library = SqliteLibrary::open(&library_path)?;
    info!("Library: {}", library_path.display());

    match args.command {
        Command::Rate { pretend, query } => {
            let lookup = LastfmResolver::new(config.lastfm_settings(), json_client(&config));
            let sink = KodiClient::new(config.kodi_settings(), json_client(&config));
            let processor = AlbumProcessor::new(&lookup, &sink, config.rating_engine(), pretend);

            let summary = processor.run(&library, &query)?;
            println!(
                "{}{} album(s), {} track(s) rated, {} Kodi update(s) in {}",
                if pretend { "[Pretend] " } else { "" },
                summary.albums,
                summary.tracks,
                summary.pushes,
                format_duration(summary.elapsed)
            );
        }
    }

    Ok(())
}
