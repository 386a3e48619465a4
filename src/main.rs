use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mattone::api::ApiServerBuilder;
use mattone::config::{self, file::load_config_file};
use mattone::db::{self, ChannelRepo};
use mattone::{Config, PlaylistImporter};

/// Mattone - remote playback control and channel catalog service
#[derive(Parser)]
#[command(name = "mattone", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides config)
    #[arg(long, env = "MATTONE_DB_PATH")]
    database: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Import an M3U playlist into the channel catalog
    Import {
        /// Playlist URL (http or https)
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity, RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,mattone=info",
        1 => "info,mattone=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Import { url }) => import(cli.database, &url).await,
        Some(Command::Serve) | None => serve(cli.port, cli.database).await,
    }
}

async fn serve(port: Option<u16>, database: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(path) = database {
        config.database_path = path;
    }
    tracing::debug!(?config, "loaded configuration");

    tracing::info!(
        port = config.server.port,
        database = %config.database_path.display(),
        issuer = %config.cognito.issuer(),
        "starting mattone"
    );

    let pool = db::init(&config.database_path)?;

    let server = ApiServerBuilder::new(pool, config.cognito, config.server.port)
        .dispatch_timeout(config.server.dispatch_timeout)
        .heartbeat_interval(config.server.heartbeat_interval)
        .rate_limit_rpm(config.server.rate_limit_rpm)
        .build();

    let handle = server.spawn();

    tokio::select! {
        result = handle => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

async fn import(database: Option<PathBuf>, url: &str) -> anyhow::Result<()> {
    // Offline import needs only the store, not the identity provider settings
    let path = database
        .or_else(|| load_config_file().database.path.map(PathBuf::from))
        .unwrap_or_else(config::default_database_path);

    let pool = db::init(&path)?;
    let importer = PlaylistImporter::new(ChannelRepo::new(pool));

    let summary = importer.import(url).await?;
    println!(
        "Imported {} channels from {}",
        summary.imported_count, summary.source_url
    );

    Ok(())
}
