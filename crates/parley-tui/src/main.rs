//! Parley terminal client entry point.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use clap::Parser;
use parley_app::{Prefs, RedbPrefs, Runtime, prefs::PrefKey};
use parley_client::{
    ClientConfig,
    transport::{HttpClient, ServerUrls},
};
use parley_core::{Identity, RoomCode};
use parley_tui::{SystemEnv, TerminalDriver};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley terminal client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Terminal client for Parley chat rooms")]
#[command(version)]
struct Args {
    /// Server base URL, or `auto` for http://localhost:5000
    #[arg(short, long, env = "PARLEY_SERVER_URL", default_value = "auto")]
    server: String,

    /// Display name to pre-fill on the entry page
    #[arg(short, long)]
    name: Option<String>,

    /// Room code to pre-fill on the entry page
    #[arg(short, long)]
    room: Option<String>,

    /// Directory for preferences, downloads, and the default log file
    #[arg(long, env = "PARLEY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log file. The terminal belongs to the UI, so logs never go to stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => directories::ProjectDirs::from("", "", "parley")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or("cannot determine a data directory; pass --data-dir")?,
    };
    let downloads = data_dir.join("downloads");
    fs::create_dir_all(&downloads)?;

    let log_file = args.log_file.unwrap_or_else(|| data_dir.join("parley.log"));
    init_logging(&log_file, &args.log_level)?;

    let urls = ServerUrls::resolve(&args.server)?;
    let config = ClientConfig::default();
    let http = HttpClient::new(urls.clone(), config.connection.attempt_timeout)?;

    let prefs = RedbPrefs::open(data_dir.join("prefs.redb"))?;
    if let Some(name) = &args.name {
        prefs.set(PrefKey::Identity, &Identity::parse(name)?.as_str())?;
    }
    if let Some(room) = &args.room {
        prefs.set(PrefKey::RoomCode, &RoomCode::parse(room)?.as_str())?;
    }

    tracing::info!(server = urls.base(), data_dir = %data_dir.display(), "starting");

    let driver = TerminalDriver::new(http, config.connection.clone(), downloads)?;
    let runtime = Runtime::new(driver, SystemEnv::new(), config, prefs, urls.base().to_string());

    let result = runtime.run().await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "terminal driver failed");
    }
    tracing::info!("exiting");
    Ok(result?)
}

/// Send logs to `path`, filtered by `RUST_LOG` or `level`.
fn init_logging(path: &Path, level: &str) -> Result<(), std::io::Error> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(filter)
        .init();
    Ok(())
}
