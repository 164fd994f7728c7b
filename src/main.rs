//! beatcam - clock-synchronized camera effects

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beatcam::config::AppConfig;
use beatcam::{app, monitor, paths};

/// Live camera effects driven by an external MIDI clock
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write daily-rotated log files into this directory
    #[arg(long, env = "BEATCAM_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Print incoming clock messages and the decoded song position
    #[arg(long)]
    monitor: bool,

    /// Drive the clock from an in-process source at this tempo
    #[arg(long)]
    simulate_bpm: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Dropping the guard flushes the file writer
    let _guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    let config_path = args.config.clone().unwrap_or_else(paths::default_config_path);
    info!("Starting beatcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());

    if args.list_ports {
        let config = load_or_default(&config_path).await?;
        return monitor::list_ports(&config.midi.client_name);
    }

    if args.monitor {
        let mut config = load_or_default(&config_path).await?;
        config.midi.enabled = true;
        let (access, simulator) = app::clock_access(&config, args.simulate_bpm);
        if let Some(access) = access {
            monitor::run_monitor(access, simulator).await?;
        }
        return Ok(());
    }

    app::run(config_path, args.simulate_bpm).await?;

    info!("beatcam shutdown complete");
    Ok(())
}

async fn load_or_default(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(&path.to_string_lossy()).await
    } else {
        Ok(AppConfig::default())
    }
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "beatcam.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    Ok(guard)
}
