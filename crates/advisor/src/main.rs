//! Move advisor
//!
//! Watches a position file, asks a UCI engine for moves and prints
//! suggestions as JSON lines on stdout. Logs go to stderr.

use tracing::{error, info};

use advisor::engine::{EngineSession, UciProcess};
use advisor::output::{MoveFilter, OutputBuffer};
use advisor::presenter::ConsolePresenter;
use advisor::scheduler::AnalysisScheduler;
use advisor::source::FileSource;
use advisor::{AdvisorConfig, PositionWatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = AdvisorConfig::load()?;
    info!(
        stockfish_path = %config.stockfish_path,
        snapshot_path = %config.snapshot_path,
        level = %config.level,
        mode = %config.mode,
        prefetch = config.prefetch,
        "Config loaded"
    );

    let session = EngineSession::new(
        Box::new(UciProcess::new(&config.stockfish_path)),
        config.session_config(),
    );
    let scheduler = AnalysisScheduler::new(config.watchdog(), config.prefetch_config());
    let buffer = OutputBuffer::new(MoveFilter::from_entropy());

    let mut watcher = PositionWatcher::new(
        FileSource::new(&config.snapshot_path),
        ConsolePresenter::new(std::io::stdout()),
        session,
        scheduler,
        buffer,
        config.settings(),
    );

    if let Err(e) = watcher.start_engine() {
        error!(error = %e, "Engine could not be started");
        return Err(e.into());
    }

    watcher.run(config.poll_interval, shutdown_signal()).await;
    info!("Advisor stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C");
    }
}
