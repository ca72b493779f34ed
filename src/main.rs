use anyhow::{Context, Result};
use resource_log::logging;
use resource_log::utils::config;
use resource_log::{ResourceLogger, SysinfoSource};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; PATH_LOG_VIRTUAL may come from the real environment
    dotenvy::dotenv().ok();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    let timestamp = logging::run_timestamp();
    let logger = logging::configure(&config.log_dir, &timestamp, &config.logging)
        .with_context(|| format!("unable to set up logging in {}", config.log_dir.display()))?;
    logger.install_global()?;

    info!("Starting resource-log v{}", env!("CARGO_PKG_VERSION"));
    info!("CPU cores available: {}", num_cpus::get());
    info!("Writing logs to {}", config.log_dir.display());

    info!("This is an INFO log.");
    debug!("This is a DEBUG log.");
    error!("This is an ERROR log.");

    let mut reporter = ResourceLogger::new(SysinfoSource::with_disk_path(&config.disk_path))
        .with_options(config.sample_options());

    let options = *reporter.options();
    let snapshot = reporter.sampler_mut().sample_with(&options)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    reporter.log_once()?;

    if config.sample_interval_secs > 0 {
        let interval = Duration::from_secs(config.sample_interval_secs);
        info!("Sampling resources every {}", humantime::format_duration(interval));

        tokio::select! {
            _ = reporter.run(interval) => {},
            _ = shutdown_signal() => {},
        }
    }

    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
