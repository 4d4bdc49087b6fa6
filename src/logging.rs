//! Logging configuration with journald support on Linux.
//!
//! On Linux the systemd journal is used when it is reachable. Otherwise logs
//! go to a daily-rolling file when a log directory is given, or to stderr.
//!
//! Log level can be controlled via the `CLIPSERVE_LOG` environment variable
//! (e.g. `CLIPSERVE_LOG=debug` or `CLIPSERVE_LOG=clipserve=debug,tower_http=info`).
//! The default is `info`.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Keeps the file writer flushing for the life of the process
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("CLIPSERVE_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system. Call once at startup.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if log_dir.is_none() {
            if let Ok(journald_layer) = tracing_journald::layer() {
                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(journald_layer)
                    .try_init()?;

                tracing::info!("Logging initialized with journald backend");
                return Ok(());
            }
        }
    }

    match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = tracing_appender::rolling::daily(&log_dir, "clipserve.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = GUARD.set(guard);

            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()?;

            tracing::info!("Logging initialized with file backend at {:?}", log_dir);
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
