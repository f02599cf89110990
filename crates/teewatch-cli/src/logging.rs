use anyhow::Result;
use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// 0 = info, 1 = debug (chromiumoxide and hyper kept at warn), 2+ = trace
fn build_filter(verbose_level: u8, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }

    let default = match verbose_level {
        0 => "info,chromiumoxide=warn",
        1 => "debug,chromiumoxide=warn,hyper=warn,tungstenite=warn",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

pub fn init_logging_with_file(verbose_level: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let json = std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stderr().is_terminal());

    let stderr_layer = if json {
        fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr)
            .boxed()
    };

    // Files are named teewatch.YYYY-MM-DD for a log_file of teewatch.log
    let file_layer = match log_file {
        Some(log_path) => {
            let log_dir = log_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&log_dir)?;

            let log_filename = log_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("Invalid log filename: {}", log_path.display()))?;
            let log_prefix = log_filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(log_filename);

            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, log_prefix);
            Some(
                fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(file_appender)
                    .boxed(),
            )
        }
        None => None,
    };

    Registry::default()
        .with(build_filter(verbose_level, quiet))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    Ok(())
}
