//! Logging setup

use color_eyre::eyre::{eyre, Result, WrapErr};
use std::fmt;
use std::fs::File;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt, util::SubscriberInitExt,
    Registry,
};

/// Wall-clock time of day as `HH:MM:SS`.
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let total_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;
        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Sends the log to `output_path` (without colours) or to stdout.
pub fn setup_output(output_path: Option<&String>) -> Result<()> {
    match output_path {
        Some(path) => {
            let log = File::create(path).wrap_err_with(|| format!("Could not create output file: {}", path))?;
            let file_layer = layer()
                .with_writer(log)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(false);
            Registry::default()
                .with(file_layer)
                .try_init()
                .map_err(|e| eyre!("Could not install the logger: {}", e))?;
            info!("Output written to: {}", path);
        }
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default()
                .with(stdout_layer)
                .try_init()
                .map_err(|e| eyre!("Could not install the logger: {}", e))?;
        }
    }
    Ok(())
}
