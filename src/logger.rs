// =============================================================================
// Logger setup — tracing subscriber wired from the `logger` config block
// =============================================================================

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggerConfig;

/// Install the global tracing subscriber.
///
/// `level` feeds an `EnvFilter` (so `info` as well as full directives like
/// `pricefeed=debug` work); `to_stdout` / `to_file` select the writer. An
/// unreadable log file is a startup error.
pub fn init(cfg: &LoggerConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (cfg.to_stdout, cfg.to_file) {
        (true, false) => builder.init(),
        (false, false) => builder.with_writer(std::io::sink).init(),
        (to_stdout, true) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&cfg.file_path)
                .with_context(|| format!("could not open log file {}", cfg.file_path))?;
            let file = Arc::new(file);

            if to_stdout {
                builder.with_writer(std::io::stdout.and(file)).init();
            } else {
                builder.with_writer(file).init();
            }
        }
    }

    Ok(())
}
