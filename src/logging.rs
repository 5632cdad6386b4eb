use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::CodepadConfig;

/// Routes tracing output to the configured log file. `RUST_LOG` overrides
/// the configured level.
pub fn init_logging(config: &CodepadConfig) -> io::Result<()> {
    let path = config.log_file()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let filter = build_filter(&config.logging.level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(io::Error::other)
}

fn build_filter(level: &str) -> io::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}
