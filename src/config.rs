use std::path::{Path, PathBuf};
use std::time::Duration;

/// Library configuration. `db_path` and `thumbnail_path` are required;
/// everything else ships with the documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the catalogue database file.
    pub db_path: PathBuf,
    /// Directory receiving generated thumbnails.
    pub thumbnail_path: PathBuf,
    /// How long the probe stage waits for the decoder callback.
    pub probe_timeout: Duration,
    /// Stage retries before a task degrades to Fatal.
    pub parser_retry_max: u32,
    /// Soft cap on each stage queue; producers block when full.
    pub stage_queue_cap: usize,
    /// Per-connection prepared statement LRU capacity.
    pub stmt_cache_size: usize,
    /// Grace period granted to workers on shutdown.
    pub shutdown_grace: Duration,
    /// Persist sample aspect ratio from video probes. Off unless the
    /// embedding application opts in.
    pub emit_sar: bool,
}

impl Config {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(db_path: P, thumbnail_path: Q) -> Config {
        Config {
            db_path: db_path.as_ref().to_path_buf(),
            thumbnail_path: thumbnail_path.as_ref().to_path_buf(),
            probe_timeout: Duration::from_millis(5000),
            parser_retry_max: 3,
            stage_queue_cap: 1000,
            stmt_cache_size: 32,
            shutdown_grace: Duration::from_secs(10),
            emit_sar: false,
        }
    }
}
