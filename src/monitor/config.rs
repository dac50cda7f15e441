//! Monitor configuration.

use std::path::PathBuf;
use std::time::Duration;

/// CT monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Valid SCTs from distinct logs needed before a chain counts as verified
    pub sct_threshold: usize,
    /// How long a verification call may wait for its reply
    pub call_timeout: Duration,
    /// How often expired pending calls are swept
    pub reaper_interval: Duration,
    /// Where the last accepted log list is cached, if anywhere
    pub log_list_cache_dir: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sct_threshold: 2,
            call_timeout: Duration::from_secs(5),
            reaper_interval: Duration::from_secs(1),
            log_list_cache_dir: None,
        }
    }
}

impl MonitorConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SCT threshold.
    pub fn sct_threshold(mut self, threshold: usize) -> Self {
        self.sct_threshold = threshold;
        self
    }

    /// Set the call timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the reaper interval.
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Cache accepted log lists under `dir`.
    pub fn log_list_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_list_cache_dir = Some(dir.into());
        self
    }
}
