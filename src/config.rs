use crate::platform::page_size;
use std::time::Duration;
use tracing::warn;

// Output buffer per supervised process (64KiB)
// Must be a multiple of the platform page size
pub const DEFAULT_BUFFER_CAPACITY: usize = 0x10000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

pub const DEFAULT_APPS_FILE: &str = "./res/apps.json";

pub const POLL_INTERVAL_ENV: &str = "APP_WARDEN_POLL_INTERVAL_MS";
pub const BUFFER_SIZE_ENV: &str = "APP_WARDEN_BUFFER_SIZE";
pub const SHUTDOWN_TIMEOUT_ENV: &str = "APP_WARDEN_SHUTDOWN_TIMEOUT_MS";

/// Knobs shared by every process launched from one [`crate::ProcessList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Capacity of each process's output buffer in bytes.
    pub buffer_capacity: usize,
    /// Sleep between two drain ticks.
    pub poll_interval: Duration,
    /// How long dropping a handle waits for its drain thread before detaching it.
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SupervisorSettings {
    /// Defaults with environment-variable overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(ms) = parse_positive(&lookup, POLL_INTERVAL_ENV) {
            settings.poll_interval = Duration::from_millis(ms);
        }
        if let Some(size) = parse_positive(&lookup, BUFFER_SIZE_ENV) {
            let granularity = page_size();
            if size as usize % granularity == 0 {
                settings.buffer_capacity = size as usize;
            } else {
                warn!(
                    "Ignoring {}={}: must be a multiple of the page size ({})",
                    BUFFER_SIZE_ENV, size, granularity
                );
            }
        }
        if let Some(ms) = parse_positive(&lookup, SHUTDOWN_TIMEOUT_ENV) {
            settings.shutdown_timeout = Duration::from_millis(ms);
        }
        settings
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!("Ignoring {}={:?}: expected a positive integer", key, raw);
            None
        }
        Ok(value) => Some(value),
    }
}
