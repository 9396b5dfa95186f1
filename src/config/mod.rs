mod file_config;

pub use file_config::{FileConfig, SyncConfig};

use crate::notifications::{default_reminder_window, ScanSettings, DEFAULT_SCAN_MIN_INTERVAL};
use crate::sync::{SyncOptions, DEFAULT_ERROR_SURFACE_THRESHOLD, DEFAULT_POLL_INTERVAL};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub user_id: Option<String>,
    pub poll_interval_secs: u64,
    pub notification_poll_interval_secs: u64,
    pub scan_min_interval_secs: u64,
    pub reminder_window_hours: u64,
    pub error_surface_threshold: usize,
    pub no_cache: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            user_id: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            notification_poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            scan_min_interval_secs: DEFAULT_SCAN_MIN_INTERVAL.as_secs(),
            reminder_window_hours: default_reminder_window().num_hours() as u64,
            error_surface_threshold: DEFAULT_ERROR_SURFACE_THRESHOLD,
            no_cache: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub user_id: String,
    pub sync: SyncSettings,
}

/// Timing and caching knobs of a sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub notification_poll_interval: Duration,
    pub use_cache: bool,
    pub reminder_window: chrono::Duration,
    pub scan_min_interval: Duration,
    /// Failing sources needed before an error is shown to the user
    pub error_surface_threshold: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            notification_poll_interval: DEFAULT_POLL_INTERVAL,
            use_cache: true,
            reminder_window: default_reminder_window(),
            scan_min_interval: DEFAULT_SCAN_MIN_INTERVAL,
            error_surface_threshold: DEFAULT_ERROR_SURFACE_THRESHOLD,
        }
    }
}

impl SyncSettings {
    /// Options for data synchronizers.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::default()
            .with_interval(self.poll_interval)
            .with_cache(self.use_cache)
    }

    /// Options for the notification list, which is never cached.
    pub fn notification_options(&self) -> SyncOptions {
        SyncOptions::notifications().with_interval(self.notification_poll_interval)
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            min_interval: self.scan_min_interval,
            reminder_window: self.reminder_window,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than zero");
        }
        if self.notification_poll_interval.is_zero() {
            bail!("notification_poll_interval must be greater than zero");
        }
        if self.scan_min_interval.is_zero() {
            bail!("scan_min_interval must be greater than zero");
        }
        if self.reminder_window <= chrono::Duration::zero() {
            bail!("reminder_window must be greater than zero");
        }
        if self.error_surface_threshold == 0 {
            bail!("error_surface_threshold must be at least 1");
        }
        Ok(())
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified on the command line or in config file")
            })?;

        // The database file itself is created on first run, its directory is not
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let user_id = file
            .user_id
            .or_else(|| cli.user_id.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("user_id must be specified via --user-id or in config file")
            })?;

        let sync_file = file.sync.unwrap_or_default();
        let reminder_window_hours = sync_file
            .reminder_window_hours
            .unwrap_or(cli.reminder_window_hours);
        let Some(reminder_window) = i64::try_from(reminder_window_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
        else {
            bail!(
                "reminder_window_hours is out of range: {}",
                reminder_window_hours
            );
        };
        let sync = SyncSettings {
            poll_interval: Duration::from_secs(
                sync_file.poll_interval_secs.unwrap_or(cli.poll_interval_secs),
            ),
            notification_poll_interval: Duration::from_secs(
                sync_file
                    .notification_poll_interval_secs
                    .unwrap_or(cli.notification_poll_interval_secs),
            ),
            use_cache: sync_file.use_cache.unwrap_or(!cli.no_cache),
            reminder_window,
            scan_min_interval: Duration::from_secs(
                sync_file
                    .scan_min_interval_secs
                    .unwrap_or(cli.scan_min_interval_secs),
            ),
            error_surface_threshold: sync_file
                .error_surface_threshold
                .unwrap_or(cli.error_surface_threshold),
        };
        sync.validate()?;

        Ok(AppConfig {
            db_path,
            user_id,
            sync,
        })
    }
}
