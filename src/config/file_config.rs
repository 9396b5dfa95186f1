use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub user_id: Option<String>,

    // Feature configs
    pub sync: Option<SyncConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub poll_interval_secs: Option<u64>,
    pub notification_poll_interval_secs: Option<u64>,
    pub use_cache: Option<bool>,
    pub reminder_window_hours: Option<u64>,
    pub scan_min_interval_secs: Option<u64>,
    pub error_surface_threshold: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_file() {
        let config: FileConfig = toml::from_str(
            r#"
            db_path = "/var/lib/schoolhub/school.db"
            user_id = "t-1"

            [sync]
            poll_interval_secs = 10
            use_cache = false
            reminder_window_hours = 48
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path.as_deref(), Some("/var/lib/schoolhub/school.db"));
        assert_eq!(config.user_id.as_deref(), Some("t-1"));
        let sync = config.sync.unwrap();
        assert_eq!(sync.poll_interval_secs, Some(10));
        assert_eq!(sync.use_cache, Some(false));
        assert_eq!(sync.reminder_window_hours, Some(48));
        assert!(sync.scan_min_interval_secs.is_none());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_path.is_none());
        assert!(config.sync.is_none());
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_secs = ").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
        assert!(FileConfig::load(Path::new("/nonexistent/schoolhub.toml")).is_err());
    }
}
