use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use schoolhub_sync::config::{AppConfig, CliConfig, FileConfig};
use schoolhub_sync::entities::{map_records, User};
use schoolhub_sync::notifications::DEFAULT_SCAN_MIN_INTERVAL;
use schoolhub_sync::sync::{queries, DEFAULT_ERROR_SURFACE_THRESHOLD, DEFAULT_POLL_INTERVAL};
use schoolhub_sync::{DocumentStore, SqliteDocumentStore, SyncSession, SystemClock};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite document database file. Created if missing.
    #[clap(value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Id of the user whose dashboard is kept live.
    #[clap(long)]
    pub user_id: Option<String>,

    /// Path to a TOML config file. Values in the file override command line values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Seconds between two polls of a data query.
    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval_secs: u64,

    /// Seconds between two polls of the notification list.
    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub notification_poll_interval_secs: u64,

    /// Minimum seconds between two notification scans.
    #[clap(long, default_value_t = DEFAULT_SCAN_MIN_INTERVAL.as_secs())]
    pub scan_min_interval_secs: u64,

    /// Hours before the due date at which reminders are created.
    #[clap(long, default_value_t = 24)]
    pub reminder_window_hours: u64,

    /// Number of simultaneously failing sources before an error is reported.
    #[clap(long, default_value_t = DEFAULT_ERROR_SURFACE_THRESHOLD)]
    pub error_surface_threshold: usize,

    /// Never seed synchronizers from the local result cache.
    #[clap(long)]
    pub no_cache: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            user_id: self.user_id.clone(),
            poll_interval_secs: self.poll_interval_secs,
            notification_poll_interval_secs: self.notification_poll_interval_secs,
            scan_min_interval_secs: self.scan_min_interval_secs,
            reminder_window_hours: self.reminder_window_hours,
            error_surface_threshold: self.error_surface_threshold,
            no_cache: self.no_cache,
        }
    }
}

async fn load_user(store: &dyn DocumentStore, user_id: &str) -> Result<User> {
    let records = store
        .fetch(&queries::user_by_id(user_id))
        .await
        .with_context(|| format!("Failed to load user {}", user_id))?;
    match map_records::<User>(records).into_iter().next() {
        Some(user) => Ok(user),
        None => bail!("User {} not found", user_id),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening SQLite document database at {:?}...", config.db_path);
    let store = Arc::new(SqliteDocumentStore::new(&config.db_path)?);

    let user = load_user(store.as_ref(), &config.user_id).await?;
    info!("Syncing dashboard of {} ({})", user.name, user.role.as_str());

    let session = SyncSession::new(store, Arc::new(SystemClock), config.sync.clone());
    let dashboard = session.dashboard(&user);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
            snapshot = dashboard.notifications.changed() => {
                let unread = dashboard.unread_count();
                info!(
                    "{} notifications, {} unread",
                    snapshot.items().len(),
                    unread
                );
                if let Some(error) = session.user_facing_error() {
                    warn!("{}", error);
                }
            }
        }
    }

    info!("Shutting down...");
    drop(dashboard);
    session.teardown();
    Ok(())
}
