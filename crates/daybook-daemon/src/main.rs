//! Daybook Daemon - Background backup and maintenance service
//!
//! This binary runs as a user service and handles:
//! - Periodic auto-backup of notes to the remote app folder
//! - Tag and orphan media cleanup
//! - Retrying queued media copies
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! `--backup-now` and `--restore` run a single backup or restore and exit.
//!
//! # Architecture
//!
//! The daemon opens the database, wires the remote store and the backup
//! coordinator, then spawns one `JobRunner` per periodic job. All runners
//! share a `CancellationToken` that is triggered on SIGTERM or SIGINT.

mod conditions;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use daybook_cache::{DatabasePool, SqliteNoteRepository, SqlitePreferenceStore};
use daybook_core::{
    config::{Config, LoggingConfig, TokenStoreKind},
    domain::SyncState,
    ports::{IDeviceConditions, INoteRepository, IPreferenceStore, IRemoteFileStore, ITokenStore},
};
use daybook_drive::{
    auth::{KeyringTokenStorage, OAuth2Config, RefreshClient},
    authenticator::{AuthorizedHttp, TokenAuthenticator},
    client::DriveClient,
    provider::DriveRemoteStore,
};
use daybook_sync::{
    coordinator::BackupCoordinator,
    jobs::{AutoBackupJob, CleanupJob, JobRunner, PendingMediaJob, RetryPolicy},
    lock::LockSession,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use conditions::HostConditions;

/// Timeout of the TCP connect used as the network check
const NETWORK_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "daybookd", version, about = "Daybook backup daemon")]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one backup and exit
    #[arg(long, conflicts_with = "restore")]
    backup_now: bool,

    /// Restore notes from the remote backup and exit
    #[arg(long)]
    restore: bool,
}

// ============================================================================
// DaemonService
// ============================================================================

/// Wired-up stores, coordinator and lock session
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    notes: Arc<SqliteNoteRepository>,
    preferences: Arc<SqlitePreferenceStore>,
    /// `None` when no OAuth client is configured
    coordinator: Option<Arc<BackupCoordinator>>,
    lock: LockSession,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database and builds the remote stack
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage.media_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create media directory {}",
                    config.storage.media_dir.display()
                )
            })?;

        let db_pool = DatabasePool::new(&config.storage.database_path)
            .await
            .context("Failed to open database")?;
        let notes = Arc::new(SqliteNoteRepository::new(db_pool.pool().clone()));
        let preferences = Arc::new(SqlitePreferenceStore::new(db_pool.pool().clone()));

        let coordinator = build_coordinator(&config, notes.clone(), preferences.clone())?;
        let lock = LockSession::new(
            preferences.clone(),
            Duration::from_secs(config.lock.relock_delay_secs),
        );

        Ok(Self {
            config,
            db_pool,
            notes,
            preferences,
            coordinator: coordinator.map(Arc::new),
            lock,
            shutdown,
        })
    }

    fn coordinator(&self) -> Result<&Arc<BackupCoordinator>> {
        self.coordinator
            .as_ref()
            .context("Remote backup is not configured (set drive.client_id)")
    }

    /// Runs one manual backup
    async fn backup_once(&self) -> Result<()> {
        let synced = self.coordinator()?.backup_now().await?;
        info!(synced, "Backup finished");
        Ok(())
    }

    /// Runs one restore
    async fn restore_once(&self) -> Result<()> {
        let restored = self.coordinator()?.restore().await?;
        info!(restored, "Restore finished");
        Ok(())
    }

    /// Spawns the job runners and waits for shutdown
    async fn run(&self) -> Result<()> {
        self.lock.start().await.context("Failed to start lock session")?;

        let conditions: Arc<dyn IDeviceConditions> = Arc::new(HostConditions::new(
            &self.config.drive.api_base_url,
            NETWORK_PROBE_TIMEOUT,
        ));
        let mut handles = self.spawn_jobs(conditions);

        if let Some(coordinator) = &self.coordinator {
            handles.push(spawn_state_logger(
                coordinator.subscribe(),
                self.shutdown.clone(),
            ));
        }

        info!(jobs = handles.len(), "Daemon running");
        self.shutdown.cancelled().await;
        info!("Shutdown requested, waiting for jobs");

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Job task ended abnormally");
            }
        }

        self.lock.stop();
        self.db_pool.close().await;
        Ok(())
    }

    fn spawn_jobs(&self, conditions: Arc<dyn IDeviceConditions>) -> Vec<JoinHandle<()>> {
        let jobs_config = &self.config.jobs;
        let policy = RetryPolicy::from_config(jobs_config);
        let poll = Duration::from_secs(jobs_config.constraint_poll_secs);
        let notes: Arc<dyn INoteRepository> = self.notes.clone();
        let media_dir = self.config.storage.media_dir.clone();

        let cleanup = CleanupJob::new(notes.clone(), media_dir.clone())
            .with_interval(hours(jobs_config.cleanup_interval_hours));
        let pending = PendingMediaJob::new(
            notes,
            media_dir,
            jobs_config.pending_media_max_attempts,
        )
        .with_interval(hours(jobs_config.pending_media_interval_hours));

        let mut runners = vec![
            JobRunner::new(Arc::new(cleanup), conditions.clone(), self.shutdown.clone()),
            JobRunner::new(Arc::new(pending), conditions.clone(), self.shutdown.clone()),
        ];

        match &self.coordinator {
            Some(coordinator) => {
                let preferences: Arc<dyn IPreferenceStore> = self.preferences.clone();
                let auto_backup = AutoBackupJob::new(
                    coordinator.clone(),
                    preferences,
                    self.config.default_backup_period(),
                );
                runners.push(JobRunner::new(
                    Arc::new(auto_backup),
                    conditions,
                    self.shutdown.clone(),
                ));
            }
            None => warn!("No OAuth client configured, auto-backup disabled"),
        }

        runners
            .into_iter()
            .map(|runner| {
                runner
                    .with_policy(policy)
                    .with_poll_interval(poll)
                    .spawn()
            })
            .collect()
    }
}

/// Builds the authenticated Drive stack and the coordinator on top of it
fn build_coordinator(
    config: &Config,
    notes: Arc<SqliteNoteRepository>,
    preferences: Arc<SqlitePreferenceStore>,
) -> Result<Option<BackupCoordinator>> {
    let Some(oauth) = OAuth2Config::from_drive_config(&config.drive) else {
        return Ok(None);
    };
    let refresher = Arc::new(RefreshClient::new(&oauth)?);

    let tokens: Arc<dyn ITokenStore> = match config.drive.token_store {
        TokenStoreKind::Keyring => Arc::new(KeyringTokenStorage::default()) as Arc<dyn ITokenStore>,
        TokenStoreKind::Database => preferences.clone() as Arc<dyn ITokenStore>,
    };
    info!(store = ?config.drive.token_store, "Using token store");

    let authenticator = Arc::new(TokenAuthenticator::new(
        tokens,
        preferences.clone(),
        refresher,
    ));
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.drive.request_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let client = DriveClient::new(
        AuthorizedHttp::new(http, authenticator),
        &config.drive.api_base_url,
    )
    .context("Invalid drive.api_base_url")?;

    let remote: Arc<dyn IRemoteFileStore> = Arc::new(DriveRemoteStore::new(client));
    let coordinator = BackupCoordinator::new(
        notes,
        remote,
        preferences,
        config.storage.media_dir.clone(),
    )
    .with_auto_backup_default(config.backup.auto_backup_default);
    Ok(Some(coordinator))
}

/// Logs coordinator state transitions until shutdown
fn spawn_state_logger(
    mut states: tokio::sync::watch::Receiver<SyncState>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    match &*states.borrow_and_update() {
                        SyncState::Failure { reason } => warn!(reason = %reason, "Backup failed"),
                        state => info!(state = %state, "Backup state changed"),
                    }
                }
            }
        }
    })
}

fn hours(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(3600))
}

// ============================================================================
// Configuration and logging
// ============================================================================

/// Loads the config; an explicitly named file must exist and parse
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    match path {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok((config, path.to_path_buf()))
        }
        None => {
            let path = Config::default_path();
            Ok((Config::load_or_default(&path), path))
        }
    }
}

/// `RUST_LOG` wins over the configured level
fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = env_filter(logging);
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Cancels `token` on SIGINT or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_deref())?;

    init_tracing(&config.logging);
    info!(config_path = %config_path.display(), "Daybook daemon starting (daybookd)");

    for problem in config.validate() {
        warn!(field = %problem.field, "Invalid configuration: {}", problem.message);
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token).await?;

    let result = if cli.backup_now {
        service.backup_once().await
    } else if cli.restore {
        service.restore_once().await
    } else {
        service.run().await
    };

    match &result {
        Ok(()) => info!("Daybook daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Daybook daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
