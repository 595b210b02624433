//! Periodic background jobs
//!
//! A [`JobRunner`] owns one [`PeriodicJob`]. Each cycle it waits the job's
//! interval, waits until the job's [`JobConstraints`] hold, runs the job and,
//! when the job asks for a retry, re-runs it with exponential backoff. The
//! runner stops as soon as its [`CancellationToken`] is cancelled.
//!
//! ## Jobs
//!
//! - [`AutoBackupJob`] - backup on the user-selected period
//! - [`CleanupJob`] - tag GC and removal of orphaned media files
//! - [`PendingMediaJob`] - retries queued media copies

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use daybook_core::config::JobsConfig;
use daybook_core::domain::BackupPeriod;
use daybook_core::ports::{IDeviceConditions, INoteRepository, IPreferenceStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::{BackupCoordinator, BackupOutcome};
use crate::media::{copy_into_place, media_path};
use crate::SyncError;

/// Default cleanup cadence
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(48 * 3600);

/// Default pending-media retry cadence
pub const PENDING_MEDIA_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Files younger than this are never treated as orphans
const ORPHAN_GRACE_PERIOD: Duration = Duration::from_secs(3600);

// ============================================================================
// Job trait
// ============================================================================

/// What a job run asks of the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Run again after a backoff delay
    Retry,
}

/// Device conditions a job needs before it may run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobConstraints {
    pub requires_network: bool,
    pub requires_idle: bool,
}

impl JobConstraints {
    pub const NONE: Self = Self {
        requires_network: false,
        requires_idle: false,
    };

    pub const fn network_and_idle() -> Self {
        Self {
            requires_network: true,
            requires_idle: true,
        }
    }

    pub const fn idle() -> Self {
        Self {
            requires_network: false,
            requires_idle: true,
        }
    }

    pub async fn satisfied(&self, conditions: &dyn IDeviceConditions) -> bool {
        if self.requires_network && !conditions.is_network_connected().await {
            return false;
        }
        if self.requires_idle && !conditions.is_device_idle().await {
            return false;
        }
        true
    }
}

/// Work scheduled on a fixed or preference-driven interval
#[async_trait::async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Delay before the next run; read again every cycle
    async fn interval(&self) -> Duration;

    fn constraints(&self) -> JobConstraints;

    async fn run(&self) -> anyhow::Result<JobOutcome>;
}

// ============================================================================
// JobRunner
// ============================================================================

/// Backoff applied when a job asks for a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries per cycle before waiting for the next interval
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &JobsConfig) -> Self {
        Self {
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
            max_delay: Duration::from_secs(config.retry_max_delay_secs),
            max_retries: config.max_retries,
        }
    }

    /// `base * 2^attempt`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default())
    }
}

/// Drives one job until cancelled
pub struct JobRunner {
    job: Arc<dyn PeriodicJob>,
    conditions: Arc<dyn IDeviceConditions>,
    policy: RetryPolicy,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(
        job: Arc<dyn PeriodicJob>,
        conditions: Arc<dyn IDeviceConditions>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job,
            conditions,
            policy: RetryPolicy::default(),
            poll_interval: Duration::from_secs(60),
            cancel,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// How often unmet constraints are re-checked
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let name = self.job.name();
        info!(job = name, "Job runner started");

        loop {
            let interval = self.job.interval().await;
            debug!(job = name, interval_secs = interval.as_secs(), "Waiting for next run");
            if !self.sleep(interval).await {
                break;
            }
            if !self.run_cycle().await {
                break;
            }
        }

        info!(job = name, "Job runner stopped");
    }

    /// One scheduled run plus its retries; `false` once cancelled
    async fn run_cycle(&self) -> bool {
        let name = self.job.name();
        let mut attempt = 0;

        loop {
            if !self.wait_for_constraints().await {
                return false;
            }

            match self.run_once().await {
                JobOutcome::Success => return true,
                JobOutcome::Retry if attempt >= self.policy.max_retries => {
                    warn!(job = name, attempt, "Retries exhausted until next interval");
                    return true;
                }
                JobOutcome::Retry => {
                    let delay = self.policy.delay_for(attempt);
                    attempt += 1;
                    info!(job = name, attempt, delay_secs = delay.as_secs(), "Job will retry");
                    if !self.sleep(delay).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn run_once(&self) -> JobOutcome {
        let name = self.job.name();
        debug!(job = name, "Running job");
        match self.job.run().await {
            Ok(outcome) => {
                debug!(job = name, ?outcome, "Job finished");
                outcome
            }
            Err(e) => {
                warn!(job = name, error = %e, "Job failed");
                JobOutcome::Retry
            }
        }
    }

    async fn wait_for_constraints(&self) -> bool {
        let constraints = self.job.constraints();
        loop {
            if constraints.satisfied(self.conditions.as_ref()).await {
                return true;
            }
            debug!(job = self.job.name(), "Constraints not met, waiting");
            if !self.sleep(self.poll_interval).await {
                return false;
            }
        }
    }

    /// Sleeps for `duration`; `false` if cancelled first
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

// ============================================================================
// AutoBackupJob
// ============================================================================

/// Runs a backup every user-selected [`BackupPeriod`]
pub struct AutoBackupJob {
    coordinator: Arc<BackupCoordinator>,
    preferences: Arc<dyn IPreferenceStore>,
    default_period: BackupPeriod,
}

impl AutoBackupJob {
    pub fn new(
        coordinator: Arc<BackupCoordinator>,
        preferences: Arc<dyn IPreferenceStore>,
        default_period: BackupPeriod,
    ) -> Self {
        Self {
            coordinator,
            preferences,
            default_period,
        }
    }
}

#[async_trait::async_trait]
impl PeriodicJob for AutoBackupJob {
    fn name(&self) -> &'static str {
        "auto_backup"
    }

    async fn interval(&self) -> Duration {
        match self.preferences.backup_period(self.default_period).await {
            Ok(period) => period.as_duration(),
            Err(e) => {
                warn!(error = %e, "Failed to read backup period, using default");
                self.default_period.as_duration()
            }
        }
    }

    fn constraints(&self) -> JobConstraints {
        JobConstraints::network_and_idle()
    }

    async fn run(&self) -> anyhow::Result<JobOutcome> {
        let outcome = match self.coordinator.try_start_auto_backup().await {
            Ok(BackupOutcome::Completed { synced }) => {
                info!(synced, "Auto-backup completed");
                JobOutcome::Success
            }
            Ok(BackupOutcome::Skipped(reason)) => {
                debug!(?reason, "Auto-backup skipped");
                JobOutcome::Success
            }
            Err(SyncError::AlreadyRunning) => {
                debug!("Backup already running, auto-backup not needed");
                JobOutcome::Success
            }
            Err(SyncError::NotSignedIn) => JobOutcome::Success,
            Err(e) => {
                warn!(error = %e, "Auto-backup failed");
                JobOutcome::Retry
            }
        };
        Ok(outcome)
    }
}

// ============================================================================
// CleanupJob
// ============================================================================

/// Purges unreferenced tags and media files no note references
pub struct CleanupJob {
    notes: Arc<dyn INoteRepository>,
    media_dir: PathBuf,
    interval: Duration,
    grace_period: Duration,
}

impl CleanupJob {
    pub fn new(notes: Arc<dyn INoteRepository>, media_dir: PathBuf) -> Self {
        Self {
            notes,
            media_dir,
            interval: CLEANUP_INTERVAL,
            grace_period: ORPHAN_GRACE_PERIOD,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Minimum age of a file before it can be removed as an orphan
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Removes unreferenced files from the media directory
    ///
    /// Returns how many were removed. Failures on individual files are
    /// logged and skipped.
    pub async fn remove_orphan_media(&self) -> anyhow::Result<u64> {
        let mut keep: HashSet<String> = self.notes.attachment_names().await?;
        keep.extend(
            self.notes
                .pending_media()
                .await?
                .into_iter()
                .map(|p| p.file_name),
        );

        let mut entries = match tokio::fs::read_dir(&self.media_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if keep.contains(&name) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or(Duration::ZERO);
            if age < self.grace_period {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(name, "Removed orphan media file");
                    removed += 1;
                }
                Err(e) => warn!(name, error = %e, "Failed to remove orphan media file"),
            }
        }
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl PeriodicJob for CleanupJob {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn interval(&self) -> Duration {
        self.interval
    }

    fn constraints(&self) -> JobConstraints {
        JobConstraints::idle()
    }

    async fn run(&self) -> anyhow::Result<JobOutcome> {
        let tags = self.notes.purge_unreferenced_tags().await?;
        let files = self.remove_orphan_media().await?;
        info!(tags, files, "Cleanup finished");
        Ok(JobOutcome::Success)
    }
}

// ============================================================================
// PendingMediaJob
// ============================================================================

/// Copies queued media into the media directory
pub struct PendingMediaJob {
    notes: Arc<dyn INoteRepository>,
    media_dir: PathBuf,
    max_attempts: u32,
    interval: Duration,
}

impl PendingMediaJob {
    pub fn new(notes: Arc<dyn INoteRepository>, media_dir: PathBuf, max_attempts: u32) -> Self {
        Self {
            notes,
            media_dir,
            max_attempts,
            interval: PENDING_MEDIA_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait::async_trait]
impl PeriodicJob for PendingMediaJob {
    fn name(&self) -> &'static str {
        "pending_media"
    }

    async fn interval(&self) -> Duration {
        self.interval
    }

    fn constraints(&self) -> JobConstraints {
        JobConstraints::NONE
    }

    async fn run(&self) -> anyhow::Result<JobOutcome> {
        let queue = self.notes.pending_media().await?;
        let mut outstanding = 0;

        for item in queue {
            let Some(dest) = media_path(&self.media_dir, &item.file_name) else {
                warn!(file = %item.file_name, "Dropping pending media with unsafe name");
                self.notes.complete_pending_media(item.id).await?;
                continue;
            };
            match copy_into_place(&item.source_path, &dest).await {
                Ok(bytes) => {
                    self.notes.complete_pending_media(item.id).await?;
                    debug!(file = %item.file_name, bytes, "Copied pending media");
                }
                Err(e) => {
                    let attempts = self.notes.fail_pending_media(item.id, &e.to_string()).await?;
                    if attempts >= self.max_attempts {
                        warn!(
                            file = %item.file_name,
                            attempts,
                            error = %e,
                            "Giving up on pending media"
                        );
                        self.notes.complete_pending_media(item.id).await?;
                    } else {
                        debug!(file = %item.file_name, attempts, error = %e, "Pending media copy failed");
                        outstanding += 1;
                    }
                }
            }
        }

        Ok(if outstanding == 0 {
            JobOutcome::Success
        } else {
            JobOutcome::Retry
        })
    }
}
