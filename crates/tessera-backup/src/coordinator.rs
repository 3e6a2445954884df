use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error as ThisError;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use tessera_data::ChangeEvent;

use crate::{SnapshotSource, Storage, StorageError};

/// Prefix of the dated backup folders.
pub const BACKUP_DIR_PREFIX: &str = "backup_";
/// Name of the snapshot file inside a backup folder.
pub const BACKUP_FILE_NAME: &str = "tessera_backup.json";

#[derive(ThisError, Debug)]
pub enum BackupError {
    #[error("no backup storage configured")]
    NoStorage,

    #[error("access to the backup storage was not granted")]
    NotAuthorized,

    #[error("backup storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("could not create snapshot: {0}")]
    Snapshot(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Quiet period after the last change before a backup is made
    pub debounce: Duration,
    /// Number of dated folders to keep
    pub retention: usize,
    pub auto_backup: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            retention: 3,
            auto_backup: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupStatus {
    pub authorized: bool,
    pub auto_backup: bool,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub last_backup_folder: Option<String>,
}

/// Source of the current date and time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local calendar date, used to name backup folders.
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Folder name of the backup made on a date.
pub fn backup_folder(date: NaiveDate) -> String {
    format!("{}{}", BACKUP_DIR_PREFIX, date.format("%Y-%m-%d"))
}

/// Names of the dated backup folders in a storage, oldest first.
pub async fn list_backups(storage: &dyn Storage) -> Result<Vec<String>, StorageError> {
    let mut folders: Vec<String> = storage
        .list_entries()
        .await?
        .into_iter()
        .filter(|e| e.kind == crate::EntryKind::Directory)
        .map(|e| e.name)
        .filter(|name| name.starts_with(BACKUP_DIR_PREFIX))
        .collect();
    folders.sort();
    Ok(folders)
}

/// Writes snapshots to external storage, on request or after
/// the ledger has been quiet for a while.
pub struct BackupCoordinator<S> {
    source: S,
    storage: Option<Arc<dyn Storage>>,
    config: BackupConfig,
    clock: Arc<dyn Clock>,
    status: Mutex<BackupStatus>,
    // Held while a backup is written
    running: Mutex<()>,
}

impl<S: SnapshotSource> BackupCoordinator<S> {
    pub fn new(source: S, storage: Option<Arc<dyn Storage>>, config: BackupConfig) -> Self {
        Self::with_clock(source, storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: S,
        storage: Option<Arc<dyn Storage>>,
        config: BackupConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let status = BackupStatus {
            auto_backup: config.auto_backup,
            ..Default::default()
        };
        Self {
            source,
            storage,
            config,
            clock,
            status: Mutex::new(status),
            running: Mutex::new(()),
        }
    }

    pub async fn status(&self) -> BackupStatus {
        self.status.lock().await.clone()
    }

    pub async fn set_auto_backup(&self, enabled: bool) {
        self.status.lock().await.auto_backup = enabled;
    }

    /// Watch ledger changes and make a backup once no change has
    /// arrived for the debounce period. Every change restarts the
    /// period. Returns when the channel is closed, after flushing a
    /// pending backup.
    pub async fn run(&self, events: broadcast::Receiver<ChangeEvent>) {
        self.run_until(events, std::future::pending()).await
    }

    /// Like [`run`](Self::run), also returning once `shutdown`
    /// completes. A pending backup is flushed before returning.
    pub async fn run_until<F>(&self, mut events: broadcast::Receiver<ChangeEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut deadline: Option<Instant> = None;
        loop {
            let quiet = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        debug!(
                            table = %event.table,
                            record_id = %event.record_id,
                            "change received, backup scheduled"
                        );
                        deadline = Some(Instant::now() + self.config.debounce);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "change events lagged, backup scheduled");
                        deadline = Some(Instant::now() + self.config.debounce);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("change channel closed");
                        break;
                    }
                },
                _ = quiet => {
                    deadline = None;
                    self.auto_backup().await;
                }
                _ = &mut shutdown => {
                    debug!("backup watcher stopped");
                    break;
                }
            }
        }
        if deadline.is_some() {
            self.auto_backup().await;
        }
    }

    async fn auto_backup(&self) {
        if !self.status.lock().await.auto_backup {
            debug!("automatic backup disabled");
            return;
        }
        // Automatic failures are logged by perform_backup
        let _ = self.perform_backup(false).await;
    }

    /// Write a snapshot into today's folder and apply retention.
    ///
    /// Manual backups report every failure. Automatic backups log
    /// failures and return `Ok(None)`; they are retried with the
    /// next change.
    pub async fn perform_backup(&self, manual: bool) -> Result<Option<String>, BackupError> {
        let storage = match &self.storage {
            Some(storage) => storage.clone(),
            None => return self.failed(manual, BackupError::NoStorage),
        };
        let _running = self.running.lock().await;

        if !self.authorize(storage.as_ref()).await {
            return self.failed(manual, BackupError::NotAuthorized);
        }

        let bytes = match self.source.snapshot_bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return self.failed(manual, BackupError::Snapshot(err)),
        };

        let folder = backup_folder(self.clock.today());
        if let Err(err) = write_backup(storage.as_ref(), &folder, &bytes).await {
            if let StorageError::PermissionDenied(_) = err {
                self.status.lock().await.authorized = false;
            }
            return self.failed(manual, err.into());
        }

        {
            let mut status = self.status.lock().await;
            status.last_backup_at = Some(self.clock.now());
            status.last_backup_folder = Some(folder.clone());
        }
        info!(folder = %folder, size = bytes.len(), manual, "backup written");

        self.apply_retention(storage.as_ref()).await;
        Ok(Some(folder))
    }

    fn failed(&self, manual: bool, err: BackupError) -> Result<Option<String>, BackupError> {
        if manual {
            return Err(err);
        }
        warn!(error = %err, "automatic backup failed");
        Ok(None)
    }

    /// Check access, asking again when it was lost.
    async fn authorize(&self, storage: &dyn Storage) -> bool {
        let granted = match storage.query_permission().await {
            Ok(true) => true,
            Ok(false) => match storage.request_permission().await {
                Ok(granted) => granted,
                Err(err) => {
                    debug!(error = %err, "permission request failed");
                    false
                }
            },
            Err(err) => {
                debug!(error = %err, "permission query failed");
                false
            }
        };
        self.status.lock().await.authorized = granted;
        granted
    }

    /// Dated backup folders of the configured storage, oldest first.
    pub async fn backups(&self) -> Result<Vec<String>, BackupError> {
        let storage = self.storage.as_ref().ok_or(BackupError::NoStorage)?;
        if !self.authorize(storage.as_ref()).await {
            return Err(BackupError::NotAuthorized);
        }
        Ok(list_backups(storage.as_ref()).await?)
    }

    /// Check access to the storage and pick up the latest folder
    /// written by an earlier run.
    pub async fn refresh_status(&self) -> BackupStatus {
        match self.backups().await {
            Ok(folders) => {
                let mut status = self.status.lock().await;
                if status.last_backup_folder.is_none() {
                    status.last_backup_folder = folders.last().cloned();
                }
            }
            Err(err) => debug!(error = %err, "backup storage unavailable"),
        }
        self.status().await
    }

    /// Keep the most recent dated folders. Failures are logged.
    async fn apply_retention(&self, storage: &dyn Storage) {
        let folders = match list_backups(storage).await {
            Ok(folders) => folders,
            Err(err) => {
                warn!(error = %err, "could not list backups");
                return;
            }
        };

        let excess = folders.len().saturating_sub(self.config.retention);
        for folder in folders.iter().take(excess) {
            match storage.remove_entry(folder).await {
                Ok(()) => debug!(folder = %folder, "old backup removed"),
                Err(err) => warn!(folder = %folder, error = %err, "could not remove old backup"),
            }
        }
    }
}

async fn write_backup(
    storage: &dyn Storage,
    folder: &str,
    bytes: &[u8],
) -> Result<(), StorageError> {
    storage.create_dir(folder).await?;
    storage.write_file(folder, BACKUP_FILE_NAME, bytes).await
}
