//! Per-guild data directories and daily backups.
//!
//! # Layout
//!
//! | Path | Purpose |
//! |------|---------|
//! | `<root>/<guild>/` | Data files of the guild's importables |
//! | `<root>/<guild>/external/` | Data files of external importables |
//! | `<root>/backups/<YYYY-MM-DD>/<guild>/` | Daily copies of `<root>/<guild>/` |
//!
//! Backups are attempted at most once per [`BACKUP_DEBOUNCE`] and copied
//! at most once per calendar day.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};
use ward_core::{SharedClock, elapsed_between};

use crate::data::container::DataContainer;
use crate::error::{DataError, DataResult};

/// Minimum time between two backup attempts.
pub const BACKUP_DEBOUNCE: Duration = Duration::from_secs(10 * 60);

/// Directory under the data root holding dated backups.
pub const BACKUPS_DIR: &str = "backups";

const EXTERNAL_DIR: &str = "external";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Result of [`DataStore::try_make_backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// A copy was written to the given directory.
    Created(PathBuf),
    /// Today's backup already exists.
    AlreadyToday,
    /// The last attempt was less than [`BACKUP_DEBOUNCE`] ago.
    Debounced,
    /// Copying failed. The error has been logged.
    Failed(String),
}

/// Describes the owner of a [`DataContainer`].
#[derive(Debug, Clone)]
pub struct ContainerHost {
    /// File stem of the data file, usually the importable's id.
    pub data_path: String,
    pub autosave_interval: Duration,
    /// Store under the `external/` directory.
    pub external: bool,
}

/// Owns the data directories of one guild.
pub struct DataStore {
    guild_id: String,
    dir_data: PathBuf,
    dir_backups: PathBuf,
    dir_external: PathBuf,
    clock: SharedClock,
    keep_backups: usize,
    last_backup_attempt: Mutex<Option<DateTime<Utc>>>,
}

impl DataStore {
    /// Creates a store rooted at `root` (conventionally `data/`). Nothing is
    /// touched on disk until [`init`](Self::init).
    pub fn new(root: impl Into<PathBuf>, guild_id: impl Into<String>, clock: SharedClock) -> Self {
        let root = root.into();
        let guild_id = guild_id.into();
        let dir_data = root.join(&guild_id);
        Self {
            dir_external: dir_data.join(EXTERNAL_DIR),
            dir_backups: root.join(BACKUPS_DIR),
            dir_data,
            guild_id,
            clock,
            keep_backups: 0,
            last_backup_attempt: Mutex::new(None),
        }
    }

    /// Keep at most `keep` daily backups of this guild. `0` keeps all.
    pub fn with_keep_backups(mut self, keep: usize) -> Self {
        self.keep_backups = keep;
        self
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir_data
    }

    pub fn backups_dir(&self) -> &Path {
        &self.dir_backups
    }

    pub fn external_dir(&self) -> &Path {
        &self.dir_external
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Creates the directories and attempts a backup.
    pub async fn init(&self) -> DataResult<BackupOutcome> {
        for dir in [&self.dir_data, &self.dir_backups, &self.dir_external] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| DataError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
        }
        debug!(guild = %self.guild_id, dir = %self.dir_data.display(), "Data store ready");
        Ok(self.try_make_backup().await)
    }

    /// Path of the data file described by `host`.
    pub fn container_path(&self, host: &ContainerHost) -> PathBuf {
        let dir = if host.external {
            &self.dir_external
        } else {
            &self.dir_data
        };
        dir.join(format!("{}.json", host.data_path))
    }

    pub fn create_container<D>(&self, host: &ContainerHost) -> DataContainer<D>
    where
        D: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        DataContainer::new(
            self.container_path(host),
            host.autosave_interval,
            self.clock.clone(),
        )
    }

    // ─── Backups ──────────────────────────────────────────────────────────────

    /// Copies the guild's data directory into today's backup folder unless
    /// that already happened today or the last attempt was too recent.
    pub async fn try_make_backup(&self) -> BackupOutcome {
        let now = self.clock.now();
        {
            let mut last = self.last_backup_attempt.lock();
            if let Some(previous) = *last
                && elapsed_between(previous, now) < BACKUP_DEBOUNCE
            {
                return BackupOutcome::Debounced;
            }
            *last = Some(now);
        }

        let today = self.clock.today();
        if let Some(latest) = self.backup_dates().await.last()
            && *latest >= today
        {
            return BackupOutcome::AlreadyToday;
        }

        let target = self
            .dir_backups
            .join(today.format(DATE_FORMAT).to_string())
            .join(&self.guild_id);
        match copy_dir(&self.dir_data, &target).await {
            Ok(files) => {
                info!(guild = %self.guild_id, path = %target.display(), files, "Created data backup");
                if self.keep_backups > 0
                    && let Err(err) = self.prune_backups(self.keep_backups).await
                {
                    warn!(guild = %self.guild_id, error = %err, "Failed to prune old backups");
                }
                BackupOutcome::Created(target)
            }
            Err(err) => {
                error!(guild = %self.guild_id, error = %err, "Failed to create data backup");
                let _ = tokio::fs::remove_dir_all(&target).await;
                BackupOutcome::Failed(err.to_string())
            }
        }
    }

    /// Dates that have a backup of this guild, oldest first.
    pub async fn backup_dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir_backups).await else {
            return dates;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|name| NaiveDate::parse_from_str(name, DATE_FORMAT).ok())
            else {
                continue;
            };
            let is_guild_backup = tokio::fs::metadata(entry.path().join(&self.guild_id))
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if is_guild_backup {
                dates.push(date);
            }
        }
        dates.sort();
        dates
    }

    /// Deletes this guild's oldest backups beyond `keep`. Returns how many
    /// were removed.
    pub async fn prune_backups(&self, keep: usize) -> DataResult<usize> {
        if keep == 0 {
            return Ok(0);
        }
        let dates = self.backup_dates().await;
        let excess = dates.len().saturating_sub(keep);

        for date in &dates[..excess] {
            let dated = self.dir_backups.join(date.format(DATE_FORMAT).to_string());
            let guild_dir = dated.join(&self.guild_id);
            tokio::fs::remove_dir_all(&guild_dir)
                .await
                .map_err(|source| DataError::Write {
                    path: guild_dir.clone(),
                    source,
                })?;
            // Other guilds may still have backups under the same date.
            let _ = tokio::fs::remove_dir(&dated).await;
            debug!(guild = %self.guild_id, date = %date, "Removed old backup");
        }
        Ok(excess)
    }
}

/// Recursively copies `from` into `to`. Returns the number of files copied.
async fn copy_dir(from: &Path, to: &Path) -> io::Result<usize> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    let mut copied = 0;

    while let Some((source, target)) = pending.pop() {
        tokio::fs::create_dir_all(&target).await?;
        let mut entries = tokio::fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let destination = target.join(entry.file_name());
            if file_type.is_dir() {
                pending.push((entry.path(), destination));
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &destination).await?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}
