//! Persistent per-importable data.
//!
//! - [`DataStore`]: the guild's data directories and daily backups.
//! - [`DataContainer`]: one JSON record with dirty tracking, single
//!   in-flight saves and configuration overrides.

pub mod container;
pub mod store;

pub use container::{CONFIG_KEY, DEFAULT_AUTOSAVE_INTERVAL, DataContainer, DataEvent, SaveHandle};
pub use store::{BACKUP_DEBOUNCE, BACKUPS_DIR, BackupOutcome, ContainerHost, DataStore};
