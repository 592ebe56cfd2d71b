//! One persisted JSON record with dirty tracking.
//!
//! ```text
//!  created ──load()──▶ loaded ──write()/set()/mark_dirty()──▶ dirty
//!                         ▲                                     │
//!                         └──────────── save() ◀────────────────┘
//! ```
//!
//! On disk the record is a single JSON object: the importable's own fields
//! plus an optional `_config` object holding per-instance configuration
//! overrides.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use ward_core::{SharedClock, elapsed_between};

use crate::error::{DataError, DataResult, SharedDataError};

/// Autosave interval used when an importable does not choose one.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Key of the configuration override object inside a data file.
pub const CONFIG_KEY: &str = "_config";

const EVENT_CAPACITY: usize = 16;

/// Notifications published by a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEvent {
    Loaded { path: PathBuf },
    Saved { path: PathBuf, at: DateTime<Utc> },
}

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "D: Serialize", deserialize = "D: DeserializeOwned"))]
struct Record<D> {
    #[serde(flatten)]
    state: D,
    #[serde(rename = "_config", default, skip_serializing_if = "Map::is_empty")]
    config: Map<String, Value>,
}

#[derive(Default)]
struct DirtyState {
    marked: bool,
    /// Serialization last read from or written to disk.
    saved: Option<String>,
    /// Serialization of the current value, keyed by write generation.
    cached: Option<(u64, String)>,
}

// ─── SaveHandle ───────────────────────────────────────────────────────────────

/// A pending write, shared by every caller that asked for it.
///
/// Awaiting the handle yields the outcome of the write. Two handles obtained
/// while the same write was in flight compare equal under
/// [`ptr_eq`](SaveHandle::ptr_eq).
#[derive(Clone)]
#[must_use = "a save does nothing unless awaited"]
pub struct SaveHandle {
    inner: Shared<BoxFuture<'static, Result<(), SharedDataError>>>,
}

impl SaveHandle {
    fn new(future: BoxFuture<'static, Result<(), SharedDataError>>) -> Self {
        Self {
            inner: future.shared(),
        }
    }

    fn failed(error: DataError) -> Self {
        Self::new(futures::future::ready(Err(Arc::new(error))).boxed())
    }

    /// Whether both handles refer to the same write.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.inner, &other.inner)
    }
}

impl Future for SaveHandle {
    type Output = Result<(), SharedDataError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for SaveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveHandle").finish_non_exhaustive()
    }
}

// ─── DataContainer ────────────────────────────────────────────────────────────

/// Persistent state of one importable.
///
/// The value is absent until [`load`](Self::load) completes; every accessor
/// returns [`DataError::NotLoaded`] before that.
pub struct DataContainer<D> {
    path: PathBuf,
    autosave_interval: Duration,
    clock: SharedClock,
    record: RwLock<Option<Record<D>>>,
    /// Bumped on every mutable access to the record.
    generation: AtomicU64,
    dirty: Mutex<DirtyState>,
    last_save: Mutex<Option<DateTime<Utc>>>,
    in_flight: Mutex<Option<SaveHandle>>,
    load_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<DataEvent>,
}

impl<D> DataContainer<D>
where
    D: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(path: impl Into<PathBuf>, autosave_interval: Duration, clock: SharedClock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            path: path.into(),
            autosave_interval,
            clock,
            record: RwLock::new(None),
            generation: AtomicU64::new(0),
            dirty: Mutex::new(DirtyState::default()),
            last_save: Mutex::new(None),
            in_flight: Mutex::new(None),
            load_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn autosave_interval(&self) -> Duration {
        self.autosave_interval
    }

    pub fn is_loaded(&self) -> bool {
        self.record.read().is_some()
    }

    /// Time the last save started or finished, whichever is later.
    pub fn last_save_time(&self) -> Option<DateTime<Utc>> {
        *self.last_save.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.events.subscribe()
    }

    // ── Loading ──

    /// Reads the backing file, or uses `init` when it does not exist.
    ///
    /// Content that is not a valid record fails with [`DataError::Parse`]
    /// and leaves the container unloaded.
    pub async fn load<F>(&self, init: F) -> DataResult<()>
    where
        F: FnOnce() -> D + Send,
    {
        let _guard = self.load_lock.lock().await;
        self.load_locked(init).await
    }

    /// Loads unless a value is already present.
    pub async fn ensure_loaded<F>(&self, init: F) -> DataResult<()>
    where
        F: FnOnce() -> D + Send,
    {
        if self.is_loaded() {
            return Ok(());
        }
        let _guard = self.load_lock.lock().await;
        if self.is_loaded() {
            return Ok(());
        }
        self.load_locked(init).await
    }

    async fn load_locked<F>(&self, init: F) -> DataResult<()>
    where
        F: FnOnce() -> D + Send,
    {
        let record = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                serde_json::from_str::<Record<D>>(&content).map_err(|source| DataError::Parse {
                    path: self.path.clone(),
                    source,
                })?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No data file, using initial data");
                Record {
                    state: init(),
                    config: Map::new(),
                }
            }
            Err(source) => {
                return Err(DataError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let serialized = serialize_record(&record)?;
        let mut slot = self.record.write();
        *slot = Some(record);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.dirty.lock() = DirtyState {
            marked: false,
            saved: Some(serialized.clone()),
            cached: Some((generation, serialized)),
        };
        drop(slot);

        let _ = self.events.send(DataEvent::Loaded {
            path: self.path.clone(),
        });
        Ok(())
    }

    // ── Access ──

    pub fn read<R>(&self, f: impl FnOnce(&D) -> R) -> DataResult<R> {
        let guard = self.record.read();
        let record = guard.as_ref().ok_or_else(|| self.not_loaded())?;
        Ok(f(&record.state))
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut D) -> R) -> DataResult<R> {
        let mut guard = self.record.write();
        let record = guard.as_mut().ok_or_else(|| self.not_loaded())?;
        let result = f(&mut record.state);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    /// A clone of the current value.
    pub fn snapshot(&self) -> DataResult<D>
    where
        D: Clone,
    {
        self.read(D::clone)
    }

    /// Top-level field `key` of the serialized value.
    pub fn get(&self, key: &str) -> DataResult<Option<Value>> {
        let value = self.read(|data| serde_json::to_value(data))?.map_err(DataError::Serialize)?;
        Ok(value.get(key).cloned())
    }

    /// Replaces top-level field `key` and re-reads the value through serde.
    pub fn set(&self, key: &str, value: Value) -> DataResult<()> {
        if key == CONFIG_KEY {
            return Err(DataError::Field {
                key: key.to_string(),
                reason: "reserved for configuration overrides".to_string(),
            });
        }

        let mut guard = self.record.write();
        let record = guard.as_mut().ok_or_else(|| self.not_loaded())?;
        let mut object = match serde_json::to_value(&record.state).map_err(DataError::Serialize)? {
            Value::Object(map) => map,
            _ => {
                return Err(DataError::Field {
                    key: key.to_string(),
                    reason: "data is not a JSON object".to_string(),
                });
            }
        };
        object.insert(key.to_string(), value);
        record.state =
            serde_json::from_value(Value::Object(object)).map_err(|err| DataError::Field {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    // ── Configuration overrides ──

    /// All overrides; empty while unloaded.
    pub fn config_overrides(&self) -> Map<String, Value> {
        self.record
            .read()
            .as_ref()
            .map(|record| record.config.clone())
            .unwrap_or_default()
    }

    pub fn config_override(&self, key: &str) -> Option<Value> {
        self.record
            .read()
            .as_ref()
            .and_then(|record| record.config.get(key).cloned())
    }

    pub fn set_config_override(&self, key: impl Into<String>, value: Value) -> DataResult<()> {
        let mut guard = self.record.write();
        let record = guard.as_mut().ok_or_else(|| self.not_loaded())?;
        record.config.insert(key.into(), value);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn remove_config_override(&self, key: &str) -> DataResult<Option<Value>> {
        let mut guard = self.record.write();
        let record = guard.as_mut().ok_or_else(|| self.not_loaded())?;
        let removed = record.config.remove(key);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(removed)
    }

    // ── Dirty tracking ──

    pub fn mark_dirty(&self) {
        self.dirty.lock().marked = true;
    }

    /// Whether the value differs from what is on disk.
    pub fn is_dirty(&self) -> bool {
        if self.dirty.lock().marked {
            return true;
        }
        match self.current_serialization() {
            Ok(Some(current)) => self.dirty.lock().saved.as_deref() != Some(current.as_str()),
            Ok(None) => false,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Cannot serialize data");
                true
            }
        }
    }

    fn current_serialization(&self) -> DataResult<Option<String>> {
        let guard = self.record.read();
        let Some(record) = guard.as_ref() else {
            return Ok(None);
        };
        let generation = self.generation.load(Ordering::SeqCst);

        let mut dirty = self.dirty.lock();
        if let Some((cached_generation, cached)) = &dirty.cached
            && *cached_generation == generation
        {
            return Ok(Some(cached.clone()));
        }
        let serialized = serialize_record(record)?;
        dirty.cached = Some((generation, serialized.clone()));
        Ok(Some(serialized))
    }

    // ── Saving ──

    /// Writes the current value to disk.
    ///
    /// While a write is in flight every caller receives the same handle.
    /// The in-flight slot is released when the write finishes, successfully
    /// or not.
    pub fn save(self: &Arc<Self>) -> SaveHandle {
        let mut in_flight = self.in_flight.lock();
        if let Some(handle) = in_flight.as_ref() {
            return handle.clone();
        }

        let serialized = match self.current_serialization() {
            Ok(Some(serialized)) => serialized,
            Ok(None) => return SaveHandle::failed(self.not_loaded()),
            Err(err) => return SaveHandle::failed(err),
        };
        let was_marked = std::mem::take(&mut self.dirty.lock().marked);

        let this = Arc::clone(self);
        let handle = SaveHandle::new(
            async move {
                let result = this.write_file(&serialized).await;
                match &result {
                    Ok(()) => this.dirty.lock().saved = Some(serialized),
                    Err(_) if was_marked => this.dirty.lock().marked = true,
                    Err(_) => {}
                }
                this.in_flight.lock().take();
                result.map_err(Arc::new)
            }
            .boxed(),
        );
        *in_flight = Some(handle.clone());
        handle
    }

    /// Saves if the value is dirty or the autosave interval has elapsed
    /// since the last save. Returns whether a save happened.
    pub async fn save_opportunity(self: &Arc<Self>) -> Result<bool, SharedDataError> {
        if !self.is_loaded() {
            return Ok(false);
        }
        let due = match self.last_save_time() {
            Some(at) => elapsed_between(at, self.clock.now()) > self.autosave_interval,
            None => true,
        };
        if !due && !self.is_dirty() {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    async fn write_file(&self, serialized: &str) -> DataResult<()> {
        self.stamp_save();

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DataError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, serialized)
            .await
            .map_err(|source| DataError::Write {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| DataError::Write {
                path: self.path.clone(),
                source,
            })?;

        let at = self.stamp_save();
        debug!(path = %self.path.display(), "Saved data");
        let _ = self.events.send(DataEvent::Saved {
            path: self.path.clone(),
            at,
        });
        Ok(())
    }

    fn stamp_save(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        *self.last_save.lock() = Some(now);
        now
    }

    fn not_loaded(&self) -> DataError {
        DataError::NotLoaded {
            path: self.path.clone(),
        }
    }
}

impl<D> fmt::Debug for DataContainer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContainer")
            .field("path", &self.path)
            .field("autosave_interval", &self.autosave_interval)
            .finish_non_exhaustive()
    }
}

fn serialize_record<D: Serialize>(record: &Record<D>) -> DataResult<String> {
    serde_json::to_string_pretty(record).map_err(DataError::Serialize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use ward_core::{Clock, ManualClock};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
        #[serde(default)]
        label: String,
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn container(path: PathBuf, clock: Arc<ManualClock>) -> Arc<DataContainer<Counter>> {
        Arc::new(DataContainer::new(path, DEFAULT_AUTOSAVE_INTERVAL, clock))
    }

    fn init() -> Counter {
        Counter {
            count: 42,
            label: "init".to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_uses_init_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let data = container(dir.path().join("counter.json"), clock());

        assert!(matches!(data.read(|d| d.count), Err(DataError::NotLoaded { .. })));
        data.load(init).await.unwrap();
        assert_eq!(data.read(|d| d.count).unwrap(), 42);
        assert!(!data.is_dirty());
    }

    #[tokio::test]
    async fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        std::fs::write(&path, r#"{"count": 5, "_config": {"a.b": 2}}"#).unwrap();

        let data = container(path, clock());
        data.load(init).await.unwrap();
        assert_eq!(data.read(|d| d.count).unwrap(), 5);
        assert_eq!(data.config_override("a.b"), Some(json!(2)));
        assert!(!data.is_dirty());
    }

    #[tokio::test]
    async fn test_load_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        std::fs::write(&path, "not json").unwrap();

        let data = container(path, clock());
        assert!(matches!(data.load(init).await, Err(DataError::Parse { .. })));
        assert!(!data.is_loaded());
    }

    #[tokio::test]
    async fn test_concurrent_saves_share_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("counter.json");
        let data = container(path.clone(), clock());
        data.load(init).await.unwrap();
        data.write(|d| d.count = 7).unwrap();

        let first = data.save();
        let second = data.save();
        assert!(first.ptr_eq(&second));

        let (a, b) = futures::join!(first.clone(), second);
        a.unwrap();
        b.unwrap();

        let third = data.save();
        assert!(!third.ptr_eq(&first));
        third.await.unwrap();

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"count": 7, "label": "init"}));
    }

    #[tokio::test]
    async fn test_dirty_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let data = container(dir.path().join("counter.json"), clock());
        data.load(init).await.unwrap();
        assert!(!data.is_dirty());

        data.mark_dirty();
        assert!(data.is_dirty());
        data.save().await.unwrap();
        assert!(!data.is_dirty());

        data.write(|d| d.count += 1).unwrap();
        assert!(data.is_dirty());
        data.write(|d| d.count -= 1).unwrap();
        assert!(!data.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_save_releases_in_flight_slot() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();

        let data = container(blocker.join("counter.json"), clock());
        data.load(init).await.unwrap();
        data.mark_dirty();

        let first = data.save();
        assert!(matches!(*first.clone().await.unwrap_err(), DataError::CreateDir { .. }));
        assert!(data.is_dirty());

        let retry = data.save();
        assert!(!retry.ptr_eq(&first));
        assert!(retry.await.is_err());
    }

    #[tokio::test]
    async fn test_save_opportunity() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let data = container(dir.path().join("counter.json"), clock.clone());
        data.load(init).await.unwrap();

        assert!(data.save_opportunity().await.unwrap());
        assert!(!data.save_opportunity().await.unwrap());

        data.write(|d| d.label = "changed".to_string()).unwrap();
        assert!(data.save_opportunity().await.unwrap());

        clock.advance(DEFAULT_AUTOSAVE_INTERVAL + Duration::from_secs(1));
        assert!(data.save_opportunity().await.unwrap());
        assert_eq!(data.last_save_time(), Some(clock.now()));
    }

    #[tokio::test]
    async fn test_get_and_set_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let data = container(dir.path().join("counter.json"), clock());
        data.load(init).await.unwrap();

        data.set("count", json!(3)).unwrap();
        assert_eq!(data.get("count").unwrap(), Some(json!(3)));
        assert_eq!(data.get("missing").unwrap(), None);
        assert!(matches!(
            data.set("count", json!("three")),
            Err(DataError::Field { .. })
        ));
        assert!(data.set(CONFIG_KEY, json!({})).is_err());
    }

    #[tokio::test]
    async fn test_config_overrides_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        let data = container(path.clone(), clock());
        data.load(init).await.unwrap();
        data.set_config_override("greeting", json!("hi")).unwrap();
        assert!(data.is_dirty());
        data.save().await.unwrap();

        let reloaded = container(path, clock());
        reloaded.load(Counter::default).await.unwrap();
        assert_eq!(reloaded.config_override("greeting"), Some(json!("hi")));
        assert_eq!(reloaded.snapshot().unwrap(), init());
    }

    #[tokio::test]
    async fn test_saved_event() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let data = container(dir.path().join("counter.json"), clock.clone());
        let mut events = data.subscribe();
        data.load(init).await.unwrap();
        data.save().await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), DataEvent::Loaded { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            DataEvent::Saved {
                path: data.path().to_path_buf(),
                at: clock.now(),
            }
        );
    }
}
