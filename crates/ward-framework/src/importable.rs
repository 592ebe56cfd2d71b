//! The common shape of plugins and apis: [`Importable`].
//!
//! Every host-managed unit embeds an [`ImportableCore`] holding its id, its
//! merged base configuration, its attachment to the guild and its lazily
//! created [`DataContainer`]. The trait's provided methods build on that
//! core, so an implementation usually only names its data type, its default
//! id and where the core lives:
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Greeter {
//!     core: ImportableCore<GreeterData>,
//! }
//!
//! impl Importable for Greeter {
//!     type Data = GreeterData;
//!
//!     fn default_id(&self) -> String {
//!         "greeter".into()
//!     }
//!
//!     fn core(&self) -> &ImportableCore<GreeterData> {
//!         &self.core
//!     }
//! }
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ConfigView, deep_merge};
use crate::context::GuildContext;
use crate::data::{ContainerHost, DEFAULT_AUTOSAVE_INTERVAL, DataContainer, DataStore};
use crate::error::{DataError, DataResult};

/// Data type for importables that persist nothing but configuration
/// overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoData {}

/// Host-managed state shared by every importable.
pub struct ImportableCore<D> {
    id: RwLock<Option<String>>,
    base_config: RwLock<Option<Arc<Value>>>,
    store: OnceLock<Arc<DataStore>>,
    guild: OnceLock<GuildContext>,
    data: OnceLock<Arc<DataContainer<D>>>,
}

impl<D> ImportableCore<D> {
    pub fn new() -> Self {
        Self {
            id: RwLock::new(None),
            base_config: RwLock::new(None),
            store: OnceLock::new(),
            guild: OnceLock::new(),
            data: OnceLock::new(),
        }
    }

    /// The id assigned by the host, if any.
    pub fn assigned_id(&self) -> Option<String> {
        self.id.read().clone()
    }

    /// Reassigns the id. Only the host should call this, before the data
    /// container is first accessed.
    pub fn set_id(&self, id: impl Into<String>) {
        *self.id.write() = Some(id.into());
    }

    pub fn base_config(&self) -> Option<Arc<Value>> {
        self.base_config.read().clone()
    }

    /// Replaces the merged base configuration.
    pub fn set_base_config(&self, config: Value) {
        *self.base_config.write() = Some(Arc::new(config));
    }

    /// Binds the importable to the data store. Later calls are ignored.
    pub fn attach_store(&self, store: Arc<DataStore>) {
        let _ = self.store.set(store);
    }

    /// Binds the importable to its guild. Later calls are ignored.
    pub fn attach_guild(&self, guild: GuildContext) {
        let _ = self.guild.set(guild);
    }

    pub fn store(&self) -> Option<&Arc<DataStore>> {
        self.store.get()
    }

    pub fn guild(&self) -> Option<&GuildContext> {
        self.guild.get()
    }

    /// The data container if it has been created.
    pub fn existing_data(&self) -> Option<&Arc<DataContainer<D>>> {
        self.data.get()
    }
}

impl<D> Default for ImportableCore<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for ImportableCore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportableCore")
            .field("id", &*self.id.read())
            .field("attached", &self.store.get().is_some())
            .field("data", &self.data.get().is_some())
            .finish()
    }
}

/// A unit the host registers, configures and persists.
pub trait Importable: Send + Sync + 'static {
    /// Persisted state. Must serialize as a JSON object.
    type Data: Serialize + DeserializeOwned + Default + Send + Sync + 'static;

    /// Id used until the host assigns one.
    fn default_id(&self) -> String;

    fn core(&self) -> &ImportableCore<Self::Data>;

    /// Static configuration defaults, merged under the guild config section.
    fn default_config(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Initial data when no data file exists yet.
    fn init_data(&self) -> Self::Data {
        Self::Data::default()
    }

    fn autosave_interval(&self) -> Duration {
        DEFAULT_AUTOSAVE_INTERVAL
    }

    /// External importables keep their data under `external/` and cannot be
    /// disabled from configuration.
    fn is_external(&self) -> bool {
        false
    }

    // ── Provided ──

    fn id(&self) -> String {
        self.core()
            .assigned_id()
            .unwrap_or_else(|| self.default_id())
    }

    /// Merges `section` over [`default_config`](Self::default_config) and
    /// stores the result as the base configuration.
    fn apply_config(&self, section: Option<&Value>) {
        let mut merged = self.default_config();
        if let Some(section) = section {
            deep_merge(&mut merged, section);
        }
        self.core().set_base_config(merged);
    }

    /// The effective configuration: `_config` overrides from the data file
    /// over the merged base configuration.
    fn config(&self) -> ConfigView {
        let core = self.core();
        let base = core
            .base_config()
            .unwrap_or_else(|| Arc::new(self.default_config()));
        let overrides = core
            .existing_data()
            .map(|data| data.config_overrides())
            .unwrap_or_default();
        ConfigView::new(base, overrides)
    }

    /// The data container, created on first access.
    fn data(&self) -> DataResult<Arc<DataContainer<Self::Data>>> {
        let core = self.core();
        if let Some(data) = core.existing_data() {
            return Ok(data.clone());
        }
        let store = core.store().ok_or_else(|| DataError::Unbound { id: self.id() })?;
        let host = ContainerHost {
            data_path: self.id(),
            autosave_interval: self.autosave_interval(),
            external: self.is_external(),
        };
        let data = core
            .data
            .get_or_init(|| Arc::new(store.create_container(&host)));
        Ok(data.clone())
    }

    fn guild(&self) -> Option<&GuildContext> {
        self.core().guild()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use ward_core::ManualClock;

    #[derive(Default)]
    struct Sample {
        core: ImportableCore<NoData>,
    }

    impl Importable for Sample {
        type Data = NoData;

        fn default_id(&self) -> String {
            "sample".into()
        }

        fn core(&self) -> &ImportableCore<NoData> {
            &self.core
        }

        fn default_config(&self) -> Value {
            json!({"a": {"b": 1, "c": true}})
        }
    }

    fn store(root: &std::path::Path) -> Arc<DataStore> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        ));
        Arc::new(DataStore::new(root, "g1", clock))
    }

    #[test]
    fn test_id_falls_back_to_default() {
        let sample = Sample::default();
        assert_eq!(sample.id(), "sample");
        sample.core().set_id("sample-0");
        assert_eq!(sample.id(), "sample-0");
    }

    #[test]
    fn test_data_requires_store() {
        let sample = Sample::default();
        assert!(matches!(sample.data(), Err(DataError::Unbound { .. })));
    }

    #[tokio::test]
    async fn test_config_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let sample = Sample::default();
        sample.apply_config(Some(&json!({"a": {"c": false}})));
        sample.core().attach_store(store(dir.path()));

        let config = sample.config();
        assert_eq!(config.get("a.b"), Some(json!(1)));
        assert_eq!(config.get("a.c"), Some(json!(false)));

        let data = sample.data().unwrap();
        data.load(|| NoData {}).await.unwrap();
        data.set_config_override("a.b", json!(2)).unwrap();
        assert_eq!(sample.config().get("a.b"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_one_container_per_importable() {
        let dir = tempfile::tempdir().unwrap();
        let sample = Sample::default();
        sample.core().attach_store(store(dir.path()));

        let first = sample.data().unwrap();
        let second = sample.data().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.path(), dir.path().join("g1").join("sample.json"));
    }
}
