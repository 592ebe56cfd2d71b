//! The [`Ward`] host: one guild, its plugins and apis.
//!
//! ```text
//!            start()                          stop()
//! Stopped ─────────▶ Running ─────────────────────▶ Stopping ───▶ Stopped
//!   │                  │                                 │
//!   │ login            │ tick: update() ─▶ wait ◀─ events │ on_stop, flush,
//!   │ guild + store    │        ▲          │             │ destroy client
//!   │ inject           │        └──────────┘             │
//!   │ load + on_start  │                                 │
//! ```
//!
//! # Startup
//!
//! | Step | Failure |
//! |------|---------|
//! | `login` | `start()` fails with [`WardError::Connection`] |
//! | guild lookup, data directories | `start()` fails, client is disconnected |
//! | injection | logged, slot stays empty |
//! | data load and `on_start` | logged, only that importable is left inactive |
//!
//! # Scheduling
//!
//! Every tick, [`Ward::update`] walks the active plugins in registration
//! order. `on_update` runs when more than `update_interval` has passed since
//! the last run, and the data is saved when more than `autosave_interval`
//! has passed since the last autosave. The due jobs of one tick are awaited
//! together and each one handles its own error. A daily backup is attempted
//! after the batch.
//!
//! # Example
//!
//! ```rust,ignore
//! let ward = Arc::new(Ward::new(client, guild_config));
//! ward.add_plugin(Ping::default());
//! ward.add_api(Feed::default());
//! ward.run().await?;
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, join_all};
use parking_lot::{Mutex, RwLock};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, debug_span, error, info, info_span, trace, warn};
use ward_core::{
    BoxedClient, Message, PlatformEvent, Reaction, SharedClock, SystemClock, elapsed_between,
};
use ward_framework::{
    Api, BackupOutcome, BoxError, DataStore, GuildContext, HostedApi, HostedPlugin,
    ImportableHandle, InjectError, InjectionKind, Plugin, PluginHandle, parse_command,
};

use crate::config::GuildConfig;
use crate::error::{WardError, WardResult};

/// Lifecycle state of a [`Ward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WardState {
    Stopped,
    Running,
    /// Stop was requested; shutdown hooks and the final flush are running.
    Stopping,
}

impl fmt::Display for WardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

// =============================================================================
// Registry entries
// =============================================================================

#[derive(Debug, Default)]
struct Schedule {
    last_update: Option<DateTime<Utc>>,
    last_autosave: Option<DateTime<Utc>>,
}

struct Entry<H: ?Sized> {
    kind: &'static str,
    handle: Arc<H>,
    /// Started successfully in the current session.
    active: AtomicBool,
    schedule: Mutex<Schedule>,
}

impl<H: ImportableHandle + ?Sized> Entry<H> {
    fn new(kind: &'static str, handle: Arc<H>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            handle,
            active: AtomicBool::new(false),
            schedule: Mutex::new(Schedule::default()),
        })
    }

    fn id(&self) -> String {
        self.handle.id()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Loads data and runs `on_start`. The entry only becomes active if
    /// both succeed.
    async fn activate(&self, now: DateTime<Utc>) -> bool {
        let id = self.id();
        if let Err(err) = guarded(self.handle.load_data()).await {
            error!(kind = self.kind, id = %id, error = %err, "Failed to load data, not starting");
            return false;
        }
        if let Err(err) = guarded(self.handle.start()).await {
            error!(kind = self.kind, id = %id, error = %err, "on_start failed, not starting");
            return false;
        }

        *self.schedule.lock() = Schedule {
            last_update: None,
            last_autosave: Some(now),
        };
        self.active.store(true, Ordering::SeqCst);
        debug!(kind = self.kind, id = %id, "Started");
        true
    }

    async fn deactivate(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = guarded(self.handle.stop()).await {
            error!(kind = self.kind, id = %self.id(), error = %err, "on_stop failed");
        }
    }

    async fn flush(&self) -> bool {
        match guarded(self.handle.save_data()).await {
            Ok(saved) => {
                if saved {
                    trace!(kind = self.kind, id = %self.id(), "Data flushed");
                }
                true
            }
            Err(err) => {
                error!(kind = self.kind, id = %self.id(), error = %err, "Failed to save data");
                false
            }
        }
    }
}

type PluginEntry = Arc<Entry<dyn PluginHandle>>;
type ApiEntry = Arc<Entry<dyn ImportableHandle>>;

/// First free id among `default`, `default-0`, `default-1`, …
fn unique_id(default: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(default) {
        return default.to_string();
    }
    let mut n = 0usize;
    loop {
        let candidate = format!("{default}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn log_backup(outcome: &BackupOutcome) {
    match outcome {
        BackupOutcome::Created(path) => info!(path = %path.display(), "Backup created"),
        BackupOutcome::Failed(reason) => warn!(reason = %reason, "Backup failed"),
        BackupOutcome::AlreadyToday | BackupOutcome::Debounced => trace!("Backup skipped"),
    }
}

/// What only exists between a successful start and the end of shutdown.
struct Session {
    store: Arc<DataStore>,
    context: GuildContext,
}

// =============================================================================
// Ward
// =============================================================================

/// Hosts the plugins and apis of one guild.
///
/// The ward owns every importable registered with it. Ids are unique within
/// the plugin registry and within the api registry; a colliding id gets the
/// first free `-{n}` suffix.
pub struct Ward {
    client: BoxedClient,
    config: GuildConfig,
    clock: SharedClock,
    plugins: RwLock<Vec<PluginEntry>>,
    apis: RwLock<Vec<ApiEntry>>,
    state: watch::Sender<WardState>,
    /// Serializes `start` against the stop request.
    lifecycle: AsyncMutex<()>,
    /// Ticks never overlap.
    tick_lock: AsyncMutex<()>,
    session: RwLock<Option<Arc<Session>>>,
}

impl Ward {
    pub fn new(client: BoxedClient, config: GuildConfig) -> Self {
        Self::with_clock(client, config, Arc::new(SystemClock))
    }

    pub fn with_clock(client: BoxedClient, config: GuildConfig, clock: SharedClock) -> Self {
        let (state, _) = watch::channel(WardState::Stopped);
        Self {
            client,
            config,
            clock,
            plugins: RwLock::new(Vec::new()),
            apis: RwLock::new(Vec::new()),
            state,
            lifecycle: AsyncMutex::new(()),
            tick_lock: AsyncMutex::new(()),
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &GuildConfig {
        &self.config
    }

    pub fn client(&self) -> &BoxedClient {
        &self.client
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn state(&self) -> WardState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == WardState::Running
    }

    /// Receives every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<WardState> {
        self.state.subscribe()
    }

    /// The data store of the running session.
    pub fn data_store(&self) -> Option<Arc<DataStore>> {
        self.session().map(|session| Arc::clone(&session.store))
    }

    /// The guild context of the running session.
    pub fn guild_context(&self) -> Option<GuildContext> {
        self.session().map(|session| session.context.clone())
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    // ─── Registration ─────────────────────────────────────────────────────────

    /// Registers a plugin and returns its final id.
    ///
    /// Plugins added while running are not started until the next `start`.
    pub fn add_plugin<P: Plugin>(&self, plugin: P) -> String {
        self.add_plugin_arc(Arc::new(plugin))
    }

    pub fn add_plugin_arc<P: Plugin>(&self, plugin: Arc<P>) -> String {
        let handle: Arc<dyn PluginHandle> = Arc::new(HostedPlugin::new(plugin));
        let mut plugins = self.plugins.write();
        let id = unique_id(&handle.id(), |candidate| {
            plugins.iter().any(|entry| entry.id() == candidate)
        });
        handle.set_id(&id);
        handle.apply_config(self.config.plugin_section(&id));
        plugins.push(Entry::new("plugin", handle));
        debug!(plugin = %id, "Plugin registered");
        id
    }

    /// Registers an api and returns its final id.
    pub fn add_api<A: Api>(&self, api: A) -> String {
        self.add_api_arc(Arc::new(api))
    }

    pub fn add_api_arc<A: Api>(&self, api: Arc<A>) -> String {
        let handle: Arc<dyn ImportableHandle> = Arc::new(HostedApi::new(api));
        let mut apis = self.apis.write();
        let id = unique_id(&handle.id(), |candidate| {
            apis.iter().any(|entry| entry.id() == candidate)
        });
        handle.set_id(&id);
        handle.apply_config(self.config.api_section(&id));
        apis.push(Entry::new("api", handle));
        debug!(api = %id, "Api registered");
        id
    }

    /// Removes a plugin by id. Injected references to it stay valid.
    pub fn remove_plugin(&self, id: &str) -> bool {
        let mut plugins = self.plugins.write();
        let before = plugins.len();
        plugins.retain(|entry| entry.id() != id);
        before != plugins.len()
    }

    pub fn remove_api(&self, id: &str) -> bool {
        let mut apis = self.apis.write();
        let before = apis.len();
        apis.retain(|entry| entry.id() != id);
        before != apis.len()
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        self.plugins.read().iter().map(|entry| entry.id()).collect()
    }

    pub fn api_ids(&self) -> Vec<String> {
        self.apis.read().iter().map(|entry| entry.id()).collect()
    }

    /// The plugin registered as `id`, if it is a `P`.
    pub fn plugin<P: Plugin>(&self, id: &str) -> Option<Arc<P>> {
        let plugins = self.plugins.read();
        let entry = plugins.iter().find(|entry| entry.id() == id)?;
        entry.handle.instance().downcast::<P>().ok()
    }

    pub fn api<A: Api>(&self, id: &str) -> Option<Arc<A>> {
        let apis = self.apis.read();
        let entry = apis.iter().find(|entry| entry.id() == id)?;
        entry.handle.instance().downcast::<A>().ok()
    }

    /// Whether the plugin started in the current session.
    pub fn is_plugin_active(&self, id: &str) -> bool {
        self.plugins
            .read()
            .iter()
            .any(|entry| entry.id() == id && entry.is_active())
    }

    pub fn is_api_active(&self, id: &str) -> bool {
        self.apis
            .read()
            .iter()
            .any(|entry| entry.id() == id && entry.is_active())
    }

    /// External plugins cannot be disabled.
    fn plugin_disabled(&self, entry: &PluginEntry) -> bool {
        !entry.handle.is_external() && self.config.is_plugin_disabled(&entry.id())
    }

    fn api_disabled(&self, entry: &ApiEntry) -> bool {
        !entry.handle.is_external() && self.config.is_api_disabled(&entry.id())
    }

    fn active_plugins(&self) -> Vec<PluginEntry> {
        self.plugins
            .read()
            .iter()
            .filter(|entry| entry.is_active())
            .cloned()
            .collect()
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────────

    /// Connects, prepares data, wires dependencies and starts every enabled
    /// importable, then runs the tick loop on its own task.
    ///
    /// A no-op unless the ward is stopped.
    pub async fn start(self: &Arc<Self>) -> WardResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state() != WardState::Stopped {
            debug!(state = %self.state(), "Ward already started");
            return Ok(());
        }

        let span = info_span!("ward", guild = %self.config.guild_id);
        let (session, events) = self.boot().instrument(span.clone()).await?;

        self.state.send_replace(WardState::Running);
        let tick_loop = tokio::spawn(
            Arc::clone(self)
                .run_loop(Arc::clone(&session), events)
                .instrument(span.clone()),
        );

        // A panic outside the guarded hooks still ends in a shutdown.
        let ward = Arc::clone(self);
        tokio::spawn(
            async move {
                if let Err(err) = tick_loop.await
                    && err.is_panic()
                {
                    error!(error = %err, "Tick loop panicked, shutting down");
                    ward.shutdown(&session).await;
                }
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn boot(&self) -> WardResult<(Arc<Session>, broadcast::Receiver<PlatformEvent>)> {
        info!("Starting");
        let user = self
            .client
            .login(&self.config.token)
            .await
            .map_err(WardError::Connection)?;
        info!(user = %user.name, "Logged in");

        let guild = match self.client.guild(&self.config.guild_id).await {
            Ok(guild) => guild,
            Err(source) => {
                self.disconnect().await;
                return Err(WardError::Guild {
                    guild_id: self.config.guild_id.clone(),
                    source,
                });
            }
        };

        let store = Arc::new(
            DataStore::new(
                self.config.data_dir.clone(),
                self.config.guild_id.clone(),
                Arc::clone(&self.clock),
            )
            .with_keep_backups(self.config.keep_backups),
        );
        match store.init().await {
            Ok(outcome) => log_backup(&outcome),
            Err(err) => {
                self.disconnect().await;
                return Err(err.into());
            }
        }

        let context = GuildContext::new(
            Arc::clone(&self.client),
            guild,
            user,
            self.config.command_prefix.clone(),
        );
        let session = Arc::new(Session { store, context });

        let registered_plugins = self.plugins.read().clone();
        let registered_apis = self.apis.read().clone();
        let plugins: Vec<PluginEntry> = registered_plugins
            .iter()
            .filter(|entry| !self.plugin_disabled(entry))
            .cloned()
            .collect();
        let apis: Vec<ApiEntry> = registered_apis
            .iter()
            .filter(|entry| !self.api_disabled(entry))
            .cloned()
            .collect();
        let disabled =
            (registered_plugins.len() - plugins.len()) + (registered_apis.len() - apis.len());
        if disabled > 0 {
            info!(disabled, "Some importables are disabled by configuration");
        }

        for entry in &apis {
            entry.handle.attach(&session.store, &session.context);
        }
        for entry in &plugins {
            entry.handle.attach(&session.store, &session.context);
        }
        inject(&plugins, &apis);

        let events = self.client.subscribe();
        *self.session.write() = Some(Arc::clone(&session));

        let now = self.clock.now();
        let mut failed = 0usize;
        for entry in &apis {
            if !entry.activate(now).await {
                failed += 1;
            }
        }
        for entry in &plugins {
            if !entry.activate(now).await {
                failed += 1;
            }
        }

        info!(
            plugins = plugins.len(),
            apis = apis.len(),
            failed,
            "Ward started"
        );
        Ok((session, events))
    }

    async fn run_loop(
        self: Arc<Self>,
        session: Arc<Session>,
        mut events: broadcast::Receiver<PlatformEvent>,
    ) {
        let mut state = self.state.subscribe();
        let tick = self.config.tick();
        let mut events_open = true;

        'ticks: loop {
            let running = *state.borrow_and_update() == WardState::Running;
            if !running {
                break;
            }

            self.update().await;

            let deadline = Instant::now() + tick;
            loop {
                tokio::select! {
                    () = sleep_until(deadline) => break,
                    changed = state.changed() => {
                        let running =
                            changed.is_ok() && *state.borrow_and_update() == WardState::Running;
                        if !running {
                            break 'ticks;
                        }
                    }
                    event = events.recv(), if events_open => match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Dispatch fell behind, platform events dropped");
                        }
                        Err(RecvError::Closed) => {
                            warn!("Platform event stream closed");
                            events_open = false;
                        }
                    },
                }
            }
        }

        self.shutdown(&session).await;
    }

    async fn shutdown(&self, session: &Session) {
        info!("Stopping");
        let plugins = self.plugins.read().clone();
        let apis = self.apis.read().clone();

        for entry in &plugins {
            entry.deactivate().await;
        }
        for entry in &apis {
            entry.deactivate().await;
        }

        let flushes: Vec<BoxFuture<'_, bool>> = plugins
            .iter()
            .map(|entry| entry.flush().boxed())
            .chain(apis.iter().map(|entry| entry.flush().boxed()))
            .collect();
        let failed = join_all(flushes).await.into_iter().filter(|ok| !ok).count();
        if failed > 0 {
            warn!(failed, "Some data could not be saved during shutdown");
        }

        *self.session.write() = None;
        self.disconnect().await;
        self.state.send_replace(WardState::Stopped);
        info!(guild = %session.context.guild().id, "Ward stopped");
    }

    async fn disconnect(&self) {
        if let Err(err) = self.client.destroy().await {
            warn!(error = %err, "Failed to disconnect from the platform");
        }
    }

    /// Requests a stop and waits until the ward is stopped. Every concurrent
    /// caller waits for the same shutdown. A no-op when stopped.
    pub async fn stop(&self) {
        let mut state = self.state.subscribe();
        {
            let _lifecycle = self.lifecycle.lock().await;
            self.state.send_if_modified(|state| {
                if *state == WardState::Running {
                    *state = WardState::Stopping;
                    true
                } else {
                    false
                }
            });
        }
        let _ = state.wait_for(|state| *state == WardState::Stopped).await;
    }

    /// Starts and runs until Ctrl+C or SIGTERM.
    pub async fn run(self: &Arc<Self>) -> WardResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Starts and runs until `shutdown` resolves or the ward is stopped
    /// elsewhere.
    pub async fn run_until<F>(self: &Arc<Self>, shutdown: F) -> WardResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        info!(guild = %self.config.guild_id, "Ward is now running. Press Ctrl+C to stop.");

        let mut state = self.state.subscribe();
        tokio::select! {
            () = shutdown => {}
            _ = state.wait_for(|state| *state == WardState::Stopped) => {}
        }

        self.stop().await;
        Ok(())
    }

    // ─── Scheduling ───────────────────────────────────────────────────────────

    /// Runs the `on_update` hooks and autosaves that are due, then attempts
    /// a backup.
    pub async fn update(&self) {
        let _tick = self.tick_lock.lock().await;
        let now = self.clock.now();
        let plugins = self.active_plugins();

        let mut batch: Vec<BoxFuture<'_, ()>> = Vec::new();
        for entry in &plugins {
            let (update_due, save_due) = {
                let mut schedule = entry.schedule.lock();
                let update_due = entry.handle.update_interval().is_some_and(|interval| {
                    schedule
                        .last_update
                        .is_none_or(|last| elapsed_between(last, now) > interval)
                });
                if update_due {
                    schedule.last_update = Some(now);
                }
                let save_due = schedule.last_autosave.is_none_or(|last| {
                    elapsed_between(last, now) > entry.handle.autosave_interval()
                });
                if save_due {
                    schedule.last_autosave = Some(now);
                }
                (update_due, save_due)
            };

            if update_due {
                batch.push(run_update(entry).boxed());
            }
            if save_due {
                batch.push(run_autosave(entry).boxed());
            }
        }

        if !batch.is_empty() {
            trace!(jobs = batch.len(), "Running scheduled jobs");
            join_all(batch).await;
        }

        if let Some(store) = self.data_store() {
            log_backup(&store.try_make_backup().await);
        }
    }

    // ─── Dispatch ─────────────────────────────────────────────────────────────

    /// Routes one platform event to the active plugins. Ignored while
    /// stopped.
    pub async fn handle_event(&self, event: PlatformEvent) {
        let Some(session) = self.session() else {
            trace!(event = event.event_name(), "Event ignored, ward not running");
            return;
        };
        let span = debug_span!("dispatch", event = event.event_name());
        async {
            match event {
                PlatformEvent::Message(message) => self.handle_message(&session, message).await,
                PlatformEvent::ReactionAdd(reaction) => {
                    self.handle_reaction(&session, &reaction, true).await
                }
                PlatformEvent::ReactionRemove(reaction) => {
                    self.handle_reaction(&session, &reaction, false).await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_message(&self, session: &Session, mut message: Message) {
        if message.is_from_bot() {
            return;
        }
        if let Some(guild_id) = &message.guild_id
            && guild_id != &session.context.guild().id
        {
            trace!(guild = %guild_id, "Message from another guild ignored");
            return;
        }
        if message.member.is_none()
            && let Some(guild_id) = message.guild_id.clone()
        {
            match self.client.member(&guild_id, &message.author.id).await {
                Ok(member) => message.member = Some(member),
                Err(err) => {
                    debug!(user = %message.author.id, error = %err, "Could not resolve author")
                }
            }
        }

        let plugins = self.active_plugins();
        match parse_command(session.context.command_prefix(), &message.content) {
            Some(command) => {
                debug!(command = %command.name, user = %message.author.id, "Command received");
                for entry in &plugins {
                    if let Err(err) = guarded(entry.handle.command(&message, &command)).await {
                        error!(
                            plugin = %entry.id(),
                            command = %command.name,
                            error = %err,
                            "on_command failed"
                        );
                    }
                }
            }
            None => {
                for entry in &plugins {
                    if let Err(err) = guarded(entry.handle.message(&message)).await {
                        error!(plugin = %entry.id(), error = %err, "on_message failed");
                    }
                }
            }
        }
    }

    async fn handle_reaction(&self, session: &Session, reaction: &Reaction, added: bool) {
        if reaction.user_id == session.context.user().id {
            return;
        }
        for entry in &self.active_plugins() {
            if let Err(err) = guarded(entry.handle.reaction(reaction, added)).await {
                error!(plugin = %entry.id(), error = %err, "on_reaction failed");
            }
        }
    }
}

impl fmt::Debug for Ward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ward")
            .field("guild", &self.config.guild_id)
            .field("state", &self.state())
            .field("plugins", &self.plugin_ids())
            .field("apis", &self.api_ids())
            .finish_non_exhaustive()
    }
}

/// Awaits a plugin hook. A panic inside it comes back as an error so the
/// tick loop and the sibling plugins keep running.
async fn guarded<T, E>(hook: impl Future<Output = Result<T, E>>) -> Result<T, BoxError>
where
    E: Into<BoxError>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result.map_err(Into::into),
        Err(panic) => Err(panic_message(panic.as_ref()).into()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str));
    match detail {
        Some(detail) => format!("hook panicked: {detail}"),
        None => "hook panicked".to_string(),
    }
}

async fn run_update(entry: &PluginEntry) {
    if let Err(err) = guarded(entry.handle.update()).await {
        error!(plugin = %entry.id(), error = %err, "on_update failed");
    }
}

async fn run_autosave(entry: &PluginEntry) {
    match guarded(entry.handle.save_data()).await {
        Ok(true) => trace!(plugin = %entry.id(), "Autosaved"),
        Ok(false) => {}
        Err(err) => error!(plugin = %entry.id(), error = %err, "Autosave failed"),
    }
}

/// Fills every declared injection slot of `plugins` that is still empty.
fn inject(plugins: &[PluginEntry], apis: &[ApiEntry]) {
    let api_ids: Vec<String> = apis.iter().map(|entry| entry.id()).collect();

    for entry in plugins {
        let id = entry.id();
        for injection in entry.handle.injections() {
            if injection.slot.is_filled() {
                continue;
            }
            let instance = match injection.kind {
                InjectionKind::Api => {
                    ward_framework::inject::resolve_api_id(
                        &injection.target,
                        api_ids.iter().map(String::as_str),
                    )
                    .and_then(|found| apis.iter().find(|api| api.id() == found))
                    .map(|api| api.handle.instance())
                }
                InjectionKind::Plugin => plugins
                    .iter()
                    .find(|plugin| plugin.id() == injection.target)
                    .map(|plugin| plugin.handle.instance()),
            };

            let result = match instance {
                Some(instance) => injection.slot.fill(&injection.target, instance),
                None => Err(InjectError::Unresolved {
                    target: injection.target.clone(),
                    kind: injection.kind.as_str(),
                }),
            };
            match result {
                Ok(()) => debug!(
                    plugin = %id,
                    target = %injection.target,
                    kind = %injection.kind,
                    "Dependency injected"
                ),
                Err(err) => warn!(plugin = %id, error = %err, "Injection failed"),
            }
        }
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(err) => warn!(error = %err, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use ward_core::{Guild, ManualClock, Member, MemoryClient, User};
    use ward_framework::{
        CommandInvocation, HookResult, Importable, ImportableCore, Inject, Injection, NoData,
    };

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct CounterData {
        count: u32,
    }

    #[derive(Default)]
    struct Counter {
        core: ImportableCore<CounterData>,
        name: &'static str,
        interval: Option<Duration>,
        external: bool,
        fail_start: bool,
        fail_update: bool,
        panics: bool,
        starts: AtomicUsize,
        stops: AtomicUsize,
        updates: AtomicUsize,
        messages: AtomicUsize,
        reactions: AtomicUsize,
        commands: Mutex<Vec<CommandInvocation>>,
        members: Mutex<Vec<Option<Member>>>,
    }

    impl Counter {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                ..Default::default()
            }
        }

        fn every(mut self, interval: Duration) -> Self {
            self.interval = Some(interval);
            self
        }

        fn external(mut self) -> Self {
            self.external = true;
            self
        }

        fn failing_start(mut self) -> Self {
            self.fail_start = true;
            self
        }

        fn failing_update(mut self) -> Self {
            self.fail_update = true;
            self
        }

        fn panicking(mut self) -> Self {
            self.panics = true;
            self
        }
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    impl Importable for Counter {
        type Data = CounterData;

        fn default_id(&self) -> String {
            self.name.to_string()
        }

        fn core(&self) -> &ImportableCore<CounterData> {
            &self.core
        }

        fn is_external(&self) -> bool {
            self.external
        }
    }

    #[async_trait]
    impl Plugin for Counter {
        fn update_interval(&self) -> Option<Duration> {
            self.interval
        }

        async fn on_start(&self) -> HookResult {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err("start refused".into());
            }
            Ok(())
        }

        async fn on_stop(&self) -> HookResult {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_update(&self) -> HookResult {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail_update {
                return Err("update exploded".into());
            }
            if self.panics {
                let history: Vec<u32> = Vec::new();
                let _ = history[0];
            }
            Ok(())
        }

        async fn on_message(&self, message: &Message) -> HookResult {
            self.messages.fetch_add(1, Ordering::SeqCst);
            self.members.lock().push(message.member.clone());
            Ok(())
        }

        async fn on_command(&self, _message: &Message, command: &CommandInvocation) -> HookResult {
            self.commands.lock().push(command.clone());
            if self.panics {
                panic!("command handler panicked");
            }
            self.data()?.write(|data| data.count += 1)?;
            Ok(())
        }

        async fn on_reaction(&self, _reaction: &Reaction, _added: bool) -> HookResult {
            self.reactions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Feed {
        core: ImportableCore<NoData>,
    }

    impl Importable for Feed {
        type Data = NoData;

        fn default_id(&self) -> String {
            "feed".into()
        }

        fn core(&self) -> &ImportableCore<NoData> {
            &self.core
        }
    }

    #[async_trait]
    impl Api for Feed {}

    #[derive(Default)]
    struct Digest {
        core: ImportableCore<NoData>,
        feed: Inject<Feed>,
        counter: Inject<Counter>,
        mistyped: Inject<Feed>,
    }

    impl Importable for Digest {
        type Data = NoData;

        fn default_id(&self) -> String {
            "digest".into()
        }

        fn core(&self) -> &ImportableCore<NoData> {
            &self.core
        }
    }

    #[async_trait]
    impl Plugin for Digest {
        fn injections(&self) -> Vec<Injection<'_>> {
            vec![
                Injection::api("feed", &self.feed),
                Injection::plugin("counter", &self.counter),
                Injection::plugin("counter", &self.mistyped),
            ]
        }
    }

    struct Harness {
        client: Arc<MemoryClient>,
        clock: Arc<ManualClock>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let client = MemoryClient::new(User::new("bot", "ward"))
                .with_guild(Guild::new("g1", "Test guild"))
                .with_member(Member::new("g1", User::new("u1", "alice")));
            let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
            Self {
                client: Arc::new(client),
                clock: Arc::new(ManualClock::new(start)),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn config(&self) -> GuildConfig {
            let mut config =
                GuildConfig::new("g1", "token").with_data_dir(self.dir.path().join("data"));
            // The tests drive `update` themselves.
            config.tick_ms = 3_600_000;
            config
        }

        fn ward(&self, config: GuildConfig) -> Arc<Ward> {
            let client: BoxedClient = self.client.clone();
            Arc::new(Ward::with_clock(client, config, self.clock.clone()))
        }

        fn data_file(&self, id: &str) -> std::path::PathBuf {
            self.dir.path().join("data").join("g1").join(format!("{id}.json"))
        }
    }

    fn message(content: &str) -> PlatformEvent {
        PlatformEvent::Message(
            Message::new("m1", "c1", User::new("u1", "alice"), content).in_guild("g1"),
        )
    }

    fn reaction(user: &str) -> PlatformEvent {
        PlatformEvent::ReactionAdd(Reaction {
            channel_id: "c1".into(),
            message_id: "m1".into(),
            user_id: user.into(),
            emoji: "👍".into(),
        })
    }

    #[test]
    fn test_unique_id() {
        let taken = ["ping", "ping-0"];
        assert_eq!(unique_id("dice", |id| taken.contains(&id)), "dice");
        assert_eq!(unique_id("ping", |id| taken.contains(&id)), "ping-1");
    }

    #[test]
    fn test_ids_are_deduplicated_per_registry() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());

        assert_eq!(ward.add_plugin(Counter::new("counter")), "counter");
        assert_eq!(ward.add_plugin(Counter::new("counter")), "counter-0");
        assert_eq!(ward.add_plugin(Counter::new("counter")), "counter-1");
        assert_eq!(ward.add_api(Feed::default()), "feed");
        assert_eq!(ward.add_api(Feed::default()), "feed-0");

        assert!(ward.remove_plugin("counter-0"));
        assert!(!ward.remove_plugin("counter-0"));
        assert_eq!(ward.plugin_ids(), vec!["counter", "counter-1"]);
        assert_eq!(ward.add_plugin(Counter::new("counter")), "counter-0");
    }

    #[test]
    fn test_config_section_applied_by_final_id() {
        let harness = Harness::new();
        let config = harness
            .config()
            .with_plugin("counter-0", json!({"greeting": "hi"}));
        let ward = harness.ward(config);

        ward.add_plugin(Counter::new("counter"));
        ward.add_plugin(Counter::new("counter"));

        let second = ward.plugin::<Counter>("counter-0").unwrap();
        assert_eq!(second.config().get("greeting"), Some(json!("hi")));
        let first = ward.plugin::<Counter>("counter").unwrap();
        assert_eq!(first.config().get("greeting"), None);
    }

    #[tokio::test]
    async fn test_update_interval_scheduling() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("counter").every(Duration::from_millis(1000)));
        tokio_test::assert_ok!(ward.start().await);
        let counter = ward.plugin::<Counter>("counter").unwrap();

        ward.update().await;
        harness.clock.advance(Duration::from_millis(500));
        ward.update().await;
        harness.clock.advance(Duration::from_millis(600));
        ward.update().await;

        assert_eq!(count(&counter.updates), 2);
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_update_failure_is_isolated() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("broken").every(Duration::ZERO).failing_update());
        ward.add_plugin(Counter::new("healthy").every(Duration::ZERO));
        ward.start().await.unwrap();

        ward.update().await;
        harness.clock.advance(Duration::from_millis(1));
        ward.update().await;

        let broken = ward.plugin::<Counter>("broken").unwrap();
        let healthy = ward.plugin::<Counter>("healthy").unwrap();
        assert_eq!(count(&broken.updates), 2);
        assert_eq!(count(&healthy.updates), 2);
        assert!(ward.is_running());
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_panicking_hooks_do_not_block_shutdown() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("unstable").every(Duration::ZERO).panicking());
        ward.add_plugin(Counter::new("counter").every(Duration::ZERO));
        ward.start().await.unwrap();

        ward.handle_event(message("!bump")).await;
        ward.update().await;

        let unstable = ward.plugin::<Counter>("unstable").unwrap();
        let counter = ward.plugin::<Counter>("counter").unwrap();
        assert_eq!(unstable.commands.lock().len(), 1);
        assert_eq!(counter.commands.lock().len(), 1);
        assert_eq!(count(&unstable.updates), 1);
        assert_eq!(count(&counter.updates), 1);
        assert!(ward.is_running());
        assert!(ward.is_plugin_active("unstable"));

        tokio::time::timeout(Duration::from_secs(3), ward.stop())
            .await
            .expect("stop should finish after a hook panicked");
        assert_eq!(ward.state(), WardState::Stopped);
        assert_eq!(count(&unstable.stops), 1);
        assert_eq!(count(&counter.stops), 1);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(harness.data_file("counter")).unwrap())
                .unwrap();
        assert_eq!(saved["count"], 1);
    }

    #[test]
    fn test_panic_message() {
        let from_str: Box<dyn Any + Send> = Box::new("boom");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let opaque: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(from_str.as_ref()), "hook panicked: boom");
        assert_eq!(panic_message(from_string.as_ref()), "hook panicked: bang");
        assert_eq!(panic_message(opaque.as_ref()), "hook panicked");
    }

    #[tokio::test]
    async fn test_zero_interval_runs_once_per_instant() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("a").every(Duration::ZERO));
        ward.add_plugin(Counter::new("b"));
        ward.start().await.unwrap();
        ward.start().await.unwrap();

        ward.update().await;
        ward.update().await;

        let a = ward.plugin::<Counter>("a").unwrap();
        let b = ward.plugin::<Counter>("b").unwrap();
        assert_eq!(count(&a.updates), 1);
        assert_eq!(count(&b.updates), 0);
        assert_eq!(count(&a.starts), 1);

        ward.stop().await;
        ward.stop().await;
        assert_eq!(count(&a.stops), 1);
        assert_eq!(ward.state(), WardState::Stopped);
    }

    #[tokio::test]
    async fn test_start_failure_disables_only_that_plugin() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("broken").failing_start());
        ward.add_plugin(Counter::new("healthy"));
        ward.start().await.unwrap();

        assert!(!ward.is_plugin_active("broken"));
        assert!(ward.is_plugin_active("healthy"));

        ward.handle_event(message("hello")).await;
        let broken = ward.plugin::<Counter>("broken").unwrap();
        let healthy = ward.plugin::<Counter>("healthy").unwrap();
        assert_eq!(count(&broken.messages), 0);
        assert_eq!(count(&healthy.messages), 1);

        ward.stop().await;
        assert_eq!(count(&broken.stops), 0);
        assert_eq!(count(&healthy.stops), 1);
    }

    #[tokio::test]
    async fn test_disabled_plugins_get_no_hooks() {
        let harness = Harness::new();
        let config = harness
            .config()
            .with_plugin("quiet", json!(false))
            .with_plugin("archive", json!(false));
        let ward = harness.ward(config);
        ward.add_plugin(Counter::new("quiet").every(Duration::ZERO));
        ward.add_plugin(Counter::new("archive").every(Duration::ZERO).external());
        ward.start().await.unwrap();

        ward.update().await;
        ward.handle_event(message("!save")).await;
        ward.stop().await;

        let quiet = ward.plugin::<Counter>("quiet").unwrap();
        assert_eq!(count(&quiet.starts), 0);
        assert_eq!(count(&quiet.updates), 0);
        assert!(quiet.commands.lock().is_empty());
        assert_eq!(count(&quiet.stops), 0);
        assert!(!harness.data_file("quiet").exists());

        let archive = ward.plugin::<Counter>("archive").unwrap();
        assert_eq!(count(&archive.starts), 1);
        assert_eq!(count(&archive.updates), 1);
        assert_eq!(archive.commands.lock().len(), 1);
        assert_eq!(count(&archive.stops), 1);
        let external = harness
            .dir
            .path()
            .join("data")
            .join("g1")
            .join("external")
            .join("archive.json");
        assert!(external.exists());
    }

    #[tokio::test]
    async fn test_injection_resolves_suffixed_api() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_api(Feed::default());
        ward.add_api(Feed::default());
        assert!(ward.remove_api("feed"));
        ward.add_plugin(Counter::new("counter"));
        ward.add_plugin(Digest::default());
        ward.start().await.unwrap();

        let digest = ward.plugin::<Digest>("digest").unwrap();
        let feed = ward.api::<Feed>("feed-0").unwrap();
        assert!(Arc::ptr_eq(digest.feed.get().unwrap(), &feed));

        let counter = ward.plugin::<Counter>("counter").unwrap();
        assert!(Arc::ptr_eq(digest.counter.require().unwrap(), &counter));
        assert!(digest.mistyped.get().is_none());
        assert!(ward.is_plugin_active("digest"));
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_dispatch_routes_commands_messages_and_reactions() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config().with_prefix("?"));
        ward.add_plugin(Counter::new("counter"));
        ward.start().await.unwrap();
        let counter = ward.plugin::<Counter>("counter").unwrap();

        ward.handle_event(message("?roll 2d6 fast")).await;
        {
            let commands = counter.commands.lock();
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].name, "roll");
            assert_eq!(commands[0].args, vec!["2d6", "fast"]);
        }
        assert_eq!(count(&counter.messages), 0);

        ward.handle_event(message("just chatting")).await;
        assert_eq!(count(&counter.messages), 1);
        let member = counter.members.lock()[0].clone().unwrap();
        assert_eq!(member.user.id, "u1");

        let from_bot = Message::new("m2", "c1", User::new("b2", "other").as_bot(), "?roll");
        ward.handle_event(PlatformEvent::Message(from_bot.in_guild("g1")))
            .await;
        let elsewhere = Message::new("m3", "c9", User::new("u1", "alice"), "hi").in_guild("g2");
        ward.handle_event(PlatformEvent::Message(elsewhere)).await;
        assert_eq!(counter.commands.lock().len(), 1);
        assert_eq!(count(&counter.messages), 1);

        ward.handle_event(reaction("u1")).await;
        ward.handle_event(reaction("bot")).await;
        assert_eq!(count(&counter.reactions), 1);
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_events_are_dispatched_from_the_loop() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("counter"));
        ward.start().await.unwrap();
        let counter = ward.plugin::<Counter>("counter").unwrap();

        harness.client.emit(message("hello"));
        tokio::time::timeout(Duration::from_secs(5), async {
            while count(&counter.messages) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        ward.stop().await;
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("a").every(Duration::ZERO));
        ward.add_plugin(Counter::new("b"));

        ward.start().await.unwrap();
        ward.start().await.unwrap();
        assert_eq!(ward.state(), WardState::Running);
        ward.update().await;

        let a = ward.plugin::<Counter>("a").unwrap();
        let b = ward.plugin::<Counter>("b").unwrap();
        assert_eq!(count(&a.updates), 1);
        assert_eq!(count(&b.updates), 0);
        assert_eq!(count(&a.starts), 1);

        tokio::join!(ward.stop(), ward.stop());
        ward.stop().await;
        assert_eq!(ward.state(), WardState::Stopped);
        assert_eq!(count(&a.stops), 1);
        assert!(!harness.client.is_connected());
        assert!(ward.data_store().is_none());
    }

    #[tokio::test]
    async fn test_login_failure_leaves_ward_stopped() {
        let harness = Harness::new();
        let client = MemoryClient::new(User::new("bot", "ward"))
            .with_token("secret")
            .with_guild(Guild::new("g1", "Test guild"));
        let client: BoxedClient = Arc::new(client);
        let ward = Arc::new(Ward::with_clock(
            client,
            harness.config(),
            harness.clock.clone(),
        ));
        ward.add_plugin(Counter::new("counter"));

        let result = ward.start().await;
        assert!(matches!(result, Err(WardError::Connection(_))));
        assert_eq!(ward.state(), WardState::Stopped);
        let counter = ward.plugin::<Counter>("counter").unwrap();
        assert_eq!(count(&counter.starts), 0);
    }

    #[tokio::test]
    async fn test_unknown_guild_fails_start() {
        let harness = Harness::new();
        let mut config = harness.config();
        config.guild_id = "missing".into();
        let ward = harness.ward(config);

        let result = ward.start().await;
        assert!(matches!(result, Err(WardError::Guild { .. })));
        assert!(!harness.client.is_connected());
    }

    #[tokio::test]
    async fn test_stop_flushes_data_and_restart_reloads_it() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("counter"));
        ward.start().await.unwrap();

        ward.handle_event(message("!bump")).await;
        ward.handle_event(message("!bump")).await;
        ward.stop().await;

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(harness.data_file("counter")).unwrap())
                .unwrap();
        assert_eq!(saved["count"], 2);

        ward.start().await.unwrap();
        ward.handle_event(message("!bump")).await;
        let counter = ward.plugin::<Counter>("counter").unwrap();
        assert_eq!(counter.data().unwrap().read(|data| data.count).unwrap(), 3);
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_autosave_after_interval() {
        let harness = Harness::new();
        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("counter"));
        ward.start().await.unwrap();
        ward.handle_event(message("!bump")).await;

        ward.update().await;
        assert!(!harness.data_file("counter").exists());

        harness
            .clock
            .advance(ward_framework::DEFAULT_AUTOSAVE_INTERVAL + Duration::from_secs(1));
        ward.update().await;
        assert!(harness.data_file("counter").exists());
        ward.stop().await;
    }

    #[tokio::test]
    async fn test_start_creates_backup_of_existing_data() {
        let harness = Harness::new();
        let guild_dir = harness.dir.path().join("data").join("g1");
        std::fs::create_dir_all(&guild_dir).unwrap();
        std::fs::write(guild_dir.join("counter.json"), r#"{"count": 7}"#).unwrap();

        let ward = harness.ward(harness.config());
        ward.add_plugin(Counter::new("counter"));
        ward.start().await.unwrap();

        let counter = ward.plugin::<Counter>("counter").unwrap();
        assert_eq!(counter.data().unwrap().read(|data| data.count).unwrap(), 7);
        let backup = harness
            .dir
            .path()
            .join("data")
            .join("backups")
            .join("2024-05-01")
            .join("g1")
            .join("counter.json");
        assert!(backup.exists());
        ward.stop().await;
    }
}
