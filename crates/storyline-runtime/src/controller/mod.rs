//! Story lifecycle controller
//!
//! One [`StoryController`] drives one story: it launches the modules
//! described by the story's records, hands their surfaces to the shell in
//! anchor order, and reacts to record changes written by any writer.
//!
//! # Ordering
//! Every transition and module operation runs on the story's
//! [`OperationQueue`]. Internal steps call each other directly inside one
//! operation; nothing awaits an operation on its own queue.
//!
//! Launcher calls run in a launch collection beside the queue, bounded by
//! the launch timeout. Each result re-enters the queue as an adopt step, so
//! a slow component never holds up stop, record updates or deletes.
//!
//! # Lifecycle
//! ```text
//! Stopped --request_start--> Running --stop / last delete--> Stopping --> Stopped
//! ```

mod running;

use crate::config::RuntimeConfig;
use crate::error::{LaunchError, StoryError};
use crate::launcher::{ComponentConfig, LaunchedModule, Launcher, ModuleProcess, ViewToken};
use crate::shell::{Shell, StoryHost};
use crate::story_id::StoryId;
use parking_lot::Mutex;
use running::{Adoption, Connection, LaunchDecision, ModuleSet, SurfaceRequest};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storyline_async::{
    wait_all, with_timeout, Bounded, Deferred, FutureOperation, OperationCollection,
    OperationQueue, SingleUse, WatchAction, WatcherList,
};
use storyline_storage::{
    Intent, ModulePath, ModuleRecord, ModuleSource, StoryStorage, SurfaceRelation,
};

/// Lifecycle state of a story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoryState {
    /// Nothing running
    Stopped,
    /// Modules are launched from records
    Running,
    /// Teardown in progress
    Stopping,
}

/// Collaborators of one story
#[derive(Clone)]
pub struct StoryServices {
    /// Starts module components
    pub launcher: Arc<dyn Launcher>,
    /// Shell of this story
    pub shell: Arc<dyn Shell>,
    /// Owner of the story view
    pub host: Arc<dyn StoryHost>,
}

impl fmt::Debug for StoryServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryServices").finish_non_exhaustive()
    }
}

/// Module to add to a story
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRequest {
    /// Path of the parent module (root for top-level modules)
    pub parent: ModulePath,
    /// Name appended to the parent path
    pub name: String,
    /// Intent to launch with
    pub intent: Intent,
    /// Relation to the anchor surface
    pub surface_relation: Option<SurfaceRelation>,
    /// Who adds the module
    pub source: ModuleSource,
    /// Show inside the parent instead of the shell
    pub embedded: bool,
}

impl ModuleRequest {
    /// External, non-embedded module `name` under `parent`
    #[must_use]
    pub fn new(parent: ModulePath, name: impl Into<String>, intent: Intent) -> Self {
        Self {
            parent,
            name: name.into(),
            intent,
            surface_relation: None,
            source: ModuleSource::External,
            embedded: false,
        }
    }

    /// With surface relation
    #[inline]
    #[must_use]
    pub fn with_surface_relation(mut self, relation: SurfaceRelation) -> Self {
        self.surface_relation = Some(relation);
        self
    }

    /// With source
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: ModuleSource) -> Self {
        self.source = source;
        self
    }

    /// With embedded flag
    #[inline]
    #[must_use]
    pub fn with_embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }
}

struct Inner {
    story_id: StoryId,
    storage: StoryStorage,
    queue: OperationQueue,
    launches: OperationCollection,
    services: StoryServices,
    config: RuntimeConfig,
    modules: Mutex<ModuleSet>,
    state: Mutex<StoryState>,
    state_watchers: WatcherList<StoryState>,
}

/// Controller of one story
///
/// Cloning yields another handle to the same story.
#[derive(Clone)]
pub struct StoryController {
    inner: Arc<Inner>,
}

impl StoryController {
    /// Create a stopped controller and subscribe it to record updates
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(
        story_id: StoryId,
        storage: StoryStorage,
        services: StoryServices,
        config: RuntimeConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            story_id,
            queue: OperationQueue::new(format!("story:{story_id}")),
            launches: OperationCollection::new(format!("story:{story_id}:launch")),
            storage,
            services,
            config,
            modules: Mutex::new(ModuleSet::default()),
            state: Mutex::new(StoryState::Stopped),
            state_watchers: WatcherList::new(),
        });

        let owner = Arc::downgrade(&inner);
        inner.storage.subscribe_module_record_updated(move |record| {
            let Some(inner) = owner.upgrade() else {
                return WatchAction::Stop;
            };
            inner.schedule_record_update(record.clone());
            WatchAction::Continue
        });

        Self { inner }
    }

    async fn run<F, Fut, T>(&self, name: &'static str, step: F) -> Result<T, StoryError>
    where
        F: FnOnce(Arc<Inner>) -> Fut,
        Fut: Future<Output = Result<T, StoryError>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        self.inner
            .queue
            .run(name, step(Arc::clone(&self.inner)))
            .await?
    }

    /// Start the shell and launch every live, non-embedded record
    ///
    /// The story is running as soon as the launches are issued. This
    /// resolves once each of them was adopted, failed or timed out; other
    /// requests, `stop` included, proceed meanwhile. No-op if already
    /// running.
    ///
    /// # Errors
    /// Storage failures while reading records; the shell is torn down
    /// again. Individual launch failures are logged and skipped.
    pub async fn request_start(&self) -> Result<(), StoryError> {
        let launched = self
            .run("request_start", |inner| async move { inner.start().await })
            .await?;
        let _ = launched.await;
        Ok(())
    }

    /// Tear the story down; no-op if stopped
    ///
    /// # Errors
    /// Only if the story queue dropped the request.
    pub async fn stop(&self) -> Result<(), StoryError> {
        self.run("stop", |inner| async move {
            inner.teardown_story().await;
            Ok(())
        })
        .await
    }

    /// Persist a new module and launch it if the story is running
    ///
    /// Returns the view of an embedded module, which the caller shows
    /// inside the parent.
    ///
    /// # Errors
    /// - `StoryError::InvalidPath` for an empty name or parent segment
    /// - `StoryError::Cancelled` if a stop or delete overtook the launch
    /// - storage or launch failures
    pub async fn add_module(&self, request: ModuleRequest) -> Result<Option<ViewToken>, StoryError> {
        let launch = self
            .run("add_module", |inner| async move { inner.add_module(request).await })
            .await?;
        let Some((embedded, adoption)) = launch else {
            return Ok(None);
        };
        let view = adoption.await??;
        Ok(embedded.then_some(view))
    }

    /// Mark the record at `path` deleted and tear its module down
    ///
    /// Deleting the last running module stops the story.
    ///
    /// # Errors
    /// `StoryError::NotFound` if no record exists, otherwise storage failures.
    pub async fn delete_module(&self, path: ModulePath) -> Result<(), StoryError> {
        self.run("delete_module", |inner| async move { inner.delete_module(path).await })
            .await
    }

    /// Give the module's surface focus
    ///
    /// # Errors
    /// `StoryError::Stopped` when not running, `StoryError::NotFound` when
    /// the module is not running.
    pub async fn focus_module(&self, path: ModulePath) -> Result<(), StoryError> {
        self.run("focus_module", |inner| async move { inner.set_focus(path, true).await })
            .await
    }

    /// Remove focus from the module's surface
    ///
    /// # Errors
    /// Same as [`focus_module`](Self::focus_module).
    pub async fn defocus_module(&self, path: ModulePath) -> Result<(), StoryError> {
        self.run("defocus_module", |inner| async move { inner.set_focus(path, false).await })
            .await
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> StoryState {
        self.inner.state()
    }

    /// Call `watcher` on every state change
    pub fn watch_state<F>(&self, watcher: F)
    where
        F: FnMut(&StoryState) -> WatchAction + Send + 'static,
    {
        self.inner.state_watchers.add(watcher);
    }

    /// Paths of running modules, sorted
    #[must_use]
    pub fn running_module_paths(&self) -> Vec<ModulePath> {
        self.inner.modules.lock().paths()
    }

    /// Surface ids handed to the shell, sorted
    #[must_use]
    pub fn connected_surface_ids(&self) -> Vec<String> {
        self.inner.modules.lock().connected_surface_ids()
    }

    /// Surface ids waiting for their anchor, sorted
    #[must_use]
    pub fn pending_surface_ids(&self) -> Vec<String> {
        self.inner.modules.lock().pending_surface_ids()
    }

    /// Story id
    #[inline]
    #[must_use]
    pub fn story_id(&self) -> StoryId {
        self.inner.story_id
    }

    /// Storage of this story
    #[inline]
    #[must_use]
    pub fn storage(&self) -> &StoryStorage {
        &self.inner.storage
    }

    /// Deferred completed once no launch is underway and the story queue
    /// is empty
    #[must_use]
    pub fn drained(&self) -> Deferred<()> {
        let queue = self.inner.queue.clone();
        self.inner
            .launches
            .wait_idle()
            .async_map(move |_| queue.drained())
    }
}

impl fmt::Debug for StoryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryController")
            .field("story_id", &self.inner.story_id)
            .field("state", &self.inner.state())
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}


fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Inner {
    fn state(&self) -> StoryState {
        *self.state.lock()
    }

    fn set_state(&self, state: StoryState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            tracing::info!(story = %self.story_id, ?previous, ?state, "story state changed");
            self.state_watchers.notify(&state);
        }
    }

    fn schedule_record_update(self: &Arc<Self>, record: ModuleRecord) {
        let inner = Arc::clone(self);
        self.queue.add(
            FutureOperation::new("record_updated", async move {
                inner.on_record_updated(record).await;
            }),
            |()| {},
        );
    }

    /// Returns a deferred completed once every issued launch settled
    async fn start(self: &Arc<Self>) -> Result<Deferred<()>, StoryError> {
        if self.state() == StoryState::Running {
            tracing::debug!(story = %self.story_id, "already running");
            return Ok(Deferred::completed(()));
        }

        let shell = Arc::clone(&self.services.shell);
        self.bounded("shell_start", self.config.shell_request_timeout(), async move {
            shell.start().await;
        })
        .await;
        let records = match self.storage.read_all_module_records().await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(story = %self.story_id, error = %err, "reading module records failed, tearing the shell down");
                let shell = Arc::clone(&self.services.shell);
                self.bounded("shell_teardown", self.config.shell_teardown_timeout(), async move {
                    shell.teardown().await;
                })
                .await;
                return Err(err.into());
            }
        };
        self.set_state(StoryState::Running);

        let adoptions: Vec<Adoption> = records
            .into_iter()
            .filter(|record| !record.deleted && !record.embedded)
            .map(|record| self.spawn_launch(record))
            .collect();
        tracing::debug!(story = %self.story_id, launches = adoptions.len(), "launches issued");
        Ok(wait_all(adoptions))
    }

    /// Bring the module at the record's path in line with `record`
    async fn launch_module(self: &Arc<Self>, record: ModuleRecord) -> Adoption {
        let decision = self.modules.lock().launch_decision(&record);
        match decision {
            LaunchDecision::Unchanged(view) => {
                self.modules.lock().refresh_record(&record);
                return Deferred::completed(Ok(view));
            }
            LaunchDecision::InFlight => {
                let underway = self.modules.lock().adoption(&record.path);
                if let Some(adoption) = underway {
                    tracing::debug!(story = %self.story_id, module = %record.path, "launch already underway");
                    return adoption;
                }
            }
            LaunchDecision::Relaunch => {
                tracing::info!(story = %self.story_id, module = %record.path, "intent changed, relaunching");
                let _ = self.teardown_module(&record.path, false).await;
            }
            LaunchDecision::Launch => {}
        }
        self.spawn_launch(record)
    }

    /// Launch `record` in the launch collection and adopt it on the queue
    fn spawn_launch(self: &Arc<Self>, record: ModuleRecord) -> Adoption {
        let adoption = Adoption::new();
        let ticket = self.modules.lock().begin_launch(&record, adoption.clone());
        let inner = Arc::clone(self);
        let done = adoption.clone();
        self.launches.add(
            FutureOperation::new("launch_module", async move {
                let launched = inner.launch_component(&record).await;
                let target = Arc::clone(&inner);
                inner.queue.add(
                    FutureOperation::new("adopt_module", async move {
                        target.adopt(record, ticket, launched).await
                    }),
                    move |outcome| {
                        let _ = done.complete(outcome);
                    },
                );
            }),
            |()| {},
        );
        adoption
    }

    async fn launch_component(&self, record: &ModuleRecord) -> Result<LaunchedModule, LaunchError> {
        let config = ComponentConfig {
            url: record.url.clone(),
            module_path: record.path.clone(),
            intent: record.intent.clone(),
        };
        let launcher = Arc::clone(&self.services.launcher);
        let services = self.config.module_services.clone();
        let launch = Deferred::from_future(async move { launcher.launch(config, &services).await });

        let timeout = self.config.launch_timeout();
        match with_timeout(&launch, timeout).await {
            Ok(Bounded::Completed(result)) => result,
            Ok(Bounded::TimedOut) => {
                let story_id = self.story_id;
                let path = record.path.clone();
                let teardown = self.config.module_teardown_timeout();
                launch.then(move |late| {
                    if let Ok(launched) = late {
                        tracing::warn!(story = %story_id, module = %path, "launch finished past its bound, terminating");
                        let process = Arc::clone(&launched.process);
                        tokio::spawn(async move {
                            let _ = tokio::time::timeout(teardown, process.terminate()).await;
                        });
                    }
                });
                Err(LaunchError::TimedOut {
                    url: record.url.clone(),
                    timeout_ms: millis(timeout),
                })
            }
            Err(err) => Err(LaunchError::Failed {
                url: record.url.clone(),
                reason: err.to_string(),
            }),
        }
    }

    /// Take a finished launch into the running set, or discard it
    async fn adopt(
        self: &Arc<Self>,
        record: ModuleRecord,
        ticket: u64,
        launched: Result<LaunchedModule, LaunchError>,
    ) -> Result<ViewToken, StoryError> {
        let current = self.modules.lock().finish_launch(&record.path, ticket);
        let launched = match launched {
            Ok(launched) => launched,
            Err(err) => {
                tracing::warn!(story = %self.story_id, module = %record.path, error = %err, "module launch failed");
                if current {
                    self.release_pending().await;
                }
                return Err(err.into());
            }
        };

        if !current || self.state() != StoryState::Running {
            tracing::info!(story = %self.story_id, module = %record.path, "launch overtaken, terminating");
            let process = Arc::clone(&launched.process);
            self.bounded("terminate_module", self.config.module_teardown_timeout(), async move {
                process.terminate().await;
            })
            .await;
            return Err(StoryError::Cancelled(record.path.to_string()));
        }

        let already_running = self.modules.lock().get(&record.path).is_some();
        if already_running {
            let _ = self.teardown_module(&record.path, false).await;
        }

        let path = record.path.clone();
        let embedded = record.embedded;
        let generation = self.modules.lock().insert(
            record,
            Arc::clone(&launched.process),
            launched.view.clone(),
        );
        tracing::info!(story = %self.story_id, module = %path, generation, "module launched");
        self.watch_process(path.clone(), generation, launched.process);

        if !embedded {
            self.connect(&path).await;
        }
        Ok(launched.view)
    }

    fn watch_process(self: &Arc<Self>, path: ModulePath, generation: u64, process: Arc<dyn ModuleProcess>) {
        let owner = Arc::downgrade(self);
        tokio::spawn(async move {
            process.closed().await;
            let Some(inner) = owner.upgrade() else {
                return;
            };
            let target = Arc::clone(&inner);
            inner.queue.add(
                FutureOperation::new("module_closed", async move {
                    target.on_module_closed(&path, generation).await;
                }),
                |()| {},
            );
        });
    }

    async fn on_module_closed(self: &Arc<Self>, path: &ModulePath, generation: u64) {
        let removed = self.modules.lock().remove_generation(path, generation);
        if removed {
            tracing::warn!(story = %self.story_id, module = %path, "module closed unexpectedly, not restarting");
            self.release_pending().await;
        }
    }

    async fn connect(self: &Arc<Self>, path: &ModulePath) {
        let connection = self.modules.lock().connection(path);
        match connection {
            Connection::Ready(request) => self.hand_to_shell(request).await,
            Connection::Deferred => {
                tracing::debug!(story = %self.story_id, module = %path, "surface waits for its anchor");
            }
            Connection::Skip => {}
        }
    }

    /// Connect `request`, then every parked surface it unblocks
    async fn hand_to_shell(self: &Arc<Self>, request: SurfaceRequest) {
        let mut next = Some(request);
        while let Some(request) = next {
            if self.add_surface(&request).await {
                self.surface_connected(&request).await;
            }
            next = self.modules.lock().next_ready();
        }
    }

    /// Hand over parked surfaces whose anchor connected or went away
    async fn release_pending(self: &Arc<Self>) {
        if self.state() != StoryState::Running {
            return;
        }
        let next = self.modules.lock().next_ready();
        if let Some(request) = next {
            self.hand_to_shell(request).await;
        }
    }

    /// False if the shell did not accept the surface within its bound
    ///
    /// A late acceptance connects the surface from a follow-up operation.
    async fn add_surface(self: &Arc<Self>, request: &SurfaceRequest) -> bool {
        let shell = Arc::clone(&self.services.shell);
        let surface_id = request.surface_id.clone();
        let parent_id = request.parent_id.clone();
        let view = request.view.clone();
        let metadata = request.metadata.clone();
        let added = Deferred::from_future(async move {
            shell
                .add_surface(&surface_id, parent_id.as_deref(), view, metadata)
                .await;
        });

        let timeout = self.config.shell_request_timeout();
        match with_timeout(&added, timeout).await {
            Ok(Bounded::Completed(())) => true,
            Ok(Bounded::TimedOut) => {
                tracing::warn!(
                    story = %self.story_id,
                    surface = %request.surface_id,
                    timeout_ms = millis(timeout),
                    "shell has not accepted surface yet"
                );
                let owner = Arc::downgrade(self);
                let request = request.clone();
                added.then(move |_: &()| {
                    if let Some(inner) = owner.upgrade() {
                        inner.schedule_late_connection(request);
                    }
                });
                false
            }
            Err(err) => {
                tracing::warn!(story = %self.story_id, surface = %request.surface_id, error = %err, "add surface abandoned");
                false
            }
        }
    }

    fn schedule_late_connection(self: &Arc<Self>, request: SurfaceRequest) {
        let inner = Arc::clone(self);
        self.queue.add(
            FutureOperation::new("surface_accepted", async move {
                inner.surface_connected(&request).await;
                inner.release_pending().await;
            }),
            |()| {},
        );
    }

    async fn surface_connected(&self, request: &SurfaceRequest) {
        let connected = self
            .modules
            .lock()
            .mark_connected(&request.path, request.generation);
        if connected {
            tracing::debug!(story = %self.story_id, surface = %request.surface_id, "surface connected");
            if request.focus {
                self.shell_focus(&request.surface_id, true).await;
            }
        }
    }

    async fn shell_focus(&self, surface_id: &str, focus: bool) {
        let shell = Arc::clone(&self.services.shell);
        let surface_id = surface_id.to_string();
        let timeout = self.config.shell_request_timeout();
        if focus {
            self.bounded("focus_surface", timeout, async move {
                shell.focus_surface(&surface_id).await;
            })
            .await;
        } else {
            self.bounded("defocus_surface", timeout, async move {
                shell.defocus_surface(&surface_id).await;
            })
            .await;
        }
    }

    /// Race `step` against `timeout`; a late step is left to finish alone
    async fn bounded<F>(&self, step: &'static str, timeout: Duration, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match with_timeout(&Deferred::from_future(future), timeout).await {
            Ok(Bounded::Completed(())) => {}
            Ok(Bounded::TimedOut) => {
                tracing::warn!(
                    story = %self.story_id,
                    step,
                    timeout_ms = millis(timeout),
                    "step timed out, continuing"
                );
            }
            Err(err) => tracing::warn!(story = %self.story_id, step, error = %err, "step abandoned"),
        }
    }

    /// Returns false if `path` was not running
    ///
    /// A launch still underway for `path` is cancelled either way.
    async fn teardown_module(&self, path: &ModulePath, notify_shell: bool) -> bool {
        let target = {
            let mut modules = self.modules.lock();
            modules.cancel_launch(path);
            modules.get(path).map(|module| {
                let shell_knows = module.connected && module.record.is_external() && !module.record.embedded;
                (Arc::clone(&module.process), module.generation, shell_knows)
            })
        };
        let Some((process, generation, shell_knows)) = target else {
            return false;
        };
        let timeout = self.config.module_teardown_timeout();

        if notify_shell && shell_knows {
            let shell = Arc::clone(&self.services.shell);
            let surface_id = path.surface_id();
            self.bounded("defocus_surface", timeout, async move {
                shell.defocus_surface(&surface_id).await;
            })
            .await;
        }
        self.bounded("terminate_module", timeout, async move {
            process.terminate().await;
        })
        .await;

        self.modules.lock().remove_generation(path, generation);
        tracing::info!(story = %self.story_id, module = %path, "module torn down");
        true
    }

    /// Stop a running story that has no modules left, launched or launching
    async fn stop_if_empty(self: &Arc<Self>) {
        let none_left = self.modules.lock().is_empty();
        if none_left && self.state() == StoryState::Running {
            tracing::info!(story = %self.story_id, "last module deleted, stopping story");
            self.teardown_story().await;
        }
    }

    async fn detach_view(&self) {
        let detached = Deferred::<()>::new();
        let guard = SingleUse::new();

        {
            let detached = detached.clone();
            let guard = guard.clone();
            self.services.host.detach_view(
                &self.story_id,
                Box::new(move || {
                    if guard.take() {
                        let _ = detached.complete(());
                    }
                }),
            );
        }

        if !guard.is_taken() {
            let detached = detached.clone();
            let timeout = self.config.detach_view_timeout();
            let story_id = self.story_id;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if guard.take() {
                    tracing::warn!(story = %story_id, "view detach not confirmed, continuing");
                    let _ = detached.complete(());
                }
            });
        }

        let _ = detached.await;
    }

    async fn teardown_story(self: &Arc<Self>) {
        if self.state() == StoryState::Stopped {
            tracing::debug!(story = %self.story_id, "already stopped");
            return;
        }
        self.set_state(StoryState::Stopping);
        self.modules.lock().cancel_launches();
        self.detach_view().await;

        let teardowns = OperationCollection::new(format!("story:{}:teardown", self.story_id));
        let paths = self.modules.lock().paths();
        for path in paths {
            let inner = Arc::clone(self);
            teardowns.add(
                FutureOperation::new("teardown_module", async move {
                    let _ = inner.teardown_module(&path, true).await;
                }),
                |()| {},
            );
        }
        let _ = teardowns.wait_idle().await;

        let shell = Arc::clone(&self.services.shell);
        self.bounded("shell_teardown", self.config.shell_teardown_timeout(), async move {
            shell.teardown().await;
        })
        .await;
        self.set_state(StoryState::Stopped);
    }

    async fn on_record_updated(self: &Arc<Self>, record: ModuleRecord) {
        if self.state() != StoryState::Running {
            tracing::debug!(story = %self.story_id, module = %record.path, "record update while not running");
            return;
        }
        if record.deleted {
            if self.teardown_module(&record.path, true).await {
                self.stop_if_empty().await;
                self.release_pending().await;
            }
            return;
        }
        if record.embedded || !record.is_external() {
            tracing::debug!(story = %self.story_id, module = %record.path, "record launched by its parent, skipping");
            return;
        }
        // Failures are logged when the launch is adopted.
        let _ = self.launch_module(record).await;
    }

    async fn add_module(
        self: &Arc<Self>,
        request: ModuleRequest,
    ) -> Result<Option<(bool, Adoption)>, StoryError> {
        let embedded = request.embedded;
        let path = request.parent.child(request.name);
        if !path.is_module_path() {
            return Err(StoryError::InvalidPath(path.to_string()));
        }
        let mut record = ModuleRecord::new(path, request.intent.handler.clone(), request.intent)
            .with_source(request.source)
            .with_embedded(embedded);
        if let Some(relation) = request.surface_relation {
            record = record.with_surface_relation(relation);
        }

        self.storage.write_module_record(record.clone()).await?;
        if self.state() != StoryState::Running {
            return Ok(None);
        }
        let adoption = self.launch_module(record).await;
        Ok(Some((embedded, adoption)))
    }

    async fn delete_module(self: &Arc<Self>, path: ModulePath) -> Result<(), StoryError> {
        if self.storage.read_module_record(&path).await?.is_none() {
            return Err(StoryError::module_not_found(&path));
        }
        self.storage
            .update_module_record(path.clone(), |record| {
                if let Some(record) = record {
                    record.deleted = true;
                }
            })
            .await?;
        let _ = self.teardown_module(&path, true).await;
        self.stop_if_empty().await;
        self.release_pending().await;
        Ok(())
    }

    async fn set_focus(&self, path: ModulePath, focus: bool) -> Result<(), StoryError> {
        if self.state() != StoryState::Running {
            return Err(StoryError::Stopped);
        }
        let connected = self.modules.lock().get(&path).map(|module| module.connected);
        match connected {
            None => Err(StoryError::module_not_found(&path)),
            Some(false) => {
                tracing::debug!(story = %self.story_id, module = %path, "surface not connected, focus ignored");
                Ok(())
            }
            Some(true) => {
                self.shell_focus(&path.surface_id(), focus).await;
                Ok(())
            }
        }
    }
}
