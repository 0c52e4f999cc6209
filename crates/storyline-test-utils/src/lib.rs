//! Shared fakes and helpers for Storyline tests

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storyline_runtime::{
    ComponentConfig, LaunchError, LaunchedModule, Launcher, ModuleProcess, RuntimeConfig, Shell,
    StoryController, StoryHost, StoryId, StoryServices, SurfaceMetadata, ViewToken,
};
use storyline_storage::{Intent, MemoryStore, ModulePath, ModuleRecord, StoryStorage};
use tokio::sync::{watch, Notify};

/// Module process that closes when told to
pub struct FakeProcess {
    url: String,
    closed: watch::Sender<bool>,
    hang_on_terminate: AtomicBool,
    terminations: AtomicUsize,
}

impl FakeProcess {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            url: url.into(),
            closed,
            hang_on_terminate: AtomicBool::new(false),
            terminations: AtomicUsize::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Exit without being asked, like a crash
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Make `terminate` never acknowledge
    pub fn set_hang_on_terminate(&self, hang: bool) {
        self.hang_on_terminate.store(hang, Ordering::SeqCst);
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleProcess for FakeProcess {
    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_terminate.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.close();
    }
}

#[derive(Default)]
struct LauncherState {
    launches: Vec<ComponentConfig>,
    services: Vec<Vec<String>>,
    processes: Vec<(ModulePath, Arc<FakeProcess>)>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    stalled: HashSet<String>,
}

/// Launcher that records every launch and hands out [`FakeProcess`]es
#[derive(Default)]
pub struct FakeLauncher {
    state: Mutex<LauncherState>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every launch of `url`
    pub fn fail_url(&self, url: impl Into<String>) {
        self.state.lock().failing.insert(url.into());
    }

    /// Launches of `url` never return
    pub fn stall_url(&self, url: impl Into<String>) {
        self.state.lock().stalled.insert(url.into());
    }

    /// Processes launched from `url` ignore terminate
    pub fn hang_terminate_for(&self, url: impl Into<String>) {
        self.state.lock().hanging.insert(url.into());
    }

    pub fn launches(&self) -> Vec<ComponentConfig> {
        self.state.lock().launches.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.state.lock().launches.len()
    }

    /// Launches of `path`, oldest first
    pub fn launches_of(&self, path: &ModulePath) -> Vec<ComponentConfig> {
        self.state
            .lock()
            .launches
            .iter()
            .filter(|config| &config.module_path == path)
            .cloned()
            .collect()
    }

    /// Services offered to the latest launch
    pub fn last_services(&self) -> Option<Vec<String>> {
        self.state.lock().services.last().cloned()
    }

    /// Latest process launched for `path`
    pub fn process(&self, path: &ModulePath) -> Option<Arc<FakeProcess>> {
        self.state
            .lock()
            .processes
            .iter()
            .rev()
            .find(|(launched, _)| launched == path)
            .map(|(_, process)| Arc::clone(process))
    }

    /// Every process launched for `path`, oldest first
    pub fn processes(&self, path: &ModulePath) -> Vec<Arc<FakeProcess>> {
        self.state
            .lock()
            .processes
            .iter()
            .filter(|(launched, _)| launched == path)
            .map(|(_, process)| Arc::clone(process))
            .collect()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(
        &self,
        config: ComponentConfig,
        services: &[String],
    ) -> Result<LaunchedModule, LaunchError> {
        let stalled = self.state.lock().stalled.contains(&config.url);
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if state.failing.contains(&config.url) {
            return Err(LaunchError::Failed {
                url: config.url.clone(),
                reason: "refused by fake launcher".to_string(),
            });
        }

        let process = FakeProcess::new(config.url.clone());
        process.set_hang_on_terminate(state.hanging.contains(&config.url));
        let view = ViewToken::new(format!(
            "{}#{}",
            config.module_path.surface_id(),
            state.launches.len()
        ));
        state
            .processes
            .push((config.module_path.clone(), Arc::clone(&process)));
        state.services.push(services.to_vec());
        state.launches.push(config);

        Ok(LaunchedModule { view, process })
    }
}

/// Call received by [`FakeShell`]
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCall {
    Start,
    AddSurface {
        surface_id: String,
        parent_id: Option<String>,
        view: ViewToken,
        metadata: SurfaceMetadata,
    },
    Focus(String),
    Defocus(String),
    Teardown,
}

/// Shell that records its calls
#[derive(Default)]
pub struct FakeShell {
    calls: Mutex<Vec<ShellCall>>,
    hang_teardown: AtomicBool,
    held_surfaces: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `teardown` never finish
    pub fn set_hang_teardown(&self, hang: bool) {
        self.hang_teardown.store(hang, Ordering::SeqCst);
    }

    /// Keep `add_surface` of `surface_id` waiting until released
    pub fn hold_surface(&self, surface_id: impl Into<String>) {
        self.held_surfaces
            .lock()
            .insert(surface_id.into(), Arc::new(Notify::new()));
    }

    /// Let a held `add_surface` finish
    pub fn release_surface(&self, surface_id: &str) {
        let held = self.held_surfaces.lock().remove(surface_id);
        if let Some(held) = held {
            held.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls.lock().clone()
    }

    /// `(surface_id, parent_id)` of every added surface, in call order
    pub fn added_surfaces(&self) -> Vec<(String, Option<String>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ShellCall::AddSurface {
                    surface_id,
                    parent_id,
                    ..
                } => Some((surface_id.clone(), parent_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &ShellCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: ShellCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Shell for FakeShell {
    async fn start(&self) {
        self.record(ShellCall::Start);
    }

    async fn add_surface(
        &self,
        surface_id: &str,
        parent_id: Option<&str>,
        view: ViewToken,
        metadata: SurfaceMetadata,
    ) {
        self.record(ShellCall::AddSurface {
            surface_id: surface_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            view,
            metadata,
        });
        let held = self.held_surfaces.lock().get(surface_id).cloned();
        if let Some(held) = held {
            held.notified().await;
        }
    }

    async fn focus_surface(&self, surface_id: &str) {
        self.record(ShellCall::Focus(surface_id.to_string()));
    }

    async fn defocus_surface(&self, surface_id: &str) {
        self.record(ShellCall::Defocus(surface_id.to_string()));
    }

    async fn teardown(&self) {
        self.record(ShellCall::Teardown);
        if self.hang_teardown.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

/// Host whose detach either confirms at once or waits for [`release`](Self::release)
#[derive(Default)]
pub struct FakeHost {
    hold: AtomicBool,
    detaches: AtomicUsize,
    held: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Keep detach callbacks instead of calling them
    pub fn set_hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    /// Call every held callback
    pub fn release(&self) {
        let held = std::mem::take(&mut *self.held.lock());
        for done in held {
            done();
        }
    }
}

impl StoryHost for FakeHost {
    fn detach_view(&self, _story_id: &StoryId, done: Box<dyn FnOnce() + Send>) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            self.held.lock().push(done);
        } else {
            done();
        }
    }
}

pub fn path(segments: &[&str]) -> ModulePath {
    ModulePath::from(segments)
}

/// External record at `segments` launched from `handler`
pub fn module_record(segments: &[&str], handler: &str) -> ModuleRecord {
    ModuleRecord::new(path(segments), handler, Intent::new(handler))
}

/// Config with short teardown, launch and shell bounds
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig::default()
        .with_launch_timeout(Duration::from_millis(500))
        .with_shell_request_timeout(Duration::from_millis(200))
        .with_module_teardown_timeout(Duration::from_millis(200))
        .with_shell_teardown_timeout(Duration::from_millis(200))
        .with_detach_view_timeout(Duration::from_millis(200))
}

/// Poll `condition` until true or `timeout` elapsed
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// One story wired to fakes over a shared [`MemoryStore`]
pub struct StoryFixture {
    pub story_id: StoryId,
    pub store: Arc<MemoryStore>,
    pub launcher: Arc<FakeLauncher>,
    pub shell: Arc<FakeShell>,
    pub host: Arc<FakeHost>,
    pub controller: StoryController,
    config: RuntimeConfig,
}

impl StoryFixture {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let story_id = StoryId::new();
        let store = Arc::new(MemoryStore::new());
        let launcher = FakeLauncher::new();
        let shell = FakeShell::new();
        let host = FakeHost::new();
        let storage = StoryStorage::new(story_id.to_string(), store.clone(), config.storage.clone());
        let services = StoryServices {
            launcher: launcher.clone(),
            shell: shell.clone(),
            host: host.clone(),
        };
        let controller = StoryController::new(story_id, storage, services, config.clone());
        Self {
            story_id,
            store,
            launcher,
            shell,
            host,
            controller,
            config,
        }
    }

    /// Another writer on the same store, like a second device
    pub fn peer(&self) -> StoryStorage {
        StoryStorage::new(
            format!("{}:peer", self.story_id),
            self.store.clone(),
            self.config.storage.clone(),
        )
    }

    /// Until the story has run every queued operation and `condition` holds
    pub async fn settle<F>(&self, condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let reached = wait_until(Duration::from_secs(5), condition).await;
        let _ = self.controller.drained().await;
        reached
    }
}

impl Default for StoryFixture {
    fn default() -> Self {
        Self::new()
    }
}
