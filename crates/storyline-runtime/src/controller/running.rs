//! Running module bookkeeping
//!
//! [`ModuleSet`] is plain data guarded by the controller's lock. It decides
//! launches and surface connections, but never awaits anything itself.
//!
//! A surface attaches to its anchor, the nearest non-embedded ancestor that
//! is running or being launched. It waits while the anchor is not connected
//! yet and goes to the shell without a parent when there is no anchor.

use crate::error::StoryError;
use crate::launcher::{ModuleProcess, ViewToken};
use crate::shell::SurfaceMetadata;
use std::collections::BTreeMap;
use std::sync::Arc;
use storyline_async::Deferred;
use storyline_storage::{Intent, ModulePath, ModuleRecord};

/// Completes once a launch was adopted into the story, or failed
pub(crate) type Adoption = Deferred<Result<ViewToken, StoryError>>;

pub(crate) struct RunningModule {
    pub(crate) record: ModuleRecord,
    pub(crate) process: Arc<dyn ModuleProcess>,
    pub(crate) view: ViewToken,
    pub(crate) connected: bool,
    pub(crate) generation: u64,
}

/// What to do with a record that should be running
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LaunchDecision {
    Launch,
    /// Running with a different intent
    Relaunch,
    /// Running with the same intent
    Unchanged(ViewToken),
    /// Being launched with the same intent
    InFlight,
}

struct InFlightLaunch {
    ticket: u64,
    intent: Intent,
    embedded: bool,
    adoption: Adoption,
}

enum Anchor {
    Connected(String),
    Waiting,
    Absent,
}

/// Surface ready to be handed to the shell
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SurfaceRequest {
    pub(crate) path: ModulePath,
    pub(crate) surface_id: String,
    pub(crate) parent_id: Option<String>,
    pub(crate) view: ViewToken,
    pub(crate) metadata: SurfaceMetadata,
    pub(crate) generation: u64,
    pub(crate) focus: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Connection {
    Ready(SurfaceRequest),
    /// Waiting for the anchor to connect
    Deferred,
    /// Not running, embedded or already connected
    Skip,
}

#[derive(Default)]
pub(crate) struct ModuleSet {
    running: BTreeMap<ModulePath, RunningModule>,
    /// Surface id to path of modules waiting for their anchor
    pending: BTreeMap<String, ModulePath>,
    launching: BTreeMap<ModulePath, InFlightLaunch>,
    next_generation: u64,
}

impl ModuleSet {
    pub(crate) fn launch_decision(&self, record: &ModuleRecord) -> LaunchDecision {
        match self.running.get(&record.path) {
            Some(module) if module.record.intent != record.intent => LaunchDecision::Relaunch,
            Some(module) => LaunchDecision::Unchanged(module.view.clone()),
            None => match self.launching.get(&record.path) {
                Some(launch) if launch.intent == record.intent => LaunchDecision::InFlight,
                _ => LaunchDecision::Launch,
            },
        }
    }

    fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Register a launch of `record`; returns its ticket
    ///
    /// A newer launch of the same path replaces the older one.
    pub(crate) fn begin_launch(&mut self, record: &ModuleRecord, adoption: Adoption) -> u64 {
        let ticket = self.next_generation();
        self.launching.insert(
            record.path.clone(),
            InFlightLaunch {
                ticket,
                intent: record.intent.clone(),
                embedded: record.embedded,
                adoption,
            },
        );
        ticket
    }

    /// Adoption of the launch underway at `path`
    pub(crate) fn adoption(&self, path: &ModulePath) -> Option<Adoption> {
        self.launching.get(path).map(|launch| launch.adoption.clone())
    }

    /// End launch `ticket`; false if it was replaced or cancelled
    pub(crate) fn finish_launch(&mut self, path: &ModulePath, ticket: u64) -> bool {
        match self.launching.get(path) {
            Some(launch) if launch.ticket == ticket => {
                self.launching.remove(path);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn cancel_launch(&mut self, path: &ModulePath) {
        self.launching.remove(path);
    }

    pub(crate) fn cancel_launches(&mut self) {
        self.launching.clear();
    }

    /// Track a launched module; returns its generation
    pub(crate) fn insert(
        &mut self,
        record: ModuleRecord,
        process: Arc<dyn ModuleProcess>,
        view: ViewToken,
    ) -> u64 {
        let generation = self.next_generation();
        self.pending.remove(&record.path.surface_id());
        self.running.insert(
            record.path.clone(),
            RunningModule {
                record,
                process,
                view,
                connected: false,
                generation,
            },
        );
        generation
    }

    pub(crate) fn get(&self, path: &ModulePath) -> Option<&RunningModule> {
        self.running.get(path)
    }

    /// Keep the latest record of a running module without relaunching it
    pub(crate) fn refresh_record(&mut self, record: &ModuleRecord) {
        if let Some(module) = self.running.get_mut(&record.path) {
            module.record = record.clone();
        }
    }

    pub(crate) fn remove(&mut self, path: &ModulePath) -> Option<RunningModule> {
        self.pending.remove(&path.surface_id());
        self.running.remove(path)
    }

    /// Remove `path` only if it is still the launch `generation`
    pub(crate) fn remove_generation(&mut self, path: &ModulePath, generation: u64) -> bool {
        if self.running.get(path).map(|m| m.generation) == Some(generation) {
            self.remove(path);
            true
        } else {
            false
        }
    }

    fn anchor(&self, path: &ModulePath) -> Anchor {
        for ancestor in path.ancestors() {
            if let Some(module) = self.running.get(&ancestor) {
                if module.record.embedded {
                    continue;
                }
                return if module.connected {
                    Anchor::Connected(ancestor.surface_id())
                } else {
                    Anchor::Waiting
                };
            }
            if self.launching.get(&ancestor).is_some_and(|launch| !launch.embedded) {
                return Anchor::Waiting;
            }
        }
        Anchor::Absent
    }

    /// Decide whether `path` can be handed to the shell now
    ///
    /// A deferred module is parked in the pending map until
    /// [`next_ready`](Self::next_ready) releases it.
    pub(crate) fn connection(&mut self, path: &ModulePath) -> Connection {
        match self.running.get(path) {
            Some(module) if !module.record.embedded && !module.connected => {}
            _ => return Connection::Skip,
        }
        match self.request_for(path) {
            Some(request) => Connection::Ready(request),
            None => {
                self.pending.insert(path.surface_id(), path.clone());
                Connection::Deferred
            }
        }
    }

    /// Take the next parked module whose anchor connected or went away
    pub(crate) fn next_ready(&mut self) -> Option<SurfaceRequest> {
        self.pending.retain(|_, path| self.running.contains_key(path));
        let (surface_id, request) = self
            .pending
            .iter()
            .find_map(|(surface_id, path)| {
                self.request_for(path)
                    .map(|request| (surface_id.clone(), request))
            })?;
        self.pending.remove(&surface_id);
        Some(request)
    }

    fn request_for(&self, path: &ModulePath) -> Option<SurfaceRequest> {
        let module = self.running.get(path)?;
        let parent_id = match self.anchor(path) {
            Anchor::Connected(parent_id) => Some(parent_id),
            Anchor::Waiting => return None,
            Anchor::Absent => None,
        };
        Some(SurfaceRequest {
            path: path.clone(),
            surface_id: path.surface_id(),
            parent_id,
            view: module.view.clone(),
            metadata: SurfaceMetadata {
                relation: module.record.surface_relation.unwrap_or_default(),
                source: module.record.source,
            },
            generation: module.generation,
            focus: module.record.is_external(),
        })
    }

    /// Record that the shell accepted the surface of launch `generation`
    pub(crate) fn mark_connected(&mut self, path: &ModulePath, generation: u64) -> bool {
        match self.running.get_mut(path) {
            Some(module) if module.generation == generation => {
                module.connected = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn paths(&self) -> Vec<ModulePath> {
        self.running.keys().cloned().collect()
    }

    pub(crate) fn connected_surface_ids(&self) -> Vec<String> {
        self.running
            .values()
            .filter(|module| module.connected)
            .map(|module| module.record.path.surface_id())
            .collect()
    }

    pub(crate) fn pending_surface_ids(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Check if nothing is running or being launched
    pub(crate) fn is_empty(&self) -> bool {
        self.running.is_empty() && self.launching.is_empty()
    }
}
