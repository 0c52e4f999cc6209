//! Registry of live stories
//!
//! Maps story ids to controllers. Each story gets its own storage, shell,
//! and queue; the launcher and host are shared by every story.

use crate::config::RuntimeConfig;
use crate::controller::{StoryController, StoryServices};
use crate::launcher::Launcher;
use crate::shell::{ShellFactory, StoryHost};
use crate::story_id::StoryId;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use storyline_storage::{Store, StoryStorage};

/// Live stories by id
pub struct StoryRegistry {
    stories: DashMap<StoryId, StoryController>,
    launcher: Arc<dyn Launcher>,
    host: Arc<dyn StoryHost>,
    shells: Arc<dyn ShellFactory>,
    config: RuntimeConfig,
}

impl StoryRegistry {
    /// Create empty registry
    #[must_use]
    pub fn new(
        launcher: Arc<dyn Launcher>,
        host: Arc<dyn StoryHost>,
        shells: Arc<dyn ShellFactory>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            stories: DashMap::new(),
            launcher,
            host,
            shells,
            config,
        }
    }

    /// Controller of story `id` on `store`, created stopped if new
    ///
    /// An existing story keeps its controller; `store` is then unused.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn create_story(&self, id: StoryId, store: Arc<dyn Store>) -> StoryController {
        self.stories
            .entry(id)
            .or_insert_with(|| {
                tracing::info!(story = %id, "story created");
                let storage = StoryStorage::new(id.to_string(), store, self.config.storage.clone());
                let services = StoryServices {
                    launcher: Arc::clone(&self.launcher),
                    shell: self.shells.create_shell(&id),
                    host: Arc::clone(&self.host),
                };
                StoryController::new(id, storage, services, self.config.clone())
            })
            .clone()
    }

    /// Controller of story `id`
    #[must_use]
    pub fn get(&self, id: &StoryId) -> Option<StoryController> {
        self.stories.get(id).map(|entry| entry.value().clone())
    }

    /// Stop story `id` and forget it
    ///
    /// Returns false if no such story exists.
    pub async fn delete_story(&self, id: &StoryId) -> bool {
        let Some((_, controller)) = self.stories.remove(id) else {
            return false;
        };
        if let Err(err) = controller.stop().await {
            tracing::warn!(story = %id, error = %err, "story stop failed during delete");
        }
        tracing::info!(story = %id, "story deleted");
        true
    }

    /// Ids of every live story, sorted
    #[must_use]
    pub fn story_ids(&self) -> Vec<StoryId> {
        let mut ids: Vec<StoryId> = self.stories.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Number of live stories
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stories.len()
    }

    /// Check if no story is live
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Stop every story concurrently; stories stay registered
    pub async fn stop_all(&self) {
        let controllers: Vec<StoryController> =
            self.stories.iter().map(|entry| entry.value().clone()).collect();
        let results = futures::future::join_all(controllers.iter().map(StoryController::stop)).await;
        for (controller, result) in controllers.iter().zip(results) {
            if let Err(err) = result {
                tracing::warn!(story = %controller.story_id(), error = %err, "story stop failed");
            }
        }
    }
}

impl fmt::Debug for StoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryRegistry")
            .field("stories", &self.stories.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
