//! Shell and host interfaces
//!
//! The [`Shell`] arranges module surfaces of one story. Surface ids are
//! module paths serialized with escaped segments joined by `:`. The
//! [`StoryHost`] owns the story's own top-level view.

use crate::launcher::ViewToken;
use crate::story_id::StoryId;
use async_trait::async_trait;
use std::sync::Arc;
use storyline_storage::{ModuleSource, SurfaceRelation};

/// Surface details handed to the shell
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMetadata {
    /// Relation to the parent surface
    pub relation: SurfaceRelation,
    /// Who added the module
    pub source: ModuleSource,
}

/// Visual shell of one story
///
/// Every method resolves once the shell finished the request.
#[async_trait]
pub trait Shell: Send + Sync + 'static {
    /// Open the shell connection
    async fn start(&self);

    /// Show `view` as `surface_id`, anchored to `parent_id` if any
    async fn add_surface(
        &self,
        surface_id: &str,
        parent_id: Option<&str>,
        view: ViewToken,
        metadata: SurfaceMetadata,
    );

    /// Give `surface_id` focus
    async fn focus_surface(&self, surface_id: &str);

    /// Remove focus from `surface_id`
    async fn defocus_surface(&self, surface_id: &str);

    /// Close the shell connection
    async fn teardown(&self);
}

/// Creates the shell of a story
pub trait ShellFactory: Send + Sync + 'static {
    /// Shell for `story_id`
    fn create_shell(&self, story_id: &StoryId) -> Arc<dyn Shell>;
}

impl<F> ShellFactory for F
where
    F: Fn(&StoryId) -> Arc<dyn Shell> + Send + Sync + 'static,
{
    fn create_shell(&self, story_id: &StoryId) -> Arc<dyn Shell> {
        self(story_id)
    }
}

/// Environment owning the story's top-level view
pub trait StoryHost: Send + Sync + 'static {
    /// Detach the story view; call `done` once detached
    ///
    /// `done` may be called from any thread, or never.
    fn detach_view(&self, story_id: &StoryId, done: Box<dyn FnOnce() + Send>);
}
