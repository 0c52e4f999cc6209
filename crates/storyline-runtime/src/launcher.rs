//! Component launching interface
//!
//! The runtime never starts processes itself. A [`Launcher`] turns a
//! [`ComponentConfig`] into a running [`ModuleProcess`] plus the
//! [`ViewToken`] of its surface.

use crate::error::LaunchError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use storyline_storage::{Intent, ModulePath};

/// Opaque handle to a module's visual surface
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewToken(String);

impl ViewToken {
    /// Create token
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentConfig {
    /// Component url
    pub url: String,
    /// Path of the module being launched
    pub module_path: ModulePath,
    /// Intent to hand to the component
    pub intent: Intent,
}

/// Running module process
#[async_trait]
pub trait ModuleProcess: Send + Sync + 'static {
    /// Resolve once the process has exited, for whatever reason
    async fn closed(&self);

    /// Ask the process to shut down; resolves once it acknowledged
    async fn terminate(&self);
}

/// Result of a successful launch
#[derive(Clone)]
pub struct LaunchedModule {
    /// Surface of the module
    pub view: ViewToken,
    /// Process handle
    pub process: Arc<dyn ModuleProcess>,
}

impl fmt::Debug for LaunchedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchedModule")
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

/// Starts module components
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Launch `config`, offering it `services`
    ///
    /// # Errors
    /// `LaunchError` if the component cannot be started.
    async fn launch(
        &self,
        config: ComponentConfig,
        services: &[String],
    ) -> Result<LaunchedModule, LaunchError>;
}
