//! Storyline runtime
//!
//! Drives stories whose modules are described by records in
//! [`StoryStorage`](storyline_storage::StoryStorage):
//! - [`StoryController`]: per-story lifecycle on a serialized queue
//! - [`StoryRegistry`]: live stories by [`StoryId`]
//! - [`Launcher`], [`Shell`], [`StoryHost`]: collaborators supplied by the host
//! - [`RuntimeConfig`] and [`telemetry::init_tracing`]
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = StoryRegistry::new(launcher, host, Arc::new(make_shell), RuntimeConfig::default());
//! let story = registry.create_story(StoryId::new(), Arc::new(MemoryStore::new()));
//! story.add_module(ModuleRequest::new(ModulePath::root(), "map", Intent::new("app://map"))).await?;
//! story.request_start().await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod config;
mod controller;
mod error;
mod launcher;
mod registry;
mod shell;
mod story_id;
pub mod telemetry;

pub use config::{ConfigError, RuntimeConfig};
pub use controller::{ModuleRequest, StoryController, StoryServices, StoryState};
pub use error::{LaunchError, StoryError};
pub use launcher::{ComponentConfig, LaunchedModule, Launcher, ModuleProcess, ViewToken};
pub use registry::StoryRegistry;
pub use shell::{Shell, ShellFactory, StoryHost, SurfaceMetadata};
pub use story_id::StoryId;
pub use telemetry::{init_tracing, TelemetryConfig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
