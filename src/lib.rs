//! Frame Graph - a render graph that schedules passes and plans GPU barriers
//!
//! Rendering code declares, per pass, which resources it creates, reads and
//! writes. The graph then works out:
//! - Pass ordering, grouped into dependency levels
//! - Transient resource lifetimes, with reuse of retired GPU objects
//! - The minimal set of state transitions between levels
//! - Parallel recording of independent passes
//!
//! The graphics API is reached only through the traits in [`backend`]. A
//! recording [`backend::DummyBackend`] is provided for tests and headless
//! runs.

pub mod backend;
pub mod pipeline;
pub mod render_graph;

pub use backend::{DummyBackend, GraphicsBackend, ResourceState, ResourceStateManager, TrackedStateManager};
pub use render_graph::{GraphBuilder, GraphError, GraphResult, RenderGraph, RenderPass, ResourceId, ResourceViewId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration of a render graph instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Panic on lifetime-window violations and incompatible view formats
    pub validation: bool,
    /// Record the passes of a level on worker threads
    pub parallel_recording: bool,
    /// Drop passes whose outputs never reach the final output
    pub prune_unreachable_passes: bool,
    /// Keep retired transient objects for reuse instead of destroying them
    pub reuse_transient_resources: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            parallel_recording: false,
            prune_unreachable_passes: false,
            reuse_transient_resources: true,
        }
    }
}

impl GraphConfig {
    pub fn with_parallel_recording(mut self, enabled: bool) -> Self {
        self.parallel_recording = enabled;
        self
    }

    pub fn with_pruning(mut self, enabled: bool) -> Self {
        self.prune_unreachable_passes = enabled;
        self
    }

    pub fn with_resource_reuse(mut self, enabled: bool) -> Self {
        self.reuse_transient_resources = enabled;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }
}

/// Log the crate version
pub fn init() {
    log::info!("Frame graph v{}", VERSION);
}
