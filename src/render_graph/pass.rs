//! Render pass definitions for the render graph

use bitflags::bitflags;

use crate::backend::{CommandList, GraphicsCommandList, QueueType};
use crate::render_graph::error::GraphResult;
use crate::render_graph::resolver::ResourceResolver;
use crate::render_graph::storage::GraphStorage;

/// Unique identifier for a render pass, its registration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

impl PassId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Pass scheduling flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PassFlags: u32 {
        /// Scheduled and resolved, but never dispatched
        const CULL = 1 << 0;
        /// Kept even when its outputs do not reach the final output
        const NEVER_CULL = 1 << 1;
    }
}

/// Trait for render passes
pub trait RenderPass: Send + Sync {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Queue the pass records for
    fn queue_type(&self) -> QueueType {
        QueueType::Direct
    }

    fn flags(&self) -> PassFlags {
        PassFlags::empty()
    }

    /// Setup phase - declare resources and dependencies
    fn resolve_resources(&mut self, resolver: &mut ResourceResolver<'_>) -> GraphResult<()>;

    /// Execute phase - record commands
    ///
    /// Render targets are already cleared and bound, and the viewport covers
    /// the surface unless [`override_viewport`](Self::override_viewport)
    /// returned `true`.
    fn dispatch(&self, storage: &GraphStorage, command_list: &mut dyn CommandList);

    /// Set a custom viewport. Returns `true` when the default one must not be
    /// applied.
    fn override_viewport(&self, _storage: &GraphStorage, _command_list: &mut dyn GraphicsCommandList) -> bool {
        false
    }
}

/// Pass built from a pair of closures
pub struct LambdaPass<R, D>
where
    R: FnMut(&mut ResourceResolver<'_>) -> GraphResult<()> + Send + Sync,
    D: Fn(&GraphStorage, &mut dyn CommandList) + Send + Sync,
{
    name: String,
    queue: QueueType,
    flags: PassFlags,
    resolve: R,
    dispatch: D,
}

impl<R, D> LambdaPass<R, D>
where
    R: FnMut(&mut ResourceResolver<'_>) -> GraphResult<()> + Send + Sync,
    D: Fn(&GraphStorage, &mut dyn CommandList) + Send + Sync,
{
    pub fn new(name: impl Into<String>, resolve: R, dispatch: D) -> Self {
        Self {
            name: name.into(),
            queue: QueueType::Direct,
            flags: PassFlags::empty(),
            resolve,
            dispatch,
        }
    }

    pub fn with_queue(mut self, queue: QueueType) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_flags(mut self, flags: PassFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl<R, D> RenderPass for LambdaPass<R, D>
where
    R: FnMut(&mut ResourceResolver<'_>) -> GraphResult<()> + Send + Sync,
    D: Fn(&GraphStorage, &mut dyn CommandList) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn flags(&self) -> PassFlags {
        self.flags
    }

    fn resolve_resources(&mut self, resolver: &mut ResourceResolver<'_>) -> GraphResult<()> {
        (self.resolve)(resolver)
    }

    fn dispatch(&self, storage: &GraphStorage, command_list: &mut dyn CommandList) {
        (self.dispatch)(storage, command_list)
    }
}
