//! Core backend abstraction traits
//!
//! These traits define the narrow interface the render graph needs from a
//! graphics API: object creation, descriptor allocation and command lists.

use crate::backend::state::{ResourceState, TransitionBarrier};
use crate::backend::types::*;
use glam::Vec4;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to allocate descriptor: {0}")]
    DescriptorAllocationFailed(String),
    #[error("Failed to create view: {0}")]
    ViewCreationFailed(String),
    #[error("Failed to begin command list: {0}")]
    CommandListCreationFailed(String),
    #[error("Failed to submit command lists: {0}")]
    SubmitFailed(String),
    #[error("Unknown resource handle {0:?}")]
    InvalidHandle(GpuResourceHandle),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture or buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuResourceHandle(pub(crate) u64);

impl GpuResourceHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle to a descriptor slot in one of the backend's heaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorHandle {
    pub heap: DescriptorHeapType,
    pub index: u32,
}

/// Main graphics backend trait
pub trait GraphicsBackend: Send {
    type CommandList: CommandList + Send + 'static;

    // Resource creation

    /// Create a texture in `initial_state`
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> BackendResult<GpuResourceHandle>;

    /// Create a buffer in `initial_state`
    fn create_buffer(
        &mut self,
        desc: &BufferDescriptor,
        buffer_type: BufferType,
        initial_state: ResourceState,
    ) -> BackendResult<GpuResourceHandle>;

    /// Destroy a texture or buffer
    fn destroy_resource(&mut self, resource: GpuResourceHandle);

    // Descriptors

    /// Allocate `count` contiguous descriptors
    fn allocate_descriptor(
        &mut self,
        heap: DescriptorHeapType,
        count: u32,
    ) -> BackendResult<DescriptorHandle>;

    fn free_descriptor(&mut self, descriptor: DescriptorHandle);

    /// Write a view of `resource` into `descriptor`
    fn create_view(
        &mut self,
        resource: GpuResourceHandle,
        view: &ViewDesc,
        descriptor: DescriptorHandle,
    ) -> BackendResult<()>;

    // Command recording and execution

    fn begin_command_list(
        &mut self,
        queue: QueueType,
        label: &str,
    ) -> BackendResult<Self::CommandList>;

    /// Submit lists for execution, in order
    fn submit(&mut self, lists: Vec<Self::CommandList>) -> BackendResult<()>;

    /// Return a list that will not be submitted
    fn recycle_command_list(&mut self, list: Self::CommandList);

    // Swapchain

    fn swapchain_format(&self) -> TextureFormat;

    /// Current output surface size
    fn swapchain_size(&self) -> (u32, u32);
}

/// Commands available on every queue
pub trait CommandList: Send {
    fn queue_type(&self) -> QueueType;

    fn set_name(&mut self, name: &str);

    /// Record a batch of transitions
    fn resource_barriers(&mut self, barriers: &[TransitionBarrier]);

    fn copy_resource(&mut self, dst: GpuResourceHandle, src: GpuResourceHandle);

    /// Set 32-bit root constants for the next dispatch
    fn set_compute_constants(&mut self, slot: u32, data: &[u32]);

    /// Dispatch compute work
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Graphics commands, when the list records for the direct queue
    fn as_graphics(&mut self) -> Option<&mut dyn GraphicsCommandList>;
}

/// Commands only available on the direct queue
pub trait GraphicsCommandList: CommandList {
    fn clear_render_target(&mut self, view: DescriptorHandle, color: Vec4);

    fn clear_depth_stencil(&mut self, view: DescriptorHandle, depth: Option<f32>, stencil: Option<u8>);

    fn set_render_targets(&mut self, render_targets: &[DescriptorHandle], depth_stencil: Option<DescriptorHandle>);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_scissor_rect(&mut self, rect: ScissorRect);

    /// Draw primitives
    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>);
}
