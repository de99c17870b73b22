//! Dummy GPU backend for testing and headless runs.
//!
//! This backend doesn't perform any GPU work. It hands out handles, keeps
//! track of what is alive and records every command so tests can inspect
//! the exact stream the graph produced.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use glam::Vec4;

use crate::backend::state::{ResourceState, TransitionBarrier};
use crate::backend::traits::*;
use crate::backend::types::*;

/// A command recorded by [`DummyCommandList`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Barriers(Vec<TransitionBarrier>),
    CopyResource {
        dst: GpuResourceHandle,
        src: GpuResourceHandle,
    },
    ComputeConstants {
        slot: u32,
        data: Vec<u32>,
    },
    Dispatch(u32, u32, u32),
    ClearRenderTarget {
        view: DescriptorHandle,
        color: Vec4,
    },
    ClearDepthStencil {
        view: DescriptorHandle,
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    SetRenderTargets {
        render_targets: Vec<DescriptorHandle>,
        depth_stencil: Option<DescriptorHandle>,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
}

/// Command list that only records
#[derive(Debug, Clone)]
pub struct DummyCommandList {
    queue: QueueType,
    name: String,
    commands: Vec<RecordedCommand>,
}

impl DummyCommandList {
    pub fn new(queue: QueueType, name: &str) -> Self {
        Self {
            queue,
            name: name.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Barrier batches recorded into this list.
    pub fn barrier_batches(&self) -> Vec<&[TransitionBarrier]> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::Barriers(batch) => Some(batch.as_slice()),
                _ => None,
            })
            .collect()
    }
}

impl CommandList for DummyCommandList {
    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn resource_barriers(&mut self, barriers: &[TransitionBarrier]) {
        self.commands.push(RecordedCommand::Barriers(barriers.to_vec()));
    }

    fn copy_resource(&mut self, dst: GpuResourceHandle, src: GpuResourceHandle) {
        self.commands.push(RecordedCommand::CopyResource { dst, src });
    }

    fn set_compute_constants(&mut self, slot: u32, data: &[u32]) {
        self.commands.push(RecordedCommand::ComputeConstants {
            slot,
            data: data.to_vec(),
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(RecordedCommand::Dispatch(x, y, z));
    }

    fn as_graphics(&mut self) -> Option<&mut dyn GraphicsCommandList> {
        match self.queue {
            QueueType::Direct => Some(self),
            QueueType::Compute => None,
        }
    }
}

impl GraphicsCommandList for DummyCommandList {
    fn clear_render_target(&mut self, view: DescriptorHandle, color: Vec4) {
        self.commands
            .push(RecordedCommand::ClearRenderTarget { view, color });
    }

    fn clear_depth_stencil(&mut self, view: DescriptorHandle, depth: Option<f32>, stencil: Option<u8>) {
        self.commands.push(RecordedCommand::ClearDepthStencil {
            view,
            depth,
            stencil,
        });
    }

    fn set_render_targets(&mut self, render_targets: &[DescriptorHandle], depth_stencil: Option<DescriptorHandle>) {
        self.commands.push(RecordedCommand::SetRenderTargets {
            render_targets: render_targets.to_vec(),
            depth_stencil,
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(RecordedCommand::SetViewport(viewport));
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.commands.push(RecordedCommand::SetScissorRect(rect));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands
            .push(RecordedCommand::Draw { vertices, instances });
    }
}

/// Description of an object created through the dummy backend
#[derive(Debug, Clone, PartialEq)]
pub enum DummyResource {
    Texture(TextureDescriptor),
    Buffer(BufferDescriptor, BufferType),
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    next_handle: u64,
    next_descriptor: BTreeMap<DescriptorHeapType, u32>,
    resources: BTreeMap<GpuResourceHandle, DummyResource>,
    created: Vec<GpuResourceHandle>,
    destroyed: Vec<GpuResourceHandle>,
    descriptors: BTreeSet<DescriptorHandle>,
    views: Vec<(GpuResourceHandle, ViewDesc, DescriptorHandle)>,
    submitted: Vec<DummyCommandList>,
    recycled: usize,
    swapchain_format: TextureFormat,
    swapchain_size: (u32, u32),
    fail_texture_after: Option<usize>,
    fail_submit_after: Option<usize>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a new dummy backend with a 1280x720 swapchain.
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            next_descriptor: BTreeMap::new(),
            resources: BTreeMap::new(),
            created: Vec::new(),
            destroyed: Vec::new(),
            descriptors: BTreeSet::new(),
            views: Vec::new(),
            submitted: Vec::new(),
            recycled: 0,
            swapchain_format: TextureFormat::Bgra8UnormSrgb,
            swapchain_size: (1280, 720),
            fail_texture_after: None,
            fail_submit_after: None,
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    pub fn with_swapchain_size(mut self, width: u32, height: u32) -> Self {
        self.swapchain_size = (width, height);
        self
    }

    /// Simulate a window resize.
    pub fn set_swapchain_size(&mut self, width: u32, height: u32) {
        self.swapchain_size = (width, height);
    }

    /// Fail texture creation once `count` more textures have been created.
    pub fn fail_texture_creation_after(&mut self, count: usize) {
        self.fail_texture_after = Some(count);
    }

    /// Fail submission once `count` more submissions have succeeded.
    pub fn fail_submit_after(&mut self, count: usize) {
        self.fail_submit_after = Some(count);
    }

    pub fn clear_failures(&mut self) {
        self.fail_texture_after = None;
        self.fail_submit_after = None;
    }

    pub fn resource(&self, handle: GpuResourceHandle) -> Option<&DummyResource> {
        self.resources.get(&handle)
    }

    pub fn is_alive(&self, handle: GpuResourceHandle) -> bool {
        self.resources.contains_key(&handle)
    }

    pub fn live_resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Every object ever created, in creation order.
    pub fn created(&self) -> &[GpuResourceHandle] {
        &self.created
    }

    /// Every object destroyed, in destruction order.
    pub fn destroyed(&self) -> &[GpuResourceHandle] {
        &self.destroyed
    }

    pub fn live_descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Views written so far.
    pub fn views(&self) -> &[(GpuResourceHandle, ViewDesc, DescriptorHandle)] {
        &self.views
    }

    /// Lists submitted so far, in submission order.
    pub fn submitted(&self) -> &[DummyCommandList] {
        &self.submitted
    }

    pub fn recycled_count(&self) -> usize {
        self.recycled
    }

    /// Forget submitted lists, typically between frames.
    pub fn clear_submitted(&mut self) {
        self.submitted.clear();
    }

    /// All barrier batches from submitted lists, in submission order.
    pub fn barrier_batches(&self) -> Vec<Vec<TransitionBarrier>> {
        self.submitted
            .iter()
            .flat_map(|list| list.barrier_batches())
            .map(|batch| batch.to_vec())
            .collect()
    }

    fn allocate_handle(&mut self, resource: DummyResource) -> GpuResourceHandle {
        let handle = GpuResourceHandle(self.next_handle);
        self.next_handle += 1;
        self.resources.insert(handle, resource);
        self.created.push(handle);
        handle
    }

    fn countdown(counter: &mut Option<usize>) -> bool {
        match counter {
            Some(0) => {
                *counter = None;
                true
            }
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }
}

impl GraphicsBackend for DummyBackend {
    type CommandList = DummyCommandList;

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> BackendResult<GpuResourceHandle> {
        if Self::countdown(&mut self.fail_texture_after) {
            return Err(BackendError::TextureCreationFailed(format!(
                "injected failure for {:?}",
                desc.label
            )));
        }
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.depth_or_array_size,
            initial_state
        );
        Ok(self.allocate_handle(DummyResource::Texture(desc.clone())))
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDescriptor,
        buffer_type: BufferType,
        initial_state: ResourceState,
    ) -> BackendResult<GpuResourceHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {}, {:?}, {:?})",
            desc.label,
            desc.size,
            buffer_type,
            initial_state
        );
        Ok(self.allocate_handle(DummyResource::Buffer(desc.clone(), buffer_type)))
    }

    fn destroy_resource(&mut self, resource: GpuResourceHandle) {
        if self.resources.remove(&resource).is_some() {
            log::trace!("DummyBackend: destroying {:?}", resource);
            self.destroyed.push(resource);
        } else {
            log::warn!("DummyBackend: destroying unknown resource {:?}", resource);
        }
    }

    fn allocate_descriptor(
        &mut self,
        heap: DescriptorHeapType,
        count: u32,
    ) -> BackendResult<DescriptorHandle> {
        let next = self.next_descriptor.entry(heap).or_insert(0);
        let handle = DescriptorHandle { heap, index: *next };
        *next += count.max(1);
        self.descriptors.insert(handle);
        Ok(handle)
    }

    fn free_descriptor(&mut self, descriptor: DescriptorHandle) {
        self.descriptors.remove(&descriptor);
    }

    fn create_view(
        &mut self,
        resource: GpuResourceHandle,
        view: &ViewDesc,
        descriptor: DescriptorHandle,
    ) -> BackendResult<()> {
        if !self.resources.contains_key(&resource) {
            return Err(BackendError::InvalidHandle(resource));
        }
        if view.heap_type() != descriptor.heap {
            return Err(BackendError::ViewCreationFailed(format!(
                "{} view written into {:?} heap",
                view.kind_name(),
                descriptor.heap
            )));
        }
        self.views.push((resource, *view, descriptor));
        Ok(())
    }

    fn begin_command_list(
        &mut self,
        queue: QueueType,
        label: &str,
    ) -> BackendResult<Self::CommandList> {
        Ok(DummyCommandList::new(queue, label))
    }

    fn submit(&mut self, lists: Vec<Self::CommandList>) -> BackendResult<()> {
        if Self::countdown(&mut self.fail_submit_after) {
            return Err(BackendError::SubmitFailed("injected failure".to_string()));
        }
        for list in &lists {
            log::trace!(
                "DummyBackend: submitting {:?} list '{}' ({} commands)",
                list.queue,
                list.name,
                list.commands.len()
            );
        }
        self.submitted.extend(lists);
        Ok(())
    }

    fn recycle_command_list(&mut self, _list: Self::CommandList) {
        self.recycled += 1;
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.swapchain_format
    }

    fn swapchain_size(&self) -> (u32, u32) {
        self.swapchain_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_destroy() {
        let mut backend = DummyBackend::new();
        let desc = TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm);
        let texture = backend.create_texture(&desc, ResourceState::COMMON).unwrap();
        assert!(backend.is_alive(texture));
        assert_eq!(backend.live_resource_count(), 1);

        backend.destroy_resource(texture);
        assert!(!backend.is_alive(texture));
        assert_eq!(backend.destroyed(), &[texture]);
    }

    #[test]
    fn test_injected_texture_failure() {
        let mut backend = DummyBackend::new();
        backend.fail_texture_creation_after(1);
        let desc = TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm);
        assert!(backend.create_texture(&desc, ResourceState::COMMON).is_ok());
        assert!(matches!(
            backend.create_texture(&desc, ResourceState::COMMON),
            Err(BackendError::TextureCreationFailed(_))
        ));
        assert!(backend.create_texture(&desc, ResourceState::COMMON).is_ok());
    }

    #[test]
    fn test_graphics_capability_follows_queue() {
        let mut direct = DummyCommandList::new(QueueType::Direct, "direct");
        let mut compute = DummyCommandList::new(QueueType::Compute, "compute");
        assert!(direct.as_graphics().is_some());
        assert!(compute.as_graphics().is_none());
    }

    #[test]
    fn test_view_heap_mismatch_is_rejected() {
        let mut backend = DummyBackend::new();
        let desc = TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm);
        let texture = backend.create_texture(&desc, ResourceState::COMMON).unwrap();
        let descriptor = backend
            .allocate_descriptor(DescriptorHeapType::ResourceView, 1)
            .unwrap();
        let result = backend.create_view(texture, &ViewDesc::RenderTarget(None), descriptor);
        assert!(matches!(result, Err(BackendError::ViewCreationFailed(_))));
    }
}
