//! Resource registry of a render graph
//!
//! [`GraphStorage`] owns every [`ResourceHandle`], the GPU objects behind
//! them, and a pool of retired transient objects waiting to be reused.

use std::collections::BTreeMap;

use crate::backend::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::resource::*;

#[derive(Debug)]
struct PooledResource {
    desc: ResourceDesc,
    resource: GpuResourceHandle,
}

/// Registry owning all resources of one graph
#[derive(Debug)]
pub struct GraphStorage {
    resources: BTreeMap<ResourceId, ResourceHandle>,
    lifetimes: BTreeMap<ResourceId, ResourceLifetime>,
    pool: Vec<PooledResource>,
    surface_size: (u32, u32),
    swapchain_format: TextureFormat,
    active_level: Option<usize>,
    validation: bool,
}

impl GraphStorage {
    pub fn new(surface_size: (u32, u32), swapchain_format: TextureFormat, validation: bool) -> Self {
        Self {
            resources: BTreeMap::new(),
            lifetimes: BTreeMap::new(),
            pool: Vec::new(),
            surface_size,
            swapchain_format,
            active_level: None,
            validation,
        }
    }

    // Accessors available to passes

    /// GPU object currently backing `id`.
    ///
    /// # Panics
    ///
    /// With validation enabled, panics when an owned resource is referenced
    /// outside the levels it is alive in.
    pub fn get_resource(&self, id: &ResourceId) -> Option<GpuResourceHandle> {
        let handle = self.resources.get(id)?;
        self.validate_lifetime(id, handle);
        handle.resource
    }

    /// Descriptor of a view, once the resource has been created.
    ///
    /// # Panics
    ///
    /// Same lifetime validation as [`GraphStorage::get_resource`].
    pub fn get_resource_view_handle(&self, view: &ResourceViewId) -> Option<DescriptorHandle> {
        self.get_resource_view(view)?.descriptor
    }

    pub fn get_resource_view(&self, view: &ResourceViewId) -> Option<&ViewEntry> {
        let handle = self.resources.get(view.resource())?;
        self.validate_lifetime(view.resource(), handle);
        handle.views.get(view)
    }

    fn validate_lifetime(&self, id: &ResourceId, handle: &ResourceHandle) {
        if !self.validation || handle.ownership != Ownership::Owned {
            return;
        }
        if let (Some(level), Some(lifetime)) = (self.active_level, self.lifetimes.get(id)) {
            assert!(
                lifetime.contains(level),
                "Resource '{}' referenced at level {} outside its lifetime [{}, {}]",
                id,
                level,
                lifetime.creation_level,
                lifetime.destruction_level
            );
        }
    }

    /// Width and height of a texture resource.
    pub fn resource_size(&self, id: &ResourceId) -> Option<(u32, u32)> {
        let texture = self.resources.get(id)?.desc.texture()?;
        Some((texture.width, texture.height))
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    pub fn swapchain_format(&self) -> TextureFormat {
        self.swapchain_format
    }

    // Inspection

    pub fn handle(&self, id: &ResourceId) -> Option<&ResourceHandle> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.resources.values()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn lifetime(&self, id: &ResourceId) -> Option<&ResourceLifetime> {
        self.lifetimes.get(id)
    }

    /// Number of retired objects waiting for reuse.
    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    /// Level currently executing, if any.
    pub fn active_level(&self) -> Option<usize> {
        self.active_level
    }

    pub fn validation(&self) -> bool {
        self.validation
    }

    // Declaration, used while resolving

    pub(crate) fn declare(&mut self, id: &ResourceId, desc: ResourceDesc, flags: ResourceFlags) -> GraphResult<()> {
        if let Some(existing) = self.resources.get_mut(id) {
            if existing.is_imported() || !existing.desc.is_compatible(&desc) {
                return Err(GraphError::IncompatibleResource(id.to_string()));
            }
            existing.desc.merge_usage(&desc);
            existing.flags |= flags;
            return Ok(());
        }

        log::trace!("Declaring resource '{}'", id);
        self.resources.insert(
            id.clone(),
            ResourceHandle {
                id: id.clone(),
                desc,
                resource: None,
                flags,
                ownership: Ownership::Owned,
                initial_state: ResourceState::COMMON,
                views: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub(crate) fn import(
        &mut self,
        id: &ResourceId,
        resource: GpuResourceHandle,
        desc: ResourceDesc,
        initial_state: ResourceState,
    ) -> GraphResult<()> {
        if self.resources.contains_key(id) {
            return Err(GraphError::DuplicateResource(id.to_string()));
        }

        log::trace!("Importing resource '{}' as {:?}", id, resource);
        self.resources.insert(
            id.clone(),
            ResourceHandle {
                id: id.clone(),
                desc,
                resource: Some(resource),
                flags: ResourceFlags::IMPORTED,
                ownership: Ownership::Borrowed,
                initial_state,
                views: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Declare a view, returning the subresource it selects.
    ///
    /// # Panics
    ///
    /// With validation enabled, panics when the view's format cannot alias the
    /// texture's format.
    pub(crate) fn declare_view(&mut self, view: &ResourceViewId, desc: Option<ViewDesc>) -> GraphResult<SubresourceView> {
        let handle = self
            .resources
            .get_mut(view.resource())
            .ok_or_else(|| GraphError::UnknownResource {
                pass: "view".to_string(),
                resource: view.resource().to_string(),
            })?;

        if let (Some(format), Some(texture)) = (desc.and_then(|d| d.format()), handle.desc.texture()) {
            if self.validation {
                assert!(
                    texture.format.is_view_compatible(format),
                    "View '{}' uses {:?}, incompatible with texture format {:?}",
                    view,
                    format,
                    texture.format
                );
            }
        }

        let subresource = SubresourceView::for_view(desc.as_ref(), &handle.desc);
        if let Some(existing) = handle.views.get(view) {
            if existing.desc != desc {
                return Err(GraphError::DuplicateView(view.to_string()));
            }
            return Ok(existing.subresource);
        }

        handle.views.insert(
            view.clone(),
            ViewEntry {
                desc,
                subresource,
                descriptor: None,
            },
        );
        Ok(subresource)
    }

    pub(crate) fn add_texture_usage(&mut self, id: &ResourceId, usage: TextureUsage) {
        if let Some(handle) = self.resources.get_mut(id) {
            if let (Ownership::Owned, ResourceDesc::Texture(texture)) = (handle.ownership, &mut handle.desc) {
                texture.usage |= usage;
            }
        }
    }

    pub(crate) fn set_lifetimes(&mut self, lifetimes: BTreeMap<ResourceId, ResourceLifetime>) {
        self.lifetimes = lifetimes;
    }

    pub(crate) fn set_active_level(&mut self, level: Option<usize>) {
        self.active_level = level;
    }

    /// Returns `true` when the size changed.
    pub(crate) fn update_surface_size(&mut self, size: (u32, u32)) -> bool {
        if self.surface_size == size {
            return false;
        }
        log::debug!(
            "Surface resized from {}x{} to {}x{}",
            self.surface_size.0,
            self.surface_size.1,
            size.0,
            size.1
        );
        self.surface_size = size;
        true
    }

    pub(crate) fn set_swapchain_format(&mut self, format: TextureFormat) {
        self.swapchain_format = format;
    }

    /// Point an imported handle at a new object, dropping its old views.
    pub(crate) fn replace_import<B: GraphicsBackend>(
        &mut self,
        id: &ResourceId,
        resource: GpuResourceHandle,
        backend: &mut B,
    ) -> GraphResult<()> {
        let handle = self
            .resources
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownResource {
                pass: "import".to_string(),
                resource: id.to_string(),
            })?;
        if handle.ownership != Ownership::Borrowed {
            return Err(GraphError::IncompatibleResource(id.to_string()));
        }
        Self::free_views(handle, backend);
        handle.resource = Some(resource);
        Ok(())
    }

    // GPU object management, used while executing

    /// Back an owned resource with a GPU object, reusing a pooled one when
    /// possible. Fresh objects start in `initial_state`.
    pub(crate) fn realize<B: GraphicsBackend>(
        &mut self,
        id: &ResourceId,
        backend: &mut B,
        states: &dyn ResourceStateManager,
        initial_state: ResourceState,
    ) -> GraphResult<GpuResourceHandle> {
        let surface_size = self.surface_size;
        let handle = self
            .resources
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownResource {
                pass: "create".to_string(),
                resource: id.to_string(),
            })?;
        if let Some(resource) = handle.resource {
            return Ok(resource);
        }

        if handle.is_window_size_dependent() {
            if let ResourceDesc::Texture(texture) = &mut handle.desc {
                texture.width = surface_size.0;
                texture.height = surface_size.1;
            }
        }

        let pooled = self
            .pool
            .iter()
            .position(|entry| entry.desc.is_identical(&handle.desc));
        let resource = match pooled {
            Some(index) => {
                let entry = self.pool.swap_remove(index);
                log::trace!("Reusing {:?} for '{}'", entry.resource, id);
                entry.resource
            }
            None => {
                let resource = match &handle.desc {
                    ResourceDesc::Texture(desc) => {
                        let desc = desc.clone().with_label(id.name());
                        backend.create_texture(&desc, initial_state)?
                    }
                    ResourceDesc::Buffer(desc, ty) => {
                        let desc = desc.clone().with_label(id.name());
                        backend.create_buffer(&desc, *ty, initial_state)?
                    }
                };
                states.start_tracking(resource, handle.desc.subresource_count(), initial_state);
                log::trace!("Created {:?} for '{}' in {:?}", resource, id, initial_state);
                resource
            }
        };

        handle.resource = Some(resource);
        Ok(resource)
    }

    /// Allocate descriptors for every view of `id` that has none yet.
    pub(crate) fn create_views<B: GraphicsBackend>(&mut self, id: &ResourceId, backend: &mut B) -> GraphResult<()> {
        let Some(handle) = self.resources.get_mut(id) else {
            return Ok(());
        };
        let Some(resource) = handle.resource else {
            return Ok(());
        };
        for entry in handle.views.values_mut() {
            let (Some(desc), None) = (entry.desc, entry.descriptor) else {
                continue;
            };
            let descriptor = backend.allocate_descriptor(desc.heap_type(), 1)?;
            entry.descriptor = Some(descriptor);
            backend.create_view(resource, &desc, descriptor)?;
        }
        Ok(())
    }

    /// Detach the GPU object from an owned resource and hand it to the pool,
    /// or destroy it when `reuse` is off.
    pub(crate) fn release<B: GraphicsBackend>(
        &mut self,
        id: &ResourceId,
        backend: &mut B,
        states: &dyn ResourceStateManager,
        reuse: bool,
    ) {
        let Some(handle) = self.resources.get_mut(id) else {
            return;
        };
        if handle.ownership != Ownership::Owned {
            return;
        }
        Self::free_views(handle, backend);
        let Some(resource) = handle.resource.take() else {
            return;
        };

        if reuse {
            log::trace!("Returning {:?} of '{}' to the pool", resource, id);
            self.pool.push(PooledResource {
                desc: handle.desc.clone(),
                resource,
            });
        } else {
            log::trace!("Destroying {:?} of '{}'", resource, id);
            states.stop_tracking(resource);
            backend.destroy_resource(resource);
        }
    }

    /// Release every owned resource that is still alive.
    pub(crate) fn release_all<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        states: &dyn ResourceStateManager,
        reuse: bool,
    ) {
        let alive: Vec<ResourceId> = self
            .resources
            .values()
            .filter(|handle| handle.ownership == Ownership::Owned && handle.resource.is_some())
            .map(|handle| handle.id.clone())
            .collect();
        for id in alive {
            self.release(&id, backend, states, reuse);
        }
    }

    /// Destroy every pooled object.
    pub(crate) fn flush_pool<B: GraphicsBackend>(&mut self, backend: &mut B, states: &dyn ResourceStateManager) {
        if !self.pool.is_empty() {
            log::debug!("Flushing {} pooled resources", self.pool.len());
        }
        for entry in self.pool.drain(..) {
            states.stop_tracking(entry.resource);
            backend.destroy_resource(entry.resource);
        }
    }

    /// Drop every declaration, releasing owned objects and imported views.
    pub(crate) fn clear_declarations<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        states: &dyn ResourceStateManager,
        reuse: bool,
    ) {
        self.release_all(backend, states, reuse);
        for handle in self.resources.values_mut() {
            Self::free_views(handle, backend);
        }
        self.resources.clear();
        self.lifetimes.clear();
    }

    fn free_views<B: GraphicsBackend>(handle: &mut ResourceHandle, backend: &mut B) {
        for entry in handle.views.values_mut() {
            if let Some(descriptor) = entry.descriptor.take() {
                backend.free_descriptor(descriptor);
            }
        }
    }
}
