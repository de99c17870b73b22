//! Declarative setup API used by passes while the graph is built

use std::collections::{BTreeMap, BTreeSet};

use crate::backend::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::resource::*;
use crate::render_graph::storage::GraphStorage;

/// Depth-stencil binding of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthStencilBinding {
    pub view: ResourceViewId,
    /// Bound for writing; read-only bindings are never cleared
    pub writable: bool,
}

/// What one pass declared while resolving
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassBuildInfo {
    pub reads: BTreeSet<ResourceId>,
    pub writes: BTreeSet<ResourceId>,
    pub created: BTreeSet<ResourceId>,
    pub render_targets: Vec<ResourceViewId>,
    pub depth_stencil: Option<DepthStencilBinding>,
    /// Required state per view, unioned over every access of the pass
    pub states: BTreeMap<ResourceViewId, ResourceState>,
}

impl PassBuildInfo {
    pub fn references(&self, id: &ResourceId) -> bool {
        self.reads.contains(id) || self.writes.contains(id)
    }

    /// Every resource the pass reads or writes.
    pub fn referenced(&self) -> impl Iterator<Item = &ResourceId> {
        self.reads.union(&self.writes)
    }
}

/// Passed to [`RenderPass::resolve_resources`](crate::render_graph::RenderPass::resolve_resources)
///
/// Calls only record declarations. No GPU object is created here.
pub struct ResourceResolver<'a> {
    pass_name: &'a str,
    storage: &'a mut GraphStorage,
    info: &'a mut PassBuildInfo,
}

impl<'a> ResourceResolver<'a> {
    pub(crate) fn new(pass_name: &'a str, storage: &'a mut GraphStorage, info: &'a mut PassBuildInfo) -> Self {
        Self {
            pass_name,
            storage,
            info,
        }
    }

    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    pub fn swapchain_format(&self) -> TextureFormat {
        self.storage.swapchain_format()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.storage.surface_size()
    }

    // Creation

    pub fn create_texture(&mut self, id: &ResourceId, desc: TextureDescriptor, flags: ResourceFlags) -> GraphResult<()> {
        self.storage
            .declare(id, ResourceDesc::Texture(desc), flags - ResourceFlags::IMPORTED)?;
        self.info.created.insert(id.clone());
        Ok(())
    }

    /// Create a texture whose width and height follow the output surface.
    pub fn create_window_texture(
        &mut self,
        id: &ResourceId,
        mut desc: TextureDescriptor,
        flags: ResourceFlags,
    ) -> GraphResult<()> {
        let (width, height) = self.storage.surface_size();
        desc.width = width;
        desc.height = height;
        self.create_texture(id, desc, flags | ResourceFlags::WINDOW_SIZE_DEPENDENT)
    }

    pub fn create_buffer(&mut self, id: &ResourceId, desc: BufferDescriptor, buffer_type: BufferType) -> GraphResult<()> {
        self.storage
            .declare(id, ResourceDesc::Buffer(desc, buffer_type), ResourceFlags::empty())?;
        self.info.created.insert(id.clone());
        Ok(())
    }

    // Import

    pub fn import_texture(
        &mut self,
        id: &ResourceId,
        resource: GpuResourceHandle,
        desc: TextureDescriptor,
        initial_state: ResourceState,
    ) -> GraphResult<()> {
        self.storage
            .import(id, resource, ResourceDesc::Texture(desc), initial_state)
    }

    pub fn import_buffer(
        &mut self,
        id: &ResourceId,
        resource: GpuResourceHandle,
        desc: BufferDescriptor,
        buffer_type: BufferType,
        initial_state: ResourceState,
    ) -> GraphResult<()> {
        self.storage
            .import(id, resource, ResourceDesc::Buffer(desc, buffer_type), initial_state)
    }

    // Reads

    pub fn read_resource(&mut self, view: &ResourceViewId, access: ReadAccess, desc: ViewDesc) -> GraphResult<()> {
        let state = match desc {
            ViewDesc::ConstantBuffer(_) => ResourceState::VERTEX_AND_CONSTANT_BUFFER,
            ViewDesc::ShaderResource(_) => access.required_state(),
            ViewDesc::DepthStencil(_) => match access {
                ReadAccess::CopySource => ResourceState::DEPTH_READ,
                _ => ResourceState::DEPTH_READ | access.required_state(),
            },
            ViewDesc::RenderTarget(_) | ViewDesc::UnorderedAccess(_) => {
                return Err(self.invalid_usage(view, "a read"));
            }
        };
        self.record_read(view, state, Some(desc))?;
        if let ViewDesc::DepthStencil(_) = desc {
            self.bind_depth_stencil(view, false);
        }
        Ok(())
    }

    pub fn read_texture(&mut self, view: &ResourceViewId, access: ReadAccess, desc: Option<SrvDesc>) -> GraphResult<()> {
        self.read_resource(view, access, ViewDesc::ShaderResource(desc))
    }

    /// Bind depth-stencil read-only, optionally sampling it as well.
    pub fn read_depth_stencil(&mut self, view: &ResourceViewId, access: ReadAccess, desc: Option<DsvDesc>) -> GraphResult<()> {
        self.read_resource(view, access, ViewDesc::DepthStencil(desc))
    }

    pub fn read_constant_buffer(&mut self, view: &ResourceViewId, desc: CbvDesc) -> GraphResult<()> {
        self.read_resource(view, ReadAccess::AllShaders, ViewDesc::ConstantBuffer(desc))
    }

    pub fn read_copy_source(&mut self, view: &ResourceViewId) -> GraphResult<()> {
        self.record_read(view, ReadAccess::CopySource.required_state(), None)
    }

    // Writes

    pub fn write_resource(&mut self, view: &ResourceViewId, desc: ViewDesc) -> GraphResult<()> {
        let access = match desc {
            ViewDesc::RenderTarget(_) => WriteAccess::RenderTarget,
            ViewDesc::DepthStencil(_) => WriteAccess::DepthWrite,
            ViewDesc::UnorderedAccess(_) => WriteAccess::UnorderedAccess,
            ViewDesc::ConstantBuffer(_) | ViewDesc::ShaderResource(_) => {
                return Err(self.invalid_usage(view, "a write"));
            }
        };
        self.record_write(view, access, Some(desc))?;
        match desc {
            ViewDesc::RenderTarget(_) => {
                if !self.info.render_targets.contains(view) {
                    self.info.render_targets.push(view.clone());
                }
            }
            ViewDesc::DepthStencil(_) => self.bind_depth_stencil(view, true),
            _ => {}
        }
        Ok(())
    }

    pub fn write_render_target(&mut self, view: &ResourceViewId, desc: Option<RtvDesc>) -> GraphResult<()> {
        self.write_resource(view, ViewDesc::RenderTarget(desc))
    }

    pub fn write_depth_stencil(&mut self, view: &ResourceViewId, desc: Option<DsvDesc>) -> GraphResult<()> {
        self.write_resource(view, ViewDesc::DepthStencil(desc))
    }

    pub fn write_unordered_access(&mut self, view: &ResourceViewId, desc: Option<UavDesc>) -> GraphResult<()> {
        self.write_resource(view, ViewDesc::UnorderedAccess(desc))
    }

    pub fn write_copy_dest(&mut self, view: &ResourceViewId) -> GraphResult<()> {
        self.record_write(view, WriteAccess::CopyDest, None)
    }

    fn record_read(&mut self, view: &ResourceViewId, state: ResourceState, desc: Option<ViewDesc>) -> GraphResult<()> {
        self.ensure_declared(view.resource())?;
        self.storage.declare_view(view, desc)?;
        self.info.reads.insert(view.resource().clone());
        self.require_state(view, state);
        Ok(())
    }

    fn record_write(&mut self, view: &ResourceViewId, access: WriteAccess, desc: Option<ViewDesc>) -> GraphResult<()> {
        self.ensure_declared(view.resource())?;
        if self.storage.handle(view.resource()).and_then(|h| h.desc.texture()).is_some() {
            self.storage
                .add_texture_usage(view.resource(), access.texture_usage());
        }
        self.storage.declare_view(view, desc)?;
        self.info.writes.insert(view.resource().clone());
        self.require_state(view, access.required_state());
        Ok(())
    }

    fn require_state(&mut self, view: &ResourceViewId, state: ResourceState) {
        let entry = self
            .info
            .states
            .entry(view.clone())
            .or_insert(ResourceState::COMMON);
        let conflict = !entry.is_empty() && *entry != state && (entry.has_write() || state.has_write());
        if conflict {
            log::warn!(
                "Pass '{}' requests {:?} and {:?} on '{}'",
                self.pass_name,
                *entry,
                state,
                view
            );
        }
        *entry |= state;
    }

    fn bind_depth_stencil(&mut self, view: &ResourceViewId, writable: bool) {
        match &mut self.info.depth_stencil {
            Some(binding) if binding.view == *view => binding.writable |= writable,
            Some(binding) => {
                log::warn!(
                    "Pass '{}' binds depth-stencil '{}', replacing '{}'",
                    self.pass_name,
                    view,
                    binding.view
                );
                *binding = DepthStencilBinding {
                    view: view.clone(),
                    writable,
                };
            }
            None => {
                self.info.depth_stencil = Some(DepthStencilBinding {
                    view: view.clone(),
                    writable,
                });
            }
        }
    }

    fn ensure_declared(&self, id: &ResourceId) -> GraphResult<()> {
        if self.storage.contains(id) {
            Ok(())
        } else {
            Err(GraphError::UnknownResource {
                pass: self.pass_name.to_string(),
                resource: id.to_string(),
            })
        }
    }

    fn invalid_usage(&self, view: &ResourceViewId, usage: &str) -> GraphError {
        GraphError::InvalidViewUsage {
            view: view.to_string(),
            usage: usage.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> GraphStorage {
        GraphStorage::new((1920, 1080), TextureFormat::Bgra8UnormSrgb, true)
    }

    #[test]
    fn test_create_and_write_records_info() {
        let mut storage = storage();
        let mut info = PassBuildInfo::default();
        let albedo = ResourceId::new("Albedo");
        {
            let mut resolver = ResourceResolver::new("GBuffer", &mut storage, &mut info);
            resolver
                .create_window_texture(
                    &albedo,
                    TextureDescriptor::new_2d(1, 1, TextureFormat::Rgba8Unorm),
                    ResourceFlags::empty(),
                )
                .unwrap();
            resolver.write_render_target(&albedo.view("rtv"), None).unwrap();
        }

        assert!(info.created.contains(&albedo));
        assert!(info.writes.contains(&albedo));
        assert_eq!(info.render_targets, vec![albedo.view("rtv")]);
        assert_eq!(info.states[&albedo.view("rtv")], ResourceState::RENDER_TARGET);

        let handle = storage.handle(&albedo).unwrap();
        assert!(handle.is_window_size_dependent());
        let texture = handle.desc.texture().unwrap();
        assert_eq!((texture.width, texture.height), (1920, 1080));
        assert!(texture.usage.contains(TextureUsage::RENDER_TARGET));
    }

    #[test]
    fn test_unknown_resource() {
        let mut storage = storage();
        let mut info = PassBuildInfo::default();
        let mut resolver = ResourceResolver::new("Shading", &mut storage, &mut info);
        let result = resolver.read_texture(&ResourceId::new("Missing").view("srv"), ReadAccess::PixelShader, None);
        assert_eq!(
            result,
            Err(GraphError::UnknownResource {
                pass: "Shading".to_string(),
                resource: "Missing".to_string(),
            })
        );
    }

    #[test]
    fn test_invalid_view_usage() {
        let mut storage = storage();
        let mut info = PassBuildInfo::default();
        let id = ResourceId::new("Color");
        let mut resolver = ResourceResolver::new("Pass", &mut storage, &mut info);
        resolver
            .create_texture(&id, TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm), ResourceFlags::empty())
            .unwrap();
        assert!(matches!(
            resolver.write_resource(&id.view("srv"), ViewDesc::ShaderResource(None)),
            Err(GraphError::InvalidViewUsage { .. })
        ));
        assert!(matches!(
            resolver.read_resource(&id.view("rtv"), ReadAccess::PixelShader, ViewDesc::RenderTarget(None)),
            Err(GraphError::InvalidViewUsage { .. })
        ));
    }

    #[test]
    fn test_reads_union_states() {
        let mut storage = storage();
        let mut info = PassBuildInfo::default();
        let id = ResourceId::new("Shadow");
        let view = id.view("srv");
        let mut resolver = ResourceResolver::new("Pass", &mut storage, &mut info);
        resolver
            .create_texture(&id, TextureDescriptor::new_2d(8, 8, TextureFormat::R32Float), ResourceFlags::empty())
            .unwrap();
        resolver.read_texture(&view, ReadAccess::PixelShader, None).unwrap();
        resolver.read_texture(&view, ReadAccess::NonPixelShader, None).unwrap();
        assert_eq!(info.states[&view], ResourceState::ALL_SHADER_RESOURCE);
        assert!(info.reads.contains(&id));
        assert!(info.writes.is_empty());
    }

    #[test]
    fn test_depth_read_binding() {
        let mut storage = storage();
        let mut info = PassBuildInfo::default();
        let depth = ResourceId::new("Depth");
        let view = depth.view("dsv_ro");
        let mut resolver = ResourceResolver::new("Decals", &mut storage, &mut info);
        resolver
            .create_texture(
                &depth,
                TextureDescriptor::new_2d(8, 8, TextureFormat::Depth32Float),
                ResourceFlags::empty(),
            )
            .unwrap();
        resolver
            .read_depth_stencil(&view, ReadAccess::PixelShader, None)
            .unwrap();
        assert_eq!(
            info.depth_stencil,
            Some(DepthStencilBinding {
                view: view.clone(),
                writable: false,
            })
        );
        assert_eq!(
            info.states[&view],
            ResourceState::DEPTH_READ | ResourceState::PIXEL_SHADER_RESOURCE
        );
    }

    #[test]
    fn test_copy_views_need_no_descriptor() {
        let mut storage = storage();
        let mut info = PassBuildInfo::default();
        let src = ResourceId::new("Src");
        let mut resolver = ResourceResolver::new("Copy", &mut storage, &mut info);
        resolver
            .create_buffer(&src, BufferDescriptor::new(256, BufferUsage::COPY_SRC), BufferType::Default)
            .unwrap();
        resolver.read_copy_source(&src.view("copy")).unwrap();
        let entry = storage.get_resource_view(&src.view("copy")).unwrap();
        assert_eq!(entry.desc, None);
        assert_eq!(info.states[&src.view("copy")], ResourceState::COPY_SOURCE);
    }
}
