//! G-Buffer generation pass for deferred rendering
//!
//! Renders geometry to multiple render targets (MRT):
//! - Albedo (base color)
//! - Normals (encoded)
//! - Depth buffer

use glam::Vec4;

use crate::backend::*;
use crate::render_graph::*;

/// G-Buffer generation pass for deferred rendering
pub struct GBufferPass {
    albedo: ResourceId,
    normal: ResourceId,
    depth: ResourceId,
    vertex_count: u32,
    instance_count: u32,
}

impl GBufferPass {
    pub fn new(albedo: ResourceId, normal: ResourceId, depth: ResourceId) -> Self {
        Self {
            albedo,
            normal,
            depth,
            vertex_count: 3,
            instance_count: 1,
        }
    }

    /// Geometry drawn into the G-buffer
    pub fn with_geometry(mut self, vertex_count: u32, instance_count: u32) -> Self {
        self.vertex_count = vertex_count;
        self.instance_count = instance_count;
        self
    }

    pub fn albedo_texture(&self) -> &ResourceId {
        &self.albedo
    }

    pub fn normal_texture(&self) -> &ResourceId {
        &self.normal
    }

    pub fn depth_texture(&self) -> &ResourceId {
        &self.depth
    }
}

impl RenderPass for GBufferPass {
    fn name(&self) -> &str {
        "G-Buffer Pass"
    }

    fn resolve_resources(&mut self, resolver: &mut ResourceResolver<'_>) -> GraphResult<()> {
        let color_clear = ClearValue::Color(Vec4::ZERO);
        resolver.create_window_texture(
            &self.albedo,
            TextureDescriptor::new_2d(1, 1, TextureFormat::Rgba8Unorm)
                .with_usage(TextureUsage::RENDER_TARGET)
                .with_clear_value(color_clear),
            ResourceFlags::empty(),
        )?;
        // Float for better normal precision
        resolver.create_window_texture(
            &self.normal,
            TextureDescriptor::new_2d(1, 1, TextureFormat::Rgba16Float)
                .with_usage(TextureUsage::RENDER_TARGET)
                .with_clear_value(color_clear),
            ResourceFlags::empty(),
        )?;
        resolver.create_window_texture(
            &self.depth,
            TextureDescriptor::new_2d(1, 1, TextureFormat::Depth32Float)
                .with_usage(TextureUsage::DEPTH_STENCIL)
                .with_clear_value(ClearValue::DepthStencil {
                    depth: 1.0,
                    stencil: 0,
                }),
            ResourceFlags::empty(),
        )?;

        resolver.write_render_target(&self.albedo.view("rtv"), None)?;
        resolver.write_render_target(&self.normal.view("rtv"), None)?;
        resolver.write_depth_stencil(&self.depth.view("dsv"), None)?;
        Ok(())
    }

    fn dispatch(&self, _storage: &GraphStorage, command_list: &mut dyn CommandList) {
        let Some(graphics) = command_list.as_graphics() else {
            log::warn!("G-Buffer pass recorded on a non-graphics list");
            return;
        };
        graphics.draw(0..self.vertex_count, 0..self.instance_count);
    }
}
