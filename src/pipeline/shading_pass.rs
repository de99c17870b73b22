//! Deferred shading pass
//!
//! Performs lighting calculations using G-buffer data and the tiled light
//! grid. Renders a fullscreen triangle into the lit colour target.

use glam::Vec4;

use crate::backend::*;
use crate::render_graph::*;

/// Deferred shading pass
pub struct ShadingPass {
    albedo: ResourceId,
    normal: ResourceId,
    light_grid: ResourceId,
    output: ResourceId,
}

impl ShadingPass {
    pub fn new(albedo: ResourceId, normal: ResourceId, light_grid: ResourceId, output: ResourceId) -> Self {
        Self {
            albedo,
            normal,
            light_grid,
            output,
        }
    }

    pub fn output(&self) -> &ResourceId {
        &self.output
    }
}

impl RenderPass for ShadingPass {
    fn name(&self) -> &str {
        "Deferred Shading Pass"
    }

    fn resolve_resources(&mut self, resolver: &mut ResourceResolver<'_>) -> GraphResult<()> {
        resolver.read_texture(&self.albedo.view("srv"), ReadAccess::PixelShader, None)?;
        resolver.read_texture(&self.normal.view("srv"), ReadAccess::PixelShader, None)?;
        resolver.read_texture(&self.light_grid.view("srv"), ReadAccess::PixelShader, None)?;

        // Matches the swapchain so the result can be copied straight out
        let format = resolver.swapchain_format();
        resolver.create_window_texture(
            &self.output,
            TextureDescriptor::new_2d(1, 1, format)
                .with_usage(TextureUsage::RENDER_TARGET | TextureUsage::COPY_SRC)
                .with_clear_value(ClearValue::Color(Vec4::new(0.0, 0.0, 0.0, 1.0))),
            ResourceFlags::empty(),
        )?;
        resolver.write_render_target(&self.output.view("rtv"), None)?;
        Ok(())
    }

    fn dispatch(&self, _storage: &GraphStorage, command_list: &mut dyn CommandList) {
        let Some(graphics) = command_list.as_graphics() else {
            log::warn!("Shading pass recorded on a non-graphics list");
            return;
        };
        // Fullscreen triangle
        graphics.draw(0..3, 0..1);
    }
}
