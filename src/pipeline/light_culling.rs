//! Light culling compute pass
//!
//! Bins lights into screen tiles using the G-buffer depth. The result is a
//! per-tile light list consumed by the shading pass.

use bytemuck::{Pod, Zeroable};

use crate::backend::*;
use crate::render_graph::*;

/// Maximum number of lights referenced by one tile
pub const MAX_LIGHTS_PER_TILE: usize = 256;

/// Workgroup edge length of the culling shader
pub const CULLING_WORKGROUP_SIZE: u32 = 16;

/// One tile of the light grid, as laid out in GPU memory
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TileLightData {
    pub light_count: u32,
    pub _padding: [u32; 3],
    pub light_indices: [u32; MAX_LIGHTS_PER_TILE],
}

/// Root constants of the culling dispatch
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CullingParams {
    pub tile_count: [u32; 2],
    pub tile_size: u32,
    pub light_count: u32,
    pub screen_size: [u32; 2],
    pub _padding: [u32; 2],
}

/// Light culling compute pass
pub struct LightCullPass {
    tile_size: u32,
    max_lights: u32,
    depth: ResourceId,
    light_grid: ResourceId,
}

impl LightCullPass {
    pub fn new(depth: ResourceId, light_grid: ResourceId, tile_size: u32, max_lights: u32) -> Self {
        Self {
            tile_size: tile_size.max(1),
            max_lights,
            depth,
            light_grid,
        }
    }

    pub fn tile_count(screen_width: u32, screen_height: u32, tile_size: u32) -> (u32, u32) {
        let tiles_x = (screen_width + tile_size - 1) / tile_size;
        let tiles_y = (screen_height + tile_size - 1) / tile_size;
        (tiles_x, tiles_y)
    }

    /// Size in bytes of the light grid for a surface.
    pub fn light_grid_size(screen_width: u32, screen_height: u32, tile_size: u32) -> u64 {
        let (tiles_x, tiles_y) = Self::tile_count(screen_width, screen_height, tile_size);
        let tile_data_size = std::mem::size_of::<TileLightData>() as u64;
        (tiles_x as u64 * tiles_y as u64 * tile_data_size).max(64)
    }

    pub fn params(&self, screen_width: u32, screen_height: u32) -> CullingParams {
        let (tiles_x, tiles_y) = Self::tile_count(screen_width, screen_height, self.tile_size);
        CullingParams {
            tile_count: [tiles_x, tiles_y],
            tile_size: self.tile_size,
            light_count: self.max_lights,
            screen_size: [screen_width, screen_height],
            _padding: [0; 2],
        }
    }

    pub fn light_grid(&self) -> &ResourceId {
        &self.light_grid
    }
}

impl RenderPass for LightCullPass {
    fn name(&self) -> &str {
        "Light Culling"
    }

    fn queue_type(&self) -> QueueType {
        QueueType::Compute
    }

    fn resolve_resources(&mut self, resolver: &mut ResourceResolver<'_>) -> GraphResult<()> {
        let (width, height) = resolver.surface_size();
        let srv = SrvDesc {
            format: Some(TextureFormat::R32Float),
            ..Default::default()
        };
        resolver.read_texture(&self.depth.view("srv"), ReadAccess::NonPixelShader, Some(srv))?;

        resolver.create_buffer(
            &self.light_grid,
            BufferDescriptor::new(
                Self::light_grid_size(width, height, self.tile_size),
                BufferUsage::STORAGE,
            ),
            BufferType::Default,
        )?;
        resolver.write_unordered_access(&self.light_grid.view("uav"), None)?;
        Ok(())
    }

    fn dispatch(&self, storage: &GraphStorage, command_list: &mut dyn CommandList) {
        let (width, height) = storage.surface_size();
        let params = self.params(width, height);
        command_list.set_compute_constants(0, bytemuck::cast_slice(&[params]));

        // One thread per pixel, a workgroup per tile
        let workgroups_x = (width + CULLING_WORKGROUP_SIZE - 1) / CULLING_WORKGROUP_SIZE;
        let workgroups_y = (height + CULLING_WORKGROUP_SIZE - 1) / CULLING_WORKGROUP_SIZE;
        command_list.dispatch(workgroups_x, workgroups_y, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_count_rounds_up() {
        assert_eq!(LightCullPass::tile_count(1920, 1080, 16), (120, 68));
        assert_eq!(LightCullPass::tile_count(16, 16, 16), (1, 1));
        assert_eq!(LightCullPass::tile_count(17, 1, 16), (2, 1));
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<CullingParams>(), 32);
        let pass = LightCullPass::new(ResourceId::new("Depth"), ResourceId::new("LightGrid"), 16, 64);
        let params = pass.params(1280, 720);
        assert_eq!(params.tile_count, [80, 45]);
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&params));
        assert_eq!(words.len(), 8);
        assert_eq!(&words[..4], &[80, 45, 16, 64]);
    }

    #[test]
    fn test_light_grid_size() {
        let tile = std::mem::size_of::<TileLightData>() as u64;
        assert_eq!(tile, 16 + 4 * MAX_LIGHTS_PER_TILE as u64);
        assert_eq!(LightCullPass::light_grid_size(32, 16, 16), 2 * tile);
    }
}
