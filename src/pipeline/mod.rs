//! Deferred rendering pipeline
//!
//! A reference pipeline built on the render graph:
//! 1. G-Buffer pass - Renders geometry to multiple render targets
//! 2. Light culling - Compute pass binning lights into screen tiles
//! 3. Shading pass - Fullscreen pass computing lighting from the G-buffer
//! 4. Copy to output - Optional copy into an imported swapchain image

pub mod copy_to_output;
pub mod gbuffer_pass;
pub mod light_culling;
pub mod shading_pass;

pub use copy_to_output::{CopyToOutputPass, ImportedOutput};
pub use gbuffer_pass::GBufferPass;
pub use light_culling::LightCullPass;
pub use shading_pass::ShadingPass;

use crate::backend::GraphicsBackend;
use crate::render_graph::{GraphResult, RenderGraph, ResourceId};

/// Configuration for the Deferred pipeline
#[derive(Debug, Clone)]
pub struct DeferredConfig {
    /// Size of screen tiles for light culling (pixels)
    pub tile_size: u32,
    /// Maximum number of lights
    pub max_lights: u32,
    /// Vertices drawn by the G-buffer pass
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            tile_size: 16,
            max_lights: 1024,
            vertex_count: 3,
            instance_count: 1,
        }
    }
}

/// Resources declared by the Deferred pipeline
#[derive(Debug, Clone)]
pub struct DeferredResources {
    pub gbuffer_albedo: ResourceId,
    pub gbuffer_normal: ResourceId,
    pub gbuffer_depth: ResourceId,
    pub light_grid: ResourceId,
    pub lit_color: ResourceId,
    /// Imported output, when one was given
    pub output: Option<ResourceId>,
}

impl DeferredResources {
    pub fn new() -> Self {
        Self {
            gbuffer_albedo: ResourceId::new("Albedo"),
            gbuffer_normal: ResourceId::new("Normal"),
            gbuffer_depth: ResourceId::new("Depth"),
            light_grid: ResourceId::new("LightGrid"),
            lit_color: ResourceId::new("LitColor"),
            output: None,
        }
    }

    /// Resource the frame ends in.
    pub fn final_output(&self) -> &ResourceId {
        self.output.as_ref().unwrap_or(&self.lit_color)
    }
}

impl Default for DeferredResources {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the Deferred render graph
///
/// Replaces the graph's topology. With an `output`, the lit image is copied
/// into it and the output becomes the final resource.
pub fn build_deferred_graph<B: GraphicsBackend>(
    graph: &mut RenderGraph<B>,
    config: &DeferredConfig,
    output: Option<ImportedOutput>,
) -> GraphResult<DeferredResources> {
    let mut resources = DeferredResources::new();
    let mut builder = graph.reset();

    builder.add_pass(
        GBufferPass::new(
            resources.gbuffer_albedo.clone(),
            resources.gbuffer_normal.clone(),
            resources.gbuffer_depth.clone(),
        )
        .with_geometry(config.vertex_count, config.instance_count),
    );
    builder.add_pass(LightCullPass::new(
        resources.gbuffer_depth.clone(),
        resources.light_grid.clone(),
        config.tile_size,
        config.max_lights,
    ));
    builder.add_pass(ShadingPass::new(
        resources.gbuffer_albedo.clone(),
        resources.gbuffer_normal.clone(),
        resources.light_grid.clone(),
        resources.lit_color.clone(),
    ));

    if let Some(output) = output {
        let output_id = ResourceId::new("Output");
        builder.add_pass(CopyToOutputPass::new(
            resources.lit_color.clone(),
            output_id.clone(),
            output,
        ));
        resources.output = Some(output_id);
    }

    builder.build(resources.final_output())?;
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::*;
    use crate::GraphConfig;

    #[test]
    fn test_deferred_graph_levels() {
        let mut graph = RenderGraph::new(DummyBackend::new(), GraphConfig::default());
        let resources = build_deferred_graph(&mut graph, &DeferredConfig::default(), None).unwrap();

        assert_eq!(graph.levels().len(), 3);
        let lifetimes = graph.compiled().unwrap().lifetimes();
        let depth = lifetimes[&resources.gbuffer_depth];
        assert_eq!((depth.creation_level, depth.destruction_level), (0, 1));
        let grid = lifetimes[&resources.light_grid];
        assert_eq!((grid.creation_level, grid.destruction_level), (1, 2));
    }

    #[test]
    fn test_deferred_graph_with_output() {
        let mut backend = DummyBackend::new();
        let desc = TextureDescriptor::new_2d(1280, 720, backend.swapchain_format())
            .with_usage(TextureUsage::COPY_DST);
        let swapchain = backend.create_texture(&desc, ResourceState::PRESENT).unwrap();
        let mut graph = RenderGraph::new(backend, GraphConfig::default());

        let output = ImportedOutput {
            resource: swapchain,
            desc,
            initial_state: ResourceState::PRESENT,
        };
        let resources = build_deferred_graph(&mut graph, &DeferredConfig::default(), Some(output)).unwrap();
        assert_eq!(graph.levels().len(), 4);
        assert_eq!(resources.final_output(), &ResourceId::new("Output"));

        graph.run().unwrap();
        let copies = graph
            .backend()
            .submitted()
            .iter()
            .flat_map(|list| list.commands())
            .filter(|command| matches!(command, RecordedCommand::CopyResource { dst, .. } if *dst == swapchain))
            .count();
        assert_eq!(copies, 1);
        assert!(graph.backend().is_alive(swapchain));
    }
}
