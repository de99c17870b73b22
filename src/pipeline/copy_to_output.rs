//! Copies a finished image into the imported output texture

use crate::backend::*;
use crate::render_graph::*;

/// Externally owned texture the frame ends in, typically a swapchain image
#[derive(Debug, Clone)]
pub struct ImportedOutput {
    pub resource: GpuResourceHandle,
    pub desc: TextureDescriptor,
    pub initial_state: ResourceState,
}

/// Copy pass writing into an imported output
pub struct CopyToOutputPass {
    source: ResourceId,
    output: ResourceId,
    import: ImportedOutput,
}

impl CopyToOutputPass {
    pub fn new(source: ResourceId, output: ResourceId, import: ImportedOutput) -> Self {
        Self {
            source,
            output,
            import,
        }
    }

    pub fn output(&self) -> &ResourceId {
        &self.output
    }
}

impl RenderPass for CopyToOutputPass {
    fn name(&self) -> &str {
        "Copy To Output"
    }

    fn resolve_resources(&mut self, resolver: &mut ResourceResolver<'_>) -> GraphResult<()> {
        resolver.import_texture(
            &self.output,
            self.import.resource,
            self.import.desc.clone(),
            self.import.initial_state,
        )?;
        resolver.read_copy_source(&self.source.view("copy"))?;
        resolver.write_copy_dest(&self.output.view("copy"))?;
        Ok(())
    }

    fn dispatch(&self, storage: &GraphStorage, command_list: &mut dyn CommandList) {
        let (Some(dst), Some(src)) = (storage.get_resource(&self.output), storage.get_resource(&self.source)) else {
            log::warn!("Copy to output skipped, resources are not allocated");
            return;
        };
        command_list.copy_resource(dst, src);
    }
}
