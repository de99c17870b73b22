//! Frame driver: owns the passes, the resources and the backend

use crate::backend::*;
use crate::render_graph::builder::{compile_levels, CompiledGraph, GraphBuilder, PassMeta};
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::executor::RenderGraphExecutor;
use crate::render_graph::level::DependencyLevel;
use crate::render_graph::pass::{PassId, RenderPass};
use crate::render_graph::resolver::{PassBuildInfo, ResourceResolver};
use crate::render_graph::resource::ResourceId;
use crate::render_graph::storage::GraphStorage;
use crate::GraphConfig;

/// The main render graph structure
///
/// Build it once per topology change through [`reset`](Self::reset), then
/// call [`run`](Self::run) every frame.
pub struct RenderGraph<B: GraphicsBackend> {
    backend: B,
    config: GraphConfig,
    state_manager: Box<dyn ResourceStateManager>,
    storage: GraphStorage,
    passes: Vec<Box<dyn RenderPass>>,
    pass_infos: Vec<PassBuildInfo>,
    compiled: Option<CompiledGraph>,
    final_output: Option<ResourceId>,
    frame_index: u64,
}

impl<B: GraphicsBackend> RenderGraph<B> {
    pub fn new(backend: B, config: GraphConfig) -> Self {
        Self::with_state_manager(backend, config, Box::new(TrackedStateManager::new()))
    }

    /// Create a graph that plans barriers through an external state manager
    pub fn with_state_manager(backend: B, config: GraphConfig, state_manager: Box<dyn ResourceStateManager>) -> Self {
        let storage = GraphStorage::new(
            backend.swapchain_size(),
            backend.swapchain_format(),
            config.validation,
        );
        Self {
            backend,
            config,
            state_manager,
            storage,
            passes: Vec::new(),
            pass_infos: Vec::new(),
            compiled: None,
            final_output: None,
            frame_index: 0,
        }
    }

    /// Drop the current topology and start declaring a new one.
    pub fn reset(&mut self) -> GraphBuilder<'_, B> {
        self.clear();
        GraphBuilder::new(self)
    }

    /// Recompile the current pass list.
    pub fn rebuild(&mut self) -> GraphResult<()> {
        let final_output = self.final_output.clone().ok_or(GraphError::NotCompiled)?;
        self.compile(&final_output)
    }

    /// Execute one frame.
    ///
    /// On failure every owned resource still alive is released and no later
    /// level runs.
    pub fn run(&mut self) -> GraphResult<()> {
        let Self {
            backend,
            config,
            state_manager,
            storage,
            passes,
            compiled,
            frame_index,
            ..
        } = self;
        let compiled = compiled.as_mut().ok_or(GraphError::NotCompiled)?;

        storage.set_swapchain_format(backend.swapchain_format());
        if storage.update_surface_size(backend.swapchain_size()) {
            storage.flush_pool(backend, &**state_manager);
        }

        let mut executor = RenderGraphExecutor {
            backend,
            storage,
            states: &**state_manager,
            passes: passes.as_slice(),
            config,
        };
        if let Err(err) = executor.execute(&mut compiled.levels) {
            log::error!("Frame {} failed: {}", frame_index, err);
            executor.abandon();
            return Err(err);
        }

        *frame_index += 1;
        Ok(())
    }

    /// Point an imported resource at a new GPU object, e.g. the next
    /// swapchain image.
    pub fn update_imported_resource(&mut self, id: &ResourceId, resource: GpuResourceHandle) -> GraphResult<()> {
        self.storage.replace_import(id, resource, &mut self.backend)?;
        if let Some(handle) = self.storage.handle(id) {
            self.state_manager
                .start_tracking(resource, handle.desc.subresource_count(), handle.initial_state);
        }
        Ok(())
    }

    /// Release every GPU object the graph owns.
    pub fn cleanup(&mut self) {
        self.clear();
        self.storage
            .flush_pool(&mut self.backend, self.state_manager.as_ref());
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn storage(&self) -> &GraphStorage {
        &self.storage
    }

    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Compiled levels, empty until a build succeeds.
    pub fn levels(&self) -> &[DependencyLevel] {
        self.compiled
            .as_ref()
            .map_or(&[][..], |compiled| compiled.levels())
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn pass(&self, id: PassId) -> Option<&dyn RenderPass> {
        self.passes.get(id.index()).map(|pass| pass.as_ref())
    }

    /// What a pass declared during the last build.
    pub fn pass_info(&self, id: PassId) -> Option<&PassBuildInfo> {
        self.pass_infos.get(id.index())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state_manager(&self) -> &dyn ResourceStateManager {
        self.state_manager.as_ref()
    }

    /// Frames run successfully so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub(crate) fn push_pass(&mut self, pass: Box<dyn RenderPass>) -> PassId {
        let id = PassId(self.passes.len() as u32);
        log::trace!("Adding pass '{}' as {:?}", pass.name(), id);
        self.passes.push(pass);
        id
    }

    pub(crate) fn compile(&mut self, final_output: &ResourceId) -> GraphResult<()> {
        self.compiled = None;
        self.final_output = Some(final_output.clone());
        self.storage.clear_declarations(
            &mut self.backend,
            self.state_manager.as_ref(),
            self.config.reuse_transient_resources,
        );
        self.storage.set_swapchain_format(self.backend.swapchain_format());
        self.storage.update_surface_size(self.backend.swapchain_size());

        let mut infos = Vec::with_capacity(self.passes.len());
        for pass in self.passes.iter_mut() {
            let name = pass.name().to_string();
            let mut info = PassBuildInfo::default();
            let mut resolver = ResourceResolver::new(&name, &mut self.storage, &mut info);
            pass.resolve_resources(&mut resolver)?;
            infos.push(info);
        }

        let metas: Vec<PassMeta<'_>> = self
            .passes
            .iter()
            .map(|pass| PassMeta {
                name: pass.name(),
                flags: pass.flags(),
            })
            .collect();
        let compiled = compile_levels(
            &metas,
            &infos,
            &self.storage,
            final_output,
            self.config.prune_unreachable_passes,
        )?;

        self.storage.set_lifetimes(compiled.lifetimes.clone());
        self.pass_infos = infos;
        self.compiled = Some(compiled);
        Ok(())
    }

    fn clear(&mut self) {
        self.storage.clear_declarations(
            &mut self.backend,
            self.state_manager.as_ref(),
            self.config.reuse_transient_resources,
        );
        self.passes.clear();
        self.pass_infos.clear();
        self.compiled = None;
        self.final_output = None;
    }
}

impl<B: GraphicsBackend> Drop for RenderGraph<B> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
