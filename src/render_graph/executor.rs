//! Render graph executor
//!
//! Runs compiled dependency levels: allocate the level's resources, flush
//! its barriers as one batch, record and submit its passes, then release the
//! resources that die in it.

use glam::Vec4;
use rayon::prelude::*;

use crate::backend::*;
use crate::render_graph::error::GraphResult;
use crate::render_graph::level::{DependencyLevel, LevelPass, LevelStatus};
use crate::render_graph::pass::{PassFlags, RenderPass};
use crate::render_graph::resource::Ownership;
use crate::render_graph::storage::GraphStorage;
use crate::GraphConfig;

/// Executor for running the compiled render graph
pub(crate) struct RenderGraphExecutor<'a, B: GraphicsBackend> {
    pub backend: &'a mut B,
    pub storage: &'a mut GraphStorage,
    pub states: &'a dyn ResourceStateManager,
    pub passes: &'a [Box<dyn RenderPass>],
    pub config: &'a GraphConfig,
}

impl<'a, B: GraphicsBackend> RenderGraphExecutor<'a, B> {
    /// Execute every level in order.
    pub fn execute(&mut self, levels: &mut [DependencyLevel]) -> GraphResult<()> {
        for level in levels.iter_mut() {
            level.status = LevelStatus::Pending;
        }

        self.prepare_imports()?;
        for level in levels.iter_mut() {
            self.storage.set_active_level(Some(level.index));
            let result = self.execute_level(level);
            self.storage.set_active_level(None);
            result?;
        }
        self.restore_imports()
    }

    /// Release every owned resource still alive after a failed frame.
    pub fn abandon(&mut self) {
        log::warn!("Abandoning frame, releasing live transient resources");
        self.storage.set_active_level(None);
        self.storage.release_all(
            &mut *self.backend,
            self.states,
            self.config.reuse_transient_resources,
        );
    }

    fn execute_level(&mut self, level: &mut DependencyLevel) -> GraphResult<()> {
        log::trace!("Executing level {}", level.index);
        self.create_resources(level)?;
        self.execute_barriers(level)?;
        level.status = LevelStatus::BarriersFlushed;
        self.execute_passes(level)?;
        level.status = LevelStatus::Executed;
        self.destroy_resources(level);
        Ok(())
    }

    /// Start tracking imported objects and write their views.
    fn prepare_imports(&mut self) -> GraphResult<()> {
        let imports: Vec<_> = self
            .storage
            .handles()
            .filter(|handle| handle.ownership == Ownership::Borrowed)
            .filter_map(|handle| {
                let resource = handle.resource?;
                Some((handle.id.clone(), resource, handle.desc.subresource_count(), handle.initial_state))
            })
            .collect();
        for (id, resource, count, initial_state) in imports {
            self.states.start_tracking(resource, count, initial_state);
            self.storage.create_views(&id, &mut *self.backend)?;
        }
        Ok(())
    }

    /// Hand imported objects back in the state they were imported in.
    fn restore_imports(&mut self) -> GraphResult<()> {
        for handle in self.storage.handles() {
            if handle.ownership != Ownership::Borrowed {
                continue;
            }
            if let Some(resource) = handle.resource {
                self.states
                    .transition_resource(resource, handle.initial_state, Subresource::All);
            }
        }

        let mut list = self
            .backend
            .begin_command_list(QueueType::Direct, "Barriers (imports)")?;
        if self.states.flush_barriers(&mut list) {
            self.backend.submit(vec![list])?;
        } else {
            self.backend.recycle_command_list(list);
        }
        Ok(())
    }

    fn create_resources(&mut self, level: &DependencyLevel) -> GraphResult<()> {
        for id in &level.resources_to_create {
            let initial_state = level.initial_state_for(id, self.storage);
            self.storage
                .realize(id, &mut *self.backend, self.states, initial_state)?;
            self.storage.create_views(id, &mut *self.backend)?;
        }
        Ok(())
    }

    fn execute_barriers(&mut self, level: &DependencyLevel) -> GraphResult<()> {
        for (view, state) in &level.states {
            let Some(resource) = self.storage.get_resource(view.resource()) else {
                log::warn!("View '{}' has no GPU object at level {}", view, level.index);
                continue;
            };
            let subresource = match (self.storage.get_resource_view(view), self.storage.handle(view.resource())) {
                (Some(entry), Some(handle)) => entry.subresource.to_subresource(&handle.desc),
                _ => Subresource::All,
            };
            self.states.transition_resource(resource, *state, subresource);
        }

        let label = format!("Barriers (level {})", level.index);
        let mut list = self.backend.begin_command_list(QueueType::Direct, &label)?;
        if self.states.flush_barriers(&mut list) {
            self.backend.submit(vec![list])?;
        } else {
            self.backend.recycle_command_list(list);
        }
        Ok(())
    }

    fn execute_passes(&mut self, level: &DependencyLevel) -> GraphResult<()> {
        let mut recorded: Vec<(usize, B::CommandList)> = Vec::with_capacity(level.passes.len());
        for level_pass in &level.passes {
            let pass = &self.passes[level_pass.pass];
            if pass.flags().contains(PassFlags::CULL) {
                log::trace!("Skipping culled pass '{}'", pass.name());
                continue;
            }

            let mut list = self.backend.begin_command_list(pass.queue_type(), pass.name())?;
            self.bind_targets(level_pass, pass.as_ref(), &mut list);
            if self.config.parallel_recording {
                recorded.push((level_pass.pass, list));
            } else {
                pass.dispatch(self.storage, &mut list);
                self.backend.submit(vec![list])?;
            }
        }

        if recorded.is_empty() {
            return Ok(());
        }
        let storage: &GraphStorage = self.storage;
        let passes = self.passes;
        recorded
            .par_iter_mut()
            .for_each(|(index, list)| passes[*index].dispatch(storage, list));
        self.backend
            .submit(recorded.into_iter().map(|(_, list)| list).collect())?;
        Ok(())
    }

    /// Clear and bind the pass's targets, then set the default viewport.
    fn bind_targets(&self, level_pass: &LevelPass, pass: &dyn RenderPass, list: &mut B::CommandList) {
        let storage: &GraphStorage = self.storage;
        let Some(graphics) = list.as_graphics() else {
            return;
        };

        let mut render_targets = Vec::with_capacity(level_pass.render_targets.len());
        for view in &level_pass.render_targets {
            let Some(entry) = storage.get_resource_view(view) else {
                continue;
            };
            let Some(descriptor) = entry.descriptor else {
                continue;
            };
            let clear = match entry.desc {
                Some(ViewDesc::RenderTarget(desc)) => desc.unwrap_or_default().clear,
                _ => RenderTargetClear::Ignore,
            };
            let color = match clear {
                RenderTargetClear::Ignore => None,
                RenderTargetClear::UseResourceClear => Some(
                    storage
                        .handle(view.resource())
                        .and_then(|handle| handle.desc.texture())
                        .and_then(|texture| texture.clear_value)
                        .and_then(|value| value.color())
                        .unwrap_or(Vec4::ZERO),
                ),
                RenderTargetClear::Force(color) => Some(color),
            };
            if let Some(color) = color {
                graphics.clear_render_target(descriptor, color);
            }
            render_targets.push(descriptor);
        }

        let mut depth_stencil = None;
        if let Some(binding) = &level_pass.depth_stencil {
            if let Some(entry) = storage.get_resource_view(&binding.view) {
                if let Some(descriptor) = entry.descriptor {
                    if binding.writable {
                        let desc = match entry.desc {
                            Some(ViewDesc::DepthStencil(desc)) => desc.unwrap_or_default(),
                            _ => DsvDesc::default(),
                        };
                        let texture = storage
                            .handle(binding.view.resource())
                            .and_then(|handle| handle.desc.texture());
                        let (depth, stencil) = texture
                            .and_then(|texture| texture.clear_value)
                            .and_then(|value| value.depth_stencil())
                            .unwrap_or((1.0, 0));
                        let depth = desc.force_depth.unwrap_or(depth);
                        let stencil = desc.force_stencil.unwrap_or(stencil);
                        let has_stencil = texture.map_or(false, |texture| texture.format.has_stencil());
                        match desc.clear {
                            DepthStencilClear::Ignore => {}
                            DepthStencilClear::Depth => graphics.clear_depth_stencil(descriptor, Some(depth), None),
                            DepthStencilClear::Stencil => graphics.clear_depth_stencil(descriptor, None, Some(stencil)),
                            DepthStencilClear::DepthStencil => graphics.clear_depth_stencil(
                                descriptor,
                                Some(depth),
                                has_stencil.then_some(stencil),
                            ),
                        }
                    }
                    depth_stencil = Some(descriptor);
                }
            }
        }

        if !render_targets.is_empty() || depth_stencil.is_some() {
            graphics.set_render_targets(&render_targets, depth_stencil);
        }

        if !pass.override_viewport(storage, &mut *graphics) {
            let (width, height) = storage.surface_size();
            graphics.set_viewport(Viewport::from_size(width, height));
            graphics.set_scissor_rect(ScissorRect::from_size(width, height));
        }
    }

    fn destroy_resources(&mut self, level: &DependencyLevel) {
        for id in &level.resources_to_destroy {
            self.storage.release(
                id,
                &mut *self.backend,
                self.states,
                self.config.reuse_transient_resources,
            );
        }
    }
}

