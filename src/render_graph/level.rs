//! Dependency levels produced by graph compilation

use std::collections::{BTreeMap, BTreeSet};

use crate::backend::ResourceState;
use crate::render_graph::resolver::DepthStencilBinding;
use crate::render_graph::resource::{ResourceId, ResourceViewId, SubresourceView};
use crate::render_graph::storage::GraphStorage;

/// Execution status of a level within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelStatus {
    #[default]
    Pending,
    BarriersFlushed,
    Executed,
}

/// A pass scheduled in a level, with the targets bound before it dispatches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelPass {
    /// Index into the graph's pass list
    pub pass: usize,
    pub render_targets: Vec<ResourceViewId>,
    pub depth_stencil: Option<DepthStencilBinding>,
}

/// Passes that may execute at the same step
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyLevel {
    pub(crate) index: usize,
    pub(crate) passes: Vec<LevelPass>,
    pub(crate) resources_to_create: BTreeSet<ResourceId>,
    pub(crate) resources_to_destroy: BTreeSet<ResourceId>,
    pub(crate) states: BTreeMap<ResourceViewId, ResourceState>,
    pub(crate) status: LevelStatus,
}

impl DependencyLevel {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            passes: Vec::new(),
            resources_to_create: BTreeSet::new(),
            resources_to_destroy: BTreeSet::new(),
            states: BTreeMap::new(),
            status: LevelStatus::Pending,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn passes(&self) -> &[LevelPass] {
        &self.passes
    }

    /// Pass indices in dispatch order.
    pub fn pass_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.passes.iter().map(|pass| pass.pass)
    }

    pub fn resources_to_create(&self) -> &BTreeSet<ResourceId> {
        &self.resources_to_create
    }

    pub fn resources_to_destroy(&self) -> &BTreeSet<ResourceId> {
        &self.resources_to_destroy
    }

    /// Required state of every view used in this level.
    pub fn states(&self) -> &BTreeMap<ResourceViewId, ResourceState> {
        &self.states
    }

    pub fn status(&self) -> LevelStatus {
        self.status
    }

    /// State a freshly created object for `id` should start in.
    ///
    /// When every view the level uses covers the whole resource and all of
    /// them require the same state, the object is created in that state and
    /// needs no barrier. Otherwise it starts in `COMMON`.
    pub fn initial_state_for(&self, id: &ResourceId, storage: &GraphStorage) -> ResourceState {
        let mut initial = None;
        for (view, state) in self.states.iter().filter(|(view, _)| view.resource() == id) {
            let full = storage
                .get_resource_view(view)
                .map_or(true, |entry| entry.subresource == SubresourceView::ALL);
            match initial {
                _ if !full => return ResourceState::COMMON,
                None => initial = Some(*state),
                Some(previous) if previous == *state => {}
                Some(_) => return ResourceState::COMMON,
            }
        }
        initial.unwrap_or(ResourceState::COMMON)
    }
}
