//! Resource state model and barrier planning
//!
//! Every GPU object the graph touches is tracked per subresource. Passes
//! request states, requests are merged until the next flush, and the flush
//! records the smallest barrier batch that brings every requested subresource
//! into its state.

use crate::backend::traits::{CommandList, GpuResourceHandle};
use bitflags::bitflags;
use parking_lot::Mutex;
use std::collections::BTreeMap;

bitflags! {
    /// Abstract GPU resource state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct ResourceState: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const DEPTH_READ = 1 << 5;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        const INDIRECT_ARGUMENT = 1 << 8;
        const COPY_DEST = 1 << 9;
        const COPY_SOURCE = 1 << 10;
        const PRESENT = 1 << 11;

        const ALL_SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits();
        const READ_ONLY = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::DEPTH_READ.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits()
            | Self::PRESENT.bits();
        const WRITE = Self::RENDER_TARGET.bits()
            | Self::UNORDERED_ACCESS.bits()
            | Self::DEPTH_WRITE.bits()
            | Self::COPY_DEST.bits();
    }
}

impl ResourceState {
    /// State of a freshly created object that nobody has used yet.
    pub const COMMON: Self = Self::empty();

    pub fn is_read_only(&self) -> bool {
        !self.is_empty() && Self::READ_ONLY.contains(*self)
    }

    pub fn has_write(&self) -> bool {
        self.intersects(Self::WRITE)
    }

    /// Whether moving from `self` to `new` needs no barrier.
    pub fn satisfies(&self, new: ResourceState) -> bool {
        if *self == new {
            return true;
        }
        self.intersects(Self::READ_ONLY) && self.contains(new)
    }

    /// Combine two requests for the same subresource within one flush.
    ///
    /// Read states accumulate. A write conflicts with anything else, in which
    /// case the later request wins.
    pub fn merge(self, later: ResourceState) -> (ResourceState, bool) {
        if self == later {
            return (self, false);
        }
        if self.has_write() || later.has_write() {
            return (later, true);
        }
        (self | later, false)
    }
}

/// Subresource selection for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subresource {
    All,
    Index(u32),
}

/// A single transition recorded into a command list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBarrier {
    pub resource: GpuResourceHandle,
    pub subresource: Subresource,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Current state of each subresource, indexed by subresource index
pub type SubresourceStates = Vec<ResourceState>;

/// Tracks resource states and plans barriers
///
/// Implementations are shared between the frame driver and recording threads,
/// so every method takes `&self`.
pub trait ResourceStateManager: Send + Sync {
    /// Begin tracking `resource`. Tracking an already tracked object is a
    /// no-op.
    fn start_tracking(&self, resource: GpuResourceHandle, subresource_count: u32, initial: ResourceState);

    /// Forget `resource` along with any pending requests for it.
    fn stop_tracking(&self, resource: GpuResourceHandle);

    fn is_tracking(&self, resource: GpuResourceHandle) -> bool;

    /// Request `state` for a subresource. Nothing is recorded until
    /// [`flush_barriers`](Self::flush_barriers).
    fn transition_resource(&self, resource: GpuResourceHandle, state: ResourceState, subresource: Subresource);

    /// Record every pending transition as one batch. Returns `true` when at
    /// least one barrier was recorded.
    fn flush_barriers(&self, command_list: &mut dyn CommandList) -> bool;

    fn current_states(&self, resource: GpuResourceHandle) -> Option<SubresourceStates>;
}

struct TrackedResource {
    states: SubresourceStates,
    pending: Vec<Option<ResourceState>>,
}

#[derive(Default)]
struct TrackerInner {
    resources: BTreeMap<GpuResourceHandle, TrackedResource>,
    /// Resources with pending requests, in first-request order
    pending_order: Vec<GpuResourceHandle>,
}

/// In-process [`ResourceStateManager`]
#[derive(Default)]
pub struct TrackedStateManager {
    inner: Mutex<TrackerInner>,
}

impl TrackedStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.inner.lock().resources.len()
    }

    fn plan(resource: GpuResourceHandle, tracked: &mut TrackedResource) -> Vec<TransitionBarrier> {
        let mut transitions = Vec::new();
        for (index, request) in tracked.pending.iter_mut().enumerate() {
            let Some(after) = request.take() else {
                continue;
            };
            let before = tracked.states[index];
            if before.satisfies(after) {
                continue;
            }
            tracked.states[index] = after;
            transitions.push((index as u32, before, after));
        }

        let uniform = transitions.len() == tracked.states.len()
            && transitions.windows(2).all(|w| w[0].1 == w[1].1 && w[0].2 == w[1].2);
        if uniform {
            if let Some(&(_, before, after)) = transitions.first() {
                return vec![TransitionBarrier {
                    resource,
                    subresource: Subresource::All,
                    before,
                    after,
                }];
            }
        }

        transitions
            .into_iter()
            .map(|(index, before, after)| TransitionBarrier {
                resource,
                subresource: Subresource::Index(index),
                before,
                after,
            })
            .collect()
    }
}

impl ResourceStateManager for TrackedStateManager {
    fn start_tracking(&self, resource: GpuResourceHandle, subresource_count: u32, initial: ResourceState) {
        let mut inner = self.inner.lock();
        let count = subresource_count.max(1) as usize;
        inner.resources.entry(resource).or_insert_with(|| {
            log::trace!("Tracking {:?} ({} subresources) in {:?}", resource, count, initial);
            TrackedResource {
                states: vec![initial; count],
                pending: vec![None; count],
            }
        });
    }

    fn stop_tracking(&self, resource: GpuResourceHandle) {
        let mut inner = self.inner.lock();
        inner.resources.remove(&resource);
        inner.pending_order.retain(|r| *r != resource);
    }

    fn is_tracking(&self, resource: GpuResourceHandle) -> bool {
        self.inner.lock().resources.contains_key(&resource)
    }

    fn transition_resource(&self, resource: GpuResourceHandle, state: ResourceState, subresource: Subresource) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(tracked) = inner.resources.get_mut(&resource) else {
            log::warn!("Transition requested for untracked resource {:?}", resource);
            return;
        };

        let range = match subresource {
            Subresource::All => 0..tracked.pending.len(),
            Subresource::Index(index) if (index as usize) < tracked.pending.len() => {
                index as usize..index as usize + 1
            }
            Subresource::Index(index) => {
                log::warn!(
                    "Subresource {} out of range for {:?} ({} subresources)",
                    index,
                    resource,
                    tracked.pending.len()
                );
                return;
            }
        };

        for slot in &mut tracked.pending[range] {
            *slot = Some(match *slot {
                None => state,
                Some(previous) => {
                    let (merged, conflict) = previous.merge(state);
                    if conflict {
                        log::warn!(
                            "Conflicting transitions for {:?}: {:?} then {:?}",
                            resource,
                            previous,
                            state
                        );
                    }
                    merged
                }
            });
        }

        if !inner.pending_order.contains(&resource) {
            inner.pending_order.push(resource);
        }
    }

    fn flush_barriers(&self, command_list: &mut dyn CommandList) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut barriers = Vec::new();
        for resource in inner.pending_order.drain(..) {
            if let Some(tracked) = inner.resources.get_mut(&resource) {
                barriers.extend(Self::plan(resource, tracked));
            }
        }

        if barriers.is_empty() {
            return false;
        }
        for barrier in &barriers {
            log::trace!(
                "Barrier {:?} {:?}: {:?} -> {:?}",
                barrier.resource,
                barrier.subresource,
                barrier.before,
                barrier.after
            );
        }
        command_list.resource_barriers(&barriers);
        true
    }

    fn current_states(&self, resource: GpuResourceHandle) -> Option<SubresourceStates> {
        self.inner
            .lock()
            .resources
            .get(&resource)
            .map(|tracked| tracked.states.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyCommandList, RecordedCommand};
    use crate::backend::types::QueueType;

    fn barriers(list: &DummyCommandList) -> Vec<TransitionBarrier> {
        list.commands()
            .iter()
            .flat_map(|command| match command {
                RecordedCommand::Barriers(batch) => batch.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_redundancy_rules() {
        let ps = ResourceState::PIXEL_SHADER_RESOURCE;
        assert!(ps.satisfies(ps));
        assert!(ResourceState::ALL_SHADER_RESOURCE.satisfies(ps));
        assert!(!ps.satisfies(ResourceState::ALL_SHADER_RESOURCE));
        assert!(!ResourceState::RENDER_TARGET.satisfies(ps));
        assert!(!ResourceState::COMMON.satisfies(ps));
    }

    #[test]
    fn test_merge_reads_and_conflicts() {
        let (merged, conflict) = ResourceState::PIXEL_SHADER_RESOURCE
            .merge(ResourceState::NON_PIXEL_SHADER_RESOURCE);
        assert_eq!(merged, ResourceState::ALL_SHADER_RESOURCE);
        assert!(!conflict);

        let (merged, conflict) =
            ResourceState::PIXEL_SHADER_RESOURCE.merge(ResourceState::RENDER_TARGET);
        assert_eq!(merged, ResourceState::RENDER_TARGET);
        assert!(conflict);
    }

    #[test]
    fn test_uniform_transitions_collapse() {
        let manager = TrackedStateManager::new();
        let texture = GpuResourceHandle(1);
        manager.start_tracking(texture, 4, ResourceState::RENDER_TARGET);
        manager.transition_resource(texture, ResourceState::PIXEL_SHADER_RESOURCE, Subresource::All);

        let mut list = DummyCommandList::new(QueueType::Direct, "barriers");
        assert!(manager.flush_barriers(&mut list));
        let recorded = barriers(&list);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].subresource, Subresource::All);
        assert_eq!(recorded[0].before, ResourceState::RENDER_TARGET);
        assert_eq!(recorded[0].after, ResourceState::PIXEL_SHADER_RESOURCE);
    }

    #[test]
    fn test_partial_transition_is_per_subresource() {
        let manager = TrackedStateManager::new();
        let texture = GpuResourceHandle(7);
        manager.start_tracking(texture, 3, ResourceState::COMMON);
        manager.transition_resource(texture, ResourceState::UNORDERED_ACCESS, Subresource::Index(2));

        let mut list = DummyCommandList::new(QueueType::Compute, "barriers");
        assert!(manager.flush_barriers(&mut list));
        let recorded = barriers(&list);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].subresource, Subresource::Index(2));

        let states = manager.current_states(texture).unwrap();
        assert_eq!(
            states,
            vec![
                ResourceState::COMMON,
                ResourceState::COMMON,
                ResourceState::UNORDERED_ACCESS
            ]
        );
    }

    #[test]
    fn test_read_after_read_is_elided() {
        let manager = TrackedStateManager::new();
        let buffer = GpuResourceHandle(3);
        manager.start_tracking(buffer, 1, ResourceState::ALL_SHADER_RESOURCE);
        manager.transition_resource(buffer, ResourceState::NON_PIXEL_SHADER_RESOURCE, Subresource::All);

        let mut list = DummyCommandList::new(QueueType::Direct, "barriers");
        assert!(!manager.flush_barriers(&mut list));
        assert!(list.commands().is_empty());
        assert_eq!(
            manager.current_states(buffer).unwrap(),
            vec![ResourceState::ALL_SHADER_RESOURCE]
        );
    }

    #[test]
    fn test_requests_merge_until_flush() {
        let manager = TrackedStateManager::new();
        let texture = GpuResourceHandle(9);
        manager.start_tracking(texture, 1, ResourceState::RENDER_TARGET);
        manager.transition_resource(texture, ResourceState::PIXEL_SHADER_RESOURCE, Subresource::All);
        manager.transition_resource(texture, ResourceState::NON_PIXEL_SHADER_RESOURCE, Subresource::All);

        let mut list = DummyCommandList::new(QueueType::Direct, "barriers");
        manager.flush_barriers(&mut list);
        let recorded = barriers(&list);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].after, ResourceState::ALL_SHADER_RESOURCE);
    }

    #[test]
    fn test_start_tracking_is_idempotent() {
        let manager = TrackedStateManager::new();
        let texture = GpuResourceHandle(2);
        manager.start_tracking(texture, 1, ResourceState::RENDER_TARGET);
        manager.start_tracking(texture, 1, ResourceState::COMMON);
        assert_eq!(
            manager.current_states(texture).unwrap(),
            vec![ResourceState::RENDER_TARGET]
        );

        manager.stop_tracking(texture);
        assert!(!manager.is_tracking(texture));
        assert_eq!(manager.tracked_count(), 0);
    }

    #[test]
    fn test_batch_spans_resources() {
        let manager = TrackedStateManager::new();
        let a = GpuResourceHandle(1);
        let b = GpuResourceHandle(2);
        manager.start_tracking(a, 1, ResourceState::RENDER_TARGET);
        manager.start_tracking(b, 1, ResourceState::UNORDERED_ACCESS);
        manager.transition_resource(b, ResourceState::PIXEL_SHADER_RESOURCE, Subresource::All);
        manager.transition_resource(a, ResourceState::PIXEL_SHADER_RESOURCE, Subresource::All);

        let mut list = DummyCommandList::new(QueueType::Direct, "barriers");
        manager.flush_barriers(&mut list);
        let batches: Vec<_> = list
            .commands()
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Barriers(_)))
            .collect();
        assert_eq!(batches.len(), 1);
        let recorded = barriers(&list);
        assert_eq!(recorded[0].resource, b);
        assert_eq!(recorded[1].resource, a);
    }
}
