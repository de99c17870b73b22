//! Graph compilation: adjacency, scheduling and lifetime analysis

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::backend::{CommandList, GraphicsBackend};
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::level::{DependencyLevel, LevelPass};
use crate::render_graph::pass::{LambdaPass, PassFlags, PassId, RenderPass};
use crate::render_graph::resolver::{PassBuildInfo, ResourceResolver};
use crate::render_graph::resource::{ResourceId, ResourceLifetime};
use crate::render_graph::storage::GraphStorage;

/// Collects passes for a graph and compiles them
///
/// Obtained from [`RenderGraph::reset`].
pub struct GraphBuilder<'g, B: GraphicsBackend> {
    graph: &'g mut RenderGraph<B>,
}

impl<'g, B: GraphicsBackend> GraphBuilder<'g, B> {
    pub(crate) fn new(graph: &'g mut RenderGraph<B>) -> Self {
        Self { graph }
    }

    /// Add a render pass to the graph
    pub fn add_pass<P: RenderPass + 'static>(&mut self, pass: P) -> PassId {
        self.add_boxed_pass(Box::new(pass))
    }

    pub fn add_boxed_pass(&mut self, pass: Box<dyn RenderPass>) -> PassId {
        self.graph.push_pass(pass)
    }

    /// Add a pass built from a resolve and a dispatch closure
    pub fn add_lambda_pass<R, D>(&mut self, name: &str, resolve: R, dispatch: D) -> PassId
    where
        R: FnMut(&mut ResourceResolver<'_>) -> GraphResult<()> + Send + Sync + 'static,
        D: Fn(&GraphStorage, &mut dyn CommandList) + Send + Sync + 'static,
    {
        self.add_pass(LambdaPass::new(name, resolve, dispatch))
    }

    pub fn pass_count(&self) -> usize {
        self.graph.pass_count()
    }

    /// Resolve every pass and compile the levels that lead to `final_output`.
    pub fn build(self, final_output: &ResourceId) -> GraphResult<()> {
        self.graph.compile(final_output)
    }
}

/// Result of compiling a graph
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    pub(crate) levels: Vec<DependencyLevel>,
    pub(crate) lifetimes: BTreeMap<ResourceId, ResourceLifetime>,
    pub(crate) order: Vec<usize>,
    pub(crate) pruned: Vec<usize>,
}

impl CompiledGraph {
    pub fn levels(&self) -> &[DependencyLevel] {
        &self.levels
    }

    pub fn lifetimes(&self) -> &BTreeMap<ResourceId, ResourceLifetime> {
        &self.lifetimes
    }

    /// Scheduled passes in topological order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Passes dropped because their outputs never reach the final output.
    pub fn pruned(&self) -> &[usize] {
        &self.pruned
    }

    /// Level a pass was scheduled in.
    pub fn level_of(&self, pass: usize) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.pass_indices().any(|p| p == pass))
    }
}

/// Static description of a pass used while compiling
pub(crate) struct PassMeta<'a> {
    pub name: &'a str,
    pub flags: PassFlags,
}

/// Edges producer -> consumer, indexed by pass.
///
/// A writer precedes the readers registered after it, and writers of one
/// resource are chained in registration order. A reader registered before
/// any writer of the resource depends on every writer instead. A reader that
/// already has an earlier writer precedes the later writers, so it never sees
/// their output.
pub(crate) fn build_adjacency(infos: &[PassBuildInfo]) -> Vec<BTreeSet<usize>> {
    let mut writers: BTreeMap<&ResourceId, Vec<usize>> = BTreeMap::new();
    let mut readers: BTreeMap<&ResourceId, Vec<usize>> = BTreeMap::new();
    for (index, info) in infos.iter().enumerate() {
        for id in &info.writes {
            writers.entry(id).or_default().push(index);
        }
        for id in &info.reads {
            readers.entry(id).or_default().push(index);
        }
    }

    let mut adjacency = vec![BTreeSet::new(); infos.len()];
    for (id, resource_writers) in &writers {
        for pair in resource_writers.windows(2) {
            adjacency[pair[0]].insert(pair[1]);
        }
        let (Some(resource_readers), Some(&first_writer)) = (readers.get(id), resource_writers.first()) else {
            continue;
        };
        for &reader in resource_readers {
            if reader < first_writer {
                for &writer in resource_writers {
                    adjacency[writer].insert(reader);
                }
                continue;
            }
            for &writer in resource_writers {
                if writer < reader {
                    adjacency[writer].insert(reader);
                } else if writer > reader {
                    adjacency[reader].insert(writer);
                }
            }
        }
    }
    adjacency
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Iterative depth-first topological sort over the active passes.
pub(crate) fn topological_sort(
    adjacency: &[BTreeSet<usize>],
    active: &[bool],
    names: &[&str],
) -> GraphResult<Vec<usize>> {
    let children: Vec<Vec<usize>> = adjacency
        .iter()
        .map(|edges| edges.iter().copied().filter(|&c| active[c]).collect())
        .collect();
    let mut marks = vec![Mark::White; adjacency.len()];
    let mut postorder = Vec::with_capacity(adjacency.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..adjacency.len() {
        if !active[root] || marks[root] != Mark::White {
            continue;
        }
        marks[root] = Mark::Grey;
        stack.push((root, 0));

        while let Some(top) = stack.len().checked_sub(1) {
            let (node, next) = stack[top];
            match children[node].get(next) {
                Some(&child) => {
                    stack[top].1 += 1;
                    match marks[child] {
                        Mark::White => {
                            marks[child] = Mark::Grey;
                            stack.push((child, 0));
                        }
                        Mark::Grey => {
                            let start = stack
                                .iter()
                                .position(|&(n, _)| n == child)
                                .unwrap_or(0);
                            let mut passes: Vec<String> = stack[start..]
                                .iter()
                                .map(|&(n, _)| names[n].to_string())
                                .collect();
                            passes.push(names[child].to_string());
                            return Err(GraphError::CyclicDependency { passes });
                        }
                        Mark::Black => {}
                    }
                }
                None => {
                    marks[node] = Mark::Black;
                    postorder.push(node);
                    stack.pop();
                }
            }
        }
    }

    postorder.reverse();
    Ok(postorder)
}

/// Passes whose writes can reach a writer of `final_output`, plus passes
/// that write nothing and passes flagged `NEVER_CULL`.
fn reachable_passes(
    adjacency: &[BTreeSet<usize>],
    infos: &[PassBuildInfo],
    passes: &[PassMeta<'_>],
    final_output: &ResourceId,
) -> Vec<bool> {
    let mut predecessors = vec![Vec::new(); adjacency.len()];
    for (from, edges) in adjacency.iter().enumerate() {
        for &to in edges {
            predecessors[to].push(from);
        }
    }

    let mut keep = vec![false; adjacency.len()];
    let mut queue: VecDeque<usize> = infos
        .iter()
        .enumerate()
        .filter(|(_, info)| info.writes.contains(final_output))
        .map(|(index, _)| index)
        .collect();
    while let Some(pass) = queue.pop_front() {
        if std::mem::replace(&mut keep[pass], true) {
            continue;
        }
        queue.extend(predecessors[pass].iter().copied().filter(|&p| !keep[p]));
    }

    for (index, info) in infos.iter().enumerate() {
        if info.writes.is_empty() || passes[index].flags.contains(PassFlags::NEVER_CULL) {
            keep[index] = true;
        }
    }
    keep
}

/// Compile resolved passes into dependency levels.
pub(crate) fn compile_levels(
    passes: &[PassMeta<'_>],
    infos: &[PassBuildInfo],
    storage: &GraphStorage,
    final_output: &ResourceId,
    prune: bool,
) -> GraphResult<CompiledGraph> {
    if !storage.contains(final_output) {
        return Err(GraphError::UnknownResource {
            pass: "final output".to_string(),
            resource: final_output.to_string(),
        });
    }

    let adjacency = build_adjacency(infos);
    let active = if prune {
        reachable_passes(&adjacency, infos, passes, final_output)
    } else {
        vec![true; infos.len()]
    };
    let pruned: Vec<usize> = (0..infos.len()).filter(|&i| !active[i]).collect();
    for &index in &pruned {
        log::debug!("Pruning pass '{}'", passes[index].name);
    }

    let names: Vec<&str> = passes.iter().map(|pass| pass.name).collect();
    let order = topological_sort(&adjacency, &active, &names)?;

    // Longest path from any root
    let mut level_of = vec![0usize; infos.len()];
    for &pass in &order {
        for &next in &adjacency[pass] {
            if active[next] {
                level_of[next] = level_of[next].max(level_of[pass] + 1);
            }
        }
    }

    let level_count = order.iter().map(|&p| level_of[p] + 1).max().unwrap_or(0);
    let mut levels: Vec<DependencyLevel> = (0..level_count).map(DependencyLevel::new).collect();
    for (index, info) in infos.iter().enumerate() {
        if !active[index] {
            continue;
        }
        let level = &mut levels[level_of[index]];
        level.passes.push(LevelPass {
            pass: index,
            render_targets: info.render_targets.clone(),
            depth_stencil: info.depth_stencil.clone(),
        });
        for (view, state) in &info.states {
            *level.states.entry(view.clone()).or_default() |= *state;
        }
    }

    let mut lifetimes: BTreeMap<ResourceId, ResourceLifetime> = BTreeMap::new();
    let mut written: BTreeSet<&ResourceId> = BTreeSet::new();
    for (index, info) in infos.iter().enumerate() {
        if !active[index] {
            continue;
        }
        written.extend(info.writes.iter());
        let level = level_of[index];
        for id in info.referenced() {
            let imported = storage.handle(id).map_or(false, |handle| handle.is_imported());
            let lifetime = lifetimes.entry(id.clone()).or_insert(ResourceLifetime {
                creation_level: level,
                destruction_level: level,
                imported,
            });
            lifetime.creation_level = lifetime.creation_level.min(level);
            lifetime.destruction_level = lifetime.destruction_level.max(level);
        }
    }

    let mut transient = 0;
    for (id, lifetime) in lifetimes.iter_mut() {
        if lifetime.imported {
            lifetime.creation_level = 0;
            continue;
        }
        if !written.contains(id) {
            log::warn!("Resource '{}' is read but never written", id);
        }
        levels[lifetime.creation_level]
            .resources_to_create
            .insert(id.clone());
        levels[lifetime.destruction_level]
            .resources_to_destroy
            .insert(id.clone());
        transient += 1;
    }

    log::info!(
        "Render graph compiled: {} passes in {} levels, {} transient resources",
        order.len(),
        levels.len(),
        transient
    );
    for level in &levels {
        log::debug!(
            "Level {}: passes {:?}, create {:?}, destroy {:?}",
            level.index,
            level.pass_indices().map(|p| names[p]).collect::<Vec<_>>(),
            level.resources_to_create,
            level.resources_to_destroy
        );
    }

    Ok(CompiledGraph {
        levels,
        lifetimes,
        order,
        pruned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(reads: &[&str], writes: &[&str]) -> PassBuildInfo {
        PassBuildInfo {
            reads: reads.iter().map(|name| ResourceId::new(name)).collect(),
            writes: writes.iter().map(|name| ResourceId::new(name)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_adjacency_writer_to_readers() {
        let infos = vec![
            info(&[], &["A"]),
            info(&["A"], &["B"]),
            info(&["A", "B"], &["C"]),
            info(&[], &["D"]),
        ];
        let adjacency = build_adjacency(&infos);
        assert_eq!(adjacency[0], BTreeSet::from([1, 2]));
        assert_eq!(adjacency[1], BTreeSet::from([2]));
        assert!(adjacency[2].is_empty());
        assert!(adjacency[3].is_empty());
    }

    #[test]
    fn test_adjacency_reader_registered_first() {
        // Nothing produced A before the reader, so it waits for the writer
        let infos = vec![info(&["A"], &[]), info(&[], &["A"])];
        let adjacency = build_adjacency(&infos);
        assert_eq!(adjacency[1], BTreeSet::from([0]));
        assert!(adjacency[0].is_empty());
    }

    #[test]
    fn test_adjacency_ping_pong() {
        // 0 writes X, 1 reads X and writes Y, 2 reads Y and writes X
        let infos = vec![info(&[], &["X"]), info(&["X"], &["Y"]), info(&["Y"], &["X"])];
        let adjacency = build_adjacency(&infos);
        assert_eq!(adjacency[0], BTreeSet::from([1, 2]));
        assert_eq!(adjacency[1], BTreeSet::from([2]));
        assert!(adjacency[2].is_empty());
    }

    #[test]
    fn test_writers_are_chained() {
        let infos = vec![info(&[], &["A"]), info(&[], &["A"]), info(&[], &["A"])];
        let adjacency = build_adjacency(&infos);
        assert_eq!(adjacency[0], BTreeSet::from([1]));
        assert_eq!(adjacency[1], BTreeSet::from([2]));
    }

    #[test]
    fn test_topological_sort_respects_edges() {
        let adjacency = vec![
            BTreeSet::from([2]),
            BTreeSet::from([2, 3]),
            BTreeSet::from([3]),
            BTreeSet::new(),
        ];
        let order = topological_sort(&adjacency, &[true; 4], &["a", "b", "c", "d"]).unwrap();
        let position = |p: usize| order.iter().position(|&x| x == p).unwrap();
        for (from, edges) in adjacency.iter().enumerate() {
            for &to in edges {
                assert!(position(from) < position(to));
            }
        }
    }

    #[test]
    fn test_cycle_names_passes() {
        let adjacency = vec![BTreeSet::from([1]), BTreeSet::from([2]), BTreeSet::from([1])];
        let result = topological_sort(&adjacency, &[true; 3], &["Root", "A", "B"]);
        assert_eq!(
            result,
            Err(GraphError::CyclicDependency {
                passes: vec!["A".to_string(), "B".to_string(), "A".to_string()],
            })
        );
    }

    #[test]
    fn test_inactive_passes_break_cycles() {
        let adjacency = vec![BTreeSet::from([1]), BTreeSet::from([0])];
        let order = topological_sort(&adjacency, &[true, false], &["A", "B"]).unwrap();
        assert_eq!(order, vec![0]);
    }
}
