//! SM-003: Dependency flattening and stack-level dependency derivation.
//!
//! Dependencies are declared between arbitrary nodes and resolved lazily:
//! a target that is a synthesizing resource stands for itself, any other
//! target stands for every synthesizing resource in its subtree. Stack-level
//! dependencies have no storage of their own; they are recomputed from the
//! flattened resource edges on every query. Stacks are ordered for deployment
//! with Kahn's algorithm and deterministic (path) tie-breaking.

use super::error::SynthError;
use super::tree::{ConstructTree, NodeId, ResourceId, StackId};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Sort key giving a pre-order over paths: components compare one by one,
/// so `A/B` sorts right after `A` and before `A-x`.
fn path_key(tree: &ConstructTree, node: impl Into<NodeId>) -> Vec<&str> {
    tree.path(node).split('/').collect()
}

/// Resolve one declared target to the concrete resources it stands for.
pub fn flatten_target(tree: &ConstructTree, target: NodeId) -> Vec<ResourceId> {
    if let Some(r) = tree.as_resource(target) {
        if tree.resource(r).should_synthesize() {
            return vec![r];
        }
    }
    tree.resources_under(target)
        .into_iter()
        .filter(|&r| tree.resource(r).should_synthesize())
        .collect()
}

/// Flattened dependencies of `resource`, deduplicated and ordered by path.
///
/// Edges declared on the resource itself and on every ancestor apply. The
/// resource is never reported as its own dependency.
pub fn obtain_depends_on(tree: &ConstructTree, resource: ResourceId) -> Vec<ResourceId> {
    let mut found: BTreeMap<Vec<&str>, ResourceId> = BTreeMap::new();
    let declaring = std::iter::once(resource.node()).chain(tree.ancestors(resource));

    for source in declaring {
        for target in tree.dependencies(source) {
            for r in flatten_target(tree, target).into_iter().filter(|&r| r != resource) {
                found.insert(path_key(tree, r), r);
            }
        }
    }

    found.into_values().collect()
}

/// Declared `(source, target)` edges applying to `resource` whose target
/// flattens to no synthesizing resource at all. Legal, but usually a mistake.
pub fn unresolved_dependencies(tree: &ConstructTree, resource: ResourceId) -> Vec<(NodeId, NodeId)> {
    std::iter::once(resource.node())
        .chain(tree.ancestors(resource))
        .flat_map(|source| tree.dependencies(source).map(move |target| (source, target)))
        .filter(|&(_, target)| flatten_target(tree, target).is_empty())
        .collect()
}

/// A stack-level dependency with the resource edges that justify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDependency {
    pub target: StackId,
    /// `(source, target)` resource pairs, in source tree order
    pub reasons: Vec<(ResourceId, ResourceId)>,
}

/// Stacks that `stack` depends on, with reasons, ordered by target path.
pub fn stack_dependency_reasons(tree: &ConstructTree, stack: StackId) -> Vec<StackDependency> {
    let mut by_target: BTreeMap<Vec<&str>, StackDependency> = BTreeMap::new();

    for source in tree.resources_of(stack) {
        if !tree.resource(source).should_synthesize() {
            continue;
        }
        for target in obtain_depends_on(tree, source) {
            let Some(target_stack) = tree.owning_stack(target) else {
                continue;
            };
            if target_stack == stack {
                continue;
            }
            by_target
                .entry(path_key(tree, target_stack))
                .or_insert_with(|| StackDependency {
                    target: target_stack,
                    reasons: Vec::new(),
                })
                .reasons
                .push((source, target));
        }
    }

    by_target.into_values().collect()
}

/// Stacks that `stack` depends on, ordered by path.
pub fn stack_dependencies(tree: &ConstructTree, stack: StackId) -> Vec<StackId> {
    stack_dependency_reasons(tree, stack)
        .into_iter()
        .map(|d| d.target)
        .collect()
}

/// Order every stack so that dependencies come first.
/// Uses Kahn's algorithm with path tie-breaking for determinism.
pub fn deployment_order(tree: &ConstructTree) -> Result<Vec<StackId>, SynthError> {
    let stacks = tree.stacks();
    let mut in_degree: HashMap<StackId, usize> = HashMap::new();
    let mut adjacency: HashMap<StackId, Vec<StackId>> = HashMap::new();

    for &s in &stacks {
        in_degree.insert(s, 0);
        adjacency.insert(s, Vec::new());
    }

    for &s in &stacks {
        for dep in stack_dependencies(tree, s) {
            adjacency.entry(dep).or_default().push(s);
            *in_degree.entry(s).or_default() += 1;
        }
    }

    let by_path = |a: &StackId, b: &StackId| tree.path(*a).cmp(tree.path(*b));

    let mut zero_degree: Vec<StackId> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&s, _)| s)
        .collect();
    zero_degree.sort_by(by_path);
    let mut queue: VecDeque<StackId> = zero_degree.into_iter().collect();

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current);

        let mut next_ready: Vec<StackId> = Vec::new();
        for neighbor in adjacency.get(&current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(neighbor) {
                *degree -= 1;
                if *degree == 0 {
                    next_ready.push(*neighbor);
                }
            }
        }
        next_ready.sort_by(by_path);
        queue.extend(next_ready);
    }

    if order.len() != stacks.len() {
        let ordered: HashSet<StackId> = order.iter().copied().collect();
        let mut members: Vec<String> = stacks
            .iter()
            .filter(|s| !ordered.contains(s))
            .map(|&s| tree.path(s).to_string())
            .collect();
        members.sort();
        return Err(SynthError::StackCycle { members });
    }

    Ok(order)
}
