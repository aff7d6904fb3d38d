//! SM-001: Construct tree: an arena of named nodes with computed paths.
//!
//! Nodes are addressed by [`NodeId`] (an arena index); the parent is stored as
//! an index, never as a reference. Children keep insertion order, which is the
//! traversal order everywhere else in the crate. Nodes are never removed and
//! never re-parented, so paths are computed once at registration.

use super::error::ConstructError;
use super::resolver;
use super::resource::{ResourceNode, ResourceProps};
use indexmap::{IndexMap, IndexSet};
use std::fmt;

// ============================================================================
// Handles
// ============================================================================

/// Index of a node in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

macro_rules! typed_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NodeId);

        impl $name {
            pub fn node(self) -> NodeId {
                self.0
            }
        }

        impl From<$name> for NodeId {
            fn from(h: $name) -> NodeId {
                h.0
            }
        }
    };
}

typed_handle!(
    /// A node known to be a resource.
    ResourceId
);
typed_handle!(
    /// A node known to be a stack.
    StackId
);
typed_handle!(
    /// A node known to be a stage.
    StageId
);

// ============================================================================
// Nodes
// ============================================================================

/// Stack-specific payload.
#[derive(Debug, Clone)]
pub struct StackNode {
    stack_name: String,
}

impl StackNode {
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn set_stack_name(&mut self, name: impl Into<String>) {
        self.stack_name = name.into();
    }
}

/// What a node is. The root acts as a Stage: it starts a deployment scope
/// that contains no Stack of its own.
#[derive(Debug)]
pub enum NodeKind {
    Root,
    Construct,
    Stack(StackNode),
    Stage,
    Resource(ResourceNode),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Construct => "construct",
            Self::Stack(_) => "stack",
            Self::Stage => "stage",
            Self::Resource(_) => "resource",
        }
    }

    /// Stacks, stages and the root delimit resource ownership.
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::Root | Self::Stack(_) | Self::Stage)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One element of the tree.
#[derive(Debug)]
pub struct Node {
    id: String,
    path: String,
    scope: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    dependencies: IndexSet<NodeId>,
    kind: NodeKind,
}

impl Node {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Slash-joined ids from the root (exclusive) down to this node.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn child(&self, id: &str) -> Option<NodeId> {
        self.children.get(id).copied()
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Ownership tree of constructs. The tree owns every node; handles are plain
/// indices valid only for the tree that issued them.
#[derive(Debug)]
pub struct ConstructTree {
    nodes: Vec<Node>,
}

impl Default for ConstructTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructTree {
    /// Create a tree holding only the root (id `""`, path `""`).
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                id: String::new(),
                path: String::new(),
                scope: None,
                children: IndexMap::new(),
                dependencies: IndexSet::new(),
                kind: NodeKind::Root,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, id: impl Into<NodeId>) -> &Node {
        &self.nodes[id.into().0]
    }

    pub fn path(&self, id: impl Into<NodeId>) -> &str {
        &self.node(id).path
    }

    /// Look a node up by its path (`""` is the root).
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(self.root());
        }
        path.split('/')
            .try_fold(self.root(), |cur, id| self.node(cur).child(id))
    }

    // -- registration --------------------------------------------------------

    fn add_child(
        &mut self,
        scope: NodeId,
        id: &str,
        kind: NodeKind,
    ) -> Result<NodeId, ConstructError> {
        let parent = self.node(scope);
        let path = if parent.path.is_empty() {
            id.to_string()
        } else {
            format!("{}/{}", parent.path, id)
        };

        let node_id = NodeId(self.nodes.len());
        tracing::debug!(path = %path, kind = kind.label(), "registered construct");
        self.nodes[scope.0].children.insert(id.to_string(), node_id);
        self.nodes.push(Node {
            id: id.to_string(),
            path,
            scope: Some(scope),
            children: IndexMap::new(),
            dependencies: IndexSet::new(),
            kind,
        });
        Ok(node_id)
    }

    fn check_name(&self, scope: NodeId, id: &str) -> Result<(), ConstructError> {
        if id.is_empty() || id.contains('/') {
            return Err(ConstructError::InvalidId { id: id.to_string() });
        }
        let parent = self.node(scope);
        if parent.children.contains_key(id) {
            return Err(ConstructError::DuplicateName {
                scope: parent.path.clone(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Register a plain grouping construct.
    pub fn add_construct(
        &mut self,
        scope: impl Into<NodeId>,
        id: &str,
    ) -> Result<NodeId, ConstructError> {
        let scope = scope.into();
        self.check_name(scope, id)?;
        self.add_child(scope, id, NodeKind::Construct)
    }

    /// Register a stack. Its stack name defaults to its id.
    pub fn add_stack(&mut self, scope: impl Into<NodeId>, id: &str) -> Result<StackId, ConstructError> {
        let scope = scope.into();
        self.check_name(scope, id)?;
        let kind = NodeKind::Stack(StackNode {
            stack_name: id.to_string(),
        });
        self.add_child(scope, id, kind).map(StackId)
    }

    pub fn add_stage(&mut self, scope: impl Into<NodeId>, id: &str) -> Result<StageId, ConstructError> {
        let scope = scope.into();
        self.check_name(scope, id)?;
        self.add_child(scope, id, NodeKind::Stage).map(StageId)
    }

    /// Register a resource. Fails unless a Stack is reached from `scope`
    /// (inclusive) before any Stage or the root.
    pub fn add_resource(
        &mut self,
        scope: impl Into<NodeId>,
        id: &str,
        props: ResourceProps,
    ) -> Result<ResourceId, ConstructError> {
        let scope = scope.into();
        self.check_name(scope, id)?;
        if self.owning_stack(scope).is_none() {
            return Err(ConstructError::ScopePlacement {
                id: id.to_string(),
                scope: self.path(scope).to_string(),
            });
        }
        let kind = NodeKind::Resource(ResourceNode::new(props));
        self.add_child(scope, id, kind).map(ResourceId)
    }

    // -- traversal -----------------------------------------------------------

    /// Strict ancestors, nearest first, ending with the root.
    pub fn ancestors(&self, node: impl Into<NodeId>) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.node(node).scope,
        }
    }

    /// First strict ancestor whose node satisfies `predicate`.
    pub fn find_ancestor(
        &self,
        node: impl Into<NodeId>,
        predicate: impl Fn(&Node) -> bool,
    ) -> Option<NodeId> {
        self.ancestors(node).find(|&a| predicate(self.node(a)))
    }

    pub fn children(&self, node: impl Into<NodeId>) -> impl Iterator<Item = NodeId> + '_ {
        self.node(node).children.values().copied()
    }

    /// Pre-order walk of the subtree rooted at `node`, `node` first.
    pub fn descendants(&self, node: impl Into<NodeId>) -> Vec<NodeId> {
        self.walk(node.into(), |_| true)
    }

    /// Pre-order walk that only enters a child's subtree when `enter` allows it.
    fn walk(&self, start: NodeId, enter: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![start];
        while let Some(cur) = pending.pop() {
            out.push(cur);
            let children: Vec<NodeId> = self
                .children(cur)
                .filter(|&c| enter(self.node(c)))
                .collect();
            pending.extend(children.into_iter().rev());
        }
        out
    }

    /// The Stack that owns `node`: the nearest Stack reached from `node`
    /// (inclusive) before any Stage or the root.
    pub fn owning_stack(&self, node: impl Into<NodeId>) -> Option<StackId> {
        let node = node.into();
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find(|&n| self.node(n).kind.is_boundary())
            .and_then(|n| self.as_stack(n))
    }

    /// Every stack in tree pre-order.
    pub fn stacks(&self) -> Vec<StackId> {
        self.descendants(self.root())
            .into_iter()
            .filter_map(|n| self.as_stack(n))
            .collect()
    }

    /// Resources owned by `stack`, in tree order. Nested stacks and stages
    /// own their own subtrees and are not entered.
    pub fn resources_of(&self, stack: StackId) -> Vec<ResourceId> {
        self.walk(stack.node(), |n| !n.kind.is_boundary())
            .into_iter()
            .filter_map(|n| self.as_resource(n))
            .collect()
    }

    /// Every resource in the subtree rooted at `node` (inclusive), pre-order.
    pub fn resources_under(&self, node: impl Into<NodeId>) -> Vec<ResourceId> {
        self.descendants(node)
            .into_iter()
            .filter_map(|n| self.as_resource(n))
            .collect()
    }

    // -- typed access --------------------------------------------------------

    pub fn as_resource(&self, node: impl Into<NodeId>) -> Option<ResourceId> {
        let node = node.into();
        matches!(self.node(node).kind, NodeKind::Resource(_)).then_some(ResourceId(node))
    }

    pub fn as_stack(&self, node: impl Into<NodeId>) -> Option<StackId> {
        let node = node.into();
        matches!(self.node(node).kind, NodeKind::Stack(_)).then_some(StackId(node))
    }

    pub fn resource(&self, id: ResourceId) -> &ResourceNode {
        match &self.nodes[id.0 .0].kind {
            NodeKind::Resource(r) => r,
            other => unreachable!("ResourceId addresses a {} node", other),
        }
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> &mut ResourceNode {
        match &mut self.nodes[id.0 .0].kind {
            NodeKind::Resource(r) => r,
            other => unreachable!("ResourceId addresses a {} node", other),
        }
    }

    pub fn stack(&self, id: StackId) -> &StackNode {
        match &self.nodes[id.0 .0].kind {
            NodeKind::Stack(s) => s,
            other => unreachable!("StackId addresses a {} node", other),
        }
    }

    pub fn stack_mut(&mut self, id: StackId) -> &mut StackNode {
        match &mut self.nodes[id.0 .0].kind {
            NodeKind::Stack(s) => s,
            other => unreachable!("StackId addresses a {} node", other),
        }
    }

    // -- dependencies --------------------------------------------------------

    /// Declare that every resource under `source` depends on every resource
    /// under `target`. Idempotent.
    pub fn add_dependency(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) {
        let (source, target) = (source.into(), target.into());
        if self.nodes[source.0].dependencies.insert(target) {
            tracing::debug!(
                source = %self.path(source),
                target = %self.path(target),
                "added dependency"
            );
        }
    }

    /// Retract a declared dependency. Removing an absent edge is a no-op.
    pub fn remove_dependency(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) {
        let (source, target) = (source.into(), target.into());
        if self.nodes[source.0].dependencies.shift_remove(&target) {
            tracing::debug!(
                source = %self.path(source),
                target = %self.path(target),
                "removed dependency"
            );
        }
    }

    /// Dependencies declared directly on `node`, in insertion order.
    pub fn dependencies(&self, node: impl Into<NodeId>) -> impl Iterator<Item = NodeId> + '_ {
        self.node(node).dependencies.iter().copied()
    }

    pub fn add_depends_on(&mut self, resource: ResourceId, target: impl Into<NodeId>) {
        self.add_dependency(resource, target);
    }

    pub fn remove_depends_on(&mut self, resource: ResourceId, target: impl Into<NodeId>) {
        self.remove_dependency(resource, target);
    }

    /// Flattened resource-level dependencies of `resource`, ordered by path.
    pub fn obtain_depends_on(&self, resource: ResourceId) -> Vec<ResourceId> {
        resolver::obtain_depends_on(self, resource)
    }

    /// Stacks `stack` depends on, derived from live resource edges.
    pub fn stack_dependencies(&self, stack: StackId) -> Vec<StackId> {
        resolver::stack_dependencies(self, stack)
    }
}

/// Iterator over strict ancestors. See [`ConstructTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a ConstructTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.tree.node(cur).scope;
        Some(cur)
    }
}
