//! SM-005: Synthesis: render each stack's resources into a template.
//!
//! Synthesis reads the tree and never mutates it, so running it twice on an
//! unchanged tree yields byte-identical templates. Record keys are emitted
//! only when they carry something: `Properties`, `DependsOn` and `Metadata`
//! are omitted when empty, removal directives when no policy was applied.

use super::error::SynthError;
use super::logical_id::logical_id;
use super::resolver;
use super::resource::apply_overrides;
use super::tree::{ConstructTree, ResourceId, StackId};
use super::types::{ArtifactEntry, AssemblyManifest, StackArtifact};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Every synthesized stack plus the order to deploy them in.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    /// Stacks in tree pre-order
    pub stacks: Vec<StackArtifact>,
    /// Artifact ids, dependencies first
    pub deployment_order: Vec<String>,
}

impl CloudAssembly {
    /// First stack with the given stack name, in tree order. Stack names
    /// may repeat; see [`CloudAssembly::stacks_named`].
    pub fn stack_by_name(&self, name: &str) -> Option<&StackArtifact> {
        self.stacks.iter().find(|s| s.stack_name == name)
    }

    /// Every stack with the given stack name, in tree order.
    pub fn stacks_named(&self, name: &str) -> Vec<&StackArtifact> {
        self.stacks.iter().filter(|s| s.stack_name == name).collect()
    }

    pub fn stack_by_path(&self, path: &str) -> Option<&StackArtifact> {
        self.stacks.iter().find(|s| s.path == path)
    }

    /// The `manifest.json` describing this assembly.
    pub fn manifest(&self) -> AssemblyManifest {
        let artifacts: IndexMap<String, ArtifactEntry> = self
            .stacks
            .iter()
            .map(|s| {
                (
                    s.artifact_id.clone(),
                    ArtifactEntry {
                        stack_name: s.stack_name.clone(),
                        path: s.path.clone(),
                        template_file: s.template_file(),
                        template_hash: s.template_hash.clone(),
                        dependencies: s.dependencies.clone(),
                    },
                )
            })
            .collect();
        AssemblyManifest {
            version: "1.0".to_string(),
            generator: format!("stacksmith {}", env!("CARGO_PKG_VERSION")),
            artifacts,
            deployment_order: self.deployment_order.clone(),
        }
    }
}

/// Artifact id of a stack: its path with `/` replaced by `-`.
pub fn artifact_id(tree: &ConstructTree, stack: StackId) -> String {
    tree.path(stack).replace('/', "-")
}

/// Synthesize every stack in the tree.
pub fn synth(tree: &ConstructTree) -> Result<CloudAssembly, SynthError> {
    let mut issued: IndexMap<String, StackId> = IndexMap::new();
    for s in tree.stacks() {
        let id = artifact_id(tree, s);
        if let Some(&first) = issued.get(&id) {
            return Err(SynthError::DuplicateArtifactId {
                artifact_id: id,
                first: tree.path(first).to_string(),
                second: tree.path(s).to_string(),
            });
        }
        issued.insert(id, s);
    }

    let order = resolver::deployment_order(tree)?;
    let stacks = issued
        .values()
        .map(|&s| synth_stack(tree, s))
        .collect::<Result<Vec<_>, _>>()?;
    let deployment_order = order.into_iter().map(|s| artifact_id(tree, s)).collect();
    Ok(CloudAssembly {
        stacks,
        deployment_order,
    })
}

/// Synthesize a single stack.
pub fn synth_stack(tree: &ConstructTree, stack: StackId) -> Result<StackArtifact, SynthError> {
    let template = render_template(tree, stack)?;
    let template_hash = format!("blake3:{}", blake3::hash(template.to_string().as_bytes()).to_hex());
    let dependencies = resolver::stack_dependencies(tree, stack)
        .into_iter()
        .map(|s| artifact_id(tree, s))
        .collect();

    tracing::debug!(
        stack = %tree.path(stack),
        hash = %template_hash,
        "synthesized stack"
    );

    Ok(StackArtifact {
        artifact_id: artifact_id(tree, stack),
        stack_name: tree.stack(stack).stack_name().to_string(),
        path: tree.path(stack).to_string(),
        template,
        dependencies,
        template_hash,
    })
}

/// Render `{"Resources": {...}}` for one stack.
pub fn render_template(tree: &ConstructTree, stack: StackId) -> Result<Value, SynthError> {
    let mut resources = Map::new();
    let mut owners: IndexMap<String, ResourceId> = IndexMap::new();

    for r in tree.resources_of(stack) {
        if !tree.resource(r).should_synthesize() {
            tracing::debug!(resource = %tree.path(r), "skipping excluded resource");
            continue;
        }
        for (source, target) in resolver::unresolved_dependencies(tree, r) {
            tracing::warn!(
                resource = %tree.path(r),
                source = %tree.path(source),
                target = %tree.path(target),
                "dependency resolves to no synthesized resource"
            );
        }
        let id = logical_id(tree, r);
        if let Some(&first) = owners.get(&id) {
            return Err(SynthError::DuplicateLogicalId {
                stack: tree.path(stack).to_string(),
                logical_id: id,
                first: tree.path(first).to_string(),
                second: tree.path(r).to_string(),
            });
        }
        resources.insert(id.clone(), Value::Object(render_resource(tree, r)));
        owners.insert(id, r);
    }

    let mut template = Map::new();
    template.insert("Resources".to_string(), Value::Object(resources));
    Ok(Value::Object(template))
}

/// Render one resource record.
///
/// `DependsOn` lists only targets owned by the same stack; targets in other
/// stacks are expressed as stack dependencies instead.
pub fn render_resource(tree: &ConstructTree, resource: ResourceId) -> Map<String, Value> {
    let node = tree.resource(resource);
    let stack = tree.owning_stack(resource);
    let mut record = Map::new();

    record.insert("Type".to_string(), Value::String(node.type_name().to_string()));

    if !node.properties().is_empty() {
        let properties: Map<String, Value> = node
            .properties()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        record.insert("Properties".to_string(), Value::Object(properties));
    }

    let depends_on: Vec<Value> = tree
        .obtain_depends_on(resource)
        .into_iter()
        .filter(|&t| tree.owning_stack(t) == stack)
        .map(|t| Value::String(logical_id(tree, t)))
        .collect();
    if !depends_on.is_empty() {
        record.insert("DependsOn".to_string(), Value::Array(depends_on));
    }

    if let Some(applied) = node.removal_policy() {
        let directive = Value::String(applied.policy.directive().to_string());
        record.insert("DeletionPolicy".to_string(), directive.clone());
        if applied.apply_to_update_replace_policy {
            record.insert("UpdateReplacePolicy".to_string(), directive);
        }
    }

    if !node.metadata().is_empty() {
        let metadata: Map<String, Value> = node
            .metadata()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        record.insert("Metadata".to_string(), Value::Object(metadata));
    }

    apply_overrides(&mut record, node.overrides());
    record
}
