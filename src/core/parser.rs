//! SM-008: App manifest parsing, validation, and tree construction.
//!
//! Parses app.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Ids are non-empty and contain no '/'
//! - Resources declare a type and sit inside a Stack (not behind a Stage)
//! - Resource-only and stack-only fields appear on the right kinds
//! - depends_on paths exist and are not self-references

use super::error::ConstructError;
use super::resource::{Fixed, ResourceProps};
use super::tree::{ConstructTree, NodeId};
use super::types::*;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse an app manifest from disk.
pub fn parse_manifest_file(path: &Path) -> Result<AppManifest, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_manifest(&content)
}

/// Parse an app manifest from a string.
pub fn parse_manifest(yaml: &str) -> Result<AppManifest, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

fn join_path(parent: &str, id: &str) -> String {
    if parent.is_empty() {
        id.to_string()
    } else {
        format!("{}/{}", parent, id)
    }
}

/// Every construct path declared in the manifest.
fn collect_paths(children: &IndexMap<String, ConstructSpec>, parent: &str, out: &mut HashSet<String>) {
    for (id, spec) in children {
        let path = join_path(parent, id);
        collect_paths(&spec.children, &path, out);
        out.insert(path);
    }
}

/// Validate a parsed manifest. Returns a list of errors (empty = valid).
pub fn validate_manifest(manifest: &AppManifest) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Version check
    if manifest.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", manifest.version),
        });
    }

    // Name check
    if manifest.name.is_empty() {
        errors.push(ValidationError {
            message: "name must not be empty".to_string(),
        });
    }

    let mut known = HashSet::new();
    collect_paths(&manifest.constructs, "", &mut known);
    validate_children(&manifest.constructs, "", false, &known, &mut errors);

    errors
}

fn validate_children(
    children: &IndexMap<String, ConstructSpec>,
    parent: &str,
    in_stack: bool,
    known: &HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    for (id, spec) in children {
        let path = join_path(parent, id);

        if id.is_empty() || id.contains('/') {
            errors.push(ValidationError {
                message: format!("construct '{}' under '{}' has an invalid id", id, parent),
            });
        }

        match spec.kind {
            ConstructKind::Resource => {
                if spec.type_name.is_none() {
                    errors.push(ValidationError {
                        message: format!("resource '{}' has no type", path),
                    });
                }
                if !in_stack {
                    errors.push(ValidationError {
                        message: format!(
                            "resource '{}' should be created in the scope of a Stack, but no Stack found",
                            path
                        ),
                    });
                }
            }
            other if spec.has_resource_fields() => {
                errors.push(ValidationError {
                    message: format!(
                        "'{}' ({}) sets resource-only fields (type, properties, metadata, removal_policy, synthesize, logical_id, overrides)",
                        path, other
                    ),
                });
            }
            _ => {}
        }

        if spec.stack_name.is_some() && spec.kind != ConstructKind::Stack {
            errors.push(ValidationError {
                message: format!("'{}' ({}) sets stack_name but is not a stack", path, spec.kind),
            });
        }

        // depends_on references
        for dep in &spec.depends_on {
            if dep == &path {
                errors.push(ValidationError {
                    message: format!("'{}' depends on itself", path),
                });
            } else if !known.contains(dep) {
                errors.push(ValidationError {
                    message: format!("'{}' depends on unknown construct '{}'", path, dep),
                });
            }
        }

        let child_in_stack = match spec.kind {
            ConstructKind::Stack => true,
            ConstructKind::Stage => false,
            _ => in_stack,
        };
        validate_children(&spec.children, &path, child_in_stack, known, errors);
    }
}

/// Build a construct tree from a manifest.
///
/// Dependencies are attached in a second pass, after every node exists, so
/// `depends_on` may reference constructs declared later in the file.
pub fn build_tree(manifest: &AppManifest) -> Result<ConstructTree, String> {
    let mut tree = ConstructTree::new();
    let mut pending: Vec<(NodeId, String)> = Vec::new();
    let root = tree.root();
    add_children(&mut tree, root, &manifest.constructs, &mut pending)
        .map_err(|e| e.to_string())?;

    for (source, target_path) in pending {
        let target = tree.find_by_path(&target_path).ok_or_else(|| {
            format!(
                "'{}' depends on unknown construct '{}'",
                tree.path(source),
                target_path
            )
        })?;
        tree.add_dependency(source, target);
    }

    Ok(tree)
}

fn add_children(
    tree: &mut ConstructTree,
    scope: NodeId,
    children: &IndexMap<String, ConstructSpec>,
    pending: &mut Vec<(NodeId, String)>,
) -> Result<(), ConstructError> {
    for (id, spec) in children {
        let node = add_node(tree, scope, id, spec)?;
        pending.extend(spec.depends_on.iter().map(|d| (node, d.clone())));
        add_children(tree, node, &spec.children, pending)?;
    }
    Ok(())
}

fn add_node(
    tree: &mut ConstructTree,
    scope: NodeId,
    id: &str,
    spec: &ConstructSpec,
) -> Result<NodeId, ConstructError> {
    match spec.kind {
        ConstructKind::Construct => tree.add_construct(scope, id),
        ConstructKind::Stage => tree.add_stage(scope, id).map(NodeId::from),
        ConstructKind::Stack => {
            let stack = tree.add_stack(scope, id)?;
            if let Some(ref name) = spec.stack_name {
                tree.stack_mut(stack).set_stack_name(name.clone());
            }
            Ok(stack.node())
        }
        ConstructKind::Resource => {
            let mut props = ResourceProps::new(spec.type_name.clone().unwrap_or_default())
                .with_properties(spec.properties.clone());
            if let Some(include) = spec.synthesize {
                props = props.with_predicate(Fixed(include));
            }
            let r = tree.add_resource(scope, id, props)?;

            let node = tree.resource_mut(r);
            for (k, v) in &spec.metadata {
                node.add_metadata(k.clone(), v.clone());
            }
            if let Some(ref policy) = spec.removal_policy {
                let (policy, options) = policy.clone().into_parts();
                node.apply_removal_policy(policy, options);
            }
            if let Some(ref logical_id) = spec.logical_id {
                node.override_logical_id(logical_id.clone());
            }
            for (path, value) in &spec.overrides {
                node.add_override(path, value.clone());
            }
            for path in &spec.deletion_overrides {
                node.add_deletion_override(path);
            }
            Ok(r.node())
        }
    }
}
