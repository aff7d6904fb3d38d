//! SM-004: Logical id allocation for rendered resources.
//!
//! A resource placed directly under its stack keeps its id (minus
//! non-alphanumerics). Deeper resources get a readable prefix built from the
//! stack-relative path plus an 8-character BLAKE3 suffix of that path, so two
//! different paths never collapse onto the same id by accident.

use super::tree::{ConstructTree, NodeId, ResourceId};

const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;
const MAX_ID_LEN: usize = 255;

/// Dropped from the path entirely.
const HIDDEN_ID: &str = "Default";
/// Dropped from the readable prefix only.
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";

/// Logical id of `resource`: its override if one was set, otherwise derived
/// from the path relative to its owning stack.
pub fn logical_id(tree: &ConstructTree, resource: ResourceId) -> String {
    if let Some(id) = tree.resource(resource).logical_id_override() {
        return id.to_string();
    }
    allocate_logical_id(&stack_relative_components(tree, resource))
}

/// Ids from just below the owning stack down to `resource`.
fn stack_relative_components(tree: &ConstructTree, resource: ResourceId) -> Vec<&str> {
    let stack: Option<NodeId> = tree.owning_stack(resource).map(NodeId::from);
    let mut components: Vec<&str> = std::iter::once(resource.node())
        .chain(tree.ancestors(resource))
        .take_while(|&n| Some(n) != stack && n != tree.root())
        .map(|n| tree.node(n).id())
        .collect();
    components.reverse();
    components
}

/// Build a logical id from path components.
pub fn allocate_logical_id(components: &[&str]) -> String {
    let visible: Vec<&str> = components
        .iter()
        .copied()
        .filter(|c| *c != HIDDEN_ID)
        .collect();
    let components = if visible.is_empty() {
        components.to_vec()
    } else {
        visible
    };

    if let [only] = components.as_slice() {
        let top = remove_non_alphanumeric(only);
        if !top.is_empty() && top.len() <= MAX_ID_LEN {
            return top;
        }
    }

    let mut human: String = remove_dupes(&components)
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect();
    human.truncate(MAX_HUMAN_LEN);

    format!("{}{}", human, path_hash(&components))
}

fn path_hash(components: &[&str]) -> String {
    let hex = blake3::hash(components.join("/").as_bytes()).to_hex();
    hex.as_str()[..HASH_LEN].to_uppercase()
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Collapse adjacent repeats: `[Bucket, Bucket, Policy]` → `[Bucket, Policy]`.
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&'a str> = Vec::with_capacity(components.len());
    for c in components {
        if out.last() != Some(c) {
            out.push(*c);
        }
    }
    out
}
