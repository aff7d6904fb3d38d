//! SM-002: Resource nodes: property bag, metadata, removal policy, raw overrides.
//!
//! A resource carries opaque JSON payloads. Nothing here knows about
//! resource-type schemas: a property is either present (with any value,
//! including `false`, `0`, `""` and `null`) or absent.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Inclusion predicate
// ============================================================================

/// Decides whether a resource is rendered into its stack's template.
///
/// Evaluated lazily, during flattening and during rendering. Closures of the
/// form `Fn(&ResourceNode) -> bool` implement it directly.
pub trait SynthesisPredicate {
    fn should_synthesize(&self, resource: &ResourceNode) -> bool;
}

impl<F> SynthesisPredicate for F
where
    F: Fn(&ResourceNode) -> bool,
{
    fn should_synthesize(&self, resource: &ResourceNode) -> bool {
        self(resource)
    }
}

/// Default predicate: always synthesize.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl SynthesisPredicate for Always {
    fn should_synthesize(&self, _resource: &ResourceNode) -> bool {
        true
    }
}

/// Fixed predicate, used for `synthesize: false` in app manifests.
#[derive(Debug, Clone, Copy)]
pub struct Fixed(pub bool);

impl SynthesisPredicate for Fixed {
    fn should_synthesize(&self, _resource: &ResourceNode) -> bool {
        self.0
    }
}

// ============================================================================
// Removal policy
// ============================================================================

/// What happens to the physical resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
    Snapshot,
}

impl RemovalPolicy {
    /// Template directive value for this policy.
    pub fn directive(self) -> &'static str {
        match self {
            Self::Destroy => "Delete",
            Self::Retain => "Retain",
            Self::Snapshot => "Snapshot",
        }
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroy => write!(f, "destroy"),
            Self::Retain => write!(f, "retain"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Options for [`ResourceNode::apply_removal_policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPolicyOptions {
    /// Also emit `UpdateReplacePolicy` with the same value
    #[serde(default = "default_true")]
    pub apply_to_update_replace_policy: bool,
}

impl Default for RemovalPolicyOptions {
    fn default() -> Self {
        Self {
            apply_to_update_replace_policy: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A removal policy as stored on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedRemovalPolicy {
    pub policy: RemovalPolicy,
    pub apply_to_update_replace_policy: bool,
}

// ============================================================================
// Raw overrides
// ============================================================================

/// A dotted-path edit applied to the rendered record after rendering.
/// `value: None` deletes the addressed key.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOverride {
    pub path: Vec<String>,
    pub value: Option<Value>,
}

/// Split an override path on `.`; `\.` stands for a literal dot.
pub fn parse_override_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

/// Merge overrides into a rendered record, in the order they were added.
pub fn apply_overrides(record: &mut Map<String, Value>, overrides: &[RawOverride]) {
    for o in overrides {
        match &o.value {
            Some(v) => set_path(record, &o.path, v.clone()),
            None => delete_path(record, &o.path),
        }
    }
}

fn set_path(target: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cur = target;
    for key in parents {
        let slot = cur
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        cur = match slot {
            Value::Object(m) => m,
            _ => return,
        };
    }
    cur.insert(last.clone(), value);
}

/// Remove the addressed key, then prune objects the removal left empty.
fn delete_path(target: &mut Map<String, Value>, path: &[String]) {
    match path {
        [] => {}
        [last] => {
            target.shift_remove(last);
        }
        [head, rest @ ..] => {
            let now_empty = match target.get_mut(head) {
                Some(Value::Object(child)) => {
                    delete_path(child, rest);
                    child.is_empty()
                }
                _ => false,
            };
            if now_empty {
                target.shift_remove(head);
            }
        }
    }
}

// ============================================================================
// Construction props
// ============================================================================

/// Construction-time input for a resource.
pub struct ResourceProps {
    pub type_name: String,
    pub properties: IndexMap<String, Value>,
    predicate: Box<dyn SynthesisPredicate>,
}

impl ResourceProps {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: IndexMap::new(),
            predicate: Box::new(Always),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: IndexMap<String, Value>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Attach a custom inclusion predicate.
    pub fn with_predicate(mut self, predicate: impl SynthesisPredicate + 'static) -> Self {
        self.predicate = Box::new(predicate);
        self
    }
}

impl fmt::Debug for ResourceProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceProps")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Resource node
// ============================================================================

/// The resource-specific payload of a tree node.
///
/// Dependencies are not stored here: they live on the owning tree node so
/// that resources and plain constructs share one edge set (see
/// [`ConstructTree::add_depends_on`](super::tree::ConstructTree::add_depends_on)).
pub struct ResourceNode {
    type_name: String,
    properties: IndexMap<String, Value>,
    metadata: IndexMap<String, Value>,
    removal_policy: Option<AppliedRemovalPolicy>,
    logical_id_override: Option<String>,
    overrides: Vec<RawOverride>,
    predicate: Box<dyn SynthesisPredicate>,
}

impl ResourceNode {
    pub(crate) fn new(props: ResourceProps) -> Self {
        Self {
            type_name: props.type_name,
            properties: props.properties,
            metadata: IndexMap::new(),
            removal_policy: None,
            logical_id_override: None,
            overrides: Vec::new(),
            predicate: props.predicate,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Make a property absent. Returns the previous value, if any.
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn metadata(&self) -> &IndexMap<String, Value> {
        &self.metadata
    }

    pub fn apply_removal_policy(&mut self, policy: RemovalPolicy, options: RemovalPolicyOptions) {
        self.removal_policy = Some(AppliedRemovalPolicy {
            policy,
            apply_to_update_replace_policy: options.apply_to_update_replace_policy,
        });
    }

    pub fn removal_policy(&self) -> Option<AppliedRemovalPolicy> {
        self.removal_policy
    }

    /// Pin the logical id instead of deriving it from the path.
    pub fn override_logical_id(&mut self, logical_id: impl Into<String>) {
        self.logical_id_override = Some(logical_id.into());
    }

    pub fn logical_id_override(&self) -> Option<&str> {
        self.logical_id_override.as_deref()
    }

    /// Set an arbitrary key in the rendered record, e.g. `"Properties.Tags.0.Key"`.
    pub fn add_override(&mut self, path: &str, value: impl Into<Value>) {
        self.overrides.push(RawOverride {
            path: parse_override_path(path),
            value: Some(value.into()),
        });
    }

    pub fn add_deletion_override(&mut self, path: &str) {
        self.overrides.push(RawOverride {
            path: parse_override_path(path),
            value: None,
        });
    }

    pub fn add_property_override(&mut self, path: &str, value: impl Into<Value>) {
        self.add_override(&format!("Properties.{}", path), value);
    }

    pub fn add_property_deletion_override(&mut self, path: &str) {
        self.add_deletion_override(&format!("Properties.{}", path));
    }

    pub fn overrides(&self) -> &[RawOverride] {
        &self.overrides
    }

    pub fn should_synthesize(&self) -> bool {
        self.predicate.should_synthesize(self)
    }
}

impl fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceNode")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties)
            .field("metadata", &self.metadata)
            .field("removal_policy", &self.removal_policy)
            .field("logical_id_override", &self.logical_id_override)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fake() -> ResourceNode {
        ResourceNode::new(ResourceProps::new("Test::Resource::Fake"))
    }

    #[test]
    fn test_sm002_falsy_properties_kept() {
        let r = ResourceNode::new(
            ResourceProps::new("Test::Resource::Fake")
                .with_property("Enabled", false)
                .with_property("Count", 0)
                .with_property("Name", ""),
        );
        assert_eq!(r.properties().len(), 3);
        assert_eq!(r.property("Enabled"), Some(&json!(false)));
        assert_eq!(r.property("Count"), Some(&json!(0)));
        assert_eq!(r.property("Name"), Some(&json!("")));
        assert_eq!(r.property("Missing"), None);
    }

    #[test]
    fn test_sm002_remove_property() {
        let mut r = fake();
        r.set_property("A", 1);
        assert_eq!(r.remove_property("A"), Some(json!(1)));
        assert!(r.properties().is_empty());
        assert_eq!(r.remove_property("A"), None);
    }

    #[test]
    fn test_sm002_metadata_last_write_wins() {
        let mut r = fake();
        assert_eq!(r.get_metadata("Beep"), None);
        r.add_metadata("Beep", "Boop");
        r.add_metadata("Beep", "Bop");
        assert_eq!(r.get_metadata("Beep"), Some(&json!("Bop")));
        assert_eq!(r.metadata().len(), 1);
    }

    #[test]
    fn test_sm002_removal_policy_default_options() {
        let mut r = fake();
        assert!(r.removal_policy().is_none());
        r.apply_removal_policy(RemovalPolicy::Retain, RemovalPolicyOptions::default());
        let applied = r.removal_policy().unwrap();
        assert_eq!(applied.policy, RemovalPolicy::Retain);
        assert!(applied.apply_to_update_replace_policy);
    }

    #[test]
    fn test_sm002_removal_policy_directives() {
        assert_eq!(RemovalPolicy::Destroy.directive(), "Delete");
        assert_eq!(RemovalPolicy::Retain.directive(), "Retain");
        assert_eq!(RemovalPolicy::Snapshot.directive(), "Snapshot");
        assert_eq!(RemovalPolicy::Snapshot.to_string(), "snapshot");
    }

    #[test]
    fn test_sm002_removal_policy_serde() {
        let p: RemovalPolicy = serde_yaml_ng::from_str("retain").unwrap();
        assert_eq!(p, RemovalPolicy::Retain);
        assert!(serde_yaml_ng::from_str::<RemovalPolicy>("obliterate").is_err());
    }

    #[test]
    fn test_sm002_predicate_closure() {
        let mut r = ResourceNode::new(
            ResourceProps::new("Foo::R1").with_predicate(|r: &ResourceNode| r.properties().is_empty()),
        );
        assert!(r.should_synthesize());
        r.set_property("X", 1);
        assert!(!r.should_synthesize());
    }

    #[test]
    fn test_sm002_fixed_predicate() {
        let r = ResourceNode::new(ResourceProps::new("Foo::R1").with_predicate(Fixed(false)));
        assert!(!r.should_synthesize());
        assert!(fake().should_synthesize());
    }

    #[test]
    fn test_sm002_override_path_escapes() {
        assert_eq!(parse_override_path("Properties.Tags"), vec!["Properties", "Tags"]);
        assert_eq!(
            parse_override_path(r"Metadata.aws\.cdk\.path"),
            vec!["Metadata", "aws.cdk.path"]
        );
    }

    #[test]
    fn test_sm002_apply_overrides_set_and_delete() {
        let mut r = fake();
        r.add_property_override("Nested.Deep", json!(false));
        r.add_override("Condition", "IsProd");
        r.add_property_deletion_override("Nested.Deep");

        let mut record = Map::new();
        record.insert("Type".to_string(), json!("Test::Resource::Fake"));
        apply_overrides(&mut record, r.overrides());

        assert_eq!(Value::Object(record), json!({
            "Type": "Test::Resource::Fake",
            "Condition": "IsProd",
        }));
    }

    #[test]
    fn test_sm002_override_replaces_scalar_parent() {
        let mut record = Map::new();
        record.insert("Properties".to_string(), json!({ "A": 1 }));
        let o = RawOverride {
            path: parse_override_path("Properties.A.B"),
            value: Some(json!(0)),
        };
        apply_overrides(&mut record, &[o]);
        assert_eq!(record["Properties"], json!({ "A": { "B": 0 } }));
    }
}
