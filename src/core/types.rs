//! SM-006: Serialized types: the YAML app manifest and the cloud assembly.
//!
//! The app manifest describes a construct tree declaratively; the assembly
//! types describe what synthesis writes to disk. All types derive
//! Serialize/Deserialize; maps are order-preserving.

use super::resource::{RemovalPolicy, RemovalPolicyOptions};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// App manifest (app.yaml)
// ============================================================================

/// Root of an app manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppManifest {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable application name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Top-level constructs, keyed by id (order-preserving)
    #[serde(default)]
    pub constructs: IndexMap<String, ConstructSpec>,
}

/// One node of the manifest tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstructSpec {
    #[serde(default)]
    pub kind: ConstructKind,

    /// Resource type name (resources only)
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,

    /// Opaque property bag (resources only)
    #[serde(default)]
    pub properties: IndexMap<String, serde_json::Value>,

    /// Resource metadata (resources only)
    #[serde(default)]
    pub metadata: IndexMap<String, serde_json::Value>,

    #[serde(default)]
    pub removal_policy: Option<RemovalPolicySpec>,

    /// Paths of nodes this node depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// `false` keeps the resource out of the template
    #[serde(default)]
    pub synthesize: Option<bool>,

    /// Pinned logical id (resources only)
    #[serde(default)]
    pub logical_id: Option<String>,

    /// Dotted-path overrides merged into the rendered record (resources only)
    #[serde(default)]
    pub overrides: IndexMap<String, serde_json::Value>,

    /// Dotted paths removed from the rendered record (resources only)
    #[serde(default)]
    pub deletion_overrides: Vec<String>,

    /// Stack name (stacks only; defaults to the id)
    #[serde(default)]
    pub stack_name: Option<String>,

    #[serde(default)]
    pub children: IndexMap<String, ConstructSpec>,
}

impl ConstructSpec {
    /// True when any resource-only field is set.
    pub fn has_resource_fields(&self) -> bool {
        self.type_name.is_some()
            || !self.properties.is_empty()
            || !self.metadata.is_empty()
            || self.removal_policy.is_some()
            || self.synthesize.is_some()
            || self.logical_id.is_some()
            || !self.overrides.is_empty()
            || !self.deletion_overrides.is_empty()
    }
}

/// Node kind in a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
    #[default]
    Construct,
    Stack,
    Stage,
    Resource,
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construct => write!(f, "construct"),
            Self::Stack => write!(f, "stack"),
            Self::Stage => write!(f, "stage"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

/// Removal policy: a bare policy name or a policy with options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemovalPolicySpec {
    Bare(RemovalPolicy),
    Detailed {
        policy: RemovalPolicy,
        #[serde(flatten)]
        options: RemovalPolicyOptions,
    },
}

impl RemovalPolicySpec {
    pub fn into_parts(self) -> (RemovalPolicy, RemovalPolicyOptions) {
        match self {
            Self::Bare(policy) => (policy, RemovalPolicyOptions::default()),
            Self::Detailed { policy, options } => (policy, options),
        }
    }
}

// ============================================================================
// Cloud assembly
// ============================================================================

/// One synthesized stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackArtifact {
    /// Stack path with `/` replaced by `-`; unique within an assembly
    pub artifact_id: String,

    pub stack_name: String,

    /// Construct path of the stack
    pub path: String,

    /// `{"Resources": {...}}`
    pub template: serde_json::Value,

    /// Artifact ids of stacks this one depends on, ordered by path
    pub dependencies: Vec<String>,

    /// BLAKE3 of the compact template JSON
    pub template_hash: String,
}

impl StackArtifact {
    pub fn template_file(&self) -> String {
        format!("{}.template.json", self.artifact_id)
    }
}

/// `manifest.json` written next to the templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyManifest {
    /// Schema version
    pub version: String,

    /// Generator version
    pub generator: String,

    /// Per-stack entries, in tree order
    pub artifacts: IndexMap<String, ArtifactEntry>,

    /// Artifact ids, dependencies first
    pub deployment_order: Vec<String>,
}

/// Per-stack manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub stack_name: String,
    pub path: String,
    pub template_file: String,
    pub template_hash: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}
