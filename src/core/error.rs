//! SM-007: Typed failures raised while assembling the tree and synthesizing it.
//!
//! Tree assembly fails fast: every error is returned from the call that caused
//! it. Dependency edits never fail and have no variant here.

use thiserror::Error;

/// Failures raised while registering nodes in a [`ConstructTree`](super::tree::ConstructTree).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructError {
    /// Two siblings registered under the same id.
    #[error("there is already a construct with name '{id}' in '{scope}'")]
    DuplicateName { scope: String, id: String },

    /// A resource was created without a Stack between it and the nearest Stage.
    #[error("'{id}' should be created in the scope of a Stack, but no Stack found (scope: '{scope}')")]
    ScopePlacement { id: String, scope: String },

    /// Ids must be non-empty and must not contain the path separator.
    #[error("invalid construct id '{id}': ids must be non-empty and must not contain '/'")]
    InvalidId { id: String },
}

/// Failures raised by [`synth`](super::synth::synth).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    /// Two synthesized resources of one stack ended up with the same logical id.
    #[error("duplicate logical id '{logical_id}' in stack '{stack}': '{first}' and '{second}'")]
    DuplicateLogicalId {
        stack: String,
        logical_id: String,
        first: String,
        second: String,
    },

    /// Two stacks whose paths map to the same artifact id, e.g. `A-B` and `A/B`.
    #[error("duplicate artifact id '{artifact_id}': stacks '{first}' and '{second}'")]
    DuplicateArtifactId {
        artifact_id: String,
        first: String,
        second: String,
    },

    /// The derived stack dependency graph is not a DAG.
    #[error("stack dependency cycle detected involving: {}", members.join(", "))]
    StackCycle { members: Vec<String> },
}
