//! Stacksmith: construct trees synthesized into deployment templates.
//!
//! Build a tree of stacks, stages and resources, declare dependencies between
//! any of its nodes, and synthesize one deterministic template per stack.

pub mod cli;
pub mod core;

pub use crate::core::error::{ConstructError, SynthError};
pub use crate::core::resource::{
    RemovalPolicy, RemovalPolicyOptions, ResourceNode, ResourceProps, SynthesisPredicate,
};
pub use crate::core::synth::{synth, CloudAssembly};
pub use crate::core::tree::{ConstructTree, NodeId, ResourceId, StackId, StageId};
