//! Core construct logic: tree, resources, flattening, synthesis, manifests.

pub mod assembly;
pub mod error;
pub mod logical_id;
pub mod parser;
pub mod resolver;
pub mod resource;
pub mod synth;
pub mod tree;
pub mod types;
