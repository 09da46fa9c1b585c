//! Canonicalizing configuration leaves into environment-variable bytes.
//!
//! This crate knows nothing about YAML, processes, or compositions.
//! It only answers one question: given a name and a loosely-typed
//! configuration value, what bytes does the process that consumes it see?
//! The rest of the orchestrator builds on top of [`Input`] and [`EnvTable`].

#![warn(missing_docs)]

pub mod env;
pub mod value;

pub use self::{
    env::EnvTable,
    value::{Input, Value, ValueError},
};
