//! Executing orc-files: composition trees of shell commands.
//!
//! [`orchestrate_core`] owns the schema; this crate owns what happens
//! once a [`orchestrate_core::Composition`] exists: running its
//! scripts with the right concurrency and join semantics
//! ([`script`]), threading `external=` imports and the
//! predicate/main/finalizer phases through nested compositions
//! ([`composition`]), and the top-level signal-aware driver
//! ([`driver`]) the binary entry point calls into.

#![warn(missing_docs)]

pub mod composition;
pub mod driver;
pub mod error;
pub mod script;
pub mod stack;
pub mod visited;
