//! Parsing orc-files into the composition/statement tree the runner executes.
//!
//! This crate owns the schema: what a composition, a statement, and an
//! external reference are, and how an orc-file's YAML is turned into
//! them. It does not run anything -- launching shells and threading
//! through nested compositions is the runner's job.

#![warn(missing_docs)]

pub mod locate;
pub mod schema;

pub use self::{
    locate::{locate, Context},
    schema::{Composition, External, SchemaError, Statement},
};
