//! Launching and supervising the shell processes a composition runs.
//!
//! Everything here is POSIX-only: the orchestrator's Non-goals exclude
//! Windows support, so unlike the original implementation this crate
//! does not carry a `CTRL_BREAK_EVENT` fallback path.

#![warn(missing_docs)]

pub mod child;

pub use self::child::{Child, SpawnError};
