//! Resolving an orc-file reference to a path on disk.

use std::path::{Path, PathBuf};

/// Search parameters shared by every file lookup in an invocation.
#[derive(Clone, Debug)]
pub struct Context
{
    /// Directories searched, in order, for a relative file reference.
    pub lookup_paths: Vec<PathBuf>,

    /// How long [`crate::exec`][exec]'s poll loop may block at a time.
    ///
    /// This lives here rather than in the runner crate because it is
    /// part of the same invocation-wide context the original
    /// executor threads through every call.
    ///
    /// [exec]: https://docs.rs/orchestrate-exec
    pub poll_interval: std::time::Duration,
}

impl Default for Context
{
    fn default() -> Self
    {
        Self {
            lookup_paths: Vec::new(),
            poll_interval: std::time::Duration::from_millis(50),
        }
    }
}

/// Resolve `file` to an existing path.
///
/// An absolute path is used as-is, and only accepted if it exists.
/// A relative path is tried against each of [`Context::lookup_paths`]
/// in order; the first one that exists wins. Returns `None` if no
/// candidate exists.
pub fn locate(ctx: &Context, file: &str) -> Option<PathBuf>
{
    let path = Path::new(file);
    if path.is_absolute() {
        return path.exists().then(|| path.to_owned());
    }
    for base in &ctx.lookup_paths {
        let candidate = base.join(file);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}
