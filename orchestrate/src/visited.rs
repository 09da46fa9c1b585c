//! Cycle detection for `external=` resolution.
//!
//! The original implementation this crate is modeled on does not
//! detect cycles between orc-files: an `external=` chain that loops
//! back on itself simply recurses until the process stack overflows.
//! This reimplementation closes that gap by threading the set of
//! canonicalized absolute paths already being loaded through the call
//! chain, the same way [`crate::stack::Stack`] threads a
//! human-readable breadcrumb trail for diagnostics.

use std::path::{Path, PathBuf};

/// An immutable cons-list of canonicalized orc-file paths currently
/// being loaded, innermost last.
#[derive(Clone, Debug, Default)]
pub struct Visited(Vec<PathBuf>);

impl Visited
{
    /// No files being loaded yet.
    pub fn new() -> Self
    {
        Self(Vec::new())
    }

    /// Whether `path` is already present, i.e. loading it again would
    /// be a cycle.
    pub fn contains(&self, path: &Path) -> bool
    {
        self.0.iter().any(|p| p == path)
    }

    /// Return a new set with `path` added.
    pub fn push(&self, path: PathBuf) -> Self
    {
        let mut paths = self.0.clone();
        paths.push(path);
        Self(paths)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn fresh_set_contains_nothing()
    {
        assert!(!Visited::new().contains(Path::new("/a")));
    }

    #[test]
    fn pushed_path_is_contained_only_in_the_new_set()
    {
        let outer = Visited::new();
        let inner = outer.push(PathBuf::from("/a"));
        assert!(!outer.contains(Path::new("/a")));
        assert!(inner.contains(Path::new("/a")));
    }
}
