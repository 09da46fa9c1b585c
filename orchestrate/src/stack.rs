//! A breadcrumb trail through nested compositions, carried into log lines.
//!
//! Concurrent statements within a script interleave their output, so a
//! bare log message (\"exit status 1\") is useless for figuring out
//! which of a dozen running shells it belongs to. Every call into the
//! runner carries a [`Stack`] that gets one more element pushed onto
//! it per nesting level, and every log line is prefixed with the full
//! path.

use std::fmt;

/// An immutable cons-list of path elements, cheap to extend and share
/// across the threads a script fans out into.
#[derive(Clone, Debug, Default)]
pub struct Stack(Vec<String>);

impl Stack
{
    /// The empty stack, used at the top of a run.
    pub fn new() -> Self
    {
        Self(Vec::new())
    }

    /// Return a new stack with one more path element appended.
    pub fn push(&self, node: impl fmt::Display) -> Self
    {
        let mut path = self.0.clone();
        path.push(node.to_string());
        Self(path)
    }

    fn log(&self, level: log::Level, message: &str)
    {
        log::log!(level, "{self}\n{message}");
    }

    /// Log `message` at debug level, prefixed with this call stack.
    pub fn log_debug(&self, message: &str)
    {
        self.log(log::Level::Debug, message);
    }

    /// Log `message` at info level, prefixed with this call stack.
    pub fn log_info(&self, message: &str)
    {
        self.log(log::Level::Info, message);
    }

    /// Log `message` at warning level, prefixed with this call stack.
    pub fn log_warning(&self, message: &str)
    {
        self.log(log::Level::Warn, message);
    }
}

impl fmt::Display for Stack
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "Call stack: {}", self.0.join(" "))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn push_is_non_mutating_and_appends()
    {
        let root = Stack::new();
        let child = root.push("outer").push(0);
        assert_eq!(root.to_string(), "Call stack: ");
        assert_eq!(child.to_string(), "Call stack: outer 0");
    }
}
