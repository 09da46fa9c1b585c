//! Process-wide error taxonomy.

use thiserror::Error;

/// Exit codes the orchestrator reports for failures in the orc-file
/// itself, as opposed to the exit codes of the shell commands it runs.
///
/// POSIX reserves exit codes 126 and above for the shell's own use
/// (command not executable, command not found, killed by signal);
/// 124 and 125 stay clear of that range.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode
{
    /// The referenced orc-file could not be found or read.
    FileError = 124,

    /// The orc-file's contents did not conform to the schema.
    SchemaError = 125,
}

impl From<ErrorCode> for i32
{
    fn from(code: ErrorCode) -> i32
    {
        code as i32
    }
}

/// An unexpected failure: either a bug in this implementation or an
/// OS-level failure that invalidates the exit-code-only error
/// reporting the rest of the runner relies on (for example, `/bin/sh`
/// itself is missing).
///
/// Everything else -- a malformed orc-file, a missing file, a failed
/// shell command -- is reported as an exit code, never as this type;
/// see the module docs on [`crate::composition`].
#[derive(Debug, Error)]
pub enum OrchestrateError
{
    /// A shell command could not be launched at all.
    #[error(transparent)]
    Spawn(#[from] orchestrate_exec::SpawnError),

    /// Any other unexpected failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
