//! The top-level driver: signal handling and the final exit code.

use {
    crate::{composition::exec_top_level_file, stack::Stack, visited::Visited},
    orchestrate_core::Context,
    orchestrate_util::EnvTable,
    std::sync::atomic::{AtomicI32, Ordering},
};

/// The most recent SIGINT/SIGTERM/SIGHUP received, or 0 if none.
///
/// Written only from the signal handler below, which may only perform
/// async-signal-safe operations -- an atomic store qualifies, logging
/// or allocating does not.
static RECEIVED_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_signal(signal: libc::c_int)
{
    RECEIVED_SIGNAL.store(signal, Ordering::SeqCst);
}

/// Install handlers for SIGINT, SIGTERM, and SIGHUP that request an
/// orderly stop rather than terminating the process immediately.
fn install_signal_handlers()
{
    // SAFETY: on_signal only performs an atomic store, which is
    // async-signal-safe; installing the same handler for all three
    // signals is itself safe at any point during the process's life.
    unsafe {
        libc::signal(libc::SIGINT, on_signal as usize);
        libc::signal(libc::SIGTERM, on_signal as usize);
        libc::signal(libc::SIGHUP, on_signal as usize);
    }
}

/// Run `file` as the top-level orc-file and return the process exit
/// code to report.
///
/// A zero or positive result is the exit code of the composition (or
/// [`crate::error::ErrorCode`] if the file itself could not be run).
/// If the orchestrator was asked to stop via SIGINT/SIGTERM/SIGHUP
/// before the composition finished on its own, the result is the
/// negation of that signal number, mirroring the convention used
/// throughout this crate for processes killed by a signal (§7).
pub fn run(ctx: &Context, file: &str) -> i32
{
    install_signal_handlers();

    let gate = || RECEIVED_SIGNAL.load(Ordering::SeqCst) == 0;
    let mut env = EnvTable::new();
    let result = match exec_top_level_file(ctx, file, &mut env, &gate, &Stack::new(), &Visited::new()) {
        Ok(result) => result,
        Err(error) => {
            log::error!("unexpected failure: {error:#}");
            1
        },
    };

    let received = RECEIVED_SIGNAL.load(Ordering::SeqCst);
    if received != 0 {
        log::info!("received signal {received}, stopping");
    }

    if result != 0 { result } else { -received }
}
