//! A supervised shell child: non-blocking status, escalating stop.

use {
    orchestrate_util::EnvTable,
    std::{
        ffi::OsStr,
        os::unix::{ffi::OsStrExt, process::CommandExt},
        process::{Command, Stdio},
        time::{Duration, Instant},
    },
    thiserror::Error,
};

/// The signal sent for each escalation step of [`Child::stop`].
///
/// Windows is out of scope (see the crate-level docs), so unlike the
/// original implementation there is no `CTRL_BREAK_EVENT`/`SIGTERM`
/// substitution table to maintain here.
const SIGNAL_INTERRUPT: libc::c_int = libc::SIGINT;
const SIGNAL_TERMINATE: libc::c_int = libc::SIGTERM;
const SIGNAL_KILL: libc::c_int = libc::SIGKILL;

/// Failure to launch a shell command.
#[derive(Debug, Error)]
#[error("failed to spawn shell command: {0}")]
pub struct SpawnError(#[from] std::io::Error);

/// A pending escalation step of a [`Child::stop`] request.
#[derive(Clone, Copy, Debug)]
enum Escalation { Terminate, Kill }

/// A running (or just-exited) shell command, started in its own
/// process group so that it and any descendants it spawns can be
/// signaled together.
///
/// This replaces the original implementation's `psutil`-based
/// `signal_tree`, which walks `/proc` to rediscover a child's
/// descendants every time a signal is sent. Putting the child in its
/// own process group at spawn time and signaling the group (negative
/// pid) gets the same atomicity without repeated tree walks or a
/// dependency on `psutil`.
pub struct Child
{
    process: std::process::Child,
    pid: i32,
    exit_code: Option<i32>,
    schedule: Vec<(Instant, Escalation)>,
}

impl Child
{
    /// Start `cmd` via `/bin/sh -c`, with `env` overlaid on top of the
    /// orchestrator's own environment, writing to `stdout`/`stderr`.
    ///
    /// Standard input is `/dev/null`; orc-files are not interactive.
    pub fn spawn(cmd: &str, env: &EnvTable, stdout: Stdio, stderr: Stdio) -> Result<Self, SpawnError>
    {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(cmd);
        command.stdin(Stdio::null());
        command.stdout(stdout);
        command.stderr(stderr);
        for (name, value) in env.iter() {
            command.env(name, OsStr::from_bytes(value));
        }

        // SAFETY: the closure only calls setpgid, which is
        // async-signal-safe, and touches no data shared with the
        // parent.
        unsafe {
            command.pre_exec(|| {
                if libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let process = command.spawn()?;
        let pid = process.id() as i32;
        Ok(Self { process, pid, exit_code: None, schedule: Vec::new() })
    }

    /// The process ID of the child. Remains valid after it exits.
    pub fn pid(&self) -> i32
    {
        self.pid
    }

    /// Poll for termination, blocking for at most `timeout`.
    ///
    /// Returns `None` if still running. Returns `Some` with the exit
    /// code if it has exited normally, or the negation of the signal
    /// that killed it (matching the convention used for the
    /// orchestrator's own exit code, §7).
    ///
    /// Idempotent: once a result is known, it is returned immediately
    /// without blocking or re-querying the OS.
    pub fn poll(&mut self, timeout: Duration) -> Option<i32>
    {
        if self.exit_code.is_none() {
            self.run_due_escalations();

            match self.try_wait() {
                Some(code) => self.exit_code = Some(code),
                None => {
                    std::thread::sleep(timeout);
                    if let Some(code) = self.try_wait() {
                        self.exit_code = Some(code);
                    }
                },
            }
        }
        self.exit_code
    }

    fn try_wait(&mut self) -> Option<i32>
    {
        match self.process.try_wait() {
            Ok(Some(status)) => Some(exit_code_of(status)),
            Ok(None) => None,
            Err(_) => None,
        }
    }

    fn run_due_escalations(&mut self)
    {
        let now = Instant::now();
        while let Some(&(deadline, step)) = self.schedule.first() {
            if now < deadline {
                break;
            }
            self.schedule.remove(0);
            match step {
                Escalation::Terminate => {
                    log::warn!("PID={:08} still alive, escalating to SIGTERM", self.pid);
                    self.signal_group(SIGNAL_TERMINATE);
                },
                Escalation::Kill => {
                    log::error!(
                        "PID={:08} still alive, escalating to SIGKILL and detaching; no further attempts will be made",
                        self.pid,
                    );
                    self.kill();
                },
            }
        }
    }

    /// Ask the child to stop: send `SIGINT` to its process group now,
    /// escalate to `SIGTERM` if it is still alive after
    /// `escalate_after`, and to `SIGKILL` (giving up on it) after
    /// `give_up_after`.
    ///
    /// Has no effect if the child has already exited. `give_up_after`
    /// is clamped to be no earlier than `escalate_after`.
    pub fn stop(&mut self, escalate_after: Duration, give_up_after: Duration)
    {
        if self.exit_code.is_none() {
            if let Some(code) = self.try_wait() {
                self.exit_code = Some(code);
            }
        }
        if self.exit_code.is_some() {
            return;
        }
        let give_up_after = give_up_after.max(escalate_after);

        log::debug!(
            "PID={:08} stopping with SIGINT; escalation in {:.1}s, give-up in {:.1}s",
            self.pid, escalate_after.as_secs_f64(), give_up_after.as_secs_f64(),
        );
        self.signal_group(SIGNAL_INTERRUPT);

        let now = Instant::now();
        self.schedule = vec![
            (now + escalate_after, Escalation::Terminate),
            (now + give_up_after, Escalation::Kill),
        ];
    }

    /// Immediately kill the child and its process group with
    /// `SIGKILL`, and stop tracking it as alive.
    ///
    /// Intended for abnormal termination of whatever owns this
    /// [`Child`] (e.g. the orchestrator itself is being torn down):
    /// no further cleanup is attempted.
    pub fn kill(&mut self)
    {
        if self.exit_code.is_none() {
            self.exit_code = Some(-SIGNAL_KILL);
        }
        self.signal_group(SIGNAL_KILL);
    }

    fn signal_group(&self, sig: libc::c_int)
    {
        // SAFETY: kill(2) with a negative pid signals the whole
        // process group; this is always safe to call, including
        // after the group leader has already exited (ESRCH is
        // harmless and ignored).
        unsafe {
            libc::kill(-self.pid, sig);
        }
    }
}

impl Drop for Child
{
    /// Guarantee the process group is not left running if the
    /// supervisor is dropped without an explicit [`Child::kill`] (for
    /// example, on an early return via `?`).
    fn drop(&mut self)
    {
        if self.exit_code.is_none() {
            self.signal_group(SIGNAL_KILL);
        }
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32
{
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => -status.signal().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn env() -> EnvTable
    {
        EnvTable::new()
    }

    #[test]
    fn successful_command_exits_zero()
    {
        let mut child = Child::spawn("exit 0", &env(), Stdio::null(), Stdio::null()).unwrap();
        let code = loop {
            if let Some(code) = child.poll(Duration::from_millis(20)) {
                break code;
            }
        };
        assert_eq!(code, 0);
    }

    #[test]
    fn failing_command_exits_nonzero()
    {
        let mut child = Child::spawn("exit 7", &env(), Stdio::null(), Stdio::null()).unwrap();
        let code = loop {
            if let Some(code) = child.poll(Duration::from_millis(20)) {
                break code;
            }
        };
        assert_eq!(code, 7);
    }

    #[test]
    fn stop_eventually_kills_an_unresponsive_child()
    {
        let cmd = "trap '' INT TERM; sleep 30";
        let mut child = Child::spawn(cmd, &env(), Stdio::null(), Stdio::null()).unwrap();
        assert_eq!(child.poll(Duration::from_millis(50)), None);

        child.stop(Duration::from_millis(100), Duration::from_millis(200));

        let code = loop {
            if let Some(code) = child.poll(Duration::from_millis(50)) {
                break code;
            }
        };
        assert!(code < 0, "expected a negative, signal-killed exit code, got {code}");
    }

    #[test]
    fn kill_is_immediate_and_idempotent()
    {
        let mut child = Child::spawn("sleep 30", &env(), Stdio::null(), Stdio::null()).unwrap();
        child.kill();
        assert_eq!(child.poll(Duration::from_millis(50)), Some(-SIGNAL_KILL));
        child.kill(); // Must not panic or change the recorded result.
        assert_eq!(child.poll(Duration::from_millis(0)), Some(-SIGNAL_KILL));
    }

    #[test]
    fn inherited_and_overlaid_environment_reaches_the_child()
    {
        std::env::set_var("ORCHESTRATE_TEST_INHERITED", "from-parent");
        let mut overlay = env();
        overlay.set("ORCHESTRATE_TEST_OVERLAY", b"from-overlay".to_vec());

        let cmd = "test \"$ORCHESTRATE_TEST_INHERITED\" = from-parent \
                    && test \"$ORCHESTRATE_TEST_OVERLAY\" = from-overlay";
        let mut child = Child::spawn(cmd, &overlay, Stdio::null(), Stdio::null()).unwrap();
        let code = loop {
            if let Some(code) = child.poll(Duration::from_millis(20)) {
                break code;
            }
        };
        assert_eq!(code, 0);
    }
}
