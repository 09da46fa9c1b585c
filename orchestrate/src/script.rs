//! Running a script: the concurrent body of a `?=`/`$=`/`.=` directive.

use {
    crate::{composition::exec_composition, stack::Stack, visited::Visited},
    orchestrate_core::{schema::Statement, Context},
    orchestrate_exec::Child,
    orchestrate_util::EnvTable,
    std::{
        process::Stdio,
        sync::Mutex,
        time::{Duration, Instant},
    },
};

/// Run every statement in `script`, returning the exit code of the
/// first one to fail, or zero if all of them (and nothing) succeeded.
///
/// Statements run concurrently, one OS thread per statement, until a
/// join statement (a `null` entry) is reached; the join blocks until
/// every statement launched so far has completed before the script
/// continues with whatever follows. Once any statement fails, `gate`
/// starts reporting `false` for every statement still running or yet
/// to launch (see [`crate::driver`] for the outermost gate, tied to
/// signal delivery), so a failure anywhere causes a prompt, orderly
/// stop of its siblings rather than waiting them out.
pub fn exec_script(
    ctx: &Context,
    script: &[Statement],
    env: &EnvTable,
    kill_timeout: Duration,
    gate: &(dyn Fn() -> bool + Sync),
    stack: &Stack,
    visited: &Visited,
) -> anyhow::Result<i32>
{
    if script.is_empty() {
        return Ok(0); // We have successfully done nothing. Hard to fail that.
    }

    let first_failure: Mutex<Option<i32>> = Mutex::new(None);
    let accept_result = |result: i32| {
        if result != 0 {
            let mut guard = first_failure.lock().unwrap();
            if guard.is_none() {
                *guard = Some(result);
            }
        }
    };
    let inner_gate = || first_failure.lock().unwrap().is_none() && gate();

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let mut pending: Vec<std::thread::ScopedJoinHandle<anyhow::Result<()>>> = Vec::new();

        for (index, stmt) in script.iter().enumerate() {
            let stmt_stack = stack.push(index);
            if !inner_gate() {
                break;
            }
            match stmt {
                Statement::Shell(cmd) => {
                    let accept_result = &accept_result;
                    let inner_gate = &inner_gate;
                    pending.push(scope.spawn(move || {
                        let result = exec_shell(ctx, cmd, env, kill_timeout, inner_gate, &stmt_stack)?;
                        accept_result(result);
                        Ok(())
                    }));
                },
                Statement::Composition(comp) => {
                    let accept_result = &accept_result;
                    let inner_gate = &inner_gate;
                    pending.push(scope.spawn(move || {
                        let result = exec_composition(ctx, comp, inner_gate, &stmt_stack, visited)?;
                        accept_result(result);
                        Ok(())
                    }));
                },
                Statement::Join => {
                    stmt_stack.log_debug(&format!("waiting for {} pending statement(s) to join", pending.len()));
                    for handle in pending.drain(..) {
                        join(handle)?;
                    }
                },
            }
        }

        for handle in pending.drain(..) {
            join(handle)?;
        }
        Ok(())
    })?;

    Ok(first_failure.lock().unwrap().unwrap_or(0))
}

fn join(handle: std::thread::ScopedJoinHandle<anyhow::Result<()>>) -> anyhow::Result<()>
{
    match handle.join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Run a single shell command to completion, polling it while `gate`
/// holds and escalating a stop request once it stops holding or the
/// orchestrator itself is told to shut down.
fn exec_shell(
    ctx: &Context,
    cmd: &str,
    env: &EnvTable,
    kill_timeout: Duration,
    gate: &(dyn Fn() -> bool + Sync),
    stack: &Stack,
) -> anyhow::Result<i32>
{
    let started_at = Instant::now();
    let mut child = Child::spawn(cmd, env, Stdio::inherit(), Stdio::inherit())?;
    scope_exit::scope_exit! { child.kill(); }

    let prefix = format!("PID={:08} ", child.pid());
    stack.log_info(&format!("{prefix}executing with environment variables:\n{}{cmd}", render_env(env)));

    let mut result = None;
    while gate() && result.is_none() {
        result = child.poll(ctx.poll_interval);
    }
    if result.is_none() {
        stack.log_warning(&format!(
            "{prefix}stopping (was started {:.1}s ago)",
            started_at.elapsed().as_secs_f64(),
        ));
        child.stop(kill_timeout.mul_f64(0.5), kill_timeout);
    }
    while result.is_none() {
        result = child.poll(ctx.poll_interval);
    }

    let result = result.expect("loop above only exits once a result is available");
    stack.log_info(&format!("{prefix}exit status {result} in {:.1}s", started_at.elapsed().as_secs_f64()));
    Ok(result)
}

fn render_env(env: &EnvTable) -> String
{
    if env.is_empty() {
        return "<no variables>\n".to_owned();
    }
    let longest = env.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    env.iter()
        .map(|(name, value)| format!("{name:longest$} = {:?}\n", String::from_utf8_lossy(value)))
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn ctx() -> Context
    {
        Context { lookup_paths: Vec::new(), poll_interval: Duration::from_millis(10) }
    }

    fn always() -> bool { true }

    #[test]
    fn empty_script_succeeds_trivially()
    {
        let result = exec_script(
            &ctx(), &[], &EnvTable::new(), Duration::from_secs(1), &always, &Stack::new(), &Visited::new(),
        );
        assert_eq!(result.unwrap(), 0);
    }

    #[test]
    fn first_failure_wins_even_with_concurrent_siblings()
    {
        let script = vec![
            Statement::Shell("sleep 0.2 && exit 3".to_owned()),
            Statement::Shell("exit 5".to_owned()),
        ];
        let result = exec_script(
            &ctx(), &script, &EnvTable::new(), Duration::from_secs(1), &always, &Stack::new(), &Visited::new(),
        );
        assert_eq!(result.unwrap(), 5);
    }

    #[test]
    fn join_waits_for_prior_statements_before_continuing()
    {
        let script = vec![
            Statement::Shell("sleep 0.2 && touch /tmp/orchestrate-test-join-marker".to_owned()),
            Statement::Join,
            Statement::Shell("test -f /tmp/orchestrate-test-join-marker".to_owned()),
        ];
        let result = exec_script(
            &ctx(), &script, &EnvTable::new(), Duration::from_secs(1), &always, &Stack::new(), &Visited::new(),
        );
        std::fs::remove_file("/tmp/orchestrate-test-join-marker").ok();
        assert_eq!(result.unwrap(), 0);
    }

    /// S1 (concurrency + join), scaled down to keep the test suite fast:
    /// statements before a join run concurrently, not one after another.
    #[test]
    fn statements_before_a_join_run_concurrently()
    {
        let script = vec![
            Statement::Shell("sleep 0.3".to_owned()),
            Statement::Shell("sleep 0.3".to_owned()),
            Statement::Join,
        ];
        let started_at = Instant::now();
        let result = exec_script(
            &ctx(), &script, &EnvTable::new(), Duration::from_secs(1), &always, &Stack::new(), &Visited::new(),
        );
        assert_eq!(result.unwrap(), 0);
        assert!(
            started_at.elapsed() < Duration::from_millis(550),
            "two sleeps before a join should overlap, took {:?}", started_at.elapsed(),
        );
    }

    /// S2 (interruption): once the outer gate flips false, a running
    /// shell statement is stopped well before it would exit on its
    /// own, and the script's result is non-zero.
    #[test]
    fn gate_flipping_false_interrupts_a_running_statement()
    {
        let gate_open = std::sync::atomic::AtomicBool::new(true);
        let gate = || gate_open.load(std::sync::atomic::Ordering::SeqCst);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(150));
                gate_open.store(false, std::sync::atomic::Ordering::SeqCst);
            });

            let script = vec![Statement::Shell("trap '' INT TERM; sleep 10".to_owned())];
            let started_at = Instant::now();
            let result = exec_script(
                &ctx(), &script, &EnvTable::new(), Duration::from_millis(200), &gate, &Stack::new(), &Visited::new(),
            );
            assert_ne!(result.unwrap(), 0);
            assert!(
                started_at.elapsed() < Duration::from_secs(2),
                "stop escalation should have force-killed the child well before it slept out, took {:?}",
                started_at.elapsed(),
            );
        });
    }
}
