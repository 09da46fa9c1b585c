//! Running a composition: external imports, then predicate/main/finalizer.
//!
//! These functions never raise an error in response to invalid syntax
//! or a missing file -- they report such problems as exit codes
//! instead (see [`crate::error::ErrorCode`]), the same way an invoked
//! shell command reports failure. An [`anyhow::Error`] escaping from
//! here means something unexpected happened: the implementation has a
//! bug, or the OS itself failed us (e.g. `/bin/sh` is missing).

use {
    crate::{error::ErrorCode, script::exec_script, stack::Stack, visited::Visited},
    orchestrate_core::{
        schema::{load_ast, load_composition, Composition},
        Context,
    },
    orchestrate_util::EnvTable,
    std::time::Instant,
};

/// Locate, parse, and run `file` as a composition referenced from
/// another orc-file's `external=` directive.
///
/// `file` is resolved with [`orchestrate_core::locate`] against
/// `ctx.lookup_paths` when it is not absolute (§4.C): this is the
/// lookup used for `external=` references, not for the orc-file named
/// on the command line (see [`exec_top_level_file`] for that).
///
/// `env` is both input and output: the supplied variables are
/// inherited by the executed composition, and on return (whether the
/// composition succeeded or not, as long as it could be parsed and
/// started) have been updated with whatever the composition's own
/// registers and environment-variable entries define, which take
/// precedence over the supplied values.
pub fn exec_file(
    ctx: &Context,
    file: &str,
    env: &mut EnvTable,
    gate: &(dyn Fn() -> bool + Sync),
    stack: &Stack,
    visited: &Visited,
) -> anyhow::Result<i32>
{
    stack.log_debug(&format!("locating file {file:?} in {:?}", ctx.lookup_paths));
    let Some(path) = orchestrate_core::locate(ctx, file) else {
        stack.log_warning(&format!("cannot locate file {file:?} in {:?}", ctx.lookup_paths));
        return Ok(ErrorCode::FileError.into());
    };
    exec_path(ctx, &path, env, gate, stack, visited)
}

/// Parse and run the orc-file named on the command line.
///
/// Unlike an `external=` reference, the top-level file is a plain
/// filesystem path: absolute, or relative to the current working
/// directory, exactly as given on the command line. `ctx.lookup_paths`
/// is not consulted for it.
pub fn exec_top_level_file(
    ctx: &Context,
    file: &str,
    env: &mut EnvTable,
    gate: &(dyn Fn() -> bool + Sync),
    stack: &Stack,
    visited: &Visited,
) -> anyhow::Result<i32>
{
    exec_path(ctx, std::path::Path::new(file), env, gate, stack, visited)
}

/// Read, parse, and run the orc-file at `path`, which is assumed to
/// already have been resolved to a filesystem location.
fn exec_path(
    ctx: &Context,
    path: &std::path::Path,
    env: &mut EnvTable,
    gate: &(dyn Fn() -> bool + Sync),
    stack: &Stack,
    visited: &Visited,
) -> anyhow::Result<i32>
{
    let canonical = match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(error) => {
            stack.log_warning(&format!("cannot canonicalize {}: {error}", path.display()));
            return Ok(ErrorCode::FileError.into());
        },
    };
    if visited.contains(&canonical) {
        stack.log_warning(&format!("cycle detected: {} is already being loaded", canonical.display()));
        return Ok(ErrorCode::SchemaError.into());
    }
    let visited = visited.push(canonical);

    stack.log_debug(&format!("executing file found at {}", path.display()));
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            stack.log_warning(&format!("cannot read {}: {error}", path.display()));
            return Ok(ErrorCode::FileError.into());
        },
    };

    let ast = match load_ast(&source) {
        Ok(ast) => ast,
        Err(error) => {
            stack.log_warning(&format!("cannot load {}: {error}", path.display()));
            return Ok(ErrorCode::SchemaError.into());
        },
    };
    let comp = match load_composition(&ast, env) {
        Ok(comp) => comp,
        Err(error) => {
            stack.log_warning(&format!("cannot load {}: {error}", path.display()));
            return Ok(ErrorCode::SchemaError.into());
        },
    };

    // Export the variables to the caller. Vars from the composition override the supplied vars.
    env.merge_from(&comp.env);

    let stack = stack.push(format!("{:?}", path.to_string_lossy()));
    stack.log_debug(&format!("loaded composition: {comp:?}"));
    exec_composition(ctx, &comp, gate, &stack, &visited)
}

/// Run an already-parsed composition: its `external=` imports in
/// order, then its predicate, main, and finalizer scripts.
pub fn exec_composition(
    ctx: &Context,
    comp: &Composition,
    gate: &(dyn Fn() -> bool + Sync),
    stack: &Stack,
    visited: &Visited,
) -> anyhow::Result<i32>
{
    let mut env = comp.env.clone();
    for external in &comp.external {
        let result = exec_file(ctx, &external.file, &mut env, gate, &stack.push("external"), visited)?;
        if result != 0 {
            return Ok(result);
        }
    }

    let run = |node: &str, script: &[orchestrate_core::schema::Statement], inner_gate: &(dyn Fn() -> bool + Sync)|
        -> anyhow::Result<i32>
    {
        let inner_stack = stack.push(node);
        let started_at = Instant::now();
        let result = exec_script(ctx, script, &env, comp.kill_timeout(), inner_gate, &inner_stack, visited)?;
        inner_stack.log_debug(&format!("script exit status {result} in {:.1}s", started_at.elapsed().as_secs_f64()));
        Ok(result)
    };

    // The predicate is allowed to fail; failure is swallowed (never
    // propagated as the composition's own result) and aborts the
    // main script entirely.
    let result = run("?", &comp.predicate, gate)?;
    if result != 0 {
        return Ok(0);
    }

    // The exit code of a composition is that of the first statement
    // of its main script to fail.
    let result = run("$", &comp.main, gate)?;

    // The finalizer always runs, and is never interrupted by the
    // orchestrator's own shutdown gate, so that the managed system is
    // always left in a known state.
    let result_fin = run(".", &comp.fin, &(|| true))?;

    Ok(if result != 0 { result } else { result_fin })
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn ctx() -> Context
    {
        Context { lookup_paths: Vec::new(), poll_interval: std::time::Duration::from_millis(10) }
    }

    fn load(yaml: &str) -> Composition
    {
        load_composition(&load_ast(yaml).unwrap(), &EnvTable::new()).unwrap()
    }

    fn always() -> bool { true }

    #[test]
    fn predicate_failure_is_swallowed_and_aborts_main()
    {
        let comp = load("?=: exit 1\n$=: touch /tmp/orchestrate-test-predicate-marker\n");
        let result = exec_composition(&ctx(), &comp, &always, &Stack::new(), &Visited::new()).unwrap();
        assert_eq!(result, 0);
        assert!(!std::path::Path::new("/tmp/orchestrate-test-predicate-marker").exists());
    }

    #[test]
    fn finalizer_runs_even_when_main_fails()
    {
        std::fs::remove_file("/tmp/orchestrate-test-fin-marker").ok();
        let comp = load("$=: exit 7\n.=: touch /tmp/orchestrate-test-fin-marker\n");
        let result = exec_composition(&ctx(), &comp, &always, &Stack::new(), &Visited::new()).unwrap();
        assert_eq!(result, 7);
        assert!(std::path::Path::new("/tmp/orchestrate-test-fin-marker").exists());
        std::fs::remove_file("/tmp/orchestrate-test-fin-marker").ok();
    }

    #[test]
    fn missing_file_reports_file_error_exit_code()
    {
        let mut env = EnvTable::new();
        let result = exec_file(
            &ctx(), "/no/such/orc/file.orc.yaml", &mut env, &always, &Stack::new(), &Visited::new(),
        ).unwrap();
        assert_eq!(result, ErrorCode::FileError.into());
    }

    #[test]
    fn cyclic_external_reports_schema_error_exit_code()
    {
        let dir = std::env::temp_dir().join(format!("orchestrate-cycle-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.orc.yaml");
        std::fs::write(&file, "external=: a.orc.yaml\n").unwrap();

        let ctx = Context { lookup_paths: vec![dir.clone()], poll_interval: std::time::Duration::from_millis(10) };
        let mut env = EnvTable::new();
        let result = exec_file(
            &ctx, "a.orc.yaml", &mut env, &always, &Stack::new(), &Visited::new(),
        ).unwrap();
        assert_eq!(result, ErrorCode::SchemaError.into());

        std::fs::remove_dir_all(&dir).ok();
    }

    /// S4: a composition that imports an external file inherits the
    /// variables it exports, and those variables reach a shell
    /// launched from the importing composition's own main script.
    #[test]
    fn external_file_exports_env_to_the_importing_composition()
    {
        let dir = std::env::temp_dir().join(format!("orchestrate-external-env-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.orc.yaml"), "FOO: 123\n").unwrap();
        std::fs::write(dir.join("b.orc.yaml"), "external=: a.orc.yaml\n$=: test \"$FOO\" = 123\n").unwrap();

        let ctx = Context { lookup_paths: vec![dir.clone()], poll_interval: std::time::Duration::from_millis(10) };
        let mut env = EnvTable::new();
        let result = exec_file(&ctx, "b.orc.yaml", &mut env, &always, &Stack::new(), &Visited::new()).unwrap();
        assert_eq!(result, 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
