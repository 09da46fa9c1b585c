//! `orchestrate FILE [--path DIR]...` -- the CLI front-end.
//!
//! This binary is deliberately thin: it parses arguments, wires up
//! logging, builds the lookup-path list the file locator needs, and
//! hands everything to [`orchestrate::driver::run`]. All the
//! interesting behavior lives in the library crates.

use {
    clap::Parser,
    orchestrate_core::Context,
    std::{path::PathBuf, time::Duration},
};

/// Run a declarative composition of shell commands and nested
/// compositions described by an orc-file.
#[derive(Parser)]
#[command(name = "orchestrate", version, about)]
struct Cli
{
    /// The root orc-file to execute.
    file: PathBuf,

    /// A directory to search for `external=` references that are not
    /// absolute. May be given more than once; directories are
    /// consulted in the order given, before any directories supplied
    /// via `ORCHESTRATE_PATH`.
    #[arg(long = "path", value_name = "DIR")]
    path: Vec<PathBuf>,

    /// Increase log verbosity. Once for informational messages,
    /// twice for debug messages. Has no effect if `RUST_LOG` is set
    /// in the environment, which always takes precedence.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

/// The name of the environment variable consulted, in addition to
/// `--path`, for `external=` lookup directories: a `:`-joined list,
/// consistent with `PATH` itself.
const LOOKUP_PATH_ENV_VAR: &str = "ORCHESTRATE_PATH";

fn main()
{
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut lookup_paths = cli.path;
    lookup_paths.extend(lookup_paths_from_env());

    let ctx = Context {
        lookup_paths,
        poll_interval: Duration::from_millis(50),
    };

    let file = cli.file.to_string_lossy().into_owned();
    let code = orchestrate::driver::run(&ctx, &file);
    std::process::exit(code);
}

/// Read `ORCHESTRATE_PATH` as a `:`-joined list of directories, in the
/// same convention as `PATH` itself. Missing or empty segments are
/// skipped.
fn lookup_paths_from_env() -> Vec<PathBuf>
{
    std::env::var(LOOKUP_PATH_ENV_VAR)
        .ok()
        .map(|raw| {
            raw.split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Configure `env_logger` from the repeated `-v` flag, deferring to
/// `RUST_LOG` whenever it is set explicitly (the standard
/// `env_logger` precedence).
fn init_logging(verbosity: u8)
{
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_module_path(false)
        .format_timestamp_millis()
        .init();
}
