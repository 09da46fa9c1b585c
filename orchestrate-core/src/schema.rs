//! Compositions, statements, and the orc-file grammar that produces them.

use {
    orchestrate_util::{value, EnvTable, Input, ValueError},
    std::time::Duration,
    thiserror::Error,
};

/// Key fragment that marks a mapping key as a directive rather than a
/// register or plain environment variable.
///
/// `=` cannot occur in an environment variable name on any OS this
/// tool targets, so it doubles as an unambiguous marker: `$=`, `?=`,
/// `.=`, and `external=` are directives; anything else is data.
const DIRECTIVE_MARK: char = '=';

const DIRECTIVE_EXTERNAL: &str = "external=";
const DIRECTIVE_PREDICATE: &str = "?=";
const DIRECTIVE_MAIN: &str = "$=";
const DIRECTIVE_FIN: &str = ".=";

/// A parsed orc-file, or a nested composition defined inline within one.
#[derive(Clone, Debug)]
pub struct Composition
{
    /// The fully resolved environment this composition's scripts run
    /// under: inherited variables overridden by this composition's
    /// own register and environment-variable entries.
    pub env: EnvTable,

    /// Other orc-files to execute, in order, before any script runs.
    pub external: Vec<External>,

    /// The `?=` script. Its failures are swallowed (§4.F).
    pub predicate: Vec<Statement>,

    /// The `$=` script. Its exit code is this composition's exit code.
    pub main: Vec<Statement>,

    /// The `.=` script. Always runs if the predicate succeeded.
    pub fin: Vec<Statement>,
}

impl Composition
{
    /// How long a child is given to react to each escalation step of
    /// a stop request, in seconds.
    ///
    /// This reads the undocumented `(kill_timeout)` environment
    /// entry, which cannot be set through ordinary orc-file syntax
    /// (its name is not a valid register or environment-variable
    /// name) and exists only as a forward-compatibility seam. Falls
    /// back to 20 seconds unless the entry is present and parses as a
    /// finite, positive number -- `Duration::from_secs_f64` panics on
    /// negative, infinite, or NaN input, and a malformed orc-file must
    /// never panic the process (§7).
    pub fn kill_timeout(&self) -> Duration
    {
        self.env.get("(kill_timeout)")
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|f| f.is_finite() && *f > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(20))
    }
}

/// One element of a script (the body of `?=`, `$=`, or `.=`).
#[derive(Clone, Debug)]
pub enum Statement
{
    /// A shell command line.
    Shell(String),

    /// A nested composition, run as a single statement.
    Composition(Box<Composition>),

    /// A join barrier: wait for every statement launched so far in
    /// this script before continuing.
    Join,
}

/// A reference to another orc-file to execute first.
#[derive(Clone, Debug)]
pub struct External
{
    /// Path to the file, absolute or to be resolved via lookup paths.
    pub file: String,
}

/// Failure to parse an orc-file or a nested composition within one.
#[derive(Debug, Error)]
pub enum SchemaError
{
    /// The orc-file's YAML could not be parsed at all.
    #[error("syntax error: {0}")]
    Syntax(#[from] serde_yaml::Error),

    /// A composition node was not a YAML mapping.
    #[error("a composition must be a mapping, not {0}")]
    NotAMapping(&'static str),

    /// A register or environment-variable value could not be encoded.
    #[error("environment variable error: {0}")]
    Environment(#[from] ValueError),

    /// A statement was not a string, mapping, or null.
    #[error("a statement must be a shell command (string), a nested composition (mapping), or a join (null)")]
    BadStatement,

    /// An `external=` entry was not a string.
    #[error("external file references must be strings")]
    BadExternal,

    /// Mapping keys containing `=` that were not recognized directives.
    #[error("unknown directive(s): {0:?}")]
    UnknownDirectives(Vec<String>),

    /// A mapping key was not a string (e.g. YAML `42: foo`).
    #[error("mapping keys must be strings, found {0}")]
    NonStringKey(&'static str),

    /// A register or environment-variable value had a YAML shape this
    /// tool does not know how to encode (e.g. a nested mapping used
    /// as a scalar, or a non-finite/non-representable number).
    #[error("{0:?}: unsupported value shape")]
    UnsupportedValue(String),
}

/// Parse the top-level YAML document of an orc-file.
pub fn load_ast(text: &str) -> Result<serde_yaml::Value, SchemaError>
{
    Ok(serde_yaml::from_str(text)?)
}

/// Build a [`Composition`] from a parsed YAML node.
///
/// `env` is the environment inherited from the enclosing scope:
/// the parent process's environment for a top-level orc-file, or the
/// caller composition's environment for a nested one. Registers and
/// environment variables declared in `ast` are merged on top, with
/// `null`-valued entries removing inherited names (§3).
pub fn load_composition(ast: &serde_yaml::Value, env: &EnvTable) -> Result<Composition, SchemaError>
{
    let mapping = ast.as_mapping().ok_or_else(|| SchemaError::NotAMapping(yaml_kind(ast)))?;

    let mut env = env.clone();
    let mut leaves = Vec::new();
    flatten(mapping, String::new(), &mut leaves)?;
    for (name, value) in leaves {
        apply_leaf(&mut env, &name, value)?;
    }

    let mut unknown = Vec::new();
    let mut external = Vec::new();
    let mut predicate = Vec::new();
    let mut main = Vec::new();
    let mut fin = Vec::new();

    for (key, value) in mapping {
        let Some(key) = key.as_str() else { return Err(SchemaError::NonStringKey(yaml_kind(key))) };
        if !key.contains(DIRECTIVE_MARK) {
            continue; // Already consumed as a register/env entry above.
        }
        match key {
            DIRECTIVE_EXTERNAL => external = load_external(value)?,
            DIRECTIVE_PREDICATE => predicate = load_script(value, &env)?,
            DIRECTIVE_MAIN => main = load_script(value, &env)?,
            DIRECTIVE_FIN => fin = load_script(value, &env)?,
            other => unknown.push(other.to_owned()),
        }
    }

    if !unknown.is_empty() {
        return Err(SchemaError::UnknownDirectives(unknown));
    }

    Ok(Composition { env, external, predicate, main, fin })
}

/// Build a script (the value of a `?=`/`$=`/`.=` directive) from its
/// YAML node: either a single statement or a sequence of them.
pub fn load_script(ast: &serde_yaml::Value, env: &EnvTable) -> Result<Vec<Statement>, SchemaError>
{
    match ast.as_sequence() {
        Some(items) => items.iter().map(|item| load_statement(item, env)).collect(),
        None => Ok(vec![load_statement(ast, env)?]),
    }
}

/// Build a single [`Statement`] from its YAML node.
pub fn load_statement(ast: &serde_yaml::Value, env: &EnvTable) -> Result<Statement, SchemaError>
{
    match ast {
        serde_yaml::Value::String(s) => Ok(Statement::Shell(s.clone())),
        serde_yaml::Value::Null => Ok(Statement::Join),
        serde_yaml::Value::Mapping(_) => Ok(Statement::Composition(Box::new(load_composition(ast, env)?))),
        _ => Err(SchemaError::BadStatement),
    }
}

/// Build the list of [`External`] references from an `external=` node.
pub fn load_external(ast: &serde_yaml::Value) -> Result<Vec<External>, SchemaError>
{
    fn item(v: &serde_yaml::Value) -> Result<External, SchemaError>
    {
        match v.as_str() {
            Some(s) => Ok(External { file: s.to_owned() }),
            None => Err(SchemaError::BadExternal),
        }
    }

    match ast.as_sequence() {
        Some(items) => items.iter().map(item).collect(),
        None => Ok(vec![item(ast)?]),
    }
}

/// Flatten a mapping's register/env entries into dotted `(name, leaf)`
/// pairs, recursing into nested mappings and skipping directive keys.
///
/// Mirrors the original's `flatten_registers`: `{"a": {"b": 1}}`
/// becomes `[("a.b", 1)]`.
fn flatten(mapping: &serde_yaml::Mapping, prefix: String, out: &mut Vec<(String, serde_yaml::Value)>)
    -> Result<(), SchemaError>
{
    for (key, value) in mapping {
        let Some(key) = key.as_str() else { return Err(SchemaError::NonStringKey(yaml_kind(key))) };
        if key.contains(DIRECTIVE_MARK) {
            continue;
        }
        let name = if prefix.is_empty() { key.to_owned() } else { format!("{prefix}.{key}") };
        match value.as_mapping() {
            Some(nested) => flatten(nested, name, out)?,
            None => out.push((name, value.clone())),
        }
    }
    Ok(())
}

/// Apply one flattened `(name, value)` pair to `env`: uppercasing and
/// joining a dotted register name, encoding the value, or removing
/// the name entirely when the value is `null`.
fn apply_leaf(env: &mut EnvTable, name: &str, value: serde_yaml::Value) -> Result<(), SchemaError>
{
    let materialized = EnvTable::register_name(name);
    if matches!(value, serde_yaml::Value::Null) {
        env.unset(&materialized);
        return Ok(());
    }
    let input = yaml_to_input(&value)?;
    let (_, bytes) = value::canonicalize(name, input)?;
    env.set(materialized, bytes);
    Ok(())
}

/// Convert a YAML leaf (anything but a mapping, which is handled by
/// [`flatten`] before this is ever called) into the loosely-typed
/// [`Input`] the canonicalization logic understands.
fn yaml_to_input(value: &serde_yaml::Value) -> Result<Input, SchemaError>
{
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::Null => Input::Null,
        Y::Bool(b) => Input::Bool(*b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Input::Int(i.into())
            } else if let Some(u) = n.as_u64() {
                Input::Int(u.into())
            } else if let Some(f) = n.as_f64() {
                Input::Float(f)
            } else {
                return Err(SchemaError::UnsupportedValue(format!("{n:?}")));
            }
        },
        Y::String(s) => Input::Str(s.clone()),
        Y::Sequence(items) => Input::List(
            items.iter().map(yaml_to_input).collect::<Result<_, _>>()?
        ),
        Y::Mapping(_) => return Err(SchemaError::UnsupportedValue("nested mapping".to_owned())),
        Y::Tagged(tagged) => yaml_to_input(&tagged.value)?,
    })
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str
{
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a bool",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}
