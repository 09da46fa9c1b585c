//! The flat name-to-bytes table materialized into every launched shell.

use indexmap::IndexMap;

/// An ordered mapping from variable name to raw environment bytes.
///
/// Keys are always valid environment-variable names by the time they
/// land in an [`EnvTable`]: uppercase ASCII, matching
/// `[A-Z_][A-Z0-9_]*`, and never containing `=`. Hierarchical register
/// names (containing `.`) are converted to this form by
/// [`EnvTable::register_name`] before insertion; the conversion is the
/// caller's responsibility (the schema loader, §4.B), not this type's,
/// since a caller may also insert plain pass-through environment
/// variables that were never dotted to begin with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvTable(IndexMap<String, Vec<u8>>);

impl EnvTable
{
    /// An empty table.
    pub fn new() -> Self
    {
        Self(IndexMap::new())
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&[u8]>
    {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Set a variable, overwriting any previous value.
    ///
    /// `name` must already be in its final, materialized form (see
    /// [`Self::register_name`] for converting hierarchical names).
    pub fn set(&mut self, name: impl Into<String>, value: Vec<u8>)
    {
        self.0.insert(name.into(), value);
    }

    /// Remove a variable.
    ///
    /// This is how a `null`-valued configuration entry un-sets a
    /// variable defined in an outer scope (§3).
    pub fn unset(&mut self, name: &str)
    {
        self.0.shift_remove(name);
    }

    /// Iterate over the table in insertion order.
    pub fn iter(&self) -> impl Iterator<Item=(&str, &[u8])>
    {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    /// Whether the table has no variables.
    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }

    /// Merge `other` into `self`, with `other`'s values taking
    /// precedence on conflicting names.
    ///
    /// This implements the callee-exports-back-to-caller rule of
    /// `external=` resolution (§4.F): after a successful external
    /// file executes, its final environment is merged back into the
    /// caller's, with variables the callee defined or changed
    /// overriding the caller's own.
    pub fn merge_from(&mut self, other: &Self)
    {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Convert a hierarchical register name (containing `.`) into its
    /// materialized environment-variable form: uppercased, with every
    /// `.` replaced by `__`.
    ///
    /// Names without a `.` (plain environment variables) are returned
    /// unchanged except for being left exactly as given -- they are
    /// not implicitly uppercased, since they may refer to
    /// conventionally lower-case variables like `PATH` is not, but
    /// e.g. a user-chosen `my_var` would be passed through as-is.
    pub fn register_name(name: &str) -> String
    {
        if name.contains('.') {
            name.to_uppercase().replace('.', "__")
        } else {
            name.to_owned()
        }
    }

    /// Whether `name` is a syntactically valid environment-variable
    /// name: uppercase ASCII matching `[A-Z_][A-Z0-9_]*`.
    pub fn is_valid_name(name: &str) -> bool
    {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_uppercase() || c == '_' => {},
            _ => return false,
        }
        chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    }
}
