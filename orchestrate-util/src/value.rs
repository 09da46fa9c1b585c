//! Loosely-typed configuration leaves and their canonical text encoding.

use std::fmt;

/// A configuration leaf as it comes out of the schema loader, before
/// it has been pinned to a concrete [`Value`] type.
///
/// This mirrors the handful of shapes a YAML (or JSON) scalar or
/// sequence can take. The schema loader is responsible for turning
/// parsed YAML nodes into this type; this crate never parses YAML
/// itself.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Input
{
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Input>),
}

/// The canonical, width-pinned type of an environment/register value.
///
/// Scalars are represented as one-element vectors; there is no
/// separate scalar variant.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Value
{
    Empty,
    String(String),
    Unstructured(Vec<u8>),
    Bit(Vec<bool>),
    Natural(Width, Vec<u64>),
    Integer(Width, Vec<i64>),
    Real(RealWidth, Vec<f64>),
}

/// Bit width of an integer or natural vector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum Width { W8, W16, W32, W64 }

/// Bit width of a real (floating-point) vector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum RealWidth { W16, W32, W64 }

/// Failure to canonicalize a configuration leaf.
#[derive(Clone, Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum ValueError
{
    #[error("{name:?}: value is not compatible with type {tag:?}")]
    BadValueType{name: String, tag: &'static str},

    #[error("{name:?}: cannot infer the type of this value")]
    NoInferenceType{name: String},
}

/// All recognized type-tag suffixes, in the order they are probed.
///
/// A name ending in `.{tag}` (for one of these tags) pins the type of
/// the value explicitly; see [`canonicalize`].
const TYPE_TAGS: &[&str] = &[
    "empty", "string", "unstructured", "bit",
    "integer64", "integer32", "integer16", "integer8",
    "natural64", "natural32", "natural16", "natural8",
    "real64", "real32", "real16",
];

const NAME_SEP: char = '.';
const ITEM_SEP: &str = " ";

/// Canonicalize `(name, value)` into `(name_with_type_suffix, text_bytes)`.
///
/// If `name` ends with a recognized type tag (see [`TYPE_TAGS`]), `value`
/// is coerced to that type or [`ValueError::BadValueType`] is returned.
/// Otherwise the type is inferred from the shape of `value`; if no type
/// fits, [`ValueError::NoInferenceType`] is returned.
pub fn canonicalize(name: &str, value: Input)
    -> Result<(String, Vec<u8>), ValueError>
{
    for &tag in TYPE_TAGS {
        if has_tag_suffix(name, tag) {
            let text = encode_as(name, tag, value)?;
            return Ok((name.to_owned(), text));
        }
    }

    let tag = infer_tag(name, &value)?;
    let suffixed = format!("{name}{NAME_SEP}{tag}");
    let text = encode_as(&suffixed, tag, value)?;
    Ok((suffixed, text))
}

/// Whether `name` ends with `.{tag}`.
fn has_tag_suffix(name: &str, tag: &str) -> bool
{
    let suffix_len = NAME_SEP.len_utf8() + tag.len();
    if name.len() <= suffix_len {
        return false;
    }
    let (_, suffix) = name.split_at(name.len() - suffix_len);
    let mut chars = suffix.chars();
    chars.next() == Some(NAME_SEP) && chars.as_str() == tag
}

fn bad(name: &str, tag: &'static str) -> ValueError
{
    ValueError::BadValueType{name: name.to_owned(), tag}
}

/// Encode `value` as the text representation of the type named `tag`.
///
/// `name` is used only for error messages.
fn encode_as(name: &str, tag: &'static str, value: Input)
    -> Result<Vec<u8>, ValueError>
{
    if tag == "empty" {
        return Ok(Vec::new());
    }
    if tag == "string" {
        return Ok(display_string(&value).into_bytes());
    }
    if tag == "unstructured" {
        let bytes = match value {
            Input::Bytes(b) => b,
            Input::Str(s) => parse_hex(&s).ok_or_else(|| bad(name, tag))?,
            _ => return Err(bad(name, tag)),
        };
        return Ok(hex_encode(&bytes).into_bytes());
    }

    // Every other tag operates on a (possibly one-element) vector.
    let items = to_list(value);

    if tag == "bit" {
        let bits: Vec<&str> = items.iter()
            .map(|x| if truthy(x) { "1" } else { "0" })
            .collect();
        return Ok(bits.join(ITEM_SEP).into_bytes());
    }

    if let Some(width) = tag.strip_prefix("integer") {
        let _ = width;
        let nums: Result<Vec<i128>, ValueError> = items.iter()
            .map(|x| as_int(x).ok_or_else(|| bad(name, tag)))
            .collect();
        let text = nums?.iter().map(i128::to_string)
            .collect::<Vec<_>>().join(ITEM_SEP);
        return Ok(text.into_bytes());
    }
    if let Some(width) = tag.strip_prefix("natural") {
        let _ = width;
        let nums: Result<Vec<i128>, ValueError> = items.iter()
            .map(|x| as_int(x).ok_or_else(|| bad(name, tag)))
            .collect();
        let text = nums?.iter().map(i128::to_string)
            .collect::<Vec<_>>().join(ITEM_SEP);
        return Ok(text.into_bytes());
    }
    if tag.starts_with("real") {
        let nums: Result<Vec<f64>, ValueError> = items.iter()
            .map(|x| as_float(x).ok_or_else(|| bad(name, tag)))
            .collect();
        let text = nums?.iter().map(|f| format_real(*f))
            .collect::<Vec<_>>().join(ITEM_SEP);
        return Ok(text.into_bytes());
    }

    unreachable!("unhandled type tag: {tag}")
}

/// Infer the type tag of `value`, given it has no explicit suffix.
fn infer_tag(name: &str, value: &Input) -> Result<&'static str, ValueError>
{
    match value {
        Input::Null => return Ok("empty"),
        Input::Str(_) => return Ok("string"),
        Input::Bytes(_) => return Ok("unstructured"),
        _ => {},
    }

    let items = match value {
        Input::List(items) => items.clone(),
        other => vec![other.clone()],
    };

    if items.iter().all(|x| matches!(x, Input::Bool(_))) {
        return Ok("bit");
    }

    if items.iter().all(|x| matches!(x, Input::Int(_))) {
        let ints: Vec<i128> = items.iter()
            .map(|x| as_int(x).expect("checked above")).collect();

        if ints.iter().all(|&x| (0 ..  (1i128 << 8)).contains(&x)) { return Ok("natural8"); }
        if ints.iter().all(|&x| (0 ..  (1i128 << 16)).contains(&x)) { return Ok("natural16"); }
        if ints.iter().all(|&x| (0 ..  (1i128 << 32)).contains(&x)) { return Ok("natural32"); }
        if ints.iter().all(|&x| (0 ..  (1i128 << 64)).contains(&x)) { return Ok("natural64"); }
        if ints.iter().all(|&x| (-(1i128 << 7)  .. (1i128 << 7)).contains(&x))  { return Ok("integer8"); }
        if ints.iter().all(|&x| (-(1i128 << 15) .. (1i128 << 15)).contains(&x)) { return Ok("integer16"); }
        if ints.iter().all(|&x| (-(1i128 << 31) .. (1i128 << 31)).contains(&x)) { return Ok("integer32"); }
        if ints.iter().all(|&x| (-(1i128 << 63) .. (1i128 << 63)).contains(&x)) { return Ok("integer64"); }
    }

    if items.iter().all(|x| matches!(x, Input::Int(_) | Input::Float(_))) {
        return Ok("real64");
    }

    Err(ValueError::NoInferenceType{name: name.to_owned()})
}

fn to_list(value: Input) -> Vec<Input>
{
    match value {
        Input::List(items) => items,
        other => vec![other],
    }
}

fn truthy(value: &Input) -> bool
{
    match value {
        Input::Null => false,
        Input::Bool(b) => *b,
        Input::Int(i) => *i != 0,
        Input::Float(f) => *f != 0.0,
        Input::Str(s) => !s.is_empty(),
        Input::Bytes(b) => !b.is_empty(),
        Input::List(l) => !l.is_empty(),
    }
}

fn as_int(value: &Input) -> Option<i128>
{
    match value {
        Input::Int(i) => Some(*i),
        Input::Bool(b) => Some(if *b { 1 } else { 0 }),
        Input::Float(f) => Some(*f as i128),
        _ => None,
    }
}

fn as_float(value: &Input) -> Option<f64>
{
    match value {
        Input::Int(i) => Some(*i as f64),
        Input::Float(f) => Some(*f),
        Input::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn display_string(value: &Input) -> String
{
    match value {
        Input::Null => "None".to_owned(),
        Input::Bool(b) => if *b { "True" } else { "False" }.to_owned(),
        Input::Int(i) => i.to_string(),
        Input::Float(f) => format_real(*f),
        Input::Str(s) => s.clone(),
        Input::Bytes(b) => hex_encode(b),
        Input::List(items) => {
            let rendered: Vec<String> = items.iter().map(display_string).collect();
            format!("[{}]", rendered.join(", "))
        },
    }
}

/// Format a float the way the orchestrator's text encoding requires:
/// always with a decimal point, never in scientific notation for the
/// ranges registers are expected to carry.
fn format_real(f: f64) -> String
{
    if f.is_nan() { return "nan".to_owned(); }
    if f.is_infinite() { return if f > 0.0 { "inf" } else { "-inf" }.to_owned(); }
    let mut s = format!("{f}");
    if !s.contains('.') && !s.contains('e') {
        s.push_str(".0");
    }
    s
}

fn hex_encode(bytes: &[u8]) -> String
{
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_hex(s: &str) -> Option<Vec<u8>>
{
    if s.len() % 2 != 0 { return None; }
    (0 .. s.len()).step_by(2)
        .map(|i| u8::from_str_radix(&s[i .. i + 2], 16).ok())
        .collect()
}

impl fmt::Display for Value
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{self:?}")
    }
}

impl Value
{
    /// Parse text encoded by [`canonicalize`] back into a [`Value`],
    /// given the type tag that produced it (the suffix of the
    /// canonicalized name).
    ///
    /// This is the inverse used by the round-trip property: for every
    /// well-typed leaf `v`, `Value::parse(tag, &encode(v)) == Ok(v)`
    /// modulo floating-point textual representation.
    pub fn parse(tag: &str, text: &[u8]) -> Result<Self, ValueError>
    {
        let err = || ValueError::BadValueType{name: String::new(), tag: "unknown"};
        let text = std::str::from_utf8(text).map_err(|_| err())?;

        if tag == "empty" {
            return Ok(Value::Empty);
        }
        if tag == "string" {
            return Ok(Value::String(text.to_owned()));
        }
        if tag == "unstructured" {
            return Ok(Value::Unstructured(parse_hex(text).ok_or_else(err)?));
        }

        let items: Vec<&str> = if text.is_empty() { Vec::new() } else { text.split(ITEM_SEP).collect() };

        if tag == "bit" {
            let bits = items.iter().map(|x| match *x {
                "1" => Ok(true),
                "0" => Ok(false),
                _ => Err(err()),
            }).collect::<Result<_, _>>()?;
            return Ok(Value::Bit(bits));
        }
        if let Some(width) = tag.strip_prefix("natural") {
            let width = parse_width(width).ok_or_else(err)?;
            let nums = items.iter().map(|x| x.parse().map_err(|_| err())).collect::<Result<_, _>>()?;
            return Ok(Value::Natural(width, nums));
        }
        if let Some(width) = tag.strip_prefix("integer") {
            let width = parse_width(width).ok_or_else(err)?;
            let nums = items.iter().map(|x| x.parse().map_err(|_| err())).collect::<Result<_, _>>()?;
            return Ok(Value::Integer(width, nums));
        }
        if let Some(width) = tag.strip_prefix("real") {
            let width = match width {
                "16" => RealWidth::W16,
                "32" => RealWidth::W32,
                "64" => RealWidth::W64,
                _ => return Err(err()),
            };
            let nums = items.iter().map(|x| x.parse().map_err(|_| err())).collect::<Result<_, _>>()?;
            return Ok(Value::Real(width, nums));
        }

        Err(err())
    }
}

fn parse_width(width: &str) -> Option<Width>
{
    match width {
        "8" => Some(Width::W8),
        "16" => Some(Width::W16),
        "32" => Some(Width::W32),
        "64" => Some(Width::W64),
        _ => None,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn s(name: &str, value: Input) -> (String, String)
    {
        let (name, bytes) = canonicalize(name, value).unwrap();
        (name, String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn explicit_empty_ignores_value()
    {
        let v = Input::List(vec![
            Input::Str("this".into()), Input::Str("is".into()), Input::Str("ignored".into()),
        ]);
        assert_eq!(s("foo.empty", v), ("foo.empty".into(), "".into()));
    }

    #[test]
    fn inferred_empty()
    {
        assert_eq!(s("foo", Input::Null), ("foo.empty".into(), "".into()));
    }

    #[test]
    fn explicit_string_stringifies()
    {
        assert_eq!(s("foo.string", Input::Int(123)), ("foo.string".into(), "123".into()));
    }

    #[test]
    fn inferred_string()
    {
        assert_eq!(s("foo", Input::Str("hello".into())), ("foo.string".into(), "hello".into()));
    }

    #[test]
    fn inferred_unstructured()
    {
        assert_eq!(
            s("foo", Input::Bytes(b"hello".to_vec())),
            ("foo.unstructured".into(), "68656c6c6f".into()),
        );
    }

    #[test]
    fn explicit_unstructured_from_hex_string()
    {
        assert_eq!(
            s("foo.unstructured", Input::Str("68656c6c6f".into())),
            ("foo.unstructured".into(), "68656c6c6f".into()),
        );
    }

    #[test]
    fn inferred_bit()
    {
        let v = Input::List(vec![Input::Bool(true), Input::Bool(false), Input::Bool(true)]);
        assert_eq!(s("foo", v), ("foo.bit".into(), "1 0 1".into()));
    }

    #[test]
    fn inferred_natural_width()
    {
        let v = Input::List(vec![Input::Int(60_000), Input::Int(50_000)]);
        assert_eq!(s("foo", v), ("foo.natural16".into(), "60000 50000".into()));

        assert_eq!(s("foo", Input::Int(300_000)), ("foo.natural32".into(), "300000".into()));

        let v = Input::List(vec![Input::Int(1i128 << 32), Input::Int(0)]);
        assert_eq!(s("foo", v), ("foo.natural64".into(), "4294967296 0".into()));
    }

    #[test]
    fn inferred_integer_width()
    {
        assert_eq!(s("foo", Input::Int(-10_000)), ("foo.integer16".into(), "-10000".into()));

        let v = Input::List(vec![Input::Int(-10_000), Input::Int(40_000)]);
        assert_eq!(s("foo", v), ("foo.integer32".into(), "-10000 40000".into()));

        let v = Input::List(vec![Input::Int(-(1i128 << 31)), Input::Int(1i128 << 31)]);
        assert_eq!(s("foo", v), ("foo.integer64".into(), "-2147483648 2147483648".into()));
    }

    #[test]
    fn inferred_real()
    {
        assert_eq!(s("foo", Input::Float(1.0)), ("foo.real64".into(), "1.0".into()));
    }

    #[test]
    fn mixed_types_fail_to_infer()
    {
        let v = Input::List(vec![Input::Int(1), Input::Str("a".into())]);
        assert!(matches!(canonicalize("foo", v), Err(ValueError::NoInferenceType{..})));
    }

    /// Property 5: canonicalize-then-parse round-trips for well-typed leaves.
    #[test]
    fn round_trip_natural()
    {
        let (name, bytes) = canonicalize("foo", Input::List(vec![Input::Int(1), Input::Int(2)])).unwrap();
        let tag = name.rsplit(NAME_SEP).next().unwrap();
        assert_eq!(Value::parse(tag, &bytes).unwrap(), Value::Natural(Width::W8, vec![1, 2]));
    }

    #[test]
    fn round_trip_bit()
    {
        let (name, bytes) = canonicalize("foo", Input::List(vec![Input::Bool(true), Input::Bool(false)])).unwrap();
        let tag = name.rsplit(NAME_SEP).next().unwrap();
        assert_eq!(Value::parse(tag, &bytes).unwrap(), Value::Bit(vec![true, false]));
    }

    #[test]
    fn round_trip_real()
    {
        let (name, bytes) = canonicalize("foo", Input::Float(4.5)).unwrap();
        let tag = name.rsplit(NAME_SEP).next().unwrap();
        assert_eq!(Value::parse(tag, &bytes).unwrap(), Value::Real(RealWidth::W64, vec![4.5]));
    }

    #[test]
    fn round_trip_string()
    {
        let (name, bytes) = canonicalize("foo", Input::Str("hello".into())).unwrap();
        let tag = name.rsplit(NAME_SEP).next().unwrap();
        assert_eq!(Value::parse(tag, &bytes).unwrap(), Value::String("hello".into()));
    }
}
