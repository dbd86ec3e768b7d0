//! Request parameter representations and their normalisation.
//!
//! Frameworks hand over request parameters in different shapes: plain
//! mappings where a value may be a single string or a list, sequences of
//! `(key, value)` pairs with repeated keys, and multi-maps parsed from a query
//! string. [`RawParams`] captures all three as explicit variants and
//! [`normalize`] folds any of them into one canonical [`NormalizedParams`]
//! mapping of `key -> [values]`.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Number, Value};

use crate::error::{SigningError, SigningResult};

/// Canonical parameter mapping: every key maps to a non-empty list of values.
pub type NormalizedParams = BTreeMap<String, Vec<String>>;

/// A parameter value: one string, or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// A single value.
    Single(String),
    /// Several values under the same key, in caller order.
    Multiple(Vec<String>),
}

impl ParamValue {
    /// Decode a byte sequence as a single UTF-8 value.
    ///
    /// # Examples
    ///
    /// ```
    /// use laterpay_signing::ParamValue;
    ///
    /// let value = ParamValue::from_utf8(b"valu\xc4\x98".to_vec()).unwrap();
    /// assert_eq!(value, ParamValue::Single("valuĘ".to_owned()));
    /// assert!(ParamValue::from_utf8(vec![0xff, 0xfe]).is_err());
    /// ```
    pub fn from_utf8(bytes: impl Into<Vec<u8>>) -> SigningResult<Self> {
        Ok(Self::Single(String::from_utf8(bytes.into())?))
    }

    /// The values as a slice, one element for [`ParamValue::Single`].
    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        }
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Single(value.clone())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multiple(values.into_iter().map(ToOwned::to_owned).collect())
    }
}

impl From<&[&str]> for ParamValue {
    fn from(values: &[&str]) -> Self {
        Self::Multiple(values.iter().map(|v| (*v).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ParamValue {
    fn from(values: [&str; N]) -> Self {
        Self::Multiple(values.iter().map(|v| (*v).to_owned()).collect())
    }
}

macro_rules! impl_from_scalar {
    ($render:path => $($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::Single($render(value))
                }
            }

            impl From<Vec<$ty>> for ParamValue {
                fn from(values: Vec<$ty>) -> Self {
                    Self::Multiple(values.into_iter().map($render).collect())
                }
            }

            impl<const N: usize> From<[$ty; N]> for ParamValue {
                fn from(values: [$ty; N]) -> Self {
                    Self::Multiple(values.into_iter().map($render).collect())
                }
            }
        )*
    };
}

impl_from_scalar!(render_display => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
impl_from_scalar!(render_float => f32, f64);
impl_from_scalar!(render_bool => bool);

fn render_display(value: impl fmt::Display) -> String {
    value.to_string()
}

/// Booleans render capitalised: `True` and `False`.
fn render_bool(value: bool) -> String {
    String::from(if value { "True" } else { "False" })
}

/// Render a float with the shortest round-trip digits of its own precision.
///
/// Decimal exponents in `-4..16` use fixed notation with at least one
/// fractional digit (`1.0`, `0.0001`); anything else is scientific with a
/// signed, two-digit exponent (`1e+20`, `1.5e-05`).
fn render_float(value: impl fmt::LowerExp) -> String {
    let scientific = format!("{value:e}");
    match scientific.as_str() {
        "inf" | "-inf" => return scientific,
        "NaN" => return String::from("nan"),
        _ => {}
    }

    let (sign, unsigned) = match scientific.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", scientific.as_str()),
    };
    let (mantissa, exponent) = unsigned.split_once('e').unwrap_or((unsigned, "0"));
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let body = if (-4..16).contains(&exponent) {
        match usize::try_from(exponent + 1) {
            Ok(point) if point > 0 && point < digits.len() => {
                format!("{}.{}", &digits[..point], &digits[point..])
            }
            Ok(point) if point > 0 => {
                format!("{digits}{}.0", "0".repeat(point - digits.len()))
            }
            _ => {
                let zeros = usize::try_from(-exponent - 1).unwrap_or(0);
                format!("0.{}{digits}", "0".repeat(zeros))
            }
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() {
            String::new()
        } else {
            format!(".{rest}")
        };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        format!("{first}{fraction}e{exponent_sign}{:02}", exponent.unsigned_abs())
    };

    format!("{sign}{body}")
}

/// Request parameters in one of the accepted input shapes.
///
/// Pick the constructor that matches the data at hand:
///
/// - [`RawParams::map`] for a mapping of key to a single value or list.
/// - [`RawParams::pairs`] for a sequence of `(key, value)` pairs where a
///   value may itself be a list.
/// - [`RawParams::multi_map`] (or [`RawParams::from_query`]) for an ordered
///   multi-map with repeated keys.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{ParamValue, RawParams};
///
/// let map = RawParams::map([("a", ParamValue::from("1")), ("b", ParamValue::from(["2", "3"]))]);
/// let pairs = RawParams::pairs([("b", "2"), ("a", "1"), ("b", "3")]);
/// assert_eq!(map.normalize(), pairs.normalize());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawParams {
    /// Key to single value or list; keys are unique.
    Map(BTreeMap<String, ParamValue>),
    /// `(key, value)` pairs; repeated keys accumulate.
    Pairs(Vec<(String, ParamValue)>),
    /// `(key, value)` pairs of plain strings with repeated keys.
    MultiMap(Vec<(String, String)>),
}

impl Default for RawParams {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl RawParams {
    /// Build the mapping shape. A later duplicate key replaces an earlier one.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build the pair-sequence shape.
    pub fn pairs<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        Self::Pairs(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build the multi-map shape.
    pub fn multi_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::MultiMap(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Parse an `application/x-www-form-urlencoded` string into a multi-map.
    ///
    /// Blank values are kept; `+` decodes to a space.
    ///
    /// # Examples
    ///
    /// ```
    /// use laterpay_signing::RawParams;
    ///
    /// let params = RawParams::from_query("a=1&a=2&b=x+y&c=");
    /// let normalized = params.normalize();
    /// assert_eq!(normalized["a"], ["1", "2"]);
    /// assert_eq!(normalized["b"], ["x y"]);
    /// assert_eq!(normalized["c"], [""]);
    /// ```
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        Self::MultiMap(form_urlencoded::parse(query.as_bytes()).into_owned().collect())
    }

    /// Interpret a dynamically typed JSON value as request parameters.
    ///
    /// An object becomes the mapping shape and an array of two-element
    /// `[key, value]` arrays becomes the pair shape. Values may be strings,
    /// numbers, booleans, or arrays of those.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidInputType`] for any other JSON shape,
    /// including `null` values and nested objects.
    pub fn from_json(value: &Value) -> SigningResult<Self> {
        match value {
            Value::Object(entries) => entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), json_param_value(value)?)))
                .collect::<SigningResult<BTreeMap<_, _>>>()
                .map(Self::Map),
            Value::Array(items) => items
                .iter()
                .map(json_pair)
                .collect::<SigningResult<Vec<_>>>()
                .map(Self::Pairs),
            other => Err(SigningError::InvalidInputType(format!(
                "expected an object or an array of [key, value] pairs, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Whether any entry carries the given key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Self::Map(entries) => entries.contains_key(key),
            Self::Pairs(entries) => entries.iter().any(|(k, _)| k == key),
            Self::MultiMap(entries) => entries.iter().any(|(k, _)| k == key),
        }
    }

    /// Add a single value under `key`, keeping the current shape.
    ///
    /// For the mapping shape this replaces any existing entry.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        match self {
            Self::Map(entries) => {
                entries.insert(key, ParamValue::Single(value));
            }
            Self::Pairs(entries) => entries.push((key, ParamValue::Single(value))),
            Self::MultiMap(entries) => entries.push((key, value)),
        }
    }

    /// Normalise into the canonical `key -> [values]` mapping.
    #[must_use]
    pub fn normalize(&self) -> NormalizedParams {
        normalize(self)
    }
}

impl<K, V> FromIterator<(K, V)> for RawParams
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::map(iter)
    }
}

/// Fold any [`RawParams`] shape into a [`NormalizedParams`] mapping.
///
/// - Mapping: a single value becomes a one-element list.
/// - Pairs: repeated single values accumulate in first-seen order; a pair whose
///   value is already a list sets that key's list as given.
/// - Multi-map: every value is appended under its key.
///
/// Keys left with no values are dropped. The input is never modified.
///
/// # Examples
///
/// ```
/// use laterpay_signing::{normalize, ParamValue, RawParams};
///
/// let params = RawParams::pairs([
///     ("key1", ParamValue::from("value11")),
///     ("key1", ParamValue::from("value12")),
///     ("key2", ParamValue::from(["value21", "value22"])),
/// ]);
/// let normalized = normalize(&params);
/// assert_eq!(normalized["key1"], ["value11", "value12"]);
/// assert_eq!(normalized["key2"], ["value21", "value22"]);
/// ```
#[must_use]
pub fn normalize(params: &RawParams) -> NormalizedParams {
    let mut out = NormalizedParams::new();

    match params {
        RawParams::Map(entries) => {
            for (key, value) in entries {
                out.insert(key.clone(), value.values().to_vec());
            }
        }
        RawParams::Pairs(entries) => {
            for (key, value) in entries {
                match value {
                    ParamValue::Multiple(values) => {
                        out.insert(key.clone(), values.clone());
                    }
                    ParamValue::Single(value) => {
                        out.entry(key.clone()).or_default().push(value.clone());
                    }
                }
            }
        }
        RawParams::MultiMap(entries) => {
            for (key, value) in entries {
                out.entry(key.clone()).or_default().push(value.clone());
            }
        }
    }

    out.retain(|_, values| !values.is_empty());
    out
}

fn json_pair(item: &Value) -> SigningResult<(String, ParamValue)> {
    match item {
        Value::Array(pair) if pair.len() == 2 => {
            Ok((json_scalar(&pair[0])?, json_param_value(&pair[1])?))
        }
        other => Err(SigningError::InvalidInputType(format!(
            "expected a [key, value] pair, got {}",
            json_kind(other)
        ))),
    }
}

fn json_param_value(value: &Value) -> SigningResult<ParamValue> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(json_scalar)
            .collect::<SigningResult<Vec<_>>>()
            .map(ParamValue::Multiple),
        scalar => json_scalar(scalar).map(ParamValue::Single),
    }
}

fn json_scalar(value: &Value) -> SigningResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(render_json_number(n)),
        Value::Bool(b) => Ok(render_bool(*b)),
        other => Err(SigningError::InvalidInputType(format!(
            "expected a string, number or boolean, got {}",
            json_kind(other)
        ))),
    }
}

fn render_json_number(number: &Number) -> String {
    if let Some(n) = number.as_i64() {
        render_display(n)
    } else if let Some(n) = number.as_u64() {
        render_display(n)
    } else {
        number.as_f64().map_or_else(|| number.to_string(), render_float)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
