//! Lightweight row/scalar model for billing records.
//!
//! Rows are name-keyed maps of scalars. Query engines and steps convert to
//! their own representation as needed; this keeps core stable and minimal.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One cell value. Serialized untagged so rows read naturally as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of the value. Strings are not coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::I64(i) => Some(*i as f64),
            Scalar::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering used by string predicates (`contains`, `regex`, ...).
    /// `Null` has no text.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Scalar::Null => None,
            Scalar::Str(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Infer a scalar from raw text (CSV cells, env values).
    /// Empty text is `Null`.
    pub fn infer(raw: &str) -> Scalar {
        let t = raw.trim();
        if t.is_empty() {
            return Scalar::Null;
        }
        if let Ok(i) = t.parse::<i64>() {
            return Scalar::I64(i);
        }
        if let Ok(f) = t.parse::<f64>() {
            if f.is_finite() {
                return Scalar::F64(f);
            }
        }
        match t {
            "true" | "TRUE" | "True" => Scalar::Bool(true),
            "false" | "FALSE" | "False" => Scalar::Bool(false),
            _ => Scalar::Str(raw.to_string()),
        }
    }

    /// Equality as a query engine sees it: numbers compare numerically,
    /// everything else by text. `Null` never equals anything.
    pub fn sql_eq(&self, other: &Scalar) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        match (self.as_text(), other.as_text()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Rough in-memory size, used for dataset size estimates.
    pub fn approx_size(&self) -> usize {
        match self {
            Scalar::Null => 1,
            Scalar::Bool(_) => 1,
            Scalar::I64(_) | Scalar::F64(_) => 8,
            Scalar::Str(s) => s.len(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I64(i) => write!(f, "{i}"),
            Scalar::F64(x) => write!(f, "{x}"),
            Scalar::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// One billing/usage record: column name → value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Scalar>);

impl Row {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Scalar>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.0.get(column)
    }

    /// Missing columns read as `Null`.
    pub fn value(&self, column: &str) -> &Scalar {
        static NULL: Scalar = Scalar::Null;
        self.0.get(column).unwrap_or(&NULL)
    }

    /// Non-empty text of a column, if present.
    pub fn text(&self, column: &str) -> Option<String> {
        self.value(column)
            .as_text()
            .map(|t| t.into_owned())
            .filter(|t| !t.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn approx_size(&self) -> usize {
        self.0.iter().map(|(k, v)| k.len() + v.approx_size()).sum()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row(iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect())
    }
}

/// Compare two scalar tuples lexicographically for sorting.
pub fn scalar_tuple_cmp(a: &[Scalar], b: &[Scalar]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match scalar_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Compare two scalars for sorting.
///
/// Nulls are sorted first, numbers compare across integer/float, NaN sorts last.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (Str(x), Str(y)) => x.cmp(y),
        (I64(_) | F64(_), I64(_) | F64(_)) => {
            let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            if x.is_nan() && y.is_nan() {
                Ordering::Equal
            } else if x.is_nan() {
                Ordering::Greater
            } else if y.is_nan() {
                Ordering::Less
            } else {
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        }
        // Mixed types: order by variant order
        _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
    }
}

/// Assign a numeric order to scalar types for mixed-type comparisons.
fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I64(_) | F64(_) => 2,
        Str(_) => 3,
    }
}
