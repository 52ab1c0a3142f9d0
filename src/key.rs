//! Index keys and key ranges.
//!
//! Keys follow the ordering of browser object stores: every number sorts
//! before every string, every string before every array. Strings compare by
//! UTF-16 code unit, arrays element by element and then by length.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The highest BMP code point. Append it to a prefix to build an inclusive
/// upper bound covering every string that starts with that prefix.
///
/// ```
/// use viewstore::{RangeQuery, UNICODE_MAX};
///
/// let users = RangeQuery::new("byPrefix")
///     .lower("user#")
///     .upper(format!("user#{UNICODE_MAX}"));
/// # let _ = users;
/// ```
pub const UNICODE_MAX: &str = "\u{ffff}";

/// A value in the ordered key domain of an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexKey {
    Number(f64),
    String(String),
    Array(Vec<IndexKey>),
}

impl IndexKey {
    /// Builds a composite key from its components.
    pub fn compound<I, K>(parts: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<IndexKey>,
    {
        IndexKey::Array(parts.into_iter().map(Into::into).collect())
    }

    /// Converts a JSON value into a key. Booleans, null, objects and
    /// non-finite numbers are not keys; neither is an array holding one.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().filter(|n| n.is_finite()).map(IndexKey::from),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(IndexKey::from_value)
                .collect::<Option<Vec<_>>>()
                .map(IndexKey::Array),
            _ => None,
        }
    }

    /// NaN and infinities are not valid keys, at any depth.
    pub fn is_valid(&self) -> bool {
        match self {
            IndexKey::Number(n) => n.is_finite(),
            IndexKey::String(_) => true,
            IndexKey::Array(items) => items.iter().all(IndexKey::is_valid),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IndexKey::Number(_) => 0,
            IndexKey::String(_) => 1,
            IndexKey::Array(_) => 2,
        }
    }
}

/// -0.0 and 0.0 are the same key, however the number was built.
fn zero(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Number(a), IndexKey::Number(b)) => zero(*a).total_cmp(&zero(*b)),
            (IndexKey::String(a), IndexKey::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (IndexKey::Array(a), IndexKey::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for IndexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            IndexKey::Number(n) => zero(*n).to_bits().hash(state),
            IndexKey::String(s) => s.hash(state),
            IndexKey::Array(items) => items.hash(state),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Number(n) => write!(f, "{}", n),
            IndexKey::String(s) => write!(f, "{:?}", s),
            IndexKey::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<f64> for IndexKey {
    fn from(n: f64) -> Self {
        IndexKey::Number(zero(n))
    }
}

impl From<i32> for IndexKey {
    fn from(n: i32) -> Self {
        IndexKey::from(f64::from(n))
    }
}

impl From<i64> for IndexKey {
    fn from(n: i64) -> Self {
        IndexKey::from(n as f64)
    }
}

impl From<u32> for IndexKey {
    fn from(n: u32) -> Self {
        IndexKey::from(f64::from(n))
    }
}

impl From<u64> for IndexKey {
    fn from(n: u64) -> Self {
        IndexKey::from(n as f64)
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        IndexKey::String(s.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(s: String) -> Self {
        IndexKey::String(s)
    }
}

impl From<Vec<IndexKey>> for IndexKey {
    fn from(items: Vec<IndexKey>) -> Self {
        IndexKey::Array(items)
    }
}

/// Why a bound could not be turned into a range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyRangeError {
    #[error("{0} is not a valid key")]
    InvalidKey(String),
    #[error("lower bound {lower} is above upper bound {upper}")]
    Inverted { lower: String, upper: String },
    #[error("bound {0} with equal endpoints cannot be open")]
    EmptyOpen(String),
}

/// A contiguous interval of index keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<IndexKey>,
    upper: Bound<IndexKey>,
}

impl KeyRange {
    /// Every key.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key.
    pub fn only(key: IndexKey) -> Result<Self, KeyRangeError> {
        Self::bound(key.clone(), key, false, false)
    }

    /// Keys above `key`, unbounded above.
    pub fn lower_bound(key: IndexKey, open: bool) -> Result<Self, KeyRangeError> {
        Ok(Self {
            lower: edge(key, open)?,
            upper: Bound::Unbounded,
        })
    }

    /// Keys below `key`, unbounded below.
    pub fn upper_bound(key: IndexKey, open: bool) -> Result<Self, KeyRangeError> {
        Ok(Self {
            lower: Bound::Unbounded,
            upper: edge(key, open)?,
        })
    }

    /// Keys between `lower` and `upper`. Fails when the interval is inverted,
    /// or when the endpoints are equal and either side is open.
    pub fn bound(
        lower: IndexKey,
        upper: IndexKey,
        lower_open: bool,
        upper_open: bool,
    ) -> Result<Self, KeyRangeError> {
        match lower.cmp(&upper) {
            Ordering::Greater => {
                return Err(KeyRangeError::Inverted {
                    lower: lower.to_string(),
                    upper: upper.to_string(),
                })
            }
            Ordering::Equal if lower_open || upper_open => {
                return Err(KeyRangeError::EmptyOpen(lower.to_string()))
            }
            _ => {}
        }
        Ok(Self {
            lower: edge(lower, lower_open)?,
            upper: edge(upper, upper_open)?,
        })
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        let above = match &self.lower {
            Bound::Included(lower) => key >= lower,
            Bound::Excluded(lower) => key > lower,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(upper) => key <= upper,
            Bound::Excluded(upper) => key < upper,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Bounds in the shape `BTreeMap::range` takes.
    pub fn as_bounds(&self) -> (Bound<&IndexKey>, Bound<&IndexKey>) {
        (self.lower.as_ref(), self.upper.as_ref())
    }
}

fn edge(key: IndexKey, open: bool) -> Result<Bound<IndexKey>, KeyRangeError> {
    if !key.is_valid() {
        return Err(KeyRangeError::InvalidKey(key.to_string()));
    }
    Ok(if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    })
}
