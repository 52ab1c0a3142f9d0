//! Range query descriptors for secondary-index scans.

use serde::{Deserialize, Serialize};

use crate::key::{IndexKey, KeyRange, KeyRangeError};

/// A scan over one secondary index.
///
/// Two descriptors are the same query when every field is equal, bounds
/// compared deeply; range views are memoized on that equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<IndexKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<IndexKey>,
    #[serde(default)]
    pub lower_open: bool,
    #[serde(default)]
    pub upper_open: bool,
    /// Reverse the ascending result after it is fully read.
    #[serde(default)]
    pub reverse: bool,
}

impl RangeQuery {
    /// A full scan of `index` in ascending order.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            lower: None,
            upper: None,
            lower_open: false,
            upper_open: false,
            reverse: false,
        }
    }

    /// Only keys equal to `key`.
    pub fn only(index: impl Into<String>, key: impl Into<IndexKey>) -> Self {
        let key = key.into();
        Self::new(index).lower(key.clone()).upper(key)
    }

    pub fn lower(mut self, key: impl Into<IndexKey>) -> Self {
        self.lower = Some(key.into());
        self
    }

    pub fn upper(mut self, key: impl Into<IndexKey>) -> Self {
        self.upper = Some(key.into());
        self
    }

    pub fn lower_open(mut self) -> Self {
        self.lower_open = true;
        self
    }

    pub fn upper_open(mut self) -> Self {
        self.upper_open = true;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Both bounds give a closed, half-open or open interval; one bound
    /// leaves the other side unbounded; no bounds scan the whole index.
    pub fn key_range(&self) -> Result<KeyRange, KeyRangeError> {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => KeyRange::bound(
                lower.clone(),
                upper.clone(),
                self.lower_open,
                self.upper_open,
            ),
            (Some(lower), None) => KeyRange::lower_bound(lower.clone(), self.lower_open),
            (None, Some(upper)) => KeyRange::upper_bound(upper.clone(), self.upper_open),
            (None, None) => Ok(KeyRange::all()),
        }
    }
}
