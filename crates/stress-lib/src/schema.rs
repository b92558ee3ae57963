//! Feature schema bound to a loaded classifier
//!
//! The schema is the single source of truth for feature column order. It is
//! built once when a classifier is loaded and never changes afterwards, so
//! clones share the same column list.

use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Column order used when a classifier ships without an explicit schema:
/// raw sensor fields, then year, month, day, hour, day-of-week.
pub const DEFAULT_COLUMNS: [&str; 11] = [
    "X",
    "Y",
    "Z",
    "EDA",
    "HR",
    "TEMP",
    "datetime_year",
    "datetime_month",
    "datetime_day",
    "datetime_hour",
    "datetime_dow",
];

/// Ordered list of feature names a classifier expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    columns: Arc<[String]>,
}

impl SchemaRegistry {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

impl Serialize for SchemaRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.columns.iter())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMNS)
    }
}
