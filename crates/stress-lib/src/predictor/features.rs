//! Feature encoding for classifier inference
//!
//! Turns one sensor reading into the feature vector a classifier was trained
//! on: the six raw sensor values plus calendar features derived from the
//! reading's timestamp. Output order always follows the schema's column list,
//! never the iteration order of the intermediate lookup table.

use crate::error::EncodeError;
use crate::models::{SensorReading, RAW_FIELDS};
use crate::schema::SchemaRegistry;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Layouts tried, in order, when parsing a reading's timestamp
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Calendar features derived from a timestamp. Short aliases are accepted so
/// schemas may name them either way.
const DERIVED_ALIASES: [(&str, &str); 5] = [
    ("datetime_year", "year"),
    ("datetime_month", "month"),
    ("datetime_day", "day"),
    ("datetime_hour", "hour"),
    ("datetime_dow", "dow"),
];

/// Schema-ordered numeric input for one classifier call
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: SchemaRegistry,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn columns(&self) -> &[String] {
        self.schema.columns()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.position(name).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.schema
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Stateless encoder from sensor readings to feature vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a reading in the column order of `schema`.
    ///
    /// Fails with [`EncodeError::InvalidTimestamp`] when the reading's
    /// datetime cannot be parsed and [`EncodeError::MissingField`] for the
    /// first schema column that has no value.
    pub fn encode(
        &self,
        reading: &SensorReading,
        schema: &SchemaRegistry,
    ) -> Result<FeatureVector, EncodeError> {
        let timestamp = parse_timestamp(&reading.datetime)?;
        let mut available: HashMap<&str, f64> = reading.raw_fields().into_iter().collect();
        insert_derived(&mut available, &timestamp);
        walk_schema(&available, schema)
    }

    /// Encode a loosely typed reading such as a request body or CSV row.
    ///
    /// Values are coerced to `f64`; a schema column whose source field is
    /// absent fails with [`EncodeError::MissingField`] naming that column.
    pub fn encode_raw(
        &self,
        raw: &Map<String, Value>,
        schema: &SchemaRegistry,
    ) -> Result<FeatureVector, EncodeError> {
        let mut available: HashMap<&str, f64> = HashMap::with_capacity(RAW_FIELDS.len() + 6);
        for field in RAW_FIELDS {
            if let Some(value) = raw.get(field) {
                available.insert(field, coerce_f64(field, value)?);
            }
        }
        if let Some(datetime) = raw.get("datetime") {
            let text = match datetime {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            insert_derived(&mut available, &parse_timestamp(&text)?);
        }
        walk_schema(&available, schema)
    }
}

/// Look up every schema column, in schema order
fn walk_schema(
    available: &HashMap<&str, f64>,
    schema: &SchemaRegistry,
) -> Result<FeatureVector, EncodeError> {
    let values = schema
        .columns()
        .iter()
        .map(|column| {
            available
                .get(column.as_str())
                .copied()
                .ok_or_else(|| EncodeError::MissingField(column.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeatureVector {
        schema: schema.clone(),
        values,
    })
}

/// Add calendar features (and their aliases) derived from `timestamp`
fn insert_derived(table: &mut HashMap<&str, f64>, timestamp: &NaiveDateTime) {
    let derived = [
        f64::from(timestamp.year()),
        f64::from(timestamp.month()),
        f64::from(timestamp.day()),
        f64::from(timestamp.hour()),
        f64::from(timestamp.weekday().num_days_from_monday()),
    ];

    for ((name, alias), value) in DERIVED_ALIASES.iter().zip(derived) {
        table.insert(*name, value);
        table.insert(*alias, value);
    }
    table.insert("day_of_week", derived[4]);
}

/// Coerce a JSON value to a float the way the request layer accepts numbers:
/// JSON numbers and numeric strings
pub fn coerce_f64(field: &str, value: &Value) -> Result<f64, EncodeError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| EncodeError::TypeCoercion {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Parse a reading timestamp ("YYYY-MM-DD HH:MM:SS" with optional fraction,
/// ISO `T` separator, RFC 3339 offset or a bare date)
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, EncodeError> {
    let trimmed = raw.trim();

    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_local());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| EncodeError::InvalidTimestamp(raw.to_string()))
}
