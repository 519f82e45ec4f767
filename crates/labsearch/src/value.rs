//! Typed values, primary keys and raw string conversion.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The declared type of a term's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Free text.
    #[default]
    String,
    /// Decimal rounded to two places.
    Decimal,
    /// Signed 64-bit integer.
    Long,
    /// Calendar date with implied midnight.
    Date,
    /// Date and time of day.
    DateTime,
    /// True or false.
    Boolean,
}

impl ValueType {
    /// Human readable name used in validation messages.
    pub fn describe(&self) -> &'static str {
        match self {
            ValueType::String => "text",
            ValueType::Decimal => "a decimal number",
            ValueType::Long => "a whole number",
            ValueType::Date => "a date (MM/dd/yyyy or yyyy-MM-dd)",
            ValueType::DateTime => "a date and time",
            ValueType::Boolean => "true or false",
        }
    }
}

/// A typed scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Long(i64),
    /// Decimal value.
    Decimal(f64),
    /// Date and time value.
    DateTime(NaiveDateTime),
    /// Date value.
    Date(NaiveDate),
    /// Text value.
    String(String),
}

impl Value {
    /// Returns the value as a date-time, treating dates as midnight.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            _ => None,
        }
    }

    /// Returns the value as text when it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for date and date-time values.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Value::Date(_) | Value::DateTime(_))
    }

    /// Compares two values of compatible types.
    ///
    /// Numbers compare across `Long`/`Decimal`, dates across `Date`/`DateTime`.
    /// Incompatible types yield `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Decimal(b)) => (*a as f64).partial_cmp(b),
            (Value::Decimal(a), Value::Long(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (a, b) if a.is_temporal() && b.is_temporal() => {
                Some(a.as_datetime()?.cmp(&b.as_datetime()?))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Long(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{:.2}", d),
            Value::DateTime(dt) => write!(f, "'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Date(d) => write!(f, "'{}'", d.format("%Y-%m-%d")),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

/// The native type of a result entity's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Numeric surrogate keys.
    #[default]
    Long,
    /// Text keys.
    String,
}

/// A primary key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric key.
    Long(i64),
    /// Text key.
    String(String),
}

impl EntityId {
    /// Returns the key type of this id.
    pub fn key_type(&self) -> KeyType {
        match self {
            EntityId::Long(_) => KeyType::Long,
            EntityId::String(_) => KeyType::String,
        }
    }

    /// Converts the id to a comparable value.
    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Long(n) => Value::Long(*n),
            EntityId::String(s) => Value::String(s.clone()),
        }
    }

    /// Builds an id from a value, if the value can be a key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Long(n) => Some(EntityId::Long(*n)),
            Value::String(s) => Some(EntityId::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Long(n) => write!(f, "{}", n),
            EntityId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Long(n)
    }
}

impl From<i32> for EntityId {
    fn from(n: i32) -> Self {
        EntityId::Long(i64::from(n))
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::String(s.to_string())
    }
}

/// The outcome of converting one raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertedValue {
    /// A single typed value.
    Single(Value),
    /// A list of values, compiled as an IN predicate.
    List(Vec<Value>),
    /// The choice means "do not filter"; no predicate is emitted.
    Drop,
}

const DATE_FORMATS: [&str; 2] = ["%m/%d/%Y", "%Y-%m-%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parses a date in `MM/dd/yyyy` or `yyyy-MM-dd` form.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_date(raw).map(|d| d.and_time(NaiveTime::MIN)))
}

/// Converts a raw user string to a value of the given type.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidValue`] if the text does not parse.
pub fn convert_raw(term: &str, raw: &str, value_type: ValueType) -> Result<Value, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        term: term.to_string(),
        value: raw.to_string(),
        expected: value_type.describe().to_string(),
    };
    let trimmed = raw.trim();

    match value_type {
        ValueType::String => Ok(Value::String(raw.to_string())),
        ValueType::Long => trimmed.parse::<i64>().map(Value::Long).map_err(|_| invalid()),
        ValueType::Decimal => trimmed
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite())
            .map(|d| Value::Decimal((d * 100.0).round() / 100.0))
            .ok_or_else(invalid),
        ValueType::Date => parse_date(trimmed).map(Value::Date).ok_or_else(invalid),
        ValueType::DateTime => parse_datetime(trimmed)
            .map(Value::DateTime)
            .ok_or_else(invalid),
        ValueType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(Value::Boolean(true)),
            "false" | "no" | "n" => Ok(Value::Boolean(false)),
            _ => Err(invalid()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_convert_date_formats() {
        assert_eq!(
            convert_raw("Date", "03/01/2024", ValueType::Date).unwrap(),
            Value::Date(date(2024, 3, 1))
        );
        assert_eq!(
            convert_raw("Date", "2024-03-01", ValueType::Date).unwrap(),
            Value::Date(date(2024, 3, 1))
        );
    }

    #[test]
    fn test_convert_datetime_falls_back_to_date() {
        let value = convert_raw("When", "2024-03-01", ValueType::DateTime).unwrap();
        assert_eq!(
            value,
            Value::DateTime(date(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_convert_long_rejects_text() {
        let err = convert_raw("Count", "abc", ValueType::Long).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    #[test]
    fn test_convert_decimal_rounds_two_places() {
        assert_eq!(
            convert_raw("Conc", "1.23456", ValueType::Decimal).unwrap(),
            Value::Decimal(1.23)
        );
    }

    #[test]
    fn test_convert_boolean_variants() {
        assert_eq!(
            convert_raw("Flag", "Yes", ValueType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            convert_raw("Flag", "n", ValueType::Boolean).unwrap(),
            Value::Boolean(false)
        );
        assert!(convert_raw("Flag", "maybe", ValueType::Boolean).is_err());
    }

    #[test]
    fn test_string_keeps_raw_text() {
        assert_eq!(
            convert_raw("Name", " SM-1 ", ValueType::String).unwrap(),
            Value::String(" SM-1 ".to_string())
        );
    }

    #[test]
    fn test_compare_mixed_numbers_and_dates() {
        assert_eq!(
            Value::Long(2).compare(&Value::Decimal(1.5)),
            Some(Ordering::Greater)
        );
        let d = Value::Date(date(2024, 3, 1));
        let dt = Value::DateTime(date(2024, 3, 1).and_hms_opt(12, 0, 0).unwrap());
        assert_eq!(d.compare(&dt), Some(Ordering::Less));
        assert_eq!(Value::from("a").compare(&Value::Long(1)), None);
    }

    #[test]
    fn test_value_display_escapes_quotes() {
        assert_eq!(Value::from("O'Brien").to_string(), "'O''Brien'");
        assert_eq!(Value::Decimal(2.5).to_string(), "2.50");
    }

    #[test]
    fn test_entity_id_round_trip_through_value() {
        let id = EntityId::Long(42);
        assert_eq!(EntityId::from_value(&id.to_value()), Some(id));
        assert_eq!(EntityId::from_value(&Value::Boolean(true)), None);
    }
}
