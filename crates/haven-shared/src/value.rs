//! Attribute values.
//!
//! Every attribute is stored as a single text column. The owning field's
//! [`DatabaseType`] says how that text is read back; decoding happens lazily
//! when a value is projected, never at write time.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::DomainError;
use crate::field::DatabaseType;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Date(NaiveDate),
    Boolean(bool),
    /// Composite values (multi-select answers and the like) that were
    /// JSON-encoded before storage.
    Json(serde_json::Value),
}

impl AttributeValue {
    /// Lenient decode used on the read path. Text that does not match the
    /// declared type is returned verbatim instead of failing the projection.
    pub fn decode(database_type: DatabaseType, raw: &str) -> Self {
        Self::parse(database_type, raw).unwrap_or_else(|_| Self::Text(raw.to_string()))
    }

    /// Strict decode used to check incoming values before they are stored.
    pub fn parse(database_type: DatabaseType, raw: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidValue {
            database_type: database_type.as_str(),
            value: raw.to_string(),
        };
        let trimmed = raw.trim();

        match database_type {
            DatabaseType::String | DatabaseType::Text => {
                if looks_like_json(trimmed) {
                    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
                        return Ok(Self::Json(json));
                    }
                }
                Ok(Self::Text(raw.to_string()))
            }
            DatabaseType::Integer => trimmed.parse().map(Self::Integer).map_err(|_| invalid()),
            DatabaseType::Date => {
                // Accept full timestamps too; only the calendar day is kept.
                let day = trimmed.get(..10).unwrap_or(trimmed);
                NaiveDate::parse_from_str(day, DATE_FORMAT)
                    .map(Self::Date)
                    .map_err(|_| invalid())
            }
            DatabaseType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Ok(Self::Boolean(true)),
                "0" | "false" | "off" | "no" => Ok(Self::Boolean(false)),
                _ => Err(invalid()),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Json(v) => v.clone(),
        }
    }
}

fn looks_like_json(s: &str) -> bool {
    (s.starts_with('[') && s.ends_with(']')) || (s.starts_with('{') && s.ends_with('}'))
}

/// `true` when a stored or incoming value counts as "no value".
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Turn an incoming JSON value into the text stored in the pivot row.
///
/// Returns `None` for null, blank strings and empty collections: those mean
/// "no value" and are never stored. `false` and `0` are values and are kept
/// as `"0"`. Arrays and objects are JSON-encoded.
pub fn encode_incoming(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if is_blank(s) => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Array(items) if items.is_empty() => None,
        serde_json::Value::Object(map) if map.is_empty() => None,
        composite => Some(composite.to_string()),
    }
}
