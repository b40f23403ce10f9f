// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured form of a log file and the record handed to the sink.
//!
//! A file holds one JSON object:
//!
//! ```json
//! {"severity": "INFO", "message": "hi", "jsonPayload": {"a": 1}, "labels": {"env": "prod"}}
//! ```
//!
//! Every field is optional. `severity` accepts a case-insensitive name or a
//! numeric code; anything unrecognised maps to [`Severity::Default`].

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ParseError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Severity {
    #[default]
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    const ALL: [Severity; 9] = [
        Severity::Default,
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Alert,
        Severity::Emergency,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }

    /// Numeric code used by the logging backend, in steps of 100.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Severity::Default => 0,
            Severity::Debug => 100,
            Severity::Info => 200,
            Severity::Notice => 300,
            Severity::Warning => 400,
            Severity::Error => 500,
            Severity::Critical => 600,
            Severity::Alert => 700,
            Severity::Emergency => 800,
        }
    }

    /// Case-insensitive lookup by name. Unknown names are `Default`.
    #[must_use]
    pub fn from_name(name: &str) -> Severity {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }

    /// Lookup by numeric code. Unknown codes are `Default`.
    #[must_use]
    pub fn from_code(code: i64) -> Severity {
        Self::ALL
            .into_iter()
            .find(|severity| severity.code() == code)
            .unwrap_or_default()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeverityVisitor;

        impl Visitor<'_> for SeverityVisitor {
            type Value = Severity;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a severity name or numeric code")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Severity, E> {
                Ok(Severity::from_name(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Severity, E> {
                Ok(Severity::from_code(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Severity, E> {
                Ok(i64::try_from(value).map_or(Severity::Default, Severity::from_code))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Severity, E> {
                Ok(Severity::Default)
            }
        }

        deserializer.deserialize_any(SeverityVisitor)
    }
}

/// Parsed contents of one log file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LogEntryPayload {
    #[serde(default)]
    pub severity: Severity,
    /// Informational only; not forwarded to the sink.
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(rename = "jsonPayload", default, deserialize_with = "null_as_default")]
    pub json_payload: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl LogEntryPayload {
    /// Parses a whole file. The top-level value must be a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(bytes).map_err(ParseError::Json)?;
        let kind = match &value {
            Value::Object(_) => None,
            Value::Null => Some("null"),
            Value::Bool(_) => Some("a boolean"),
            Value::Number(_) => Some("a number"),
            Value::String(_) => Some("a string"),
            Value::Array(_) => Some("an array"),
        };
        if let Some(kind) = kind {
            return Err(ParseError::NotAnObject(kind));
        }
        serde_json::from_value(value).map_err(ParseError::Schema)
    }

    #[must_use]
    pub fn into_record(self) -> DeliveryRecord {
        DeliveryRecord {
            severity: self.severity,
            payload: self.json_payload,
            labels: self.labels,
        }
    }
}

/// What the sink receives for one file.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeliveryRecord {
    pub severity: Severity,
    #[serde(rename = "jsonPayload")]
    pub payload: Map<String, Value>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}
