//! JSON (de)serialization helpers shared by the SQLite checkpointer.
//!
//! SQLite stores checkpoint payloads as TEXT columns, so these helpers work
//! with `String` directly rather than `serde_json::Value` (contrast with
//! `checkpointer_postgres_helpers`, whose JSONB columns round-trip through
//! `Value`).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::runtimes::checkpointer::{CheckpointerError, Result};

pub(crate) fn serialize_json<T: Serialize>(value: &T, field: &'static str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CheckpointerError::Other {
        message: format!("serialize {field}: {e}"),
    })
}

pub(crate) fn deserialize_json<T: DeserializeOwned>(raw: &str, field: &'static str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| CheckpointerError::Other {
        message: format!("deserialize {field}: {e}"),
    })
}

pub(crate) fn deserialize_json_value<T: DeserializeOwned>(
    value: Value,
    field: &'static str,
) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CheckpointerError::Other {
        message: format!("deserialize {field}: {e}"),
    })
}

pub(crate) fn require_json_field(value: Option<String>, field: &'static str) -> Result<String> {
    value.ok_or_else(|| CheckpointerError::Other {
        message: format!("missing persisted field: {field}"),
    })
}
