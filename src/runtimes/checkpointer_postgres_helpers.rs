//! JSON (de)serialization helpers shared by the Postgres checkpointer.
//!
//! JSONB columns round-trip through `serde_json::Value` directly (sqlx's
//! `json` feature maps them natively), so only the write path needs an
//! explicit `to_string` — the resulting text is bound and cast with
//! `::jsonb` in the query itself.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::runtimes::checkpointer::{CheckpointerError, Result};

pub(crate) fn serialize_json<T: Serialize>(value: &T, field: &'static str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CheckpointerError::Other {
        message: format!("serialize {field}: {e}"),
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

pub(crate) fn require_json_field<T>(value: Option<T>, field: &'static str) -> Result<T> {
    value.ok_or_else(|| CheckpointerError::Other {
        message: format!("missing persisted field: {field}"),
    })
}
