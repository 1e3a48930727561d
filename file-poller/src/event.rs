//! Detection records emitted for matched files.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{PollerError, Result};
use crate::scanner::FileEntry;

/// A matched file, observed during one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Unique, time-ordered identifier.
    #[serde(rename = "MessageID")]
    pub message_id: String,

    /// Full path of the file.
    #[serde(rename = "Filepath")]
    pub filepath: PathBuf,

    /// Base name of the file.
    #[serde(rename = "Filename")]
    pub filename: String,

    /// File modification time (unix seconds).
    #[serde(rename = "ModifiedTime")]
    pub modified_time: i64,

    /// When the poll cycle evaluated the file (unix seconds).
    #[serde(rename = "CheckTime")]
    pub check_time: i64,
}

impl DetectionRecord {
    /// Build a record for a scanned entry with a fresh message id.
    pub fn new(entry: &FileEntry, checked_at: DateTime<Utc>) -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            filepath: entry.path.clone(),
            filename: entry.name.clone(),
            modified_time: entry.modified.timestamp(),
            check_time: checked_at.timestamp(),
        }
    }

    /// File modification time.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.modified_time, 0)
    }

    /// Detection time.
    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.check_time, 0)
    }

    /// Encode as a JSON object keyed by the wire field names.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("MessageID".into(), Value::from(self.message_id.as_str()));
        map.insert(
            "Filepath".into(),
            Value::from(self.filepath.to_string_lossy().into_owned()),
        );
        map.insert("Filename".into(), Value::from(self.filename.as_str()));
        map.insert("ModifiedTime".into(), Value::from(self.modified_time));
        map.insert("CheckTime".into(), Value::from(self.check_time));
        Value::Object(map)
    }

    /// Decode from a JSON object, coercing loosely typed fields.
    ///
    /// Timestamps may arrive as integers, floats, or numeric strings.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| PollerError::Decode("detection record must be an object".into()))?;

        Ok(Self {
            message_id: coerce_string(map, "MessageID")?,
            filepath: PathBuf::from(coerce_string(map, "Filepath")?),
            filename: coerce_string(map, "Filename")?,
            modified_time: coerce_i64(map, "ModifiedTime")?,
            check_time: coerce_i64(map, "CheckTime")?,
        })
    }
}

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    map.get(key)
        .ok_or_else(|| PollerError::Decode(format!("missing field `{key}`")))
}

fn coerce_string(map: &Map<String, Value>, key: &str) -> Result<String> {
    match field(map, key)? {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other @ (Value::Number(_) | Value::Bool(_)) => Ok(other.to_string()),
        _ => Err(PollerError::Decode(format!("field `{key}` is not a string"))),
    }
}

fn coerce_i64(map: &Map<String, Value>, key: &str) -> Result<i64> {
    let value = field(map, key)?;
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Null => Some(0),
        _ => None,
    };
    parsed.ok_or_else(|| PollerError::Decode(format!("field `{key}` is not an integer: {value}")))
}
