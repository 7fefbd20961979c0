//! The actions that can appear in a commit log, and their newline-delimited JSON wire codec.
//!
//! Each line of a commit file is a JSON object with exactly one top-level key naming the action
//! variant (`metaData`, `protocol`, `add`, `remove`, `commitInfo`). Records with a single
//! unrecognized key are tolerated and skipped so that logs written by newer writers remain
//! readable; records with zero or multiple variant keys are malformed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::StructType;
use crate::utils::require;
use crate::{DeltaResult, Error};

pub(crate) mod checkpoint;

/// Specification of the encoding for the files stored in the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    /// Name of the encoding for files in this table
    pub provider: String,
    /// A map containing configuration options for the format
    #[serde(default)]
    pub options: HashMap<String, Option<String>>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            provider: String::from("parquet"),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique identifier for this table
    pub id: Uuid,
    /// User-provided identifier for this table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// User-provided description for this table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Specification of the encoding for the files stored in the table
    #[serde(default)]
    pub format: Format,
    /// Schema of the table, as a JSON string parseable by [`crate::schema::parse_schema`]
    pub schema_string: String,
    /// Column names by which the data should be partitioned
    #[serde(default)]
    pub partition_columns: Vec<String>,
    /// The time when this metadata action was created, in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
    /// Configuration options for the table
    #[serde(default)]
    pub configuration: HashMap<String, Option<String>>,
}

impl Metadata {
    /// Parse [`Self::schema_string`] into a typed schema tree.
    pub fn parse_schema(&self) -> DeltaResult<StructType> {
        crate::schema::parse_schema(&self.schema_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// The minimum version of the read protocol that a client must implement
    /// in order to correctly read this table
    pub min_reader_version: i32,
    /// The minimum version of the write protocol that a client must implement
    /// in order to correctly write this table
    pub min_writer_version: i32,
}

impl Default for Protocol {
    fn default() -> Self {
        // The protocol versions this reader implements
        Self {
            min_reader_version: 1,
            min_writer_version: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Add {
    /// A relative path to a data file from the root of the table, or an absolute path to a file
    /// that should be added to the table. The path is a URI: it must be decoded before use as a
    /// file system location, and two spellings of one URI name the same file.
    pub path: String,

    /// A map from partition column to value for this logical file. Present on the wire even when
    /// the table is unpartitioned.
    #[serde(default)]
    pub partition_values: HashMap<String, Option<String>>,

    /// The size of this data file in bytes
    pub size: i64,

    /// The time this logical file was created, as milliseconds since the epoch
    pub modification_time: i64,

    /// When `false` the logical file must already be present in the table or the records in the
    /// added file must be contained in one or more remove actions in the same version
    pub data_change: bool,

    /// Contains statistics (e.g., count, min/max values for columns) about the data in this
    /// logical file, as a raw JSON document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<String>,

    /// Map containing metadata about this logical file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remove {
    /// A path to the removed file, with the same URI semantics as [`Add::path`]
    pub path: String,

    /// The time the deletion occurred, as milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<i64>,

    /// When `false` the records in the removed file must be contained in one or more add actions
    /// in the same version
    #[serde(default = "default_true")]
    pub data_change: bool,
}

fn default_true() -> bool {
    true
}

/// Information about the job that made a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: String,
    pub job_name: String,
    pub run_id: String,
    pub job_owner_id: String,
    pub trigger_type: String,
}

/// Information about the notebook that made a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookInfo {
    pub notebook_id: String,
}

/// Provenance information about what higher-level operation produced a commit. Ignored during
/// replay; surfaced to callers that inspect the log directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    /// The version the commit created. Writers are not required to record it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Wall-clock time of the commit, an ISO-8601 millisecond-precision string on the wire
    #[serde(with = "serde_iso_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Name of the operation that produced the commit, e.g. `WRITE`
    pub operation: String,
    /// Parameters of the operation. Values are pre-serialized JSON text and pass through this
    /// codec byte-for-byte: they are never re-parsed and re-emitted.
    #[serde(
        default,
        skip_serializing_if = "HashMap::is_empty",
        with = "serde_raw_json_map"
    )]
    pub operation_parameters: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook: Option<NotebookInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// The table version the transaction read before committing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blind_append: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_metrics: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_info: Option<String>,
}

/// ISO-8601 with millisecond precision, always in UTC on the wire.
mod serde_iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        timestamp: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let value = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A map whose values are opaque, already-serialized JSON. Values are written raw (no
/// re-quoting) and kept in their raw string form on decode, so whitespace and number formatting
/// survive a round trip untouched.
mod serde_raw_json_map {
    use std::collections::HashMap;

    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::value::RawValue;

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            let raw = RawValue::from_string(value.clone()).map_err(serde::ser::Error::custom)?;
            out.serialize_entry(key, &raw)?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, String>, D::Error> {
        let raw: HashMap<String, Box<RawValue>> = HashMap::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(key, value)| (key, value.get().to_string()))
            .collect())
    }
}

/// A single record in a commit log describing a change to the table's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    #[serde(rename = "metaData")]
    Metadata(Metadata),
    #[serde(rename = "protocol")]
    Protocol(Protocol),
    #[serde(rename = "add")]
    Add(Add),
    #[serde(rename = "remove")]
    Remove(Remove),
    #[serde(rename = "commitInfo")]
    CommitInfo(CommitInfo),
}

impl Action {
    /// Decode one line of a commit file.
    ///
    /// Returns `Ok(None)` for a record whose single top-level key is not a known action: such
    /// records are skipped by replay so that logs written by newer writers remain readable.
    pub fn from_json(line: &str) -> DeltaResult<Option<Self>> {
        // Split the record into its single variant key and a raw payload slice. Keeping the
        // payload as raw text (rather than a parsed value tree) is what lets pre-serialized
        // fields like operationParameters pass through byte-for-byte.
        let record: HashMap<String, &serde_json::value::RawValue> =
            match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) if err.classify() == serde_json::error::Category::Data => {
                return Err(Error::invalid_action("expected a JSON object"));
            }
            Err(err) => return Err(err.into()),
        };
        require!(
            record.len() == 1,
            Error::invalid_action(format!(
                "expected exactly one action key per record, found {}",
                record.len()
            ))
        );
        let Some((key, payload)) = record.into_iter().next() else {
            return Err(Error::invalid_action("empty action record"));
        };
        let payload = payload.get();
        let bad_payload =
            |err: serde_json::Error| Error::invalid_action(format!("malformed {key}: {err}"));
        let action = match key.as_str() {
            "metaData" => Action::Metadata(serde_json::from_str(payload).map_err(bad_payload)?),
            "protocol" => Action::Protocol(serde_json::from_str(payload).map_err(bad_payload)?),
            "add" => {
                let add: Add = serde_json::from_str(payload).map_err(bad_payload)?;
                require!(
                    !add.path.is_empty(),
                    Error::invalid_action("add action with empty path")
                );
                Action::Add(add)
            }
            "remove" => {
                let remove: Remove = serde_json::from_str(payload).map_err(bad_payload)?;
                require!(
                    !remove.path.is_empty(),
                    Error::invalid_action("remove action with empty path")
                );
                Action::Remove(remove)
            }
            "commitInfo" => {
                Action::CommitInfo(serde_json::from_str(payload).map_err(bad_payload)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    /// Encode this action as a single commit-file line (without the trailing newline).
    pub fn to_json(&self) -> DeltaResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
