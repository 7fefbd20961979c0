//! Decodes actions out of checkpoint batches.
//!
//! A checkpoint file stores the same actions as the JSON commits, but in columnar form: one
//! top-level struct column per action variant, with exactly one variant non-null per row.
//! Unknown columns (`txn`, `commitInfo`, sidecar bookkeeping, ...) are ignored, matching the
//! unknown-key tolerance of the JSON codec.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use arrow_array::{
    Array, ArrayRef, BooleanArray, Int32Array, Int64Array, ListArray, MapArray, RecordBatch,
    StringArray, StructArray,
};
use uuid::Uuid;

use super::{Action, Add, Format, Metadata, Protocol, Remove};
use crate::schema::{ArrayType, DataType, MapType, SchemaRef, StructField, StructType};
use crate::{DeltaResult, Error};

/// The top-level columns a checkpoint is read with. Nested shapes mirror the wire form of the
/// corresponding JSON payloads.
pub(crate) static CHECKPOINT_READ_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    let string_map = || MapType::new(DataType::STRING, DataType::STRING, true);
    let add = StructType::new([
        StructField::new("path", DataType::STRING, false),
        StructField::new("partitionValues", string_map(), true),
        StructField::new("size", DataType::LONG, false),
        StructField::new("modificationTime", DataType::LONG, false),
        StructField::new("dataChange", DataType::BOOLEAN, false),
        StructField::new("stats", DataType::STRING, true),
        StructField::new("tags", string_map(), true),
    ]);
    let remove = StructType::new([
        StructField::new("path", DataType::STRING, false),
        StructField::new("deletionTimestamp", DataType::LONG, true),
        StructField::new("dataChange", DataType::BOOLEAN, true),
    ]);
    let format = StructType::new([
        StructField::new("provider", DataType::STRING, false),
        StructField::new("options", string_map(), true),
    ]);
    let metadata = StructType::new([
        StructField::new("id", DataType::STRING, false),
        StructField::new("name", DataType::STRING, true),
        StructField::new("description", DataType::STRING, true),
        StructField::new("format", format, true),
        StructField::new("schemaString", DataType::STRING, false),
        StructField::new(
            "partitionColumns",
            ArrayType::new(DataType::STRING, false),
            true,
        ),
        StructField::new("configuration", string_map(), true),
        StructField::new("createdTime", DataType::LONG, true),
    ]);
    let protocol = StructType::new([
        StructField::new("minReaderVersion", DataType::INTEGER, false),
        StructField::new("minWriterVersion", DataType::INTEGER, false),
    ]);
    Arc::new(StructType::new([
        StructField::new("add", add, true),
        StructField::new("remove", remove, true),
        StructField::new("metaData", metadata, true),
        StructField::new("protocol", protocol, true),
    ]))
});

/// Extract every recognized action from one checkpoint batch.
pub(crate) fn parse_checkpoint_batch(batch: &RecordBatch) -> DeltaResult<Vec<Action>> {
    let mut actions = Vec::new();
    if let Some(column) = batch.column_by_name("metaData") {
        let array = as_struct(column, "metaData")?;
        for row in 0..array.len() {
            if array.is_valid(row) {
                actions.push(Action::Metadata(parse_metadata_row(array, row)?));
            }
        }
    }
    if let Some(column) = batch.column_by_name("protocol") {
        let array = as_struct(column, "protocol")?;
        for row in 0..array.len() {
            if array.is_valid(row) {
                actions.push(Action::Protocol(parse_protocol_row(array, row)?));
            }
        }
    }
    if let Some(column) = batch.column_by_name("add") {
        let array = as_struct(column, "add")?;
        for row in 0..array.len() {
            if array.is_valid(row) {
                actions.push(Action::Add(parse_add_row(array, row)?));
            }
        }
    }
    if let Some(column) = batch.column_by_name("remove") {
        let array = as_struct(column, "remove")?;
        for row in 0..array.len() {
            if array.is_valid(row) {
                actions.push(Action::Remove(parse_remove_row(array, row)?));
            }
        }
    }
    Ok(actions)
}

fn parse_add_row(array: &StructArray, row: usize) -> DeltaResult<Add> {
    let path = required_string(child::<StringArray>(array, "add", "path")?, row, "add.path")?;
    let partition_values = match opt_child::<MapArray>(array, "partitionValues") {
        Some(map) if map.is_valid(row) => map_value(map, row, "add.partitionValues")?,
        _ => HashMap::new(),
    };
    let size = required_i64(child::<Int64Array>(array, "add", "size")?, row, "add.size")?;
    let modification_time = required_i64(
        child::<Int64Array>(array, "add", "modificationTime")?,
        row,
        "add.modificationTime",
    )?;
    let data_change = required_bool(
        child::<BooleanArray>(array, "add", "dataChange")?,
        row,
        "add.dataChange",
    )?;
    let stats = opt_child::<StringArray>(array, "stats")
        .filter(|stats| stats.is_valid(row))
        .map(|stats| stats.value(row).to_string());
    let tags = match opt_child::<MapArray>(array, "tags") {
        Some(tags) if tags.is_valid(row) => Some(map_value(tags, row, "add.tags")?),
        _ => None,
    };
    Ok(Add {
        path,
        partition_values,
        size,
        modification_time,
        data_change,
        stats,
        tags,
    })
}

fn parse_remove_row(array: &StructArray, row: usize) -> DeltaResult<Remove> {
    let path = required_string(
        child::<StringArray>(array, "remove", "path")?,
        row,
        "remove.path",
    )?;
    let deletion_timestamp = opt_child::<Int64Array>(array, "deletionTimestamp")
        .filter(|ts| ts.is_valid(row))
        .map(|ts| ts.value(row));
    let data_change = match opt_child::<BooleanArray>(array, "dataChange") {
        Some(flags) if flags.is_valid(row) => flags.value(row),
        _ => true,
    };
    Ok(Remove {
        path,
        deletion_timestamp,
        data_change,
    })
}

fn parse_metadata_row(array: &StructArray, row: usize) -> DeltaResult<Metadata> {
    let id = required_string(
        child::<StringArray>(array, "metaData", "id")?,
        row,
        "metaData.id",
    )?;
    let id = Uuid::parse_str(&id)
        .map_err(|err| Error::invalid_action(format!("metaData.id is not a uuid: {err}")))?;
    let name = opt_child::<StringArray>(array, "name")
        .filter(|names| names.is_valid(row))
        .map(|names| names.value(row).to_string());
    let description = opt_child::<StringArray>(array, "description")
        .filter(|descriptions| descriptions.is_valid(row))
        .map(|descriptions| descriptions.value(row).to_string());
    let format = match opt_child::<StructArray>(array, "format") {
        Some(format) if format.is_valid(row) => {
            let provider = required_string(
                child::<StringArray>(format, "format", "provider")?,
                row,
                "metaData.format.provider",
            )?;
            let options = match opt_child::<MapArray>(format, "options") {
                Some(options) if options.is_valid(row) => {
                    map_value(options, row, "metaData.format.options")?
                }
                _ => HashMap::new(),
            };
            Format { provider, options }
        }
        _ => Format::default(),
    };
    let schema_string = required_string(
        child::<StringArray>(array, "metaData", "schemaString")?,
        row,
        "metaData.schemaString",
    )?;
    let partition_columns = match opt_child::<ListArray>(array, "partitionColumns") {
        Some(columns) if columns.is_valid(row) => {
            string_list(columns, row, "metaData.partitionColumns")?
        }
        _ => Vec::new(),
    };
    let configuration = match opt_child::<MapArray>(array, "configuration") {
        Some(configuration) if configuration.is_valid(row) => {
            map_value(configuration, row, "metaData.configuration")?
        }
        _ => HashMap::new(),
    };
    let created_time = opt_child::<Int64Array>(array, "createdTime")
        .filter(|times| times.is_valid(row))
        .map(|times| times.value(row));
    Ok(Metadata {
        id,
        name,
        description,
        format,
        schema_string,
        partition_columns,
        created_time,
        configuration,
    })
}

fn parse_protocol_row(array: &StructArray, row: usize) -> DeltaResult<Protocol> {
    let min_reader_version = child::<Int32Array>(array, "protocol", "minReaderVersion")?;
    let min_writer_version = child::<Int32Array>(array, "protocol", "minWriterVersion")?;
    if !min_reader_version.is_valid(row) || !min_writer_version.is_valid(row) {
        return Err(Error::invalid_action(
            "protocol row missing minReaderVersion or minWriterVersion",
        ));
    }
    Ok(Protocol {
        min_reader_version: min_reader_version.value(row),
        min_writer_version: min_writer_version.value(row),
    })
}

fn as_struct<'a>(column: &'a ArrayRef, name: &str) -> DeltaResult<&'a StructArray> {
    column
        .as_any()
        .downcast_ref::<StructArray>()
        .ok_or_else(|| {
            Error::unexpected_column_type(format!("checkpoint column '{name}' is not a struct"))
        })
}

fn child<'a, T: 'static>(array: &'a StructArray, parent: &str, name: &str) -> DeltaResult<&'a T> {
    array
        .column_by_name(name)
        .ok_or_else(|| Error::missing_column(format!("{parent}.{name}")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            Error::unexpected_column_type(format!(
                "checkpoint field '{parent}.{name}' has an unexpected physical type"
            ))
        })
}

// Optional columns may be physically absent (or have drifted types in files written by other
// systems); both read as absent.
fn opt_child<'a, T: 'static>(array: &'a StructArray, name: &str) -> Option<&'a T> {
    array
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<T>())
}

fn required_string(array: &StringArray, row: usize, what: &str) -> DeltaResult<String> {
    if array.is_valid(row) {
        Ok(array.value(row).to_string())
    } else {
        Err(Error::invalid_action(format!("{what} must not be null")))
    }
}

fn required_i64(array: &Int64Array, row: usize, what: &str) -> DeltaResult<i64> {
    if array.is_valid(row) {
        Ok(array.value(row))
    } else {
        Err(Error::invalid_action(format!("{what} must not be null")))
    }
}

fn required_bool(array: &BooleanArray, row: usize, what: &str) -> DeltaResult<bool> {
    if array.is_valid(row) {
        Ok(array.value(row))
    } else {
        Err(Error::invalid_action(format!("{what} must not be null")))
    }
}

// Map entries are read positionally (key column 0, value column 1) because entry field naming
// varies between parquet writers.
fn map_value(
    map: &MapArray,
    row: usize,
    what: &str,
) -> DeltaResult<HashMap<String, Option<String>>> {
    let entries = map.value(row);
    let keys = entries
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::unexpected_column_type(format!("{what} keys are not strings")))?;
    let values = entries
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::unexpected_column_type(format!("{what} values are not strings")))?;
    Ok(keys
        .iter()
        .zip(values.iter())
        .filter_map(|(key, value)| key.map(|key| (key.to_string(), value.map(str::to_string))))
        .collect())
}

fn string_list(list: &ListArray, row: usize, what: &str) -> DeltaResult<Vec<String>> {
    let values = list.value(row);
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::unexpected_column_type(format!("{what} is not a string list")))?;
    Ok(strings
        .iter()
        .flatten()
        .map(str::to_string)
        .collect())
}
