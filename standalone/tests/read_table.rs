//! End-to-end reads over tables laid out on the local filesystem.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{MapBuilder, StringBuilder};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Int32Array, Int64Array, RecordBatch, StringArray, StructArray,
    TimestampMicrosecondArray,
};
use arrow_buffer::NullBuffer;
use arrow_schema::{DataType as ArrowDataType, Field, Fields, Schema as ArrowSchema, TimeUnit};
use chrono::TimeZone;
use parquet::arrow::ArrowWriter;
use url::Url;
use uuid::Uuid;

use delta_standalone::actions::{Action, Add, Metadata, Protocol, Remove};
use delta_standalone::engine::sync::SyncEngine;
use delta_standalone::{Engine, Error, Table};

const SCHEMA_STRING: &str = r#"{"type":"struct","fields":[{"name":"id","type":"long","nullable":false,"metadata":{}},{"name":"name","type":"string","nullable":true,"metadata":{}},{"name":"ts","type":"timestamp","nullable":true,"metadata":{}}]}"#;

fn table_id() -> Uuid {
    "aff5cb91-8cd9-4195-aef9-446908507302".parse().unwrap()
}

fn metadata_line(partition_columns: Vec<String>) -> String {
    Action::Metadata(Metadata {
        id: table_id(),
        name: None,
        description: None,
        format: Default::default(),
        schema_string: SCHEMA_STRING.to_string(),
        partition_columns,
        created_time: Some(1670892997849),
        configuration: HashMap::new(),
    })
    .to_json()
    .unwrap()
}

fn protocol_line() -> String {
    Action::Protocol(Protocol::default()).to_json().unwrap()
}

fn add_line(path: &str, size: i64, partition_values: HashMap<String, Option<String>>) -> String {
    Action::Add(Add {
        path: path.to_string(),
        partition_values,
        size,
        modification_time: 1670892998135,
        data_change: true,
        stats: None,
        tags: None,
    })
    .to_json()
    .unwrap()
}

fn remove_line(path: &str) -> String {
    Action::Remove(Remove {
        path: path.to_string(),
        deletion_timestamp: Some(1670892998200),
        data_change: true,
    })
    .to_json()
    .unwrap()
}

struct TestTable {
    _tmp: tempfile::TempDir,
    root: PathBuf,
}

impl TestTable {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("table");
        std::fs::create_dir_all(root.join("_delta_log")).unwrap();
        Self { _tmp: tmp, root }
    }

    fn commit(&self, version: i64, lines: &[String]) {
        let path = self
            .root
            .join("_delta_log")
            .join(format!("{version:020}.json"));
        std::fs::write(path, lines.join("\n") + "\n").unwrap();
    }

    fn table(&self) -> Table {
        Table::new(Url::from_directory_path(&self.root).unwrap())
    }

    /// Write a parquet data file with the test schema; returns its size in bytes.
    fn write_data_file(&self, name: &str, ids: &[i64], names: &[Option<&str>]) -> i64 {
        let micros: Vec<Option<i64>> = ids.iter().map(|_| Some(1_577_866_150_000_000)).collect();
        let schema = Arc::new(ArrowSchema::new(vec![
            Field::new("id", ArrowDataType::Int64, false),
            Field::new("name", ArrowDataType::Utf8, true),
            Field::new(
                "ts",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(ids.to_vec())),
                Arc::new(StringArray::from(names.to_vec())),
                Arc::new(TimestampMicrosecondArray::from(micros)),
            ],
        )
        .unwrap();
        let path = self.root.join(name);
        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        std::fs::metadata(path).unwrap().len() as i64
    }
}

#[test_log::test]
fn test_read_table_latest() {
    let fixture = TestTable::new();
    let size_one = fixture.write_data_file("part-00000.parquet", &[1, 2], &[Some("a"), Some("b")]);
    let size_two = fixture.write_data_file("part-00001.parquet", &[3], &[None]);
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("part-00000.parquet", size_one, HashMap::new()),
        ],
    );
    fixture.commit(
        1,
        &[add_line("part-00001.parquet", size_two, HashMap::new())],
    );

    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();

    assert_eq!(snapshot.version(), 1);
    assert_eq!(snapshot.num_of_files(), 2);
    assert_eq!(snapshot.size_in_bytes(), size_one + size_two);
    assert_eq!(snapshot.num_of_metadata(), 1);
    assert_eq!(snapshot.num_of_protocol(), 1);
    assert_eq!(snapshot.metadata().id, table_id());

    let schema = snapshot.schema().unwrap();
    assert!(schema.field("id").is_some());
    // the schema is parsed once and shared
    assert!(Arc::ptr_eq(&schema, &snapshot.schema().unwrap()));

    // replayed adds never surface as data changes
    assert!(snapshot.files().all(|add| !add.data_change));

    let mut rows = Vec::new();
    for record in snapshot.open(&engine).unwrap() {
        let record = record.unwrap();
        rows.push((
            record.get_long("id").unwrap().unwrap(),
            record.get_string("name").unwrap(),
        ));
    }
    assert_eq!(
        rows,
        vec![
            (1, Some("a".to_string())),
            (2, Some("b".to_string())),
            (3, None),
        ]
    );
}

#[test]
fn test_time_travel() {
    let fixture = TestTable::new();
    let size = fixture.write_data_file("part-00000.parquet", &[1], &[Some("a")]);
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("part-00000.parquet", size, HashMap::new()),
        ],
    );
    fixture.commit(1, &[remove_line("part-00000.parquet")]);

    let engine = SyncEngine::new();
    let table = fixture.table();

    let latest = table.snapshot(&engine, None).unwrap();
    assert_eq!(latest.version(), 1);
    assert_eq!(latest.num_of_files(), 0);
    assert_eq!(latest.size_in_bytes(), 0);

    let snapshot = table.snapshot(&engine, Some(0)).unwrap();
    assert_eq!(snapshot.version(), 0);
    assert_eq!(snapshot.num_of_files(), 1);
    assert_eq!(snapshot.size_in_bytes(), size);

    assert!(matches!(
        table.snapshot(&engine, Some(99)),
        Err(Error::MissingVersion)
    ));
}

#[test]
fn test_re_add_after_remove() {
    let fixture = TestTable::new();
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("p/x.parquet", 5, HashMap::new()),
        ],
    );
    fixture.commit(1, &[remove_line("p/x.parquet")]);
    fixture.commit(2, &[add_line("p/x.parquet", 7, HashMap::new())]);

    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    assert_eq!(snapshot.version(), 2);
    assert_eq!(snapshot.num_of_files(), 1);
    assert_eq!(snapshot.size_in_bytes(), 7);
    assert_eq!(snapshot.files().next().unwrap().size, 7);
}

#[test]
fn test_escaped_and_raw_paths_fold_together() {
    let fixture = TestTable::new();
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("col=foo%20bar/part.parquet", 1, HashMap::new()),
        ],
    );
    fixture.commit(1, &[remove_line("col=foo bar/part.parquet")]);

    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    assert_eq!(snapshot.num_of_files(), 0);
    assert_eq!(snapshot.size_in_bytes(), 0);
}

#[test]
fn test_commit_info_only_commits() {
    let fixture = TestTable::new();
    let commit_info = r#"{"commitInfo":{"timestamp":"2022-12-13T01:36:38.177Z","operation":"CREATE TABLE","operationParameters":{"mode":"\"ErrorIfExists\""}}}"#;
    fixture.commit(0, &[metadata_line(vec![]), commit_info.to_string()]);
    fixture.commit(1, &[commit_info.to_string()]);

    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    assert_eq!(snapshot.version(), 1);
    assert_eq!(snapshot.num_of_files(), 0);
    assert_eq!(snapshot.num_of_metadata(), 1);
    assert_eq!(snapshot.num_of_protocol(), 0);
    // no protocol action was replayed; the snapshot reports the defaults
    assert_eq!(snapshot.protocol().min_reader_version, 1);
    assert_eq!(snapshot.protocol().min_writer_version, 2);
}

#[test]
fn test_unknown_actions_are_skipped() {
    let fixture = TestTable::new();
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            r#"{"txn":{"appId":"app-1","version":3}}"#.to_string(),
            add_line("part-00000.parquet", 4, HashMap::new()),
        ],
    );
    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    assert_eq!(snapshot.num_of_files(), 1);
}

#[test]
fn test_table_not_found() {
    let fixture = TestTable::new();
    let engine = SyncEngine::new();
    assert!(matches!(
        fixture.table().snapshot(&engine, None),
        Err(Error::TableNotFound(_))
    ));

    // a table directory that doesn't exist at all reads the same way
    let table = Table::new(Url::parse("file:///definitely/not/here/").unwrap());
    assert!(matches!(
        table.snapshot(&engine, None),
        Err(Error::TableNotFound(_))
    ));
}

#[test]
fn test_version_gap_is_rejected() {
    let fixture = TestTable::new();
    fixture.commit(0, &[metadata_line(vec![]), protocol_line()]);
    fixture.commit(2, &[add_line("part-00000.parquet", 4, HashMap::new())]);

    let engine = SyncEngine::new();
    assert!(matches!(
        fixture.table().snapshot(&engine, None),
        Err(Error::InvalidLogSegment(_))
    ));
}

#[test]
fn test_partition_values_surface_on_files() {
    let fixture = TestTable::new();
    let partition_values: HashMap<String, Option<String>> =
        [("c1".to_string(), Some("4".to_string()))].into();
    fixture.commit(
        0,
        &[
            metadata_line(vec!["c1".to_string()]),
            protocol_line(),
            add_line("c1=4/part-00000.parquet", 9, partition_values.clone()),
        ],
    );
    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    let add = snapshot.files().next().unwrap();
    assert_eq!(add.partition_values, partition_values);
    assert_eq!(snapshot.metadata().partition_columns, vec!["c1"]);
}

#[test]
fn test_timestamps_read_in_configured_zone() {
    let fixture = TestTable::new();
    let size = fixture.write_data_file("part-00000.parquet", &[1], &[Some("a")]);
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("part-00000.parquet", size, HashMap::new()),
        ],
    );

    let engine = SyncEngine::with_option_map(HashMap::from([(
        "parquet.time.zone.id".to_string(),
        "Asia/Tokyo".to_string(),
    )]));
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    let record = snapshot.open(&engine).unwrap().next().unwrap().unwrap();

    // the file stores 2020-01-01T08:09:10 naive; it reads back as that wall clock in Tokyo
    let tokyo = chrono_tz::Asia::Tokyo;
    let expected = tokyo.with_ymd_and_hms(2020, 1, 1, 8, 9, 10).unwrap();
    assert_eq!(record.get_timestamp("ts").unwrap(), Some(expected));
}

#[test]
fn test_row_accessor_errors() {
    let fixture = TestTable::new();
    let size = fixture.write_data_file("part-00000.parquet", &[1], &[Some("a")]);
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("part-00000.parquet", size, HashMap::new()),
        ],
    );
    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    let record = snapshot.open(&engine).unwrap().next().unwrap().unwrap();

    assert!(matches!(
        record.get_long("no_such_column"),
        Err(Error::MissingColumn(_))
    ));
    assert!(matches!(
        record.get_int("id"),
        Err(Error::UnexpectedColumnType(_))
    ));
}

#[test]
fn test_projected_read_through_handler() {
    let fixture = TestTable::new();
    let size = fixture.write_data_file("part-00000.parquet", &[1, 2], &[Some("a"), Some("b")]);
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("part-00000.parquet", size, HashMap::new()),
        ],
    );
    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();

    let projected = snapshot.schema().unwrap().project(&["id"]).unwrap();
    let files: Vec<_> = snapshot
        .files()
        .map(|add| delta_standalone::FileMeta {
            location: Url::from_file_path(fixture.root.join(&add.path)).unwrap(),
            last_modified: add.modification_time,
            size: add.size as usize,
        })
        .collect();
    let batches: Vec<_> = engine
        .get_parquet_handler()
        .read_parquet_files(&files, projected)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(!batches.is_empty());
    for batch in batches {
        assert_eq!(batch.num_columns(), 1);
        assert!(batch.column_by_name("id").is_some());
    }
}

#[test]
fn test_snapshot_cache_serves_repeated_versions() {
    let fixture = TestTable::new();
    fixture.commit(
        0,
        &[
            metadata_line(vec![]),
            protocol_line(),
            add_line("part-00000.parquet", 4, HashMap::new()),
        ],
    );

    let engine = SyncEngine::with_option_map(HashMap::from([(
        "log.cacheSize".to_string(),
        "2".to_string(),
    )]));
    let table = fixture.table();
    let first = table.snapshot(&engine, Some(0)).unwrap();
    let second = table.snapshot(&engine, Some(0)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    // latest-version requests bypass the cache: the log may have grown
    let latest = table.snapshot(&engine, None).unwrap();
    assert!(!Arc::ptr_eq(&first, &latest));
}

// --- checkpoint round trip -------------------------------------------------------------------

fn struct_from(columns: Vec<(&str, ArrayRef)>, nulls: Option<NullBuffer>) -> StructArray {
    let fields: Fields = columns
        .iter()
        .map(|(name, array)| Arc::new(Field::new(*name, array.data_type().clone(), true)))
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, array)| array).collect();
    StructArray::new(fields, arrays, nulls)
}

fn string_map(rows: Vec<Option<Vec<(&str, &str)>>>) -> ArrayRef {
    let mut builder = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
    for row in rows {
        match row {
            Some(entries) => {
                for (key, value) in entries {
                    builder.keys().append_value(key);
                    builder.values().append_value(value);
                }
                builder.append(true).unwrap();
            }
            None => builder.append(false).unwrap(),
        }
    }
    Arc::new(builder.finish())
}

/// A checkpoint batch holding one metadata, one protocol, and two adds.
fn checkpoint_batch(add_sizes: [i64; 2]) -> RecordBatch {
    let metadata = struct_from(
        vec![
            (
                "id",
                Arc::new(StringArray::from(vec![
                    Some("aff5cb91-8cd9-4195-aef9-446908507302"),
                    None,
                    None,
                    None,
                ])) as ArrayRef,
            ),
            (
                "schemaString",
                Arc::new(StringArray::from(vec![Some(SCHEMA_STRING), None, None, None]))
                    as ArrayRef,
            ),
            (
                "configuration",
                string_map(vec![Some(vec![]), None, None, None]),
            ),
            (
                "createdTime",
                Arc::new(Int64Array::from(vec![Some(1), None, None, None])) as ArrayRef,
            ),
        ],
        Some(NullBuffer::from(vec![true, false, false, false])),
    );
    let protocol = struct_from(
        vec![
            (
                "minReaderVersion",
                Arc::new(Int32Array::from(vec![None, Some(1), None, None])) as ArrayRef,
            ),
            (
                "minWriterVersion",
                Arc::new(Int32Array::from(vec![None, Some(2), None, None])) as ArrayRef,
            ),
        ],
        Some(NullBuffer::from(vec![false, true, false, false])),
    );
    let add = struct_from(
        vec![
            (
                "path",
                Arc::new(StringArray::from(vec![
                    None,
                    None,
                    Some("part-00000.parquet"),
                    Some("part-00001.parquet"),
                ])) as ArrayRef,
            ),
            (
                "partitionValues",
                string_map(vec![None, None, Some(vec![]), Some(vec![])]),
            ),
            (
                "size",
                Arc::new(Int64Array::from(vec![
                    None,
                    None,
                    Some(add_sizes[0]),
                    Some(add_sizes[1]),
                ])) as ArrayRef,
            ),
            (
                "modificationTime",
                Arc::new(Int64Array::from(vec![None, None, Some(10), Some(20)])) as ArrayRef,
            ),
            (
                "dataChange",
                Arc::new(BooleanArray::from(vec![
                    None,
                    None,
                    Some(false),
                    Some(false),
                ])) as ArrayRef,
            ),
        ],
        Some(NullBuffer::from(vec![false, false, true, true])),
    );

    let fields: Vec<Field> = [
        ("metaData", &metadata),
        ("protocol", &protocol),
        ("add", &add),
    ]
    .iter()
    .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
    .collect();
    RecordBatch::try_new(
        Arc::new(ArrowSchema::new(fields)),
        vec![Arc::new(metadata), Arc::new(protocol), Arc::new(add)],
    )
    .unwrap()
}

fn write_checkpoint(log_dir: &Path, version: i64, batch: &RecordBatch) {
    let path = log_dir.join(format!("{version:020}.checkpoint.parquet"));
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
    std::fs::write(
        log_dir.join("_last_checkpoint"),
        format!(r#"{{"version":{version},"size":4}}"#),
    )
    .unwrap();
}

#[test_log::test]
fn test_read_table_with_checkpoint() {
    let fixture = TestTable::new();
    let log_dir = fixture.root.join("_delta_log");

    // commits 0..=2 were cleaned up after the checkpoint at version 2
    write_checkpoint(&log_dir, 2, &checkpoint_batch([100, 200]));
    fixture.commit(3, &[add_line("part-00002.parquet", 50, HashMap::new())]);

    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();

    assert_eq!(snapshot.version(), 3);
    assert_eq!(snapshot.num_of_files(), 3);
    assert_eq!(snapshot.size_in_bytes(), 350);
    assert_eq!(snapshot.metadata().id, table_id());
    assert_eq!(snapshot.num_of_metadata(), 1);
    assert_eq!(snapshot.num_of_protocol(), 1);

    let paths: Vec<_> = snapshot.files().map(|add| add.path.clone()).collect();
    assert!(paths.contains(&"part-00000.parquet".to_string()));
    assert!(paths.contains(&"part-00002.parquet".to_string()));
}

#[test]
fn test_checkpoint_with_later_remove() {
    let fixture = TestTable::new();
    let log_dir = fixture.root.join("_delta_log");

    write_checkpoint(&log_dir, 2, &checkpoint_batch([100, 200]));
    fixture.commit(3, &[remove_line("part-00000.parquet")]);

    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    assert_eq!(snapshot.num_of_files(), 1);
    assert_eq!(snapshot.size_in_bytes(), 200);
}

#[test]
fn test_stale_checkpoint_hint_still_reads() {
    let fixture = TestTable::new();
    let log_dir = fixture.root.join("_delta_log");

    write_checkpoint(&log_dir, 2, &checkpoint_batch([100, 200]));
    // the hint lags behind the actual newest checkpoint
    std::fs::write(log_dir.join("_last_checkpoint"), r#"{"version":0,"size":4}"#).unwrap();
    fixture.commit(0, &[metadata_line(vec![]), protocol_line()]);
    fixture.commit(1, &[add_line("old.parquet", 1, HashMap::new())]);
    fixture.commit(3, &[add_line("part-00002.parquet", 50, HashMap::new())]);

    let engine = SyncEngine::new();
    let snapshot = fixture.table().snapshot(&engine, None).unwrap();
    assert_eq!(snapshot.version(), 3);
    // state comes from the version-2 checkpoint plus commit 3; commit 1's add was folded into
    // the checkpoint contents in a real log, and is not visible here
    assert_eq!(snapshot.num_of_files(), 3);
}
