//! An immutable view of a table at a specific version: schema, protocol, live-file set, and
//! derived counters. A [`Snapshot`] is constructed by listing the log directory, selecting the
//! newest usable checkpoint and the commits after it, and folding their actions through the
//! replay engine.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::actions::{Add, Metadata, Protocol};
use crate::data::RowRecordIterator;
use crate::log_replay::LogReplay;
use crate::log_segment::LogSegment;
use crate::path::{LogPathFileType, ParsedLogPath};
use crate::schema::SchemaRef;
use crate::utils::require;
use crate::{DeltaResult, Engine, Error, FileMeta, FileSystemClient, Version};

const LAST_CHECKPOINT_FILE_NAME: &str = "_last_checkpoint";

/// In-memory representation of a specific snapshot of a table. While a table exists throughout
/// time, a `Snapshot` represents its state at one version: a defined schema, a defined
/// protocol, and a frozen set of live data files. It is never mutated after construction and is
/// safe to share across threads.
pub struct Snapshot {
    table_root: Url,
    version: Version,
    metadata: Metadata,
    protocol: Protocol,
    num_metadata: i64,
    num_protocol: i64,
    active_files: IndexMap<Url, Add>,
    size_in_bytes: i64,
    schema: OnceLock<SchemaRef>,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("table_root", &self.table_root.as_str())
            .field("version", &self.version)
            .field("num_files", &self.active_files.len())
            .finish()
    }
}

impl Snapshot {
    /// Create a new [`Snapshot`] for the given version.
    ///
    /// # Parameters
    ///
    /// - `table_root`: url pointing at the table root (where the log directory lives)
    /// - `engine`: implementation of the engine traits providing storage access
    /// - `version`: target version, or `None` for the latest available
    pub fn try_new(
        table_root: Url,
        engine: &dyn Engine,
        version: Option<Version>,
    ) -> DeltaResult<Self> {
        let fs_client = engine.get_file_system_client();
        let log_root = table_root.join("_delta_log/")?;

        let checkpoint_hint = read_last_checkpoint(fs_client.as_ref(), &log_root)?;
        let start_version = match (&checkpoint_hint, version) {
            (Some(hint), None) => hint.version,
            (Some(hint), Some(requested)) if hint.version <= requested => hint.version,
            _ => 0,
        };

        let (checkpoint_files, commit_files) =
            list_log_files(fs_client.as_ref(), &log_root, start_version, version)?;

        if let Some(hint) = &checkpoint_hint {
            match checkpoint_files.first() {
                None if start_version == hint.version && hint.version > 0 => {
                    return Err(Error::invalid_log_segment(format!(
                        "_last_checkpoint names version {} but no checkpoint was found",
                        hint.version
                    )));
                }
                Some(found) if found.version != hint.version => {
                    warn!(
                        "_last_checkpoint hint is out of date. hint version: {}. using actual most recent: {}",
                        hint.version, found.version
                    );
                }
                _ => {}
            }
        }

        let segment = LogSegment {
            log_root,
            checkpoint_files,
            commit_files,
        };

        let effective_version = segment
            .effective_version()
            .ok_or_else(|| Error::table_not_found(table_root.as_str()))?;
        if let Some(requested) = version {
            require!(effective_version == requested, Error::MissingVersion);
        }
        segment.validate()?;

        debug!(
            "replaying segment for {table_root} at version {effective_version}: {} checkpoint part(s), {} commit(s)",
            segment.checkpoint_files.len(),
            segment.commit_files.len()
        );
        let replay = segment.replay(engine, &table_root)?;
        Self::try_from_replay(table_root, replay)
    }

    fn try_from_replay(table_root: Url, replay: LogReplay) -> DeltaResult<Self> {
        let LogReplay {
            version,
            metadata,
            protocol,
            active_files,
            size_in_bytes,
            num_metadata,
            num_protocol,
            // tombstones exist for replay hygiene only and die with the engine
            ..
        } = replay;
        let metadata = metadata.ok_or(Error::MissingMetadata)?;
        let protocol = protocol.unwrap_or_default();
        Ok(Self {
            table_root,
            version,
            metadata,
            protocol,
            num_metadata,
            num_protocol,
            active_files,
            size_in_bytes,
            schema: OnceLock::new(),
        })
    }

    /// Fully qualified location of the table
    pub fn table_root(&self) -> &Url {
        &self.table_root
    }

    /// Version of this snapshot in the table
    pub fn version(&self) -> Version {
        self.version
    }

    /// Table metadata at this snapshot's version
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Table protocol at this snapshot's version. A log that never declared a protocol reports
    /// the default; [`Self::num_of_protocol`] tells the two cases apart.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Table schema at this snapshot's version, parsed from the metadata schema string on first
    /// access and cached.
    pub fn schema(&self) -> DeltaResult<SchemaRef> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema.clone());
        }
        let parsed = Arc::new(self.metadata.parse_schema()?);
        Ok(self.schema.get_or_init(|| parsed).clone())
    }

    /// The live data files of this snapshot, in stable order
    pub fn files(&self) -> impl Iterator<Item = &Add> {
        self.active_files.values()
    }

    pub fn num_of_files(&self) -> i64 {
        self.active_files.len() as i64
    }

    /// Total size of all live data files
    pub fn size_in_bytes(&self) -> i64 {
        self.size_in_bytes
    }

    /// How many metadata actions were replayed into this snapshot
    pub fn num_of_metadata(&self) -> i64 {
        self.num_metadata
    }

    /// How many protocol actions were replayed into this snapshot
    pub fn num_of_protocol(&self) -> i64 {
        self.num_protocol
    }

    /// Open a row iterator over the snapshot's data files, in [`Self::files`] order.
    pub fn open(&self, engine: &dyn Engine) -> DeltaResult<RowRecordIterator> {
        let schema = self.schema()?;
        let time_zone = engine.reader_options().parquet_time_zone()?;
        let files: Vec<FileMeta> = self
            .active_files
            .iter()
            .map(|(uri, add)| FileMeta {
                location: uri.clone(),
                last_modified: add.modification_time,
                size: add.size as usize,
            })
            .collect();
        Ok(RowRecordIterator::new(
            files,
            schema,
            time_zone,
            engine.get_parquet_handler(),
        ))
    }
}

/// The tiny JSON pointer written beside the log naming the newest checkpoint.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckpointMetadata {
    /// The version of the table when the last checkpoint was made.
    pub(crate) version: Version,
    /// The number of actions that are stored in the checkpoint.
    pub(crate) size: i64,
    /// The number of fragments if the last checkpoint was written in multiple parts.
    pub(crate) parts: Option<usize>,
    /// The number of bytes of the checkpoint.
    pub(crate) size_in_bytes: Option<i64>,
    /// The number of add actions in the checkpoint.
    pub(crate) num_of_add_files: Option<i64>,
    /// The checksum of the last checkpoint JSON.
    pub(crate) checksum: Option<String>,
}

/// Try reading the `_last_checkpoint` file.
///
/// A missing or unparseable `_last_checkpoint` must not fail the read, it only costs us the
/// listing shortcut. Thus the semantics here are to return `None` if the file is not found or
/// is invalid JSON. Unexpected/unrecoverable errors are returned as `Err`.
pub(crate) fn read_last_checkpoint(
    fs_client: &dyn FileSystemClient,
    log_root: &Url,
) -> DeltaResult<Option<CheckpointMetadata>> {
    let file_path = log_root.join(LAST_CHECKPOINT_FILE_NAME)?;
    let read = fs_client.read_files(vec![file_path]).and_then(|mut data| {
        data.next()
            .unwrap_or_else(|| Err(Error::generic("read_files returned no results")))
    });
    match read {
        Ok(data) => Ok(serde_json::from_slice(&data)
            .inspect_err(|err| warn!("invalid _last_checkpoint JSON: {err}"))
            .ok()),
        Err(Error::FileNotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// List the log directory from `start_version` and pick the newest complete checkpoint at or
/// below `target` (if any) plus the commits after it, also capped at `target`.
///
/// Relies on the file-system client's sorted-listing contract; commit files therefore come back
/// in ascending version order.
pub(crate) fn list_log_files(
    fs_client: &dyn FileSystemClient,
    log_root: &Url,
    start_version: Version,
    target: Option<Version>,
) -> DeltaResult<(Vec<ParsedLogPath>, Vec<ParsedLogPath>)> {
    let version_prefix = format!("{start_version:020}");
    let start_from = log_root.join(&version_prefix)?;

    let mut max_checkpoint_version = -1;
    let mut checkpoint_files: Vec<ParsedLogPath> = Vec::new();
    // We expect 10 commit files per checkpoint, so start with that size
    let mut commit_files = Vec::with_capacity(10);

    for meta in fs_client.list_from(&start_from)? {
        let meta = meta?;
        let Some(parsed) = ParsedLogPath::try_from(meta)? else {
            continue;
        };
        if target.is_some_and(|target| parsed.version > target) {
            continue;
        }
        if parsed.is_checkpoint() {
            match parsed.version.cmp(&max_checkpoint_version) {
                Ordering::Greater => {
                    max_checkpoint_version = parsed.version;
                    checkpoint_files.clear();
                    checkpoint_files.push(parsed);
                }
                Ordering::Equal => checkpoint_files.push(parsed),
                Ordering::Less => {}
            }
        } else if parsed.is_commit() {
            commit_files.push(parsed);
        }
    }

    debug_assert!(
        commit_files
            .windows(2)
            .all(|pair| pair[0].version <= pair[1].version),
        "fs_client.list_from() didn't return a sorted listing! {:?}",
        commit_files
    );

    let checkpoint_files = match select_complete_checkpoint(checkpoint_files) {
        Some(files) => files,
        None if max_checkpoint_version >= 0 => {
            warn!("ignoring incomplete checkpoint at version {max_checkpoint_version}");
            Vec::new()
        }
        None => Vec::new(),
    };
    if let Some(checkpoint) = checkpoint_files.first() {
        let checkpoint_version = checkpoint.version;
        commit_files.retain(|commit| commit.version > checkpoint_version);
    }

    Ok((checkpoint_files, commit_files))
}

/// From all checkpoint files sharing the newest version, pick a usable set: a single-part
/// checkpoint wins outright, otherwise a multi-part set only counts when every part is present.
fn select_complete_checkpoint(files: Vec<ParsedLogPath>) -> Option<Vec<ParsedLogPath>> {
    if files.is_empty() {
        return None;
    }
    if let Some(single) = files
        .iter()
        .position(|file| matches!(file.file_type, LogPathFileType::SinglePartCheckpoint))
    {
        let mut files = files;
        return Some(vec![files.swap_remove(single)]);
    }
    let mut parts: Vec<ParsedLogPath> = files
        .into_iter()
        .filter(|file| {
            matches!(
                file.file_type,
                LogPathFileType::MultiPartCheckpoint { .. }
            )
        })
        .collect();
    let LogPathFileType::MultiPartCheckpoint { num_parts, .. } = parts.first()?.file_type else {
        return None;
    };
    if parts.len() != num_parts as usize {
        return None;
    }
    parts.sort_by_key(|file| match file.file_type {
        LogPathFileType::MultiPartCheckpoint { part_num, .. } => part_num,
        _ => 0,
    });
    Some(parts)
}
