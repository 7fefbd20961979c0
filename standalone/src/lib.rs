//! # Delta Standalone
//!
//! A standalone, read-only implementation of the delta transaction-log protocol: it replays a
//! table's commit log into an immutable [`Snapshot`] and surfaces the snapshot's live data
//! files (and, through a row adapter, their contents) to an embedding query engine. The
//! replay core performs no I/O of its own. Storage and columnar reads are injected behind a
//! small set of traits, detailed below, and a provided [`SyncEngine`](engine/sync/index.html)
//! implements them for the local filesystem.
//!
//! # Engine traits
//!
//! The [`Engine`] trait allows embedders to bring their own implementations of the
//! functionality the reader needs from its environment:
//!
//! ## File system interactions
//!
//! Listing and reading log files is encapsulated in the [`FileSystemClient`] trait.
//! Implementors must take care that all assumptions on the behavior of the functions, like
//! sorted listing results and preserved URI escaping, are respected.
//!
//! ## Reading columnar data
//!
//! Data files and checkpoints are columnar; the [`ParquetHandler`] trait reads them into arrow
//! record batches projected to a requested set of top-level columns.
//!
//! ## Time
//!
//! The [`Clock`] trait supplies the millisecond wall clock used to stamp tombstones that were
//! written without a deletion timestamp.

#![warn(
    unreachable_pub,
    trivial_numeric_casts,
    unused_extern_crates,
    rust_2018_idioms,
    rust_2021_compatibility
)]

use std::sync::Arc;

use arrow_array::RecordBatch;
use bytes::Bytes;
use url::Url;

pub mod actions;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
mod log_replay;
mod log_segment;
pub(crate) mod path;
pub mod schema;
pub mod snapshot;
pub mod table;
pub(crate) mod utils;

pub use config::{ReaderConfigKey, ReaderOptions};
pub use error::{DeltaResult, Error};
pub use snapshot::Snapshot;
pub use table::Table;

/// A table version. `-1` never names a real version; replay uses it internally to mean "no log
/// applied yet".
pub type Version = i64;

/// An iterator of record batches read from one or more columnar files
pub type FileDataReadResultIterator =
    Box<dyn Iterator<Item = DeltaResult<RecordBatch>> + Send>;

/// The metadata that describes an object in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// The fully qualified path to the object
    pub location: Url,
    /// The last modified time in milliseconds since the epoch
    pub last_modified: i64,
    /// The size in bytes of the object
    pub size: usize,
}

/// Provides file system related functionalities to the reader.
///
/// The reader uses this client whenever it needs to access the underlying file system where a
/// table lives. Implementations can hide filesystem specific details from the reader; they must
/// preserve URI escaping in the locations they report.
pub trait FileSystemClient: Send + Sync {
    /// List the paths in the same directory that are lexicographically greater or equal to
    /// (UTF-8 sorting) the given `path`. The result must be sorted by the file name.
    fn list_from(&self, path: &Url)
        -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<FileMeta>>>>;

    /// Read the full contents of each file, in the order given.
    fn read_files(
        &self,
        files: Vec<Url>,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<Bytes>>>>;
}

/// Provides columnar file reading to the reader.
pub trait ParquetHandler: Send + Sync {
    /// Read the parquet files at the given locations and return their contents as record
    /// batches, projected to the top-level columns named by `schema` and honoring the order of
    /// `files`.
    fn read_parquet_files(
        &self,
        files: &[FileMeta],
        schema: schema::SchemaRef,
    ) -> DeltaResult<FileDataReadResultIterator>;
}

/// Millisecond wall clock. Only consulted to stamp tombstones converted from removes that carry
/// no deletion timestamp.
pub trait Clock: Send + Sync {
    fn current_millis(&self) -> i64;
}

/// The `Engine` trait encapsulates all the functionality an embedder needs to provide in order
/// to read a table.
pub trait Engine: Send + Sync {
    /// Get the provided [`FileSystemClient`]
    fn get_file_system_client(&self) -> Arc<dyn FileSystemClient>;

    /// Get the provided [`ParquetHandler`]
    fn get_parquet_handler(&self) -> Arc<dyn ParquetHandler>;

    /// Get the provided [`Clock`]
    fn get_clock(&self) -> Arc<dyn Clock>;

    /// Options this engine was configured with
    fn reader_options(&self) -> &ReaderOptions;
}
