//! A simple, single threaded [`Engine`] that can only read from the local filesystem.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ReaderOptions;
use crate::{Clock, Engine, FileSystemClient, ParquetHandler};

mod fs_client;
mod parquet;

/// Wall clock used to stamp synthetic tombstones.
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn current_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// This is a simple implementation of [`Engine`]. It only supports reading data from the local
/// filesystem and performs every read on the calling thread.
pub struct SyncEngine {
    fs_client: Arc<fs_client::SyncFilesystemClient>,
    parquet_handler: Arc<parquet::SyncParquetHandler>,
    clock: Arc<SystemClock>,
    options: ReaderOptions,
}

impl SyncEngine {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_options(ReaderOptions::default())
    }

    /// An engine configured from a plain string map, e.g. `parquet.time.zone.id` ->
    /// `Asia/Tokyo`. See [`crate::config::ReaderConfigKey`] for the recognized keys.
    pub fn with_option_map(options: HashMap<String, String>) -> Self {
        Self::with_options(ReaderOptions::new(options))
    }

    pub fn with_options(options: ReaderOptions) -> Self {
        SyncEngine {
            fs_client: Arc::new(fs_client::SyncFilesystemClient),
            parquet_handler: Arc::new(parquet::SyncParquetHandler),
            clock: Arc::new(SystemClock),
            options,
        }
    }
}

impl Engine for SyncEngine {
    fn get_file_system_client(&self) -> Arc<dyn FileSystemClient> {
        self.fs_client.clone()
    }

    fn get_parquet_handler(&self) -> Arc<dyn ParquetHandler> {
        self.parquet_handler.clone()
    }

    fn get_clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn reader_options(&self) -> &ReaderOptions {
        &self.options
    }
}
