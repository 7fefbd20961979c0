//! Reader configuration
//!
//! Options are passed to an engine as a plain string map; this module names the recognized keys
//! and provides typed, defaulted accessors over that map. Unrecognized keys are ignored.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use chrono_tz::Tz;
use strum::{AsRefStr, EnumString};

use crate::{DeltaResult, Error};

/// Typed option keys recognized by the reader
#[derive(Debug, Clone, Eq, PartialEq, Hash, EnumString, AsRefStr)]
pub enum ReaderConfigKey {
    /// Time zone used when decoding timestamps that lack zone information; defaults to UTC.
    #[strum(serialize = "parquet.time.zone.id")]
    ParquetTimeZoneId,

    /// Advisory size of the per-table LRU cache of snapshots. Unset disables caching.
    #[strum(serialize = "log.cacheSize")]
    LogCacheSize,
}

/// Options controlling how an engine reads tables
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    options: HashMap<String, String>,
}

impl ReaderOptions {
    pub fn new(options: HashMap<String, String>) -> Self {
        Self { options }
    }

    pub fn get(&self, key: &ReaderConfigKey) -> Option<&str> {
        self.options.get(key.as_ref()).map(String::as_str)
    }

    /// The zone naive timestamps are interpreted in.
    pub fn parquet_time_zone(&self) -> DeltaResult<Tz> {
        match self.get(&ReaderConfigKey::ParquetTimeZoneId) {
            Some(id) => id.parse().map_err(|_| Error::invalid_time_zone(id)),
            None => Ok(Tz::UTC),
        }
    }

    /// Snapshot cache capacity, if caching was requested.
    pub fn log_cache_size(&self) -> Option<NonZeroUsize> {
        self.get(&ReaderConfigKey::LogCacheSize)
            .and_then(|size| size.parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
    }
}
