//! The root entity for reading a table: resolves a location once, then hands out snapshots.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use url::Url;

use crate::snapshot::Snapshot;
use crate::{DeltaResult, Engine, Error, Version};

use std::sync::Arc;

/// In-memory representation of a table, which acts as an immutable root entity for reading the
/// different versions (see [`Snapshot`]) of the table located in storage.
pub struct Table {
    location: Url,
    // Advisory per-table snapshot cache, populated only for explicit-version requests and only
    // when the engine sets `log.cacheSize`.
    snapshots: Mutex<Option<LruCache<Version, Arc<Snapshot>>>>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("Table")
            .field("location", &self.location)
            .finish()
    }
}

impl Table {
    /// Create a new table with the given location
    pub fn new(location: Url) -> Self {
        Self {
            location,
            snapshots: Mutex::new(None),
        }
    }

    /// Create a table from a URI string. A URI without a scheme is treated as a local
    /// filesystem path and canonicalized.
    pub fn try_from_uri(uri: &str) -> DeltaResult<Self> {
        let location = match Url::parse(uri) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let path = std::fs::canonicalize(uri)
                    .map_err(|_| Error::table_not_found(uri))?;
                Url::from_directory_path(path)
                    .map_err(|_| Error::generic(format!("Invalid table path: {uri}")))?
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self::new(location))
    }

    /// Fully qualified location of the table
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Create a [`Snapshot`] of the table corresponding to `version`.
    ///
    /// If no version is supplied, a snapshot for the latest version will be created.
    pub fn snapshot(
        &self,
        engine: &dyn Engine,
        version: Option<Version>,
    ) -> DeltaResult<Arc<Snapshot>> {
        let capacity = engine.reader_options().log_cache_size();
        if let (Some(capacity), Some(version)) = (capacity, version) {
            return self.cached_snapshot(engine, version, capacity);
        }
        Ok(Arc::new(Snapshot::try_new(
            self.location.clone(),
            engine,
            version,
        )?))
    }

    fn cached_snapshot(
        &self,
        engine: &dyn Engine,
        version: Version,
        capacity: NonZeroUsize,
    ) -> DeltaResult<Arc<Snapshot>> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|_| Error::generic("snapshot cache lock poisoned"))?;
        let cache = guard.get_or_insert_with(|| LruCache::new(capacity));
        cache.resize(capacity);
        if let Some(snapshot) = cache.get(&version) {
            return Ok(snapshot.clone());
        }
        let snapshot = Arc::new(Snapshot::try_new(
            self.location.clone(),
            engine,
            Some(version),
        )?);
        cache.put(version, snapshot.clone());
        Ok(snapshot)
    }
}
