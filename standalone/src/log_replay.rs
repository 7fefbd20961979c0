//! The log replay engine: a deterministic fold of versioned action batches into table state.
//!
//! The engine owns mutable maps while a snapshot is being constructed and is never exposed
//! outside the crate; [`crate::snapshot::Snapshot`] freezes the result. It performs no I/O, so
//! it can be exercised without a filesystem.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;
use url::Url;

use crate::actions::{Action, Add, Metadata, Protocol, Remove};
use crate::path::canonicalize;
use crate::utils::require;
use crate::{Clock, DeltaResult, Error, Version};

pub(crate) struct LogReplay {
    pub(crate) table_root: Url,
    pub(crate) clock: Arc<dyn Clock>,
    /// Highest applied version, or -1 when nothing has been applied yet
    pub(crate) version: Version,
    pub(crate) metadata: Option<Metadata>,
    pub(crate) protocol: Option<Protocol>,
    /// Live data files, keyed by canonical URI. Insertion order is the stable iteration order
    /// surfaced by the snapshot.
    pub(crate) active_files: IndexMap<Url, Add>,
    /// Removed files retained so that a later add/remove at the same URI folds correctly.
    /// Never surfaced past the engine.
    pub(crate) tombstones: HashMap<Url, Remove>,
    pub(crate) size_in_bytes: i64,
    pub(crate) num_metadata: i64,
    pub(crate) num_protocol: i64,
}

impl LogReplay {
    pub(crate) fn new(table_root: Url, clock: Arc<dyn Clock>) -> Self {
        Self {
            table_root,
            clock,
            version: -1,
            metadata: None,
            protocol: None,
            active_files: IndexMap::new(),
            tombstones: HashMap::new(),
            size_in_bytes: 0,
            num_metadata: 0,
            num_protocol: 0,
        }
    }

    pub(crate) fn version(&self) -> Version {
        self.version
    }

    /// Apply a checkpoint batch, establishing the base state at `version`.
    ///
    /// A checkpoint replaces the initial state, so it must be the first application and carries
    /// no contiguity constraint against lower versions.
    pub(crate) fn apply_checkpoint(
        &mut self,
        version: Version,
        actions: impl IntoIterator<Item = Action>,
    ) -> DeltaResult<()> {
        require!(
            self.version == -1,
            Error::internal_error(format!(
                "checkpoint at version {version} applied to an engine already at version {}",
                self.version
            ))
        );
        require!(
            version >= 0,
            Error::internal_error(format!("invalid checkpoint version {version}"))
        );
        self.replay_actions(actions)?;
        self.version = version;
        Ok(())
    }

    /// Apply the actions of one commit. Versions must arrive in strictly increasing, contiguous
    /// order; a violation is a bug in the caller, not bad table data.
    pub(crate) fn apply(
        &mut self,
        version: Version,
        actions: impl IntoIterator<Item = Action>,
    ) -> DeltaResult<()> {
        require!(
            version >= 0 && (self.version == -1 || version == self.version + 1),
            Error::internal_error(format!(
                "log versions must be applied contiguously: got version {version} after {}",
                self.version
            ))
        );
        self.replay_actions(actions)?;
        self.version = version;
        Ok(())
    }

    fn replay_actions(&mut self, actions: impl IntoIterator<Item = Action>) -> DeltaResult<()> {
        for action in actions {
            match action {
                Action::Metadata(metadata) => {
                    self.metadata = Some(metadata);
                    self.num_metadata += 1;
                }
                Action::Protocol(protocol) => {
                    self.protocol = Some(protocol);
                    self.num_protocol += 1;
                }
                Action::Add(add) => self.apply_add(add)?,
                Action::Remove(remove) => self.apply_remove(remove)?,
                // provenance only; carries no state
                Action::CommitInfo(_) => {}
            }
        }
        Ok(())
    }

    fn apply_add(&mut self, mut add: Add) -> DeltaResult<()> {
        // A replayed add is materialized state, not a fresh write; consumers must never see it
        // flagged as a data change.
        add.data_change = false;
        let uri = canonicalize(&add.path, &self.table_root)?;
        debug!("add file: {uri}");
        self.tombstones.remove(&uri);
        self.size_in_bytes += add.size;
        if let Some(previous) = self.active_files.insert(uri, add) {
            // Re-add of a live URI replaces the entry; keep the size sum in step.
            self.size_in_bytes -= previous.size;
        }
        Ok(())
    }

    fn apply_remove(&mut self, mut remove: Remove) -> DeltaResult<()> {
        remove.data_change = false;
        if remove.deletion_timestamp.is_none() {
            remove.deletion_timestamp = Some(self.clock.current_millis());
        }
        let uri = canonicalize(&remove.path, &self.table_root)?;
        debug!("remove file: {uri}");
        if let Some(previous) = self.active_files.shift_remove(&uri) {
            self.size_in_bytes -= previous.size;
        }
        self.tombstones.insert(uri, remove);
        Ok(())
    }
}
