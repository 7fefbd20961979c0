//! A [`LogSegment`] is the frozen set of log files that defines one snapshot: at most one
//! checkpoint (possibly multi-part) plus the ascending run of commits after it.

use url::Url;

use crate::actions::checkpoint::{parse_checkpoint_batch, CHECKPOINT_READ_SCHEMA};
use crate::actions::Action;
use crate::log_replay::LogReplay;
use crate::path::ParsedLogPath;
use crate::utils::require;
use crate::{DeltaResult, Engine, Error, FileMeta, Version};

#[derive(Debug)]
pub(crate) struct LogSegment {
    #[allow(unused)]
    pub(crate) log_root: Url,
    /// Parts of the newest usable checkpoint, in part order. Empty when replay starts from
    /// version 0.
    pub(crate) checkpoint_files: Vec<ParsedLogPath>,
    /// Commit files in ascending version order.
    pub(crate) commit_files: Vec<ParsedLogPath>,
}

impl LogSegment {
    pub(crate) fn checkpoint_version(&self) -> Option<Version> {
        self.checkpoint_files.first().map(|file| file.version)
    }

    /// The version a snapshot built from this segment will report.
    pub(crate) fn effective_version(&self) -> Option<Version> {
        self.commit_files
            .last()
            .map(|file| file.version)
            .or_else(|| self.checkpoint_version())
    }

    /// Commits must form a contiguous run starting at 0 or right after the checkpoint.
    pub(crate) fn validate(&self) -> DeltaResult<()> {
        let mut expected = match self.checkpoint_version() {
            Some(version) => version + 1,
            None => 0,
        };
        for commit in &self.commit_files {
            require!(
                commit.version == expected,
                Error::invalid_log_segment(format!(
                    "missing version {expected}: next commit found is {}",
                    commit.version
                ))
            );
            expected += 1;
        }
        Ok(())
    }

    /// Stream every action of this segment, oldest first, through a fresh replay engine.
    pub(crate) fn replay(&self, engine: &dyn Engine, table_root: &Url) -> DeltaResult<LogReplay> {
        let mut replay = LogReplay::new(table_root.clone(), engine.get_clock());

        if let Some(checkpoint_version) = self.checkpoint_version() {
            let files: Vec<FileMeta> = self
                .checkpoint_files
                .iter()
                .map(|file| file.location.clone())
                .collect();
            let batches = engine
                .get_parquet_handler()
                .read_parquet_files(&files, CHECKPOINT_READ_SCHEMA.clone())?;
            let mut actions = Vec::new();
            for batch in batches {
                actions.extend(parse_checkpoint_batch(&batch?)?);
            }
            replay.apply_checkpoint(checkpoint_version, actions)?;
        }

        if !self.commit_files.is_empty() {
            let urls: Vec<Url> = self
                .commit_files
                .iter()
                .map(|file| file.location.location.clone())
                .collect();
            let contents = engine.get_file_system_client().read_files(urls)?;
            for (commit, bytes) in self.commit_files.iter().zip(contents) {
                let bytes = bytes?;
                let text = std::str::from_utf8(&bytes)?;
                let actions = text
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(Action::from_json)
                    .filter_map(|decoded| decoded.transpose())
                    .collect::<DeltaResult<Vec<_>>>()?;
                replay.apply(commit.version, actions)?;
            }
        }

        Ok(replay)
    }
}
