//! Utilities for working with log file names and data file URIs.

use std::str::FromStr;

use url::Url;

use crate::utils::require;
use crate::{DeltaResult, Error, FileMeta, Version};

/// How many characters a version tag has
const VERSION_LEN: usize = 20;

/// How many characters a part specifier on a multipart checkpoint has
const MULTIPART_PART_LEN: usize = 10;

/// Resolve a raw action path into the canonical URI used as a key in the live-file and
/// tombstone maps.
///
/// Relative paths are resolved against the table root and thereby qualified with the root's
/// scheme and authority; absolute URIs pass through as parsed. Percent-escapes are preserved in
/// both cases, so two raw spellings of the same URI canonicalize to the same value, and
/// canonicalization is idempotent.
pub(crate) fn canonicalize(path: &str, table_root: &Url) -> DeltaResult<Url> {
    match Url::parse(path) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(table_root.join(path)?),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogPathFileType {
    Commit,
    SinglePartCheckpoint,
    // Part numbers are positive and bounded by num_parts; delta tooling treats them as 31-bit
    // unsigned integers, approximated as u32 here.
    MultiPartCheckpoint { part_num: u32, num_parts: u32 },
    Unknown,
}

/// A file in the log directory whose name carries a version: a commit, a checkpoint part, or
/// something versioned we don't recognize (and therefore ignore).
#[derive(Debug, Clone)]
pub(crate) struct ParsedLogPath<Location: AsUrl = FileMeta> {
    pub location: Location,
    #[allow(unused)]
    pub filename: String,
    pub version: Version,
    pub file_type: LogPathFileType,
}

// Internal helper used by try_from below. It parses a fixed-length string into the numeric type
// expected by the caller. A wrong length produces an error, even if the parse succeeded.
fn parse_path_part<T: FromStr>(value: &str, expect_len: usize, location: &Url) -> DeltaResult<T> {
    match value.parse() {
        Ok(result) if value.len() == expect_len => Ok(result),
        _ => Err(Error::invalid_log_path(location)),
    }
}

// We normally construct ParsedLogPath from FileMeta, but in testing it's convenient to use a
// Url directly instead. This trait decouples the two.
pub(crate) trait AsUrl {
    fn as_url(&self) -> &Url;
}

impl AsUrl for FileMeta {
    fn as_url(&self) -> &Url {
        &self.location
    }
}

impl AsUrl for Url {
    fn as_url(&self) -> &Url {
        self
    }
}

impl<Location: AsUrl> ParsedLogPath<Location> {
    // NOTE: We can't actually impl TryFrom because Option<T> is a foreign struct even if T is local.
    pub(crate) fn try_from(location: Location) -> DeltaResult<Option<ParsedLogPath<Location>>> {
        let url = location.as_url();
        let filename = url
            .path_segments()
            .ok_or_else(|| Error::invalid_log_path(url))?
            .last()
            .unwrap() // "the iterator always contains at least one string (which may be empty)"
            .to_string();
        if filename.is_empty() {
            return Err(Error::invalid_log_path(url));
        }

        let mut split = filename.split('.');

        // NOTE: str::split always returns at least one item, even for the empty string.
        let version = split.next().unwrap();

        // Every valid log path starts with a numeric version part. If version parsing fails, it
        // must not be a log path and we simply return None. However, it is an error if version
        // parsing succeeds for a wrong-length numeric string.
        let version = match version.parse().ok() {
            Some(v) if version.len() == VERSION_LEN => v,
            Some(_) => return Err(Error::invalid_log_path(url)),
            None => return Ok(None),
        };

        // Every valid log path has a file extension as its last part. Return None if it's missing.
        let split: Vec<_> = split.collect();
        if split.is_empty() {
            return Ok(None);
        }

        let file_type = match split.as_slice() {
            ["json"] => LogPathFileType::Commit,
            ["checkpoint", "parquet"] => LogPathFileType::SinglePartCheckpoint,
            ["checkpoint", part_num, num_parts, "parquet"] => {
                let part_num = parse_path_part(part_num, MULTIPART_PART_LEN, url)?;
                let num_parts = parse_path_part(num_parts, MULTIPART_PART_LEN, url)?;

                // A valid part_num must be in the range [1, num_parts]
                require!(
                    0 < part_num && part_num <= num_parts,
                    Error::invalid_log_path(url)
                );
                LogPathFileType::MultiPartCheckpoint {
                    part_num,
                    num_parts,
                }
            }

            // Unrecognized log paths are allowed, so long as they have a valid version.
            _ => LogPathFileType::Unknown,
        };
        Ok(Some(ParsedLogPath {
            location,
            filename,
            version,
            file_type,
        }))
    }

    pub(crate) fn is_commit(&self) -> bool {
        matches!(self.file_type, LogPathFileType::Commit)
    }

    pub(crate) fn is_checkpoint(&self) -> bool {
        matches!(
            self.file_type,
            LogPathFileType::SinglePartCheckpoint | LogPathFileType::MultiPartCheckpoint { .. }
        )
    }
}
