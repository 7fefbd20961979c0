use std::io::ErrorKind;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use itertools::Itertools;
use url::Url;

use crate::{DeltaResult, Error, FileMeta, FileSystemClient};

pub(crate) struct SyncFilesystemClient;

fn meta_from_entry(entry: &std::fs::DirEntry) -> DeltaResult<FileMeta> {
    let metadata = entry.metadata()?;
    let last_modified = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0);
    let location = Url::from_file_path(entry.path())
        .map_err(|_| Error::generic(format!("Invalid file path: {:?}", entry.path())))?;
    Ok(FileMeta {
        location,
        last_modified,
        size: metadata.len() as usize,
    })
}

impl FileSystemClient for SyncFilesystemClient {
    /// List the paths in the same directory that are lexicographically greater or equal to
    /// (UTF-8 sorting) the given `path`. The result is sorted by the file name.
    fn list_from(
        &self,
        url_path: &Url,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<FileMeta>>>> {
        if url_path.scheme() != "file" {
            return Err(Error::generic(format!(
                "Can only read the local filesystem, got scheme {}",
                url_path.scheme()
            )));
        }
        let path = url_path
            .to_file_path()
            .map_err(|_| Error::generic(format!("Invalid path for list_from: {url_path:?}")))?;

        let (path_to_read, min_file_name) = if path.is_dir() {
            // passed path is an existing dir, don't strip anything and don't filter the results
            (path, None)
        } else {
            // path doesn't exist, or is not a dir, assume the final part is a filename. strip
            // that and use it as the min_file_name to return
            let parent = path
                .parent()
                .ok_or_else(|| Error::generic(format!("Invalid path for list_from: {path:?}")))?
                .to_path_buf();
            let file_name = path
                .file_name()
                .ok_or_else(|| Error::generic(format!("Invalid path for list_from: {path:?}")))?
                .to_os_string();
            (parent, Some(file_name))
        };

        // a missing directory lists as empty, like a prefix with no objects under it
        if !path_to_read.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }

        let all_ents: Vec<_> = std::fs::read_dir(path_to_read)?
            .filter(|ent_res| {
                match (ent_res, &min_file_name) {
                    (Ok(ent), Some(min_file_name)) => ent.file_name() >= *min_file_name,
                    _ => true, // Keep unfiltered and/or error entries
                }
            })
            .try_collect()?;
        let it = all_ents
            .into_iter()
            .sorted_by_key(|ent| ent.path())
            .map(|ent| meta_from_entry(&ent));
        Ok(Box::new(it))
    }

    /// Read the contents of each file, in order.
    fn read_files(
        &self,
        files: Vec<Url>,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<Bytes>>>> {
        let iter = files.into_iter().map(|url| {
            let path = url
                .to_file_path()
                .map_err(|_| Error::generic(format!("Can only read local files, got {url}")))?;
            match std::fs::read(&path) {
                Ok(bytes) => Ok(Bytes::from(bytes)),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    Err(Error::file_not_found(url.path()))
                }
                Err(err) => Err(err.into()),
            }
        });
        Ok(Box::new(iter))
    }
}
