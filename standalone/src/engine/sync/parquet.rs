use std::collections::HashSet;
use std::fs::File;
use std::io::ErrorKind;

use either::Either;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use tracing::debug;
use url::Url;

use crate::schema::SchemaRef;
use crate::{DeltaResult, Error, FileDataReadResultIterator, FileMeta, ParquetHandler};

pub(crate) struct SyncParquetHandler;

fn try_create_reader(
    location: &Url,
    schema: SchemaRef,
) -> DeltaResult<impl Iterator<Item = DeltaResult<arrow_array::RecordBatch>>> {
    let path = location
        .to_file_path()
        .map_err(|_| Error::generic(format!("Can only read local files, got {location}")))?;
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(Error::file_not_found(location.path()))
        }
        Err(err) => return Err(err.into()),
    };
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    // Project to the top-level columns named by the read schema. Columns the file doesn't have
    // are simply not read; the row adapter reports them as missing.
    let requested: HashSet<&str> = schema.fields().map(|field| field.name.as_str()).collect();
    let root_fields = builder.parquet_schema().root_schema().get_fields();
    if requested.len() < root_fields.len()
        || root_fields.iter().any(|field| !requested.contains(field.name()))
    {
        let indices: Vec<usize> = root_fields
            .iter()
            .enumerate()
            .filter_map(|(index, field)| requested.contains(field.name()).then_some(index))
            .collect();
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
        builder = builder.with_projection(mask);
    }

    Ok(builder.build()?.map(|batch| batch.map_err(Error::from)))
}

impl ParquetHandler for SyncParquetHandler {
    fn read_parquet_files(
        &self,
        files: &[FileMeta],
        schema: SchemaRef,
    ) -> DeltaResult<FileDataReadResultIterator> {
        debug!("reading parquet files {files:?}");
        if files.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let locations: Vec<Url> = files.iter().map(|file| file.location.clone()).collect();
        Ok(Box::new(locations.into_iter().flat_map(move |location| {
            match try_create_reader(&location, schema.clone()) {
                Ok(batches) => Either::Left(batches),
                Err(err) => Either::Right(std::iter::once(Err(err))),
            }
        })))
    }
}
