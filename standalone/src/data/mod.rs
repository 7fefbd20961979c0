//! Row-oriented access over columnar data.
//!
//! [`RowRecordIterator`] drains a snapshot's data files one at a time through the injected
//! parquet handler, presenting each row as a [`RowRecord`] with typed, null-aware accessors.
//! Temporal columns written without zone information are reinterpreted in the configured
//! parquet time zone, so a naive timestamp written in zone Z reads back as the same wall-clock
//! instant in Z.

use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, ListArray, MapArray,
    RecordBatch, StringArray, StructArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType as ArrowDataType, TimeUnit};
use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;

use crate::schema::{DataType, SchemaRef, StructType};
use crate::{DeltaResult, Error, FileDataReadResultIterator, FileMeta, ParquetHandler};

mod scalars;

pub use scalars::{Decimal, Scalar};

/// One row of a data file, addressable by column name.
pub struct RowRecord {
    columns: StructArray,
    schema: SchemaRef,
    row: usize,
    time_zone: Tz,
}

impl RowRecord {
    pub(crate) fn new(columns: StructArray, schema: SchemaRef, row: usize, time_zone: Tz) -> Self {
        Self {
            columns,
            schema,
            row,
            time_zone,
        }
    }

    /// Number of columns in this record
    pub fn get_length(&self) -> usize {
        self.columns.num_columns()
    }

    /// The schema of this record
    pub fn get_schema(&self) -> &StructType {
        &self.schema
    }

    pub fn get_boolean(&self, name: &str) -> DeltaResult<Option<bool>> {
        let array = self.column::<BooleanArray>(name, "boolean")?;
        Ok(self.valid(array).then(|| array.value(self.row)))
    }

    pub fn get_byte(&self, name: &str) -> DeltaResult<Option<i8>> {
        let array = self.column::<Int8Array>(name, "byte")?;
        Ok(self.valid(array).then(|| array.value(self.row)))
    }

    pub fn get_short(&self, name: &str) -> DeltaResult<Option<i16>> {
        let array = self.column::<Int16Array>(name, "short")?;
        Ok(self.valid(array).then(|| array.value(self.row)))
    }

    pub fn get_int(&self, name: &str) -> DeltaResult<Option<i32>> {
        let array = self.column::<Int32Array>(name, "integer")?;
        Ok(self.valid(array).then(|| array.value(self.row)))
    }

    pub fn get_long(&self, name: &str) -> DeltaResult<Option<i64>> {
        let array = self.column::<Int64Array>(name, "long")?;
        Ok(self.valid(array).then(|| array.value(self.row)))
    }

    pub fn get_float(&self, name: &str) -> DeltaResult<Option<f32>> {
        let array = self.column::<Float32Array>(name, "float")?;
        Ok(self.valid(array).then(|| array.value(self.row)))
    }

    pub fn get_double(&self, name: &str) -> DeltaResult<Option<f64>> {
        let array = self.column::<Float64Array>(name, "double")?;
        Ok(self.valid(array).then(|| array.value(self.row)))
    }

    pub fn get_string(&self, name: &str) -> DeltaResult<Option<String>> {
        let array = self.column::<StringArray>(name, "string")?;
        Ok(self.valid(array).then(|| array.value(self.row).to_string()))
    }

    pub fn get_binary(&self, name: &str) -> DeltaResult<Option<Vec<u8>>> {
        let array = self.column::<BinaryArray>(name, "binary")?;
        Ok(self.valid(array).then(|| array.value(self.row).to_vec()))
    }

    pub fn get_decimal(&self, name: &str) -> DeltaResult<Option<Decimal>> {
        let array = self.column::<Decimal128Array>(name, "decimal")?;
        if !self.valid(array) {
            return Ok(None);
        }
        let scale = array.scale();
        if scale < 0 {
            return Err(Error::unsupported_type(format!(
                "column '{name}' has negative decimal scale {scale}"
            )));
        }
        Decimal::new(array.value(self.row), array.precision(), scale as u8).map(Some)
    }

    /// Days-since-epoch column as a calendar date
    pub fn get_date(&self, name: &str) -> DeltaResult<Option<NaiveDate>> {
        let array = self.column::<Date32Array>(name, "date")?;
        if !self.valid(array) {
            return Ok(None);
        }
        date_from_days(array.value(self.row)).map(Some)
    }

    /// A timestamp column as an instant in the configured parquet time zone.
    ///
    /// Columns stored zone-adjusted are converted into the configured zone; columns stored
    /// naive are interpreted as wall-clock readings in that zone.
    pub fn get_timestamp(&self, name: &str) -> DeltaResult<Option<DateTime<Tz>>> {
        let column = self.raw_column(name)?;
        let adjusted_to_utc = match column.data_type() {
            ArrowDataType::Timestamp(TimeUnit::Microsecond, zone) => zone.is_some(),
            other => {
                return Err(Error::unexpected_column_type(format!(
                    "column '{name}': expected timestamp, found {other}"
                )))
            }
        };
        let array = self.column::<TimestampMicrosecondArray>(name, "timestamp")?;
        if !self.valid(array) {
            return Ok(None);
        }
        timestamp_in_zone(array.value(self.row), adjusted_to_utc, self.time_zone).map(Some)
    }

    /// An array column as a list of scalars; elements may be null when the schema allows it
    pub fn get_list(&self, name: &str) -> DeltaResult<Option<Vec<Option<Scalar>>>> {
        let array = self.column::<ListArray>(name, "array")?;
        if !self.valid(array) {
            return Ok(None);
        }
        let values = array.value(self.row);
        let scalars = (0..values.len())
            .map(|index| scalar_at(values.as_ref(), index))
            .collect::<DeltaResult<Vec<_>>>()?;
        Ok(Some(scalars))
    }

    /// A map column as key/value scalar pairs; values may be null when the schema allows it
    pub fn get_map(&self, name: &str) -> DeltaResult<Option<Vec<(Scalar, Option<Scalar>)>>> {
        let array = self.column::<MapArray>(name, "map")?;
        if !self.valid(array) {
            return Ok(None);
        }
        let entries = array.value(self.row);
        let keys = entries.column(0);
        let values = entries.column(1);
        let pairs = (0..entries.len())
            .map(|index| {
                let key = scalar_at(keys.as_ref(), index)?
                    .ok_or_else(|| Error::generic(format!("null key in map column '{name}'")))?;
                let value = scalar_at(values.as_ref(), index)?;
                Ok((key, value))
            })
            .collect::<DeltaResult<Vec<_>>>()?;
        Ok(Some(pairs))
    }

    /// A struct column as a nested record
    pub fn get_record(&self, name: &str) -> DeltaResult<Option<RowRecord>> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| Error::missing_column(name))?;
        let DataType::Struct(nested) = field.data_type() else {
            return Err(Error::unexpected_column_type(format!(
                "column '{name}': expected struct, found {}",
                field.data_type()
            )));
        };
        let array = self.column::<StructArray>(name, "struct")?;
        if !self.valid(array) {
            return Ok(None);
        }
        Ok(Some(RowRecord::new(
            array.clone(),
            Arc::new((**nested).clone()),
            self.row,
            self.time_zone,
        )))
    }

    fn raw_column(&self, name: &str) -> DeltaResult<&ArrayRef> {
        self.columns
            .column_by_name(name)
            .ok_or_else(|| Error::missing_column(name))
    }

    fn column<T: 'static>(&self, name: &str, expected: &str) -> DeltaResult<&T> {
        let column = self.raw_column(name)?;
        column.as_any().downcast_ref::<T>().ok_or_else(|| {
            Error::unexpected_column_type(format!(
                "column '{name}': expected {expected}, found {}",
                column.data_type()
            ))
        })
    }

    fn valid(&self, array: &dyn Array) -> bool {
        array.is_valid(self.row)
    }
}

fn date_from_days(days: i32) -> DeltaResult<NaiveDate> {
    // 1970-01-01 is day 719163 of the common era
    days.checked_add(719_163)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| Error::generic(format!("date out of range: {days} days since epoch")))
}

fn timestamp_in_zone(micros: i64, adjusted_to_utc: bool, zone: Tz) -> DeltaResult<DateTime<Tz>> {
    let utc = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::generic(format!("timestamp out of range: {micros}")))?;
    if adjusted_to_utc {
        Ok(utc.with_timezone(&zone))
    } else {
        // the stored micros are a wall-clock reading in `zone`
        zone.from_local_datetime(&utc.naive_utc())
            .earliest()
            .ok_or_else(|| {
                Error::generic(format!("wall-clock time {utc} does not exist in zone {zone}"))
            })
    }
}

fn scalar_at(array: &dyn Array, index: usize) -> DeltaResult<Option<Scalar>> {
    if array.is_null(index) {
        return Ok(None);
    }
    let any = array.as_any();
    let scalar = match array.data_type() {
        ArrowDataType::Boolean => {
            Scalar::Boolean(downcast::<BooleanArray>(any, array)?.value(index))
        }
        ArrowDataType::Int8 => Scalar::Byte(downcast::<Int8Array>(any, array)?.value(index)),
        ArrowDataType::Int16 => Scalar::Short(downcast::<Int16Array>(any, array)?.value(index)),
        ArrowDataType::Int32 => Scalar::Integer(downcast::<Int32Array>(any, array)?.value(index)),
        ArrowDataType::Int64 => Scalar::Long(downcast::<Int64Array>(any, array)?.value(index)),
        ArrowDataType::Float32 => {
            Scalar::Float(downcast::<Float32Array>(any, array)?.value(index))
        }
        ArrowDataType::Float64 => {
            Scalar::Double(downcast::<Float64Array>(any, array)?.value(index))
        }
        ArrowDataType::Utf8 => {
            Scalar::String(downcast::<StringArray>(any, array)?.value(index).to_string())
        }
        ArrowDataType::Binary => {
            Scalar::Binary(downcast::<BinaryArray>(any, array)?.value(index).to_vec())
        }
        ArrowDataType::Date32 => Scalar::Date(downcast::<Date32Array>(any, array)?.value(index)),
        ArrowDataType::Timestamp(TimeUnit::Microsecond, _) => {
            Scalar::Timestamp(downcast::<TimestampMicrosecondArray>(any, array)?.value(index))
        }
        ArrowDataType::Decimal128(precision, scale) => {
            if *scale < 0 {
                return Err(Error::unsupported_type(format!(
                    "negative decimal scale {scale}"
                )));
            }
            let value = downcast::<Decimal128Array>(any, array)?.value(index);
            Scalar::Decimal(Decimal::new(value, *precision, *scale as u8)?)
        }
        other => {
            return Err(Error::unsupported_type(format!(
                "nested element of type {other}"
            )))
        }
    };
    Ok(Some(scalar))
}

fn downcast<'a, T: 'static>(
    any: &'a dyn std::any::Any,
    array: &dyn Array,
) -> DeltaResult<&'a T> {
    any.downcast_ref::<T>().ok_or_else(|| {
        Error::unexpected_column_type(format!(
            "physical array does not match declared type {}",
            array.data_type()
        ))
    })
}

/// A lazy sequence of [`RowRecord`]s over a set of data files.
///
/// Files are drained one at a time in the order given; the underlying column readers are
/// released as each file completes, or when the iterator is dropped.
pub struct RowRecordIterator {
    handler: Arc<dyn ParquetHandler>,
    schema: SchemaRef,
    time_zone: Tz,
    files: std::vec::IntoIter<FileMeta>,
    batches: Option<FileDataReadResultIterator>,
    current: Option<(StructArray, usize)>,
}

impl RowRecordIterator {
    pub(crate) fn new(
        files: Vec<FileMeta>,
        schema: SchemaRef,
        time_zone: Tz,
        handler: Arc<dyn ParquetHandler>,
    ) -> Self {
        Self {
            handler,
            schema,
            time_zone,
            files: files.into_iter(),
            batches: None,
            current: None,
        }
    }

    fn next_batch(&mut self, batch: RecordBatch) {
        self.current = Some((StructArray::from(batch), 0));
    }
}

impl Iterator for RowRecordIterator {
    type Item = DeltaResult<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((columns, row)) = self.current.as_mut() {
                if *row < columns.len() {
                    let record = RowRecord::new(
                        columns.clone(),
                        self.schema.clone(),
                        *row,
                        self.time_zone,
                    );
                    *row += 1;
                    return Some(Ok(record));
                }
                self.current = None;
            }
            if let Some(batches) = self.batches.as_mut() {
                match batches.next() {
                    Some(Ok(batch)) => self.next_batch(batch),
                    Some(Err(err)) => return Some(Err(err)),
                    None => self.batches = None,
                }
                continue;
            }
            let file = self.files.next()?;
            match self.handler.read_parquet_files(&[file], self.schema.clone()) {
                Ok(batches) => self.batches = Some(batches),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow_array::builder::{ListBuilder, StringBuilder};

    use crate::actions::checkpoint::tests::{string_map_array, struct_from};
    use crate::schema::{ArrayType, MapType, StructField};

    fn test_schema() -> SchemaRef {
        Arc::new(StructType::new([
            StructField::new("id", DataType::LONG, false),
            StructField::new("name", DataType::STRING, true),
            StructField::new("ts", DataType::TIMESTAMP, true),
            StructField::new("d", DataType::DATE, true),
            StructField::new("price", DataType::decimal(10, 2).unwrap(), true),
            StructField::new("tags", ArrayType::new(DataType::STRING, true), true),
            StructField::new(
                "attrs",
                MapType::new(DataType::STRING, DataType::STRING, true),
                true,
            ),
            StructField::new(
                "point",
                DataType::struct_type([
                    StructField::new("x", DataType::DOUBLE, false),
                    StructField::new("y", DataType::DOUBLE, false),
                ]),
                true,
            ),
        ]))
    }

    fn test_record(time_zone: Tz) -> RowRecord {
        let mut tags = ListBuilder::new(StringBuilder::new());
        tags.values().append_value("a");
        tags.values().append_null();
        tags.values().append_value("b");
        tags.append(true);

        let point = struct_from(
            vec![
                (
                    "x",
                    Arc::new(Float64Array::from(vec![Some(1.5)])) as ArrayRef,
                ),
                (
                    "y",
                    Arc::new(Float64Array::from(vec![Some(-2.5)])) as ArrayRef,
                ),
            ],
            None,
        );

        // 2020-01-01T08:09:10 in microseconds since the epoch, stored naive
        let micros = 1_577_866_150_000_000_i64;
        let columns = struct_from(
            vec![
                ("id", Arc::new(Int64Array::from(vec![Some(7)])) as ArrayRef),
                (
                    "name",
                    Arc::new(StringArray::from(vec![Some("seven")])) as ArrayRef,
                ),
                (
                    "ts",
                    Arc::new(TimestampMicrosecondArray::from(vec![Some(micros)])) as ArrayRef,
                ),
                (
                    "d",
                    Arc::new(Date32Array::from(vec![Some(18262)])) as ArrayRef,
                ),
                (
                    "price",
                    Arc::new(
                        Decimal128Array::from(vec![Some(123456_i128)])
                            .with_precision_and_scale(10, 2)
                            .unwrap(),
                    ) as ArrayRef,
                ),
                ("tags", Arc::new(tags.finish()) as ArrayRef),
                (
                    "attrs",
                    Arc::new(string_map_array(vec![Some(vec![("k", "v")])])) as ArrayRef,
                ),
                ("point", Arc::new(point) as ArrayRef),
            ],
            None,
        );
        RowRecord::new(columns, test_schema(), 0, time_zone)
    }

    #[test]
    fn test_primitive_accessors() {
        let record = test_record(Tz::UTC);
        assert_eq!(record.get_long("id").unwrap(), Some(7));
        assert_eq!(record.get_string("name").unwrap(), Some("seven".to_string()));
        assert_eq!(record.get_length(), 8);
        assert!(record.get_schema().field("id").is_some());
    }

    #[test]
    fn test_missing_column() {
        let record = test_record(Tz::UTC);
        assert!(matches!(
            record.get_long("nope"),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let record = test_record(Tz::UTC);
        assert!(matches!(
            record.get_string("id"),
            Err(Error::UnexpectedColumnType(_))
        ));
        assert!(matches!(
            record.get_timestamp("id"),
            Err(Error::UnexpectedColumnType(_))
        ));
    }

    #[test]
    fn test_naive_timestamp_read_in_configured_zone() {
        let tokyo = chrono_tz::Asia::Tokyo;
        let record = test_record(tokyo);
        let expected = tokyo.with_ymd_and_hms(2020, 1, 1, 8, 9, 10).unwrap();
        assert_eq!(record.get_timestamp("ts").unwrap(), Some(expected));

        // the same stored value reads as the same wall clock in UTC too
        let record = test_record(Tz::UTC);
        let expected = Tz::UTC.with_ymd_and_hms(2020, 1, 1, 8, 9, 10).unwrap();
        assert_eq!(record.get_timestamp("ts").unwrap(), Some(expected));
    }

    #[test]
    fn test_date() {
        let record = test_record(Tz::UTC);
        assert_eq!(
            record.get_date("d").unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
    }

    #[test]
    fn test_decimal() {
        let record = test_record(Tz::UTC);
        let decimal = record.get_decimal("price").unwrap().unwrap();
        assert_eq!(decimal.to_string(), "1234.56");
        assert_eq!(decimal.precision(), 10);
        assert_eq!(decimal.scale(), 2);
    }

    #[test]
    fn test_list_with_nulls() {
        let record = test_record(Tz::UTC);
        let tags = record.get_list("tags").unwrap().unwrap();
        assert_eq!(
            tags,
            vec![
                Some(Scalar::String("a".to_string())),
                None,
                Some(Scalar::String("b".to_string())),
            ]
        );
    }

    #[test]
    fn test_map() {
        let record = test_record(Tz::UTC);
        let attrs = record.get_map("attrs").unwrap().unwrap();
        assert_eq!(
            attrs,
            vec![(
                Scalar::String("k".to_string()),
                Some(Scalar::String("v".to_string()))
            )]
        );
    }

    #[test]
    fn test_nested_record() {
        let record = test_record(Tz::UTC);
        let point = record.get_record("point").unwrap().unwrap();
        assert_eq!(point.get_double("x").unwrap(), Some(1.5));
        assert_eq!(point.get_double("y").unwrap(), Some(-2.5));
        assert_eq!(point.get_length(), 2);
    }
}
