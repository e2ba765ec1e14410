//! Record conversion between Arrow `RecordBatch` and sink rows.
//!
//! - [`batch_to_rows`]: splits a batch into rows of [`FieldValue`]
//! - [`json`]: newline-delimited JSON [`PageSink`](crate::connector::PageSink)

pub mod json;

use arrow_array::{
    Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, TimestampSecondArray,
};
use arrow_schema::{DataType, TimeUnit};
use chrono::DateTime;

use crate::connector::FieldValue;
use crate::error::SerdeError;

/// Converts a batch into rows of typed values, in column order.
///
/// # Errors
///
/// Returns `SerdeError::TypeConversion` for a column type the connector
/// never produces, or `SerdeError::MalformedInput` for an out-of-range
/// timestamp.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Vec<FieldValue>>, SerdeError> {
    let schema = batch.schema();
    let mut rows = vec![Vec::with_capacity(batch.num_columns()); batch.num_rows()];

    for (col_idx, field) in schema.fields().iter().enumerate() {
        let column = batch.column(col_idx);
        for (row_idx, row) in rows.iter_mut().enumerate() {
            row.push(field_value(column, row_idx, field.data_type(), field.name())?);
        }
    }
    Ok(rows)
}

fn field_value(
    column: &ArrayRef,
    row: usize,
    data_type: &DataType,
    name: &str,
) -> Result<FieldValue, SerdeError> {
    if column.is_null(row) {
        return Ok(FieldValue::Null);
    }

    let mismatch = || SerdeError::TypeConversion {
        field: name.to_string(),
        expected: data_type.to_string(),
        message: "column array does not match its declared type".into(),
    };

    match data_type {
        DataType::Int64 => {
            let arr = column
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(mismatch)?;
            Ok(FieldValue::Long(arr.value(row)))
        }
        DataType::Float64 => {
            let arr = column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(mismatch)?;
            Ok(FieldValue::Double(arr.value(row)))
        }
        DataType::Utf8 => {
            let arr = column
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(mismatch)?;
            Ok(FieldValue::String(arr.value(row).to_string()))
        }
        DataType::Timestamp(TimeUnit::Second, _) => {
            let arr = column
                .as_any()
                .downcast_ref::<TimestampSecondArray>()
                .ok_or_else(mismatch)?;
            let secs = arr.value(row);
            DateTime::from_timestamp(secs, 0)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| {
                    SerdeError::MalformedInput(format!(
                        "timestamp {secs} out of range in column '{name}'"
                    ))
                })
        }
        other => Err(SerdeError::TypeConversion {
            field: name.to_string(),
            expected: "Int64, Float64, Utf8 or Timestamp(Second)".into(),
            message: format!("unsupported column type {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::BooleanArray;
    use arrow_schema::{Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_batch_to_rows() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                "date_hour",
                DataType::Timestamp(TimeUnit::Second, Some("UTC".into())),
                true,
            ),
            Field::new("browser", DataType::Utf8, true),
            Field::new("sessions", DataType::Int64, true),
            Field::new("bounce_rate", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(
                    TimestampSecondArray::from(vec![1_464_768_000, 1_464_771_600])
                        .with_timezone("UTC"),
                ),
                Arc::new(StringArray::from(vec![Some("Chrome"), None])),
                Arc::new(Int64Array::from(vec![Some(3), None])),
                Arc::new(Float64Array::from(vec![12.5, 0.0])),
            ],
        )
        .unwrap();

        let rows = batch_to_rows(&batch).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            vec![
                FieldValue::Timestamp(DateTime::from_timestamp(1_464_768_000, 0).unwrap()),
                FieldValue::String("Chrome".into()),
                FieldValue::Long(3),
                FieldValue::Double(12.5),
            ]
        );
        assert_eq!(rows[1][1], FieldValue::Null);
        assert_eq!(rows[1][2], FieldValue::Null);
    }

    #[test]
    fn test_unsupported_type() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "flag",
            DataType::Boolean,
            true,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(BooleanArray::from(vec![true]))]).unwrap();
        let err = batch_to_rows(&batch).unwrap_err();
        assert!(matches!(err, SerdeError::TypeConversion { ref field, .. } if field == "flag"));
    }

    #[test]
    fn test_empty_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
        let batch = RecordBatch::new_empty(schema);
        assert!(batch_to_rows(&batch).unwrap().is_empty());
    }
}
