//! Newline-delimited JSON output.
//!
//! [`JsonLinesSink`] writes one JSON object per row, keyed by the canonical
//! column names, using `serde_json`.

use std::io::Write;

use arrow_schema::SchemaRef;
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};

use crate::connector::{FieldValue, PageSink};
use crate::error::{ConnectorError, SerdeError};

/// [`PageSink`] writing NDJSON to any writer.
///
/// Timestamps are written as RFC 3339 UTC strings; non-finite doubles as
/// `null`.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    columns: Vec<String>,
    rows_written: u64,
    finished: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Creates a sink writing objects with the given column names as keys.
    ///
    /// The names are replaced by the source schema's field names when the
    /// runtime calls `begin`.
    #[must_use]
    pub fn new(writer: W, columns: Vec<String>) -> Self {
        Self {
            writer,
            columns,
            rows_written: 0,
            finished: false,
        }
    }

    /// Returns the number of rows written.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> PageSink for JsonLinesSink<W> {
    fn begin(&mut self, schema: &SchemaRef) -> Result<(), ConnectorError> {
        self.columns = schema.fields().iter().map(|f| f.name().clone()).collect();
        Ok(())
    }

    fn add(&mut self, values: Vec<FieldValue>) -> Result<(), ConnectorError> {
        if values.len() != self.columns.len() {
            return Err(ConnectorError::Serde(SerdeError::MalformedInput(format!(
                "row has {} values but the sink has {} columns",
                values.len(),
                self.columns.len()
            ))));
        }

        let obj: Map<String, Value> = self
            .columns
            .iter()
            .cloned()
            .zip(values.into_iter().map(to_json))
            .collect();

        serde_json::to_writer(&mut self.writer, &Value::Object(obj)).map_err(SerdeError::from)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConnectorError> {
        if self.finished {
            return Err(ConnectorError::InvalidState {
                expected: "open sink".into(),
                actual: "finished".into(),
            });
        }
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl<W: Write + Send> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("columns", &self.columns)
            .field("rows_written", &self.rows_written)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

fn to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Long(v) => Value::Number(v.into()),
        FieldValue::Double(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
        FieldValue::String(s) => Value::String(s),
        FieldValue::Timestamp(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn columns() -> Vec<String> {
        vec!["date_hour".into(), "browser".into(), "sessions".into(), "bounce_rate".into()]
    }

    #[test]
    fn test_writes_ndjson() {
        let mut sink = JsonLinesSink::new(Vec::new(), columns());
        sink.add(vec![
            FieldValue::Timestamp(DateTime::from_timestamp(1_464_768_000, 0).unwrap()),
            FieldValue::String("Chrome".into()),
            FieldValue::Long(3),
            FieldValue::Double(12.5),
        ])
        .unwrap();
        sink.add(vec![
            FieldValue::Null,
            FieldValue::String("Safari".into()),
            FieldValue::Null,
            FieldValue::Double(f64::NAN),
        ])
        .unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.rows_written(), 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(
            lines[0],
            serde_json::json!({
                "date_hour": "2016-06-01T08:00:00Z",
                "browser": "Chrome",
                "sessions": 3,
                "bounce_rate": 12.5
            })
        );
        assert_eq!(lines[1]["sessions"], Value::Null);
        assert_eq!(lines[1]["bounce_rate"], Value::Null);
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let mut sink = JsonLinesSink::new(Vec::new(), columns());
        let err = sink.add(vec![FieldValue::Long(1)]).unwrap_err();
        assert!(matches!(err, ConnectorError::Serde(SerdeError::MalformedInput(_))));
    }

    #[test]
    fn test_begin_takes_schema_names() {
        use arrow_schema::{DataType, Field, Schema};
        use std::sync::Arc;

        let schema = Arc::new(Schema::new(vec![
            Field::new("year_month", DataType::Utf8, true),
            Field::new("users", DataType::Int64, true),
        ]));
        let mut sink = JsonLinesSink::new(Vec::new(), Vec::new());
        sink.begin(&schema).unwrap();
        sink.add(vec![FieldValue::String("2016-05".into()), FieldValue::Long(7)])
            .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "{\"year_month\":\"2016-05\",\"users\":7}\n");
    }

    #[test]
    fn test_finish_twice() {
        let mut sink = JsonLinesSink::new(Vec::new(), Vec::new());
        sink.finish().unwrap();
        assert!(matches!(
            sink.finish(),
            Err(ConnectorError::InvalidState { .. })
        ));
    }
}
