//! Columnar snapshot store.
//!
//! One directory per entity under `datalake/raw/`, each holding a single
//! schema-explicit Parquet table that is overwritten wholesale on every run.
//! The write goes through a temp file and an atomic rename so a reader never
//! sees a torn snapshot; concurrent writers to one path are not supported.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::types::RawRecord;

const SNAPSHOT_FILE: &str = "data.parquet";

// ---------------------------------------------------------------------------
// Column inference
// ---------------------------------------------------------------------------

/// Target type a heterogeneous batch column is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Deterministic column-type inference over a raw batch.
///
/// Columns are the sorted union of keys across all records. All-null columns
/// are dropped. A column is Bool only if every non-null value is a bool, Int
/// if every non-null value is an i64-exact number, Float if every non-null
/// value is numeric; anything else — strings, mixed scalars, nested lists or
/// objects — collapses to Text, with non-string values JSON-serialized on
/// write.
pub fn infer_columns(records: &[RawRecord]) -> Vec<ColumnSpec> {
    let names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();

    let mut specs = Vec::new();
    for name in names {
        let mut any_value = false;
        let mut all_bool = true;
        let mut all_number = true;
        let mut all_int = true;

        for record in records {
            let value = match record.get(name) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            any_value = true;
            match value {
                Value::Bool(_) => {
                    all_number = false;
                    all_int = false;
                }
                Value::Number(n) => {
                    all_bool = false;
                    if n.as_i64().is_none() {
                        all_int = false;
                    }
                }
                _ => {
                    all_bool = false;
                    all_number = false;
                    all_int = false;
                }
            }
        }

        if !any_value {
            debug!("dropping all-null column {name}");
            continue;
        }
        let kind = if all_bool {
            ColumnKind::Bool
        } else if all_number && all_int {
            ColumnKind::Int
        } else if all_number {
            ColumnKind::Float
        } else {
            ColumnKind::Text
        };
        specs.push(ColumnSpec { name: name.to_string(), kind });
    }
    specs
}

fn cell_bool(value: &Value) -> Option<bool> {
    value.as_bool()
}

fn cell_int(value: &Value) -> Option<i64> {
    value.as_i64()
}

fn cell_float(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => serde_json::to_string(other).ok(),
    }
}

/// Materialize the batch against the inferred schema.
pub fn build_batch(records: &[RawRecord], specs: &[ColumnSpec]) -> Result<RecordBatch> {
    let fields: Vec<Field> = specs
        .iter()
        .map(|spec| {
            let data_type = match spec.kind {
                ColumnKind::Bool => DataType::Boolean,
                ColumnKind::Int => DataType::Int64,
                ColumnKind::Float => DataType::Float64,
                ColumnKind::Text => DataType::Utf8,
            };
            Field::new(&spec.name, data_type, true)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(specs.len());
    for spec in specs {
        let cells = records.iter().map(|r| r.get(&spec.name));
        let array: ArrayRef = match spec.kind {
            ColumnKind::Bool => {
                Arc::new(cells.map(|v| v.and_then(cell_bool)).collect::<BooleanArray>())
            }
            ColumnKind::Int => {
                Arc::new(cells.map(|v| v.and_then(cell_int)).collect::<Int64Array>())
            }
            ColumnKind::Float => {
                Arc::new(cells.map(|v| v.and_then(cell_float)).collect::<Float64Array>())
            }
            ColumnKind::Text => {
                Arc::new(cells.map(|v| v.and_then(cell_text)).collect::<StringArray>())
            }
        };
        columns.push(array);
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

// ---------------------------------------------------------------------------
// Write / read
// ---------------------------------------------------------------------------

pub fn snapshot_exists(dir: &Path) -> bool {
    dir.join(SNAPSHOT_FILE).is_file()
}

/// Persist a batch as the entity's current snapshot, replacing any prior one.
pub fn write_snapshot(records: &[RawRecord], dir: &Path) -> Result<usize> {
    if records.is_empty() {
        return Err(AppError::Snapshot(format!("empty batch for {}", dir.display())));
    }
    let specs = infer_columns(records);
    if specs.is_empty() {
        return Err(AppError::Snapshot(format!(
            "no non-null columns in batch for {}",
            dir.display()
        )));
    }

    let batch = build_batch(records, &specs)?;
    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    let file = File::create(&tmp_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    fs::rename(&tmp_path, dir.join(SNAPSHOT_FILE))?;

    info!(
        "snapshot written: {} ({} records, {} columns)",
        dir.display(),
        records.len(),
        specs.len()
    );
    Ok(records.len())
}

/// Read the full current snapshot back as a record batch. Null cells are
/// simply absent from the returned maps.
pub fn read_snapshot(dir: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(dir.join(SNAPSHOT_FILE))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        append_rows(&batch, &mut records)?;
    }
    Ok(records)
}

fn append_rows(batch: &RecordBatch, records: &mut Vec<RawRecord>) -> Result<()> {
    let schema = batch.schema();
    for row in 0..batch.num_rows() {
        let mut record = RawRecord::new();
        for (col, field) in schema.fields().iter().enumerate() {
            let array = batch.column(col);
            if array.is_null(row) {
                continue;
            }
            let value = match field.data_type() {
                DataType::Boolean => array
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .map(|a| Value::Bool(a.value(row))),
                DataType::Int64 => array
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .map(|a| Value::from(a.value(row))),
                DataType::Float64 => array
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .map(|a| Value::from(a.value(row))),
                DataType::Utf8 => array
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .map(|a| Value::String(a.value(row).to_string())),
                other => {
                    return Err(AppError::Snapshot(format!(
                        "unexpected snapshot column type {other} for {}",
                        field.name()
                    )))
                }
            };
            if let Some(value) = value {
                record.insert(field.name().clone(), value);
            }
        }
        records.push(record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn inference_drops_all_null_and_sorts_columns() {
        let records = vec![
            record(json!({"b_flag": true, "a_id": "1", "ghost": null, "n": 1})),
            record(json!({"b_flag": false, "a_id": "2", "ghost": null, "n": 2.5})),
        ];
        let specs = infer_columns(&records);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a_id", "b_flag", "n"]);
        assert_eq!(specs[1].kind, ColumnKind::Bool);
        // int in one row, float in another → Float
        assert_eq!(specs[2].kind, ColumnKind::Float);
    }

    #[test]
    fn mixed_scalars_collapse_to_text() {
        let records = vec![
            record(json!({"x": "abc"})),
            record(json!({"x": 42})),
        ];
        let specs = infer_columns(&records);
        assert_eq!(specs[0].kind, ColumnKind::Text);
    }

    #[test]
    fn snapshot_roundtrip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record(json!({
                "id": "m1",
                "closed": true,
                "volume": 12.5,
                "rank": 3,
                "outcomes": ["YES", "NO"]
            })),
            record(json!({"id": "m2", "closed": false, "volume": 0.0, "rank": 9})),
        ];

        let written = write_snapshot(&records, dir.path()).unwrap();
        assert_eq!(written, 2);
        assert!(snapshot_exists(dir.path()));

        let back = read_snapshot(dir.path()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].get("id"), Some(&json!("m1")));
        assert_eq!(back[0].get("closed"), Some(&json!(true)));
        assert_eq!(back[0].get("rank"), Some(&json!(3)));
        // nested values come back JSON-serialized
        assert_eq!(back[0].get("outcomes"), Some(&json!("[\"YES\",\"NO\"]")));
        // null cell in row 2 is absent, not Value::Null
        assert!(!back[1].contains_key("outcomes"));
    }

    #[test]
    fn rewriting_overwrites_the_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let first = vec![record(json!({"id": "a"})), record(json!({"id": "b"}))];
        let second = vec![record(json!({"id": "c"}))];

        write_snapshot(&first, dir.path()).unwrap();
        write_snapshot(&second, dir.path()).unwrap();

        let back = read_snapshot(dir.path()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].get("id"), Some(&json!("c")));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_snapshot(&[], dir.path()).is_err());
    }
}
