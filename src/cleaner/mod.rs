//! Per-entity cleaning pipelines.
//!
//! Each pipeline dedups by natural id and normalizes a fixed set of mapped
//! columns; everything else passes through untouched so downstream code can
//! still reach fields the mapping tables don't know about.

pub mod events;
pub mod gaming;
pub mod markets;

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::normalize::{
    clean_string, normalize_boolean, normalize_numeric, normalize_outcomes, normalize_prices,
    normalize_timestamp, parse_tags, value_key,
};
use crate::types::RawRecord;

/// Canonical type a mapped column is normalized to.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Bool,
    Number,
    /// Cleaned string capped at the given character count.
    Text(usize),
    Timestamp,
    Prices,
    Outcomes,
    Tags,
}

/// Apply one normalizer. Unparseable values collapse to `Value::Null` —
/// cleaning never fails a batch.
fn normalize_field(value: &Value, kind: FieldKind) -> Value {
    match kind {
        FieldKind::Bool => normalize_boolean(value).map(Value::Bool).unwrap_or(Value::Null),
        FieldKind::Number => normalize_numeric(value).map(Value::from).unwrap_or(Value::Null),
        FieldKind::Text(max) => {
            clean_string(value, max).map(Value::String).unwrap_or(Value::Null)
        }
        FieldKind::Timestamp => normalize_timestamp(value)
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null),
        FieldKind::Prices => normalize_prices(value)
            .map(|prices| Value::Array(prices.into_iter().map(Value::from).collect()))
            .unwrap_or(Value::Null),
        FieldKind::Outcomes => normalize_outcomes(value)
            .map(|outcomes| Value::Array(outcomes.into_iter().map(Value::String).collect()))
            .unwrap_or(Value::Null),
        FieldKind::Tags => parse_tags(value)
            .map(|tags| Value::Array(tags.into_iter().map(Value::String).collect()))
            .unwrap_or(Value::Null),
    }
}

/// Dedup by natural id (first occurrence wins, input order preserved), then
/// normalize every mapped column that is present.
pub fn clean_batch(records: Vec<RawRecord>, columns: &[(&str, FieldKind)]) -> Vec<RawRecord> {
    let before = records.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<RawRecord> = Vec::with_capacity(records.len());

    for mut record in records {
        if let Some(id) = record.get("id").and_then(value_key) {
            if !seen.insert(id) {
                continue;
            }
        }
        for (name, kind) in columns {
            if let Some(value) = record.get(*name) {
                let normalized = normalize_field(value, *kind);
                record.insert((*name).to_string(), normalized);
            }
        }
        out.push(record);
    }

    if out.len() < before {
        debug!("dropped {} duplicate records", before - out.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_input_order() {
        let records = vec![
            record(json!({"id": "42", "title": "first"})),
            record(json!({"id": "7", "title": "other"})),
            record(json!({"id": "42", "title": "second"})),
        ];
        let cleaned = clean_batch(records, &[("title", FieldKind::Text(100))]);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].get("title"), Some(&json!("first")));
        assert_eq!(cleaned[1].get("id"), Some(&json!("7")));
    }

    #[test]
    fn unparseable_values_become_null_not_errors() {
        let records = vec![record(json!({
            "id": "1",
            "active": "definitely",
            "volume": "not a number",
            "endDate": "tomorrow-ish"
        }))];
        let cleaned = clean_batch(
            records,
            &[
                ("active", FieldKind::Bool),
                ("volume", FieldKind::Number),
                ("endDate", FieldKind::Timestamp),
            ],
        );
        assert_eq!(cleaned[0].get("active"), Some(&json!(null)));
        assert_eq!(cleaned[0].get("volume"), Some(&json!(null)));
        assert_eq!(cleaned[0].get("endDate"), Some(&json!(null)));
    }

    #[test]
    fn unmapped_columns_pass_through() {
        let records = vec![record(json!({"id": "1", "mystery": {"deep": true}}))];
        let cleaned = clean_batch(records, &[("active", FieldKind::Bool)]);
        assert_eq!(cleaned[0].get("mystery"), Some(&json!({"deep": true})));
    }
}
