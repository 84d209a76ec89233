use serde_json::Value;
use tracing::info;

use super::{clean_batch, FieldKind};
use crate::normalize::value_key;
use crate::types::RawRecord;

/// Column→type table for the events collection.
const EVENT_COLUMNS: &[(&str, FieldKind)] = &[
    ("active", FieldKind::Bool),
    ("closed", FieldKind::Bool),
    ("featured", FieldKind::Bool),
    ("resolved", FieldKind::Bool),
    ("title", FieldKind::Text(2048)),
    ("description", FieldKind::Text(2048)),
    ("category", FieldKind::Text(2048)),
    ("subcategory", FieldKind::Text(2048)),
    ("ticker", FieldKind::Text(2048)),
    ("slug", FieldKind::Text(2048)),
    ("sport", FieldKind::Text(2048)),
    ("resolutionSource", FieldKind::Text(2048)),
    ("seriesSlug", FieldKind::Text(2048)),
    ("startDate", FieldKind::Timestamp),
    ("endDate", FieldKind::Timestamp),
    ("creationDate", FieldKind::Timestamp),
    ("createdAt", FieldKind::Timestamp),
    ("updatedAt", FieldKind::Timestamp),
    ("tags", FieldKind::Tags),
];

pub fn clean_events(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let before = records.len();
    let cleaned = clean_batch(records, EVENT_COLUMNS);
    info!("events cleaned: {} of {} records kept", cleaned.len(), before);
    cleaned
}

/// `(event_id, tag_name)` pairs from the cleaned `tags` lists.
pub fn event_tag_relations(events: &[RawRecord]) -> Vec<(String, String)> {
    let mut relations = Vec::new();
    for event in events {
        let Some(event_id) = event.get("id").and_then(value_key) else {
            continue;
        };
        let Some(Value::Array(tags)) = event.get("tags") else {
            continue;
        };
        for tag in tags {
            if let Some(s) = tag.as_str() {
                let tag = s.trim().to_lowercase();
                if !tag.is_empty() {
                    relations.push((event_id.clone(), tag));
                }
            }
        }
    }
    relations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn cleans_mixed_event_fields() {
        let raw = vec![record(json!({
            "id": "e1",
            "active": "yes",
            "closed": 0,
            "title": "  Election   night ",
            "startDate": "2024-11-05T00:00:00Z",
            "tags": "['Politics', 'us-election', 'politics']"
        }))];
        let cleaned = clean_events(raw);
        let event = &cleaned[0];

        assert_eq!(event.get("active"), Some(&json!(true)));
        assert_eq!(event.get("closed"), Some(&json!(false)));
        assert_eq!(event.get("title"), Some(&json!("Election night")));
        assert_eq!(event.get("tags"), Some(&json!(["politics", "us-election"])));
    }

    #[test]
    fn tag_relations_come_from_cleaned_lists() {
        let events = vec![
            record(json!({"id": "e1", "tags": ["esports", "valorant"]})),
            record(json!({"id": "e2", "tags": null})),
            record(json!({"tags": ["orphaned"]})),
        ];
        let relations = event_tag_relations(&events);
        assert_eq!(
            relations,
            vec![
                ("e1".to_string(), "esports".to_string()),
                ("e1".to_string(), "valorant".to_string()),
            ]
        );
    }
}
