use serde_json::Value;
use tracing::info;

use super::{clean_batch, FieldKind};
use crate::normalize::{decode_list, value_key};
use crate::types::RawRecord;

/// Column→type table for the markets collection.
const MARKET_COLUMNS: &[(&str, FieldKind)] = &[
    ("active", FieldKind::Bool),
    ("closed", FieldKind::Bool),
    ("featured", FieldKind::Bool),
    ("question", FieldKind::Text(2048)),
    ("marketType", FieldKind::Text(2048)),
    ("slug", FieldKind::Text(2048)),
    ("category", FieldKind::Text(2048)),
    ("subcategory", FieldKind::Text(2048)),
    ("resolutionSource", FieldKind::Text(2048)),
    ("description", FieldKind::Text(2048)),
    ("volume", FieldKind::Number),
    ("volume24hr", FieldKind::Number),
    ("volume1wk", FieldKind::Number),
    ("volume1mo", FieldKind::Number),
    ("volume1yr", FieldKind::Number),
    ("liquidity", FieldKind::Number),
    ("liquidityAmm", FieldKind::Number),
    ("liquidityClob", FieldKind::Number),
    ("lastTradePrice", FieldKind::Number),
    ("bestBid", FieldKind::Number),
    ("bestAsk", FieldKind::Number),
    ("spread", FieldKind::Number),
    ("openInterest", FieldKind::Number),
    ("fee", FieldKind::Number),
    ("endDate", FieldKind::Timestamp),
    ("createdAt", FieldKind::Timestamp),
    ("updatedAt", FieldKind::Timestamp),
    ("outcomes", FieldKind::Outcomes),
    ("outcomePrices", FieldKind::Prices),
];

pub fn clean_markets(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let before = records.len();
    let cleaned = clean_batch(records, MARKET_COLUMNS);
    info!("markets cleaned: {} of {} records kept", cleaned.len(), before);
    cleaned
}

/// `(market_id, event_id)` pairs from the embedded `events` relation field.
///
/// The field arrives in several shapes across API versions: a list of
/// embedded event objects, a single object, a bare id list, or any of those
/// serialized as a Python-literal string. Whatever the wrapper, the nested
/// `id` is what matters.
pub fn market_event_relations(markets: &[RawRecord]) -> Vec<(String, String)> {
    let mut relations = Vec::new();
    for market in markets {
        let Some(market_id) = market.get("id").and_then(value_key) else {
            continue;
        };
        let Some(value) = market.get("events") else {
            continue;
        };
        for event_id in embedded_ids(value) {
            relations.push((market_id.clone(), event_id));
        }
    }
    relations
}

/// Natural ids out of an embedded relation value.
fn embedded_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => obj.get("id").and_then(value_key).into_iter().collect(),
        Value::Array(_) | Value::String(_) => {
            let Some(items) = decode_list(value) else {
                return Vec::new();
            };
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => obj.get("id").and_then(value_key),
                    other => value_key(other),
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn cleans_numeric_and_list_fields() {
        let raw = vec![record(json!({
            "id": "m1",
            "question": "Will it rain?",
            "volume": "1.234,56",
            "liquidity": "1,234.56",
            "outcomes": "['yes', ' no ']",
            "outcomePrices": "['0.45', '0.55']"
        }))];
        let cleaned = clean_markets(raw);
        let market = &cleaned[0];

        assert_eq!(market.get("volume"), Some(&json!(1234.56)));
        assert_eq!(market.get("liquidity"), Some(&json!(1234.56)));
        assert_eq!(market.get("outcomes"), Some(&json!(["YES", "NO"])));
        assert_eq!(market.get("outcomePrices"), Some(&json!([0.45, 0.55])));
    }

    #[test]
    fn relations_from_embedded_object_list() {
        let markets = vec![record(json!({
            "id": "m1",
            "events": [{"id": "e1", "title": "x"}, {"id": "e2"}]
        }))];
        assert_eq!(
            market_event_relations(&markets),
            vec![("m1".into(), "e1".into()), ("m1".into(), "e2".into())]
        );
    }

    #[test]
    fn relations_from_single_object_and_literal_string() {
        let markets = vec![
            record(json!({"id": "m1", "events": {"id": "e9"}})),
            record(json!({"id": "m2", "events": "['e1', 'e2']"})),
            record(json!({"id": "m3", "events": "not-a-list"})),
        ];
        assert_eq!(
            market_event_relations(&markets),
            vec![
                ("m1".into(), "e9".into()),
                ("m2".into(), "e1".into()),
                ("m2".into(), "e2".into()),
            ]
        );
    }
}
