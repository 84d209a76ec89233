use serde_json::{Map, Value};

/// One raw record as returned by the Gamma API: an open field map. No field
/// set is guaranteed — the schema drifts between pages and API versions.
pub type RawRecord = Map<String, Value>;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// The four top-level Gamma collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Event,
    Market,
    Series,
    Tag,
}

impl EntityKind {
    /// Extraction order: leaf collections first, markets last.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Tag,
        EntityKind::Series,
        EntityKind::Event,
        EntityKind::Market,
    ];

    /// Endpoint path segment; doubles as the snapshot directory name.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Event => "events",
            EntityKind::Market => "markets",
            EntityKind::Series => "series",
            EntityKind::Tag => "tags",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

/// Shape of a Gamma page response body.
///
/// Endpoints answer with a bare array, `{"data": [...]}`, or an object keyed
/// by the entity name itself; any other object is treated as a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    List,
    DataWrapper,
    NamedWrapper,
    Singleton,
}

/// Classify `body` and unwrap it into its record list. Non-object array
/// elements are dropped; scalar bodies yield nothing.
pub fn resolve_envelope(body: Value, entity: &str) -> (Envelope, Vec<RawRecord>) {
    match body {
        Value::Array(items) => (Envelope::List, to_records(items)),
        Value::Object(mut obj) => {
            if let Some(Value::Array(items)) = obj.remove("data") {
                (Envelope::DataWrapper, to_records(items))
            } else if let Some(Value::Array(items)) = obj.remove(entity) {
                (Envelope::NamedWrapper, to_records(items))
            } else {
                (Envelope::Singleton, vec![obj])
            }
        }
        _ => (Envelope::Singleton, Vec::new()),
    }
}

fn to_records(items: Vec<Value>) -> Vec<RawRecord> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(obj),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_is_list() {
        let (shape, records) = resolve_envelope(json!([{"id": "1"}, {"id": "2"}]), "events");
        assert_eq!(shape, Envelope::List);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn data_key_is_unwrapped() {
        let (shape, records) = resolve_envelope(json!({"data": [{"id": "1"}]}), "events");
        assert_eq!(shape, Envelope::DataWrapper);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("id"), Some(&json!("1")));
    }

    #[test]
    fn entity_key_is_unwrapped() {
        let (shape, records) = resolve_envelope(json!({"markets": [{"id": "m1"}]}), "markets");
        assert_eq!(shape, Envelope::NamedWrapper);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn unknown_object_becomes_singleton() {
        let (shape, records) = resolve_envelope(json!({"id": "42", "title": "x"}), "events");
        assert_eq!(shape, Envelope::Singleton);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("id"), Some(&json!("42")));
    }

    #[test]
    fn scalar_body_yields_nothing() {
        let (shape, records) = resolve_envelope(json!("oops"), "events");
        assert_eq!(shape, Envelope::Singleton);
        assert!(records.is_empty());
    }

    #[test]
    fn non_object_array_elements_dropped() {
        let (_, records) = resolve_envelope(json!([{"id": "1"}, 7, "x"]), "events");
        assert_eq!(records.len(), 1);
    }
}
