//! Scalar and list-field normalizers for raw Gamma records.
//!
//! Every function here is total: malformed input yields `None` (or drops the
//! offending element), never an error. Upstream the API mixes native types
//! with stringified ones freely, so each normalizer accepts any
//! `serde_json::Value`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

use crate::types::RawRecord;

const TRUE_TOKENS: &[&str] = &["true", "yes", "1", "t", "y", "si", "sí"];
const FALSE_TOKENS: &[&str] = &["false", "no", "0", "f", "n"];

/// Boolean from any of the encodings seen in the wild: native bools, 0/1
/// numerics, and a fixed token set (`"True"`, `"yes"`, `"sí"`, ...).
pub fn normalize_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f.trunc() != 0.0),
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            if TRUE_TOKENS.contains(&lower.as_str()) {
                Some(true)
            } else if FALSE_TOKENS.contains(&lower.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Parse a number in US (`1,234.56`) or European (`1.234,56`) grouping.
///
/// The rightmost of `.` vs `,` decides the decimal separator. A comma-only
/// string (`"1,234"`) is always read as thousands-grouped. Known limitation:
/// a European comma-decimal with no dot grouping comes out as an integer.
/// The rule is fixed; intent is never inferred from surrounding rows.
pub fn normalize_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            let dots = s.matches('.').count();
            let commas = s.matches(',').count();

            let cleaned = if dots > 0 && commas == 1 && s.rfind(',') > s.rfind('.') {
                // European: dots group thousands, comma is the decimal point
                s.replace('.', "").replace(',', ".")
            } else if commas > 0 && dots == 0 {
                // Commas with no dot: thousands separators
                s.replace(',', "")
            } else {
                s.to_string()
            };
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Clean a free-text field: strip control characters (newline/tab/CR kept
/// just long enough to act as separators), collapse whitespace runs, trim,
/// and cap at `max_length` characters. Empty-after-cleaning is `None`.
/// Numbers and bools are stringified; nulls and nested values are not.
pub fn clean_string(value: &Value, max_length: usize) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    let stripped: String = raw
        .chars()
        .filter(|c| *c as u32 >= 32 || matches!(c, '\n' | '\t' | '\r'))
        .collect();
    let mut cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() > max_length {
        cleaned = cleaned.chars().take(max_length).collect();
    }

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Decode a field that is either a native JSON list or a Python-literal list
/// serialized into a string, e.g. `"['YES', ' NO']"`. Single quotes are
/// rewritten to double quotes before parsing; non-list results are `None`.
pub fn decode_list(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => {
            let s = s.trim();
            if !s.starts_with('[') {
                return None;
            }
            match serde_json::from_str::<Value>(&s.replace('\'', "\"")) {
                Ok(Value::Array(items)) => Some(items),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Price list: each element coerced to f64, unparseable elements dropped.
/// `"['0.45', '0.55']"` → `[0.45, 0.55]`.
pub fn normalize_prices(value: &Value) -> Option<Vec<f64>> {
    let items = decode_list(value)?;
    let prices: Vec<f64> = items.iter().filter_map(normalize_numeric).collect();
    if prices.is_empty() {
        None
    } else {
        Some(prices)
    }
}

/// Outcome labels: trimmed, upper-cased. `"[' yes', 'no ']"` → `["YES", "NO"]`.
pub fn normalize_outcomes(value: &Value) -> Option<Vec<String>> {
    let items = decode_list(value)?;
    let outcomes: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if outcomes.is_empty() {
        None
    } else {
        Some(outcomes)
    }
}

/// Tag names: trimmed, lower-cased, deduplicated keeping first occurrence.
pub fn parse_tags(value: &Value) -> Option<Vec<String>> {
    let items = decode_list(value)?;
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for item in &items {
        if let Some(s) = item.as_str() {
            let tag = s.trim().to_lowercase();
            if !tag.is_empty() && seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }
    }
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Parse a timestamp string: RFC 3339 first, then the common bare formats
/// Gamma has shipped over time, down to a plain calendar date.
pub fn normalize_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = match value {
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Ordered fallback lookup: first alias present with a non-null value wins.
/// Handles fields renamed across API versions (`event_id` / `event` /
/// `eventId`).
pub fn pick<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|v| !v.is_null())
}

/// Stringify a scalar natural id (Gamma sends both strings and numbers).
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boolean_accepts_known_tokens() {
        for v in [json!(true), json!("True"), json!("yes"), json!(1), json!("sí"), json!("Y")] {
            assert_eq!(normalize_boolean(&v), Some(true), "input: {v}");
        }
        for v in [json!(false), json!("False"), json!("no"), json!(0), json!("n")] {
            assert_eq!(normalize_boolean(&v), Some(false), "input: {v}");
        }
    }

    #[test]
    fn boolean_rejects_unknown_strings() {
        assert_eq!(normalize_boolean(&json!("maybe")), None);
        assert_eq!(normalize_boolean(&json!("")), None);
        assert_eq!(normalize_boolean(&json!(null)), None);
        assert_eq!(normalize_boolean(&json!([1])), None);
    }

    #[test]
    fn numeric_handles_both_locales() {
        assert_eq!(normalize_numeric(&json!("1.234,56")), Some(1234.56));
        assert_eq!(normalize_numeric(&json!("1,234.56")), Some(1234.56));
        assert_eq!(normalize_numeric(&json!("123.45")), Some(123.45));
        assert_eq!(normalize_numeric(&json!(42)), Some(42.0));
        assert_eq!(normalize_numeric(&json!("abc")), None);
    }

    #[test]
    fn numeric_comma_only_is_thousands_grouped() {
        // Fixed rule: no dot means commas are separators, even for "1,234"
        assert_eq!(normalize_numeric(&json!("1,234")), Some(1234.0));
        assert_eq!(normalize_numeric(&json!("1,234,567")), Some(1_234_567.0));
    }

    #[test]
    fn clean_string_strips_and_collapses() {
        assert_eq!(clean_string(&json!(" a   b \u{1}"), 5000), Some("a b".to_string()));
        assert_eq!(clean_string(&json!("  \t \n "), 5000), None);
        assert_eq!(clean_string(&json!(null), 5000), None);
        assert_eq!(clean_string(&json!(3.5), 5000), Some("3.5".to_string()));
    }

    #[test]
    fn clean_string_truncates_on_char_boundary() {
        let out = clean_string(&json!("ááááá"), 3).unwrap();
        assert_eq!(out, "ááá");
    }

    #[test]
    fn outcomes_from_python_literal() {
        assert_eq!(
            normalize_outcomes(&json!("['yes', ' no ']")),
            Some(vec!["YES".to_string(), "NO".to_string()])
        );
        assert_eq!(normalize_outcomes(&json!("not a list")), None);
        assert_eq!(normalize_outcomes(&json!(["Up", "Down"])), Some(vec!["UP".into(), "DOWN".into()]));
    }

    #[test]
    fn prices_coerce_each_element() {
        assert_eq!(normalize_prices(&json!("['0.45', '0.55']")), Some(vec![0.45, 0.55]));
        assert_eq!(normalize_prices(&json!([0.1, "0.9", "junk"])), Some(vec![0.1, 0.9]));
        assert_eq!(normalize_prices(&json!("['junk']")), None);
    }

    #[test]
    fn tags_lowercase_and_dedup() {
        assert_eq!(
            parse_tags(&json!("['Esports', 'NBA', 'esports ']")),
            Some(vec!["esports".to_string(), "nba".to_string()])
        );
    }

    #[test]
    fn timestamps_parse_common_formats() {
        assert!(normalize_timestamp(&json!("2024-03-01T12:30:00Z")).is_some());
        assert!(normalize_timestamp(&json!("2024-03-01T12:30:00")).is_some());
        assert!(normalize_timestamp(&json!("2024-03-01 12:30:00")).is_some());
        let midnight = normalize_timestamp(&json!("2024-03-01")).unwrap();
        assert_eq!(midnight.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(normalize_timestamp(&json!("soon")), None);
    }

    #[test]
    fn pick_walks_alias_list_skipping_nulls() {
        let record: RawRecord =
            serde_json::from_value(json!({"event_id": null, "eventId": "77"})).unwrap();
        let hit = pick(&record, &["event_id", "event", "eventId"]).unwrap();
        assert_eq!(hit, &json!("77"));
        assert!(pick(&record, &["missing"]).is_none());
    }
}
