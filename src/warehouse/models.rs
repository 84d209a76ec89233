//! Row shapes bound to the star schema, built out of cleaned records.
//!
//! Construction re-runs the scalar normalizers, so the loader accepts both
//! freshly-cleaned batches and snapshots read back off disk (where cleaned
//! values round-trip as strings).

use chrono::{DateTime, NaiveDate, Utc};

use crate::normalize::{
    clean_string, normalize_boolean, normalize_numeric, normalize_outcomes, normalize_timestamp,
    value_key,
};
use crate::types::RawRecord;

fn text(record: &RawRecord, key: &str, max: usize) -> Option<String> {
    record.get(key).and_then(|v| clean_string(v, max))
}

fn flag(record: &RawRecord, key: &str) -> bool {
    record.get(key).and_then(normalize_boolean).unwrap_or(false)
}

fn num(record: &RawRecord, key: &str) -> Option<f64> {
    record.get(key).and_then(normalize_numeric)
}

fn ts(record: &RawRecord, key: &str) -> Option<DateTime<Utc>> {
    record.get(key).and_then(normalize_timestamp)
}

// ---------------------------------------------------------------------------
// dim_event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventRow {
    pub event_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub ticker: Option<String>,
    pub slug: Option<String>,
    pub is_active: bool,
    pub is_closed: bool,
    pub is_featured: bool,
    pub creation_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub resolution_source: Option<String>,
    pub series_slug: Option<String>,
    pub sport: Option<String>,
}

impl EventRow {
    /// None when the natural id is missing — such rows can't be keyed.
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let event_id = record.get("id").and_then(value_key)?;
        Some(Self {
            event_id,
            title: text(record, "title", 2048),
            description: text(record, "description", 5000),
            category: text(record, "category", 200),
            subcategory: text(record, "subcategory", 200),
            ticker: text(record, "ticker", 500),
            slug: text(record, "slug", 500),
            is_active: flag(record, "active"),
            is_closed: flag(record, "closed"),
            is_featured: flag(record, "featured"),
            creation_date: ts(record, "creationDate"),
            start_date: ts(record, "startDate"),
            end_date: ts(record, "endDate"),
            resolution_source: text(record, "resolutionSource", 500),
            series_slug: text(record, "seriesSlug", 500),
            sport: text(record, "sport", 200),
        })
    }
}

// ---------------------------------------------------------------------------
// dim_market
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MarketRow {
    pub market_id: String,
    pub question: Option<String>,
    pub market_type: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_closed: bool,
    pub is_featured: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub resolution_source: Option<String>,
    pub description: Option<String>,
    /// JSON-encoded outcome labels, capped to fit the column.
    pub outcomes: Option<String>,
}

impl MarketRow {
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let market_id = record.get("id").and_then(value_key)?;
        let outcomes = record
            .get("outcomes")
            .and_then(normalize_outcomes)
            .and_then(|list| serde_json::to_string(&list).ok())
            .map(|s| s.chars().take(2000).collect());
        Some(Self {
            market_id,
            question: text(record, "question", 2048),
            market_type: text(record, "marketType", 100),
            slug: text(record, "slug", 500),
            category: text(record, "category", 200),
            subcategory: text(record, "subcategory", 200),
            end_date: ts(record, "endDate"),
            is_active: flag(record, "active"),
            is_closed: flag(record, "closed"),
            is_featured: flag(record, "featured"),
            created_at: ts(record, "createdAt"),
            updated_at: ts(record, "updatedAt"),
            resolution_source: text(record, "resolutionSource", 500),
            description: text(record, "description", 5000),
            outcomes,
        })
    }
}

// ---------------------------------------------------------------------------
// dim_series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SeriesRow {
    pub series_id: String,
    pub series_slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl SeriesRow {
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let series_id = record.get("id").and_then(value_key)?;
        Some(Self {
            series_id,
            series_slug: text(record, "slug", 500),
            title: text(record, "title", 2048),
            description: text(record, "description", 5000),
        })
    }
}

// ---------------------------------------------------------------------------
// fact_market_metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricRow {
    pub market_id: String,
    /// Snapshot date: the market's `updatedAt` day, else the run date.
    pub metric_date: NaiveDate,
    pub volume: Option<f64>,
    pub volume_24hr: Option<f64>,
    pub volume_1wk: Option<f64>,
    pub volume_1mo: Option<f64>,
    pub volume_1yr: Option<f64>,
    pub liquidity: Option<f64>,
    pub liquidity_amm: Option<f64>,
    pub liquidity_clob: Option<f64>,
    pub last_trade_price: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    pub open_interest: Option<f64>,
    pub fee: Option<f64>,
}

impl MetricRow {
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let market_id = record.get("id").and_then(value_key)?;
        let metric_date = ts(record, "updatedAt")
            .map(|dt| dt.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive());
        Some(Self {
            market_id,
            metric_date,
            volume: num(record, "volume"),
            volume_24hr: num(record, "volume24hr"),
            volume_1wk: num(record, "volume1wk"),
            volume_1mo: num(record, "volume1mo"),
            volume_1yr: num(record, "volume1yr"),
            liquidity: num(record, "liquidity"),
            liquidity_amm: num(record, "liquidityAmm"),
            liquidity_clob: num(record, "liquidityClob"),
            last_trade_price: num(record, "lastTradePrice"),
            best_bid: num(record, "bestBid"),
            best_ask: num(record, "bestAsk"),
            spread: num(record, "spread"),
            open_interest: num(record, "openInterest"),
            fee: num(record, "fee"),
        })
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
    fn event_row_requires_an_id() {
        assert!(EventRow::from_record(&record(json!({"title": "no id"}))).is_none());

        let row = EventRow::from_record(&record(json!({
            "id": 123,
            "title": "  Some   event ",
            "active": "yes",
            "startDate": "2024-06-01T10:00:00Z"
        })))
        .unwrap();
        assert_eq!(row.event_id, "123");
        assert_eq!(row.title.as_deref(), Some("Some event"));
        assert!(row.is_active);
        assert!(row.start_date.is_some());
        assert!(!row.is_featured);
    }

    #[test]
    fn market_row_serializes_outcomes() {
        let row = MarketRow::from_record(&record(json!({
            "id": "m1",
            "question": "Will it?",
            "outcomes": "['yes', 'no']"
        })))
        .unwrap();
        assert_eq!(row.outcomes.as_deref(), Some("[\"YES\",\"NO\"]"));
    }

    #[test]
    fn metric_row_takes_date_from_updated_at() {
        let row = MetricRow::from_record(&record(json!({
            "id": "m1",
            "updatedAt": "2024-03-15T18:22:00Z",
            "volume": "1,234.5",
            "fee": "junk"
        })))
        .unwrap();
        assert_eq!(row.metric_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(row.volume, Some(1234.5));
        assert_eq!(row.fee, None);
    }

    #[test]
    fn metric_row_falls_back_to_run_date() {
        let row = MetricRow::from_record(&record(json!({"id": "m1"}))).unwrap();
        assert_eq!(row.metric_date, Utc::now().date_naive());
    }
}
