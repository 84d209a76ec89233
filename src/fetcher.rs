use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{fetch_plan, Config, FetchPlan, FETCH_ROUND_DELAY_MS, VOLUMETRY_REPORT_PATH};
use crate::error::Result;
use crate::normalize::{normalize_boolean, pick, value_key};
use crate::types::{resolve_envelope, EntityKind, RawRecord};

// ---------------------------------------------------------------------------
// Extraction statistics
// ---------------------------------------------------------------------------

/// Counters and relation frequencies accumulated over one extraction run.
///
/// Owned by the extract phase and threaded through each fetch; pages merge
/// into it only after their round completes, so no locking is needed.
#[derive(Debug, Default)]
pub struct ExtractStats {
    pub totals: HashMap<EntityKind, usize>,
    pub active_events: usize,
    pub closed_events: usize,
    pub active_markets: usize,
    pub closed_markets: usize,
    pub markets_per_event: HashMap<String, usize>,
    pub markets_per_series: HashMap<String, usize>,
    pub events_per_tag: HashMap<String, usize>,
}

impl ExtractStats {
    fn observe(&mut self, kind: EntityKind, record: &RawRecord) {
        *self.totals.entry(kind).or_default() += 1;

        match kind {
            EntityKind::Market => {
                let closed = record
                    .get("closed")
                    .and_then(normalize_boolean)
                    .unwrap_or(false);
                if closed {
                    self.closed_markets += 1;
                } else {
                    self.active_markets += 1;
                }

                if let Some(id) = pick(record, &["event_id", "event", "eventId"]).and_then(value_key)
                {
                    *self.markets_per_event.entry(id).or_default() += 1;
                }
                if let Some(id) =
                    pick(record, &["series_id", "series", "seriesId"]).and_then(value_key)
                {
                    *self.markets_per_series.entry(id).or_default() += 1;
                }
            }
            EntityKind::Event => {
                let closed = record
                    .get("closed")
                    .and_then(normalize_boolean)
                    .unwrap_or(false)
                    || record.get("active").and_then(normalize_boolean) == Some(false);
                if closed {
                    self.closed_events += 1;
                } else {
                    self.active_events += 1;
                }

                if let Some(Value::Array(tags)) = pick(record, &["tags", "tag"]) {
                    for tag in tags {
                        let tag_id = match tag {
                            Value::Object(obj) => obj.get("id").and_then(value_key),
                            other => value_key(other),
                        };
                        if let Some(tag_id) = tag_id {
                            *self.events_per_tag.entry(tag_id).or_default() += 1;
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Paginated fetch
// ---------------------------------------------------------------------------

/// Fetch one page. Failures — network errors, non-2xx, undecodable bodies —
/// degrade to an empty page; a failed offset is not retried within the run.
async fn fetch_page(
    client: &reqwest::Client,
    base_url: &str,
    kind: EntityKind,
    offset: usize,
    limit: usize,
) -> Vec<RawRecord> {
    let url = format!("{base_url}/{}?limit={limit}&offset={offset}", kind.as_str());

    let resp = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("{kind}: request failed at offset {offset}: {e}");
            return Vec::new();
        }
    };
    if !resp.status().is_success() {
        warn!("{kind}: HTTP {} at offset {offset}", resp.status());
        return Vec::new();
    }
    let body: Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => {
            warn!("{kind}: JSON decode failed at offset {offset}: {e}");
            return Vec::new();
        }
    };

    let (_, records) = resolve_envelope(body, kind.as_str());
    records
}

/// Fetch every page of one collection using the fixed per-entity plan.
pub async fn fetch_entity(
    client: &reqwest::Client,
    cfg: &Config,
    kind: EntityKind,
    stats: &mut ExtractStats,
) -> Vec<RawRecord> {
    fetch_entity_with_plan(client, &cfg.gamma_api_url, kind, fetch_plan(kind), stats).await
}

/// Round-based concurrent pagination.
///
/// Each round issues `plan.workers` requests at consecutive offsets and waits
/// for all of them before appending (in offset order) — rounds never overlap,
/// which bounds in-flight requests and makes the exhaustion check exact. The
/// collection is exhausted when a round yields fewer than workers × page_size
/// records, or nothing at all.
pub async fn fetch_entity_with_plan(
    client: &reqwest::Client,
    base_url: &str,
    kind: EntityKind,
    plan: FetchPlan,
    stats: &mut ExtractStats,
) -> Vec<RawRecord> {
    info!("{kind}: fetching with {} workers × {} page size", plan.workers, plan.page_size);

    let mut all: Vec<RawRecord> = Vec::new();
    let mut offset = 0usize;
    let mut round = 0usize;

    loop {
        let pages = join_all((0..plan.workers).map(|i| {
            fetch_page(client, base_url, kind, offset + i * plan.page_size, plan.page_size)
        }))
        .await;
        round += 1;

        let round_total: usize = pages.iter().map(Vec::len).sum();
        for page in pages {
            for record in &page {
                stats.observe(kind, record);
            }
            all.extend(page);
        }

        if round_total == 0 {
            break;
        }
        info!("{kind}: round {round} yielded {round_total} records ({} total)", all.len());
        if round_total < plan.workers * plan.page_size {
            break;
        }

        offset += plan.workers * plan.page_size;
        tokio::time::sleep(Duration::from_millis(FETCH_ROUND_DELAY_MS)).await;
    }

    info!("{kind}: extraction complete, {} records", all.len());
    all
}

// ---------------------------------------------------------------------------
// Volumetry report
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct VolumetryReport {
    pub extracted_at: String,
    pub records_per_entity: BTreeMap<String, usize>,
    pub market_distribution: Distribution,
    pub event_distribution: Distribution,
    pub markets_per_event: RelationSummary,
    pub markets_per_series: RelationSummary,
    pub events_per_tag: RelationSummary,
}

#[derive(Debug, Serialize)]
pub struct Distribution {
    pub total: usize,
    pub active: usize,
    pub closed: usize,
    pub active_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct RelationSummary {
    pub related_keys: usize,
    pub avg_per_key: f64,
    pub max_per_key: usize,
    pub top: Vec<TopEntry>,
}

#[derive(Debug, Serialize)]
pub struct TopEntry {
    pub id: String,
    pub count: usize,
}

fn distribution(active: usize, closed: usize) -> Distribution {
    let total = active + closed;
    let active_pct = if total > 0 {
        (active as f64 / total as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };
    Distribution { total, active, closed, active_pct }
}

fn relation_summary(map: &HashMap<String, usize>) -> RelationSummary {
    let related_keys = map.len();
    let sum: usize = map.values().sum();
    let avg_per_key = if related_keys > 0 {
        (sum as f64 / related_keys as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };
    let max_per_key = map.values().copied().max().unwrap_or(0);

    let mut entries: Vec<TopEntry> = map
        .iter()
        .map(|(id, count)| TopEntry { id: id.clone(), count: *count })
        .collect();
    // Sort by count desc, then id, so the report is stable run to run
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    entries.truncate(10);

    RelationSummary { related_keys, avg_per_key, max_per_key, top: entries }
}

impl ExtractStats {
    pub fn volumetry_report(&self) -> VolumetryReport {
        VolumetryReport {
            extracted_at: chrono::Utc::now().to_rfc3339(),
            records_per_entity: EntityKind::ALL
                .iter()
                .map(|kind| (kind.as_str().to_string(), self.totals.get(kind).copied().unwrap_or(0)))
                .collect(),
            market_distribution: distribution(self.active_markets, self.closed_markets),
            event_distribution: distribution(self.active_events, self.closed_events),
            markets_per_event: relation_summary(&self.markets_per_event),
            markets_per_series: relation_summary(&self.markets_per_series),
            events_per_tag: relation_summary(&self.events_per_tag),
        }
    }
}

/// Serialize the run's volumetry report next to the raw lake.
pub fn write_volumetry_report(stats: &ExtractStats) -> Result<()> {
    let report = stats.volumetry_report();
    let path = Path::new(VOLUMETRY_REPORT_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&report)?)?;
    info!("volumetry report written to {}", path.display());
    Ok(())
}
