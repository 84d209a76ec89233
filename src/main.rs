mod cleaner;
mod config;
mod error;
mod fetcher;
mod normalize;
mod snapshot;
mod types;
mod warehouse;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cleaner::{events, gaming, markets};
use crate::config::{Config, DATALAKE_ROOT, FETCH_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::fetcher::{fetch_entity, write_volumetry_report, ExtractStats};
use crate::types::{EntityKind, RawRecord};
use crate::warehouse::loader::WarehouseLoader;
use crate::warehouse::validator::WarehouseValidator;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cfg = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Pipeline failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!("Polymarket ETL: extract → transform → load → validate");

    // Phase 1 — extraction, skipped when the raw lake is already populated
    if datalake_ready() {
        info!("raw lake present at {DATALAKE_ROOT}, skipping extraction");
    } else {
        run_extract(&cfg).await?;
    }

    // Phase 2 — transformation
    let batches = run_transform();

    // Phases 3 + 4 — load and validate against the warehouse
    run_load(&cfg, &batches).await?;

    info!("pipeline complete");
    Ok(())
}

fn snapshot_dir(kind: EntityKind) -> PathBuf {
    Path::new(DATALAKE_ROOT).join(kind.as_str())
}

fn datalake_ready() -> bool {
    EntityKind::ALL
        .iter()
        .any(|kind| snapshot::snapshot_exists(&snapshot_dir(*kind)))
}

// ---------------------------------------------------------------------------
// Phase 1 — extract
// ---------------------------------------------------------------------------

async fn run_extract(cfg: &Config) -> Result<()> {
    info!("phase 1: extracting from {}", cfg.gamma_api_url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()?;

    let mut stats = ExtractStats::default();
    let mut extracted_any = false;

    for kind in EntityKind::ALL {
        let records = fetch_entity(&client, cfg, kind, &mut stats).await;
        if records.is_empty() {
            warn!("{kind}: nothing extracted, skipping snapshot");
            continue;
        }
        match snapshot::write_snapshot(&records, &snapshot_dir(kind)) {
            Ok(n) => {
                info!("{kind}: {n} records snapshotted");
                extracted_any = true;
            }
            Err(e) => warn!("{kind}: snapshot write failed: {e}"),
        }
    }

    if !extracted_any {
        return Err(AppError::Snapshot(
            "extraction produced no data for any entity".to_string(),
        ));
    }
    write_volumetry_report(&stats)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Phase 2 — transform
// ---------------------------------------------------------------------------

struct CleanBatches {
    events: Vec<RawRecord>,
    markets: Vec<RawRecord>,
    series: Vec<RawRecord>,
    gaming_markets: Vec<RawRecord>,
}

fn run_transform() -> CleanBatches {
    info!("phase 2: transforming snapshots");

    let events = events::clean_events(read_or_empty(EntityKind::Event));
    let markets = markets::clean_markets(read_or_empty(EntityKind::Market));
    let series = read_or_empty(EntityKind::Series);
    let gaming_markets = gaming::extract_gaming_markets(&markets);

    if !gaming_markets.is_empty() {
        let summary = gaming::gaming_summary(&gaming_markets);
        info!(
            "gaming summary: {} markets ({} active, {} closed), total volume ${:.2}",
            summary.total, summary.active, summary.closed, summary.total_volume
        );
        for (game, count) in &summary.by_game {
            info!("  {game}: {count} markets");
        }
        for (bet_type, count) in &summary.by_bet_type {
            info!("  {bet_type}: {count} markets");
        }
    }

    CleanBatches { events, markets, series, gaming_markets }
}

/// Snapshot contents for one entity; read failures degrade to an empty batch
/// so one broken snapshot doesn't take down the whole transform.
fn read_or_empty(kind: EntityKind) -> Vec<RawRecord> {
    let dir = snapshot_dir(kind);
    if !snapshot::snapshot_exists(&dir) {
        warn!("{kind}: no snapshot found");
        return Vec::new();
    }
    match snapshot::read_snapshot(&dir) {
        Ok(records) => {
            info!("{kind}: read {} records from snapshot", records.len());
            records
        }
        Err(e) => {
            warn!("{kind}: snapshot read failed: {e}");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Phases 3 + 4 — load and validate
// ---------------------------------------------------------------------------

async fn run_load(cfg: &Config, batches: &CleanBatches) -> Result<()> {
    // Checked before any connection attempt
    let database_url = cfg.require_database_url()?;

    if batches.events.is_empty() && batches.markets.is_empty() {
        return Err(AppError::Snapshot(
            "nothing to load: event and market batches are both empty".to_string(),
        ));
    }

    info!("phase 3: loading warehouse");
    let mut loader = WarehouseLoader::connect(database_url).await?;
    loader
        .load_all(&batches.events, &batches.markets, &batches.series, &batches.gaming_markets)
        .await?;
    if let Err(e) = loader.load_summary().await {
        warn!("load summary unavailable: {e}");
    }

    info!("phase 4: validating warehouse");
    let validator = WarehouseValidator::new(loader.pool().clone());
    let report = validator.validate_all().await;
    if !report.is_valid() {
        // Validation warnings don't fail the pipeline; they're surfaced above.
        warn!("{} integrity checks failed — inspect the warehouse", report.failed_count());
    }
    Ok(())
}
