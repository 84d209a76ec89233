//! Dimensional loader: cleaned batches → star schema.
//!
//! Dimensions load first, facts after; every fact load filters against the
//! key sets that actually made it into the dimensions, so a failed dimension
//! load starves its dependents instead of producing orphans.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info, warn};

use super::models::{EventRow, MarketRow, MetricRow, SeriesRow};
use super::schema::{self, OTHER_GAME_TYPE};
use crate::cleaner::events::event_tag_relations;
use crate::cleaner::markets::market_event_relations;
use crate::config::{DIM_INSERT_CHUNK, FACT_INSERT_CHUNK};
use crate::error::Result;
use crate::types::RawRecord;

pub struct WarehouseLoader {
    pool: PgPool,
    /// Per-run cache of calendar date → dim_date surrogate key.
    date_cache: HashMap<NaiveDate, i32>,
}

impl WarehouseLoader {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Loader and validator run strictly sequentially; one connection is
        // all the warehouse ever sees from this process.
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        info!("connected to warehouse");
        Ok(Self { pool, date_cache: HashMap::new() })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Full load. A schema error aborts everything; a failed table load rolls
    /// back that table, logs, and lets independent tables continue — facts
    /// depending on a failed dimension load zero rows via the key filter.
    pub async fn load_all(
        &mut self,
        events: &[RawRecord],
        markets: &[RawRecord],
        series: &[RawRecord],
        gaming_markets: &[RawRecord],
    ) -> Result<()> {
        schema::create_schema(&self.pool).await?;

        if let Err(e) = self.load_dim_event(events).await {
            error!("dim_event load failed: {e}");
        }
        if let Err(e) = self.load_dim_tag(events).await {
            error!("dim_tag load failed: {e}");
        }
        if let Err(e) = self.load_dim_series(series).await {
            error!("dim_series load failed: {e}");
        }
        if let Err(e) = self.load_dim_market(markets).await {
            error!("dim_market load failed: {e}");
        }
        if let Err(e) = self.apply_gaming_classification(gaming_markets).await {
            error!("gaming classification failed: {e}");
        }

        if let Err(e) = self.load_fact_event_tag(events).await {
            error!("fact_event_tag load failed: {e}");
        }
        if let Err(e) = self.load_fact_market_event(markets).await {
            error!("fact_market_event load failed: {e}");
        }
        if let Err(e) = self.load_fact_market_metrics(markets).await {
            error!("fact_market_metrics load failed: {e}");
        }
        Ok(())
    }

    // -- dimensions ---------------------------------------------------------

    async fn load_dim_event(&self, events: &[RawRecord]) -> Result<()> {
        let rows: Vec<EventRow> = events.iter().filter_map(EventRow::from_record).collect();
        if rows.is_empty() {
            warn!("no events to load");
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(DIM_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO dim_event (event_id, title, description, category, subcategory, \
                 ticker, slug, is_active, is_closed, is_featured, creation_date, start_date, \
                 end_date, resolution_source, series_slug, sport) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.event_id.clone())
                    .push_bind(row.title.clone())
                    .push_bind(row.description.clone())
                    .push_bind(row.category.clone())
                    .push_bind(row.subcategory.clone())
                    .push_bind(row.ticker.clone())
                    .push_bind(row.slug.clone())
                    .push_bind(row.is_active)
                    .push_bind(row.is_closed)
                    .push_bind(row.is_featured)
                    .push_bind(row.creation_date)
                    .push_bind(row.start_date)
                    .push_bind(row.end_date)
                    .push_bind(row.resolution_source.clone())
                    .push_bind(row.series_slug.clone())
                    .push_bind(row.sport.clone());
            });
            qb.push(" ON CONFLICT (event_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("loaded {} events into dim_event", rows.len());
        Ok(())
    }

    /// Distinct tag names harvested from the events' cleaned tag lists.
    async fn load_dim_tag(&self, events: &[RawRecord]) -> Result<()> {
        let mut tags: BTreeSet<String> = BTreeSet::new();
        for event in events {
            if let Some(Value::Array(list)) = event.get("tags") {
                for tag in list {
                    if let Some(s) = tag.as_str() {
                        let tag = s.trim().to_lowercase();
                        if !tag.is_empty() {
                            tags.insert(tag);
                        }
                    }
                }
            }
        }
        if tags.is_empty() {
            warn!("no tags to load");
            return Ok(());
        }

        let tags: Vec<String> = tags.into_iter().collect();
        let mut tx = self.pool.begin().await?;
        for chunk in tags.chunks(DIM_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO dim_tag (tag_name) ");
            qb.push_values(chunk, |mut b, tag| {
                b.push_bind(tag.clone());
            });
            qb.push(" ON CONFLICT (tag_name) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("loaded {} distinct tags into dim_tag", tags.len());
        Ok(())
    }

    async fn load_dim_series(&self, series: &[RawRecord]) -> Result<()> {
        let rows: Vec<SeriesRow> = series.iter().filter_map(SeriesRow::from_record).collect();
        if rows.is_empty() {
            warn!("no series to load");
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(FACT_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO dim_series (series_id, series_slug, title, description) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.series_id.clone())
                    .push_bind(row.series_slug.clone())
                    .push_bind(row.title.clone())
                    .push_bind(row.description.clone());
            });
            qb.push(" ON CONFLICT (series_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("loaded {} series into dim_series", rows.len());
        Ok(())
    }

    async fn load_dim_market(&self, markets: &[RawRecord]) -> Result<()> {
        let rows: Vec<MarketRow> = markets.iter().filter_map(MarketRow::from_record).collect();
        if rows.is_empty() {
            warn!("no markets to load");
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(DIM_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO dim_market (market_id, question, market_type, slug, category, \
                 subcategory, end_date, is_active, is_closed, is_featured, created_at, \
                 updated_at, resolution_source, description, outcomes) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.market_id.clone())
                    .push_bind(row.question.clone())
                    .push_bind(row.market_type.clone())
                    .push_bind(row.slug.clone())
                    .push_bind(row.category.clone())
                    .push_bind(row.subcategory.clone())
                    .push_bind(row.end_date)
                    .push_bind(row.is_active)
                    .push_bind(row.is_closed)
                    .push_bind(row.is_featured)
                    .push_bind(row.created_at)
                    .push_bind(row.updated_at)
                    .push_bind(row.resolution_source.clone())
                    .push_bind(row.description.clone())
                    .push_bind(row.outcomes.clone());
            });
            qb.push(" ON CONFLICT (market_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("loaded {} markets into dim_market", rows.len());
        Ok(())
    }

    /// Stamp gaming-subset markets with their catalog game type and bet type.
    /// Unmatched or unclassified rows map to the catalog fallback entry.
    async fn apply_gaming_classification(&self, gaming_markets: &[RawRecord]) -> Result<()> {
        if gaming_markets.is_empty() {
            return Ok(());
        }

        let catalog: HashMap<String, i32> =
            sqlx::query_as::<_, (String, i32)>("SELECT game_name, game_type_id FROM dim_game_type")
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();
        let fallback = catalog.get(OTHER_GAME_TYPE).copied();

        let mut tx = self.pool.begin().await?;
        let mut updated = 0usize;
        for market in gaming_markets {
            let Some(market_id) = market.get("id").and_then(crate::normalize::value_key) else {
                continue;
            };
            let game_type_id = market
                .get("gaming_type")
                .and_then(|v| v.as_str())
                .and_then(|name| catalog.get(name).copied())
                .or(fallback);
            let bet_type = market.get("bet_type").and_then(|v| v.as_str());

            let result = sqlx::query(
                "UPDATE dim_market SET game_type_id = $1, bet_type = $2 WHERE market_id = $3",
            )
            .bind(game_type_id)
            .bind(bet_type)
            .bind(&market_id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected() as usize;
        }
        tx.commit().await?;
        info!("classified {updated} gaming markets against the game catalog");
        Ok(())
    }

    // -- facts --------------------------------------------------------------

    async fn load_fact_event_tag(&self, events: &[RawRecord]) -> Result<()> {
        let relations = event_tag_relations(events);
        if relations.is_empty() {
            warn!("no event-tag relations found");
            return Ok(());
        }

        let event_ids = self.existing_text_keys("dim_event", "event_id").await?;
        let tag_ids: HashMap<String, i32> =
            sqlx::query_as::<_, (String, i32)>("SELECT tag_name, tag_id FROM dim_tag")
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        let total = relations.len();
        let resolved = resolve_event_tag_relations(relations, &event_ids, &tag_ids);
        if resolved.len() < total {
            warn!(
                "dropped {} event-tag relations with missing endpoints",
                total - resolved.len()
            );
        }
        if resolved.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in resolved.chunks(DIM_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO fact_event_tag (event_id, tag_id) ");
            qb.push_values(chunk, |mut b, (event_id, tag_id)| {
                b.push_bind(event_id.clone()).push_bind(*tag_id);
            });
            qb.push(" ON CONFLICT (event_id, tag_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("loaded {} event-tag relations", resolved.len());
        Ok(())
    }

    async fn load_fact_market_event(&self, markets: &[RawRecord]) -> Result<()> {
        let relations = market_event_relations(markets);
        if relations.is_empty() {
            warn!("no market-event relations found");
            return Ok(());
        }

        let market_ids = self.existing_text_keys("dim_market", "market_id").await?;
        let event_ids = self.existing_text_keys("dim_event", "event_id").await?;

        let total = relations.len();
        let resolved = resolve_market_event_relations(relations, &market_ids, &event_ids);
        if resolved.len() < total {
            warn!(
                "dropped {} market-event relations with missing endpoints",
                total - resolved.len()
            );
        }
        if resolved.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in resolved.chunks(DIM_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO fact_market_event (market_id, event_id) ");
            qb.push_values(chunk, |mut b, (market_id, event_id)| {
                b.push_bind(market_id.clone()).push_bind(event_id.clone());
            });
            qb.push(" ON CONFLICT (market_id, event_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("loaded {} market-event relations", resolved.len());
        Ok(())
    }

    async fn load_fact_market_metrics(&mut self, markets: &[RawRecord]) -> Result<()> {
        let rows: Vec<MetricRow> = markets.iter().filter_map(MetricRow::from_record).collect();
        if rows.is_empty() {
            warn!("no market metrics to load");
            return Ok(());
        }

        let market_ids = self.existing_text_keys("dim_market", "market_id").await?;
        let mut resolved: Vec<(MetricRow, i32)> = Vec::with_capacity(rows.len());
        let total = rows.len();
        for row in rows {
            if !market_ids.contains(&row.market_id) {
                continue;
            }
            let date_id = self.date_id(row.metric_date).await?;
            resolved.push((row, date_id));
        }
        if resolved.len() < total {
            warn!("dropped {} metric rows without a loaded market", total - resolved.len());
        }
        if resolved.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in resolved.chunks(FACT_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO fact_market_metrics (market_id, date_id, volume, volume_24hr, \
                 volume_1wk, volume_1mo, volume_1yr, liquidity, liquidity_amm, liquidity_clob, \
                 last_trade_price, best_bid, best_ask, spread, open_interest, fee) ",
            );
            qb.push_values(chunk, |mut b, (row, date_id)| {
                b.push_bind(row.market_id.clone())
                    .push_bind(*date_id)
                    .push_bind(row.volume)
                    .push_bind(row.volume_24hr)
                    .push_bind(row.volume_1wk)
                    .push_bind(row.volume_1mo)
                    .push_bind(row.volume_1yr)
                    .push_bind(row.liquidity)
                    .push_bind(row.liquidity_amm)
                    .push_bind(row.liquidity_clob)
                    .push_bind(row.last_trade_price)
                    .push_bind(row.best_bid)
                    .push_bind(row.best_ask)
                    .push_bind(row.spread)
                    .push_bind(row.open_interest)
                    .push_bind(row.fee);
            });
            qb.push(" ON CONFLICT (market_id, date_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("loaded {} market metric snapshots", resolved.len());
        Ok(())
    }

    // -- helpers ------------------------------------------------------------

    /// Date-dimension key for `date`, synthesizing the row on first sight and
    /// caching the key for the rest of the run.
    async fn date_id(&mut self, date: NaiveDate) -> Result<i32> {
        if let Some(id) = self.date_cache.get(&date) {
            return Ok(*id);
        }

        let existing: Option<i32> =
            sqlx::query_scalar("SELECT date_id FROM dim_date WHERE date = $1")
                .bind(date)
                .fetch_optional(&self.pool)
                .await?;

        let id = match existing {
            Some(id) => id,
            None => {
                let (year, month, day, quarter, day_of_week, is_weekend) = date_parts(date);
                sqlx::query_scalar(
                    "INSERT INTO dim_date (date, year, month, day, quarter, day_of_week, is_weekend) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING date_id",
                )
                .bind(date)
                .bind(year)
                .bind(month)
                .bind(day)
                .bind(quarter)
                .bind(day_of_week)
                .bind(is_weekend)
                .fetch_one(&self.pool)
                .await?
            }
        };
        self.date_cache.insert(date, id);
        Ok(id)
    }

    async fn existing_text_keys(&self, table: &str, column: &str) -> Result<HashSet<String>> {
        let keys: Vec<String> = sqlx::query_scalar(&format!("SELECT {column} FROM {table}"))
            .fetch_all(&self.pool)
            .await?;
        Ok(keys.into_iter().collect())
    }

    /// Per-table row counts, logged after a load.
    pub async fn load_summary(&self) -> Result<()> {
        info!("=== load summary ===");
        for table in schema::MANAGED_TABLES.iter().rev() {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            info!("{table}: {count} rows");
        }
        Ok(())
    }
}

/// Calendar decomposition for a dim_date row. Monday is day 0; weekend is
/// Saturday/Sunday; quarter is `(month - 1) / 3 + 1`.
pub fn date_parts(date: NaiveDate) -> (i32, i32, i32, i32, i32, bool) {
    let month = date.month() as i32;
    let day_of_week = date.weekday().num_days_from_monday() as i32;
    (
        date.year(),
        month,
        date.day() as i32,
        (month - 1) / 3 + 1,
        day_of_week,
        day_of_week >= 5,
    )
}

/// Keep only relations whose event exists and whose tag resolved to a key.
pub fn resolve_event_tag_relations(
    relations: Vec<(String, String)>,
    event_ids: &HashSet<String>,
    tag_ids: &HashMap<String, i32>,
) -> Vec<(String, i32)> {
    relations
        .into_iter()
        .filter(|(event_id, _)| event_ids.contains(event_id))
        .filter_map(|(event_id, tag)| tag_ids.get(&tag).map(|id| (event_id, *id)))
        .collect()
}

/// Keep only relations with both endpoints present in their dimensions.
pub fn resolve_market_event_relations(
    relations: Vec<(String, String)>,
    market_ids: &HashSet<String>,
    event_ids: &HashSet<String>,
) -> Vec<(String, String)> {
    relations
        .into_iter()
        .filter(|(market_id, event_id)| {
            market_ids.contains(market_id) && event_ids.contains(event_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parts_cover_quarters_and_weekends() {
        // A Saturday in Q1
        let (year, month, day, quarter, dow, weekend) =
            date_parts(NaiveDate::from_ymd_opt(2024, 3, 16).unwrap());
        assert_eq!((year, month, day), (2024, 3, 16));
        assert_eq!(quarter, 1);
        assert_eq!(dow, 5);
        assert!(weekend);

        // A Monday in Q4
        let (_, _, _, quarter, dow, weekend) =
            date_parts(NaiveDate::from_ymd_opt(2024, 10, 7).unwrap());
        assert_eq!(quarter, 4);
        assert_eq!(dow, 0);
        assert!(!weekend);
    }

    #[test]
    fn unresolvable_market_event_relations_are_dropped() {
        let market_ids: HashSet<String> = ["m1".to_string()].into();
        let event_ids: HashSet<String> = ["e1".to_string()].into();

        let relations = vec![
            ("m1".to_string(), "e1".to_string()),
            ("m1".to_string(), "ghost-event".to_string()),
            ("ghost-market".to_string(), "e1".to_string()),
        ];
        let resolved = resolve_market_event_relations(relations, &market_ids, &event_ids);
        assert_eq!(resolved, vec![("m1".to_string(), "e1".to_string())]);
    }

    #[test]
    fn event_tag_relations_resolve_names_to_keys() {
        let event_ids: HashSet<String> = ["e1".to_string()].into();
        let tag_ids: HashMap<String, i32> = [("esports".to_string(), 7)].into();

        let relations = vec![
            ("e1".to_string(), "esports".to_string()),
            ("e1".to_string(), "unknown-tag".to_string()),
            ("e2".to_string(), "esports".to_string()),
        ];
        let resolved = resolve_event_tag_relations(relations, &event_ids, &tag_ids);
        assert_eq!(resolved, vec![("e1".to_string(), 7)]);
    }
}
