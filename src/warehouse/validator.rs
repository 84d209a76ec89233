//! Read-only warehouse integrity checks.
//!
//! Each check runs in isolation: a SQL error downgrades that check to
//! Unknown and the rest still run. Nothing here writes.

use sqlx::PgPool;
use tracing::{info, warn};

use super::schema::MANAGED_TABLES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail,
    Unknown,
}

#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub outcome: CheckOutcome,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// Overall verdict: no check failed outright. Unknown checks are surfaced
    /// but don't flip the result — they mean "couldn't tell", not "broken".
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|c| c.outcome != CheckOutcome::Fail)
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.outcome == CheckOutcome::Fail).count()
    }

    fn record(&mut self, name: &str, outcome: CheckOutcome, detail: String) {
        match outcome {
            CheckOutcome::Pass => info!("✓ {name}: {detail}"),
            CheckOutcome::Fail => warn!("✗ {name}: {detail}"),
            CheckOutcome::Unknown => warn!("? {name}: {detail}"),
        }
        self.checks.push(CheckResult { name: name.to_string(), outcome, detail });
    }
}

/// Dimension key columns whose values must be distinct.
const UNIQUE_KEY_CHECKS: &[(&str, &str)] = &[
    ("dim_event", "event_id"),
    ("dim_market", "market_id"),
    ("dim_series", "series_id"),
    ("dim_tag", "tag_name"),
    ("dim_game_type", "game_name"),
    ("dim_date", "date"),
];

/// Orphan probes: fact table, anti-join SQL counting rows whose referenced
/// dimension keys don't exist.
const ORPHAN_CHECKS: &[(&str, &str)] = &[
    (
        "fact_event_tag",
        "SELECT COUNT(*) FROM fact_event_tag f \
         LEFT JOIN dim_event e ON f.event_id = e.event_id \
         LEFT JOIN dim_tag t ON f.tag_id = t.tag_id \
         WHERE e.event_id IS NULL OR t.tag_id IS NULL",
    ),
    (
        "fact_market_event",
        "SELECT COUNT(*) FROM fact_market_event f \
         LEFT JOIN dim_market m ON f.market_id = m.market_id \
         LEFT JOIN dim_event e ON f.event_id = e.event_id \
         WHERE m.market_id IS NULL OR e.event_id IS NULL",
    ),
    (
        "fact_market_metrics",
        "SELECT COUNT(*) FROM fact_market_metrics f \
         LEFT JOIN dim_market m ON f.market_id = m.market_id \
         LEFT JOIN dim_date d ON f.date_id = d.date_id \
         WHERE m.market_id IS NULL OR d.date_id IS NULL",
    ),
];

pub struct WarehouseValidator {
    pool: PgPool,
}

impl WarehouseValidator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn validate_all(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        info!("=== warehouse validation ===");
        self.check_tables(&mut report).await;
        self.check_unique_keys(&mut report).await;
        self.check_orphans(&mut report).await;
        self.log_statistics().await;

        if report.is_valid() {
            info!("validation passed ({} checks)", report.checks.len());
        } else {
            warn!("validation finished with {} failing checks", report.failed_count());
        }
        report
    }

    async fn check_tables(&self, report: &mut ValidationReport) {
        for table in MANAGED_TABLES {
            let name = format!("table {table}");
            let exists: Result<bool, sqlx::Error> = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
            )
            .bind(*table)
            .fetch_one(&self.pool)
            .await;

            match exists {
                Ok(true) => {
                    let count: Result<i64, sqlx::Error> =
                        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                            .fetch_one(&self.pool)
                            .await;
                    match count {
                        Ok(n) => report.record(&name, CheckOutcome::Pass, format!("{n} rows")),
                        Err(e) => {
                            report.record(&name, CheckOutcome::Unknown, format!("count failed: {e}"))
                        }
                    }
                }
                Ok(false) => report.record(&name, CheckOutcome::Fail, "missing".to_string()),
                Err(e) => report.record(&name, CheckOutcome::Unknown, format!("lookup failed: {e}")),
            }
        }
    }

    async fn check_unique_keys(&self, report: &mut ValidationReport) {
        for (table, column) in UNIQUE_KEY_CHECKS {
            let name = format!("unique {table}.{column}");
            let counts: Result<(i64, i64), sqlx::Error> = sqlx::query_as(&format!(
                "SELECT COUNT(DISTINCT {column}), COUNT(*) FROM {table}"
            ))
            .fetch_one(&self.pool)
            .await;

            match counts {
                Ok((distinct, total)) if distinct == total => {
                    report.record(&name, CheckOutcome::Pass, format!("{distinct} distinct keys"));
                }
                Ok((distinct, total)) => report.record(
                    &name,
                    CheckOutcome::Fail,
                    format!("{total} rows but only {distinct} distinct keys"),
                ),
                Err(e) => report.record(&name, CheckOutcome::Unknown, format!("query failed: {e}")),
            }
        }
    }

    async fn check_orphans(&self, report: &mut ValidationReport) {
        for (table, sql) in ORPHAN_CHECKS {
            let name = format!("referential {table}");
            let orphans: Result<i64, sqlx::Error> =
                sqlx::query_scalar(sql).fetch_one(&self.pool).await;

            match orphans {
                Ok(0) => report.record(&name, CheckOutcome::Pass, "no orphaned rows".to_string()),
                Ok(n) => report.record(&name, CheckOutcome::Fail, format!("{n} orphaned rows")),
                Err(e) => report.record(&name, CheckOutcome::Unknown, format!("query failed: {e}")),
            }
        }
    }

    /// Descriptive statistics, logged only — never part of the verdict.
    async fn log_statistics(&self) {
        let events: Result<(i64, i64, i64, i64, i64), sqlx::Error> = sqlx::query_as(
            "SELECT COUNT(*), \
             COUNT(*) FILTER (WHERE is_active), \
             COUNT(*) FILTER (WHERE is_closed), \
             COUNT(*) FILTER (WHERE is_featured), \
             COUNT(DISTINCT category) FROM dim_event",
        )
        .fetch_one(&self.pool)
        .await;
        match events {
            Ok((total, active, closed, featured, categories)) => info!(
                "events: {total} total ({active} active, {closed} closed, {featured} featured, \
                 {categories} categories)"
            ),
            Err(e) => warn!("event statistics unavailable: {e}"),
        }

        let markets: Result<(i64, i64, i64, i64), sqlx::Error> = sqlx::query_as(
            "SELECT COUNT(*), \
             COUNT(*) FILTER (WHERE is_active), \
             COUNT(*) FILTER (WHERE is_closed), \
             COUNT(DISTINCT market_type) FROM dim_market",
        )
        .fetch_one(&self.pool)
        .await;
        match markets {
            Ok((total, active, closed, types)) => {
                info!("markets: {total} total ({active} active, {closed} closed, {types} types)")
            }
            Err(e) => warn!("market statistics unavailable: {e}"),
        }

        let relations: Result<(i64, i64, i64), sqlx::Error> = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM fact_event_tag), \
             (SELECT COUNT(*) FROM fact_market_event), \
             (SELECT COUNT(*) FROM fact_market_metrics)",
        )
        .fetch_one(&self.pool)
        .await;
        match relations {
            Ok((event_tags, market_events, metrics)) => info!(
                "facts: {event_tags} event-tag, {market_events} market-event, {metrics} metric rows"
            ),
            Err(e) => warn!("relation statistics unavailable: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(outcome: CheckOutcome) -> CheckResult {
        CheckResult { name: "c".to_string(), outcome, detail: String::new() }
    }

    #[test]
    fn report_fails_only_on_failed_checks() {
        let mut report = ValidationReport::default();
        report.checks.push(check(CheckOutcome::Pass));
        report.checks.push(check(CheckOutcome::Unknown));
        assert!(report.is_valid());
        assert_eq!(report.failed_count(), 0);

        report.checks.push(check(CheckOutcome::Fail));
        assert!(!report.is_valid());
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn every_fact_table_has_an_orphan_probe() {
        for table in MANAGED_TABLES.iter().filter(|t| t.starts_with("fact_")) {
            assert!(
                ORPHAN_CHECKS.iter().any(|(t, _)| t == table),
                "missing orphan probe for {table}"
            );
        }
    }
}
