//! Dimensional schema DDL.
//!
//! The warehouse is rebuilt from the current snapshot on every load:
//! unconditional drop in dependency order, then create, then seed the game
//! catalog. It mirrors the latest extraction rather than accumulating
//! history.

use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use crate::error::Result;

/// Seeded game catalog. Gaming market rows map into it by exact name; the
/// last entry is the fallback for anything unmatched.
pub const GAME_TYPE_CATALOG: &[&str] = &[
    "League of Legends",
    "Counter-Strike",
    "Dota 2",
    "Valorant",
    "Overwatch",
    "Call of Duty",
    "Fortnite",
    "Rocket League",
    "StarCraft",
    "Hearthstone",
    "Rainbow Six",
    "Apex Legends",
    "PUBG",
    "Fighting Games",
    "Mobile",
    "Gaming",
    "Other/General",
];

pub const OTHER_GAME_TYPE: &str = "Other/General";

/// Managed tables in drop order: facts first, then dimensions.
pub const MANAGED_TABLES: &[&str] = &[
    "fact_market_metrics",
    "fact_market_event",
    "fact_event_tag",
    "dim_market",
    "dim_game_type",
    "dim_tag",
    "dim_series",
    "dim_event",
    "dim_date",
];

/// One statement per entry — sqlx prepares each individually.
const DDL: &[&str] = &[
    "CREATE TABLE dim_date (
        date_id SERIAL PRIMARY KEY,
        date DATE NOT NULL UNIQUE,
        year INT NOT NULL,
        month INT NOT NULL,
        day INT NOT NULL,
        quarter INT NOT NULL,
        day_of_week INT NOT NULL,
        is_weekend BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ DEFAULT NOW()
    )",
    "CREATE TABLE dim_event (
        event_id VARCHAR(50) PRIMARY KEY,
        title VARCHAR(2048),
        description TEXT,
        category VARCHAR(200),
        subcategory VARCHAR(200),
        ticker VARCHAR(500),
        slug VARCHAR(500),
        is_active BOOLEAN,
        is_closed BOOLEAN,
        is_featured BOOLEAN,
        creation_date TIMESTAMPTZ,
        start_date TIMESTAMPTZ,
        end_date TIMESTAMPTZ,
        resolution_source VARCHAR(500),
        series_slug VARCHAR(500),
        sport VARCHAR(200),
        created_at TIMESTAMPTZ DEFAULT NOW()
    )",
    "CREATE INDEX idx_event_category ON dim_event(category)",
    "CREATE INDEX idx_event_ticker ON dim_event(ticker)",
    "CREATE TABLE dim_series (
        series_id VARCHAR(50) PRIMARY KEY,
        series_slug VARCHAR(500),
        title VARCHAR(2048),
        description TEXT,
        created_at TIMESTAMPTZ DEFAULT NOW()
    )",
    "CREATE TABLE dim_tag (
        tag_id SERIAL PRIMARY KEY,
        tag_name VARCHAR(200) NOT NULL UNIQUE,
        created_at TIMESTAMPTZ DEFAULT NOW()
    )",
    "CREATE TABLE dim_game_type (
        game_type_id SERIAL PRIMARY KEY,
        game_name VARCHAR(100) NOT NULL UNIQUE,
        created_at TIMESTAMPTZ DEFAULT NOW()
    )",
    "CREATE TABLE dim_market (
        market_id VARCHAR(50) PRIMARY KEY,
        question VARCHAR(2048),
        market_type VARCHAR(100),
        slug VARCHAR(500),
        category VARCHAR(200),
        subcategory VARCHAR(200),
        end_date TIMESTAMPTZ,
        is_active BOOLEAN,
        is_closed BOOLEAN,
        is_featured BOOLEAN,
        created_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ,
        resolution_source VARCHAR(500),
        description TEXT,
        outcomes TEXT,
        game_type_id INT REFERENCES dim_game_type(game_type_id),
        bet_type VARCHAR(100),
        loaded_at TIMESTAMPTZ DEFAULT NOW()
    )",
    "CREATE INDEX idx_market_category ON dim_market(category)",
    "CREATE INDEX idx_market_type ON dim_market(market_type)",
    "CREATE INDEX idx_market_game_type ON dim_market(game_type_id)",
    "CREATE TABLE fact_event_tag (
        event_tag_id SERIAL PRIMARY KEY,
        event_id VARCHAR(50) NOT NULL REFERENCES dim_event(event_id),
        tag_id INT NOT NULL REFERENCES dim_tag(tag_id),
        created_at TIMESTAMPTZ DEFAULT NOW(),
        UNIQUE (event_id, tag_id)
    )",
    "CREATE INDEX idx_event_tag_event ON fact_event_tag(event_id)",
    "CREATE INDEX idx_event_tag_tag ON fact_event_tag(tag_id)",
    "CREATE TABLE fact_market_event (
        market_event_id SERIAL PRIMARY KEY,
        market_id VARCHAR(50) NOT NULL REFERENCES dim_market(market_id),
        event_id VARCHAR(50) NOT NULL REFERENCES dim_event(event_id),
        created_at TIMESTAMPTZ DEFAULT NOW(),
        UNIQUE (market_id, event_id)
    )",
    "CREATE INDEX idx_market_event_market ON fact_market_event(market_id)",
    "CREATE INDEX idx_market_event_event ON fact_market_event(event_id)",
    "CREATE TABLE fact_market_metrics (
        metric_id SERIAL PRIMARY KEY,
        market_id VARCHAR(50) NOT NULL REFERENCES dim_market(market_id),
        date_id INT NOT NULL REFERENCES dim_date(date_id),
        volume DOUBLE PRECISION,
        volume_24hr DOUBLE PRECISION,
        volume_1wk DOUBLE PRECISION,
        volume_1mo DOUBLE PRECISION,
        volume_1yr DOUBLE PRECISION,
        liquidity DOUBLE PRECISION,
        liquidity_amm DOUBLE PRECISION,
        liquidity_clob DOUBLE PRECISION,
        last_trade_price DOUBLE PRECISION,
        best_bid DOUBLE PRECISION,
        best_ask DOUBLE PRECISION,
        spread DOUBLE PRECISION,
        open_interest DOUBLE PRECISION,
        fee DOUBLE PRECISION,
        created_at TIMESTAMPTZ DEFAULT NOW(),
        UNIQUE (market_id, date_id)
    )",
    "CREATE INDEX idx_market_metrics_market ON fact_market_metrics(market_id)",
    "CREATE INDEX idx_market_metrics_date ON fact_market_metrics(date_id)",
];

/// Create the star schema from scratch. Errors here are fatal to the load
/// phase — nothing downstream can proceed without the tables.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    for table in MANAGED_TABLES {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .execute(pool)
            .await?;
    }
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    seed_game_types(pool).await?;
    info!("schema created ({} tables)", MANAGED_TABLES.len());
    Ok(())
}

async fn seed_game_types(pool: &PgPool) -> Result<()> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO dim_game_type (game_name) ");
    qb.push_values(GAME_TYPE_CATALOG, |mut b, name| {
        b.push_bind(*name);
    });
    qb.push(" ON CONFLICT (game_name) DO NOTHING");
    qb.build().execute(pool).await?;
    info!("seeded {} game types", GAME_TYPE_CATALOG.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_unique_names_and_the_fallback() {
        let set: std::collections::HashSet<_> = GAME_TYPE_CATALOG.iter().collect();
        assert_eq!(set.len(), GAME_TYPE_CATALOG.len());
        assert!(GAME_TYPE_CATALOG.contains(&OTHER_GAME_TYPE));
        assert!(GAME_TYPE_CATALOG.contains(&"Gaming"));
    }

    #[test]
    fn drop_order_puts_facts_before_dimensions() {
        let first_dim = MANAGED_TABLES
            .iter()
            .position(|t| t.starts_with("dim_"))
            .unwrap();
        assert!(MANAGED_TABLES[..first_dim]
            .iter()
            .all(|t| t.starts_with("fact_")));
        assert!(MANAGED_TABLES[first_dim..]
            .iter()
            .all(|t| t.starts_with("dim_")));
    }

    #[test]
    fn every_managed_table_has_ddl() {
        for table in MANAGED_TABLES {
            assert!(
                DDL.iter().any(|s| s.contains(&format!("CREATE TABLE {table} "))),
                "missing DDL for {table}"
            );
        }
    }
}
