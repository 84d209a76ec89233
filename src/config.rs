use crate::error::{AppError, Result};
use crate::types::EntityKind;

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Per-request timeout (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// Pause between fetch rounds (milliseconds) so we don't hammer the API.
pub const FETCH_ROUND_DELAY_MS: u64 = 500;

/// Root of the columnar snapshot store, relative to the working directory.
pub const DATALAKE_ROOT: &str = "datalake/raw";

/// Where the extraction volumetry report lands (next to the raw lake, not in it).
pub const VOLUMETRY_REPORT_PATH: &str = "datalake/volumetry_report.json";

/// Rows per bulk INSERT statement for dimension tables.
pub const DIM_INSERT_CHUNK: usize = 1000;

/// Rows per bulk INSERT statement for fact/series tables (wider rows).
pub const FACT_INSERT_CHUNK: usize = 500;

/// Paging plan for one Gamma collection.
#[derive(Debug, Clone, Copy)]
pub struct FetchPlan {
    /// Concurrent page requests per round.
    pub workers: usize,
    /// Records per page.
    pub page_size: usize,
}

/// Fixed per-entity fetch table; not env-driven.
pub fn fetch_plan(kind: EntityKind) -> FetchPlan {
    match kind {
        EntityKind::Event => FetchPlan { workers: 10, page_size: 500 },
        EntityKind::Market => FetchPlan { workers: 10, page_size: 500 },
        EntityKind::Series => FetchPlan { workers: 10, page_size: 300 },
        EntityKind::Tag => FetchPlan { workers: 10, page_size: 300 },
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gamma_api_url: String,
    pub log_level: String,
    /// Warehouse connection string (DATABASE_URL). Only the load/validate
    /// phases need it; extraction runs without a database.
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }

    /// Connection string for the warehouse, or a clear failure before any
    /// connection attempt is made.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            AppError::Config("DATABASE_URL not set — required for the load phase".to_string())
        })
    }
}
