// src/db/mod.rs

use std::time::Duration;

use sqlx::mssql::{Mssql, MssqlPoolOptions};
use sqlx::Pool;

use crate::config::Config;

pub type DbPool = Pool<Mssql>;

fn pool_options(cfg: &Config) -> MssqlPoolOptions {
    MssqlPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .idle_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(15))
}

/// Pool that opens connections on first use; the server still starts when the
/// database is down and endpoints fail per request.
pub fn connect_lazy(cfg: &Config) -> anyhow::Result<DbPool> {
    Ok(pool_options(cfg).connect_lazy(&cfg.database_url)?)
}

#[derive(sqlx::FromRow)]
struct Ping {
    ok: i32,
}

/// `SELECT 1` round trip used by the health endpoint.
pub async fn ping(pool: &DbPool) -> Result<bool, sqlx::Error> {
    let row = sqlx::query_as::<_, Ping>("SELECT CAST(1 AS INT) AS ok")
        .fetch_one(pool)
        .await?;
    Ok(row.ok == 1)
}
