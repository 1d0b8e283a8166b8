// src/config.rs

use std::env;

use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// Serve the /api/schema explorer routes.
    pub expose_schema: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => database_url_from_parts()?,
        };

        Ok(Config {
            database_url,
            port: parse_or("PORT", 5000)?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 20)?,
            db_min_connections: parse_or("DB_MIN_CONNECTIONS", 2)?,
            expose_schema: parse_or("EXPOSE_SCHEMA", true)?,
        })
    }

    /// Host/port/database part of the URL, safe to log.
    pub fn database_target(&self) -> &str {
        self.database_url
            .rsplit_once('@')
            .map(|(_, target)| target)
            .unwrap_or("<unparsed>")
    }
}

// DB_HOST / DB_PORT / DB_USER / DB_PASSWORD / DB_NAME, as the .env files of
// the portal have always carried them.
fn database_url_from_parts() -> anyhow::Result<String> {
    let host = match env::var("DB_HOST") {
        Ok(h) if !h.trim().is_empty() => h,
        _ => bail!("DATABASE_URL or DB_HOST must be set"),
    };
    let port: u16 = parse_or("DB_PORT", 1433)?;
    let user = env::var("DB_USER").context("DB_USER must be set when DB_HOST is used")?;
    let password = env::var("DB_PASSWORD").unwrap_or_default();
    let name = env::var("DB_NAME").context("DB_NAME must be set when DB_HOST is used")?;

    Ok(format!(
        "mssql://{}:{}@{}:{}/{}",
        urlencoding::encode(&user),
        urlencoding::encode(&password),
        host,
        port,
        name
    ))
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}='{raw}': {e}")),
        _ => Ok(default),
    }
}
