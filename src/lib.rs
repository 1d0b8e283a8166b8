// src/lib.rs

use std::sync::Arc;

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod models;
pub mod routes;
pub mod stats;

#[derive(Clone)]
pub struct AppState {
    pub pool: db::DbPool,
    pub config: Arc<config::Config>,
}
