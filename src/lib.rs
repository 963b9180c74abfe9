pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;

use std::sync::Arc;

use axum::Router;

use crate::config::AppConfig;
use crate::ledger::Ledger;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub config: Arc<AppConfig>,
}

/// Build the HTTP application around a ledger
pub fn app(state: AppState) -> Router {
    handlers::router(state)
}
