// Library exports for the API server, binary tools and tests
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use db::ReminderStore;
use services::scheduler::ReminderScheduler;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: Arc<dyn ReminderStore>,
    pub scheduler: ReminderScheduler,
    pub config: Arc<Config>,
}
