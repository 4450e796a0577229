// ABOUTME: Shared application state for API handlers
// ABOUTME: Engine and scheduler handles built once and cloned into every route

use sqlx::SqlitePool;
use std::sync::Arc;

use sammati_consents::ConsentEngine;
use sammati_scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub engine: Arc<ConsentEngine>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(pool: SqlitePool, engine: Arc<ConsentEngine>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            pool,
            engine,
            scheduler,
        }
    }
}
