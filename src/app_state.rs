use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{PgParsedRecordStore, PgStatusStore};
use crate::services::{
    orchestrator::ReparseOrchestrator,
    output::RedisOutputSink,
    parser::HttpParserClient,
    publisher::RedisStatusPublisher,
    queue::JobQueue,
    storage::ProviderSet,
};

/// Shared state of a worker process.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub orchestrator: Arc<ReparseOrchestrator>,
}

impl AppState {
    pub fn new(db: PgPool, queue: JobQueue, orchestrator: ReparseOrchestrator) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Wire the orchestrator to Postgres, Redis, the parser service and the
/// configured storage providers.
pub fn build_orchestrator(
    config: &AppConfig,
    db: PgPool,
    providers: ProviderSet,
    parser: HttpParserClient,
    output: RedisOutputSink,
    publisher: RedisStatusPublisher,
) -> ReparseOrchestrator {
    ReparseOrchestrator::new(
        Arc::new(PgStatusStore::new(db.clone())),
        Arc::new(PgParsedRecordStore::new(db)),
        providers,
        Arc::new(parser),
        Arc::new(output),
        Arc::new(publisher),
    )
    .with_parser_timeout(config.parser_timeout())
}
