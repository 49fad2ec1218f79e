use metrics_exporter_prometheus::PrometheusBuilder;
use parse_reconciler::{
    app_state::{build_orchestrator, AppState},
    config::AppConfig,
    db,
    services::{
        output::RedisOutputSink, parser::HttpParserClient, publisher::RedisStatusPublisher,
        queue::JobQueue, storage,
    },
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Load configuration first so the log level can come from it
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting parser reconciliation worker");

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr.parse().expect("Invalid METRICS_ADDR");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus metrics exporter");

        metrics::describe_counter!("parser_jobs_total", "Jobs processed, by task and final status");
        metrics::describe_histogram!(
            "parser_job_duration_seconds",
            "Time to drive a job to its terminal status"
        );
        metrics::describe_gauge!("parser_queue_depth", "Job requests waiting in the queue");
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize services
    tracing::info!(providers = ?config.s3_providers, "Initializing services");
    let providers = storage::load_providers(&config.providers, config.storage_timeout())
        .expect("Failed to initialize storage providers");

    let parser = HttpParserClient::new(&config.parser_url, config.parser_timeout())
        .expect("Failed to initialize parser client");

    let output = RedisOutputSink::new(&config.redis_url, &config.output_queue)
        .expect("Failed to initialize output sink");

    let publisher = RedisStatusPublisher::new(&config.redis_url, &config.status_channel)
        .expect("Failed to initialize status publisher");

    let queue = JobQueue::new(&config.redis_url, &config.input_queue, &config.worker_id)
        .expect("Failed to initialize job queue");
    queue.health_check().await.expect("Redis is not reachable");

    match queue.requeue_in_flight().await {
        Ok(0) => {}
        Ok(moved) => tracing::warn!(
            moved,
            worker_id = %config.worker_id,
            processing = queue.processing_key(),
            "Requeued jobs left in flight by a previous run of this worker"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to requeue in-flight jobs"),
    }

    let orchestrator =
        build_orchestrator(&config, db_pool.clone(), providers, parser, output, publisher);
    let state = AppState::new(db_pool, queue, orchestrator);

    tracing::info!("Worker ready, starting job processing loop");

    // Main processing loop
    loop {
        match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                if let Ok(depth) = state.queue.queue_depth().await {
                    metrics::gauge!("parser_queue_depth").set(depth as f64);
                }
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let delivery = match state.queue.dequeue().await? {
        Some(d) => d,
        None => return Ok(false),
    };
    let record_id = delivery.request.record_id;

    match state.orchestrator.process_job(&delivery.request).await {
        Ok(status) => {
            state.queue.complete(&delivery).await?;
            tracing::info!(record_id = %record_id, status = %status, "Job acknowledged");
        }
        Err(e) if e.needs_redelivery() => {
            // No Error status was written; hand the request back.
            state.queue.redeliver(&delivery).await?;
            tracing::warn!(record_id = %record_id, error = %e, "Job requeued for redelivery");
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
        Err(e) => {
            state.queue.complete(&delivery).await?;
            tracing::info!(record_id = %record_id, kind = e.kind(), "Failed job acknowledged");
        }
    }

    Ok(true)
}
