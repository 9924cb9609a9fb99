//! Test orchestrator - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use test_orchestrator_lib::api::{self, ApiDoc};
use test_orchestrator_lib::config::Config;
use test_orchestrator_lib::db::DbPool;
use test_orchestrator_lib::middleware::RequestLogger;
use test_orchestrator_lib::services::{
    ArtifactStore, BatchOrchestrator, EventBroadcaster, ExecutionContext, ExecutionGate,
    ExecutionQueue, PdfService, RunnerClient,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL and TPO_RUNNER_URL must be set");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Test Orchestrator");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    tokio::fs::create_dir_all(&config.artifacts_dir).await?;

    let pool = DbPool::new(&config).await.map_err(std::io::Error::other)?;
    info!("Database connection established");
    pool.run_migrations().await.map_err(std::io::Error::other)?;

    // Runs left `running` by a previous process cannot be resumed.
    match pool.count_running_runs().await {
        Ok(0) => {}
        Ok(count) => warn!(
            count,
            "Found runs still marked running from a previous process; they will stay running"
        ),
        Err(e) => warn!(error = %e, "Failed to count orphaned runs"),
    }

    let runner = Arc::new(
        RunnerClient::new(
            &config.runner_url,
            Duration::from_secs(config.runner_timeout_secs),
        )
        .map_err(std::io::Error::other)?,
    );
    info!(runner_url = %config.runner_url, "Runner client configured");

    let gate = ExecutionGate::from_limit(config.execution.max_global_concurrency);
    let events = EventBroadcaster::new();
    let context = ExecutionContext::new(pool.clone(), runner.clone(), gate, events.clone());

    let queue = ExecutionQueue::new(context.clone());
    let orchestrator = BatchOrchestrator::new(
        context,
        config.execution.batch_parallelism,
        Duration::from_secs(config.execution.batch_retention_secs),
    );
    let pdf = PdfService::new(ArtifactStore::new(config.artifacts_dir.clone()), runner);

    info!(
        batch_parallelism = config.execution.batch_parallelism,
        global_limit = ?config.execution.max_global_concurrency,
        "Execution limits configured"
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();

    let worker_count = if is_development { 4 } else { num_cpus::get() };
    info!(
        "Starting server at http://{} ({} workers)",
        bind_address, worker_count
    );

    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE, header::RANGE])
                .max_age(3600)
        } else {
            // Same-origin only
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE, header::RANGE])
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(queue.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(web::Data::new(pdf.clone()))
            .app_data(web::Data::new(events.clone()))
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_api)
                    .configure(api::configure_websocket_routes),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
