use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use work_queue::{InMemoryQueue, NatsQueue, WorkQueue};

use openpayflow::cache::Caches;
use openpayflow::config::Config;
use openpayflow::db;
use openpayflow::gateway::GatewayRegistry;
use openpayflow::housekeeper;
use openpayflow::outbox::drainer;
use openpayflow::rate_limit::ApiKeyLimiter;
use openpayflow::routes;
use openpayflow::state::AppState;
use openpayflow::webhook::{scheduler, SchedulerContext, WebhookSender};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let queue: Arc<dyn WorkQueue> = match config.queue_type.as_str() {
        "nats" => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            Arc::new(
                NatsQueue::connect(&config.nats_url)
                    .await
                    .expect("Failed to connect to NATS"),
            )
        }
        _ => {
            tracing::info!("Using in-memory work queue");
            Arc::new(InMemoryQueue::new())
        }
    };

    let gateways =
        Arc::new(GatewayRegistry::from_config(&config).expect("Failed to build gateway registry"));

    let state = AppState {
        db: pool.clone(),
        queue: queue.clone(),
        gateways,
        caches: Caches::new(),
        limiter: ApiKeyLimiter::new(config.rate_limit_max, config.rate_limit_window_ms),
        started_at: Instant::now(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_workers(&config, pool, queue, shutdown_rx);

    let app = routes::router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("HOST/PORT must form a valid socket address");

    tracing::info!("OpenPayFlow listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown_tx = shutdown_tx.clone();
            async move {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, refusing new work");
                let _ = shutdown_tx.send(true);
            }
        })
        .await
        .expect("Server failed");

    // In-flight deliveries get a grace window before the process exits.
    tracing::info!(grace_ms = SHUTDOWN_GRACE.as_millis() as u64, "Draining background tasks");
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        for handle in workers {
            let _ = handle.await;
        }
    })
    .await;
    tracing::info!("Shutdown complete");
}

fn spawn_workers(
    config: &Config,
    pool: PgPool,
    queue: Arc<dyn WorkQueue>,
    shutdown: watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let sender = WebhookSender::new(Duration::from_millis(config.webhook_timeout_ms))
        .expect("Failed to build webhook sender");
    let ctx = SchedulerContext {
        pool: pool.clone(),
        queue: queue.clone(),
        sender,
        max_attempts: config.webhook_max_retries,
    };

    vec![
        tokio::spawn(drainer::run_outbox_drainer(
            pool.clone(),
            queue,
            drainer::POLL_INTERVAL,
            shutdown.clone(),
        )),
        tokio::spawn(scheduler::run_queue_consumer(ctx.clone(), shutdown.clone())),
        tokio::spawn(scheduler::run_retry_sweep(
            ctx,
            scheduler::SWEEP_INTERVAL,
            shutdown.clone(),
        )),
        tokio::spawn(housekeeper::run_housekeeper(
            pool,
            housekeeper::RUN_INTERVAL,
            shutdown,
        )),
    ]
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
