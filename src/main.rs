//! Taskfabric server entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use taskfabric::adapters::bus::InProcessBus;
use taskfabric::adapters::sqlite::{
    apply_schema, open_pool, DbSettings, SqliteAuditStore, SqliteJobStore, SqliteOutboxStore,
    SqliteReminderStore, SqliteTaskStore,
};
use taskfabric::adapters::webhook::WebhookSink;
use taskfabric::domain::models::Topic;
use taskfabric::domain::ports::EventBus;
use taskfabric::infrastructure::config::{Config, ConfigLoader};
use taskfabric::infrastructure::http::{router, AppState, JwtVerifier};
use taskfabric::infrastructure::logging;
use taskfabric::services::{
    AuditConsumer, ConnectionRegistry, EventPublisher, JobScheduler, JobSchedulerConfig,
    MutationService, NotificationService, OutboxSweeper, PublisherConfig, RecurrenceGenerator,
    ReminderSchedulerConfig, RetryPolicy, SweeperConfig, UpdateBroadcaster, AUDIT_GROUP,
    DELIVER_JOB_KIND, GENERATOR_GROUP, NOTIFICATION_GROUP,
};

/// Grace period for flushing close frames to live connections on shutdown,
/// kept well inside the 5 s drain deadline.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "taskfabric", version, about = "Event-driven multi-user task manager")]
struct Cli {
    /// Path to a configuration file (defaults to taskfabric.yaml + env)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server: HTTP API, consumers, scheduler, and sweeper
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Drain the outbox once and exit
    SweepOutbox,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    logging::init(&config.logging);

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::SweepOutbox => sweep_outbox(config).await,
    }
}

async fn open_database(config: &Config) -> Result<sqlx::SqlitePool> {
    let pool = open_pool(&DbSettings {
        path: PathBuf::from(&config.database.path),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await
    .context("Failed to open database")?;

    let applied = apply_schema(&pool)
        .await
        .context("Failed to apply schema upgrades")?;
    if applied > 0 {
        tracing::info!(applied, "applied schema upgrades");
    }
    Ok(pool)
}

fn build_bus(config: &Config) -> Result<Arc<dyn EventBus>> {
    match config.bus.kind.as_str() {
        "memory" => Ok(Arc::new(InProcessBus::with_defaults())),
        #[cfg(feature = "kafka")]
        "kafka" => {
            use taskfabric::adapters::bus::{KafkaBusConfig, KafkaEventBus};
            let bus = KafkaEventBus::new(KafkaBusConfig {
                brokers: config.bus.brokers.clone(),
                publish_timeout: Duration::from_millis(config.publish.timeout_ms),
                ..Default::default()
            })?;
            Ok(Arc::new(bus))
        }
        #[cfg(not(feature = "kafka"))]
        "kafka" => bail!("bus kind 'kafka' requires building with the 'kafka' feature"),
        other => bail!("unknown bus kind '{other}'"),
    }
}

async fn migrate(config: Config) -> Result<()> {
    open_database(&config).await?;
    println!("schema up to date");
    Ok(())
}

async fn sweep_outbox(config: Config) -> Result<()> {
    let pool = open_database(&config).await?;
    let outbox = Arc::new(SqliteOutboxStore::new(pool));
    let bus = build_bus(&config)?;
    let publisher = Arc::new(EventPublisher::new(
        bus,
        outbox.clone(),
        publisher_config(&config),
    ));
    let sweeper = OutboxSweeper::new(outbox, publisher, sweeper_config(&config));
    let delivered = sweeper.sweep_once().await;
    println!("delivered {delivered} outbox events");
    Ok(())
}

fn publisher_config(config: &Config) -> PublisherConfig {
    PublisherConfig {
        publish_timeout: Duration::from_millis(config.publish.timeout_ms),
        retry: RetryPolicy::new(
            config.publish.max_attempts,
            Duration::from_millis(config.publish.initial_backoff_ms),
            config.publish.multiplier,
            config.publish.jitter,
        ),
    }
}

fn sweeper_config(config: &Config) -> SweeperConfig {
    SweeperConfig {
        sweep_interval: Duration::from_secs(config.sweeper.interval_secs),
        batch_size: config.sweeper.batch_size,
    }
}

async fn serve(config: Config) -> Result<()> {
    let pool = open_database(&config).await?;

    let tasks = Arc::new(SqliteTaskStore::new(pool.clone()));
    let reminders = Arc::new(SqliteReminderStore::new(pool.clone()));
    let audit = Arc::new(SqliteAuditStore::new(pool.clone()));
    let outbox = Arc::new(SqliteOutboxStore::new(pool.clone()));
    let jobs = Arc::new(SqliteJobStore::new(pool.clone()));

    let bus = build_bus(&config)?;
    let publisher = Arc::new(EventPublisher::new(
        bus.clone(),
        outbox.clone(),
        publisher_config(&config),
    ));
    let mutation = Arc::new(MutationService::new(
        tasks.clone(),
        reminders.clone(),
        publisher.clone(),
    ));

    // Consumers.
    let audit_consumer = Arc::new(AuditConsumer::new(audit.clone()));
    bus.subscribe(Topic::TaskEvents, AUDIT_GROUP, audit_consumer)
        .await
        .context("Failed to attach audit consumer")?;

    let generator = Arc::new(RecurrenceGenerator::new(tasks.clone(), mutation.clone()));
    bus.subscribe(Topic::TaskEvents, GENERATOR_GROUP, generator)
        .await
        .context("Failed to attach recurring generator")?;

    let sink = Arc::new(WebhookSink::new(
        config.reminders.webhook_url.clone(),
        Duration::from_secs(config.reminders.sink_timeout_secs),
    )?);
    let notification = Arc::new(NotificationService::new(
        reminders.clone(),
        tasks.clone(),
        jobs.clone(),
        audit.clone(),
        sink,
        publisher.clone(),
        ReminderSchedulerConfig {
            retry_delays: config
                .reminders
                .retry_delays_secs
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            sink_timeout: Duration::from_secs(config.reminders.sink_timeout_secs),
        },
    ));
    bus.subscribe(Topic::Reminders, NOTIFICATION_GROUP, notification.clone())
        .await
        .context("Failed to attach notification consumer")?;

    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = Arc::new(UpdateBroadcaster::new(registry.clone()));
    bus.subscribe(
        Topic::TaskUpdates,
        &UpdateBroadcaster::replica_group_id(),
        broadcaster,
    )
    .await
    .context("Failed to attach update broadcaster")?;

    // Durable scheduler with the reminder delivery handler.
    let scheduler = Arc::new(JobScheduler::new(
        jobs.clone(),
        JobSchedulerConfig {
            poll_interval: Duration::from_secs(config.scheduler.poll_interval_secs),
            lease: Duration::from_secs(config.scheduler.lease_secs),
            batch_size: config.scheduler.batch_size,
            ..Default::default()
        },
    ));
    scheduler
        .register_handler(DELIVER_JOB_KIND, notification.clone())
        .await;

    // Crash recovery: pending reminders without a scheduled job get one.
    notification.backfill_jobs().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    let sweeper = Arc::new(OutboxSweeper::new(
        outbox.clone(),
        publisher.clone(),
        sweeper_config(&config),
    ));
    let sweeper_task = {
        let sweeper = sweeper.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { sweeper.run(shutdown).await })
    };

    let state = AppState {
        mutation,
        registry: registry.clone(),
        verifier: Arc::new(JwtVerifier::new(config.auth.jwt_secret.as_bytes())),
        audit,
        outbox,
        jobs,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.bind))?;
    tracing::info!(bind = %config.http.bind, "taskfabric listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Ordered shutdown: stop accepting work, close live streams, then stop
    // the background loops.
    tracing::info!("shutting down");
    registry.drain_all().await;
    tokio::time::sleep(DRAIN_GRACE).await;

    let _ = shutdown_tx.send(true);
    let _ = scheduler_task.await;
    let _ = sweeper_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
