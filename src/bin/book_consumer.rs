use anyhow::{Context, Result};
use book_config::Config;
use book_pipeline::kafka::{KafkaLogConsumer, KafkaPublisher};
use book_pipeline::logging::init_tracing;
use book_pipeline::storage::PgBookStore;
use book_pipeline::worker::{BookSinks, BookWorker, DeadLetter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.logging)?;

    info!("Connecting to PostgreSQL at: {}", config.database_url_safe());
    let pool = book_db::create_pool(&config.database_url, &config.db).await?;
    book_db::run_migrations(&pool).await?;
    info!("Connected to PostgreSQL");

    let consumer = KafkaLogConsumer::new(&config.kafka)?;

    let dead_letter = match &config.kafka.dlq_topic {
        Some(topic) => {
            let publisher = Arc::new(KafkaPublisher::new(&config.kafka, &config.worker)?);
            Some((publisher, topic.clone()))
        }
        None => None,
    };

    let mut worker = BookWorker::new(
        Arc::new(consumer),
        BookSinks {
            ready: Arc::new(PgBookStore::ready(pool.clone())),
            staging: Arc::new(PgBookStore::staging(pool.clone())),
        },
        config.kafka.topic.clone(),
        &config.worker,
    );
    if let Some((publisher, topic)) = &dead_letter {
        worker = worker.with_dead_letter(DeadLetter {
            publisher: publisher.clone(),
            topic: topic.clone(),
        });
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    info!(
        topic = %config.kafka.topic,
        group_id = %config.kafka.consumer_group,
        "Book consumer started"
    );

    let outcome = worker.run(shutdown).await;

    if let Some((publisher, _)) = dead_letter {
        if let Err(e) = publisher.close(config.worker.flush_timeout).await {
            error!(error = %e, "Failed to close dead-letter publisher");
        }
    }
    pool.close().await;

    let stats = outcome.context("Book consumer failed")?;
    info!(
        stored = stats.stored,
        staged = stats.staged,
        malformed = stats.malformed,
        "Book consumer shut down"
    );
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
