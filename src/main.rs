use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{info, warn};

use org_worker::cli::Cli;
use org_worker::config::Config;
use org_worker::db::{self, PgImageJobRepository, PgReportDataSource, PgReportRepository};
use org_worker::processor::{HttpImageFetcher, ImageHandler, ReportHandler};
use org_worker::queue::{Dispatcher, DispatcherConfig, HandlerSet, RedisQueue};
use org_worker::render::{PdfReportRenderer, WebpTransformer};
use org_worker::storage;
use org_worker::utils::{init_logger, with_retry};

const CONNECT_ATTEMPTS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    let _log_guard = init_logger(&config.logging);
    info!(
        queue = %config.redis.queue_name,
        concurrency = config.worker.concurrency,
        storage = ?config.storage.provider,
        "configuration loaded"
    );

    let retry_delay = Duration::from_millis(config.redis.retry_delay_ms);

    // Connect to database
    let database = config.database.clone();
    let pool = with_retry(
        "database connection",
        || {
            let database = database.clone();
            async move { db::create_pool(&database).await }.boxed()
        },
        CONNECT_ATTEMPTS,
        retry_delay,
    )
    .await?;

    if config.database.run_migrations {
        info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        info!("Database migrations completed");
    }

    // Connect to the task queue
    let redis = config.redis.clone();
    let queue = with_retry(
        "redis connection",
        || {
            let redis = redis.clone();
            async move { RedisQueue::connect(&redis).await }.boxed()
        },
        CONNECT_ATTEMPTS,
        retry_delay,
    )
    .await?;

    let storage = storage::from_config(&config.storage)?;
    let http = reqwest::Client::builder()
        .timeout(config.worker.http_timeout())
        .build()?;

    let deadline = config.worker.job_timeout();
    let reports = ReportHandler::new(
        Arc::new(PgReportRepository::new(pool.clone())),
        Arc::new(PgReportDataSource::new(pool.clone())),
        Arc::new(PdfReportRenderer::new(config.report.org_name.clone())),
        Arc::clone(&storage),
    )
    .with_deadline(deadline);
    let images = ImageHandler::new(
        Arc::new(PgImageJobRepository::new(pool.clone())),
        Arc::new(HttpImageFetcher::new(http)),
        Arc::new(WebpTransformer::default()),
        storage,
    )
    .with_deadline(deadline);

    let dispatcher = Dispatcher::new(
        Arc::new(queue),
        HandlerSet::new(Arc::new(reports), Arc::new(images)),
        DispatcherConfig::from_config(&config),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested, finishing in-flight jobs");
        let _ = shutdown_tx.send(true);
    });

    let summary = dispatcher.run(shutdown_rx).await;
    info!(?summary, "worker exited");

    pool.close().await;
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
