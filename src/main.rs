use anyhow::Result;
use modem_scraper::*;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        version = version::VERSION,
        modem = %app_config.modem.base_url,
        influx = %app_config.influx.url,
        bucket = %app_config.influx.bucket,
        interval_secs = app_config.scrape.interval_secs,
        on_malformed = ?app_config.scrape.on_malformed,
        "starting collector"
    );

    let modem = Arc::new(scrape::ModemClient::with_timeout(
        &app_config.modem.base_url,
        &app_config.modem.status_path,
        Duration::from_secs(app_config.modem.request_timeout_secs),
    )?);
    let pipeline = Arc::new(scrape::Pipeline::new(
        app_config.layout.page_layout()?,
        app_config.scrape.on_malformed,
    ));
    let influx_writer = Arc::new(influx::InfluxWriter::new(
        reqwest::Client::new(),
        &app_config.influx,
    )?);

    let points_written_total = Arc::new(AtomicU64::new(0));
    let (write_tx, write_rx) = tokio::sync::mpsc::channel(worker::writer_channel_capacity(
        app_config.influx.flush_rate,
    ));
    let writer_handle = worker::spawn_point_writer(
        write_rx,
        influx_writer,
        worker::PointWriterConfig {
            flush_rate: app_config.influx.flush_rate,
            flush_interval_secs: app_config.influx.flush_interval_secs,
        },
        points_written_total.clone(),
    );

    let latest = Arc::new(RwLock::new(models::LatestScrape::default()));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut worker_handle = worker::spawn(
        worker::WorkerDeps {
            modem,
            pipeline,
            points: worker::PointChannel::new(write_tx),
            latest: latest.clone(),
            points_written_total,
            shutdown_rx,
        },
        worker::WorkerConfig {
            scrape_interval_secs: app_config.scrape.interval_secs,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
    );

    if let Some(server) = &app_config.server {
        let addr = format!("{}:{}", server.host, server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Listening on http://{}", addr);
        let app = routes::app(latest);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "status server stopped");
            }
        });
    }

    let worker_result = tokio::select! {
        result = &mut worker_handle => result,
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            worker_handle.await
        }
    };
    // worker dropped its point sender; writer flushes what is left and exits
    let _ = writer_handle.await;

    worker_result??;
    Ok(())
}
