// Worker integration tests: spawn scraper + point writer against fake modem and Influx,
// tick, shutdown, assert points flushed

mod common;

use axum::http::StatusCode;
use common::{FakeInflux, downstream_row, influx_config, serve_modem, status_page, upstream_row};
use modem_scraper::config::LayoutConfig;
use modem_scraper::influx::InfluxWriter;
use modem_scraper::models::LatestScrape;
use modem_scraper::scrape::{MalformedPolicy, ModemClient, Pipeline};
use modem_scraper::worker::{
    PointChannel, PointWriterConfig, WorkerConfig, WorkerDeps, spawn, spawn_point_writer,
    writer_channel_capacity,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;

struct Harness {
    influx: FakeInflux,
    latest: Arc<RwLock<LatestScrape>>,
    points_written_total: Arc<AtomicU64>,
    shutdown_tx: oneshot::Sender<()>,
    worker: JoinHandle<anyhow::Result<()>>,
    writer: JoinHandle<()>,
}

async fn start(page: String, policy: MalformedPolicy) -> Harness {
    let modem_base = serve_modem(page).await;
    let influx = FakeInflux::new(StatusCode::NO_CONTENT);
    let influx_base = influx.start().await;

    let modem = Arc::new(
        ModemClient::with_timeout(&modem_base, "/cgi-bin/status", Duration::from_secs(5)).unwrap(),
    );
    let pipeline = Arc::new(Pipeline::new(
        LayoutConfig::default().page_layout().unwrap(),
        policy,
    ));
    let writer = Arc::new(
        InfluxWriter::new(reqwest::Client::new(), &influx_config(&influx_base)).unwrap(),
    );

    let points_written_total = Arc::new(AtomicU64::new(0));
    let (write_tx, write_rx) = tokio::sync::mpsc::channel(writer_channel_capacity(100));
    let writer = spawn_point_writer(
        write_rx,
        writer,
        PointWriterConfig {
            flush_rate: 100,
            flush_interval_secs: 3600,
        },
        points_written_total.clone(),
    );

    let latest = Arc::new(RwLock::new(LatestScrape::default()));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let worker = spawn(
        WorkerDeps {
            modem,
            pipeline,
            points: PointChannel::new(write_tx),
            latest: latest.clone(),
            points_written_total: points_written_total.clone(),
            shutdown_rx,
        },
        WorkerConfig {
            scrape_interval_secs: 3600,
            stats_log_interval_secs: 3600,
        },
    );

    Harness {
        influx,
        latest,
        points_written_total,
        shutdown_tx,
        worker,
        writer,
    }
}

async fn wait_for_first_scrape(latest: &RwLock<LatestScrape>) {
    for _ in 0..100 {
        if latest.read().await.captured_at.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no scrape completed");
}

#[tokio::test]
async fn worker_scrapes_on_start_and_shutdown_flushes_points() {
    let page = status_page(
        &[downstream_row()],
        &[upstream_row("2", "36.2 MHz"), upstream_row("3", "30.6 MHz")],
    );
    let h = start(page, MalformedPolicy::SkipRow).await;

    wait_for_first_scrape(&h.latest).await;
    {
        let latest = h.latest.read().await;
        assert_eq!(latest.points.len(), 3);
        assert!(
            latest
                .points
                .iter()
                .all(|p| Some(p.timestamp) == latest.captured_at)
        );
    }

    h.shutdown_tx.send(()).unwrap();
    let worker_result = tokio::time::timeout(Duration::from_secs(5), h.worker)
        .await
        .expect("worker stops")
        .expect("worker join");
    assert!(worker_result.is_ok());
    tokio::time::timeout(Duration::from_secs(5), h.writer)
        .await
        .expect("writer stops")
        .expect("writer join");

    let lines = h.influx.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("downstream_channels,channel_id=1 "));
    assert!(lines[0].contains("frequency=603000000,"));
    assert!(lines[1].starts_with("upstream_channels,channel_id=2 "));
    assert!(lines[1].contains("symbol_rate=5120i"));
    assert!(lines[2].starts_with("upstream_channels,channel_id=3 "));
    assert_eq!(h.points_written_total.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn halt_policy_stops_worker_with_error() {
    let page = status_page(
        &[downstream_row()],
        &[upstream_row("3", "----"), upstream_row("4", "30.6 MHz")],
    );
    let h = start(page, MalformedPolicy::Halt).await;

    let worker_result = tokio::time::timeout(Duration::from_secs(5), h.worker)
        .await
        .expect("worker halts")
        .expect("worker join");
    let err = worker_result.unwrap_err();
    assert!(format!("{err:#}").contains("----"), "{err:#}");

    // worker dropped its sender, so the writer flushes what was emitted before the bad row
    tokio::time::timeout(Duration::from_secs(5), h.writer)
        .await
        .expect("writer stops")
        .expect("writer join");
    let lines = h.influx.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("downstream_channels,channel_id=1 "));
    assert!(h.latest.read().await.captured_at.is_none());
}

#[tokio::test]
async fn abort_policy_keeps_worker_running() {
    let page = status_page(&[], &[upstream_row("3", "----")]);
    let h = start(page, MalformedPolicy::AbortCycle).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!h.worker.is_finished());

    h.shutdown_tx.send(()).unwrap();
    let worker_result = tokio::time::timeout(Duration::from_secs(5), h.worker)
        .await
        .expect("worker stops")
        .expect("worker join");
    assert!(worker_result.is_ok());
    assert!(h.latest.read().await.points.is_empty());
}

#[test]
fn writer_channel_capacity_has_floor_and_saturates() {
    assert_eq!(writer_channel_capacity(1), 64);
    assert_eq!(writer_channel_capacity(100), 400);
    assert_eq!(writer_channel_capacity(u64::MAX), usize::MAX);
}
