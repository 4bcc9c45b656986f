// Background scrape worker.
// Scraping runs in the worker; Influx writes run in a dedicated point writer task (channel).

use crate::influx::InfluxWriter;
use crate::models::{LatestScrape, MetricPoint};
use crate::scrape::{MalformedPolicy, ModemClient, Pipeline, PointSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Duration, interval};
use tracing::Instrument;

/// Channel capacity for the point writer (room for a few flushes worth of points).
pub fn writer_channel_capacity(flush_rate: u64) -> usize {
    usize::try_from(flush_rate)
        .unwrap_or(usize::MAX)
        .saturating_mul(4)
        .max(64)
}

/// Non-blocking handle the pipeline emits into. A full channel drops the point.
#[derive(Clone)]
pub struct PointChannel {
    tx: mpsc::Sender<MetricPoint>,
}

impl PointChannel {
    pub fn new(tx: mpsc::Sender<MetricPoint>) -> Self {
        Self { tx }
    }
}

impl PointSink for PointChannel {
    fn write_point(&self, point: MetricPoint) {
        match self.tx.try_send(point) {
            Ok(()) => {}
            Err(TrySendError::Full(p)) => {
                tracing::warn!(
                    measurement = p.measurement,
                    channel_id = p.tag(crate::channel::CHANNEL_ID_TAG),
                    "point writer channel full; dropping point"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Point writer channel closed");
            }
        }
    }
}

/// Forwards to the writer and keeps a copy of the cycle's points for the status routes.
struct CycleSink<'a> {
    inner: &'a PointChannel,
    points: Mutex<Vec<MetricPoint>>,
}

impl PointSink for CycleSink<'_> {
    fn write_point(&self, point: MetricPoint) {
        if let Ok(mut points) = self.points.lock() {
            points.push(point.clone());
        }
        self.inner.write_point(point);
    }
}

/// Collaborators, channels, and shutdown for the worker.
pub struct WorkerDeps {
    pub modem: Arc<ModemClient>,
    pub pipeline: Arc<Pipeline>,
    pub points: PointChannel,
    pub latest: Arc<RwLock<LatestScrape>>,
    pub points_written_total: Arc<AtomicU64>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Worker timing and logging config.
pub struct WorkerConfig {
    pub scrape_interval_secs: u64,
    /// How often to log collector stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Writer config: batching for the dedicated point writer task.
pub struct PointWriterConfig {
    pub flush_rate: u64,
    pub flush_interval_secs: u64,
}

/// Spawns the task that receives points from the worker and writes them to Influx.
/// Flushes when buffer len >= flush_rate, or every flush_interval_secs, or when channel closes.
/// A failed write is logged and its batch discarded.
pub fn spawn_point_writer(
    mut write_rx: mpsc::Receiver<MetricPoint>,
    writer: Arc<InfluxWriter>,
    config: PointWriterConfig,
    points_written_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    tokio::spawn(async move {
        let mut buffer: Vec<MetricPoint> = Vec::new();
        let mut flush_tick = interval(flush_interval);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = write_rx.recv() => {
                    match result {
                        Some(point) => {
                            buffer.push(point);
                            if buffer.len() >= config.flush_rate as usize {
                                flush_buffer(&writer, &mut buffer, &points_written_total).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    flush_buffer(&writer, &mut buffer, &points_written_total).await;
                }
            }
        }
        flush_buffer(&writer, &mut buffer, &points_written_total).await;
        tracing::debug!("Point writer shutting down");
    })
}

async fn flush_buffer(
    writer: &InfluxWriter,
    buffer: &mut Vec<MetricPoint>,
    points_written_total: &AtomicU64,
) {
    if buffer.is_empty() {
        return;
    }
    match writer.write_points(buffer).await {
        Ok(n) => {
            points_written_total.fetch_add(n as u64, Ordering::Relaxed);
            tracing::debug!(operation = "write_points", points_count = n, "Points written");
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                operation = "write_points",
                points_count = buffer.len(),
                "point writer: influx write failed"
            );
        }
    }
    buffer.clear();
}

/// Spawns the scrape loop. Cycles run back to back on one task, so they never overlap;
/// ticks missed during a slow cycle are skipped.
///
/// Resolves to an error only when a cycle stops on a malformed page under
/// [`MalformedPolicy::Halt`].
pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<anyhow::Result<()>> {
    let WorkerDeps {
        modem,
        pipeline,
        points,
        latest,
        points_written_total,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        scrape_interval_secs,
        stats_log_interval_secs,
    } = config;

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(scrape_interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // first tick completes immediately
        stats_log_tick.tick().await;

        let mut cycles_ok: u64 = 0;
        let mut cycles_failed: u64 = 0;
        let mut rows_skipped: u64 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let sink = CycleSink { inner: &points, points: Mutex::new(Vec::new()) };
                    match pipeline.run_cycle(&modem, &sink).await {
                        Ok(report) => {
                            cycles_ok += 1;
                            rows_skipped += report.skipped as u64;
                            tracing::debug!(
                                operation = "scrape",
                                downstream = report.downstream,
                                upstream = report.upstream,
                                skipped = report.skipped,
                                "scrape cycle complete"
                            );
                            let cycle_points = sink.points.into_inner().unwrap_or_default();
                            let mut snapshot = latest.write().await;
                            snapshot.captured_at = Some(report.captured_at);
                            snapshot.points = cycle_points;
                        }
                        Err(e) => {
                            cycles_failed += 1;
                            tracing::warn!(
                                error = %e,
                                operation = "scrape",
                                url = modem.status_url(),
                                "scrape cycle failed"
                            );
                            if e.is_malformed() && pipeline.policy() == MalformedPolicy::Halt {
                                tracing::error!(error = %e, "halting collector on malformed status page");
                                return Err(anyhow::Error::new(e).context("malformed status page"));
                            }
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        cycles_ok,
                        cycles_failed,
                        rows_skipped,
                        points_written_total = points_written_total.load(Ordering::Relaxed),
                        "collector stats"
                    );
                }
            }
        }
        Ok(())
    }
    .instrument(tracing::debug_span!("worker", scrape_interval_secs)))
}
