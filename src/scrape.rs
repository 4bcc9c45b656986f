// One scrape cycle: fetch status page -> extract tables -> build points -> emit.
// Points are emitted as rows are built, so a stopped cycle keeps what it already sent.

use crate::channel::{self, RecordError};
use crate::models::{ChannelKind, MetricPoint};
use crate::table::{self, ExtractError, PageLayout};
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Receives each point as soon as it is built.
pub trait PointSink {
    fn write_point(&self, point: MetricPoint);
}

/// What a cycle does with a row that fails to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Log the row and continue with the next one.
    #[default]
    SkipRow,
    /// Stop the cycle; later cycles still run.
    AbortCycle,
    /// Stop the cycle and the collector.
    Halt,
}

impl MalformedPolicy {
    pub fn stops_cycle(self) -> bool {
        !matches!(self, MalformedPolicy::SkipRow)
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch status page: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("status page returned {0}")]
    Status(reqwest::StatusCode),
    #[error("{measurement} table: {source}")]
    Extract {
        measurement: &'static str,
        #[source]
        source: ExtractError,
    },
    #[error("{measurement} row {row}: {source}")]
    Record {
        measurement: &'static str,
        row: usize,
        #[source]
        source: RecordError,
    },
}

impl ScrapeError {
    /// True when the page was fetched but its content did not match the expected layout.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ScrapeError::Extract { .. } | ScrapeError::Record { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub captured_at: DateTime<Utc>,
    pub downstream: usize,
    pub upstream: usize,
    pub skipped: usize,
}

impl CycleReport {
    pub fn emitted(&self) -> usize {
        self.downstream + self.upstream
    }
}

/// HTTP access to the modem's status page.
pub struct ModemClient {
    client: reqwest::Client,
    status_url: String,
}

impl ModemClient {
    pub fn new(client: reqwest::Client, base_url: &str, status_path: &str) -> Self {
        Self {
            client,
            status_url: format!("{}{}", base_url.trim_end_matches('/'), status_path),
        }
    }

    /// Builds a client with a per-request timeout.
    pub fn with_timeout(
        base_url: &str,
        status_path: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, base_url, status_path))
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub async fn fetch_status_page(&self) -> Result<String, ScrapeError> {
        let resp = self.client.get(&self.status_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status));
        }
        Ok(resp.text().await?)
    }
}

/// Table layout plus the malformed-row policy for every cycle.
pub struct Pipeline {
    layout: PageLayout,
    policy: MalformedPolicy,
}

impl Pipeline {
    pub fn new(layout: PageLayout, policy: MalformedPolicy) -> Self {
        Self { layout, policy }
    }

    pub fn policy(&self) -> MalformedPolicy {
        self.policy
    }

    pub async fn run_cycle<S>(&self, modem: &ModemClient, sink: &S) -> Result<CycleReport, ScrapeError>
    where
        S: PointSink + Sync + ?Sized,
    {
        let html = modem.fetch_status_page().await?;
        self.process_page(&html, Utc::now(), sink)
    }

    /// Downstream table first, then upstream. Every point carries `captured_at`.
    pub fn process_page<S>(
        &self,
        html: &str,
        captured_at: DateTime<Utc>,
        sink: &S,
    ) -> Result<CycleReport, ScrapeError>
    where
        S: PointSink + ?Sized,
    {
        let doc = Html::parse_document(html);
        let mut report = CycleReport {
            captured_at,
            downstream: 0,
            upstream: 0,
            skipped: 0,
        };
        for kind in ChannelKind::ALL {
            let (emitted, skipped) = self.process_table(&doc, kind, captured_at, sink)?;
            match kind {
                ChannelKind::Downstream => report.downstream = emitted,
                ChannelKind::Upstream => report.upstream = emitted,
            }
            report.skipped += skipped;
        }
        Ok(report)
    }

    fn process_table<S>(
        &self,
        doc: &Html,
        kind: ChannelKind,
        captured_at: DateTime<Utc>,
        sink: &S,
    ) -> Result<(usize, usize), ScrapeError>
    where
        S: PointSink + ?Sized,
    {
        let measurement = kind.measurement();
        let records = table::extract_records(doc, self.layout.locator(kind))
            .map_err(|source| ScrapeError::Extract { measurement, source })?;
        if records.is_empty() {
            warn!(measurement, "no channel rows found on status page");
        }

        let (mut emitted, mut skipped) = (0, 0);
        for (row, record) in records.iter().enumerate() {
            match channel::build_point(kind, record, captured_at) {
                Ok(point) => {
                    sink.write_point(point);
                    emitted += 1;
                }
                Err(source) => {
                    let err = ScrapeError::Record {
                        measurement,
                        row,
                        source,
                    };
                    if self.policy.stops_cycle() {
                        return Err(err);
                    }
                    warn!(error = %err, ?record, "skipping malformed channel row");
                    skipped += 1;
                }
            }
        }
        debug!(measurement, emitted, skipped, "table processed");
        Ok((emitted, skipped))
    }
}
