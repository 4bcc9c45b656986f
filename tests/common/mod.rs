// Shared test helpers: status page fixtures, recording sink, fake modem and Influx servers

#![allow(dead_code)]

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use modem_scraper::models::MetricPoint;
use modem_scraper::scrape::PointSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DOWNSTREAM_HEADERS: [&str; 9] = [
    "Channel",
    "Lock Status",
    "Modulation",
    "Channel ID",
    "Frequency",
    "Power",
    "SNR",
    "Corrected",
    "Uncorrectables",
];

pub const UPSTREAM_HEADERS: [&str; 7] = [
    "Channel",
    "Channel ID",
    "Lock Status",
    "US Channel Type",
    "Symbol Rate",
    "Frequency",
    "Power",
];

/// Channel 5 / id 1, as in the modem's first bonded downstream channel.
pub fn downstream_row() -> Vec<&'static str> {
    vec![
        "5", "Locked", "256QAM", "1", "603 MHz", "1.2 dBmV", "40.5 dB", "10", "0",
    ]
}

pub fn upstream_row(channel_id: &'static str, frequency: &'static str) -> Vec<&'static str> {
    vec![
        "1",
        channel_id,
        "Locked",
        "ATDMA",
        "5120 kSym/s",
        frequency,
        "44.0 dBmV",
    ]
}

fn table(title: &str, headers: &[&str], rows: &[Vec<&str>]) -> String {
    let mut html = format!(
        "<table>\n<tr><th colspan=\"{}\"><strong>{title}</strong></th></tr>\n<tr>",
        headers.len()
    );
    for h in headers {
        html.push_str(&format!("<td><strong>{h}</strong></td>"));
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>\n  {cell}\n</td>"));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

/// Status page with the channel tables at the positions the modem uses.
pub fn status_page(downstream: &[Vec<&str>], upstream: &[Vec<&str>]) -> String {
    let downstream = table("Downstream Bonded Channels", &DOWNSTREAM_HEADERS, downstream);
    let upstream = table("Upstream Bonded Channels", &UPSTREAM_HEADERS, upstream);
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Status</title></head>
<body>
<div id="bg3">
<div class="container">
<div class="header"><p>Cable Modem</p></div>
<div class="content">
<form action="/goform/status" method="post">
<p><strong>Startup Procedure</strong></p>
<p>Acquire Downstream Channel: Locked</p>
<p>Connectivity State: OK</p>
<p>Security: Enabled</p>
<center>{downstream}</center>
<p>&nbsp;</p>
<p>&nbsp;</p>
<center>{upstream}</center>
<p>Current System Time: Mon Oct 19 10:00:00 2026</p>
</form>
</div>
</div>
</div>
</body>
</html>"#
    )
}

#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<MetricPoint>>);

impl RecordingSink {
    pub fn points(&self) -> Vec<MetricPoint> {
        self.0.lock().unwrap().clone()
    }
}

impl PointSink for RecordingSink {
    fn write_point(&self, point: MetricPoint) {
        self.0.lock().unwrap().push(point);
    }
}

/// Serves `app` on an ephemeral local port; returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Fake modem serving `page` at the default status path.
pub async fn serve_modem(page: String) -> String {
    let app = Router::new().route(
        "/cgi-bin/status",
        get(move || {
            let page = page.clone();
            async move { axum::response::Html(page) }
        }),
    );
    serve(app).await
}

#[derive(Debug, Clone)]
pub struct CapturedWrite {
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub body: String,
}

/// Fake InfluxDB v2 write endpoint that records every request.
#[derive(Clone)]
pub struct FakeInflux {
    writes: Arc<Mutex<Vec<CapturedWrite>>>,
    status: StatusCode,
}

impl FakeInflux {
    pub fn new(status: StatusCode) -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            status,
        }
    }

    pub fn writes(&self) -> Vec<CapturedWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// All written lines, across batches.
    pub fn lines(&self) -> Vec<String> {
        self.writes()
            .iter()
            .flat_map(|w| w.body.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/api/v2/write", post(fake_write))
            .with_state(self.clone());
        serve(app).await
    }
}

async fn fake_write(
    State(influx): State<FakeInflux>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    influx.writes.lock().unwrap().push(CapturedWrite {
        query,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    if influx.status.is_success() {
        (influx.status, "")
    } else {
        (
            influx.status,
            "{\"code\":\"unauthorized\",\"message\":\"unauthorized access\"}",
        )
    }
}

pub fn influx_config(url: &str) -> modem_scraper::config::InfluxConfig {
    modem_scraper::config::InfluxConfig {
        url: url.to_string(),
        token: "test-token".into(),
        org: "home".into(),
        bucket: "modem".into(),
        flush_rate: 100,
        flush_interval_secs: 60,
    }
}
