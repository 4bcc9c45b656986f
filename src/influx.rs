// InfluxDB v2 write API client. Batches are posted as line protocol; no retries.

use crate::config::InfluxConfig;
use crate::line_protocol::encode_point;
use crate::models::MetricPoint;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::instrument;

pub struct InfluxWriter {
    client: reqwest::Client,
    write_url: Url,
    token: String,
}

impl InfluxWriter {
    pub fn new(client: reqwest::Client, config: &InfluxConfig) -> anyhow::Result<Self> {
        let mut write_url =
            Url::parse(&format!("{}/api/v2/write", config.url.trim_end_matches('/')))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &config.org)
            .append_pair("bucket", &config.bucket)
            .append_pair("precision", "ns");
        Ok(Self {
            client,
            write_url,
            token: config.token.clone(),
        })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Returns the number of lines sent.
    #[instrument(skip(self, points), fields(sink = "influx", operation = "write_points", points_count = points.len()))]
    pub async fn write_points(&self, points: &[MetricPoint]) -> anyhow::Result<usize> {
        let lines: Vec<String> = points.iter().filter_map(encode_point).collect();
        if lines.len() < points.len() {
            tracing::debug!(
                dropped = points.len() - lines.len(),
                "points without writable fields skipped"
            );
        }
        if lines.is_empty() {
            return Ok(0);
        }

        let resp = self
            .client
            .post(self.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(lines.join("\n"))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("influx write returned {}: {}", status, body.trim());
        }
        Ok(lines.len())
    }
}
