use crate::scrape::MalformedPolicy;
use crate::table::{self, PageLayout, TableLocator};
use anyhow::Context;
use serde::Deserialize;

/// Largest accepted `influx.flush_rate`; the writer channel holds four batches.
pub const MAX_FLUSH_RATE: u64 = 100_000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub influx: InfluxConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Status routes are served only when this section is present.
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// e.g. "http://192.168.100.1"; env MODEM_ADDR.
    pub base_url: String,
    pub status_path: String,
    pub request_timeout_secs: u64,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            status_path: "/cgi-bin/status".into(),
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Flush once this many points are buffered.
    pub flush_rate: u64,
    pub flush_interval_secs: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            flush_rate: 100,
            flush_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub interval_secs: u64,
    pub on_malformed: MalformedPolicy,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            on_malformed: MalformedPolicy::default(),
        }
    }
}

/// CSS selectors for the header row and data rows of both channel tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub downstream_header: String,
    pub downstream_rows: String,
    pub upstream_header: String,
    pub upstream_rows: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            downstream_header: table::DEFAULT_DOWNSTREAM_HEADER.into(),
            downstream_rows: table::DEFAULT_DOWNSTREAM_ROWS.into(),
            upstream_header: table::DEFAULT_UPSTREAM_HEADER.into(),
            upstream_rows: table::DEFAULT_UPSTREAM_ROWS.into(),
        }
    }
}

impl LayoutConfig {
    pub fn page_layout(&self) -> anyhow::Result<PageLayout> {
        Ok(PageLayout {
            downstream: TableLocator::parse(&self.downstream_header, &self.downstream_rows)
                .context("layout.downstream")?,
            upstream: TableLocator::parse(&self.upstream_header, &self.upstream_rows)
                .context("layout.upstream")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// How often to log collector stats (cycles, skipped rows, points written) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stats_log_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    /// Reads `CONFIG_FILE` (default `config.toml`, optional when absent), applies
    /// environment overrides, then validates.
    pub fn load() -> anyhow::Result<Self> {
        let s = match std::env::var("CONFIG_FILE") {
            Ok(path) => std::fs::read_to_string(&path)
                .with_context(|| format!("read config file {path}"))?,
            Err(_) => match std::fs::read_to_string("config.toml") {
                Ok(s) => s,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(anyhow::Error::new(e).context("read config.toml")),
            },
        };
        Self::load_with_env(&s, |key| std::env::var(key).ok())
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load_from_str`, with overrides from `lookup` (the process environment in `load`).
    pub fn load_with_env<F>(s: &str, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: AppConfig = toml::from_str(s)?;
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            ("MODEM_ADDR", &mut self.modem.base_url),
            ("INFLUX_ADDR", &mut self.influx.url),
            ("INFLUX_TOKEN", &mut self.influx.token),
            ("INFLUX_ORG", &mut self.influx.org),
            ("INFLUX_BUCKET", &mut self.influx.bucket),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }
        if let Some(rate) = lookup("SCRAPE_RATE_SECS") {
            self.scrape.interval_secs = rate
                .trim()
                .parse()
                .with_context(|| format!("SCRAPE_RATE_SECS must be a whole number of seconds, got {rate:?}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.modem.base_url.is_empty(),
            "modem.base_url must be set (or MODEM_ADDR)"
        );
        anyhow::ensure!(
            reqwest::Url::parse(&self.modem.base_url).is_ok(),
            "modem.base_url must be an absolute URL, got {:?}",
            self.modem.base_url
        );
        anyhow::ensure!(
            self.modem.status_path.starts_with('/'),
            "modem.status_path must start with '/', got {:?}",
            self.modem.status_path
        );
        anyhow::ensure!(
            self.modem.request_timeout_secs > 0,
            "modem.request_timeout_secs must be > 0, got {}",
            self.modem.request_timeout_secs
        );
        for (name, value, env) in [
            ("influx.url", &self.influx.url, "INFLUX_ADDR"),
            ("influx.token", &self.influx.token, "INFLUX_TOKEN"),
            ("influx.org", &self.influx.org, "INFLUX_ORG"),
            ("influx.bucket", &self.influx.bucket, "INFLUX_BUCKET"),
        ] {
            anyhow::ensure!(!value.is_empty(), "{name} must be set (or {env})");
        }
        anyhow::ensure!(
            reqwest::Url::parse(&self.influx.url).is_ok(),
            "influx.url must be an absolute URL, got {:?}",
            self.influx.url
        );
        anyhow::ensure!(
            (1..=MAX_FLUSH_RATE).contains(&self.influx.flush_rate),
            "influx.flush_rate must be in 1..={MAX_FLUSH_RATE}, got {}",
            self.influx.flush_rate
        );
        anyhow::ensure!(
            self.influx.flush_interval_secs > 0,
            "influx.flush_interval_secs must be > 0, got {}",
            self.influx.flush_interval_secs
        );
        anyhow::ensure!(
            self.scrape.interval_secs > 0,
            "scrape.interval_secs must be > 0, got {}",
            self.scrape.interval_secs
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        if let Some(server) = &self.server {
            anyhow::ensure!(
                server.port > 0,
                "server.port must be between 1 and 65535, got {}",
                server.port
            );
        }
        self.layout.page_layout()?;
        Ok(())
    }
}
