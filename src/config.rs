// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : trade_feed_gen — rate-controlled synthetic trade feed in Rust
Module  : config.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Generates a realistic trade stream from weighted trader profiles,
          injects wash / velocity / anomaly fraud patterns at a configurable
          rate, publishes to stdout / JSONL / a Redis stream, reports live
          statistics and exposes Prometheus metrics.
=============================================================================
*/
//
// Urutan prioritas: CLI flag > ENV (FEED_GEN_*, termasuk .env) > file TOML > default.
//
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use serde::Deserialize;
use thiserror::Error;

use crate::profiles::{CategoryRatios, FraudFilter};
use crate::sink::{RedisTarget, SinkSpec};

pub const MIN_TPS: u32 = 1;
pub const MAX_TPS: u32 = 10_000;
/// Accepted distance of the ratio sum from 1.0.
pub const RATIO_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tps must be between 1 and 10000, got {0}")]
    Tps(u32),
    #[error("fraud rate must be between 0.0 and 1.0, got {0:.2}")]
    FraudRate(f64),
    #[error("profile ratios must sum to 1.0, got {0:.2}")]
    RatioSum(f64),
    #[error("profile ratio {name} must be >= 0, got {value:.2}")]
    NegativeRatio { name: &'static str, value: f64 },
    #[error("stats interval must be greater than zero")]
    StatsInterval,
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("parse config file {}: {source}", .path.display())]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// Command line surface. Every option can also come from `FEED_GEN_*`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "feed-generator",
    version,
    about = "Generate realistic trade feeds with injected fraud patterns",
    long_about = "Generates trades from HFT, regular and casual trader profiles and \
                  injects wash trades, velocity spikes and anomalies at a configurable rate.\n\n\
                  Examples:\n  \
                  feed-generator --tps 100 --duration 5m\n  \
                  feed-generator --tps 50 --fraud-rate 0.1 --fraud-type WASH\n  \
                  feed-generator --tps 100 --duration 0 --verbose --sink jsonl:out/trades.jsonl"
)]
pub struct Cli {
    /// TOML config file ([generate], [profiles], [sink], [redis], [metrics])
    #[arg(long, env = "FEED_GEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Trades per second (1-10000)
    #[arg(short, long, env = "FEED_GEN_TPS")]
    pub tps: Option<u32>,

    /// Run duration, e.g. 30s, 5m, 1h (0 = until interrupted)
    #[arg(short, long, env = "FEED_GEN_DURATION")]
    pub duration: Option<String>,

    /// Fraud pattern injection rate (0.0-1.0)
    #[arg(short, long, env = "FEED_GEN_FRAUD_RATE")]
    pub fraud_rate: Option<f64>,

    /// Fraud types: ALL, WASH, VELOCITY, ANOMALY
    #[arg(long, env = "FEED_GEN_FRAUD_TYPE")]
    pub fraud_type: Option<String>,

    /// Log every generated trade
    #[arg(short, long, env = "FEED_GEN_VERBOSE")]
    pub verbose: bool,

    /// Statistics reporting interval
    #[arg(long, env = "FEED_GEN_STATS_INTERVAL")]
    pub stats_interval: Option<String>,

    #[arg(long, env = "FEED_GEN_HFT_RATIO")]
    pub hft_ratio: Option<f64>,

    #[arg(long, env = "FEED_GEN_REGULAR_RATIO")]
    pub regular_ratio: Option<f64>,

    #[arg(long, env = "FEED_GEN_CASUAL_RATIO")]
    pub casual_ratio: Option<f64>,

    /// stdout | jsonl:<path> | redis | redis://[:password@]host:port/db[?stream=name]
    #[arg(long, env = "FEED_GEN_SINK")]
    pub sink: Option<String>,

    /// Redis host (implies the redis sink when --sink is not given)
    #[arg(long, env = "FEED_GEN_REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long, env = "FEED_GEN_REDIS_PORT")]
    pub redis_port: Option<u16>,

    #[arg(long, env = "FEED_GEN_REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    #[arg(long, env = "FEED_GEN_REDIS_DB")]
    pub redis_db: Option<i64>,

    /// Stream the trades are appended to (default trades:stream)
    #[arg(long, env = "FEED_GEN_REDIS_STREAM")]
    pub redis_stream: Option<String>,

    /// Seed for a reproducible trade sequence
    #[arg(long, env = "FEED_GEN_SEED")]
    pub seed: Option<u64>,

    /// Prometheus port (0 = off)
    #[arg(long, env = "FEED_GEN_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

// ---- TOML file layer ----

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub generate: GenerateSection,
    pub profiles: ProfilesSection,
    pub sink: SinkSection,
    pub redis: RedisSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateSection {
    pub tps: Option<u32>,
    pub duration: Option<String>,
    pub fraud_rate: Option<f64>,
    pub fraud_type: Option<String>,
    pub verbose: Option<bool>,
    pub stats_interval: Option<String>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfilesSection {
    pub hft_ratio: Option<f64>,
    pub regular_ratio: Option<f64>,
    pub casual_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SinkSection {
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub stream: Option<String>,
}

impl RedisSection {
    fn is_set(&self) -> bool {
        self.host.is_some() || self.port.is_some() || self.password.is_some() || self.db.is_some() || self.stream.is_some()
    }

    /// Explicit settings win over what the sink url said.
    fn apply(self, mut target: RedisTarget) -> RedisTarget {
        if let Some(host) = self.host { target.host = host; }
        if let Some(port) = self.port { target.port = port; }
        if let Some(pw) = self.password.filter(|p| !p.is_empty()) { target.password = Some(pw); }
        if let Some(db) = self.db { target.db = db; }
        if let Some(stream) = self.stream { target.stream = stream; }
        target
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub port: Option<u16>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

/// Validated parameters handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub tps: u32,
    /// `None` runs until cancelled.
    pub duration: Option<Duration>,
    pub fraud_rate: f64,
    pub fraud_filter: FraudFilter,
    pub ratios: CategoryRatios,
    pub stats_interval: Duration,
    pub verbose: bool,
    pub sink: SinkSpec,
    pub seed: Option<u64>,
    pub metrics_port: u16,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tps: 100,
            duration: Some(Duration::from_secs(5 * 60)),
            fraud_rate: 0.05,
            fraud_filter: FraudFilter::All,
            ratios: CategoryRatios::default(),
            stats_interval: Duration::from_secs(10),
            verbose: false,
            sink: SinkSpec::Stdout,
            seed: None,
            metrics_port: 0,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TPS..=MAX_TPS).contains(&self.tps) {
            return Err(ConfigError::Tps(self.tps));
        }
        if !(0.0..=1.0).contains(&self.fraud_rate) {
            return Err(ConfigError::FraudRate(self.fraud_rate));
        }
        for (name, value) in [
            ("hft_ratio", self.ratios.hft),
            ("regular_ratio", self.ratios.regular),
            ("casual_ratio", self.ratios.casual),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::NegativeRatio { name, value });
            }
        }
        let sum = self.ratios.sum();
        if !((1.0 - RATIO_TOLERANCE)..=(1.0 + RATIO_TOLERANCE)).contains(&sum) {
            return Err(ConfigError::RatioSum(sum));
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::StatsInterval);
        }
        Ok(())
    }

    /// Interval between generator ticks: 1s / tps.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tps.max(MIN_TPS)
    }
}

/// Parse `250ms`, `30s`, `5m`, `1h` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let s = raw.trim();
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.parse().map_err(|_| format!("bad duration {raw:?}"))?;
    let secs = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1_000.0,
        "m" => value * 60.0,
        "h" => value * 3_600.0,
        other => return Err(format!("unknown duration unit {other:?} in {raw:?}")),
    };
    Duration::try_from_secs_f64(secs).map_err(|e| format!("bad duration {raw:?}: {e}"))
}

fn duration_field(field: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).map_err(|reason| ConfigError::Invalid { field, reason })
}

/// Merge CLI/env over the optional file over defaults, then validate.
pub fn resolve(cli: Cli) -> Result<GeneratorConfig, ConfigError> {
    let file = match &cli.config {
        Some(path) => FileConfig::from_path(path)?,
        None => FileConfig::default(),
    };
    let d = GeneratorConfig::default();
    let (g, p) = (file.generate, file.profiles);

    let duration = match cli.duration.or(g.duration) {
        Some(raw) => Some(duration_field("duration", &raw)?).filter(|dur| !dur.is_zero()),
        None => d.duration,
    };
    let stats_interval = match cli.stats_interval.or(g.stats_interval) {
        Some(raw) => duration_field("stats_interval", &raw)?,
        None => d.stats_interval,
    };
    let fraud_filter = match cli.fraud_type.or(g.fraud_type) {
        Some(raw) => raw
            .parse::<FraudFilter>()
            .map_err(|reason| ConfigError::Invalid { field: "fraud_type", reason })?,
        None => d.fraud_filter,
    };
    let redis = RedisSection {
        host: cli.redis_host.or(file.redis.host),
        port: cli.redis_port.or(file.redis.port),
        password: cli.redis_password.or(file.redis.password),
        db: cli.redis_db.or(file.redis.db),
        stream: cli.redis_stream.or(file.redis.stream),
    };
    let sink = match cli.sink.or(file.sink.target) {
        Some(raw) => raw.parse::<SinkSpec>().map_err(|reason| ConfigError::Invalid { field: "sink", reason })?,
        None if redis.is_set() => SinkSpec::Redis(RedisTarget::default()),
        None => d.sink,
    };
    let sink = match sink {
        SinkSpec::Redis(target) => {
            let target = redis.apply(target);
            if target.stream.is_empty() {
                return Err(ConfigError::Invalid { field: "redis_stream", reason: "stream name is empty".into() });
            }
            SinkSpec::Redis(target)
        }
        other => other,
    };

    let cfg = GeneratorConfig {
        tps: cli.tps.or(g.tps).unwrap_or(d.tps),
        duration,
        fraud_rate: cli.fraud_rate.or(g.fraud_rate).unwrap_or(d.fraud_rate),
        fraud_filter,
        ratios: CategoryRatios {
            hft: cli.hft_ratio.or(p.hft_ratio).unwrap_or(d.ratios.hft),
            regular: cli.regular_ratio.or(p.regular_ratio).unwrap_or(d.ratios.regular),
            casual: cli.casual_ratio.or(p.casual_ratio).unwrap_or(d.ratios.casual),
        },
        stats_interval,
        verbose: cli.verbose || g.verbose.unwrap_or(d.verbose),
        sink,
        seed: cli.seed.or(g.seed),
        metrics_port: cli.metrics_port.or(file.metrics.port).unwrap_or(d.metrics_port),
    };
    cfg.validate()?;
    Ok(cfg)
}

pub fn load() -> Result<GeneratorConfig, ConfigError> {
    // Pastikan .env dibaca sebelum clap membaca ENV
    let _ = dotenv();
    resolve(Cli::parse())
}
