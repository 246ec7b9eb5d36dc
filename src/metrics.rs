// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

use crate::config::GeneratorConfig;
use crate::domain::{FraudPattern, TraderCategory};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Generation metrics --------
pub static TRADES_BY_CATEGORY: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trades_generated_total", "trades published, by trader category"),
        &["category"],
    )
    .unwrap()
});

pub static FRAUD_TRADES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fraud_trades_total", "injected fraud trades published, by pattern"),
        &["pattern"],
    )
    .unwrap()
});

pub static PUBLISH_ERRORS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("publish_errors_total", "trades the sink refused").unwrap());

pub static VOLUME_CENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("volume_generated_cents_total", "published notional (price x amount) in cents").unwrap()
});

// ---- Config visibility ----
pub static CONFIG_TPS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("config_tps", "target trades per second").unwrap());

pub static CONFIG_FRAUD_RATE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("config_fraud_rate_pct", "fraud injection rate (percent)").unwrap());

pub fn init() {
    // Register all metrics to the custom registry (double init is ignored)
    let _ = REGISTRY.register(Box::new(TRADES_BY_CATEGORY.clone()));
    let _ = REGISTRY.register(Box::new(FRAUD_TRADES.clone()));
    let _ = REGISTRY.register(Box::new(PUBLISH_ERRORS.clone()));
    let _ = REGISTRY.register(Box::new(VOLUME_CENTS.clone()));
    let _ = REGISTRY.register(Box::new(CONFIG_TPS.clone()));
    let _ = REGISTRY.register(Box::new(CONFIG_FRAUD_RATE.clone()));
}

pub fn export_config(cfg: &GeneratorConfig) {
    CONFIG_TPS.set(i64::from(cfg.tps));
    CONFIG_FRAUD_RATE.set(cfg.fraud_rate * 100.0);
}

pub fn observe_trade(category: TraderCategory, pattern: Option<FraudPattern>, cents: u64) {
    TRADES_BY_CATEGORY.with_label_values(&[category.as_str()]).inc();
    if let Some(p) = pattern {
        FRAUD_TRADES.with_label_values(&[p.as_str()]).inc();
    }
    VOLUME_CENTS.inc_by(cents);
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), minimal HTTP/1.1 reply
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server di OS thread sendiri (runtime Tokio tetap bersih)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, ?e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
