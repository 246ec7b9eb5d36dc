// ===============================
// src/main.rs
// ===============================
/*
 # 1 menit, 50 tps, 10% fraud, hanya wash trade
 cargo run --release -- -t 50 -d 1m -f 0.1 --fraud-type wash

 # tulis ke file, metrics di :9898
 FEED_GEN_SINK=jsonl:out/trades.jsonl FEED_GEN_METRICS_PORT=9898 cargo run --release

 curl -s localhost:9898/metrics | grep '^trades_generated_total'
*/
/*
=============================================================================
Project : trade_feed_gen — rate-controlled synthetic trade feed in Rust
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Generates a realistic trade stream from weighted trader profiles,
          injects wash / velocity / anomaly fraud patterns at a configurable
          rate, publishes to stdout / JSONL / a Redis stream, reports live
          statistics and exposes Prometheus metrics.
=============================================================================
*/
use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trade_feed_gen::{config, engine::Engine, metrics, sink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---- Logging ----
    // stderr, supaya stdout sink tetap bersih (satu JSON per baris)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ---- Config ----
    let cfg = config::load().context("invalid configuration")?;
    info!(
        tps = cfg.tps,
        duration = ?cfg.duration,
        fraud_rate = cfg.fraud_rate,
        fraud_type = %cfg.fraud_filter,
        hft = cfg.ratios.hft,
        regular = cfg.ratios.regular,
        casual = cfg.ratios.casual,
        stats_interval = ?cfg.stats_interval,
        sink = %cfg.sink,
        seed = ?cfg.seed,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    metrics::export_config(&cfg);
    if cfg.metrics_port != 0 {
        metrics::serve_metrics(cfg.metrics_port).await;
    }

    // ---- Sink ----
    let out = sink::connect(&cfg.sink)
        .await
        .with_context(|| format!("open sink {}", cfg.sink))?;

    // ---- Shutdown: Ctrl-C / SIGTERM ----
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = stop_tx.send(true);
    });

    // ---- Run ----
    let summary = Engine::new(cfg, out)
        .context("engine setup")?
        .run(stop_rx)
        .await
        .context("generator aborted")?;

    eprint!("{}", summary.final_report());
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
            Err(e) => warn!(?e, "SIGTERM handler unavailable, Ctrl-C only"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "Ctrl-C handler failed, run until deadline");
        std::future::pending::<()>().await;
    }
}
