// ===============================
// src/engine.rs
// ===============================
//
// Rate-controlled generation loop.
//
//   Idle --ping ok--> Running --cancel / deadline--> Draining --flush + final stats--> Stopped
//
// - One tick every 1s / tps (fixed interval, bukan token bucket).
// - Each tick: uniform draw < fraud_rate -> fraud branch, else normal branch.
// - Fraud branch with no matching profile falls back to a normal trade.
// - Publish errors are logged + counted, never retried, never fatal.
// - Cancellation and the deadline are checked at tick boundaries only; a
//   publish that hangs stalls the loop (sink timeout policy applies).
// - Reporter task runs on its own interval and only reads Statistics.
//
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{interval, interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, GeneratorConfig};
use crate::domain::{FraudPattern, Trade, TraderCategory, TraderProfile};
use crate::market;
use crate::metrics;
use crate::patterns;
use crate::profiles::{self, SelectionTier};
use crate::sink::{SinkError, TradeSink};
use crate::stats::{notional_cents, Statistics, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    Deadline,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    Config(#[from] ConfigError),
    #[error("sink {sink} failed liveness probe: {source}")]
    SinkUnavailable { sink: String, source: SinkError },
}

pub struct Engine {
    cfg: GeneratorConfig,
    catalog: Vec<TraderProfile>,
    sink: Box<dyn TradeSink>,
    rng: StdRng,
    stats: Arc<Statistics>,
    state: watch::Sender<EngineState>,
}

impl Engine {
    /// Rejects configs that `GeneratorConfig::validate` refuses (zero tick or report interval etc).
    pub fn new(cfg: GeneratorConfig, sink: Box<dyn TradeSink>) -> Result<Self, EngineError> {
        cfg.validate()?;
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (state, _) = watch::channel(EngineState::Idle);
        Ok(Self {
            cfg,
            catalog: profiles::all_profiles().to_vec(),
            sink,
            rng,
            stats: Arc::new(Statistics::new()),
            state,
        })
    }

    /// Replace the default catalog.
    pub fn with_catalog(mut self, catalog: Vec<TraderProfile>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn stats(&self) -> Arc<Statistics> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: EngineState) {
        let prev = self.state.send_replace(next);
        debug!(?prev, ?next, "engine state");
    }

    /// Run until `shutdown` flips to true or the configured duration elapses.
    /// Returns the final statistics.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<StatsSnapshot, EngineError> {
        if let Err(source) = self.sink.ping().await {
            self.set_state(EngineState::Stopped);
            return Err(EngineError::SinkUnavailable { sink: self.sink.describe(), source });
        }
        self.set_state(EngineState::Running);
        info!(
            sink = %self.sink.describe(),
            tps = self.cfg.tps,
            duration = ?self.cfg.duration,
            fraud_rate = self.cfg.fraud_rate,
            fraud_type = %self.cfg.fraud_filter,
            "generator running"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let reporter = tokio::spawn(report_loop(Arc::clone(&self.stats), self.cfg.stats_interval, stop_rx));

        let mut ticker = interval(self.cfg.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let deadline = self.cfg.duration.map(|d| Instant::now() + d);

        let reason = loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break StopReason::Cancelled,
                _ = ticker.tick() => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        break StopReason::Deadline;
                    }
                    self.tick().await;
                }
            }
        };

        self.set_state(EngineState::Draining);
        info!(?reason, "generator draining");
        if let Err(e) = self.sink.flush().await {
            warn!(error = %e, "sink flush failed");
        }
        let _ = stop_tx.send(true);
        match reporter.await {
            Ok(lines) => debug!(lines, "reporter stopped"),
            Err(e) => warn!(?e, "reporter task ended abnormally"),
        }

        let summary = self.stats.snapshot();
        self.set_state(EngineState::Stopped);
        info!(
            total = summary.total_trades,
            fraud = summary.fraud_trades,
            publish_errors = summary.publish_errors,
            tps = %format!("{:.1}", summary.tps()),
            "generator stopped"
        );
        Ok(summary)
    }

    /// One generation step: fraud branch with probability `fraud_rate`, otherwise normal.
    pub async fn tick(&mut self) {
        if self.rng.gen::<f64>() < self.cfg.fraud_rate && self.fraud_tick().await {
            return;
        }
        self.normal_tick().await;
    }

    async fn normal_tick(&mut self) {
        let (trade, category, off_hours) = {
            let Some(sel) = profiles::select_profile(&mut self.rng, &self.catalog, &self.cfg.ratios) else {
                debug!("catalog is empty, nothing to generate");
                return;
            };
            if sel.tier == SelectionTier::Catalog {
                debug!(user = sel.profile.user_id, "category bucket empty, picked from whole catalog");
            }
            let trade = market::synthesize_trade(&mut self.rng, sel.profile, Utc::now());
            let off_hours = !sel.profile.is_active_at(trade.timestamp.hour());
            (trade, sel.profile.category, off_hours)
        };
        self.publish(trade, category, None, off_hours).await;
    }

    /// `false` when no fraud profile fits the filter; caller then makes a normal trade.
    async fn fraud_tick(&mut self) -> bool {
        let (injection, category) = {
            let Some(profile) = profiles::select_fraud_profile(&mut self.rng, &self.catalog, self.cfg.fraud_filter)
            else {
                debug!(filter = %self.cfg.fraud_filter, "no fraud profile for filter, normal trade instead");
                return false;
            };
            match patterns::inject(&mut self.rng, profile, Utc::now()) {
                Some(injection) => (injection, profile.category),
                None => return false,
            }
        };
        if let Some(kind) = injection.anomaly {
            debug!(kind = kind.as_str(), "anomaly injected");
        }
        let pattern = injection.pattern;
        for trade in injection.trades {
            self.publish(trade, category, Some(pattern), false).await;
        }
        true
    }

    /// Only accepted trades are counted and echoed.
    async fn publish(&mut self, trade: Trade, category: TraderCategory, pattern: Option<FraudPattern>, off_hours: bool) {
        match self.sink.publish(&trade).await {
            Ok(()) => {
                self.stats.record(&trade, category, pattern);
                metrics::observe_trade(category, pattern, notional_cents(&trade));
                if self.cfg.verbose {
                    echo(&trade, pattern, off_hours);
                }
            }
            Err(e) => {
                self.stats.record_publish_error();
                metrics::PUBLISH_ERRORS.inc();
                warn!(trade_id = %trade.id, symbol = %trade.symbol, error = %e, "publish failed, trade dropped");
            }
        }
    }
}

fn echo(trade: &Trade, pattern: Option<FraudPattern>, off_hours: bool) {
    let ts = trade.timestamp.format("%H:%M:%S");
    let amount = format!("{:.2}", trade.amount);
    let price = format!("{:.2}", trade.price);
    match pattern {
        Some(p) => info!(%ts, pattern = %p, user = %trade.user_id, side = trade.side.as_str(), %amount, %price, symbol = %trade.symbol, "FRAUD"),
        None => info!(%ts, user = %trade.user_id, side = trade.side.as_str(), %amount, %price, symbol = %trade.symbol, off_hours, "trade"),
    }
}

/// Resolves once the flag reads true. A dropped sender never cancels.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Periodic progress line, independent of the generation cadence.
/// Returns how many lines were logged. `every` must be non-zero.
pub async fn report_loop(stats: Arc<Statistics>, every: Duration, mut stop: watch::Receiver<bool>) -> u64 {
    let mut tick = interval_at(Instant::now() + every, every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut stop) => break,
            _ = tick.tick() => {
                info!("{}", stats.snapshot().progress_line());
                lines += 1;
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::FraudFilter;
    use crate::sink::ChannelSink;

    fn cfg(seed: u64) -> GeneratorConfig {
        GeneratorConfig { seed: Some(seed), ..GeneratorConfig::default() }
    }

    #[tokio::test]
    async fn normal_ticks_emit_one_trade_each() {
        let (sink, mut rx) = ChannelSink::pair(64);
        let mut engine = Engine::new(GeneratorConfig { fraud_rate: 0.0, ..cfg(1) }, Box::new(sink)).unwrap();
        for _ in 0..10 {
            engine.tick().await;
        }
        let stats = engine.stats();
        assert_eq!(stats.total_trades(), 10);
        assert_eq!(stats.fraud_trades(), 0);
        assert_eq!(stats.category_count(TraderCategory::Fraud), 0);
        let mut n = 0;
        while let Ok(t) = rx.try_recv() {
            assert!(t.amount > 0.0 && t.price > 0.0);
            n += 1;
        }
        assert_eq!(n, 10);
    }

    #[tokio::test]
    async fn fraud_filter_without_profiles_falls_back_to_normal() {
        let (sink, mut rx) = ChannelSink::pair(64);
        let catalog: Vec<TraderProfile> = profiles::all_profiles()
            .iter()
            .filter(|p| p.fraud_pattern != FraudPattern::Velocity)
            .cloned()
            .collect();
        let mut engine = Engine::new(
            GeneratorConfig { fraud_rate: 1.0, fraud_filter: FraudFilter::Velocity, ..cfg(2) },
            Box::new(sink),
        )
        .unwrap()
        .with_catalog(catalog);
        for _ in 0..5 {
            engine.tick().await;
        }
        assert_eq!(engine.stats().total_trades(), 5);
        assert_eq!(engine.stats().fraud_trades(), 0);
        while let Ok(t) = rx.try_recv() {
            assert!(!t.user_id.starts_with("FRAUD_"));
        }
    }

    #[tokio::test]
    async fn anomaly_ticks_are_tagged_fraud() {
        let (sink, _rx) = ChannelSink::pair(64);
        let mut engine = Engine::new(
            GeneratorConfig { fraud_rate: 1.0, fraud_filter: FraudFilter::Anomaly, ..cfg(3) },
            Box::new(sink),
        )
        .unwrap();
        for _ in 0..8 {
            engine.tick().await;
        }
        let snap = engine.stats().snapshot();
        assert_eq!(snap.total_trades, 8);
        assert_eq!(snap.fraud_trades, 8);
        assert_eq!(snap.by_pattern[2], (FraudPattern::Anomaly, 8));
        assert_eq!(snap.by_category[3], (TraderCategory::Fraud, 8));
    }

    #[tokio::test]
    async fn empty_catalog_generates_nothing() {
        let (sink, _rx) = ChannelSink::pair(4);
        let mut engine = Engine::new(cfg(4), Box::new(sink)).unwrap().with_catalog(Vec::new());
        engine.tick().await;
        assert_eq!(engine.stats().total_trades(), 0);
    }

    #[test]
    fn new_rejects_configs_tokio_timers_cannot_run() {
        let (sink, _rx) = ChannelSink::pair(1);
        let no_reports = GeneratorConfig { stats_interval: Duration::ZERO, ..cfg(5) };
        assert!(matches!(
            Engine::new(no_reports, Box::new(sink)),
            Err(EngineError::Config(ConfigError::StatsInterval))
        ));

        let (sink, _rx) = ChannelSink::pair(1);
        let zero_tick = GeneratorConfig { tps: 2_000_000_000, ..cfg(5) };
        assert!(matches!(
            Engine::new(zero_tick, Box::new(sink)),
            Err(EngineError::Config(ConfigError::Tps(2_000_000_000)))
        ));
    }

    /// In-memory log sink for asserting on emitted lines.
    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
    }

    impl Captured {
        fn text(&self) -> String { String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned() }
    }

    #[tokio::test]
    async fn verbose_echo_only_for_accepted_trades() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (sink, rx) = ChannelSink::pair(8);
        drop(rx);
        let verbose = GeneratorConfig { verbose: true, fraud_rate: 0.0, ..cfg(6) };
        let mut engine = Engine::new(verbose.clone(), Box::new(sink)).unwrap();
        engine.tick().await;
        assert_eq!(engine.stats().publish_errors(), 1);
        let text = logs.text();
        assert!(text.contains("publish failed"), "{text}");
        assert!(!text.contains("trade ts="), "{text}");

        let (sink, _rx) = ChannelSink::pair(8);
        let mut engine = Engine::new(verbose, Box::new(sink)).unwrap();
        engine.tick().await;
        assert_eq!(engine.stats().total_trades(), 1);
        assert!(logs.text().contains("trade ts="), "{}", logs.text());
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_logs_on_its_own_interval_and_stops() {
        let stats = Arc::new(Statistics::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let reporter = tokio::spawn(report_loop(Arc::clone(&stats), Duration::from_secs(10), stop_rx));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(!reporter.is_finished());
        stop_tx.send(true).unwrap();

        let lines = tokio::time::timeout(Duration::from_secs(1), reporter).await.unwrap().unwrap();
        assert_eq!(lines, 2);
    }

    #[tokio::test]
    async fn cancelled_ignores_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(20), cancelled(&mut rx)).await;
        assert!(waited.is_err());
    }
}
