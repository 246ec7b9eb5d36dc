// ===============================
// src/stats.rs
// ===============================
//
// Generation statistics shared by the generator loop (writer) and the
// reporter task (reader).
//
// - Plain counters are independent atomics (Relaxed): a progress line may
//   read total/fraud a few trades apart, that's fine.
// - Per-symbol counters live in an RwLock'd map of atomics. Known symbols only
//   take the read lock; first sight of a symbol takes the write lock once
//   (entry API, so concurrent first-sight can't double insert).
// - Volume is integer cents, rounded per trade.
//
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::domain::{FraudPattern, Trade, TraderCategory};

#[derive(Debug)]
pub struct Statistics {
    total_trades: AtomicU64,
    fraud_trades: AtomicU64,
    publish_errors: AtomicU64,
    volume_cents: AtomicU64,
    by_category: [AtomicU64; 4],
    by_pattern: [AtomicU64; 3],
    by_symbol: RwLock<HashMap<String, AtomicU64>>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Default for Statistics {
    fn default() -> Self { Self::new() }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            total_trades: AtomicU64::new(0),
            fraud_trades: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            volume_cents: AtomicU64::new(0),
            by_category: Default::default(),
            by_pattern: Default::default(),
            by_symbol: RwLock::new(HashMap::new()),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Count one successfully published trade. `pattern` is `Some` for fraud trades.
    pub fn record(&self, trade: &Trade, category: TraderCategory, pattern: Option<FraudPattern>) {
        self.total_trades.fetch_add(1, Ordering::Relaxed);
        if let Some(p) = pattern {
            self.fraud_trades.fetch_add(1, Ordering::Relaxed);
            if let Some(slot) = pattern_slot(p) {
                self.by_pattern[slot].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.volume_cents.fetch_add(notional_cents(trade), Ordering::Relaxed);
        self.by_category[category.index()].fetch_add(1, Ordering::Relaxed);
        self.bump_symbol(&trade.symbol);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_trades(&self) -> u64 { self.total_trades.load(Ordering::Relaxed) }
    pub fn fraud_trades(&self) -> u64 { self.fraud_trades.load(Ordering::Relaxed) }
    pub fn publish_errors(&self) -> u64 { self.publish_errors.load(Ordering::Relaxed) }
    pub fn volume_cents(&self) -> u64 { self.volume_cents.load(Ordering::Relaxed) }
    pub fn started_at(&self) -> DateTime<Utc> { self.started_at }

    pub fn category_count(&self, category: TraderCategory) -> u64 {
        self.by_category[category.index()].load(Ordering::Relaxed)
    }

    pub fn symbol_count(&self, symbol: &str) -> u64 {
        let map = self.by_symbol.read().unwrap_or_else(|e| e.into_inner());
        map.get(symbol).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    fn bump_symbol(&self, symbol: &str) {
        {
            let map = self.by_symbol.read().unwrap_or_else(|e| e.into_inner());
            if let Some(counter) = map.get(symbol) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.by_symbol.write().unwrap_or_else(|e| e.into_inner());
        map.entry(symbol.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy; safe while the generator keeps recording.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut by_symbol: Vec<(String, u64)> = {
            let map = self.by_symbol.read().unwrap_or_else(|e| e.into_inner());
            map.iter().map(|(s, c)| (s.clone(), c.load(Ordering::Relaxed))).collect()
        };
        by_symbol.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        StatsSnapshot {
            elapsed: self.started.elapsed(),
            total_trades: self.total_trades(),
            fraud_trades: self.fraud_trades(),
            publish_errors: self.publish_errors(),
            volume_cents: self.volume_cents(),
            by_category: TraderCategory::ALL.map(|c| (c, self.category_count(c))),
            by_pattern: FraudPattern::INJECTABLE
                .map(|p| (p, pattern_slot(p).map(|i| self.by_pattern[i].load(Ordering::Relaxed)).unwrap_or(0))),
            by_symbol,
        }
    }
}

fn pattern_slot(p: FraudPattern) -> Option<usize> {
    FraudPattern::INJECTABLE.iter().position(|x| *x == p)
}

/// price * amount in cents, rounded to the nearest cent.
pub fn notional_cents(trade: &Trade) -> u64 {
    let cents = (trade.notional() * 100.0).round();
    if cents.is_finite() && cents > 0.0 { cents as u64 } else { 0 }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub elapsed: Duration,
    pub total_trades: u64,
    pub fraud_trades: u64,
    pub publish_errors: u64,
    pub volume_cents: u64,
    pub by_category: [(TraderCategory, u64); 4],
    pub by_pattern: [(FraudPattern, u64); 3],
    /// Sorted by count desc, then symbol.
    pub by_symbol: Vec<(String, u64)>,
}

impl StatsSnapshot {
    /// Trades per second since start; 0 before any time has passed.
    pub fn tps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.total_trades as f64 / secs } else { 0.0 }
    }

    pub fn volume(&self) -> f64 { self.volume_cents as f64 / 100.0 }

    pub fn fraud_pct(&self) -> f64 { pct(self.fraud_trades, self.total_trades) }

    pub fn category_sum(&self) -> u64 { self.by_category.iter().map(|(_, n)| n).sum() }

    /// `[MM:SS] N trades | F fraud | X.X tps | $Y.YM volume`
    pub fn progress_line(&self) -> String {
        format!(
            "[{}] {} trades | {} fraud | {:.1} tps | ${:.1}M volume",
            format_mm_ss(self.elapsed),
            self.total_trades,
            self.fraud_trades,
            self.tps(),
            self.volume() / 1_000_000.0,
        )
    }

    pub fn final_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n=== Final Statistics ===");
        let _ = writeln!(out, "Duration:       {}s", self.elapsed.as_secs_f64().round() as u64);
        let _ = writeln!(out, "Total Trades:   {}", self.total_trades);
        let _ = writeln!(out, "Fraud Trades:   {} ({:.1}%)", self.fraud_trades, self.fraud_pct());
        let _ = writeln!(out, "Publish Errors: {}", self.publish_errors);
        let _ = writeln!(out, "Throughput:     {:.1} trades/sec", self.tps());
        let _ = writeln!(out, "Total Volume:   ${:.2}", self.volume());

        let _ = writeln!(out, "\nBy Profile Type:");
        for (cat, n) in self.by_category.iter().filter(|(_, n)| *n > 0) {
            let _ = writeln!(out, "  {cat}: {n} ({:.1}%)", pct(*n, self.total_trades));
        }

        if self.fraud_trades > 0 {
            let _ = writeln!(out, "\nBy Fraud Pattern:");
            for (p, n) in self.by_pattern.iter().filter(|(_, n)| *n > 0) {
                let _ = writeln!(out, "  {p}: {n}");
            }
        }

        if !self.by_symbol.is_empty() {
            let _ = writeln!(out, "\nTop Symbols:");
            for (sym, n) in self.by_symbol.iter().take(10) {
                let _ = writeln!(out, "  {sym}: {n}");
            }
        }
        out
    }
}

fn pct(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 * 100.0 }
}

pub fn format_mm_ss(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use std::sync::Arc;
    use uuid::Uuid;

    fn trade(symbol: &str, amount: f64, price: f64) -> Trade {
        Trade {
            id: Uuid::nil(),
            user_id: "T".into(),
            symbol: symbol.into(),
            amount,
            price,
            side: Side::Buy,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn totals_match_category_sum() {
        let stats = Statistics::new();
        let cats = [TraderCategory::Hft, TraderCategory::Regular, TraderCategory::Casual];
        for i in 0..300 {
            stats.record(&trade("AAPL", 1.0, 1.0), cats[i % 3], None);
        }
        for _ in 0..12 {
            stats.record(&trade("PENNY_A", 10.0, 2.5), TraderCategory::Fraud, Some(FraudPattern::Wash));
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total_trades, 312);
        assert_eq!(snap.category_sum(), 312);
        assert_eq!(snap.fraud_trades, 12);
        assert_eq!(snap.by_pattern[0], (FraudPattern::Wash, 12));
        assert_eq!(snap.by_symbol[0], ("AAPL".to_string(), 300));
        assert_eq!(snap.volume_cents, 300 * 100 + 12 * 2_500);
    }

    #[test]
    fn publish_errors_are_not_trades() {
        let stats = Statistics::new();
        stats.record_publish_error();
        stats.record_publish_error();
        assert_eq!(stats.publish_errors(), 2);
        assert_eq!(stats.total_trades(), 0);
        assert_eq!(stats.snapshot().fraud_pct(), 0.0);
    }

    #[test]
    fn cents_round_to_nearest() {
        assert_eq!(notional_cents(&trade("X", 3.0, 0.333)), 100);
        assert_eq!(notional_cents(&trade("X", 1.0, 0.006)), 1);
        assert_eq!(notional_cents(&trade("X", 0.0, 5.0)), 0);
    }

    #[test]
    fn concurrent_first_sight_counts_every_symbol_once() {
        let stats = Arc::new(Statistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        let sym = format!("S{}", i % 50);
                        s.record(&trade(&sym, 1.0, 1.0), TraderCategory::Regular, None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total_trades, 8_000);
        assert_eq!(snap.by_symbol.len(), 50);
        assert!(snap.by_symbol.iter().all(|(_, n)| *n == 160));
        assert_eq!(stats.symbol_count("S7"), 160);
    }

    #[test]
    fn progress_line_format() {
        let snap = StatsSnapshot {
            elapsed: Duration::from_secs(125),
            total_trades: 250,
            fraud_trades: 5,
            publish_errors: 0,
            volume_cents: 250_000_000,
            by_category: TraderCategory::ALL.map(|c| (c, 0)),
            by_pattern: FraudPattern::INJECTABLE.map(|p| (p, 0)),
            by_symbol: vec![],
        };
        assert_eq!(snap.progress_line(), "[02:05] 250 trades | 5 fraud | 2.0 tps | $2.5M volume");
        let report = snap.final_report();
        assert!(report.contains("Fraud Trades:   5 (2.0%)"));
        assert!(report.contains("Total Volume:   $2500000.00"));
    }
}
