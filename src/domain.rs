// ===============================
// src/domain.rs
// ===============================
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side { Buy, Sell }
impl Side { pub fn as_str(&self) -> &'static str { match self { Side::Buy => "BUY", Side::Sell => "SELL" } } }

/// Trader archetype. Fraud is never picked by the weighted normal-trade path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraderCategory { Hft, Regular, Casual, Fraud }

impl TraderCategory {
    pub const ALL: [TraderCategory; 4] =
        [TraderCategory::Hft, TraderCategory::Regular, TraderCategory::Casual, TraderCategory::Fraud];

    pub fn as_str(&self) -> &'static str {
        match self {
            TraderCategory::Hft => "HFT",
            TraderCategory::Regular => "REGULAR",
            TraderCategory::Casual => "CASUAL",
            TraderCategory::Fraud => "FRAUD",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            TraderCategory::Hft => 0,
            TraderCategory::Regular => 1,
            TraderCategory::Casual => 2,
            TraderCategory::Fraud => 3,
        }
    }
}

impl fmt::Display for TraderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FraudPattern { None, Wash, Velocity, Anomaly }

impl FraudPattern {
    /// Patterns that actually produce fraud trades, in reporting order.
    pub const INJECTABLE: [FraudPattern; 3] = [FraudPattern::Wash, FraudPattern::Velocity, FraudPattern::Anomaly];

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudPattern::None => "NONE",
            FraudPattern::Wash => "WASH",
            FraudPattern::Velocity => "VELOCITY",
            FraudPattern::Anomaly => "ANOMALY",
        }
    }
}

impl fmt::Display for FraudPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Immutable trader archetype. Built once by the catalog, only ever borrowed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TraderProfile {
    pub user_id: &'static str,
    pub category: TraderCategory,
    pub typical_symbols: &'static [&'static str],
    pub avg_trade_size: f64,
    /// Relative standard deviation of trade size (0.0-1.0).
    pub volatility: f64,
    pub active_hours: &'static [u32],
    pub trades_per_hour: u32,
    pub fraud_pattern: FraudPattern,
}

impl TraderProfile {
    pub fn is_active_at(&self, hour: u32) -> bool { self.active_hours.contains(&hour) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub user_id: String,
    pub symbol: String,
    pub amount: f64,
    pub price: f64,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn notional(&self) -> f64 { self.amount * self.price }
}
