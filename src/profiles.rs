// ===============================
// src/profiles.rs
// ===============================
//
// Static trader archetypes + weighted selection.
//
// Catalog shape (kira-kira mengikuti pasar nyata):
// - HFT     : ~20% of users, bulk of the notional volume
// - Regular : ~70% of users, moderate size
// - Casual  : ~10% of users, small ETF tickets
// - Fraud   : one profile per injectable pattern, never picked by the weighted path
//
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{FraudPattern, TraderCategory, TraderProfile};

// ---- Symbol universes ----
pub const BLUE_CHIP_SYMBOLS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA", "TSLA"];
pub const POPULAR_SYMBOLS: &[&str] = &["AAPL", "TSLA", "AMZN", "NVDA", "SPY", "QQQ"];
pub const ETF_SYMBOLS: &[&str] = &["SPY", "QQQ", "VTI", "IWM", "DIA"];
pub const PENNY_STOCKS: &[&str] = &["PENNY_A", "PENNY_B", "PENNY_C", "MICRO_X", "MICRO_Y"];

const MARKET_HOURS: &[u32] = &[9, 10, 11, 12, 13, 14, 15];

static DEFAULT_PROFILES: &[TraderProfile] = &[
    // ---- High-Frequency ----
    TraderProfile {
        user_id: "HFT_001",
        category: TraderCategory::Hft,
        typical_symbols: BLUE_CHIP_SYMBOLS,
        avg_trade_size: 75_000.0,
        volatility: 0.2,
        active_hours: MARKET_HOURS,
        trades_per_hour: 100,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "HFT_002",
        category: TraderCategory::Hft,
        typical_symbols: &["TSLA", "NVDA", "META", "AMZN"],
        avg_trade_size: 100_000.0,
        volatility: 0.3,
        active_hours: &[9, 10, 11, 12, 13, 14, 15, 16],
        trades_per_hour: 150,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "HFT_003",
        category: TraderCategory::Hft,
        typical_symbols: BLUE_CHIP_SYMBOLS,
        avg_trade_size: 50_000.0,
        volatility: 0.2,
        active_hours: MARKET_HOURS,
        trades_per_hour: 80,
        fraud_pattern: FraudPattern::None,
    },
    // ---- Regular ----
    TraderProfile {
        user_id: "USER_001",
        category: TraderCategory::Regular,
        typical_symbols: &["AAPL", "TSLA", "AMZN", "NVDA"],
        avg_trade_size: 5_000.0,
        volatility: 0.5,
        active_hours: &[10, 14],
        trades_per_hour: 2,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "USER_002",
        category: TraderCategory::Regular,
        typical_symbols: &["AAPL", "MSFT", "GOOGL"],
        avg_trade_size: 7_500.0,
        volatility: 0.4,
        active_hours: &[9, 12, 15],
        trades_per_hour: 3,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "USER_003",
        category: TraderCategory::Regular,
        typical_symbols: POPULAR_SYMBOLS,
        avg_trade_size: 4_000.0,
        volatility: 0.6,
        active_hours: &[11, 14],
        trades_per_hour: 1,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "USER_004",
        category: TraderCategory::Regular,
        typical_symbols: &["TSLA", "NVDA", "AMD"],
        avg_trade_size: 6_000.0,
        volatility: 0.5,
        active_hours: &[10, 13],
        trades_per_hour: 2,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "USER_005",
        category: TraderCategory::Regular,
        typical_symbols: &["AAPL", "TSLA", "AMZN"],
        avg_trade_size: 5_500.0,
        volatility: 0.4,
        active_hours: &[9, 14],
        trades_per_hour: 2,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "USER_006",
        category: TraderCategory::Regular,
        typical_symbols: &["AAPL", "MSFT", "GOOGL", "AMZN"],
        avg_trade_size: 8_000.0,
        volatility: 0.3,
        active_hours: &[10, 15],
        trades_per_hour: 3,
        fraud_pattern: FraudPattern::None,
    },
    TraderProfile {
        user_id: "USER_007",
        category: TraderCategory::Regular,
        typical_symbols: POPULAR_SYMBOLS,
        avg_trade_size: 4_500.0,
        volatility: 0.5,
        active_hours: &[11, 14],
        trades_per_hour: 1,
        fraud_pattern: FraudPattern::None,
    },
    // ---- Casual ----
    TraderProfile {
        user_id: "CASUAL_001",
        category: TraderCategory::Casual,
        typical_symbols: &["SPY", "QQQ"],
        avg_trade_size: 1_000.0,
        volatility: 0.3,
        active_hours: &[10],
        trades_per_hour: 1,
        fraud_pattern: FraudPattern::None,
    },
    // ---- Fraud (detection targets) ----
    TraderProfile {
        user_id: "FRAUD_WASH_001",
        category: TraderCategory::Fraud,
        typical_symbols: PENNY_STOCKS,
        avg_trade_size: 10_000.0,
        volatility: 0.1,
        active_hours: MARKET_HOURS,
        trades_per_hour: 20,
        fraud_pattern: FraudPattern::Wash,
    },
    TraderProfile {
        user_id: "FRAUD_VELOCITY_001",
        category: TraderCategory::Fraud,
        typical_symbols: &["AAPL", "TSLA", "AMZN"],
        avg_trade_size: 5_000.0,
        volatility: 0.2,
        active_hours: &[14],
        trades_per_hour: 5,
        fraud_pattern: FraudPattern::Velocity,
    },
    TraderProfile {
        user_id: "FRAUD_ANOMALY_001",
        category: TraderCategory::Fraud,
        typical_symbols: &["AAPL", "MSFT", "GOOGL"],
        avg_trade_size: 3_000.0,
        volatility: 0.4,
        active_hours: &[10, 14],
        trades_per_hour: 2,
        fraud_pattern: FraudPattern::Anomaly,
    },
];

/// Fixed catalog, in declaration order. Never empty.
pub fn all_profiles() -> &'static [TraderProfile] {
    DEFAULT_PROFILES
}

/// Selection weights for the normal-trade path. Validated to sum to ~1.0 by config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryRatios {
    pub hft: f64,
    pub regular: f64,
    pub casual: f64,
}

impl CategoryRatios {
    pub fn sum(&self) -> f64 { self.hft + self.regular + self.casual }

    /// Single-draw three-way choice: `r` is a uniform value in [0,1).
    pub fn category_for(&self, r: f64) -> TraderCategory {
        if r < self.hft {
            TraderCategory::Hft
        } else if r < self.hft + self.regular {
            TraderCategory::Regular
        } else {
            TraderCategory::Casual
        }
    }
}

impl Default for CategoryRatios {
    fn default() -> Self { Self { hft: 0.20, regular: 0.70, casual: 0.10 } }
}

/// Which fallback tier produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    /// The weighted bucket had at least one profile.
    Category(TraderCategory),
    /// Bucket was empty, picked uniformly over the whole catalog.
    Catalog,
}

#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub profile: &'a TraderProfile,
    pub tier: SelectionTier,
}

/// Uniform pick among profiles of one category.
pub fn pick_in_category<'a, R: Rng + ?Sized>(
    rng: &mut R,
    catalog: &'a [TraderProfile],
    category: TraderCategory,
) -> Option<&'a TraderProfile> {
    let bucket: Vec<&TraderProfile> = catalog.iter().filter(|p| p.category == category).collect();
    pick_uniform(rng, &bucket)
}

/// Uniform pick over the entire catalog.
pub fn pick_any<'a, R: Rng + ?Sized>(rng: &mut R, catalog: &'a [TraderProfile]) -> Option<&'a TraderProfile> {
    if catalog.is_empty() {
        return None;
    }
    Some(&catalog[rng.gen_range(0..catalog.len())])
}

/// Weighted profile selection for normal trades.
///
/// Draws one uniform value, maps it to HFT / Regular / Casual through `ratios`,
/// then picks uniformly inside that bucket. An empty bucket degrades to a
/// catalog-wide pick. `None` only when the catalog itself is empty.
pub fn select_profile<'a, R: Rng + ?Sized>(
    rng: &mut R,
    catalog: &'a [TraderProfile],
    ratios: &CategoryRatios,
) -> Option<Selection<'a>> {
    let category = ratios.category_for(rng.gen::<f64>());
    if let Some(profile) = pick_in_category(rng, catalog, category) {
        return Some(Selection { profile, tier: SelectionTier::Category(category) });
    }
    pick_any(rng, catalog).map(|profile| Selection { profile, tier: SelectionTier::Catalog })
}

/// Fraud-type filter from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FraudFilter {
    #[default]
    All,
    Wash,
    Velocity,
    Anomaly,
}

impl FraudFilter {
    pub fn matches(&self, pattern: FraudPattern) -> bool {
        match self {
            FraudFilter::All => pattern != FraudPattern::None,
            FraudFilter::Wash => pattern == FraudPattern::Wash,
            FraudFilter::Velocity => pattern == FraudPattern::Velocity,
            FraudFilter::Anomaly => pattern == FraudPattern::Anomaly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudFilter::All => "ALL",
            FraudFilter::Wash => "WASH",
            FraudFilter::Velocity => "VELOCITY",
            FraudFilter::Anomaly => "ANOMALY",
        }
    }
}

impl fmt::Display for FraudFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for FraudFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(FraudFilter::All),
            "WASH" => Ok(FraudFilter::Wash),
            "VELOCITY" => Ok(FraudFilter::Velocity),
            "ANOMALY" => Ok(FraudFilter::Anomaly),
            other => Err(format!("unknown fraud type {other:?} (expected ALL, WASH, VELOCITY or ANOMALY)")),
        }
    }
}

/// Uniform pick among Fraud-category profiles whose pattern passes `filter`.
/// `None` when nothing matches; the caller falls back to a normal trade.
pub fn select_fraud_profile<'a, R: Rng + ?Sized>(
    rng: &mut R,
    catalog: &'a [TraderProfile],
    filter: FraudFilter,
) -> Option<&'a TraderProfile> {
    let candidates: Vec<&TraderProfile> = catalog
        .iter()
        .filter(|p| p.category == TraderCategory::Fraud && filter.matches(p.fraud_pattern))
        .collect();
    pick_uniform(rng, &candidates)
}

fn pick_uniform<'a, R: Rng + ?Sized>(rng: &mut R, bucket: &[&'a TraderProfile]) -> Option<&'a TraderProfile> {
    if bucket.is_empty() {
        return None;
    }
    Some(bucket[rng.gen_range(0..bucket.len())])
}
