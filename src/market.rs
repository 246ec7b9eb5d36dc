// ===============================
// src/market.rs
// ===============================
//
// Amount / price synthesis for a single trade.
//
// Notes:
// - Prices are plain f64 currency units (no tick scaling, unlike the MD feed).
// - Every sampler takes the RNG explicitly; seed it for reproducible runs.
// - Jangan simpan ThreadRng melewati .await: engine memegang StdRng sendiri.
//
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use rand_distr::StandardNormal;
use uuid::Uuid;

use crate::domain::{Side, Trade, TraderProfile};
use crate::profiles::{BLUE_CHIP_SYMBOLS, ETF_SYMBOLS, POPULAR_SYMBOLS};

pub const DEFAULT_SYMBOL: &str = "AAPL";
pub const DEFAULT_PRICE: f64 = 100.0;

/// Share of draws taken from the profile's own symbol list.
const TYPICAL_SYMBOL_PROB: f64 = 0.8;
const MIN_SIZE_FACTOR: f64 = 0.1;
const MAX_SIZE_FACTOR: f64 = 3.0;
/// Full width of the uniform price jitter (+/-1%).
const PRICE_JITTER: f64 = 0.02;

static BASE_PRICES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from_iter([
        // Blue chips
        ("AAPL", 175.50),
        ("MSFT", 378.25),
        ("GOOGL", 140.75),
        ("AMZN", 155.35),
        ("META", 362.80),
        ("NVDA", 495.20),
        ("TSLA", 242.80),
        // Popular
        ("AMD", 142.30),
        ("NFLX", 485.60),
        ("DIS", 95.40),
        // ETFs
        ("SPY", 475.20),
        ("QQQ", 405.80),
        ("VTI", 245.30),
        ("IWM", 198.50),
        ("DIA", 382.40),
        // Penny stocks
        ("PENNY_A", 2.50),
        ("PENNY_B", 1.80),
        ("PENNY_C", 3.20),
        ("MICRO_X", 0.85),
        ("MICRO_Y", 1.25),
    ])
});

/// Union of the blue-chip, popular and ETF universes (duplicates kept, as listed).
static EXPLORATION_SYMBOLS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    BLUE_CHIP_SYMBOLS
        .iter()
        .chain(POPULAR_SYMBOLS)
        .chain(ETF_SYMBOLS)
        .copied()
        .collect()
});

/// Static reference price; unknown symbols trade around 100.0.
pub fn base_price(symbol: &str) -> f64 {
    BASE_PRICES.get(symbol).copied().unwrap_or(DEFAULT_PRICE)
}

/// 80% typical symbol, 20% exploration of the wider universe.
pub fn random_symbol<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile) -> &'static str {
    if profile.typical_symbols.is_empty() {
        return DEFAULT_SYMBOL;
    }
    if rng.gen::<f64>() < TYPICAL_SYMBOL_PROB {
        return profile.typical_symbols[rng.gen_range(0..profile.typical_symbols.len())];
    }
    EXPLORATION_SYMBOLS[rng.gen_range(0..EXPLORATION_SYMBOLS.len())]
}

/// Normal(mean, mean*volatility), clamped to [0.1*mean, 3.0*mean].
pub fn synthetic_amount<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile) -> f64 {
    let mean = profile.avg_trade_size;
    let std_dev = mean * profile.volatility;
    let z: f64 = rng.sample(StandardNormal);
    let amount = mean + z * std_dev;
    // clamp() panics on inverted bounds (mean < 0)
    amount.max(mean * MIN_SIZE_FACTOR).min(mean * MAX_SIZE_FACTOR)
}

/// Multiplier in [1 - width/2, 1 + width/2).
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, width: f64) -> f64 {
    1.0 + (rng.gen::<f64>() - 0.5) * width
}

/// Base price with +/-1% uniform jitter.
pub fn price_for<R: Rng + ?Sized>(rng: &mut R, symbol: &str) -> f64 {
    base_price(symbol) * jitter(rng, PRICE_JITTER)
}

pub fn random_side<R: Rng + ?Sized>(rng: &mut R) -> Side {
    if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell }
}

/// UUID v4 drawn from the supplied RNG, so seeded runs repeat their ids.
pub fn trade_id<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

/// Assembles a record; every synthesis path goes through here.
pub fn make_trade<R: Rng + ?Sized>(
    rng: &mut R,
    profile: &TraderProfile,
    symbol: &str,
    amount: f64,
    price: f64,
    side: Side,
    timestamp: DateTime<Utc>,
) -> Trade {
    Trade {
        id: trade_id(rng),
        user_id: profile.user_id.to_string(),
        symbol: symbol.to_string(),
        amount,
        price,
        side,
        timestamp,
    }
}

/// One ordinary trade for `profile` at `timestamp`.
pub fn synthesize_trade<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile, timestamp: DateTime<Utc>) -> Trade {
    let symbol = random_symbol(rng, profile);
    let amount = synthetic_amount(rng, profile);
    let price = price_for(rng, symbol);
    let side = random_side(rng);
    make_trade(rng, profile, symbol, amount, price, side, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FraudPattern, TraderCategory};
    use crate::profiles::all_profiles;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn amounts_stay_inside_clamp_for_every_profile() {
        let mut rng = StdRng::seed_from_u64(42);
        for p in all_profiles() {
            for _ in 0..10_000 {
                let a = synthetic_amount(&mut rng, p);
                assert!(a >= 0.1 * p.avg_trade_size && a <= 3.0 * p.avg_trade_size, "{} -> {a}", p.user_id);
            }
        }
    }

    #[test]
    fn high_volatility_hits_both_clamp_edges() {
        let wild = TraderProfile {
            user_id: "WILD",
            category: TraderCategory::Regular,
            typical_symbols: &["AAPL"],
            avg_trade_size: 1_000.0,
            volatility: 1.0,
            active_hours: &[10],
            trades_per_hour: 1,
            fraud_pattern: FraudPattern::None,
        };
        let mut rng = StdRng::seed_from_u64(9);
        let draws: Vec<f64> = (0..10_000).map(|_| synthetic_amount(&mut rng, &wild)).collect();
        assert!(draws.iter().any(|a| *a == 1_000.0 * 0.1));
        assert!(draws.iter().any(|a| *a == 1_000.0 * 3.0));
    }

    #[test]
    fn price_jitter_is_within_one_percent() {
        let mut rng = StdRng::seed_from_u64(5);
        for sym in ["AAPL", "MICRO_X", "SPY", "NOT_LISTED"] {
            let base = base_price(sym);
            for _ in 0..1_000 {
                let px = price_for(&mut rng, sym);
                assert!(px > 0.0);
                assert!((px / base - 1.0).abs() <= 0.01 + 1e-12, "{sym} {px}");
            }
        }
        assert_eq!(base_price("NOT_LISTED"), 100.0);
    }

    #[test]
    fn empty_symbol_list_uses_default_symbol() {
        let mut p = all_profiles()[0].clone();
        p.typical_symbols = &[];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(random_symbol(&mut rng, &p), DEFAULT_SYMBOL);
    }

    #[test]
    fn symbols_mostly_come_from_typical_list() {
        let casual = all_profiles().iter().find(|p| p.user_id == "CASUAL_001").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let typical = (0..n)
            .filter(|_| casual.typical_symbols.contains(&random_symbol(&mut rng, casual)))
            .count();
        // 80% direct + exploration draws that happen to land on SPY/QQQ
        let share = typical as f64 / n as f64;
        assert!(share > 0.80 && share < 0.90, "share {share}");
    }

    #[test]
    fn sides_are_roughly_balanced() {
        let mut rng = StdRng::seed_from_u64(2);
        let buys = (0..10_000).filter(|_| random_side(&mut rng) == Side::Buy).count();
        assert!((4_700..5_300).contains(&buys), "buys {buys}");
    }

    #[test]
    fn seeded_trades_repeat() {
        let p = &all_profiles()[3];
        let ts = Utc::now();
        let a = synthesize_trade(&mut StdRng::seed_from_u64(77), p, ts);
        let b = synthesize_trade(&mut StdRng::seed_from_u64(77), p, ts);
        assert_eq!(a, b);
        assert_eq!(a.id.get_version_num(), 4);
    }

    proptest! {
        #[test]
        fn synthesized_trades_are_positive(seed in any::<u64>(), idx in 0usize..14) {
            let profile = &all_profiles()[idx];
            let mut rng = StdRng::seed_from_u64(seed);
            let t = synthesize_trade(&mut rng, profile, Utc::now());
            prop_assert!(t.amount > 0.0);
            prop_assert!(t.price > 0.0);
            prop_assert_eq!(t.user_id.as_str(), profile.user_id);
        }
    }
}
