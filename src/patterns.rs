// ===============================
// src/patterns.rs
// ===============================
//
// Fraud pattern injection. Tiga pola:
// 1) Wash trade      -> inject_wash_trade      (2 trades)
// 2) Velocity spike  -> inject_velocity_spike  (10-20 trades)
// 3) Anomaly         -> inject_anomaly         (1 trade, 4 sub-types)
//
// `inject` dispatches on the profile's assigned pattern. All builders are pure
// over the RNG + base timestamp; nothing here fails.
//
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::domain::{FraudPattern, Side, Trade, TraderProfile};
use crate::market::{self, jitter, make_trade, price_for, random_side, random_symbol, synthetic_amount};
use crate::profiles::PENNY_STOCKS;

/// Full width of the sell-leg price nudge (+/-0.05%).
const WASH_PRICE_JITTER: f64 = 0.001;
/// Full width of per-trade price noise inside a burst (+/-1%).
const VELOCITY_PRICE_JITTER: f64 = 0.02;
/// Full width of the price anomaly (+/-25%).
const ANOMALY_PRICE_SWING: f64 = 0.5;
const ANOMALY_SIZE_MULTIPLIER: f64 = 10.0;

/// Output of one injection: the trades plus, for anomalies, which sub-type fired.
#[derive(Debug, Clone)]
pub struct Injection {
    pub pattern: FraudPattern,
    pub anomaly: Option<AnomalyKind>,
    pub trades: Vec<Trade>,
}

/// Produce the trades realising `profile.fraud_pattern`; `None` for non-fraud profiles.
pub fn inject<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile, base_time: DateTime<Utc>) -> Option<Injection> {
    let pattern = profile.fraud_pattern;
    let (anomaly, trades) = match pattern {
        FraudPattern::Wash => (None, Vec::from(inject_wash_trade(rng, profile, base_time))),
        FraudPattern::Velocity => (None, inject_velocity_spike(rng, profile, base_time)),
        FraudPattern::Anomaly => {
            let (kind, trade) = inject_anomaly(rng, profile, base_time);
            (Some(kind), vec![trade])
        }
        FraudPattern::None => return None,
    };
    Some(Injection { pattern, anomaly, trades })
}

// -----------------------------------------------------------------------------
// 1) WASH TRADE
//    Buy lalu Sell simbol & ukuran yang sama: volume palsu tanpa posisi bersih.
//    - sell leg priced within +/-0.05% of the buy leg
//    - sell leg stamped 1-4 s after the buy
// -----------------------------------------------------------------------------
pub fn inject_wash_trade<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile, base_time: DateTime<Utc>) -> [Trade; 2] {
    let symbol = random_symbol(rng, profile);
    let amount = synthetic_amount(rng, profile);
    wash_pair(rng, profile, symbol, amount, base_time)
}

/// Buy then sell of `amount` x `symbol`; the sell leg is re-priced within +/-0.05%
/// and lands 1-4 seconds after the buy.
pub fn wash_pair<R: Rng + ?Sized>(
    rng: &mut R,
    profile: &TraderProfile,
    symbol: &str,
    amount: f64,
    base_time: DateTime<Utc>,
) -> [Trade; 2] {
    let price = price_for(rng, symbol);

    let buy = make_trade(rng, profile, symbol, amount, price, Side::Buy, base_time);

    let sell_price = price * jitter(rng, WASH_PRICE_JITTER);
    let delay = Duration::seconds(rng.gen_range(1..=4));
    let sell = make_trade(rng, profile, symbol, amount, sell_price, Side::Sell, base_time + delay);

    [buy, sell]
}

// -----------------------------------------------------------------------------
// 2) VELOCITY SPIKE
//    Burst 10-20 trade pada satu simbol, satu detik sekali.
//    - base price captured once, each trade jittered +/-1% around it
//    - side drawn independently per trade
// -----------------------------------------------------------------------------
pub fn inject_velocity_spike<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile, base_time: DateTime<Utc>) -> Vec<Trade> {
    let n: i64 = rng.gen_range(10..=20);
    let symbol = random_symbol(rng, profile);
    let base_price = price_for(rng, symbol);

    (0..n)
        .map(|i| {
            let amount = synthetic_amount(rng, profile);
            let price = base_price * jitter(rng, VELOCITY_PRICE_JITTER);
            let side = random_side(rng);
            make_trade(rng, profile, symbol, amount, price, side, base_time + Duration::seconds(i))
        })
        .collect()
}

// -----------------------------------------------------------------------------
// 3) ANOMALY
//    Satu trade yang menyimpang dari kebiasaan profil.
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// 10x the profile's average size.
    Size,
    /// Stamped between 02:00 and 05:59 on the base day.
    Timing,
    /// Penny stock outside the profile's usual list, priced 0.50-5.50.
    OffCatalogSymbol,
    /// Market price pushed up to +/-25%.
    Price,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 4] =
        [AnomalyKind::Size, AnomalyKind::Timing, AnomalyKind::OffCatalogSymbol, AnomalyKind::Price];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Size => "size",
            AnomalyKind::Timing => "timing",
            AnomalyKind::OffCatalogSymbol => "off_catalog_symbol",
            AnomalyKind::Price => "price",
        }
    }
}

/// Uniformly picks a sub-type, then builds it.
pub fn inject_anomaly<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile, base_time: DateTime<Utc>) -> (AnomalyKind, Trade) {
    let kind = AnomalyKind::ALL[rng.gen_range(0..AnomalyKind::ALL.len())];
    (kind, build_anomaly(rng, profile, kind, base_time))
}

pub fn build_anomaly<R: Rng + ?Sized>(
    rng: &mut R,
    profile: &TraderProfile,
    kind: AnomalyKind,
    base_time: DateTime<Utc>,
) -> Trade {
    match kind {
        AnomalyKind::Size => {
            let symbol = random_symbol(rng, profile);
            let amount = profile.avg_trade_size * ANOMALY_SIZE_MULTIPLIER;
            let price = price_for(rng, symbol);
            let side = random_side(rng);
            make_trade(rng, profile, symbol, amount, price, side, base_time)
        }
        AnomalyKind::Timing => {
            let symbol = random_symbol(rng, profile);
            let amount = synthetic_amount(rng, profile);
            let price = price_for(rng, symbol);
            let side = random_side(rng);
            let ts = night_time(rng, base_time);
            make_trade(rng, profile, symbol, amount, price, side, ts)
        }
        AnomalyKind::OffCatalogSymbol => {
            let symbol = off_catalog_penny(rng, profile);
            let amount = synthetic_amount(rng, profile);
            let price = rng.gen::<f64>() * 5.0 + 0.5;
            let side = random_side(rng);
            make_trade(rng, profile, symbol, amount, price, side, base_time)
        }
        AnomalyKind::Price => {
            let symbol = random_symbol(rng, profile);
            let amount = synthetic_amount(rng, profile);
            let price = price_for(rng, symbol) * jitter(rng, ANOMALY_PRICE_SWING);
            let side = random_side(rng);
            make_trade(rng, profile, symbol, amount, price, side, base_time)
        }
    }
}

/// Hour in [2,5], minute/second in [0,59], same calendar day (UTC) as `base_time`.
fn night_time<R: Rng + ?Sized>(rng: &mut R, base_time: DateTime<Utc>) -> DateTime<Utc> {
    let hour = rng.gen_range(2..=5);
    let minute = rng.gen_range(0..60);
    let second = rng.gen_range(0..60);
    base_time
        .date_naive()
        .and_hms_opt(hour, minute, second)
        .map(|naive| naive.and_utc())
        .unwrap_or(base_time)
}

/// Penny symbol the profile doesn't usually trade; wash-style profiles that
/// already hold every penny name draw from the whole penny list.
fn off_catalog_penny<R: Rng + ?Sized>(rng: &mut R, profile: &TraderProfile) -> &'static str {
    let outside: Vec<&'static str> = PENNY_STOCKS
        .iter()
        .copied()
        .filter(|s| !profile.typical_symbols.contains(s))
        .collect();
    let pool: &[&'static str] = if outside.is_empty() { PENNY_STOCKS } else { &outside };
    pool.get(rng.gen_range(0..pool.len())).copied().unwrap_or(market::DEFAULT_SYMBOL)
}
