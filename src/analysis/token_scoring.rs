//! Heuristic safety and trending scores for DEX pairs

use crate::adapters::dexscreener::DexPair;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            75..=u8::MAX => RiskLevel::Low,
            50..=74 => RiskLevel::Medium,
            25..=49 => RiskLevel::High,
            _ => RiskLevel::Extreme,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyReport {
    pub token_address: String,
    pub symbol: String,
    pub score: u8,
    pub risk_level: RiskLevel,
    pub flags: Vec<String>,
    pub liquidity_usd: f64,
    pub age_hours: Option<f64>,
    pub buy_ratio_24h: f64,
    pub fdv_to_liquidity: Option<f64>,
    pub volume_to_liquidity: Option<f64>,
}

/// Start from 100 and deduct for each risk signal
pub fn safety_score(pair: &DexPair, now_ms: i64) -> SafetyReport {
    let mut score: i32 = 100;
    let mut flags = Vec::new();
    let mut flag = |penalty: i32, name: &str| {
        score -= penalty;
        flags.push(name.to_string());
    };

    let liquidity = pair.liquidity_usd();
    if liquidity < 1_000.0 {
        flag(40, "very_low_liquidity");
    } else if liquidity < 10_000.0 {
        flag(25, "low_liquidity");
    } else if liquidity < 50_000.0 {
        flag(10, "moderate_liquidity");
    }

    let age_hours = pair.age_hours(now_ms);
    match age_hours {
        None => flag(10, "unknown_age"),
        Some(h) if h < 1.0 => flag(25, "new_pair"),
        Some(h) if h < 24.0 => flag(15, "young_pair"),
        Some(h) if h < 72.0 => flag(5, "recent_pair"),
        Some(_) => {}
    }

    let txns = pair.txns.h24;
    let buy_ratio = txns.buy_ratio();
    if txns.total() < 10 {
        flag(10, "low_activity");
    } else if txns.total() > 20 && !(0.15..=0.85).contains(&buy_ratio) {
        flag(15, "one_sided_trading");
    }

    let fdv_to_liquidity = match (pair.fdv, liquidity > 0.0) {
        (Some(fdv), true) => Some(fdv / liquidity),
        _ => None,
    };
    match fdv_to_liquidity {
        Some(r) if r > 100.0 => flag(15, "thin_liquidity_vs_fdv"),
        Some(r) if r > 50.0 => flag(8, "high_fdv_ratio"),
        _ => {}
    }

    let volume_to_liquidity = (liquidity > 0.0).then(|| pair.volume.h24 / liquidity);
    match volume_to_liquidity {
        Some(r) if r > 10.0 => flag(15, "possible_wash_trading"),
        Some(r) if r > 5.0 => flag(5, "high_turnover"),
        _ => {}
    }

    let change = pair.price_change.h24;
    if change < -50.0 {
        flag(10, "price_crash");
    } else if change > 500.0 {
        flag(5, "parabolic_move");
    }

    let score = score.clamp(0, 100) as u8;
    SafetyReport {
        token_address: pair.base_token.address.clone(),
        symbol: pair.base_token.symbol.clone(),
        score,
        risk_level: RiskLevel::from_score(score),
        flags,
        liquidity_usd: liquidity,
        age_hours,
        buy_ratio_24h: buy_ratio,
        fdv_to_liquidity,
        volume_to_liquidity,
    }
}

/// Current hour's volume relative to the 6h hourly average (1.0 when unknown)
pub fn volume_acceleration(pair: &DexPair) -> f64 {
    let hourly_avg = pair.volume.h6 / 6.0;
    if hourly_avg <= 0.0 {
        return if pair.volume.h1 > 0.0 { 3.0 } else { 1.0 };
    }
    pair.volume.h1 / hourly_avg
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingScore {
    pub token_address: String,
    pub symbol: String,
    pub score: f64,
    pub volume_acceleration: f64,
    pub price_change_1h: f64,
    pub txns_1h: u64,
    pub boost_amount: f64,
}

/// 0-100: volume acceleration 35, 1h price change 25, 1h activity 25, boosts 15
pub fn trending_score(pair: &DexPair, boost_amount: f64) -> TrendingScore {
    let accel = volume_acceleration(pair);
    let volume_part = (accel / 3.0).clamp(0.0, 1.0) * 35.0;
    let change_part = (pair.price_change.h1 / 20.0).clamp(0.0, 1.0) * 25.0;
    let txns = pair.txns.h1.total();
    let activity_part = (txns as f64 / 500.0).min(1.0) * 25.0;
    let boost_part = (boost_amount / 500.0).clamp(0.0, 1.0) * 15.0;

    let score = volume_part + change_part + activity_part + boost_part;
    TrendingScore {
        token_address: pair.base_token.address.clone(),
        symbol: pair.base_token.symbol.clone(),
        score: (score * 100.0).round() / 100.0,
        volume_acceleration: accel,
        price_change_1h: pair.price_change.h1,
        txns_1h: txns,
        boost_amount,
    }
}
