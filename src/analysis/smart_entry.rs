//! Entry timing signal from short-horizon momentum, order flow and liquidity

use super::token_scoring::volume_acceleration;
use crate::adapters::dexscreener::DexPair;
use serde::{Deserialize, Serialize};

/// Below this liquidity a position cannot be exited cleanly
pub const MIN_ENTRY_LIQUIDITY_USD: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySignal {
    StrongBuy,
    Buy,
    Hold,
    Avoid,
}

impl EntrySignal {
    fn take_profit_pct(&self) -> f64 {
        match self {
            EntrySignal::StrongBuy => 0.25,
            EntrySignal::Buy => 0.15,
            EntrySignal::Hold | EntrySignal::Avoid => 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriceZone {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAnalysis {
    pub token_address: String,
    pub symbol: String,
    pub price_usd: f64,
    pub signal: EntrySignal,
    /// Composite score in [-100, 100]
    pub score: f64,
    /// 0-1
    pub confidence: f64,
    pub momentum: f64,
    pub buy_pressure: f64,
    pub volume_acceleration: f64,
    pub entry_zone: PriceZone,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub reasons: Vec<String>,
}

fn round(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

pub fn analyze_entry(pair: &DexPair) -> EntryAnalysis {
    let price = pair.price_usd();
    let liquidity = pair.liquidity_usd();
    let change = pair.price_change;

    let momentum = 0.5 * change.m5 + 0.3 * change.h1 + 0.2 * change.h6;
    let buy_pressure = pair.txns.h1.buy_ratio();
    let accel = volume_acceleration(pair);

    let mut reasons = Vec::new();
    let momentum_part = (momentum / 10.0).clamp(-1.0, 1.0) * 40.0;
    let pressure_part = (buy_pressure - 0.5) * 2.0 * 30.0;
    let accel_part = (accel - 1.0).clamp(-1.0, 1.0) * 20.0;
    let liquidity_part = if liquidity >= 100_000.0 {
        10.0
    } else if liquidity >= 50_000.0 {
        5.0
    } else {
        0.0
    };
    let score = (momentum_part + pressure_part + accel_part + liquidity_part).clamp(-100.0, 100.0);

    if momentum > 5.0 {
        reasons.push(format!("positive momentum ({:.1}%)", momentum));
    } else if momentum < -5.0 {
        reasons.push(format!("negative momentum ({:.1}%)", momentum));
    }
    if buy_pressure >= 0.6 {
        reasons.push(format!("buyers dominate ({:.0}% of 1h trades)", buy_pressure * 100.0));
    } else if buy_pressure <= 0.4 {
        reasons.push(format!("sellers dominate ({:.0}% buys in 1h)", buy_pressure * 100.0));
    }
    if accel >= 1.5 {
        reasons.push(format!("volume accelerating ({:.1}x hourly average)", accel));
    }

    let signal = if liquidity < MIN_ENTRY_LIQUIDITY_USD || price <= 0.0 {
        reasons.push("liquidity too thin to enter".to_string());
        EntrySignal::Avoid
    } else if score >= 50.0 {
        EntrySignal::StrongBuy
    } else if score >= 20.0 {
        EntrySignal::Buy
    } else if score >= -20.0 {
        EntrySignal::Hold
    } else {
        EntrySignal::Avoid
    };

    let liquidity_confidence = (liquidity / 250_000.0).min(1.0);
    let confidence = (score.abs() / 100.0 * 0.7 + liquidity_confidence * 0.3).clamp(0.0, 1.0);

    // Wider stops for pairs that already moved hard this hour
    let volatility = (change.h1.abs() / 100.0).min(0.2);
    let entry_zone = PriceZone {
        low: price * (1.0 - 0.03 - volatility / 2.0),
        high: price * 1.01,
    };

    EntryAnalysis {
        token_address: pair.base_token.address.clone(),
        symbol: pair.base_token.symbol.clone(),
        price_usd: price,
        signal,
        score: round(score, 2),
        confidence: round(confidence, 2),
        momentum: round(momentum, 2),
        buy_pressure: round(buy_pressure, 4),
        volume_acceleration: round(accel, 2),
        entry_zone,
        stop_loss: price * (1.0 - 0.08 - volatility),
        take_profit: price * (1.0 + signal.take_profit_pct() + volatility),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::dexscreener::{Liquidity, TxnCount};

    fn pair(liquidity: f64) -> DexPair {
        DexPair {
            price_usd: Some("2.0".to_string()),
            liquidity: Some(Liquidity {
                usd: liquidity,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_strong_buy() {
        let mut p = pair(300_000.0);
        p.price_change.m5 = 4.0;
        p.price_change.h1 = 12.0;
        p.price_change.h6 = 20.0;
        p.txns.h1 = TxnCount {
            buys: 80,
            sells: 20,
        };
        p.volume.h6 = 60_000.0;
        p.volume.h1 = 25_000.0;

        let a = analyze_entry(&p);
        assert_eq!(a.signal, EntrySignal::StrongBuy);
        assert!(a.confidence > 0.8);
        assert!(a.stop_loss < a.price_usd && a.take_profit > a.price_usd);
        assert!(a.entry_zone.low < a.entry_zone.high);
    }

    #[test]
    fn test_thin_liquidity_is_avoided() {
        let mut p = pair(5_000.0);
        p.price_change.h1 = 50.0;
        p.txns.h1 = TxnCount {
            buys: 100,
            sells: 0,
        };
        let a = analyze_entry(&p);
        assert_eq!(a.signal, EntrySignal::Avoid);
        assert!(a.reasons.iter().any(|r| r.contains("liquidity")));
    }

    #[test]
    fn test_flat_market_holds() {
        let a = analyze_entry(&pair(80_000.0));
        // 0 momentum, neutral flow, no acceleration, +5 liquidity
        assert_eq!(a.score, 5.0);
        assert_eq!(a.signal, EntrySignal::Hold);
        assert!((a.stop_loss - 1.84).abs() < 1e-9);
        assert!((a.take_profit - 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_selling_pressure_avoids() {
        let mut p = pair(200_000.0);
        p.price_change.m5 = -6.0;
        p.price_change.h1 = -15.0;
        p.txns.h1 = TxnCount {
            buys: 10,
            sells: 90,
        };
        assert_eq!(analyze_entry(&p).signal, EntrySignal::Avoid);
    }
}
