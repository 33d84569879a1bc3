//! Prediction market read-outs: implied probabilities, overround and a
//! coarse sentiment label per market.

use crate::adapters::polymarket::GammaMarket;
use serde::{Deserialize, Serialize};

/// Binary books priced this far below 1.0 leave room after fees
pub const ARBITRAGE_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

fn grade(value: f64, a: f64, b: f64, c: f64) -> Grade {
    if value >= a {
        Grade::A
    } else if value >= b {
        Grade::B
    } else if value >= c {
        Grade::C
    } else {
        Grade::D
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    StrongYes,
    LeanYes,
    Uncertain,
    LeanNo,
    StrongNo,
    /// More than two outcomes
    Multi,
}

impl Sentiment {
    fn from_yes_probability(p: f64) -> Self {
        if p >= 0.75 {
            Sentiment::StrongYes
        } else if p >= 0.55 {
            Sentiment::LeanYes
        } else if p > 0.45 {
            Sentiment::Uncertain
        } else if p > 0.25 {
            Sentiment::LeanNo
        } else {
            Sentiment::StrongNo
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeProbability {
    pub outcome: String,
    pub price: f64,
    pub implied_probability: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInsight {
    pub market_id: String,
    pub question: String,
    pub outcomes: Vec<OutcomeProbability>,
    /// Sum of outcome prices minus one
    pub overround: f64,
    pub arbitrage: bool,
    pub liquidity_grade: Grade,
    pub volume_grade: Grade,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    pub markets: Vec<MarketInsight>,
    pub arbitrage_count: usize,
    pub average_overround: f64,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// `None` when the market carries no usable prices
pub fn analyze_market(market: &GammaMarket) -> Option<MarketInsight> {
    let prices = market.prices();
    let total: f64 = prices.iter().sum();
    if prices.is_empty() || total <= 0.0 {
        return None;
    }

    let names = market.outcome_names();
    let outcomes: Vec<OutcomeProbability> = prices
        .iter()
        .enumerate()
        .map(|(i, &price)| OutcomeProbability {
            outcome: names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Outcome {}", i + 1)),
            price,
            implied_probability: round4(price / total),
        })
        .collect();

    let overround = total - 1.0;
    let binary = outcomes.len() == 2;
    let sentiment = if binary {
        Sentiment::from_yes_probability(outcomes[0].implied_probability)
    } else {
        Sentiment::Multi
    };

    Some(MarketInsight {
        market_id: market.id.clone(),
        question: market.question.clone(),
        outcomes,
        overround: round4(overround),
        arbitrage: binary && overround < -ARBITRAGE_THRESHOLD,
        liquidity_grade: grade(market.liquidity_num.unwrap_or(0.0), 100_000.0, 25_000.0, 5_000.0),
        volume_grade: grade(market.volume_24hr.unwrap_or(0.0), 100_000.0, 10_000.0, 1_000.0),
        sentiment,
    })
}

pub fn summarize_markets(markets: &[GammaMarket]) -> PredictionSummary {
    let insights: Vec<MarketInsight> = markets.iter().filter_map(analyze_market).collect();
    let arbitrage_count = insights.iter().filter(|m| m.arbitrage).count();
    let average_overround = if insights.is_empty() {
        0.0
    } else {
        round4(insights.iter().map(|m| m.overround).sum::<f64>() / insights.len() as f64)
    };

    PredictionSummary {
        markets: insights,
        arbitrage_count,
        average_overround,
    }
}
