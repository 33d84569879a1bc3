//! Portfolio breakdown: totals, PnL, allocation and concentration risk

use serde::{Deserialize, Serialize};

const STABLECOINS: &[&str] = &["USDC", "USDT", "PYUSD", "USDS"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub token_address: String,
    pub symbol: String,
    pub amount: f64,
    pub price_usd: f64,
    /// Total cost paid for `amount`, if known
    #[serde(default)]
    pub cost_basis_usd: Option<f64>,
}

impl Holding {
    pub fn value(&self) -> f64 {
        self.amount * self.price_usd
    }

    pub fn is_stablecoin(&self) -> bool {
        STABLECOINS.contains(&self.symbol.to_uppercase().as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRating {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub symbol: String,
    pub token_address: String,
    pub value_usd: f64,
    pub percent: f64,
    pub unrealized_pnl: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioReport {
    pub total_value: f64,
    pub total_cost: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
    pub allocations: Vec<Allocation>,
    /// Herfindahl index of the weights, 0-1
    pub concentration: f64,
    /// 0-100, higher is more diversified
    pub diversification_score: f64,
    pub risk_rating: RiskRating,
    pub suggestions: Vec<String>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn analyze_portfolio(holdings: &[Holding]) -> PortfolioReport {
    let total_value: f64 = holdings.iter().map(Holding::value).sum();

    let (total_cost, costed_value) = holdings
        .iter()
        .filter_map(|h| h.cost_basis_usd.map(|c| (c, h.value())))
        .fold((0.0, 0.0), |(cost, value), (c, v)| (cost + c, value + v));
    let unrealized_pnl = costed_value - total_cost;
    let unrealized_pnl_percent = if total_cost > 0.0 {
        unrealized_pnl / total_cost * 100.0
    } else {
        0.0
    };

    let mut allocations: Vec<Allocation> = holdings
        .iter()
        .map(|h| Allocation {
            symbol: h.symbol.clone(),
            token_address: h.token_address.clone(),
            value_usd: round2(h.value()),
            percent: if total_value > 0.0 {
                round2(h.value() / total_value * 100.0)
            } else {
                0.0
            },
            unrealized_pnl: h.cost_basis_usd.map(|c| round2(h.value() - c)),
        })
        .collect();
    allocations.sort_by(|a, b| b.value_usd.total_cmp(&a.value_usd));

    let weights: Vec<f64> = if total_value > 0.0 {
        holdings.iter().map(|h| h.value() / total_value).collect()
    } else {
        Vec::new()
    };
    let concentration = if weights.is_empty() {
        1.0
    } else {
        weights.iter().map(|w| w * w).sum::<f64>()
    };
    let max_weight = weights.iter().cloned().fold(0.0, f64::max);

    let risk_rating = if max_weight > 0.5 || concentration > 0.5 {
        RiskRating::High
    } else if max_weight > 0.3 || concentration > 0.25 {
        RiskRating::Medium
    } else {
        RiskRating::Low
    };

    let mut suggestions = Vec::new();
    if let Some(top) = allocations.first() {
        if top.percent > 40.0 {
            suggestions.push(format!(
                "{} is {:.1}% of the portfolio; consider trimming it",
                top.symbol, top.percent
            ));
        }
    }
    if holdings.len() < 3 {
        suggestions.push("Hold at least three positions to spread token-specific risk".to_string());
    }
    for h in holdings {
        if let Some(cost) = h.cost_basis_usd.filter(|c| *c > 0.0) {
            if (h.value() - cost) / cost < -0.3 {
                suggestions.push(format!("{} is down more than 30%; review the position", h.symbol));
            }
        }
    }
    let stable_value: f64 = holdings
        .iter()
        .filter(|h| h.is_stablecoin())
        .map(Holding::value)
        .sum();
    if total_value > 0.0 && stable_value / total_value < 0.05 {
        suggestions.push("Keep a small stablecoin reserve for entries and fees".to_string());
    }

    PortfolioReport {
        total_value: round2(total_value),
        total_cost: round2(total_cost),
        unrealized_pnl: round2(unrealized_pnl),
        unrealized_pnl_percent: round2(unrealized_pnl_percent),
        allocations,
        concentration: (concentration * 10_000.0).round() / 10_000.0,
        diversification_score: round2((1.0 - concentration) * 100.0),
        risk_rating,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, amount: f64, price: f64, cost: Option<f64>) -> Holding {
        Holding {
            token_address: format!("{}-mint", symbol),
            symbol: symbol.to_string(),
            amount,
            price_usd: price,
            cost_basis_usd: cost,
        }
    }

    #[test]
    fn test_concentrated_portfolio() {
        let report = analyze_portfolio(&[
            holding("BONK", 1_000_000.0, 0.00002, Some(40.0)),
            holding("SOL", 10.0, 150.0, Some(1000.0)),
        ]);

        assert_eq!(report.total_value, 1520.0);
        assert_eq!(report.total_cost, 1040.0);
        assert_eq!(report.unrealized_pnl, 480.0);
        assert_eq!(report.allocations[0].symbol, "SOL");
        assert_eq!(report.risk_rating, RiskRating::High);
        assert!(report.suggestions.iter().any(|s| s.contains("SOL")));
        assert!(report.suggestions.iter().any(|s| s.contains("BONK is down")));
    }

    #[test]
    fn test_balanced_portfolio() {
        let holdings: Vec<Holding> = ["SOL", "JUP", "USDC", "RAY", "WIF"]
            .iter()
            .map(|s| holding(s, 100.0, 1.0, None))
            .collect();
        let report = analyze_portfolio(&holdings);

        assert_eq!(report.concentration, 0.2);
        assert_eq!(report.diversification_score, 80.0);
        assert_eq!(report.risk_rating, RiskRating::Low);
        assert!(report.suggestions.is_empty());
        assert_eq!(report.unrealized_pnl_percent, 0.0);
    }

    #[test]
    fn test_empty_portfolio() {
        let report = analyze_portfolio(&[]);
        assert_eq!(report.total_value, 0.0);
        assert_eq!(report.diversification_score, 0.0);
        assert!(report.allocations.is_empty());
    }
}
