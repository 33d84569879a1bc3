pub mod portfolio;
pub mod prediction;
pub mod smart_entry;
pub mod token_scoring;

pub use portfolio::{analyze_portfolio, Holding, PortfolioReport, RiskRating};
pub use prediction::{analyze_market, summarize_markets, MarketInsight, PredictionSummary};
pub use smart_entry::{analyze_entry, EntryAnalysis, EntrySignal};
pub use token_scoring::{safety_score, trending_score, RiskLevel, SafetyReport, TrendingScore};
