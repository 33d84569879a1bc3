//! Agent manifest
//!
//! The static catalogue of paid agent endpoints. Each entry names the HTTP
//! resource it is served at and its base price; the x402 gate resolves
//! incoming requests against this list.

use crate::payment::{PricingEngine, PricingTier};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_usd: Decimal,
    pub tier: PricingTier,
    pub resource: String,
    pub method: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl AgentDescriptor {
    pub fn is_free(&self) -> bool {
        self.tier == PricingTier::Free || self.price_usd.is_zero()
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn builtin_agents() -> Vec<AgentDescriptor> {
    let descriptor = |id: &str,
                      name: &str,
                      description: &str,
                      price_usd: Decimal,
                      tier: PricingTier,
                      resource: &str,
                      method: &str,
                      input_schema: Value,
                      output_schema: Value| AgentDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        price_usd,
        tier,
        resource: resource.to_string(),
        method: method.to_string(),
        input_schema,
        output_schema,
    };

    vec![
        descriptor(
            "token-safety",
            "Token Safety Scanner",
            "Liquidity, age, trading balance and wash-trading checks for a Solana token",
            dec!(0.01),
            PricingTier::Basic,
            "/api/agents/token-safety",
            "POST",
            object_schema(json!({ "address": { "type": "string" } }), &["address"]),
            object_schema(
                json!({
                    "score": { "type": "number" },
                    "riskLevel": { "type": "string" },
                    "flags": { "type": "array", "items": { "type": "string" } }
                }),
                &["score", "riskLevel"],
            ),
        ),
        descriptor(
            "trending-radar",
            "Trending Radar",
            "Boosted Solana tokens ranked by volume acceleration and momentum",
            dec!(0.005),
            PricingTier::Basic,
            "/api/agents/trending",
            "GET",
            object_schema(json!({ "limit": { "type": "integer" } }), &[]),
            object_schema(json!({ "tokens": { "type": "array" } }), &["tokens"]),
        ),
        descriptor(
            "smart-entry",
            "Smart Entry",
            "Entry signal, entry zone, stop-loss and take-profit levels for a token",
            dec!(0.02),
            PricingTier::Premium,
            "/api/agents/smart-entry",
            "POST",
            object_schema(json!({ "address": { "type": "string" } }), &["address"]),
            object_schema(
                json!({
                    "signal": { "type": "string" },
                    "confidence": { "type": "number" },
                    "entryZone": { "type": "object" }
                }),
                &["signal", "confidence"],
            ),
        ),
        descriptor(
            "portfolio-analyzer",
            "Portfolio Analyzer",
            "Allocation, concentration and risk rating for a set of token holdings",
            dec!(0.03),
            PricingTier::Premium,
            "/api/agents/portfolio",
            "POST",
            object_schema(json!({ "holdings": { "type": "array" } }), &["holdings"]),
            object_schema(
                json!({
                    "totalValue": { "type": "number" },
                    "diversificationScore": { "type": "number" },
                    "riskRating": { "type": "string" }
                }),
                &["totalValue"],
            ),
        ),
        descriptor(
            "polymarket-insights",
            "Polymarket Insights",
            "Implied probabilities, overround and sentiment across active prediction markets",
            dec!(0.01),
            PricingTier::Basic,
            "/api/agents/polymarket",
            "GET",
            object_schema(json!({ "limit": { "type": "integer" } }), &[]),
            object_schema(json!({ "markets": { "type": "array" } }), &["markets"]),
        ),
        descriptor(
            "whale-tracker",
            "Whale Tracker",
            "Large recorded trades for a token with net flow and buy/sell split",
            dec!(0.05),
            PricingTier::Enterprise,
            "/api/agents/whale-activity",
            "POST",
            object_schema(
                json!({
                    "address": { "type": "string" },
                    "minUsd": { "type": "number" }
                }),
                &["address"],
            ),
            object_schema(json!({ "trades": { "type": "array" } }), &["trades"]),
        ),
        descriptor(
            "network-status",
            "Network Status",
            "Solana congestion level, priority fee estimate and send-or-wait advice",
            Decimal::ZERO,
            PricingTier::Free,
            "/api/agents/network-status",
            "GET",
            object_schema(json!({ "urgency": { "type": "string" } }), &[]),
            object_schema(
                json!({
                    "congestion": { "type": "string" },
                    "fees": { "type": "object" }
                }),
                &["congestion"],
            ),
        ),
    ]
}

pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentDescriptor>) -> Self {
        Self { agents }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_agents())
    }

    pub fn all(&self) -> &[AgentDescriptor] {
        &self.agents
    }

    pub fn get(&self, id: &str) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Match a request path against agent resources (trailing slash ignored)
    pub fn find_by_resource(&self, path: &str) -> Option<&AgentDescriptor> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        self.agents.iter().find(|a| a.resource == path)
    }

    /// Seed the pricing engine with every agent's base price and tier
    pub async fn register_pricing(&self, pricing: &PricingEngine) {
        for agent in &self.agents {
            pricing
                .register_agent(&agent.id, agent.price_usd, agent.tier)
                .await;
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_manifest() {
        let registry = AgentRegistry::builtin();
        assert_eq!(registry.all().len(), 7);

        let whale = registry.get("whale-tracker").unwrap();
        assert_eq!(whale.price_usd, dec!(0.05));
        assert_eq!(whale.tier, PricingTier::Enterprise);
        assert_eq!(whale.method, "POST");

        assert!(registry.get("network-status").unwrap().is_free());
        assert!(!registry.get("token-safety").unwrap().is_free());
    }

    #[test]
    fn test_resources_are_unique() {
        let registry = AgentRegistry::builtin();
        let mut resources: Vec<_> = registry.all().iter().map(|a| &a.resource).collect();
        resources.sort();
        resources.dedup();
        assert_eq!(resources.len(), registry.all().len());
    }

    #[test]
    fn test_find_by_resource() {
        let registry = AgentRegistry::builtin();
        assert_eq!(
            registry.find_by_resource("/api/agents/trending/").unwrap().id,
            "trending-radar"
        );
        assert!(registry.find_by_resource("/api/agents").is_none());
    }

    #[tokio::test]
    async fn test_register_pricing() {
        let registry = AgentRegistry::builtin();
        let pricing = PricingEngine::with_defaults();
        registry.register_pricing(&pricing).await;

        assert_eq!(pricing.all_pricing().await.len(), 7);
        let quote = pricing
            .calculate_price("network-status", None, 5)
            .await
            .unwrap();
        assert!(quote.is_free());
    }

    #[test]
    fn test_manifest_serializes_camel_case() {
        let registry = AgentRegistry::builtin();
        let v = serde_json::to_value(registry.get("smart-entry").unwrap()).unwrap();
        assert_eq!(v["priceUsd"], "0.02");
        assert_eq!(v["inputSchema"]["required"][0], "address");
    }
}
