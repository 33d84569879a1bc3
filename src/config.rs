use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub x402: X402Config,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub escrow: EscrowConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval of the background expiry sweep
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            sweep_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct X402Config {
    /// Base URL of the facilitator (`/verify` and `/settle` are appended)
    pub facilitator_url: String,
    /// Recipient wallet for payments
    pub pay_to: String,
    /// Network identifier advertised in the challenge (e.g. "solana", "solana-devnet")
    pub network: String,
    /// SPL token mint of the payment asset (USDC by default)
    pub asset: String,
    /// Decimals of the payment asset
    pub asset_decimals: u32,
    pub scheme: String,
    pub x402_version: u32,
    pub max_timeout_seconds: u64,
    /// Timeout for facilitator HTTP calls
    pub request_timeout_ms: u64,
}

impl Default for X402Config {
    fn default() -> Self {
        Self {
            facilitator_url: "https://facilitator.payai.network".to_string(),
            pay_to: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
            network: "solana".to_string(),
            asset: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            asset_decimals: 6,
            scheme: "exact".to_string(),
            x402_version: 1,
            max_timeout_seconds: 60,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Fixed window length
    pub window_secs: u64,
    pub request_limit: u32,
    pub payment_limit: u32,
    pub execution_limit: u32,
    /// Violations before a bucket is blocked
    pub max_violations: u32,
    /// Block duration once `max_violations` is reached
    pub block_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            request_limit: 60,
            payment_limit: 10,
            execution_limit: 30,
            max_violations: 3,
            block_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Wall-clock length of a demand window
    pub demand_window_secs: u64,
    /// Number of finished windows kept for the rolling average
    pub demand_history: usize,
    pub min_multiplier: Decimal,
    pub max_multiplier: Decimal,
    /// Multiplier factor applied when demand surges (e.g. 1.05)
    pub step_up: Decimal,
    /// Multiplier factor applied when demand lulls (e.g. 0.95)
    pub step_down: Decimal,
    /// Current/average ratio above which demand counts as a surge
    pub surge_ratio: Decimal,
    /// Current/average ratio below which demand counts as a lull
    pub lull_ratio: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;

        Self {
            demand_window_secs: 3600,
            demand_history: 24,
            min_multiplier: dec!(0.5),
            max_multiplier: dec!(3.0),
            step_up: dec!(1.05),
            step_down: dec!(0.95),
            surge_ratio: dec!(1.2),
            lull_ratio: dec!(0.8),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Escrow fee in basis points (50 = 0.5%)
    pub fee_bps: u32,
    pub default_expiry_secs: i64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            fee_bps: 50,
            default_expiry_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a pending payment session
    pub ttl_secs: i64,
    /// How long terminal sessions are kept before the sweep drops them
    pub retention_secs: i64,
    /// Pending transactions older than this are expired
    pub transaction_timeout_secs: i64,
    pub transaction_max_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            retention_secs: 3600,
            transaction_timeout_secs: 90,
            transaction_max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub nonce_ttl_secs: i64,
    pub token_ttl_secs: i64,
    pub max_attempts: u32,
    pub lockout_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            nonce_ttl_secs: 300,
            token_ttl_secs: 24 * 60 * 60,
            max_attempts: 5,
            lockout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of samples kept in the rolling window
    pub history_size: usize,
    /// Interval of the synthetic telemetry sampler (0 disables it)
    pub sample_interval_secs: u64,
    pub baseline_tps: f64,
    pub baseline_block_time_ms: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            history_size: 60,
            sample_interval_secs: 5,
            baseline_tps: 2000.0,
            baseline_block_time_ms: 420.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub dexscreener_url: String,
    pub polymarket_url: String,
    pub pair_cache_ttl_secs: u64,
    pub search_cache_ttl_secs: u64,
    pub boosted_cache_ttl_secs: u64,
    pub polymarket_cache_ttl_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            dexscreener_url: "https://api.dexscreener.com".to_string(),
            polymarket_url: "https://gamma-api.polymarket.com".to_string(),
            pair_cache_ttl_secs: 15,
            search_cache_ttl_secs: 30,
            boosted_cache_ttl_secs: 60,
            polymarket_cache_ttl_secs: 60,
            max_retries: 3,
            retry_base_delay_ms: 500,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_queue: usize,
    pub task_timeout_secs: u64,
    /// Completed task results kept for lookup
    pub history_size: usize,
    /// Idle poll interval of the worker loop
    pub poll_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_queue: 256,
            task_timeout_secs: 30,
            history_size: 500,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL (in-memory repository when unset)
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("MODEXO_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (MODEXO_X402__PAY_TO, etc.)
            .add_source(
                Environment::with_prefix("MODEXO")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.x402.facilitator_url.trim().is_empty() {
            errors.push("x402.facilitator_url must be set".to_string());
        }
        if crate::validation::validate_solana_address(&self.x402.pay_to).is_err() {
            errors.push(format!("x402.pay_to is not a valid address: {}", self.x402.pay_to));
        }
        if crate::validation::validate_solana_address(&self.x402.asset).is_err() {
            errors.push(format!("x402.asset is not a valid mint: {}", self.x402.asset));
        }

        let rl = &self.rate_limit;
        if rl.window_secs == 0 {
            errors.push("rate_limit.window_secs must be positive".to_string());
        }
        if rl.request_limit == 0 || rl.payment_limit == 0 || rl.execution_limit == 0 {
            errors.push("rate_limit ceilings must be positive".to_string());
        }
        if rl.max_violations == 0 {
            errors.push("rate_limit.max_violations must be positive".to_string());
        }

        let p = &self.pricing;
        if p.min_multiplier <= Decimal::ZERO || p.min_multiplier > p.max_multiplier {
            errors.push("pricing multiplier bounds are inconsistent".to_string());
        }
        if p.step_up < Decimal::ONE || p.step_down > Decimal::ONE {
            errors.push("pricing.step_up must be >= 1 and step_down <= 1".to_string());
        }
        if p.demand_window_secs == 0 {
            errors.push("pricing.demand_window_secs must be positive".to_string());
        }

        if self.escrow.fee_bps > 10_000 {
            errors.push("escrow.fee_bps cannot exceed 10000".to_string());
        }
        if self.session.ttl_secs <= 0 {
            errors.push("session.ttl_secs must be positive".to_string());
        }
        if self.network.history_size == 0 {
            errors.push("network.history_size must be positive".to_string());
        }
        if self.orchestrator.max_queue == 0 {
            errors.push("orchestrator.max_queue must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
