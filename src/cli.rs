use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::agents::AgentRegistry;
use crate::config::AppConfig;
use crate::error::{ModexoError, Result};
use crate::payment::{CongestionMonitor, PricingEngine, Urgency};

#[derive(Parser)]
#[command(name = "modexo")]
#[command(version)]
#[command(about = "Solana token analytics backend with x402-gated agent endpoints", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration directory (default.toml, {MODEXO_ENV}.toml)
    #[arg(short, long, default_value = "config", env = "MODEXO_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server with background workers (default)
    Serve {
        /// Override server.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the agent manifest
    Agents,
    /// Quote the price of an agent call
    Price {
        /// Agent id, e.g. token-safety
        agent: String,
        /// Wallet for discount evaluation
        #[arg(short, long)]
        wallet: Option<String>,
        /// Number of calls
        #[arg(short, long, default_value = "1")]
        units: u32,
    },
    /// Simulate network telemetry and print fee estimates
    Congestion {
        /// Number of synthetic samples
        #[arg(short, long, default_value = "30")]
        samples: usize,
        /// low, normal or high
        #[arg(short, long, default_value = "normal")]
        urgency: String,
    },
    /// Validate and print the effective configuration
    Config,
}

pub fn print_agents(registry: &AgentRegistry) {
    println!(
        "\x1b[1m{:<22} {:<30} {:>8} {:<11} {}\x1b[0m",
        "ID", "RESOURCE", "PRICE", "TIER", "METHOD"
    );
    for agent in registry.all() {
        let tier = serde_json::to_value(agent.tier)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!(
            "{:<22} {:<30} {:>8} {:<11} {}",
            agent.id,
            agent.resource,
            format!("${}", agent.price_usd),
            tier,
            agent.method
        );
    }
}

pub async fn print_price_quote(
    config: &AppConfig,
    agent_id: &str,
    wallet: Option<&str>,
    units: u32,
) -> Result<()> {
    let registry = AgentRegistry::builtin();
    let pricing = PricingEngine::new(config.pricing.clone());
    registry.register_pricing(&pricing).await;

    let quote = pricing
        .calculate_price(agent_id, wallet, units)
        .await
        .ok_or_else(|| ModexoError::NotFound(format!("unknown agent: {}", agent_id)))?;

    println!("\x1b[1mQuote for {}\x1b[0m", quote.agent_id);
    println!("  units:              {}", quote.units);
    println!("  base price:         ${}", quote.base_price);
    println!("  tier multiplier:    x{}", quote.tier_multiplier);
    println!("  dynamic multiplier: x{}", quote.dynamic_multiplier);
    if quote.discount_percent > Decimal::ZERO {
        println!(
            "  discount:           {}% ({})",
            quote.discount_percent * Decimal::ONE_HUNDRED,
            quote.discount_rule.as_deref().unwrap_or("-")
        );
    }
    println!("  \x1b[32mfinal price:        ${}\x1b[0m", quote.final_price);
    Ok(())
}

pub async fn simulate_congestion(config: &AppConfig, samples: usize, urgency: &str) -> Result<()> {
    let urgency: Urgency = urgency.parse().map_err(ModexoError::Validation)?;
    let monitor = CongestionMonitor::new(config.network.clone());

    for _ in 0..samples.max(1) {
        monitor.sample().await;
    }

    let status = monitor.status().await;
    let fees = monitor.estimate_priority_fee(urgency).await;
    let delay = monitor.should_delay(urgency).await;

    println!("\x1b[1mNetwork ({} samples)\x1b[0m", status.samples);
    println!("  congestion:     {} (score {:.2})", status.congestion, status.score);
    println!("  average tps:    {:.0}", status.average_tps);
    println!("  avg block time: {:.0} ms", status.average_block_time_ms);
    println!("\x1b[1mFees ({:?} urgency)\x1b[0m", urgency);
    println!("  priority fee:   {} micro-lamports/CU", fees.priority_fee_micro_lamports);
    println!("  base fee:       {} lamports", fees.base_fee_lamports);
    println!("  confirmation:   ~{} ms", fees.estimated_confirmation_ms);
    if delay.should_delay {
        println!("  \x1b[33mwait {}s: {}\x1b[0m", delay.delay_secs, delay.reason);
    } else {
        println!("  \x1b[32mproceed: {}\x1b[0m", delay.reason);
    }
    Ok(())
}

pub fn print_config(config: &AppConfig) {
    println!("\x1b[1mServer\x1b[0m    {}:{}", config.server.host, config.server.port);
    println!(
        "\x1b[1mx402\x1b[0m      v{} {} asset {} -> {}",
        config.x402.x402_version, config.x402.network, config.x402.asset, config.x402.pay_to
    );
    println!("          facilitator {}", config.x402.facilitator_url);
    println!(
        "\x1b[1mLimits\x1b[0m    request {} / payment {} / execution {} per {}s",
        config.rate_limit.request_limit,
        config.rate_limit.payment_limit,
        config.rate_limit.execution_limit,
        config.rate_limit.window_secs
    );
    println!(
        "\x1b[1mDatabase\x1b[0m  {}",
        if config.database.url.is_some() {
            "postgres"
        } else {
            "in-memory"
        }
    );

    match config.validate() {
        Ok(()) => println!("\x1b[32m✓ configuration is valid\x1b[0m"),
        Err(errors) => {
            println!("\x1b[31m✗ {} problem(s):\x1b[0m", errors.len());
            for e in errors {
                println!("  - {}", e);
            }
        }
    }
}
