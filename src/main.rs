use clap::Parser;
use modexo::agents::AgentRegistry;
use modexo::cli::{self, Cli, Commands};
use modexo::config::AppConfig;
use modexo::error::Result;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, run_server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let config = AppConfig::load_from(&cli.config)?;
            init_logging(&config.logging);
            run_server(config).await?;
        }
        Some(Commands::Serve { port }) => {
            let mut config = AppConfig::load_from(&cli.config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            init_logging(&config.logging);
            run_server(config).await?;
        }
        Some(Commands::Agents) => {
            init_logging_simple();
            cli::print_agents(&AgentRegistry::builtin());
        }
        Some(Commands::Price {
            agent,
            wallet,
            units,
        }) => {
            init_logging_simple();
            let config = AppConfig::load_from(&cli.config)?;
            cli::print_price_quote(&config, &agent, wallet.as_deref(), units).await?;
        }
        Some(Commands::Congestion { samples, urgency }) => {
            init_logging_simple();
            let config = AppConfig::load_from(&cli.config)?;
            cli::simulate_congestion(&config, samples, &urgency).await?;
        }
        Some(Commands::Config) => {
            init_logging_simple();
            let config = AppConfig::load_from(&cli.config)?;
            cli::print_config(&config);
        }
    }

    Ok(())
}
