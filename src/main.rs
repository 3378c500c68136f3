use bridge_backtest::cli::{Cli, Commands};
use bridge_backtest::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    let _telemetry = bridge_backtest::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Backtest(args) => {
            tracing::info!("Starting backtest");
            args.execute(&config).await?;
        }
        Commands::Rebaseline(args) => {
            tracing::info!("Starting re-baseline");
            args.execute(&config).await?;
        }
        Commands::Refresh(args) => {
            tracing::info!("Starting dynamic refresh");
            args.execute(&config).await?;
        }
        Commands::Visibility(args) => args.execute(&config).await?,
        Commands::Override(args) => args.execute(&config).await?,
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Backtest: mode={}, recent form window={}",
                config.backtest.mode, config.backtest.recent_form_window
            );
            let v = &config.visibility;
            println!(
                "  Visibility: enable>={}, disable<={}, window={}, legacy window={}",
                v.enable_threshold, v.disable_threshold, v.window, v.legacy_window
            );
            println!(
                "  Store: {} (attempts={}, cache ttl={}s)",
                config.store.db_path.display(),
                config.store.max_attempts,
                config.store.cache_ttl_secs
            );
            println!(
                "  Telemetry: level={}, format={:?}, metrics port={}",
                config.telemetry.log_level,
                config.telemetry.log_format,
                config
                    .telemetry
                    .metrics_port
                    .map_or_else(|| "off".to_string(), |p| p.to_string())
            );
        }
    }

    Ok(())
}
