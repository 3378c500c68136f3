//! CLI interface for bridge-backtest
//!
//! Provides subcommands for:
//! - `backtest`: Score bridges over a range of draws
//! - `rebaseline`: Rewrite the authoritative fixed-window rates
//! - `refresh`: Recompute dynamic bridge metrics and auto flags
//! - `visibility`: Show which stored bridges are visible
//! - `override`: Force or clear a bridge's visibility
//! - `config`: Show configuration

mod backtest;
mod refresh;
mod visibility;

pub use backtest::{BacktestArgs, RebaselineArgs};
pub use refresh::RefreshArgs;
pub use visibility::{OverrideArgs, VisibilityArgs};

use crate::backtest::BacktestSettings;
use crate::bridge::{BridgeRegistry, BridgeSpec};
use crate::config::Config;
use crate::history::{load_history, DrawRecord};
use crate::manager::BridgeManager;
use crate::store::{SqliteBridgeStore, StoreGateway};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "bridge-backtest")]
#[command(about = "Backtest lottery bridges and manage their visibility")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score bridges over a range of draws
    Backtest(BacktestArgs),
    /// Rewrite the fixed-window rates from an explicit range
    Rebaseline(RebaselineArgs),
    /// Recompute dynamic bridge metrics and auto flags
    Refresh(RefreshArgs),
    /// Show visibility of stored bridges
    Visibility(VisibilityArgs),
    /// Force or clear a bridge's visibility
    Override(OverrideArgs),
    /// Show configuration
    Config,
}

/// Output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// History file and bridge selection shared by scanning commands
#[derive(Args, Debug)]
pub struct BridgeSource {
    /// JSON draw history, oldest first
    #[arg(long, default_value = "history.json")]
    pub history: PathBuf,

    /// Bridge as name=A,B[,shadow|dynamic]; repeatable. Defaults to the standard set
    #[arg(long = "bridge", value_name = "SPEC")]
    pub bridges: Vec<BridgeSpec>,
}

impl BridgeSource {
    fn load(&self) -> anyhow::Result<Arc<[DrawRecord]>> {
        let records = load_history(&self.history)?;
        tracing::info!(path = ?self.history, draws = records.len(), "Loaded history");
        Ok(records.into())
    }

    fn registry(&self) -> BridgeRegistry {
        if self.bridges.is_empty() {
            BridgeRegistry::standard()
        } else {
            BridgeRegistry::from_specs(&self.bridges)
        }
    }
}

fn open_manager(config: &Config, settings: BacktestSettings) -> anyhow::Result<BridgeManager> {
    let store = SqliteBridgeStore::open(&config.store.db_path)?;
    let gateway = StoreGateway::new(
        Arc::new(store),
        config.store.retry_policy(),
        config.store.cache_ttl(),
    );
    Ok(BridgeManager::new(settings, config.visibility, gateway))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
