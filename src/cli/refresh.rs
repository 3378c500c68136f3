//! Dynamic refresh command

use super::{open_manager, print_json, BridgeSource, OutputFormat};
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Dynamic bridges are those declared with the `dynamic` modifier
    #[command(flatten)]
    pub source: BridgeSource,

    /// Name recorded in audit entries
    #[arg(long, default_value = "scheduler")]
    pub actor: String,

    /// Output format: table or json
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl RefreshArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let manager = open_manager(config, config.backtest.clone())?;
        let history = self.source.load()?;
        let registry = self.source.registry();

        let outcome = manager
            .refresh_dynamic(history, &registry, &self.actor, None)
            .await?;

        match self.format {
            OutputFormat::Json => print_json(&outcome),
            OutputFormat::Table => {
                println!(
                    "{:<16} {:>6} {:>8} {:>7} {:>6} {:>8}  Reason",
                    "Bridge", "Wins", "Rate %", "Streak", "Score", "Visible"
                );
                for bridge in &outcome.evaluated {
                    let m = &bridge.metrics;
                    println!(
                        "{:<16} {:>6} {:>8} {:>7} {:>6} {:>8}  {}",
                        bridge.name,
                        m.wins_in_window.unwrap_or(0),
                        m.win_rate_in_window.unwrap_or_default().to_string(),
                        m.current_streak.unwrap_or(0),
                        m.score.unwrap_or_default().to_string(),
                        bridge.decision.visible,
                        bridge.decision.reason
                    );
                }
                for entry in &outcome.audit {
                    println!(
                        "audit: {} {} {} -> {} ({})",
                        entry.bridge_name,
                        entry.field.as_str(),
                        entry.old_value,
                        entry.new_value,
                        entry.reason
                    );
                }
                Ok(())
            }
        }
    }
}
