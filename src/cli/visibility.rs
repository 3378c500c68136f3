//! Visibility and manual override commands

use super::{open_manager, print_json, OutputFormat};
use crate::config::Config;
use clap::{Args, ValueEnum};

#[derive(Args, Debug)]
pub struct VisibilityArgs {
    /// Also print the audit log
    #[arg(long)]
    pub audit: bool,

    /// Output format: table or json
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl VisibilityArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let manager = open_manager(config, config.backtest.clone())?;
        let bridges = manager.visibility().await?;

        match self.format {
            OutputFormat::Json => print_json(&bridges)?,
            OutputFormat::Table => {
                for b in &bridges {
                    println!(
                        "{:<16} {:<20} {:<7} {}{}",
                        b.record.name,
                        b.record.kind.as_str(),
                        if b.decision.visible { "shown" } else { "hidden" },
                        b.decision.reason,
                        if b.decision.needs_evaluation {
                            " [needs evaluation]"
                        } else {
                            ""
                        }
                    );
                }
            }
        }

        if self.audit {
            for entry in manager.gateway().audit_log(None).await? {
                println!(
                    "{} {} {} {} -> {} by {}: {}",
                    entry.recorded_at.to_rfc3339(),
                    entry.bridge_name,
                    entry.field.as_str(),
                    entry.old_value,
                    entry.new_value,
                    entry.actor,
                    entry.reason
                );
            }
        }
        Ok(())
    }
}

/// Forced visibility
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OverrideValue {
    Show,
    Hide,
    Clear,
}

impl OverrideValue {
    fn as_option(self) -> Option<bool> {
        match self {
            OverrideValue::Show => Some(true),
            OverrideValue::Hide => Some(false),
            OverrideValue::Clear => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct OverrideArgs {
    /// Bridge name
    pub name: String,

    #[arg(value_enum)]
    pub value: OverrideValue,

    /// Reason recorded in the audit log
    #[arg(long, default_value = "manual override")]
    pub reason: String,

    /// Name recorded in the audit log
    #[arg(long, default_value = "operator")]
    pub actor: String,
}

impl OverrideArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let manager = open_manager(config, config.backtest.clone())?;
        match manager
            .set_manual_override(&self.name, self.value.as_option(), &self.reason, &self.actor)
            .await?
        {
            Some(entry) => println!(
                "{}: manual override {} -> {}",
                entry.bridge_name, entry.old_value, entry.new_value
            ),
            None => println!("{}: override unchanged", self.name),
        }
        Ok(())
    }
}
