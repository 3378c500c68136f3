//! Backtest and re-baseline commands

use super::{open_manager, print_json, BridgeSource, OutputFormat};
use crate::backtest::{BacktestMode, CancelToken};
use crate::config::Config;
use crate::manager::{RateWrite, ScanOutcome};
use clap::Args;

#[derive(Args, Debug)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub source: BridgeSource,

    /// First row of the range (must be greater than 1)
    #[arg(long)]
    pub start: Option<String>,

    /// Last row of the range; clamped to the available history
    #[arg(long)]
    pub end: Option<String>,

    /// Override the configured scoring mode
    #[arg(long, value_enum)]
    pub mode: Option<BacktestMode>,

    /// Write the results to the scan rate of each bridge
    #[arg(long)]
    pub persist: bool,

    /// Period rows shown in table output
    #[arg(long, default_value = "20")]
    pub rows: usize,

    /// Output format: table or json
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl BacktestArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut settings = config.backtest.clone();
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        let manager = open_manager(config, settings)?;
        let history = self.source.load()?;
        let registry = self.source.registry();

        let cancel = CancelToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling backtest");
                on_interrupt.cancel();
            }
        });

        let write = if self.persist {
            RateWrite::Routine
        } else {
            RateWrite::None
        };
        let outcome = manager
            .scan(
                history,
                self.start.clone(),
                self.end.clone(),
                &registry,
                write,
                Some(cancel),
            )
            .await?;

        render(&outcome, self.format, self.rows)?;
        match outcome.persist_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[derive(Args, Debug)]
pub struct RebaselineArgs {
    #[command(flatten)]
    pub source: BridgeSource,

    /// First row of the baseline window
    #[arg(long)]
    pub start: String,

    /// Last row of the baseline window
    #[arg(long)]
    pub end: String,

    /// Output format: table or json
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl RebaselineArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut settings = config.backtest.clone();
        settings.mode = BacktestMode::Single;
        let manager = open_manager(config, settings)?;
        let history = self.source.load()?;
        let registry = self.source.registry();

        let outcome = manager
            .rebaseline(
                history,
                Some(self.start.clone()),
                Some(self.end.clone()),
                &registry,
            )
            .await?;
        tracing::info!(
            written = outcome.persisted.unwrap_or(0),
            "Fixed-window rates re-baselined"
        );
        render(&outcome, self.format, 0)
    }
}

fn render(outcome: &ScanOutcome, format: OutputFormat, rows: usize) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Table => {
            let report = &outcome.report;
            println!(
                "Mode: {}  Periods: {}..={}",
                report.mode, report.first_scorable, report.effective_end
            );
            println!("{}", report.table.format_table(rows));
            println!();
            println!(
                "{:<16} {:>20} {:>8} {:>9} {:>7}  Next",
                "Bridge", "Win rate", "Streak", "Max lose", "Recent"
            );
            for stats in &outcome.aggregation.stats {
                println!(
                    "{:<16} {:>20} {:>8} {:>9} {:>7}  {}",
                    stats.name,
                    stats.win_rate_text,
                    stats.current_streak,
                    stats.max_lose_streak,
                    stats.recent_win_count,
                    stats.clean_prediction
                );
            }
            for (name, pending) in report.dangling() {
                println!(
                    "{} still awaiting confirmation of {} (opened at period {})",
                    name,
                    crate::bridge::format_prediction(&pending.predicted),
                    pending.opened_at
                );
            }
            if report.predictor_errors > 0 {
                println!("Predictor errors: {}", report.predictor_errors);
            }
            if let Some(written) = outcome.persisted {
                println!("Persisted {} bridge(s)", written);
            }
            Ok(())
        }
    }
}
