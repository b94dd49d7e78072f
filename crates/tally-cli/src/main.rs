//! Tally CLI
//!
//! Command-line interface for running incentive reconciliation reports.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{LoggingConfig, TallyConfig};
use std::path::PathBuf;
use tally_chain::{ChainFixture, MemoryChain};
use tally_core::{BlockNumber, BlockRange};
use tally_economics::{ReportDriver, Severity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Tally - incentive and treasury reconciliation reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "tally.toml")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a block range and print the report as JSON
    Report {
        /// Chain fixture (JSON)
        #[arg(short, long, env = "TALLY_FIXTURE")]
        fixture: PathBuf,

        /// First block of the range
        #[arg(long)]
        start: BlockNumber,

        /// Block after the last one in the range
        #[arg(long)]
        end: BlockNumber,

        /// Scoring term length, overrides the config
        #[arg(long)]
        term_length: Option<BlockNumber>,

        /// Skip opportunity scoring
        #[arg(long)]
        no_scoring: bool,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective configuration
    Config,
}

fn init_logging(verbose: bool, config: &LoggingConfig) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = TallyConfig::load(&cli.config)?;
    init_logging(cli.verbose, &config.logging);

    match cli.command {
        Commands::Report {
            fixture,
            start,
            end,
            term_length,
            no_scoring,
            output,
            pretty,
        } => {
            if let Some(term_length) = term_length {
                config.scoring.term_length = term_length;
            }
            if no_scoring {
                config.scoring.enabled = false;
            }

            tracing::info!("Config: {:?}", cli.config);
            tracing::info!("Fixture: {:?}", fixture);

            let fixture = ChainFixture::from_path(&fixture)?;
            let chain = MemoryChain::new(fixture);
            let request = config.to_request(BlockRange::new(start, end))?;

            let report = ReportDriver::from_backend(&chain).run(&request).await?;

            for diagnostic in &report.diagnostics {
                match diagnostic.severity() {
                    Severity::Error => tracing::error!("{:?}", diagnostic),
                    Severity::Warning => tracing::warn!("{:?}", diagnostic),
                    Severity::Info => tracing::info!("{:?}", diagnostic),
                }
            }
            if !report.is_complete() {
                tracing::warn!(
                    "Report is partial: eras {:?}, groups {:?} failed",
                    report.failed_eras(),
                    report.failed_groups()
                );
            }

            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing report to {}", path.display()))?;
                    tracing::info!("Report written to {:?}", path);
                }
                None => println!("{}", json),
            }
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::GroupId;
    use tally_economics::EarnerContext;

    const SAMPLE_CHAIN: &str = include_str!("../fixtures/sample-chain.json");
    const EXAMPLE_CONFIG: &str = include_str!("../../../tally.example.toml");

    #[tokio::test]
    async fn test_sample_report() {
        let config: TallyConfig = toml::from_str(EXAMPLE_CONFIG).unwrap();
        let chain = MemoryChain::new(ChainFixture::from_json_str(SAMPLE_CHAIN).unwrap());
        let request = config.to_request(BlockRange::new(100, 1_600)).unwrap();

        let report = ReportDriver::from_backend(&chain).run(&request).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.eras.as_ref().unwrap().eras.len(), 2);
        assert_eq!(report.totals.unattributed, 50);

        let membership = report
            .budgets
            .get(&GroupId::from("membershipWorkingGroup"))
            .unwrap();
        assert_eq!(membership.spent, 20);
        assert_eq!(membership.untracked(), Some(0));

        let nominators = report.earners_for(EarnerContext::Nominator).unwrap();
        assert_eq!(nominators.earnings, 1_070);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("unattributed_spending"));
    }
}
