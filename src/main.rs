use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

mod config;
mod detector;
mod error;
mod loader;
mod matcher;
mod metrics;
mod models;
mod report;
mod risk;

use config::AnalysisConfig;
use detector::ComparisonResult;
use metrics::AggregateReport;
use models::{ChangeKind, DataWarning, RiskFlag, Snapshot};

#[derive(Parser)]
#[command(name = "pipeline-pulse")]
#[command(about = "Snapshot comparison and KPI rollups for a sales pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ThresholdArgs {
    /// Days without modification before an opportunity counts as stagnant
    #[arg(long, default_value_t = config::DEFAULT_STAGNANT_DAYS)]
    stagnant_days: i64,
    /// Days before the expected close date to start warning
    #[arg(long, default_value_t = config::DEFAULT_WARNING_DAYS)]
    warning_days: i64,
    /// Analysis date, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    as_of: Option<NaiveDate>,
}

impl ThresholdArgs {
    fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            stagnant_days_threshold: self.stagnant_days,
            warning_days_before_close: self.warning_days,
            ..AnalysisConfig::default()
        }
    }

    fn as_of(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two snapshots and list the detected changes
    Compare {
        #[arg(long)]
        current: PathBuf,
        #[arg(long)]
        previous: PathBuf,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Compute grouped KPI aggregates for a snapshot
    Metrics {
        #[arg(long)]
        current: PathBuf,
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Emit aggregates as JSON for downstream renderers
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Generate the full markdown report
    Report {
        #[arg(long)]
        current: PathBuf,
        #[arg(long)]
        previous: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
}

/// Everything one run computes; the subcommands only choose how to render it.
struct Analysis {
    current: Snapshot,
    comparison: Option<ComparisonResult>,
    flags: HashMap<String, RiskFlag>,
    aggregates: AggregateReport,
    warnings: Vec<DataWarning>,
    as_of: NaiveDate,
}

fn run_analysis(
    current: &PathBuf,
    previous: Option<&PathBuf>,
    thresholds: &ThresholdArgs,
) -> anyhow::Result<Analysis> {
    let config = thresholds.config();
    let as_of = thresholds.as_of();

    let loaded = loader::load_csv(current, "current")?;
    let mut warnings = loaded.warnings;
    let current = loaded.snapshot;

    let comparison = match previous {
        Some(path) => {
            let previous = loader::load_csv(path, "previous")?;
            warnings.extend(previous.warnings);
            let result = detector::compare(&current, &previous.snapshot, &config)
                .context("snapshot comparison failed")?;
            Some(result)
        }
        None => None,
    };
    if let Some(comparison) = &comparison {
        warnings.extend(comparison.warnings.iter().cloned());
    }

    let flags = risk::evaluate_snapshot(&current, as_of, &config);
    let events = comparison.as_ref().map(|c| c.events.as_slice());
    let aggregates = metrics::aggregate(&current, &flags, events)
        .context("aggregation failed")?;

    Ok(Analysis {
        current,
        comparison,
        flags,
        aggregates,
        warnings,
        as_of,
    })
}

fn print_warnings(warnings: &[DataWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("Data quality warnings:");
    for warning in warnings {
        println!("- {warning}");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compare {
            current,
            previous,
            thresholds,
        } => {
            let analysis = run_analysis(&current, Some(&previous), &thresholds)?;
            let comparison = analysis
                .comparison
                .as_ref()
                .context("comparison did not run")?;
            let summary = &comparison.summary;

            println!(
                "{} new, {} closed, {} changed, {} unchanged ({} -> {} records)",
                summary.new_count,
                summary.closed_count,
                summary.changed_count,
                summary.unchanged_count,
                summary.total_previous,
                summary.total_current
            );
            println!(
                "Pipeline value {:.2} -> {:.2} ({:+.2})",
                summary.previous_total_value,
                summary.current_total_value,
                summary.current_total_value - summary.previous_total_value
            );
            for event in comparison
                .events
                .iter()
                .filter(|e| e.kind != ChangeKind::Unchanged)
            {
                println!("- {} [{}]", event.id, event.kind.label());
            }
            print_warnings(&analysis.warnings);
        }
        Commands::Metrics {
            current,
            previous,
            json,
            thresholds,
        } => {
            let analysis = run_analysis(&current, previous.as_ref(), &thresholds)?;

            if json {
                let payload = serde_json::json!({
                    "as_of": analysis.as_of,
                    "snapshot": analysis.current.label,
                    "record_count": analysis.current.len(),
                    "summary": analysis.comparison.as_ref().map(|c| &c.summary),
                    "aggregates": analysis.aggregates,
                    "warnings": analysis.warnings,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for dimension in metrics::Dimension::ALL {
                    let Some(groups) = analysis.aggregates.groups(dimension) else {
                        continue;
                    };
                    println!("By {dimension}:");
                    for (key, metric) in groups {
                        println!(
                            "- {key}: {} opportunities, {:.2} total, {} stagnant, {} near expiry",
                            metric.count,
                            metric.total_value,
                            metric.stagnant_count,
                            metric.near_expiry_count
                        );
                    }
                    println!();
                }
                print_warnings(&analysis.warnings);
            }
        }
        Commands::Report {
            current,
            previous,
            out,
            thresholds,
        } => {
            let analysis = run_analysis(&current, previous.as_ref(), &thresholds)?;
            let report = report::build_report(
                &analysis.current,
                analysis.as_of,
                analysis.comparison.as_ref(),
                &analysis.aggregates,
                &analysis.flags,
                &analysis.warnings,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
