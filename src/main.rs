//! A/B experiment metrics CLI
//!
//! Loads the four experiment datasets, runs the pipeline, and prints
//! per-group conversion and revenue metrics.
//!
//! Usage:
//!   abtest-metrics --config experiment.toml
//!   abtest-metrics --config experiment.toml --offline --format json
//!
//! Environment Variables:
//!   RUST_LOG - log filter (default: abtest_metrics=info)
//!   ABTEST_CONFIG_PATH - config file when --config is not given
//!   ABTEST_BASE_URL, ABTEST_OFFLINE, ABTEST_ZERO_DENOMINATOR - see config

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use abtest_metrics::config::ExperimentConfig;
use abtest_metrics::loader::loader_for;
use abtest_metrics::pipeline::run_with_loader;
use abtest_metrics::report::PipelineReport;
use abtest_metrics::ZeroDenominatorPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "abtest-metrics")]
#[command(about = "Compute conversion, ARPAU and ARPPU per A/B test group")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, env = "ABTEST_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Read local fallback files only
    #[arg(long)]
    offline: bool,

    /// Fail on zero denominators and missing groups instead of reporting them as undefined
    #[arg(long)]
    strict: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            ExperimentConfig::from_file(path)?
        }
        None => {
            info!("Using default configuration");
            ExperimentConfig::default()
        }
    };
    let mut config = config.apply_env()?;
    if cli.offline {
        config.loader.offline = true;
    }
    if cli.strict {
        config.metrics.zero_denominator = ZeroDenominatorPolicy::Fail;
    }

    let loader = loader_for(&config.loader).context("Failed to build resource loader")?;
    let report = run_with_loader(loader.as_ref(), &config).context("Experiment pipeline failed")?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

/// Initialize tracing; logs go to stderr so stdout stays machine-readable
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "abtest_metrics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "undefined".to_string())
}

fn fmt_pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:+.2}%", v * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

fn print_report(report: &PipelineReport) {
    let counts = &report.counts;

    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║                 A/B EXPERIMENT METRICS REPORT                  ║");
    println!("╚════════════════════════════════════════════════════════════════╝");
    println!();
    println!("Generated: {}", report.generated_at.to_rfc3339());
    println!();

    println!("=== Inputs ===\n");
    println!("  Assignments (primary):      {}", counts.primary_assignments);
    println!("  Assignments (supplemental): {}", counts.supplemental_assignments);
    println!("  Assignments (reconciled):   {}", counts.reconciled_assignments);
    println!("  Active users:               {}", counts.active_users);
    println!("  Unassigned active users:    {}", counts.unassigned_active_users);
    println!("  Payments:                   {}", counts.payments);
    println!("  Experiment records:         {}", counts.records);

    if !report.ambiguous_identities.is_empty() {
        println!(
            "\n  ⚠ {} user(s) assigned to more than one group (passed through):",
            report.ambiguous_identities.len()
        );
        for identity in report.ambiguous_identities.iter().take(10) {
            let groups: Vec<&str> = identity.groups.iter().map(|g| g.as_str()).collect();
            println!("    {} -> {}", identity.user_id, groups.join(", "));
        }
    }

    println!("\n=== Group Metrics ===\n");
    println!(
        "{:>5} {:>8} {:>8} {:>10} {:>10} {:>14} {:>10} {:>10}",
        "Group", "Users", "Paying", "Not Paid", "CR", "Revenue", "ARPAU", "ARPPU"
    );
    println!("{}", "-".repeat(82));
    for m in &report.metrics {
        println!(
            "{:>5} {:>8} {:>8} {:>10} {:>10} {:>14.2} {:>10} {:>10}",
            m.group.as_str(),
            m.user_count,
            m.converted_1_count,
            m.converted_0_count,
            fmt_opt(m.conversion_rate, 4),
            m.total_revenue,
            fmt_opt(m.arpau, 2),
            fmt_opt(m.arppu, 2),
        );
    }

    if let Some(uplift) = &report.uplift {
        println!("\n=== B vs A ===\n");
        println!("  Conversion rate: {}", fmt_pct(uplift.conversion_rate));
        println!("  ARPAU:           {}", fmt_pct(uplift.arpau));
        println!("  ARPPU:           {}", fmt_pct(uplift.arppu));
    }
}
