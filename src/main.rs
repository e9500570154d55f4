use std::path::PathBuf;

use anyhow::{Context, Result};
use care_monitor::{
    AppConfig, Clock, MetricsError, PeriodSchedule, SystemClock, VisitCache, YearMonth, analyze,
    audit, export_to_csv, render_json, render_text, report::empty_month_notice,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "care-monitor")]
#[command(about = "Caregiver visit analysis - hours, short visits and gaps")]
struct Args {
    /// Additional configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Visit log CSV (overrides input.path)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Also report a single month, e.g. 2024-03
    #[arg(long)]
    month: Option<YearMonth>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write the derived visits to a CSV file in this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays a clean report
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("care_monitor=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config =
        AppConfig::load_from(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(input) = args.input {
        config.input.path = input;
    }

    let clock = SystemClock;
    let mut cache = VisitCache::new(config.input.clone());
    let visits = cache.get(&config.input.path)?;

    let overall = analyze(&visits, &config, None).context("Failed to analyze visit log")?;
    render(&overall, &config, args.format, &clock)?;

    if let Some(month) = args.month {
        match analyze(&visits, &config, Some(month)) {
            Ok(view) => render(&view, &config, args.format, &clock)?,
            Err(MetricsError::EmptyDataset) => {
                tracing::warn!("{}", empty_month_notice(month, &overall.visits));
            }
            Err(e) => return Err(e).context("Failed to analyze month"),
        }
    }

    if let Some(dir) = args.export_dir {
        let path = export_to_csv(&overall.visits, &dir, &clock)?;
        tracing::info!("Export written to {}", path.display());
    }

    Ok(())
}

fn render<C: Clock>(
    analysis: &care_monitor::Analysis,
    config: &AppConfig,
    format: OutputFormat,
    clock: &C,
) -> Result<()> {
    let schedule = PeriodSchedule::new(&config.periods);
    let quality = audit(&analysis.visits, &analysis.gaps, &schedule);
    let generated_at = clock.now_local();

    match format {
        OutputFormat::Text => println!(
            "{}",
            render_text(analysis, Some(&quality), config, generated_at)
        ),
        OutputFormat::Json => println!(
            "{}",
            render_json(analysis, Some(&quality), config, generated_at)?
        ),
    }
    Ok(())
}
