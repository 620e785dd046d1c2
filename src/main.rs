use anyhow::{Context, Result};
use clap::Parser;
use fibbench::aggregate::{self, ComparisonTable};
use fibbench::cli::{Cli, Command};
use fibbench::config::BenchConfig;
use fibbench::csv_output::CsvTableOutput;
use fibbench::json_output::JsonReport;
use fibbench::mode::{Mode, SysfsModeSwitch};
use fibbench::plot::{PlotRenderer, SvgPlotRenderer};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; RUST_LOG wins over the --debug default
fn init_tracing(debug: bool) {
    let default_level = if debug { "trace" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file (if any) and layer the subcommand's flags on top
fn load_config(cli: &Cli) -> Result<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };
    cli.command.run_args().apply_to(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

/// Print per-series summary lines to stdout
fn print_summary(table: &ComparisonTable) {
    println!("{} ({} offsets)", table.title(), table.offsets());
    println!("─────────────────────────────────────────────────────────");
    println!(
        "{:<16} {:>12} {:>12} {:>12} {:>8}",
        "series", "min (ns)", "max (ns)", "mean (ns)", "NaN"
    );
    for series in table.series() {
        let finite: Vec<f64> = series
            .result
            .values()
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let nan = series.result.len() - finite.len();
        let (min, max, mean) = if finite.is_empty() {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            (
                finite.iter().copied().fold(f64::INFINITY, f64::min),
                finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                finite.iter().sum::<f64>() / finite.len() as f64,
            )
        };
        println!(
            "{:<16} {:>12.1} {:>12.1} {:>12.1} {:>8}",
            series.label, min, max, mean, nan
        );
    }
    println!("─────────────────────────────────────────────────────────");
}

/// Write the chart and any requested tables
fn write_outputs(table: &ComparisonTable, config: &BenchConfig) -> Result<()> {
    SvgPlotRenderer::default()
        .render(table, &config.plot)
        .context("Failed to write chart")?;

    if let Some(path) = &config.csv {
        std::fs::write(path, CsvTableOutput::new(table).to_csv())
            .with_context(|| format!("Failed to write CSV to {}", path.display()))?;
    }

    if let Some(path) = &config.json {
        let json = JsonReport::from_table(table, config.trials, config.significance)
            .to_json()
            .context("Failed to serialize JSON report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    let config = load_config(&cli)?;
    let filter = config.filter()?;
    let mut source = config
        .client_source()
        .context("Failed to prepare client")?;
    let mut switch = SysfsModeSwitch::new(&config.mode_path);
    let show_progress = !cli.quiet;

    tracing::info!(
        trials = config.trials,
        offsets = config.offsets,
        cpu = ?source.cpu(),
        "starting benchmark"
    );

    let table = match &cli.command {
        Command::Breakdown { mode, .. } => aggregate::run_breakdown(
            config.plan(*mode),
            &mut source,
            Some(&mut switch),
            &filter,
            show_progress,
        )?,
        Command::Compare { .. } => aggregate::run_comparison(
            config.plan(None),
            &Mode::ALL,
            &mut source,
            &mut switch,
            &filter,
            show_progress,
        )?,
    };

    for (label, offsets) in table.degenerate() {
        eprintln!(
            "[fibbench: '{}' has no retained samples at offsets {:?}; reported as NaN]",
            label, offsets
        );
    }

    write_outputs(&table, &config)?;

    if !cli.quiet {
        print_summary(&table);
    }

    Ok(())
}
