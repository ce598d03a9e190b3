use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stride_calibrator::config::AppConfig;
use stride_calibrator::replay::{
    ExpectationDiff, ReplayRecord, ReplayReport, TraceCatalog, TraceRunner,
};

#[derive(Parser, Debug)]
#[command(
    name = "stride_cli",
    about = "Deterministic session trace harness for the stride calibrator"
)]
struct Cli {
    /// Override directory containing trace assets (defaults to ./fixtures)
    #[arg(long)]
    traces_dir: Option<PathBuf>,
    /// Configuration JSON to replay with (defaults are used when absent)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace and optionally compare the final state against expectations
    Replay {
        #[arg(long)]
        trace: String,
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print one JSON line per replayed input
    Stream {
        #[arg(long)]
        trace: String,
    },
    /// List available traces on disk
    DumpTraces,
    /// Print the effective configuration as JSON
    Defaults,
}

fn main() -> ExitCode {
    stride_calibrator::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let catalog = cli
        .traces_dir
        .map(TraceCatalog::new)
        .unwrap_or_else(TraceCatalog::default);
    let config = cli
        .config
        .as_deref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Replay {
            trace,
            expect,
            output,
        } => run_replay(&catalog, config, &trace, expect, output),
        Commands::Stream { trace } => run_stream(&catalog, config, &trace),
        Commands::DumpTraces => run_dump(&catalog),
        Commands::Defaults => run_defaults(&config),
    }
}

fn run_replay(
    catalog: &TraceCatalog,
    config: AppConfig,
    trace: &str,
    override_expect: Option<PathBuf>,
    output_path: Option<PathBuf>,
) -> Result<ExitCode> {
    let data = catalog.load(trace, override_expect)?;
    let report = TraceRunner::new(config)
        .run(&data.trace)
        .with_context(|| format!("replaying trace {}", trace))?;

    emit_report(&report, output_path)?;

    if let Some(expectations) = data.expectations {
        match expectations.verify(&report) {
            Ok(()) => Ok(ExitCode::from(0)),
            Err(diff) => {
                emit_diff(&diff)?;
                Ok(ExitCode::from(2))
            }
        }
    } else {
        Ok(ExitCode::from(0))
    }
}

fn run_stream(catalog: &TraceCatalog, config: AppConfig, trace: &str) -> Result<ExitCode> {
    let data = catalog.load(trace, None)?;
    let report = TraceRunner::new(config)
        .run(&data.trace)
        .with_context(|| format!("replaying trace {}", trace))?;

    for record in &report.records {
        println!("{}", serde_json::to_string(record)?);
    }

    Ok(ExitCode::from(0))
}

fn run_dump(catalog: &TraceCatalog) -> Result<ExitCode> {
    let traces = catalog.discover()?;
    if traces.is_empty() {
        println!("No traces found under {}", catalog.root().display());
        return Ok(ExitCode::from(0));
    }

    for metadata in traces {
        if let Some(expect) = metadata.expect_path {
            println!("{} -> {}", metadata.name, expect.display());
        } else {
            println!("{}", metadata.name);
        }
    }
    Ok(ExitCode::from(0))
}

fn run_defaults(config: &AppConfig) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(ExitCode::from(0))
}

fn emit_report(report: &ReplayReport, output_path: Option<PathBuf>) -> Result<()> {
    let payload = ReplayReportPayload {
        trace: &report.trace,
        event_count: report.records.len(),
        rejected: report.rejected,
        final_snapshot: &report.final_snapshot,
        records: &report.records,
    };
    let json = serde_json::to_string_pretty(&payload)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct ReplayReportPayload<'a> {
    trace: &'a str,
    event_count: usize,
    rejected: usize,
    final_snapshot: &'a stride_calibrator::calibration::TrackerSnapshot,
    #[serde(skip_serializing_if = "slice_empty")]
    records: &'a [ReplayRecord],
}

fn slice_empty(records: &&[ReplayRecord]) -> bool {
    records.is_empty()
}
