use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

use pullpush_tb::junit::create_junit_xml;
use pullpush_tb::{Harness, PassThrough, RunConfig, TbResult, TraceStatus};

/// Runs the pull/push handshake testbench against the reference pass-through design
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML run configuration, defaults reproduce the reference scenario
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run duration in the configured time unit
    #[arg(short, long)]
    duration: Option<u64>,

    /// Waveform dump path
    #[arg(short, long)]
    trace: Option<PathBuf>,

    /// Disable waveform capture
    #[arg(long, conflicts_with = "trace")]
    no_trace: bool,

    /// Write a JUnit XML report
    #[arg(long)]
    junit: Option<PathBuf>,

    /// Pass-through latency in cycles
    #[arg(long, default_value_t = 2)]
    latency: u64,

    /// Pass-through FIFO depth
    #[arg(long, default_value_t = 4)]
    depth: usize,

    /// Probability of a random stall per interface and cycle
    #[arg(long, default_value_t = 0.0)]
    stall: f64,

    /// Seed for the stall generator
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(cli: &Cli) -> TbResult<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(duration) = cli.duration {
        config.duration = duration;
    }
    if let Some(path) = &cli.trace {
        config.trace.enabled = true;
        config.trace.path = path.clone();
    }
    if cli.no_trace {
        config.trace.enabled = false;
    }
    Ok(config)
}

fn run(cli: &Cli) -> TbResult<u8> {
    let config = load_config(cli)?;
    let dut = PassThrough::new(cli.latency, cli.depth)?.with_random_stall(cli.stall, cli.seed)?;
    let report = Harness::new(config, dut)?.run()?;

    report.summary_table().printstd();
    if let TraceStatus::Failed { reason, .. } = &report.trace {
        warn!("waveform incomplete: {}", reason);
    }
    if let Some(path) = &cli.junit {
        create_junit_xml(&report, env!("CARGO_PKG_NAME"), path)?;
        info!("junit report written to {}", path.display());
    }
    match report.passed() {
        true => info!("PASSED: {}", report.result_str()),
        false => error!("FAILED: {}", report.result_str()),
    }
    Ok(report.exit_code())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    println!("-- started");
    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            2
        }
    };
    println!("-- finished");
    ExitCode::from(code)
}
