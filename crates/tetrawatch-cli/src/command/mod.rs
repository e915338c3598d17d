use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{
    benchmark::BenchmarkArg,
    calibrate::{CalibrateArg, CalibrationMode},
    config::ConfigMode,
    run::RunArg,
};

mod benchmark;
mod calibrate;
mod config;
mod run;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Increase log verbosity (-v debug, -vv trace); `RUST_LOG` takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Replay captured frames through the analysis pipeline
    Run(#[clap(flatten)] RunArg),
    /// Detect the playfield in a frame and save it under a profile
    Calibrate(#[clap(flatten)] CalibrateArg),
    /// Inspect saved calibrations
    #[command(subcommand)]
    Calibration(CalibrationMode),
    /// Create or check configuration files
    #[command(subcommand)]
    Config(ConfigMode),
    /// Measure pipeline throughput over captured frames
    Benchmark(#[clap(flatten)] BenchmarkArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_tracing(args.verbose);
    match args.mode {
        Mode::Run(arg) => run::run(&arg)?,
        Mode::Calibrate(arg) => calibrate::run(&arg)?,
        Mode::Calibration(mode) => calibrate::run_calibration(&mode)?,
        Mode::Config(mode) => config::run(&mode)?,
        Mode::Benchmark(arg) => benchmark::run(&arg)?,
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout carries frame output, logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
