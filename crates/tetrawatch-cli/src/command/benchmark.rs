use std::{
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};

use anyhow::bail;
use tetrawatch_pipeline::{FrameDropPolicy, FrameOutput, Session};
use tetrawatch_stats::monitor::{PerformanceMonitor, PerformanceReport};
use tetrawatch_vision::source::FileSource;
use tracing::info;

use super::run::Limited;
use crate::util::{self, Output};

/// Frame rate the benchmark asks for, high enough that pacing never sleeps.
const UNPACED_FPS: u32 = 100_000;

#[derive(Default, Debug, Clone, clap::Args)]
pub struct BenchmarkArg {
    /// Directory of captured frames
    #[arg(long)]
    frames: PathBuf,
    /// How many times to replay the frames
    #[arg(long, default_value_t = 10)]
    iterations: u64,
    /// Session configuration file (defaults if omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Also write the report as JSON to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

pub fn run(arg: &BenchmarkArg) -> anyhow::Result<()> {
    let report = measure(arg)?;
    eprintln!("{report}");
    eprintln!("rating: {}", report.rating);
    if let Some(path) = &arg.output {
        Output::save_json(&report, Some(path.clone()))?;
    }
    Ok(())
}

fn measure(arg: &BenchmarkArg) -> anyhow::Result<PerformanceReport> {
    let BenchmarkArg {
        frames,
        iterations,
        config,
        output: _,
    } = arg;

    let mut config = util::load_config(config.as_deref())?;
    config.pipeline.drop_policy = FrameDropPolicy::ProcessAll;
    config.pipeline.target_fps = UNPACED_FPS;

    let files = FileSource::from_dir(frames)?;
    if files.is_empty() {
        bail!("No frames found in {}", frames.display());
    }
    let total = u64::try_from(files.len())?.saturating_mul(*iterations);
    let source = Limited::new(files.looping(true), total);

    let monitor = Arc::new(PerformanceMonitor::new(config.pipeline.monitor_history));
    let mut session = Session::new(config, source, |_: FrameOutput| {})?
        .with_monitor(Arc::clone(&monitor));
    info!(frames = total, "benchmark started");
    session.run(&AtomicBool::new(false));
    Ok(monitor.report())
}
