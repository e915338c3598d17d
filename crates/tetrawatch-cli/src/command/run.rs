use std::{
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
    time::{Duration, Instant},
};

use anyhow::anyhow;
use tetrawatch_pipeline::{CalibrationStore, FrameOutput, FrameSink, ProfileKey, Session};
use tetrawatch_stats::monitor::PerformanceMonitor;
use tetrawatch_vision::{
    frame::{CaptureFault, Frame},
    source::{FileSource, FrameSource},
};
use tracing::{info, warn};

use crate::{
    store::DirStore,
    util::{self, Output},
};

#[derive(Default, Debug, Clone, clap::Args)]
pub struct RunArg {
    /// Directory of captured frames, replayed in file name order
    #[arg(long)]
    frames: PathBuf,
    /// Session configuration file (defaults if omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Saved calibration to start from, as `device/game`
    #[arg(long)]
    profile: Option<String>,
    /// Directory holding saved calibrations
    #[arg(long, default_value = "./data/calibrations/")]
    store: PathBuf,
    /// Disable coaching hints
    #[arg(long, default_value_t = false)]
    no_coaching: bool,
    /// Disable move predictions
    #[arg(long, default_value_t = false)]
    no_predictions: bool,
    /// Seconds between performance statistics on stderr (0 disables them)
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,
    /// Output file for the frame results (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Stop after this many captured frames
    #[arg(long)]
    max_frames: Option<u64>,
}

/// Ends a source after a fixed number of frames.
#[derive(Debug)]
pub(super) struct Limited<S> {
    inner: S,
    remaining: u64,
}

impl<S> Limited<S> {
    pub(super) fn new(inner: S, frames: u64) -> Self {
        Self {
            inner,
            remaining: frames,
        }
    }
}

impl<S> FrameSource for Limited<S>
where
    S: FrameSource,
{
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureFault> {
        if self.remaining == 0 {
            return Err(CaptureFault::Disconnected);
        }
        let frame = self.inner.next_frame(timeout)?;
        if frame.is_some() {
            self.remaining -= 1;
        }
        Ok(frame)
    }
}

/// Writes one JSON line per frame and prints periodic statistics.
#[derive(Debug)]
struct JsonLinesSink {
    output: Output,
    monitor: Arc<PerformanceMonitor>,
    stats_interval: Option<Duration>,
    last_stats: Instant,
    written: u64,
    error: Option<anyhow::Error>,
}

impl FrameSink for JsonLinesSink {
    fn emit(&mut self, output: FrameOutput) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.output.write_json_line(&output) {
            warn!(error = %e, "frame output failed, discarding the rest");
            self.error = Some(e);
            return;
        }
        self.written += 1;
        if let Some(interval) = self.stats_interval
            && self.last_stats.elapsed() >= interval
        {
            eprintln!("{}", self.monitor.report());
            self.last_stats = Instant::now();
        }
    }
}

pub fn run(arg: &RunArg) -> anyhow::Result<()> {
    let RunArg {
        frames,
        config,
        profile,
        store,
        no_coaching,
        no_predictions,
        stats_interval,
        output,
        max_frames,
    } = arg;

    let mut config = util::load_config(config.as_deref())?;
    if *no_coaching {
        config.pipeline.coaching = false;
    }
    if *no_predictions {
        config.pipeline.predictions = false;
    }

    let source = Limited::new(
        FileSource::from_dir(frames)?,
        max_frames.unwrap_or(u64::MAX),
    );
    let monitor = Arc::new(PerformanceMonitor::new(config.pipeline.monitor_history));
    let sink = JsonLinesSink {
        output: Output::from_output_path(output.clone())?,
        monitor: Arc::clone(&monitor),
        stats_interval: (*stats_interval > 0).then(|| Duration::from_secs(*stats_interval)),
        last_stats: Instant::now(),
        written: 0,
        error: None,
    };
    let mut session = Session::new(config, source, sink)?.with_monitor(Arc::clone(&monitor));

    if let Some(profile) = profile {
        let key: ProfileKey = profile.parse()?;
        let calibrations = CalibrationStore::new(DirStore::new(store));
        match calibrations.load(&key)? {
            Some(calibration) => {
                session.restore_calibration(calibration)?;
                info!(profile = %key, "calibration restored");
            }
            None => warn!(profile = %key, "no saved calibration, detecting from frames"),
        }
    }

    let stop = AtomicBool::new(false);
    let exit = session.run(&stop);
    info!(%exit, frames = session.sink().written, "session finished");

    eprintln!("{}", monitor.report());
    for warning in session.warnings() {
        eprintln!("warning: {warning}");
    }
    if let Some(e) = &session.sink().error {
        return Err(anyhow!("{e:#}"));
    }
    Ok(())
}
