//! Per-stage latency tracking for the analysis pipeline.
//!
//! [`PerformanceMonitor`] is shared between the pipeline thread and any reporter
//! (`Arc<PerformanceMonitor>`). Each stage owns its own lock, so recording one stage never
//! contends with reading another.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::{descriptive::DescriptiveStats, percentiles::compute_percentile};

/// Default number of samples kept per stage.
pub const DEFAULT_HISTORY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Capture,
    Localize,
    Recognize,
    Reconstruct,
    Predict,
    Coach,
    /// Whole frame, capture to output.
    Frame,
}

impl Stage {
    pub const LEN: usize = 7;
    pub const ALL: [Self; Self::LEN] = [
        Self::Capture,
        Self::Localize,
        Self::Recognize,
        Self::Reconstruct,
        Self::Predict,
        Self::Coach,
        Self::Frame,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Localize => "localize",
            Self::Recognize => "recognize",
            Self::Reconstruct => "reconstruct",
            Self::Predict => "predict",
            Self::Coach => "coach",
            Self::Frame => "frame",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ring buffer of the most recent samples.
#[derive(Debug)]
struct MetricBuffer<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> MetricBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    stages: [Mutex<MetricBuffer<f32>>; Stage::LEN],
    frame_times: Mutex<MetricBuffer<Instant>>,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl PerformanceMonitor {
    /// Creates a monitor keeping the last `history` samples per stage.
    #[must_use]
    pub fn new(history: usize) -> Self {
        let history = history.max(1);
        Self {
            stages: std::array::from_fn(|_| Mutex::new(MetricBuffer::new(history))),
            frame_times: Mutex::new(MetricBuffer::new(history)),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record(&self, stage: Stage, duration: Duration) {
        let millis = duration.as_secs_f32() * 1000.0;
        lock(&self.stages[stage.index()]).push(millis);
    }

    /// Runs `f` and records its duration under `stage`.
    pub fn time<T>(&self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let _timer = self.start(stage);
        f()
    }

    /// Starts a timer that records under `stage` when dropped.
    #[must_use = "the timer records when dropped"]
    pub fn start(&self, stage: Stage) -> StageTimer<'_> {
        StageTimer {
            monitor: self,
            stage,
            started: Instant::now(),
        }
    }

    pub fn frame_processed(&self) {
        self.frame_processed_at(Instant::now());
    }

    /// Counts a processed frame completed at `at`; used for the FPS estimate.
    pub fn frame_processed_at(&self, at: Instant) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        lock(&self.frame_times).push(at);
    }

    pub fn frame_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn frames_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames per second over the recent completion timestamps.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn fps(&self) -> f32 {
        let times = lock(&self.frame_times);
        let (Some(first), Some(last)) = (times.samples.front(), times.samples.back()) else {
            return 0.0;
        };
        let span = last.duration_since(*first).as_secs_f32();
        if span <= 0.0 {
            return 0.0;
        }
        (times.samples.len() - 1) as f32 / span
    }

    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn report(&self) -> PerformanceReport {
        let stages = Stage::ALL
            .into_iter()
            .filter_map(|stage| {
                let mut samples = lock(&self.stages[stage.index()])
                    .samples
                    .iter()
                    .copied()
                    .collect::<Vec<_>>();
                samples.sort_by(f32::total_cmp);
                let stats = DescriptiveStats::from_sorted(&samples)?;
                Some(StageReport {
                    stage,
                    samples: samples.len(),
                    p95: compute_percentile(&samples, 95.0),
                    stats,
                })
            })
            .collect();

        let frames_processed = self.frames_processed();
        let frames_dropped = self.frames_dropped();
        let total = frames_processed + frames_dropped;
        let drop_rate = if total == 0 {
            0.0
        } else {
            frames_dropped as f32 / total as f32
        };
        let fps = self.fps();

        PerformanceReport {
            stages,
            fps,
            frames_processed,
            frames_dropped,
            drop_rate,
            rating: PerformanceRating::from_fps(fps),
        }
    }
}

/// Records the elapsed time of a stage when dropped.
#[derive(Debug)]
pub struct StageTimer<'a> {
    monitor: &'a PerformanceMonitor,
    stage: Stage,
    started: Instant,
}

impl StageTimer<'_> {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.stage, self.started.elapsed());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub samples: usize,
    /// Latency statistics in milliseconds.
    pub stats: DescriptiveStats,
    pub p95: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl PerformanceRating {
    #[must_use]
    pub fn from_fps(fps: f32) -> Self {
        match fps {
            f if f >= 30.0 => Self::Excellent,
            f if f >= 20.0 => Self::Good,
            f if f >= 10.0 => Self::Fair,
            _ => Self::Poor,
        }
    }
}

impl fmt::Display for PerformanceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub stages: Vec<StageReport>,
    pub fps: f32,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    /// Dropped frames over all frames seen, in `[0, 1]`.
    pub drop_rate: f32,
    pub rating: PerformanceRating,
}

impl PerformanceReport {
    /// Report for one stage; `None` if nothing was recorded for it.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "fps: {:.1} ({}), processed: {}, dropped: {} ({:.1}%)",
            self.fps,
            self.rating,
            self.frames_processed,
            self.frames_dropped,
            self.drop_rate * 100.0
        )?;
        for s in &self.stages {
            writeln!(
                f,
                "  {:<12} n={:<5} mean={:>7.2}ms p95={:>7.2}ms max={:>7.2}ms",
                s.stage, s.samples, s.stats.mean, s.p95, s.stats.max
            )?;
        }
        Ok(())
    }
}
