//! Statistics and runtime performance tracking for tetrawatch.
//!
//! # Modules
//!
//! - [`descriptive`]: summary statistics over a dataset
//! - [`percentiles`]: nearest-rank percentiles
//! - [`monitor`]: per-stage latency recording, frame counters and reports
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use tetrawatch_stats::monitor::{PerformanceMonitor, Stage};
//!
//! let monitor = PerformanceMonitor::default();
//! monitor.record(Stage::Recognize, Duration::from_millis(4));
//! monitor.record(Stage::Recognize, Duration::from_millis(6));
//!
//! let report = monitor.report();
//! let recognize = report.stage(Stage::Recognize).unwrap();
//! assert_eq!(recognize.samples, 2);
//! assert!((recognize.stats.mean - 5.0).abs() < 1e-3);
//! ```

pub mod descriptive;
pub mod monitor;
pub mod percentiles;
