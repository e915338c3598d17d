//! The frame-to-advice pipeline.
//!
//! A [`Session`] owns every stage and drives them once per captured frame:
//!
//! 1. capture from a [`FrameSource`](tetrawatch_vision::source::FrameSource)
//! 2. localize the playfield and recognize its cells
//! 3. reconstruct the game state
//! 4. rank placements (only when the state changed) and generate coaching hints
//! 5. hand a [`FrameOutput`] to the [`FrameSink`]
//!
//! Frames that are already older than the frame budget, or that used it up during
//! perception, are dropped unless [`FrameDropPolicy::ProcessAll`] is configured.
//!
//! Configuration is validated once in [`Session::new`]; an invalid [`SessionConfig`] never
//! processes a frame.

pub use self::{
    config::{ConfigError, FrameDropPolicy, PipelineConfig, SessionConfig},
    session::{FrameOutput, FrameStatus, RunExit, Session, SessionWarning},
    sink::FrameSink,
    store::{
        CalibrationStore, KeyValueStore, MemoryStore, ParseProfileKeyError, ProfileKey,
        StoreError,
    },
    worker::PredictionWorker,
};

mod config;
mod session;
mod sink;
mod store;
mod worker;
