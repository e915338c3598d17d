use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use tetrawatch_pipeline::{CalibrationStore, ProfileKey};
use tetrawatch_vision::{frame::Frame, localizer::BoardLocalizer};
use tracing::info;

use crate::{store::DirStore, util};

#[derive(Default, Debug, Clone, clap::Args)]
pub struct CalibrateArg {
    /// Screenshot of the game to detect the playfield in
    #[arg(long)]
    frame: PathBuf,
    /// Profile to save the calibration under, as `device/game`
    #[arg(long)]
    profile: String,
    /// Directory holding saved calibrations
    #[arg(long, default_value = "./data/calibrations/")]
    store: PathBuf,
    /// Session configuration file (defaults if omitted)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CalibrationMode {
    /// List the saved profiles
    List {
        /// Directory holding saved calibrations
        #[arg(long, default_value = "./data/calibrations/")]
        store: PathBuf,
    },
}

pub fn run(arg: &CalibrateArg) -> anyhow::Result<()> {
    let CalibrateArg {
        frame,
        profile,
        store,
        config,
    } = arg;
    let key: ProfileKey = profile.parse()?;
    let config = util::load_config(config.as_deref())?;
    config.validate()?;

    let image = image::open(frame)
        .with_context(|| format!("Failed to open frame image: {}", frame.display()))?
        .into_rgb8();
    let frame = Frame::from_rgb_image(&image, 0)?;

    let mut localizer = BoardLocalizer::new(config.localizer);
    let located = localizer
        .locate(&frame)
        .context("Failed to locate the playfield")?;
    let calibration = located.calibration.as_ref();

    let mut calibrations = CalibrationStore::new(DirStore::new(store));
    calibrations.save(&key, calibration)?;
    info!(profile = %key, confidence = calibration.confidence, "calibration saved");
    eprintln!(
        "{key}: {}x{} cells of {}x{} px at ({}, {}), confidence {:.2}",
        calibration.columns,
        calibration.rows,
        calibration.cell_width,
        calibration.cell_height,
        calibration.origin_x,
        calibration.origin_y,
        calibration.confidence,
    );
    Ok(())
}

pub fn run_calibration(mode: &CalibrationMode) -> anyhow::Result<()> {
    match mode {
        CalibrationMode::List { store } => {
            let calibrations = CalibrationStore::new(DirStore::new(store));
            for key in calibrations.profiles()? {
                println!("{key}");
            }
        }
    }
    Ok(())
}
