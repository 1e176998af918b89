//! Config-driven reduction and photometry driver.
//!
//! Reads a run configuration, builds the calibration masters it asks
//! for, streams the data sequence through dark and flat correction, and
//! measures every configured object on every calibrated frame. Results
//! go to a tab-separated table and optionally a JSON report.

use anyhow::{Context, Result};
use astrored::config::{DarkCorrection, RunConfig};
use astrored::display::{FrameDisplay, LogDisplay, NullDisplay};
use astrored::photometry::{
    MaxStarTracker, PhotometryResult, StarTracker, ThreeRingAperture, Vec2,
};
use astrored::reduction::{
    self, apply_dark, deflat, deflat2, norm_image, DarkFrames, FrameResult,
};
use astrored::sequence::{frame_sequence, no_video, sequence_length};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser)]
#[command(about = "Calibrate an image sequence and measure configured objects")]
struct Args {
    /// Run configuration file.
    config: PathBuf,

    /// Write a JSON report next to the text results.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct FrameReport {
    index: usize,
    measurements: Vec<Option<PhotometryResult>>,
}

#[derive(Serialize)]
struct RunReport {
    frames: Vec<FrameReport>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = RunConfig::open(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;

    let mut display: Box<dyn FrameDisplay> = if config.show_frames {
        Box::new(LogDisplay)
    } else {
        Box::new(NullDisplay)
    };

    let length = sequence_length(&config.data_paths, config.input_format, &no_video)
        .context("counting data frames")?;
    info!("data sequence: {} files, {length} frames", config.data_paths.len());

    let darks = resolve_darks(&config, &config.dark, display.as_mut())
        .context("building master dark")?;
    let data = frame_sequence(&config.data_paths, config.input_format, &no_video);
    let mut corrected: Box<dyn Iterator<Item = FrameResult> + '_> =
        apply_dark(data, length, darks);

    if let Some(flat_cfg) = &config.flat {
        let master = master_flat_for(&config, &flat_cfg.paths, &flat_cfg.dark, display.as_mut())
            .context("building master flat")?;
        display.show_frame(&master, "master flat");
        display.wait(config.wait);

        corrected = match &flat_cfg.second {
            Some((paths, dark)) => {
                let master2 = master_flat_for(&config, paths, dark, display.as_mut())
                    .context("building second master flat")?;
                display.show_frame(&master2, "master flat 2");
                display.wait(config.wait);
                Box::new(deflat2(corrected, length, master, master2))
            }
            None => Box::new(deflat(corrected, master)),
        };
    }

    let aperture = {
        let (r1, r2, r3) = config.apertures;
        ThreeRingAperture::new(r1, r2, r3).context("aperture configuration")?
    };
    let trackers = build_trackers(&config);
    if trackers.is_empty() {
        info!("no objects configured; reducing without photometry");
    }

    let mut frames = Vec::new();
    for (index, item) in corrected.enumerate() {
        let frame = item.with_context(|| format!("frame {index}"))?;
        if config.show_frames {
            display.show_frame(&frame, &format!("frame {index}"));
            display.wait(config.wait);
        }

        let mut measurements = Vec::with_capacity(trackers.len());
        for (obj, tracker) in trackers.iter().enumerate() {
            let measured = tracker
                .borrow_mut()
                .track(&frame)
                .and_then(|pos| aperture.measure(&frame, pos));
            match measured {
                Ok(result) => {
                    display.attach_marker(result.position.x, result.position.y);
                    measurements.push(Some(result));
                }
                Err(e) => {
                    warn!("frame {index}, object {}: {e}", obj + 1);
                    measurements.push(None);
                }
            }
        }
        frames.push(FrameReport {
            index,
            measurements,
        });
    }

    write_table(&config.output_path, &frames)
        .with_context(|| format!("writing {}", config.output_path.display()))?;
    info!("results written to {}", config.output_path.display());

    if let Some(json_path) = &args.json {
        let file = File::create(json_path)
            .with_context(|| format!("writing {}", json_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &RunReport { frames })?;
        info!("report written to {}", json_path.display());
    }

    Ok(())
}

/// Mean of a sequence, showing every source frame when the run asks for
/// it.
fn mean_with_show<I>(
    config: &RunConfig,
    seq: I,
    display: &mut dyn FrameDisplay,
    caption: &str,
) -> Result<astrored::Frame>
where
    I: IntoIterator<Item = FrameResult>,
{
    let master = if config.show_calibration_source {
        reduction::sequence_mean_with(seq, |frame| {
            display.show_frame(frame, caption);
            display.wait(config.wait);
        })?
    } else {
        reduction::sequence_mean(seq)?
    };
    Ok(master)
}

/// Build the master dark(s) one correction role asks for.
fn resolve_darks(
    config: &RunConfig,
    correction: &DarkCorrection,
    display: &mut dyn FrameDisplay,
) -> Result<DarkFrames> {
    let master = |paths: &[PathBuf], display: &mut dyn FrameDisplay| {
        let seq = frame_sequence(paths, config.input_format, &no_video);
        mean_with_show(config, seq, display, "calibration source")
    };

    Ok(match correction {
        DarkCorrection::None => DarkFrames::None,
        DarkCorrection::Single { paths } => DarkFrames::Single(master(paths, display)?),
        DarkCorrection::Bracketed { first, second } => {
            DarkFrames::Bracketed(master(first, display)?, master(second, display)?)
        }
    })
}

/// Master flat for one flat sequence: dark-correct the raw flats, then
/// normalize their mean to unit mean.
fn master_flat_for(
    config: &RunConfig,
    paths: &[PathBuf],
    dark: &DarkCorrection,
    display: &mut dyn FrameDisplay,
) -> Result<astrored::Frame> {
    let flat_length = sequence_length(paths, config.input_format, &no_video)?;
    let darks = resolve_darks(config, dark, display)?;
    let raw = frame_sequence(paths, config.input_format, &no_video);
    let corrected = apply_dark(raw, flat_length, darks);
    let mean = mean_with_show(config, corrected, display, "flat source")?;
    Ok(norm_image(&mean))
}

/// First object is the reference; the rest hold their offset to it.
fn build_trackers(config: &RunConfig) -> Vec<Rc<RefCell<MaxStarTracker>>> {
    let mut trackers: Vec<Rc<RefCell<MaxStarTracker>>> = Vec::new();
    for obj in &config.objects {
        let start = Vec2::new(obj.x, obj.y);
        let tracker = match trackers.first() {
            None => MaxStarTracker::new(start, config.tolerance, obj.movable),
            Some(reference) => MaxStarTracker::with_reference(
                start,
                Rc::clone(reference),
                config.tolerance,
                obj.movable,
            ),
        };
        trackers.push(Rc::new(RefCell::new(tracker)));
    }
    trackers
}

/// One line per frame: index, then per-object magnitude, tab-separated.
/// Failed measurements print as a dash run so columns stay aligned.
fn write_table(path: &PathBuf, frames: &[FrameReport]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for frame in frames {
        write!(out, "{}", frame.index)?;
        for m in &frame.measurements {
            match m {
                Some(result) => write!(out, "\t{:.4}", result.magnitude())?,
                None => write!(out, "\t---------")?,
            }
        }
        writeln!(out)?;
    }
    out.flush()
}
