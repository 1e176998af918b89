//! End-to-end reduction over on-disk FITS fixtures.

use astrored::config::{ConfigFile, DarkCorrection, RunConfig};
use astrored::photometry::{MaxStarTracker, StarTracker, ThreeRingAperture, Vec2};
use astrored::reduction::{
    apply_dark, deflat, master_bias, master_flat, DarkFrames, ReductionError,
};
use astrored::sequence::{frame_sequence, no_video, sequence_length, InputFormat};
use approx::assert_relative_eq;
use std::fs;
use std::path::{Path, PathBuf};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write a rank-2 BITPIX=16 file: one 2880-byte header block followed by
/// the big-endian payload.
fn write_i16_fits(path: &Path, width: usize, height: usize, values: &[i16]) {
    assert_eq!(values.len(), width * height);
    let cards = [
        ("SIMPLE", "T".to_string()),
        ("BITPIX", "16".to_string()),
        ("NAXIS", "2".to_string()),
        ("NAXIS1", width.to_string()),
        ("NAXIS2", height.to_string()),
    ];
    let mut bytes = Vec::with_capacity(2880 + values.len() * 2);
    for (keyword, value) in &cards {
        bytes.extend_from_slice(format!("{keyword:<8}= {value:>20}").as_bytes());
        bytes.extend_from_slice(&[b' '; 50]);
    }
    bytes.extend_from_slice(b"END");
    bytes.resize(2880, b' ');
    for v in values {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    fs::write(path, bytes).unwrap();
}

fn write_constant(path: &Path, width: usize, height: usize, value: i16) {
    write_i16_fits(path, width, height, &vec![value; width * height]);
}

/// Constant scene with one bright star, plus a constant dark offset.
fn write_star_frame(path: &Path, width: usize, height: usize, bg: i16, star: (usize, usize, i16)) {
    let (sx, sy, sv) = star;
    let mut values = vec![bg; width * height];
    values[sy * width + sx] = sv;
    write_i16_fits(path, width, height, &values);
}

#[test]
fn test_reduce_then_measure() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let at = |name: &str| dir.path().join(name);

    // Two raw darks at 5 counts, two raw flats at 200 (flat field is
    // perfectly uniform, so the master flat normalizes to 1 everywhere).
    for n in 1..=2 {
        write_constant(&at(&format!("dark{n}.fits")), 17, 17, 5);
        write_constant(&at(&format!("flat{n}.fits")), 17, 17, 200);
    }
    // Three raw data frames: scene of 20 counts with a 520-count star at
    // (8, 8), plus the 5-count dark offset.
    let data_paths: Vec<PathBuf> = (1..=3)
        .map(|n| {
            let path = at(&format!("data{n}.fits"));
            write_star_frame(&path, 17, 17, 25, (8, 8, 525));
            path
        })
        .collect();

    let dark_paths = vec![at("dark1.fits"), at("dark2.fits")];
    let flat_paths = vec![at("flat1.fits"), at("flat2.fits")];

    let bias = master_bias(frame_sequence(&dark_paths, InputFormat::Auto, &no_video)).unwrap();
    assert_relative_eq!(bias.data()[0], 5.0);

    let flat = master_flat(
        frame_sequence(&flat_paths, InputFormat::Auto, &no_video),
        &bias,
    )
    .unwrap();
    assert_relative_eq!(flat.mean(), 1.0, max_relative = 1e-6);

    let length = sequence_length(&data_paths, InputFormat::Auto, &no_video).unwrap();
    assert_eq!(length, 3);

    let data = frame_sequence(&data_paths, InputFormat::Auto, &no_video);
    let corrected = deflat(
        apply_dark(data, length, DarkFrames::Single(bias)),
        flat,
    );

    let mut tracker = MaxStarTracker::new(Vec2::new(7.0, 7.0), 3, true);
    let aperture = ThreeRingAperture::new(1.2, 3.0, 5.0).unwrap();

    let mut magnitudes = Vec::new();
    for item in corrected {
        let frame = item.unwrap();
        let pos = tracker.track(&frame).unwrap();
        assert_eq!(pos, Vec2::new(8.0, 8.0));
        let result = aperture.measure(&frame, pos).unwrap();
        assert_relative_eq!(result.background, 20.0, max_relative = 1e-5);
        // Signal circle holds the star pixel plus its four neighbors.
        assert_eq!(result.signal_pixels, 5);
        assert_relative_eq!(result.signal(), 100.0, max_relative = 1e-4);
        magnitudes.push(result.magnitude());
    }
    assert_eq!(magnitudes.len(), 3);
    for m in magnitudes {
        assert_relative_eq!(m, -5.0, max_relative = 1e-4);
    }
}

#[test]
fn test_bracketed_dark_drifts_linearly() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let at = |name: &str| dir.path().join(name);

    write_constant(&at("dark_a.fits"), 4, 4, 2);
    write_constant(&at("dark_b.fits"), 4, 4, 6);
    let data_paths: Vec<PathBuf> = (1..=3)
        .map(|n| {
            let path = at(&format!("d{n}.fits"));
            write_constant(&path, 4, 4, 100);
            path
        })
        .collect();

    let first = master_bias(frame_sequence(
        &[at("dark_a.fits")],
        InputFormat::Auto,
        &no_video,
    ))
    .unwrap();
    let second = master_bias(frame_sequence(
        &[at("dark_b.fits")],
        InputFormat::Auto,
        &no_video,
    ))
    .unwrap();

    let data = frame_sequence(&data_paths, InputFormat::Auto, &no_video);
    let out: Vec<_> = apply_dark(data, 3, DarkFrames::Bracketed(first, second))
        .collect::<Result<_, _>>()
        .unwrap();

    // Blend runs 2, 4, 6 across the three frames.
    assert_relative_eq!(out[0].data()[0], 98.0);
    assert_relative_eq!(out[1].data()[0], 96.0);
    assert_relative_eq!(out[2].data()[0], 94.0);
}

#[test]
fn test_corrupt_file_aborts_aggregation() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.fits");
    let bad = dir.path().join("bad.fits");
    write_constant(&good, 4, 4, 10);
    fs::write(&bad, b"not a header").unwrap();

    let paths = vec![good, bad];
    let err = master_bias(frame_sequence(&paths, InputFormat::Auto, &no_video)).unwrap_err();
    assert!(matches!(err, ReductionError::Fits(_)));
}

#[test]
fn test_run_config_over_real_files() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    for n in 1..=3 {
        write_constant(&dir.path().join(format!("img{n}.fits")), 4, 4, n as i16);
    }

    let text = format!(
        "Data = {}/img*.fits\nUseDark = False\nObjects = 0\n",
        dir.path().display()
    );
    let run = RunConfig::from_file(&ConfigFile::parse(&text).unwrap()).unwrap();
    assert_eq!(run.data_paths.len(), 3);
    assert_eq!(run.dark, DarkCorrection::None);

    let mean = master_bias(frame_sequence(
        &run.data_paths,
        run.input_format,
        &no_video,
    ))
    .unwrap();
    assert_relative_eq!(mean.data()[0], 2.0);
}
