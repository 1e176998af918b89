//! Master calibration frames and lazy frame correction.
//!
//! Every sequence is an iterator of `Result<Frame, ReductionError>`:
//! decode failures travel down the chain as items and the first `Err`
//! aborts whatever consumes the sequence. Aggregations (`sequence_sum`,
//! `sequence_mean`, the master builders) force the whole input; the
//! correction adapters (`debias`, `deflat`, `reduct`, the two-reference
//! variants) are lazy and pull one upstream frame per output frame, so a
//! fully chained reduction holds only a few frames in memory at a time.

use crate::fits::FitsError;
use crate::frame::Frame;
use crate::matrix::MatrixError;
use log::debug;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReductionError {
    /// An aggregation needs at least one frame to size its accumulator.
    #[error("empty frame sequence")]
    EmptySequence,

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error("no decoder for file extension: {0}")]
    UnknownExtension(PathBuf),

    #[error("unknown input format {0:?}")]
    UnknownFormat(String),

    #[error("video source error: {0}")]
    Video(String),
}

/// One item of a frame sequence.
pub type FrameResult = Result<Frame, ReductionError>;

fn sum_with<I, F>(seq: I, mut hook: F) -> Result<(Frame, usize), ReductionError>
where
    I: IntoIterator<Item = FrameResult>,
    F: FnMut(&Frame),
{
    let mut iter = seq.into_iter();
    let mut acc = iter.next().ok_or(ReductionError::EmptySequence)??;
    hook(&acc);
    let mut count = 1usize;
    for item in iter {
        let frame = item?;
        hook(&frame);
        acc.add(&frame)?;
        count += 1;
    }
    Ok((acc, count))
}

/// Element-wise sum of every frame. Forces full consumption.
pub fn sequence_sum<I>(seq: I) -> FrameResult
where
    I: IntoIterator<Item = FrameResult>,
{
    Ok(sum_with(seq, |_| {})?.0)
}

/// Element-wise mean of every frame. Forces full consumption.
pub fn sequence_mean<I>(seq: I) -> FrameResult
where
    I: IntoIterator<Item = FrameResult>,
{
    sequence_mean_with(seq, |_| {})
}

/// Mean with a per-raw-frame hook, called on each frame before it is
/// accumulated. Used to show every calibration source frame while a
/// master is being built.
pub fn sequence_mean_with<I, F>(seq: I, hook: F) -> FrameResult
where
    I: IntoIterator<Item = FrameResult>,
    F: FnMut(&Frame),
{
    let (mut acc, count) = sum_with(seq, hook)?;
    acc.divide_scalar(count as f32);
    debug!("sequence mean over {count} frames");
    Ok(acc)
}

/// Scale an image so its mean element value is 1. Non-mutating.
pub fn norm_image(img: &Frame) -> Frame {
    img / img.mean()
}

/// Master bias (or dark): the mean of the calibration sequence.
pub fn master_bias<I>(seq: I) -> FrameResult
where
    I: IntoIterator<Item = FrameResult>,
{
    sequence_mean(seq)
}

/// Master flat from a flat sequence and a precomputed master bias:
/// mean, debias, normalize to unit mean.
pub fn master_flat<I>(flat_seq: I, bias: &Frame) -> FrameResult
where
    I: IntoIterator<Item = FrameResult>,
{
    let mut mean = sequence_mean(flat_seq)?;
    mean.subtract(bias)?;
    Ok(norm_image(&mean))
}

/// Master flat computing its own master bias first.
pub fn master_flat_debiased<I, J>(flat_seq: I, bias_seq: J) -> FrameResult
where
    I: IntoIterator<Item = FrameResult>,
    J: IntoIterator<Item = FrameResult>,
{
    let bias = master_bias(bias_seq)?;
    master_flat(flat_seq, &bias)
}

/// Master flat without bias correction. Normalizing the sum gives the
/// same result as normalizing the mean, one scalar pass cheaper.
pub fn master_flat_plain<I>(flat_seq: I) -> FrameResult
where
    I: IntoIterator<Item = FrameResult>,
{
    let sum = sequence_sum(flat_seq)?;
    Ok(norm_image(&sum))
}

/// Lazily subtract a master frame from every frame of `seq`.
pub fn debias<I>(seq: I, master: Frame) -> impl Iterator<Item = FrameResult>
where
    I: IntoIterator<Item = FrameResult>,
{
    seq.into_iter().map(move |item| {
        let mut frame = item?;
        frame.subtract(&master)?;
        Ok(frame)
    })
}

/// Lazily divide every frame of `seq` by a master flat.
pub fn deflat<I>(seq: I, master: Frame) -> impl Iterator<Item = FrameResult>
where
    I: IntoIterator<Item = FrameResult>,
{
    seq.into_iter().map(move |item| {
        let mut frame = item?;
        frame.divide(&master)?;
        Ok(frame)
    })
}

/// Lazily apply `(x - bias) / flat` to every frame of `seq`.
pub fn reduct<I>(seq: I, bias: Frame, flat: Frame) -> impl Iterator<Item = FrameResult>
where
    I: IntoIterator<Item = FrameResult>,
{
    seq.into_iter().map(move |item| {
        let mut frame = item?;
        frame.subtract(&bias)?;
        frame.divide(&flat)?;
        Ok(frame)
    })
}

/// Interpolation weight for frame `n` of a `length`-frame sequence.
///
/// A single frame (or an unknown length) gets the fixed 50/50 blend;
/// otherwise the weight runs linearly from 0 on the first frame to 1 on
/// the last, so the blend reaches exactly the second reference.
fn blend_weight(n: usize, length: usize) -> f32 {
    if length <= 1 {
        0.5
    } else {
        n as f32 / (length - 1) as f32
    }
}

/// `ref2 * c + ref1 * (1 - c)`.
fn blend_references(ref1: &Frame, ref2: &Frame, c: f32) -> Result<Frame, MatrixError> {
    let mut out = ref2.clone();
    out.multiply_scalar(c);
    let mut rest = ref1.clone();
    rest.multiply_scalar(1.0 - c);
    out.add(&rest)?;
    Ok(out)
}

/// Two-reference debias: subtract a per-frame blend of two master darks
/// that bracket the sequence, modeling linear instrument drift.
///
/// `length` must be the true number of frames in `seq`. The blended
/// reference is computed fresh for every frame.
pub fn debias2<I>(
    seq: I,
    length: usize,
    ref1: Frame,
    ref2: Frame,
) -> impl Iterator<Item = FrameResult>
where
    I: IntoIterator<Item = FrameResult>,
{
    seq.into_iter().enumerate().map(move |(n, item)| {
        let mut frame = item?;
        let blended = blend_references(&ref1, &ref2, blend_weight(n, length))?;
        frame.subtract(&blended)?;
        Ok(frame)
    })
}

/// Two-reference deflat: divide by a per-frame blend of two master
/// flats.
pub fn deflat2<I>(
    seq: I,
    length: usize,
    ref1: Frame,
    ref2: Frame,
) -> impl Iterator<Item = FrameResult>
where
    I: IntoIterator<Item = FrameResult>,
{
    seq.into_iter().enumerate().map(move |(n, item)| {
        let mut frame = item?;
        let blended = blend_references(&ref1, &ref2, blend_weight(n, length))?;
        frame.divide(&blended)?;
        Ok(frame)
    })
}

/// Dark correction resolved for one sequence role.
#[derive(Debug, Clone)]
pub enum DarkFrames {
    /// No correction; the sequence passes through unchanged.
    None,
    /// One master dark, subtracted uniformly.
    Single(Frame),
    /// Two master darks bracketing the sequence, blended per frame.
    Bracketed(Frame, Frame),
}

/// Apply a resolved dark correction to a sequence. `length` is only
/// consulted for the bracketed blend.
pub fn apply_dark<'a, I>(
    seq: I,
    length: usize,
    darks: DarkFrames,
) -> Box<dyn Iterator<Item = FrameResult> + 'a>
where
    I: IntoIterator<Item = FrameResult> + 'a,
{
    match darks {
        DarkFrames::None => Box::new(seq.into_iter()),
        DarkFrames::Single(master) => Box::new(debias(seq, master)),
        DarkFrames::Bracketed(first, second) => Box::new(debias2(seq, length, first, second)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DataMatrix;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    fn constant(dims: &[usize], v: f32) -> Frame {
        let size: usize = dims.iter().product();
        Frame::from_matrix(DataMatrix::from_vec(dims, vec![v; size]).unwrap())
    }

    fn seq(frames: Vec<Frame>) -> Vec<FrameResult> {
        frames.into_iter().map(Ok).collect()
    }

    #[test]
    fn test_master_bias_of_constant_frames() {
        let frames = seq(vec![
            constant(&[2, 2], 10.0),
            constant(&[2, 2], 20.0),
            constant(&[2, 2], 30.0),
        ]);
        let master = master_bias(frames).unwrap();
        for &v in master.data() {
            assert_relative_eq!(v, 20.0);
        }
    }

    #[test]
    fn test_empty_sequence_fails() {
        assert_eq!(
            sequence_mean(Vec::new()).unwrap_err(),
            ReductionError::EmptySequence
        );
        assert_eq!(
            sequence_sum(Vec::new()).unwrap_err(),
            ReductionError::EmptySequence
        );
    }

    #[test]
    fn test_dimension_drift_fails() {
        let frames = seq(vec![constant(&[2, 2], 1.0), constant(&[3, 2], 1.0)]);
        assert_eq!(
            sequence_sum(frames).unwrap_err(),
            ReductionError::Matrix(MatrixError::DimensionMismatch)
        );
    }

    #[test]
    fn test_error_item_aborts_aggregation() {
        let frames = vec![
            Ok(constant(&[2], 1.0)),
            Err(ReductionError::EmptySequence),
            Ok(constant(&[2], 3.0)),
        ];
        assert!(sequence_mean(frames).is_err());
    }

    #[test]
    fn test_mean_hook_sees_every_raw_frame() {
        let frames = seq(vec![constant(&[2], 1.0), constant(&[2], 3.0)]);
        let mut seen = Vec::new();
        let mean = sequence_mean_with(frames, |f| seen.push(f.data()[0])).unwrap();
        assert_eq!(seen, vec![1.0, 3.0]);
        assert_relative_eq!(mean.data()[0], 2.0);
    }

    #[test]
    fn test_norm_image_mean_is_one() {
        let img = Frame::from_matrix(
            DataMatrix::from_vec(&[4], vec![1.0, 2.0, 3.0, 10.0]).unwrap(),
        );
        let normed = norm_image(&img);
        assert_relative_eq!(normed.mean(), 1.0, max_relative = 1e-6);
        // Source untouched.
        assert_eq!(img.data(), &[1.0, 2.0, 3.0, 10.0]);
    }

    #[test]
    fn test_master_flat_is_normalized() {
        let flats = seq(vec![constant(&[2], 200.0), constant(&[2], 400.0)]);
        let bias = constant(&[2], 100.0);
        let flat = master_flat(flats, &bias).unwrap();
        assert_relative_eq!(flat.mean(), 1.0, max_relative = 1e-6);
    }

    #[test]
    fn test_master_flat_plain_matches_mean_normalization() {
        let frames = vec![constant(&[2], 100.0), constant(&[2], 300.0)];
        let via_sum = master_flat_plain(seq(frames.clone())).unwrap();
        let via_mean = norm_image(&sequence_mean(seq(frames)).unwrap());
        for (a, b) in via_sum.data().iter().zip(via_mean.data()) {
            assert_relative_eq!(a, b, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_debias_subtracts_master() {
        let master = constant(&[2], 5.0);
        let out: Vec<_> = debias(seq(vec![constant(&[2], 12.0)]), master)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out[0].data(), &[7.0, 7.0]);
    }

    #[test]
    fn test_reduct_applies_bias_then_flat() {
        let bias = constant(&[2], 2.0);
        let flat = constant(&[2], 4.0);
        let out: Vec<_> = reduct(seq(vec![constant(&[2], 10.0)]), bias, flat)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out[0].data(), &[2.0, 2.0]);
    }

    #[test]
    fn test_debias2_length_one_uses_half_blend() {
        let r1 = constant(&[1, 1], 2.0);
        let r2 = constant(&[1, 1], 4.0);
        let out: Vec<_> = debias2(seq(vec![constant(&[1, 1], 10.0)]), 1, r1, r2)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_relative_eq!(out[0].data()[0], 10.0 - 3.0);
    }

    #[test]
    fn test_debias2_endpoints_hit_each_reference() {
        let r1 = constant(&[1], 10.0);
        let r2 = constant(&[1], 30.0);
        let data = seq(vec![
            constant(&[1], 100.0),
            constant(&[1], 100.0),
            constant(&[1], 100.0),
        ]);
        let out: Vec<_> = debias2(data, 3, r1, r2).collect::<Result<_, _>>().unwrap();
        // Weights 0, 0.5, 1: blends 10, 20, 30.
        assert_relative_eq!(out[0].data()[0], 90.0);
        assert_relative_eq!(out[1].data()[0], 80.0);
        assert_relative_eq!(out[2].data()[0], 70.0);
    }

    #[test]
    fn test_deflat2_divides_by_blend() {
        let r1 = constant(&[1], 1.0);
        let r2 = constant(&[1], 3.0);
        let data = seq(vec![constant(&[1], 12.0), constant(&[1], 12.0)]);
        let out: Vec<_> = deflat2(data, 2, r1, r2).collect::<Result<_, _>>().unwrap();
        assert_relative_eq!(out[0].data()[0], 12.0);
        assert_relative_eq!(out[1].data()[0], 4.0);
    }

    #[test]
    fn test_adapters_are_lazy() {
        let pulled = Cell::new(0usize);
        let source = (0..100).map(|_| {
            pulled.set(pulled.get() + 1);
            Ok(constant(&[2], 1.0))
        });
        let mut chain = deflat(debias(source, constant(&[2], 0.5)), constant(&[2], 2.0));
        assert_eq!(pulled.get(), 0);
        let first = chain.next().unwrap().unwrap();
        assert_eq!(pulled.get(), 1);
        assert_eq!(first.data(), &[0.25, 0.25]);
    }

    #[test]
    fn test_apply_dark_variants() {
        let data = || seq(vec![constant(&[1], 10.0), constant(&[1], 10.0)]);

        let none: Vec<_> = apply_dark(data(), 2, DarkFrames::None)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(none[0].data(), &[10.0]);

        let single: Vec<_> = apply_dark(data(), 2, DarkFrames::Single(constant(&[1], 4.0)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(single[0].data(), &[6.0]);

        let bracketed: Vec<_> = apply_dark(
            data(),
            2,
            DarkFrames::Bracketed(constant(&[1], 2.0), constant(&[1], 6.0)),
        )
        .collect::<Result<_, _>>()
        .unwrap();
        assert_relative_eq!(bracketed[0].data()[0], 8.0);
        assert_relative_eq!(bracketed[1].data()[0], 4.0);
    }

    // The boxed adapter must accept sources that borrow local data, not
    // just owned 'static iterators.
    #[test]
    fn test_apply_dark_over_borrowed_source() {
        let values = vec![3.0f32, 7.0];
        let source = values.iter().map(|&v| Ok(constant(&[1], v)));
        let out: Vec<_> = apply_dark(source, 2, DarkFrames::Single(constant(&[1], 1.0)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out[0].data(), &[2.0]);
        assert_eq!(out[1].data(), &[6.0]);
    }
}
