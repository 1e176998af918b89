//! Format-agnostic lazy frame sources.
//!
//! A data sequence is a list of paths whose files may be single-image
//! FITS files or video containers. [`frame_sequence`] merges both into
//! one lazy iterator of frames, opening each file only when its first
//! frame is pulled. Video decoding itself is external; callers supply an
//! opener for the [`VideoSource`] collaborator.

use crate::fits::FitsFile;
use crate::frame::Frame;
use crate::matrix::TypedMatrix;
use crate::reduction::{FrameResult, ReductionError};
use log::debug;
use std::iter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How to interpret the files of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// Pick a decoder per file by extension.
    #[default]
    Auto,
    Fits,
    Video,
}

impl FromStr for InputFormat {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(InputFormat::Auto),
            "fits" => Ok(InputFormat::Fits),
            "video" => Ok(InputFormat::Video),
            other => Err(ReductionError::UnknownFormat(other.to_string())),
        }
    }
}

/// External video decoder collaborator.
pub trait VideoSource {
    /// Number of frames in the container.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the source, yielding every frame in order.
    fn frames(self: Box<Self>) -> Box<dyn Iterator<Item = Result<TypedMatrix, ReductionError>>>;
}

/// Opener supplied when a sequence may contain video files. Use
/// [`no_video`] when it never does.
pub type VideoOpener = dyn Fn(&Path) -> Result<Box<dyn VideoSource>, ReductionError>;

/// Opener for sequences that must not contain video files.
pub fn no_video(path: &Path) -> Result<Box<dyn VideoSource>, ReductionError> {
    Err(ReductionError::Video(format!(
        "no video decoder available for {}",
        path.display()
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Fits,
    Video,
}

fn classify(path: &Path, format: InputFormat) -> Result<FileKind, ReductionError> {
    match format {
        InputFormat::Fits => Ok(FileKind::Fits),
        InputFormat::Video => Ok(FileKind::Video),
        InputFormat::Auto => {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase());
            match ext.as_deref() {
                Some("fits" | "fts" | "fit") => Ok(FileKind::Fits),
                Some("avi") => Ok(FileKind::Video),
                _ => Err(ReductionError::UnknownExtension(path.to_path_buf())),
            }
        }
    }
}

fn load_fits_frame(path: &Path) -> FrameResult {
    let file = FitsFile::open(path)?;
    Ok(Frame::from_typed(file.data()))
}

/// Lazy frame sequence over a list of files.
///
/// Each path contributes one frame (FITS) or all its frames (video), in
/// path order. Nothing is opened until the consumer pulls; a
/// classification or open failure becomes the single item for that path
/// and aborts downstream aggregation.
pub fn frame_sequence<'a, F>(
    paths: &'a [PathBuf],
    format: InputFormat,
    opener: &'a F,
) -> impl Iterator<Item = FrameResult> + 'a
where
    F: Fn(&Path) -> Result<Box<dyn VideoSource>, ReductionError> + ?Sized,
{
    paths.iter().flat_map(move |path| {
        let iter: Box<dyn Iterator<Item = FrameResult>> = match classify(path, format) {
            Ok(FileKind::Fits) => {
                let path = path.clone();
                Box::new(iter::once_with(move || {
                    debug!("loading frame from {}", path.display());
                    load_fits_frame(&path)
                }))
            }
            Ok(FileKind::Video) => match opener(path) {
                Ok(source) => Box::new(
                    source
                        .frames()
                        .map(|item| item.map(|m| Frame::from_typed(&m))),
                ),
                Err(e) => Box::new(iter::once(Err(e))),
            },
            Err(e) => Box::new(iter::once(Err(e))),
        };
        iter
    })
}

/// Total frame count of a sequence without decoding any pixels. FITS
/// files count one frame each; video files report their own length.
pub fn sequence_length<F>(
    paths: &[PathBuf],
    format: InputFormat,
    opener: &F,
) -> Result<usize, ReductionError>
where
    F: Fn(&Path) -> Result<Box<dyn VideoSource>, ReductionError> + ?Sized,
{
    let mut total = 0usize;
    for path in paths {
        total += match classify(path, format)? {
            FileKind::Fits => 1,
            FileKind::Video => opener(path)?.len(),
        };
    }
    Ok(total)
}
