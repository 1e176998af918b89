//! Star tracking and three-ring aperture photometry.
//!
//! Trackers keep a star's position current across a sequence of
//! calibrated frames; the aperture then integrates a signal circle and a
//! background annulus around that position and turns the difference into
//! an instrumental magnitude.

use crate::frame::Frame;
use log::debug;
use serde::Serialize;
use std::cell::RefCell;
use std::ops::{Add, Sub};
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhotometryError {
    #[error("frame is not two-dimensional")]
    NotTwoDimensional,

    /// The brightest pixel landed on the search box edge, so the true
    /// maximum is likely outside the tolerance.
    #[error("star escaped the search box at ({x:.1}, {y:.1})")]
    StarEscaped { x: f32, y: f32 },

    #[error("measurement region at ({x:.1}, {y:.1}) falls outside the image")]
    OutOfImage { x: f32, y: f32 },

    #[error("aperture radii must satisfy 0 < r1 <= r2 <= r3")]
    InvalidRadii,
}

/// Image-plane position or offset, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Keeps one star's position current across frames.
pub trait StarTracker {
    /// Last known position.
    fn position(&self) -> Vec2;

    /// Locate the star on `frame` and update the position.
    fn track(&mut self, frame: &Frame) -> Result<Vec2, PhotometryError>;
}

/// Brightest-pixel tracker.
///
/// Searches a square box of half-width `tolerance` around the expected
/// position. A star may be anchored to a reference tracker, in which
/// case the expected position is the reference's current position plus a
/// fixed offset; fixed (non-movable) stars take that offset position
/// directly without searching.
pub struct MaxStarTracker {
    position: Vec2,
    tolerance: usize,
    movable: bool,
    reference: Option<(Rc<RefCell<MaxStarTracker>>, Vec2)>,
}

impl MaxStarTracker {
    pub fn new(start: Vec2, tolerance: usize, movable: bool) -> Self {
        Self {
            position: start,
            tolerance,
            movable,
            reference: None,
        }
    }

    /// Anchor to a reference tracker; the offset is fixed at the current
    /// distance between the two stars.
    pub fn with_reference(
        start: Vec2,
        reference: Rc<RefCell<MaxStarTracker>>,
        tolerance: usize,
        movable: bool,
    ) -> Self {
        let offset = start - reference.borrow().position();
        Self {
            position: start,
            tolerance,
            movable,
            reference: Some((reference, offset)),
        }
    }

    fn expected(&self) -> Vec2 {
        match &self.reference {
            Some((reference, offset)) => reference.borrow().position() + *offset,
            None => self.position,
        }
    }
}

impl StarTracker for MaxStarTracker {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn track(&mut self, frame: &Frame) -> Result<Vec2, PhotometryError> {
        let width = frame.width().ok_or(PhotometryError::NotTwoDimensional)? as i64;
        let height = frame.height().ok_or(PhotometryError::NotTwoDimensional)? as i64;
        let expected = self.expected();

        if !self.movable {
            self.position = expected;
            return Ok(expected);
        }

        let cx = expected.x.round() as i64;
        let cy = expected.y.round() as i64;
        let tol = self.tolerance as i64;
        let x0 = (cx - tol).max(0);
        let x1 = (cx + tol).min(width - 1);
        let y0 = (cy - tol).max(0);
        let y1 = (cy + tol).min(height - 1);
        if x0 > x1 || y0 > y1 {
            return Err(PhotometryError::OutOfImage {
                x: expected.x,
                y: expected.y,
            });
        }

        let mut best = (x0, y0, f32::NEG_INFINITY);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let v = frame.data()[(y * width + x) as usize];
                if v > best.2 {
                    best = (x, y, v);
                }
            }
        }

        let (bx, by, _) = best;
        if bx == cx - tol || bx == cx + tol || by == cy - tol || by == cy + tol {
            return Err(PhotometryError::StarEscaped {
                x: bx as f32,
                y: by as f32,
            });
        }

        self.position = Vec2::new(bx as f32, by as f32);
        debug!("star tracked to ({bx}, {by})");
        Ok(self.position)
    }
}

/// One aperture measurement.
///
/// `background` and `total` are per-pixel means over the background
/// annulus and the signal circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhotometryResult {
    pub position: Vec2,
    pub background: f32,
    pub background_pixels: usize,
    pub total: f32,
    pub signal_pixels: usize,
}

impl PhotometryResult {
    /// Background-subtracted per-pixel signal.
    pub fn signal(&self) -> f32 {
        self.total - self.background
    }

    /// Instrumental magnitude, `NaN` when the signal is not positive.
    pub fn magnitude(&self) -> f32 {
        -2.5 * self.signal().log10()
    }
}

/// Circular aperture with a background annulus.
///
/// Pixels within `r1` of the center are signal; pixels between `r2` and
/// `r3` are background. The signal circle must lie fully inside the
/// image; background pixels outside the image are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThreeRingAperture {
    r1: f32,
    r2: f32,
    r3: f32,
}

impl ThreeRingAperture {
    pub fn new(r1: f32, r2: f32, r3: f32) -> Result<Self, PhotometryError> {
        if r1 > 0.0 && r1 <= r2 && r2 <= r3 {
            Ok(Self { r1, r2, r3 })
        } else {
            Err(PhotometryError::InvalidRadii)
        }
    }

    pub fn measure(
        &self,
        frame: &Frame,
        center: Vec2,
    ) -> Result<PhotometryResult, PhotometryError> {
        let width = frame.width().ok_or(PhotometryError::NotTwoDimensional)? as i64;
        let height = frame.height().ok_or(PhotometryError::NotTwoDimensional)? as i64;

        let out = PhotometryError::OutOfImage {
            x: center.x,
            y: center.y,
        };
        if center.x - self.r1 < 0.0
            || center.y - self.r1 < 0.0
            || center.x + self.r1 > (width - 1) as f32
            || center.y + self.r1 > (height - 1) as f32
        {
            return Err(out);
        }

        let x0 = ((center.x - self.r3).floor() as i64).max(0);
        let x1 = ((center.x + self.r3).ceil() as i64).min(width - 1);
        let y0 = ((center.y - self.r3).floor() as i64).max(0);
        let y1 = ((center.y + self.r3).ceil() as i64).min(height - 1);

        let mut signal_sum = 0.0f64;
        let mut signal_pixels = 0usize;
        let mut back_sum = 0.0f64;
        let mut back_pixels = 0usize;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 - center.x;
                let dy = y as f32 - center.y;
                let dist = (dx * dx + dy * dy).sqrt();
                let v = frame.data()[(y * width + x) as usize] as f64;
                if dist <= self.r1 {
                    signal_sum += v;
                    signal_pixels += 1;
                } else if dist >= self.r2 && dist <= self.r3 {
                    back_sum += v;
                    back_pixels += 1;
                }
            }
        }
        if signal_pixels == 0 || back_pixels == 0 {
            return Err(out);
        }

        Ok(PhotometryResult {
            position: center,
            background: (back_sum / back_pixels as f64) as f32,
            background_pixels: back_pixels,
            total: (signal_sum / signal_pixels as f64) as f32,
            signal_pixels,
        })
    }
}
