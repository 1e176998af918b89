//! Single-float image frames with element-wise arithmetic.
//!
//! [`Frame`] is the working currency of the calibration pipeline: every
//! decoded image is converted to `f32` once and all subsequent transforms
//! operate here. Binary operators copy then mutate, so calibration
//! references are never touched by per-frame arithmetic; the in-place
//! methods are the mutating path and return `Result` on shape mismatch.

use crate::convert::CastFrom;
use crate::matrix::{DataMatrix, MatrixError, TypedMatrix};
use ndarray::ArrayView2;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A floating-point image matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    matrix: DataMatrix<f32>,
}

impl Frame {
    /// Adopt an existing float matrix by move.
    ///
    /// The caller gives up ownership, so there is exactly one owner of the
    /// buffer afterwards.
    pub fn from_matrix(matrix: DataMatrix<f32>) -> Self {
        Self { matrix }
    }

    /// Convert-and-copy from a matrix of any element kind.
    pub fn from_typed(matrix: &TypedMatrix) -> Self {
        Self {
            matrix: matrix.to_f32(),
        }
    }

    /// Convert-and-copy from a concrete matrix.
    pub fn from_data<T>(matrix: &DataMatrix<T>) -> Self
    where
        T: crate::convert::Element,
        f32: CastFrom<T>,
    {
        Self {
            matrix: matrix.convert(),
        }
    }

    /// Zero-filled frame.
    pub fn zeros(dimensions: &[usize]) -> Result<Self, MatrixError> {
        Ok(Self {
            matrix: DataMatrix::new(dimensions)?,
        })
    }

    /// Underlying matrix.
    pub fn matrix(&self) -> &DataMatrix<f32> {
        &self.matrix
    }

    /// Consume the frame and return the matrix.
    pub fn into_matrix(self) -> DataMatrix<f32> {
        self.matrix
    }

    pub fn size(&self) -> usize {
        self.matrix.size()
    }

    pub fn dimensions(&self) -> &[usize] {
        self.matrix.dimensions()
    }

    /// Width of a rank-2 frame (the first, fastest-varying dimension).
    pub fn width(&self) -> Option<usize> {
        (self.dimensions().len() == 2).then(|| self.dimensions()[0])
    }

    /// Height of a rank-2 frame.
    pub fn height(&self) -> Option<usize> {
        (self.dimensions().len() == 2).then(|| self.dimensions()[1])
    }

    pub fn data(&self) -> &[f32] {
        self.matrix.data()
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        self.matrix.data_mut()
    }

    /// Pixel at `(x, y)` of a rank-2 frame.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        let w = self.width()?;
        let h = self.height()?;
        if x < w && y < h {
            Some(self.data()[y * w + x])
        } else {
            None
        }
    }

    /// Borrow a rank-2 frame as an `ndarray` view with shape `(height, width)`.
    pub fn as_view2(&self) -> Option<ArrayView2<'_, f32>> {
        let w = self.width()?;
        let h = self.height()?;
        ArrayView2::from_shape((h, w), self.data()).ok()
    }

    /// Mean element value.
    pub fn mean(&self) -> f32 {
        if self.size() == 0 {
            return 0.0;
        }
        let sum: f64 = self.data().iter().map(|&v| v as f64).sum();
        (sum / self.size() as f64) as f32
    }

    /// Minimum and maximum element values, `None` for an empty frame.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut it = self.data().iter();
        let first = *it.next()?;
        Some(it.fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))))
    }

    fn check_shape(&self, other: &Frame) -> Result<(), MatrixError> {
        DataMatrix::compare_dimensions(&self.matrix, &other.matrix)
    }

    /// Element-wise `self += other`. Reads but never mutates `other`.
    pub fn add(&mut self, other: &Frame) -> Result<(), MatrixError> {
        self.check_shape(other)?;
        for (a, &b) in self.data_mut().iter_mut().zip(other.data()) {
            *a += b;
        }
        Ok(())
    }

    /// Element-wise `self -= other`.
    pub fn subtract(&mut self, other: &Frame) -> Result<(), MatrixError> {
        self.check_shape(other)?;
        for (a, &b) in self.data_mut().iter_mut().zip(other.data()) {
            *a -= b;
        }
        Ok(())
    }

    /// Element-wise (Hadamard) `self *= other`.
    pub fn multiply(&mut self, other: &Frame) -> Result<(), MatrixError> {
        self.check_shape(other)?;
        for (a, &b) in self.data_mut().iter_mut().zip(other.data()) {
            *a *= b;
        }
        Ok(())
    }

    /// Element-wise `self /= other`.
    pub fn divide(&mut self, other: &Frame) -> Result<(), MatrixError> {
        self.check_shape(other)?;
        for (a, &b) in self.data_mut().iter_mut().zip(other.data()) {
            *a /= b;
        }
        Ok(())
    }

    pub fn add_scalar(&mut self, s: f32) {
        for a in self.data_mut() {
            *a += s;
        }
    }

    pub fn subtract_scalar(&mut self, s: f32) {
        for a in self.data_mut() {
            *a -= s;
        }
    }

    pub fn multiply_scalar(&mut self, s: f32) {
        for a in self.data_mut() {
            *a *= s;
        }
    }

    /// Scalar division, implemented as multiplication by the reciprocal.
    pub fn divide_scalar(&mut self, s: f32) {
        let inv = 1.0 / s;
        for a in self.data_mut() {
            *a *= inv;
        }
    }

    /// Negate every element in place.
    pub fn negate(&mut self) {
        for a in self.data_mut() {
            *a = -*a;
        }
    }

    /// Replace every element with its reciprocal in place.
    pub fn reciprocal(&mut self) {
        for a in self.data_mut() {
            *a = 1.0 / *a;
        }
    }
}

macro_rules! frame_binop {
    ($trait:ident, $method:ident, $inplace:ident) => {
        impl $trait<&Frame> for &Frame {
            type Output = Frame;

            fn $method(self, rhs: &Frame) -> Frame {
                let mut out = self.clone();
                // Qualified so the call hits the inherent mutator, not
                // this operator again via autoref.
                if let Err(e) = Frame::$inplace(&mut out, rhs) {
                    panic!("{e}");
                }
                out
            }
        }
    };
}

frame_binop!(Add, add, add);
frame_binop!(Sub, sub, subtract);
frame_binop!(Mul, mul, multiply);
frame_binop!(Div, div, divide);

impl Add<f32> for &Frame {
    type Output = Frame;

    fn add(self, rhs: f32) -> Frame {
        let mut out = self.clone();
        out.add_scalar(rhs);
        out
    }
}

impl Sub<f32> for &Frame {
    type Output = Frame;

    fn sub(self, rhs: f32) -> Frame {
        let mut out = self.clone();
        out.subtract_scalar(rhs);
        out
    }
}

impl Mul<f32> for &Frame {
    type Output = Frame;

    fn mul(self, rhs: f32) -> Frame {
        let mut out = self.clone();
        out.multiply_scalar(rhs);
        out
    }
}

impl Div<f32> for &Frame {
    type Output = Frame;

    fn div(self, rhs: f32) -> Frame {
        let mut out = self.clone();
        out.divide_scalar(rhs);
        out
    }
}

impl Add<&Frame> for f32 {
    type Output = Frame;

    fn add(self, rhs: &Frame) -> Frame {
        rhs + self
    }
}

impl Sub<&Frame> for f32 {
    type Output = Frame;

    fn sub(self, rhs: &Frame) -> Frame {
        let mut out = rhs.clone();
        for a in out.data_mut() {
            *a = self - *a;
        }
        out
    }
}

impl Mul<&Frame> for f32 {
    type Output = Frame;

    fn mul(self, rhs: &Frame) -> Frame {
        rhs * self
    }
}

impl Div<&Frame> for f32 {
    type Output = Frame;

    fn div(self, rhs: &Frame) -> Frame {
        let mut out = rhs.clone();
        for a in out.data_mut() {
            *a = self / *a;
        }
        out
    }
}

impl Neg for &Frame {
    type Output = Frame;

    fn neg(self) -> Frame {
        let mut out = self.clone();
        out.negate();
        out
    }
}
