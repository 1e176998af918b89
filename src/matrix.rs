//! Owned, contiguous, row-major typed matrices.
//!
//! [`DataMatrix`] is the storage type every image passes through: a
//! dimension vector plus a flat element buffer whose length always equals
//! the product of the dimensions. [`TypedMatrix`] erases the element type
//! so the FITS decoder can hand back whatever kind the file declares.

use crate::convert::{CastFrom, ConvertError, ElemKind, Element};
use thiserror::Error;

/// Errors from matrix construction and arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// A zero dimension, or a total size that overflows `usize`.
    #[error("matrix dimensions must be greater than 0 and representable")]
    InvalidDimension,

    /// The supplied buffer holds fewer elements than the dimensions require.
    #[error("data buffer too small: expected {expected} elements, got {got}")]
    BufferTooSmall { expected: usize, got: usize },

    /// Two matrices in a binary operation have different shapes.
    #[error("matrix dimensions mismatch")]
    DimensionMismatch,

    /// Conversion engine failure.
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Multi-dimensional matrix of a single element kind.
///
/// The buffer is row-major with the first dimension varying fastest, the
/// FITS convention: for a 2-D image `dimensions()[0]` is the width and the
/// element at `(x, y)` sits at index `y * width + x`.
///
/// Dimensions are fixed at construction. `Clone` performs a deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMatrix<T: Element> {
    dimensions: Vec<usize>,
    data: Vec<T>,
}

impl<T: Element> DataMatrix<T> {
    /// Create a zero-filled matrix.
    ///
    /// Fails with [`MatrixError::InvalidDimension`] if any dimension is
    /// zero. An empty dimension list produces a rank-0 matrix of size 0
    /// (the FITS "no data follows" case).
    pub fn new(dimensions: &[usize]) -> Result<Self, MatrixError> {
        let size = Self::checked_size(dimensions)?;
        Ok(Self {
            dimensions: dimensions.to_vec(),
            data: vec![T::default(); size],
        })
    }

    /// Create a matrix adopting `data`.
    ///
    /// Fails with [`MatrixError::BufferTooSmall`] if `data` holds fewer
    /// elements than the dimensions require; extra trailing elements are
    /// dropped.
    pub fn from_vec(dimensions: &[usize], mut data: Vec<T>) -> Result<Self, MatrixError> {
        let size = Self::checked_size(dimensions)?;
        if data.len() < size {
            return Err(MatrixError::BufferTooSmall {
                expected: size,
                got: data.len(),
            });
        }
        data.truncate(size);
        Ok(Self {
            dimensions: dimensions.to_vec(),
            data,
        })
    }

    fn checked_size(dimensions: &[usize]) -> Result<usize, MatrixError> {
        if dimensions.is_empty() {
            return Ok(0);
        }
        let mut size = 1usize;
        for &d in dimensions {
            if d == 0 {
                return Err(MatrixError::InvalidDimension);
            }
            size = size
                .checked_mul(d)
                .ok_or(MatrixError::InvalidDimension)?;
        }
        Ok(size)
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Dimension vector; its length is the rank.
    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    /// Element buffer.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable element buffer.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Convert to a matrix of another element kind.
    ///
    /// Every element passes through the conversion engine with native cast
    /// semantics. The source matrix is not touched.
    pub fn convert<U>(&self) -> DataMatrix<U>
    where
        U: Element + CastFrom<T>,
    {
        DataMatrix {
            dimensions: self.dimensions.clone(),
            data: self.data.iter().map(|&v| U::cast_from(v)).collect(),
        }
    }

    /// Check that two matrices have identical shapes.
    pub fn compare_dimensions<U: Element>(
        a: &DataMatrix<T>,
        b: &DataMatrix<U>,
    ) -> Result<(), MatrixError> {
        if a.dimensions == b.dimensions {
            Ok(())
        } else {
            Err(MatrixError::DimensionMismatch)
        }
    }
}

/// A matrix of any of the ten supported element kinds.
///
/// This is the decoder's output type: the file declares the element kind
/// at runtime, so the concrete [`DataMatrix`] instantiation is chosen
/// behind an enum.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedMatrix {
    U8(DataMatrix<u8>),
    I8(DataMatrix<i8>),
    U16(DataMatrix<u16>),
    I16(DataMatrix<i16>),
    U32(DataMatrix<u32>),
    I32(DataMatrix<i32>),
    U64(DataMatrix<u64>),
    I64(DataMatrix<i64>),
    F32(DataMatrix<f32>),
    F64(DataMatrix<f64>),
}

macro_rules! for_each_variant {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            TypedMatrix::U8($m) => $body,
            TypedMatrix::I8($m) => $body,
            TypedMatrix::U16($m) => $body,
            TypedMatrix::I16($m) => $body,
            TypedMatrix::U32($m) => $body,
            TypedMatrix::I32($m) => $body,
            TypedMatrix::U64($m) => $body,
            TypedMatrix::I64($m) => $body,
            TypedMatrix::F32($m) => $body,
            TypedMatrix::F64($m) => $body,
        }
    };
}

impl TypedMatrix {
    /// Element kind stored in this matrix.
    pub fn kind(&self) -> ElemKind {
        match self {
            TypedMatrix::U8(_) => ElemKind::U8,
            TypedMatrix::I8(_) => ElemKind::I8,
            TypedMatrix::U16(_) => ElemKind::U16,
            TypedMatrix::I16(_) => ElemKind::I16,
            TypedMatrix::U32(_) => ElemKind::U32,
            TypedMatrix::I32(_) => ElemKind::I32,
            TypedMatrix::U64(_) => ElemKind::U64,
            TypedMatrix::I64(_) => ElemKind::I64,
            TypedMatrix::F32(_) => ElemKind::F32,
            TypedMatrix::F64(_) => ElemKind::F64,
        }
    }

    /// Dimension vector.
    pub fn dimensions(&self) -> &[usize] {
        for_each_variant!(self, m => m.dimensions())
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        for_each_variant!(self, m => m.size())
    }

    /// Convert to another element kind, producing a fresh matrix.
    pub fn convert_to(&self, kind: ElemKind) -> TypedMatrix {
        macro_rules! dispatch_dest {
            ($m:expr) => {
                match kind {
                    ElemKind::U8 => TypedMatrix::U8($m.convert()),
                    ElemKind::I8 => TypedMatrix::I8($m.convert()),
                    ElemKind::U16 => TypedMatrix::U16($m.convert()),
                    ElemKind::I16 => TypedMatrix::I16($m.convert()),
                    ElemKind::U32 => TypedMatrix::U32($m.convert()),
                    ElemKind::I32 => TypedMatrix::I32($m.convert()),
                    ElemKind::U64 => TypedMatrix::U64($m.convert()),
                    ElemKind::I64 => TypedMatrix::I64($m.convert()),
                    ElemKind::F32 => TypedMatrix::F32($m.convert()),
                    ElemKind::F64 => TypedMatrix::F64($m.convert()),
                }
            };
        }
        for_each_variant!(self, m => dispatch_dest!(m))
    }

    /// Convert to a single-float matrix, the pipeline's working kind.
    pub fn to_f32(&self) -> DataMatrix<f32> {
        for_each_variant!(self, m => m.convert::<f32>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zero_filled() {
        let m = DataMatrix::<u16>::new(&[4, 3]).unwrap();
        assert_eq!(m.size(), 12);
        assert_eq!(m.dimensions(), &[4, 3]);
        assert!(m.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_new_rejects_zero_dimension() {
        assert_eq!(
            DataMatrix::<u8>::new(&[4, 0]),
            Err(MatrixError::InvalidDimension)
        );
    }

    #[test]
    fn test_new_rejects_overflowing_dimensions() {
        assert_eq!(
            DataMatrix::<u8>::new(&[usize::MAX, 2]),
            Err(MatrixError::InvalidDimension)
        );
    }

    #[test]
    fn test_rank_zero_matrix_is_empty() {
        let m = DataMatrix::<f64>::new(&[]).unwrap();
        assert_eq!(m.size(), 0);
        assert_eq!(m.dimensions(), &[] as &[usize]);
    }

    #[test]
    fn test_from_vec() {
        let m = DataMatrix::from_vec(&[2, 2], vec![1i32, 2, 3, 4]).unwrap();
        assert_eq!(m.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_from_vec_too_small() {
        assert_eq!(
            DataMatrix::from_vec(&[2, 2], vec![1u8, 2, 3]),
            Err(MatrixError::BufferTooSmall {
                expected: 4,
                got: 3
            })
        );
    }

    #[test]
    fn test_from_vec_truncates_extra() {
        let m = DataMatrix::from_vec(&[2], vec![1u8, 2, 3, 4]).unwrap();
        assert_eq!(m.data(), &[1, 2]);
    }

    #[test]
    fn test_convert_does_not_mutate_source() {
        let src = DataMatrix::from_vec(&[3], vec![1000i16, -5, 300]).unwrap();
        let dst: DataMatrix<u8> = src.convert();
        assert_eq!(src.data(), &[1000, -5, 300]);
        // Native narrowing: low byte of the two's-complement value.
        assert_eq!(dst.data(), &[0xE8, 0xFB, 0x2C]);
        assert_eq!(dst.dimensions(), src.dimensions());
    }

    #[test]
    fn test_convert_to_float() {
        let src = DataMatrix::from_vec(&[2], vec![10u16, 20]).unwrap();
        let dst: DataMatrix<f32> = src.convert();
        assert_eq!(dst.data(), &[10.0, 20.0]);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut a = DataMatrix::from_vec(&[2], vec![1.0f32, 2.0]).unwrap();
        let b = a.clone();
        a.data_mut()[0] = 99.0;
        assert_eq!(b.data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_compare_dimensions() {
        let a = DataMatrix::<f32>::new(&[3, 2]).unwrap();
        let b = DataMatrix::<f32>::new(&[3, 2]).unwrap();
        let c = DataMatrix::<f32>::new(&[2, 3]).unwrap();
        assert!(DataMatrix::compare_dimensions(&a, &b).is_ok());
        assert_eq!(
            DataMatrix::compare_dimensions(&a, &c),
            Err(MatrixError::DimensionMismatch)
        );
    }

    #[test]
    fn test_typed_matrix_kind_and_size() {
        let m = TypedMatrix::I16(DataMatrix::new(&[4, 3]).unwrap());
        assert_eq!(m.kind(), ElemKind::I16);
        assert_eq!(m.size(), 12);
        assert_eq!(m.dimensions(), &[4, 3]);
    }

    #[test]
    fn test_typed_matrix_convert_to() {
        let m = TypedMatrix::U8(DataMatrix::from_vec(&[2], vec![3u8, 250]).unwrap());
        let f = m.convert_to(ElemKind::F64);
        assert_eq!(f.kind(), ElemKind::F64);
        match f {
            TypedMatrix::F64(d) => assert_eq!(d.data(), &[3.0, 250.0]),
            _ => unreachable!(),
        }
        // Source unchanged
        assert_eq!(m.kind(), ElemKind::U8);
    }

    #[test]
    fn test_typed_matrix_identity_convert() {
        let m = TypedMatrix::I32(DataMatrix::from_vec(&[2], vec![-1i32, 7]).unwrap());
        let same = m.convert_to(ElemKind::I32);
        assert_eq!(same, m);
    }
}
