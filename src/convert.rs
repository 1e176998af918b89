//! Numeric element kinds and conversion between them.
//!
//! Every matrix in this crate stores one of ten primitive element kinds.
//! Conversion between any ordered pair of kinds is available at compile
//! time through [`CastFrom`], with the semantics of a native `as` cast:
//! value-preserving on widening, two's-complement truncation on integer
//! narrowing, and truncation toward zero for float-to-integer.
//!
//! Byte-order reversal for raw element buffers lives here as well, since
//! the on-disk FITS representation is big-endian and almost every host we
//! run on is little-endian.

use bytemuck::Pod;
use std::fmt;
use thiserror::Error;

/// Errors from the conversion engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Element kind code outside the supported set.
    #[error("unsupported element kind code {0}")]
    UnsupportedKind(i64),

    /// Byte-reversal width other than 1, 2, 4 or 8.
    #[error("unsupported element width {0} for byte reversal")]
    UnsupportedWidth(usize),
}

/// The ten supported element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElemKind {
    /// Element width in bytes.
    pub fn width(self) -> usize {
        match self {
            ElemKind::U8 | ElemKind::I8 => 1,
            ElemKind::U16 | ElemKind::I16 => 2,
            ElemKind::U32 | ElemKind::I32 | ElemKind::F32 => 4,
            ElemKind::U64 | ElemKind::I64 | ElemKind::F64 => 8,
        }
    }

    /// Map a FITS BITPIX code to an element kind.
    ///
    /// Positive codes are integer bit widths (8 is unsigned, the rest are
    /// signed), negative codes are IEEE float widths.
    pub fn from_bitpix(code: i64) -> Result<Self, ConvertError> {
        match code {
            8 => Ok(ElemKind::U8),
            16 => Ok(ElemKind::I16),
            32 => Ok(ElemKind::I32),
            64 => Ok(ElemKind::I64),
            -32 => Ok(ElemKind::F32),
            -64 => Ok(ElemKind::F64),
            other => Err(ConvertError::UnsupportedKind(other)),
        }
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElemKind::U8 => "u8",
            ElemKind::I8 => "i8",
            ElemKind::U16 => "u16",
            ElemKind::I16 => "i16",
            ElemKind::U32 => "u32",
            ElemKind::I32 => "i32",
            ElemKind::U64 => "u64",
            ElemKind::I64 => "i64",
            ElemKind::F32 => "f32",
            ElemKind::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Primitive element of a matrix.
///
/// Implemented for exactly the ten kinds in [`ElemKind`]; the trait is
/// sealed so the set stays closed.
pub trait Element: Copy + Default + PartialEq + Pod + sealed::Sealed + 'static {
    /// The runtime tag for this element type.
    const KIND: ElemKind;
}

macro_rules! element_impl {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {
                const KIND: ElemKind = ElemKind::$kind;
            }
        )+
    };
}

element_impl! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

/// Conversion from another element type with native cast semantics.
pub trait CastFrom<T>: Sized {
    /// Convert a single value.
    fn cast_from(value: T) -> Self;
}

macro_rules! cast_from_impl {
    ($src:ty => $($dst:ty),+ $(,)?) => {
        $(
            impl CastFrom<$src> for $dst {
                #[inline]
                fn cast_from(value: $src) -> Self {
                    value as $dst
                }
            }
        )+
    };
}

// The full 10x10 conversion table, including identity.
cast_from_impl!(u8  => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(i8  => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(u16 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(i16 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(u32 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(i32 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(u64 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(i64 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(f32 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
cast_from_impl!(f64 => u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reverse the byte order of every element in a raw buffer.
///
/// `width` is the element width in bytes. Widths 2, 4 and 8 swap each
/// element in place; width 1 is a no-op. Applying the reversal twice
/// restores the original buffer. The buffer length is expected to be a
/// multiple of `width`; trailing bytes of a short final element are left
/// untouched.
pub fn reverse_bytes(buf: &mut [u8], width: usize) -> Result<(), ConvertError> {
    match width {
        1 => Ok(()),
        2 | 4 | 8 => {
            for chunk in buf.chunks_exact_mut(width) {
                chunk.reverse();
            }
            Ok(())
        }
        other => Err(ConvertError::UnsupportedWidth(other)),
    }
}
