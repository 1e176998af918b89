//! Calibration and reduction pipeline for astronomical image sequences.
//!
//! This crate decodes FITS images into typed matrices, converts them to
//! floating-point frames, and applies the classic CCD calibration chain
//! (bias/dark subtraction, flat-field division) as a lazy, single-pass
//! pipeline feeding star tracking and aperture photometry.
//!
//! # Module Organization
//!
//! - **convert**: numeric element kinds and exhaustive pairwise conversion
//! - **matrix**: owned, contiguous, row-major typed matrices
//! - **frame**: single-float image matrices with element-wise arithmetic
//! - **fits**: header card parsing, validation, and payload decoding
//! - **reduction**: master calibration frames and lazy frame correction
//! - **sequence**: format-agnostic frame sources (FITS files, video streams)
//! - **config**: key=value run configuration with typed accessors
//! - **display**: frame display collaborator interface
//! - **photometry**: star tracking and three-ring aperture photometry

pub mod config;
pub mod convert;
pub mod display;
pub mod fits;
pub mod frame;
pub mod matrix;
pub mod photometry;
pub mod reduction;
pub mod sequence;

// Re-export key functionality for easier access
pub use convert::{reverse_bytes, ElemKind};
pub use fits::FitsFile;
pub use frame::Frame;
pub use matrix::{DataMatrix, MatrixError, TypedMatrix};
pub use reduction::{FrameResult, ReductionError};
