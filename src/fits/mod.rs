//! FITS single-HDU decoder.
//!
//! Reads the 2880-byte header block, validates the mandatory cards, and
//! decodes the big-endian payload into a [`TypedMatrix`] of the kind the
//! BITPIX card declares. Extension HDUs, scaling keywords and compressed
//! payloads are out of scope; one header block plus one payload per file.

pub mod card;
pub mod header;

pub use card::HeaderCard;
pub use header::{Header, HeaderInfo, ValidationState, BLOCK_SIZE};

use crate::convert::{reverse_bytes, ElemKind, Element};
use crate::matrix::{DataMatrix, MatrixError, TypedMatrix};
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Decoder errors.
///
/// `Clone` so the header's memoized Invalid state can re-raise the same
/// error on every access; i/o failures are captured as strings for the
/// same reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitsError {
    #[error("i/o error: {0}")]
    Io(String),

    #[error("header card shorter than 80 bytes ({got})")]
    ShortCard { got: usize },

    #[error("header block shorter than 2880 bytes ({got})")]
    ShortHeader { got: usize },

    #[error("card {0} has no boolean value")]
    NotBool(String),

    #[error("card {0} has no integer value")]
    NotInt(String),

    #[error("not a SIMPLE=T file")]
    NotSimple,

    #[error("missing or malformed {0} card")]
    MissingCard(&'static str),

    #[error("unsupported BITPIX value {0}")]
    UnsupportedBitpix(i64),

    #[error("NAXIS value {0} outside [0, 999]")]
    BadAxisCount(i64),

    #[error("missing or malformed NAXIS{0} card")]
    MissingAxis(i64),

    #[error("NAXIS{axis} value {len} is negative")]
    BadAxisLength { axis: i64, len: i64 },

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

impl From<io::Error> for FitsError {
    fn from(e: io::Error) -> Self {
        FitsError::Io(e.to_string())
    }
}

/// A decoded single-HDU file: validated header plus typed payload.
#[derive(Debug)]
pub struct FitsFile {
    header: Header,
    data: TypedMatrix,
}

impl FitsFile {
    /// Open and decode a file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FitsError> {
        let path = path.as_ref();
        debug!("decoding {}", path.display());
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Decode from any reader positioned at the start of the header.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, FitsError> {
        let mut block = [0u8; BLOCK_SIZE];
        reader.read_exact(&mut block)?;
        let header = Header::parse(&block)?;

        // Validation runs here; an unsupported BITPIX fails before any
        // payload buffer exists.
        let kind = header.kind()?;
        let dimensions = header.dimensions()?.to_vec();
        let size = header.size()?;

        let data = match kind {
            ElemKind::U8 => TypedMatrix::U8(read_payload(&mut reader, &dimensions, size)?),
            ElemKind::I16 => TypedMatrix::I16(read_payload(&mut reader, &dimensions, size)?),
            ElemKind::I32 => TypedMatrix::I32(read_payload(&mut reader, &dimensions, size)?),
            ElemKind::I64 => TypedMatrix::I64(read_payload(&mut reader, &dimensions, size)?),
            ElemKind::F32 => TypedMatrix::F32(read_payload(&mut reader, &dimensions, size)?),
            ElemKind::F64 => TypedMatrix::F64(read_payload(&mut reader, &dimensions, size)?),
            // from_bitpix never produces the remaining kinds.
            ElemKind::I8 | ElemKind::U16 | ElemKind::U32 | ElemKind::U64 => {
                unreachable!("kind {kind} has no BITPIX code")
            }
        };

        Ok(Self { header, data })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn data(&self) -> &TypedMatrix {
        &self.data
    }

    pub fn into_data(self) -> TypedMatrix {
        self.data
    }

    pub fn kind(&self) -> ElemKind {
        self.data.kind()
    }

    pub fn dimensions(&self) -> &[usize] {
        self.data.dimensions()
    }
}

/// Read `size` big-endian elements and normalize them to host order.
fn read_payload<T: Element, R: Read>(
    reader: &mut R,
    dimensions: &[usize],
    size: usize,
) -> Result<DataMatrix<T>, FitsError> {
    let width = T::KIND.width();
    let mut buf = vec![0u8; size * width];
    reader.read_exact(&mut buf)?;
    if cfg!(target_endian = "little") {
        reverse_bytes(&mut buf, width).map_err(MatrixError::from)?;
    }
    let data: Vec<T> = buf
        .chunks_exact(width)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    Ok(DataMatrix::from_vec(dimensions, data)?)
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::card::HeaderCard;
    use super::header::{BLOCK_SIZE, CARDS_PER_BLOCK};

    /// Build one 2880-byte header block from (keyword, value) pairs, an
    /// END card, and blank padding.
    pub fn header_block(cards: &[(&str, &str)]) -> Vec<u8> {
        let mut block = Vec::with_capacity(BLOCK_SIZE);
        for (keyword, value) in cards {
            let text = format!("{keyword:<8}= {value:>20}");
            push_card(&mut block, &text);
        }
        push_card(&mut block, "END");
        while block.len() < CARDS_PER_BLOCK * HeaderCard::LEN {
            push_card(&mut block, "");
        }
        block
    }

    fn push_card(block: &mut Vec<u8>, text: &str) {
        let mut card = [b' '; HeaderCard::LEN];
        card[..text.len()].copy_from_slice(text.as_bytes());
        block.extend_from_slice(&card);
    }

    /// A complete rank-2 BITPIX=16 file image: header plus big-endian
    /// payload.
    pub fn i16_file(width: usize, height: usize, values: &[i16]) -> Vec<u8> {
        assert_eq!(values.len(), width * height);
        let mut bytes = header_block(&[
            ("SIMPLE", "T"),
            ("BITPIX", "16"),
            ("NAXIS", "2"),
            ("NAXIS1", &width.to_string()),
            ("NAXIS2", &height.to_string()),
        ]);
        for v in values {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes
    }
}
