//! Header block parsing and lazy validation.

use super::card::HeaderCard;
use super::FitsError;
use crate::convert::ElemKind;
use once_cell::sync::OnceCell;

/// Physical block size of the container.
pub const BLOCK_SIZE: usize = 2880;

/// Cards per header block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / HeaderCard::LEN;

/// Derived payload shape, the product of successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub kind: ElemKind,
    pub dimensions: Vec<usize>,
}

/// Validation state, visible for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    NotValidated,
    Valid,
    Invalid,
}

/// A parsed 36-card header block.
///
/// Validation runs once, on the first access to a derived property, and
/// the outcome is memoized: a valid header never re-validates, and an
/// invalid one re-raises the same error on every later access.
#[derive(Debug)]
pub struct Header {
    cards: Vec<HeaderCard>,
    info: OnceCell<Result<HeaderInfo, FitsError>>,
}

impl Header {
    /// Parse all 36 cards from one header block.
    pub fn parse(block: &[u8]) -> Result<Self, FitsError> {
        if block.len() < BLOCK_SIZE {
            return Err(FitsError::ShortHeader { got: block.len() });
        }
        let cards = block[..BLOCK_SIZE]
            .chunks_exact(HeaderCard::LEN)
            .map(HeaderCard::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            cards,
            info: OnceCell::new(),
        })
    }

    /// All 36 cards in file order.
    pub fn cards(&self) -> &[HeaderCard] {
        &self.cards
    }

    pub fn state(&self) -> ValidationState {
        match self.info.get() {
            None => ValidationState::NotValidated,
            Some(Ok(_)) => ValidationState::Valid,
            Some(Err(_)) => ValidationState::Invalid,
        }
    }

    /// Element kind of the payload. Triggers validation.
    pub fn kind(&self) -> Result<ElemKind, FitsError> {
        Ok(self.info()?.kind)
    }

    /// Payload dimension vector, `dimensions[0]` = NAXIS1. Triggers
    /// validation.
    pub fn dimensions(&self) -> Result<&[usize], FitsError> {
        Ok(&self.info()?.dimensions)
    }

    /// Payload element count. Zero axes means no data follows.
    pub fn size(&self) -> Result<usize, FitsError> {
        let dims = self.dimensions()?;
        if dims.is_empty() {
            Ok(0)
        } else {
            Ok(dims.iter().product())
        }
    }

    fn info(&self) -> Result<&HeaderInfo, FitsError> {
        self.info
            .get_or_init(|| self.validate())
            .as_ref()
            .map_err(|e| e.clone())
    }

    fn validate(&self) -> Result<HeaderInfo, FitsError> {
        let simple = &self.cards[0];
        if simple.keyword() != "SIMPLE" || !simple.has_bool_value() {
            return Err(FitsError::NotSimple);
        }
        if !simple.bool_value()? {
            return Err(FitsError::NotSimple);
        }

        let bitpix = &self.cards[1];
        if bitpix.keyword() != "BITPIX" || !bitpix.has_int_value() {
            return Err(FitsError::MissingCard("BITPIX"));
        }
        let code = bitpix.int_value()?;
        let kind = ElemKind::from_bitpix(code)
            .map_err(|_| FitsError::UnsupportedBitpix(code))?;

        let naxis = &self.cards[2];
        if naxis.keyword() != "NAXIS" || !naxis.has_int_value() {
            return Err(FitsError::MissingCard("NAXIS"));
        }
        let axes = naxis.int_value()?;
        if !(0..=999).contains(&axes) {
            return Err(FitsError::BadAxisCount(axes));
        }

        let mut dimensions = Vec::with_capacity(axes as usize);
        for n in 1..=axes {
            let card = self
                .cards
                .get(2 + n as usize)
                .ok_or(FitsError::MissingAxis(n))?;
            if card.keyword() != format!("NAXIS{n}") || !card.has_int_value() {
                return Err(FitsError::MissingAxis(n));
            }
            let len = card.int_value()?;
            if len < 0 {
                return Err(FitsError::BadAxisLength { axis: n, len });
            }
            dimensions.push(len as usize);
        }

        Ok(HeaderInfo { kind, dimensions })
    }
}
