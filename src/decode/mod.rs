//! Region and dictionary decoding procedures.
//!
//! The submodules implement the decoding procedures of clause 6, one per
//! segment family. This module holds what they share: the region segment
//! information field (7.4.1), templates and their context sizes, and
//! adaptive template pixels.

pub(crate) mod generic;
pub(crate) mod halftone;
pub(crate) mod pattern;
pub(crate) mod refinement;
pub(crate) mod symbol;
pub(crate) mod text;

use smallvec::SmallVec;

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{ParseError, RegionError, Result, bail};
use crate::reader::Reader;

/// An adaptive template pixel: a template neighbour whose offset is coded in
/// the segment header rather than fixed (6.2.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AtPixel {
    pub(crate) x: i8,
    pub(crate) y: i8,
}

/// The AT pixel lists are at most 12 entries (extended template 0), usually 1
/// or 4.
pub(crate) type AtPixels = SmallVec<[AtPixel; 4]>;

/// "GBTEMPLATE - The template used by the decoding." (6.2.5.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenericTemplate {
    Template0,
    Template1,
    Template2,
    Template3,
}

impl GenericTemplate {
    pub(crate) fn from_bits(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Template0,
            1 => Self::Template1,
            2 => Self::Template2,
            _ => Self::Template3,
        }
    }

    /// The size of the estimator table for this template.
    ///
    /// Template 0 needs the full 16 bits because AT overrides can set the
    /// two topmost context bits.
    pub(crate) fn context_size(self) -> usize {
        match self {
            Self::Template0 => 1 << 16,
            Self::Template1 => 1 << 13,
            Self::Template2 | Self::Template3 => 1 << 10,
        }
    }

    /// "If GBTEMPLATE is 0, then this field contains ... eight bytes (four
    /// AT pixels); twelve AT pixels if EXTTEMPLATE is 1. Otherwise one AT
    /// pixel." (7.4.6.3)
    pub(crate) fn at_pixel_count(self, ext_template: bool) -> usize {
        match self {
            Self::Template0 if ext_template => 12,
            Self::Template0 => 4,
            _ => 1,
        }
    }
}

/// "GRTEMPLATE - The template used by the refinement decoding." (6.3.5.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefinementTemplate {
    Template0,
    Template1,
}

impl RefinementTemplate {
    pub(crate) fn from_bit(value: u8) -> Self {
        if value & 1 == 0 {
            Self::Template0
        } else {
            Self::Template1
        }
    }

    pub(crate) fn context_size(self) -> usize {
        match self {
            Self::Template0 => 1 << 13,
            Self::Template1 => 1 << 10,
        }
    }
}

/// Parse a list of AT pixels (7.4.6.3).
///
/// AT pixels must reference already-decoded pixels: strictly above the
/// current row, or on it and strictly to the left.
pub(crate) fn parse_at_pixels(reader: &mut Reader<'_>, count: usize) -> Result<AtPixels> {
    let mut pixels = AtPixels::new();

    for _ in 0..count {
        let x = reader.read_byte().ok_or(ParseError::UnexpectedEof)? as i8;
        let y = reader.read_byte().ok_or(ParseError::UnexpectedEof)? as i8;

        if y > 0 || (y == 0 && x >= 0) {
            bail!(RegionError::InvalidAtPixel);
        }

        pixels.push(AtPixel { x, y });
    }

    Ok(pixels)
}

/// Parse the two refinement AT pixels of template 0 (7.4.7.2).
pub(crate) fn parse_refinement_at_pixels(reader: &mut Reader<'_>) -> Result<AtPixels> {
    let mut pixels = AtPixels::new();

    for _ in 0..2 {
        let x = reader.read_byte().ok_or(ParseError::UnexpectedEof)? as i8;
        let y = reader.read_byte().ok_or(ParseError::UnexpectedEof)? as i8;
        pixels.push(AtPixel { x, y });
    }

    Ok(pixels)
}

/// Parsed region segment information field (7.4.1).
#[derive(Debug, Clone)]
pub(crate) struct RegionSegmentInfo {
    /// "This four-byte field gives the width in pixels of the bitmap encoded
    /// in this segment." (7.4.1.1)
    pub(crate) width: u32,
    /// "This four-byte field gives the height in pixels of the bitmap
    /// encoded in this segment." (7.4.1.2)
    pub(crate) height: u32,
    /// Horizontal offset of the bitmap relative to the page (7.4.1.3).
    pub(crate) x_location: u32,
    /// Vertical offset of the bitmap relative to the page (7.4.1.4).
    pub(crate) y_location: u32,
    /// "Bits 0-2: External combination operator." (7.4.1.5)
    pub(crate) combination_operator: CombinationOperator,
}

/// A decoded region together with its placement on the page.
#[derive(Debug, Clone)]
pub(crate) struct RegionBitmap {
    pub(crate) bitmap: Bitmap,
    pub(crate) info: RegionSegmentInfo,
}

/// Keep region allocations to something a scanned page can plausibly need.
const MAX_REGION_PIXELS: u64 = 1 << 31;

/// Parse the region segment information field (7.4.1).
pub(crate) fn parse_region_segment_info(reader: &mut Reader<'_>) -> Result<RegionSegmentInfo> {
    let width = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let height = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let x_location = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let y_location = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;

    if width == 0 || height == 0 || width as u64 * height as u64 > MAX_REGION_PIXELS {
        bail!(RegionError::InvalidDimension);
    }

    let combination_operator = CombinationOperator::from_value(flags & 0x07)?;

    Ok(RegionSegmentInfo {
        width,
        height,
        x_location,
        y_location,
        combination_operator,
    })
}
